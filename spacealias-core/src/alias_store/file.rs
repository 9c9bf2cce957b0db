//! File-based key-value store with optional encryption at rest
//!
//! One file per logical key: `<data_dir>/<key>.json.enc`.
//!
//! Encrypted File Format:
//! ```text
//! [Magic: 8 bytes "SPAL0001"]
//! [Version: 1 byte]
//! [Salt: 16 bytes]
//! [Nonce: 12 bytes]
//! [Ciphertext + AEAD tag: variable]
//! ```
//!
//! Without a password the JSON is stored behind a `SPAL_RAW` marker.

use super::{KeyValueStore, StoreError};
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use argon2::{Argon2, Params};
use async_trait::async_trait;
use rand::RngCore;
use serde_json::Value;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

/// Magic header for encrypted files
const MAGIC_HEADER: &[u8; 8] = b"SPAL0001";

/// Marker for unencrypted files
const RAW_HEADER: &[u8; 8] = b"SPAL_RAW";

/// Current file format version
const FORMAT_VERSION: u8 = 1;

/// Salt length for Argon2 KDF (16 bytes = 128 bits)
const SALT_LEN: usize = 16;

/// Nonce length for AES-GCM (12 bytes = 96 bits)
const NONCE_LEN: usize = 12;

/// Header size: magic(8) + version(1) + salt(16) + nonce(12) = 37 bytes
const HEADER_SIZE: usize = 8 + 1 + SALT_LEN + NONCE_LEN;

/// AEAD tag size
const TAG_LEN: usize = 16;

/// File-backed key-value store
#[derive(Clone)]
pub struct FileKeyValueStore {
    base_path: PathBuf,
    password: Option<Zeroizing<String>>,
}

impl FileKeyValueStore {
    /// Open (creating if needed) a store rooted at `base_path`
    pub fn new(base_path: impl Into<PathBuf>, password: Option<&str>) -> Result<Self, StoreError> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path)?;

        Ok(FileKeyValueStore {
            base_path,
            password: password.map(|p| Zeroizing::new(p.to_string())),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn entry_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        let valid = !key.is_empty()
            && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.base_path.join(format!("{key}.json.enc")))
    }

    /// Returns: [magic][version][salt][nonce][ciphertext+tag], or the raw form
    fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>, StoreError> {
        let Some(password) = &self.password else {
            let mut result = Vec::with_capacity(9 + data.len());
            result.extend_from_slice(RAW_HEADER);
            result.push(FORMAT_VERSION);
            result.extend_from_slice(data);
            return Ok(result);
        };

        let mut salt = [0u8; SALT_LEN];
        rand::rng().fill_bytes(&mut salt);
        let key = derive_key_from_password(password, &salt)?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let cipher = Aes256Gcm::new_from_slice(&key[..])
            .map_err(|e| StoreError::Encryption(format!("Invalid key: {}", e)))?;
        let ciphertext = cipher
            .encrypt(nonce, data)
            .map_err(|e| StoreError::Encryption(format!("Encryption failed: {}", e)))?;

        let mut result = Vec::with_capacity(HEADER_SIZE + ciphertext.len());
        result.extend_from_slice(MAGIC_HEADER);
        result.push(FORMAT_VERSION);
        result.extend_from_slice(&salt);
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);
        Ok(result)
    }

    fn decrypt(&self, data: &[u8]) -> Result<Zeroizing<Vec<u8>>, StoreError> {
        if data.len() < 9 {
            return Err(StoreError::Decryption("File too short".to_string()));
        }

        if &data[0..8] == RAW_HEADER {
            if self.password.is_some() {
                return Err(StoreError::Decryption(
                    "Encrypted store expected, found unencrypted file".to_string(),
                ));
            }
            return Ok(Zeroizing::new(data[9..].to_vec()));
        }

        if &data[0..8] != MAGIC_HEADER {
            return Err(StoreError::Decryption("Invalid magic header".to_string()));
        }

        let version = data[8];
        if version != FORMAT_VERSION {
            return Err(StoreError::Decryption(format!("Unsupported version: {}", version)));
        }

        if data.len() < HEADER_SIZE + TAG_LEN {
            return Err(StoreError::Decryption("Truncated file".to_string()));
        }

        let Some(password) = &self.password else {
            return Err(StoreError::Decryption("Password required to decrypt".to_string()));
        };

        let salt = &data[9..9 + SALT_LEN];
        let nonce = Nonce::from_slice(&data[9 + SALT_LEN..HEADER_SIZE]);
        let ciphertext = &data[HEADER_SIZE..];

        let key = derive_key_from_password(password, salt)?;
        let cipher = Aes256Gcm::new_from_slice(&key[..])
            .map_err(|e| StoreError::Decryption(format!("Invalid key: {}", e)))?;

        // AEAD tag mismatch = wrong password or tampered file
        let plaintext = cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| StoreError::InvalidPassword)?;

        Ok(Zeroizing::new(plaintext))
    }

    fn read_sync(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let path = self.entry_path(key)?;
        if !path.exists() {
            return Ok(None);
        }

        let encrypted = fs::read(&path)?;
        let plaintext = self.decrypt(&encrypted)?;
        Ok(Some(serde_json::from_slice(&plaintext)?))
    }

    fn write_sync(&self, key: &str, value: &Value) -> Result<(), StoreError> {
        let path = self.entry_path(key)?;
        let plaintext = Zeroizing::new(serde_json::to_vec(value)?);
        let encrypted = self.encrypt(&plaintext)?;
        write_atomic(&path, &encrypted)
    }
}

/// Write to a temp file, flush it to disk, then rename over the target
fn write_atomic(path: &Path, data: &[u8]) -> Result<(), StoreError> {
    let temp_path = path.with_extension("tmp");
    {
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
    }
    fs::rename(temp_path, path)?;
    Ok(())
}

/// Derive 256-bit encryption key from password using Argon2id
fn derive_key_from_password(password: &str, salt: &[u8]) -> Result<Zeroizing<[u8; 32]>, StoreError> {
    let params = Params::new(
        19 * 1024, // 19 MiB memory cost
        2,         // 2 iterations
        1,         // 1 lane
        Some(32),  // 32-byte output (AES-256)
    )
    .map_err(|e| StoreError::Encryption(format!("Invalid Argon2 params: {}", e)))?;

    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

    let mut key = Zeroizing::new([0u8; 32]);
    argon2
        .hash_password_into(password.as_bytes(), salt, &mut key[..])
        .map_err(|e| StoreError::Encryption(format!("Key derivation failed: {}", e)))?;

    Ok(key)
}

#[async_trait]
impl KeyValueStore for FileKeyValueStore {
    async fn read(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let this = self.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || this.read_sync(&key))
            .await
            .map_err(|e| StoreError::Unavailable(format!("read task failed: {}", e)))?
    }

    async fn write(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let this = self.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || this.write_sync(&key, &value))
            .await
            .map_err(|e| StoreError::Unavailable(format!("write task failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn aliases() -> Value {
        json!({ "0xowner": "0x0101010101010101010101010101010101010101010101010101010101010101" })
    }

    #[tokio::test]
    async fn test_roundtrip_encrypted() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileKeyValueStore::new(temp_dir.path(), Some("password123")).unwrap();

        store.write("aliases", aliases()).await.unwrap();
        assert_eq!(store.read("aliases").await.unwrap(), Some(aliases()));

        let raw = fs::read(temp_dir.path().join("aliases.json.enc")).unwrap();
        assert_eq!(&raw[0..8], MAGIC_HEADER);
    }

    #[tokio::test]
    async fn test_missing_key_is_absent() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileKeyValueStore::new(temp_dir.path(), None).unwrap();
        assert!(store.read("aliases").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = FileKeyValueStore::new(temp_dir.path(), Some("pw")).unwrap();
            store.write("aliases", aliases()).await.unwrap();
        }

        let reopened = FileKeyValueStore::new(temp_dir.path(), Some("pw")).unwrap();
        assert_eq!(reopened.read("aliases").await.unwrap(), Some(aliases()));
    }

    #[tokio::test]
    async fn test_invalid_key_name() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileKeyValueStore::new(temp_dir.path(), None).unwrap();

        let result = store.write("../escape", json!(1)).await;
        assert!(matches!(result, Err(StoreError::InvalidKey(_))));
    }

    #[test]
    fn test_unencrypted_mode() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileKeyValueStore::new(temp_dir.path(), None).unwrap();

        store.write_sync("aliases", &aliases()).unwrap();
        assert_eq!(store.read_sync("aliases").unwrap(), Some(aliases()));

        let data = fs::read(store.entry_path("aliases").unwrap()).unwrap();
        assert_eq!(&data[0..8], RAW_HEADER);
    }

    #[test]
    fn test_wrong_password() {
        let temp_dir = TempDir::new().unwrap();
        let store1 = FileKeyValueStore::new(temp_dir.path(), Some("correct_password")).unwrap();
        store1.write_sync("aliases", &aliases()).unwrap();

        let store2 = FileKeyValueStore::new(temp_dir.path(), Some("wrong_password")).unwrap();
        match store2.read_sync("aliases") {
            Err(StoreError::InvalidPassword) => {}
            other => panic!("Expected InvalidPassword, got {:?}", other),
        }
    }

    #[test]
    fn test_corrupted_aead_tag() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileKeyValueStore::new(temp_dir.path(), Some("password123")).unwrap();
        store.write_sync("aliases", &aliases()).unwrap();

        let path = store.entry_path("aliases").unwrap();
        let mut encrypted = fs::read(&path).unwrap();
        let len = encrypted.len();
        encrypted[len - 1] ^= 0xFF;
        fs::write(&path, &encrypted).unwrap();

        assert!(matches!(store.read_sync("aliases"), Err(StoreError::InvalidPassword)));
    }

    #[test]
    fn test_corrupted_ciphertext() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileKeyValueStore::new(temp_dir.path(), Some("password123")).unwrap();
        store.write_sync("aliases", &aliases()).unwrap();

        let path = store.entry_path("aliases").unwrap();
        let mut encrypted = fs::read(&path).unwrap();
        encrypted[HEADER_SIZE + 10] ^= 0xFF;
        fs::write(&path, &encrypted).unwrap();

        assert!(matches!(store.read_sync("aliases"), Err(StoreError::InvalidPassword)));
    }

    #[test]
    fn test_truncated_file() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileKeyValueStore::new(temp_dir.path(), Some("password123")).unwrap();
        store.write_sync("aliases", &aliases()).unwrap();

        let path = store.entry_path("aliases").unwrap();
        let encrypted = fs::read(&path).unwrap();
        fs::write(&path, &encrypted[0..20]).unwrap();

        match store.read_sync("aliases") {
            Err(StoreError::Decryption(msg)) => assert!(msg.contains("Truncated")),
            other => panic!("Expected Decryption error, got {:?}", other),
        }

        fs::write(&path, &encrypted[0..5]).unwrap();
        match store.read_sync("aliases") {
            Err(StoreError::Decryption(msg)) => assert!(msg.contains("too short")),
            other => panic!("Expected Decryption error, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_magic_header() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileKeyValueStore::new(temp_dir.path(), Some("password123")).unwrap();
        store.write_sync("aliases", &aliases()).unwrap();

        let path = store.entry_path("aliases").unwrap();
        let mut encrypted = fs::read(&path).unwrap();
        encrypted[0] = b'X';
        fs::write(&path, &encrypted).unwrap();

        match store.read_sync("aliases") {
            Err(StoreError::Decryption(msg)) => assert!(msg.contains("magic")),
            other => panic!("Expected Decryption error, got {:?}", other),
        }
    }

    #[test]
    fn test_unsupported_version() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileKeyValueStore::new(temp_dir.path(), Some("password123")).unwrap();
        store.write_sync("aliases", &aliases()).unwrap();

        let path = store.entry_path("aliases").unwrap();
        let mut encrypted = fs::read(&path).unwrap();
        encrypted[8] = 99;
        fs::write(&path, &encrypted).unwrap();

        match store.read_sync("aliases") {
            Err(StoreError::Decryption(msg)) => assert!(msg.contains("version")),
            other => panic!("Expected Decryption error, got {:?}", other),
        }
    }

    #[test]
    fn test_salt_and_nonce_uniqueness() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileKeyValueStore::new(temp_dir.path(), Some("password123")).unwrap();

        let encrypted1 = store.encrypt(b"same data").unwrap();
        let encrypted2 = store.encrypt(b"same data").unwrap();

        assert_ne!(&encrypted1[9..9 + SALT_LEN], &encrypted2[9..9 + SALT_LEN]);
        assert_ne!(&encrypted1[9 + SALT_LEN..HEADER_SIZE], &encrypted2[9 + SALT_LEN..HEADER_SIZE]);
        assert_ne!(encrypted1, encrypted2);
    }

    #[test]
    fn test_encrypted_store_rejects_unencrypted_file() {
        let temp_dir = TempDir::new().unwrap();
        let plain = FileKeyValueStore::new(temp_dir.path(), None).unwrap();
        plain.write_sync("aliases", &aliases()).unwrap();

        let encrypted = FileKeyValueStore::new(temp_dir.path(), Some("password")).unwrap();
        match encrypted.read_sync("aliases") {
            Err(StoreError::Decryption(msg)) => assert!(msg.contains("unencrypted")),
            other => panic!("Expected Decryption error, got {:?}", other),
        }
    }
}
