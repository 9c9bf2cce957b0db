//! Alias store
//!
//! Persistent mapping from owner address to alias private key, kept under a
//! single logical key (`aliases`) of a [`KeyValueStore`] backend.
//!
//! The mapping is overwritten per owner, never merged, and every `set` is
//! written through to the backend before it returns.

use crate::identity::Wallet;
use crate::types::Address;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

pub mod file;
pub mod memory;

pub use file::FileKeyValueStore;
pub use memory::MemoryKeyValueStore;

/// Logical key holding the owner -> private key mapping
pub const ALIASES_KEY: &str = "aliases";

/// Storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Decryption error: {0}")]
    Decryption(String),

    #[error("Invalid password")]
    InvalidPassword,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Corrupt alias entry for {owner}: {reason}")]
    CorruptEntry { owner: Address, reason: String },
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Durable JSON key-value storage
///
/// Implementations must make a completed `write` survive a process restart.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`, if any
    async fn read(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Replace the value stored under `key`
    async fn write(&self, key: &str, value: Value) -> Result<(), StoreError>;
}

/// Owner -> alias key mapping over a [`KeyValueStore`]
pub struct AliasStore {
    backend: Arc<dyn KeyValueStore>,
    /// Serializes read-modify-write of the shared mapping
    write_lock: Mutex<()>,
}

impl AliasStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend, write_lock: Mutex::new(()) }
    }

    async fn load_map(&self) -> Result<BTreeMap<String, String>, StoreError> {
        match self.backend.read(ALIASES_KEY).await? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(BTreeMap::new()),
        }
    }

    /// Alias wallet stored for `owner`
    pub async fn get(&self, owner: &Address) -> Result<Option<Wallet>, StoreError> {
        let map = self.load_map().await?;
        match map.get(owner.as_str()) {
            Some(private_key) => Wallet::from_hex(private_key)
                .map(Some)
                .map_err(|e| StoreError::CorruptEntry { owner: owner.clone(), reason: e.to_string() }),
            None => Ok(None),
        }
    }

    /// Store `wallet` as the alias for `owner`, replacing any previous one
    pub async fn set(&self, owner: &Address, wallet: &Wallet) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;

        let mut map = self.load_map().await?;
        map.insert(owner.0.clone(), wallet.to_hex().to_string());
        self.backend.write(ALIASES_KEY, serde_json::to_value(&map)?).await?;

        debug!(owner = %owner, alias = %wallet.address(), "alias key persisted");
        Ok(())
    }

    /// Generate a fresh alias wallet for `owner` and persist it
    pub async fn generate(&self, owner: &Address) -> Result<Wallet, StoreError> {
        let wallet = Wallet::generate();
        self.set(owner, &wallet).await?;
        Ok(wallet)
    }

    /// Owners that currently have an alias key
    pub async fn owners(&self) -> Result<Vec<Address>, StoreError> {
        Ok(self.load_map().await?.into_keys().map(Address).collect())
    }
}
