//! Wallet module
//!
//! Ed25519 signing identity used for alias keys (and for local owner
//! identities in tests and the demo).
//!
//! The private key is persisted as `0x` + 64 hex chars. The address is
//! `0x` + hex of the 32-byte verifying key, so it is always a deterministic
//! function of the private key and never needs to be stored.
//!
//! Security: the signing key is zeroized on drop (ed25519-dalek `zeroize`),
//! and intermediate secret buffers are wrapped in [`Zeroizing`].

use super::KeyError;
use crate::types::Address;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;
use std::fmt;
use zeroize::Zeroizing;

const SECRET_LEN: usize = 32;

/// Ed25519 signing identity
#[derive(Clone)]
pub struct Wallet {
    signing_key: SigningKey,
}

impl Wallet {
    /// Generate a fresh random wallet
    pub fn generate() -> Self {
        let mut seed = Zeroizing::new([0u8; SECRET_LEN]);
        rand::rng().fill_bytes(&mut seed[..]);
        Wallet { signing_key: SigningKey::from_bytes(&seed) }
    }

    /// Restore a wallet from its hex-encoded private key (`0x` prefix optional)
    pub fn from_hex(private_key: &str) -> Result<Self, KeyError> {
        let stripped = private_key.strip_prefix("0x").unwrap_or(private_key);
        let bytes = Zeroizing::new(
            hex::decode(stripped).map_err(|e| KeyError::InvalidHex(e.to_string()))?,
        );

        if bytes.len() != SECRET_LEN {
            return Err(KeyError::InvalidLength(bytes.len()));
        }

        let mut seed = Zeroizing::new([0u8; SECRET_LEN]);
        seed.copy_from_slice(&bytes);
        Ok(Wallet { signing_key: SigningKey::from_bytes(&seed) })
    }

    /// Hex-encoded private key, as persisted by the alias store
    pub fn to_hex(&self) -> Zeroizing<String> {
        let secret = Zeroizing::new(self.signing_key.to_bytes());
        Zeroizing::new(format!("0x{}", hex::encode(&secret[..])))
    }

    /// Address derived from the verifying key
    pub fn address(&self) -> Address {
        address_from_public_key(&self.public_key())
    }

    /// Raw verifying key bytes
    pub fn public_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Sign a message, returning the 64-byte signature
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.signing_key.sign(message).to_bytes().to_vec()
    }

    /// Verify a signature against a raw public key
    pub fn verify(public_key: &[u8], message: &[u8], signature: &[u8]) -> bool {
        let Ok(pk_bytes) = <[u8; 32]>::try_from(public_key) else {
            return false;
        };
        let Ok(verifying_key) = VerifyingKey::from_bytes(&pk_bytes) else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(signature) else {
            return false;
        };
        verifying_key.verify(message, &signature).is_ok()
    }
}

/// Address for a raw Ed25519 public key
pub fn address_from_public_key(public_key: &[u8]) -> Address {
    Address(format!("0x{}", hex::encode(public_key)))
}

impl fmt::Debug for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wallet")
            .field("address", &self.address())
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_is_deterministic_from_private_key() {
        let wallet = Wallet::generate();
        let restored = Wallet::from_hex(&wallet.to_hex()).unwrap();

        assert_eq!(wallet.address(), restored.address());
        assert_eq!(wallet.public_key(), restored.public_key());
    }

    #[test]
    fn test_hex_format() {
        let wallet = Wallet::generate();
        let hex_key = wallet.to_hex();

        assert!(hex_key.starts_with("0x"));
        assert_eq!(hex_key.len(), 2 + 64);
        assert!(wallet.address().as_str().starts_with("0x"));
    }

    #[test]
    fn test_from_hex_without_prefix() {
        let wallet = Wallet::generate();
        let bare = wallet.to_hex().trim_start_matches("0x").to_string();
        assert_eq!(Wallet::from_hex(&bare).unwrap().address(), wallet.address());
    }

    #[test]
    fn test_generated_wallets_differ() {
        assert_ne!(Wallet::generate().address(), Wallet::generate().address());
    }

    #[test]
    fn test_invalid_hex_rejected() {
        assert!(matches!(Wallet::from_hex("0xnothex"), Err(KeyError::InvalidHex(_))));
        assert!(matches!(Wallet::from_hex("0xabcd"), Err(KeyError::InvalidLength(2))));
    }

    #[test]
    fn test_sign_and_verify() {
        let wallet = Wallet::generate();
        let sig = wallet.sign(b"follow balancer.eth");

        assert_eq!(sig.len(), 64);
        assert!(Wallet::verify(&wallet.public_key(), b"follow balancer.eth", &sig));
        assert!(!Wallet::verify(&wallet.public_key(), b"unfollow balancer.eth", &sig));
        assert!(!Wallet::verify(&Wallet::generate().public_key(), b"follow balancer.eth", &sig));
        assert!(!Wallet::verify(&[0u8; 3], b"follow balancer.eth", &sig));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let wallet = Wallet::generate();
        let debug = format!("{:?}", wallet);
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains(wallet.to_hex().trim_start_matches("0x")));
    }
}
