//! Primary identity (owner account)

use super::{KeyError, Wallet};
use crate::types::Address;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};

/// The user's primary signing account
///
/// Only used to sign alias registrations; delegated actions are signed by
/// the alias wallet instead.
#[async_trait]
pub trait OwnerIdentity: Send + Sync {
    /// Currently connected account, if any
    fn account(&self) -> Option<Address>;

    /// Whether the connection has completed authentication
    fn is_authenticated(&self) -> bool;

    /// Whether a connection attempt is still in progress
    fn is_auth_loading(&self) -> bool {
        false
    }

    /// Public key matching `account()`
    fn public_key(&self) -> Option<Vec<u8>>;

    /// Ask the owner to sign `message`
    ///
    /// In a wallet UI this is the interactive prompt; it may be rejected.
    async fn sign(&self, message: &[u8]) -> Result<Vec<u8>, KeyError>;
}

/// Owner identity backed by a local wallet
pub struct LocalOwner {
    wallet: Wallet,
    connected: AtomicBool,
    auth_loading: AtomicBool,
    reject_signatures: AtomicBool,
}

impl LocalOwner {
    /// Connected owner with the given wallet
    pub fn new(wallet: Wallet) -> Self {
        Self {
            wallet,
            connected: AtomicBool::new(true),
            auth_loading: AtomicBool::new(false),
            reject_signatures: AtomicBool::new(false),
        }
    }

    /// Connected owner with a freshly generated wallet
    pub fn generate() -> Self {
        Self::new(Wallet::generate())
    }

    /// Address of the underlying wallet, regardless of connection state
    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    pub fn connect(&self) {
        self.connected.store(true, Ordering::SeqCst);
    }

    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    pub fn set_auth_loading(&self, loading: bool) {
        self.auth_loading.store(loading, Ordering::SeqCst);
    }

    /// Make subsequent signature requests fail, as if the user declined
    pub fn set_reject_signatures(&self, reject: bool) {
        self.reject_signatures.store(reject, Ordering::SeqCst);
    }
}

#[async_trait]
impl OwnerIdentity for LocalOwner {
    fn account(&self) -> Option<Address> {
        self.connected
            .load(Ordering::SeqCst)
            .then(|| self.wallet.address())
    }

    fn is_authenticated(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && !self.auth_loading.load(Ordering::SeqCst)
    }

    fn is_auth_loading(&self) -> bool {
        self.auth_loading.load(Ordering::SeqCst)
    }

    fn public_key(&self) -> Option<Vec<u8>> {
        self.connected
            .load(Ordering::SeqCst)
            .then(|| self.wallet.public_key().to_vec())
    }

    async fn sign(&self, message: &[u8]) -> Result<Vec<u8>, KeyError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(KeyError::NotConnected);
        }
        if self.reject_signatures.load(Ordering::SeqCst) {
            return Err(KeyError::SigningRejected("user denied message signature".to_string()));
        }
        Ok(self.wallet.sign(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connected_owner_signs() {
        let owner = LocalOwner::generate();
        assert_eq!(owner.account(), Some(owner.address()));
        assert!(owner.is_authenticated());

        let sig = owner.sign(b"alias").await.unwrap();
        let pk = owner.public_key().unwrap();
        assert!(Wallet::verify(&pk, b"alias", &sig));
    }

    #[tokio::test]
    async fn test_disconnected_owner() {
        let owner = LocalOwner::generate();
        owner.disconnect();

        assert!(owner.account().is_none());
        assert!(!owner.is_authenticated());
        assert!(matches!(owner.sign(b"alias").await, Err(KeyError::NotConnected)));
    }

    #[tokio::test]
    async fn test_rejected_signature() {
        let owner = LocalOwner::generate();
        owner.set_reject_signatures(true);
        assert!(matches!(owner.sign(b"alias").await, Err(KeyError::SigningRejected(_))));
    }

    #[test]
    fn test_auth_loading_is_not_authenticated() {
        let owner = LocalOwner::generate();
        owner.set_auth_loading(true);
        assert!(owner.is_auth_loading());
        assert!(!owner.is_authenticated());
    }
}
