//! Identity module
//!
//! - [`Wallet`]: Ed25519 signing identity, used for alias keys
//! - [`OwnerIdentity`]: the primary-account collaborator (connection state and
//!   the owner's own signature, used only to register aliases)
//! - [`LocalOwner`]: wallet-backed owner identity for tests and the demo

mod owner;
mod wallet;

pub use owner::{LocalOwner, OwnerIdentity};
pub use wallet::{address_from_public_key, Wallet};

use thiserror::Error;

/// Key handling errors
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("Invalid hex key: {0}")]
    InvalidHex(String),

    #[error("Invalid key length: expected 32 bytes, got {0}")]
    InvalidLength(usize),

    #[error("Signature request rejected: {0}")]
    SigningRejected(String),

    #[error("No connected account")]
    NotConnected,
}
