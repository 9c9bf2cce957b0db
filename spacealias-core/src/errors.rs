//! Error types for delegated-signing operations

use crate::alias_store::StoreError;
use crate::hub::TransportError;
use crate::identity::KeyError;
use crate::types::Address;
use thiserror::Error;

/// Result type for alias operations
pub type AliasResult<T> = Result<T, AliasError>;

/// Errors surfaced by the alias store, session, guard and follow registry
#[derive(Error, Debug)]
pub enum AliasError {
    /// Local persistence inaccessible (or holding an unusable entry)
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[from] StoreError),

    /// Query or mutation collaborator failed
    #[error("Transport failure: {0}")]
    TransportFailure(#[from] TransportError),

    /// No valid delegated session could be established
    #[error("No valid alias session for {owner}")]
    InvalidSessionState { owner: Address },

    /// No connected owner account
    #[error("No authenticated owner account")]
    Unauthenticated,

    /// Registration requested for an owner other than the connected account
    #[error("Owner mismatch: registering for {requested}, connected as {connected}")]
    OwnerMismatch { requested: Address, connected: Address },

    /// Signing failed or was rejected
    #[error("Key error: {0}")]
    Key(#[from] KeyError),

    /// Context could not be assembled
    #[error("Configuration error: {0}")]
    Config(String),
}
