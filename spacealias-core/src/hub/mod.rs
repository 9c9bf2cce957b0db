//! Hub transport interfaces
//!
//! The hub is the server holding alias bindings and follow relations. The
//! client reads through [`HubQuery`] and writes signed messages through
//! [`HubMutation`]. Timeouts and retry policy belong to the implementations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod memory;
pub mod message;
pub mod query;

pub use memory::InMemoryHub;
pub use message::{Action, AliasPayload, FollowPayload, SignedMessage, UnsignedMessage};
pub use query::{AliasRecord, FollowRelation, Query, QueryFilter};

/// Transport failures (query or mutation)
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Query failed: {0}")]
    Query(String),

    #[error("Submission rejected: {0}")]
    Rejected(String),

    #[error("Transport unavailable: {0}")]
    Unavailable(String),

    #[error("Encoding error: {0}")]
    Encoding(String),
}

/// Acknowledgement for an accepted submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub id: String,
}

/// Read side of the hub
#[async_trait]
pub trait HubQuery: Send + Sync {
    /// Alias bindings matching `query`, newest first
    async fn aliases(&self, query: &Query) -> Result<Vec<AliasRecord>, TransportError>;

    /// Follow relations matching `query`, newest first
    async fn follows(&self, query: &Query) -> Result<Vec<FollowRelation>, TransportError>;
}

/// Write side of the hub
#[async_trait]
pub trait HubMutation: Send + Sync {
    /// Submit a signed message
    async fn submit(&self, message: SignedMessage) -> Result<Receipt, TransportError>;
}
