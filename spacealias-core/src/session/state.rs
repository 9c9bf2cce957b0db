//! Session validity state

use crate::types::Address;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Server-side validity of an owner's alias, as last observed by a check
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No check has run since start or the last invalidation
    #[default]
    Unchecked,
    Valid,
    Invalid,
}

impl SessionState {
    pub fn is_valid(&self) -> bool {
        matches!(self, SessionState::Valid)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Unchecked => "unchecked",
            SessionState::Valid => "valid",
            SessionState::Invalid => "invalid",
        };
        f.write_str(name)
    }
}

/// Derived view of an owner's delegated session; never persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasSessionState {
    pub owner: Address,
    pub alias: Address,
    pub state: SessionState,
}
