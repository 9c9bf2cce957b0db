//! Delegated-signing sessions and the follow registry built on them
//!
//! An owner account registers an ephemeral alias key once; the alias then
//! signs follow and unfollow messages on the owner's behalf. See
//! [`context::AliasContext`] for the entry point.

pub mod alias_store;
pub mod clock;
pub mod config;
pub mod context;
pub mod errors;
pub mod follow;
pub mod guard;
pub mod hub;
pub mod identity;
pub mod logging;
pub mod metrics;
pub mod notify;
pub mod session;
pub mod subscription;
pub mod test_utils;
pub mod types;

pub use config::Config;
pub use context::{AliasContext, AliasContextBuilder};
pub use errors::{AliasError, AliasResult};
pub use follow::{ClickOutcome, FollowOutcome, FollowRegistry};
pub use guard::ActionGuard;
pub use logging::{init_logging, LogLevel};
pub use session::{AliasSession, AliasSessionState, SessionState};
pub use types::{Address, SpaceId};
