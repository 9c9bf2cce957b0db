//! Test fixtures
//!
//! [`TestHarness`] assembles an [`AliasContext`] over in-memory collaborators
//! and keeps handles to each of them for fault injection and inspection.

use crate::alias_store::MemoryKeyValueStore;
use crate::clock::ManualClock;
use crate::config::Config;
use crate::context::AliasContext;
use crate::follow::FollowRegistry;
use crate::hub::InMemoryHub;
use crate::identity::LocalOwner;
use crate::notify::RecordingNotifier;
use crate::session::AliasSession;
use crate::subscription::InMemorySubscriptions;
use crate::types::Address;
use std::sync::Arc;

pub const DAY: u64 = 24 * 60 * 60;

/// Start time of the manual clock
pub const START_SECS: u64 = 20_000 * DAY;

pub struct TestHarness {
    pub clock: Arc<ManualClock>,
    pub backend: Arc<MemoryKeyValueStore>,
    pub hub: Arc<InMemoryHub>,
    pub owner: Arc<LocalOwner>,
    pub notifier: Arc<RecordingNotifier>,
    pub subscriptions: Arc<InMemorySubscriptions>,
    pub context: AliasContext,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Harness with a connected owner; panics if `config` is invalid
    pub fn with_config(config: Config) -> Self {
        let clock = Arc::new(ManualClock::new(START_SECS));
        let backend = Arc::new(MemoryKeyValueStore::new());
        let hub = Arc::new(InMemoryHub::new(clock.clone(), config.alias.validity_window));
        let owner = Arc::new(LocalOwner::generate());
        let notifier = Arc::new(RecordingNotifier::new());
        let subscriptions = Arc::new(InMemorySubscriptions::new());

        let context = AliasContext::builder(config)
            .backend(backend.clone())
            .hub(hub.clone())
            .owner(owner.clone())
            .notifier(notifier.clone())
            .subscriptions(subscriptions.clone())
            .clock(clock.clone())
            .build()
            .expect("test harness config must be valid");

        Self { clock, backend, hub, owner, notifier, subscriptions, context }
    }

    pub fn owner_address(&self) -> Address {
        self.owner.address()
    }

    pub fn session(&self) -> &Arc<AliasSession> {
        self.context.session()
    }

    pub fn follows(&self) -> &FollowRegistry {
        self.context.follows()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
