//! Session-scoped context
//!
//! Owns the shared state of one client session (alias store, validity
//! states, relation cache) and wires the components to their collaborators.
//! Drop the context to end the session.

use crate::alias_store::{AliasStore, KeyValueStore};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::errors::{AliasError, AliasResult};
use crate::follow::FollowRegistry;
use crate::guard::ActionGuard;
use crate::hub::{HubMutation, HubQuery};
use crate::identity::OwnerIdentity;
use crate::notify::{LogNotifier, Notifier};
use crate::session::AliasSession;
use crate::subscription::{InMemorySubscriptions, SpaceSubscription};
use std::sync::Arc;
use tracing::debug;

pub struct AliasContext {
    config: Config,
    store: Arc<AliasStore>,
    session: Arc<AliasSession>,
    guard: ActionGuard,
    follows: FollowRegistry,
}

impl AliasContext {
    pub fn builder(config: Config) -> AliasContextBuilder {
        AliasContextBuilder::new(config)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<AliasStore> {
        &self.store
    }

    pub fn session(&self) -> &Arc<AliasSession> {
        &self.session
    }

    pub fn guard(&self) -> &ActionGuard {
        &self.guard
    }

    pub fn follows(&self) -> &FollowRegistry {
        &self.follows
    }
}

/// Builder for [`AliasContext`]
///
/// The storage backend, both hub transports and the owner identity are
/// required. Notifications default to the log, subscriptions to an
/// in-memory set and time to the system clock.
pub struct AliasContextBuilder {
    config: Config,
    backend: Option<Arc<dyn KeyValueStore>>,
    query: Option<Arc<dyn HubQuery>>,
    mutation: Option<Arc<dyn HubMutation>>,
    owner: Option<Arc<dyn OwnerIdentity>>,
    notifier: Option<Arc<dyn Notifier>>,
    subscriptions: Option<Arc<dyn SpaceSubscription>>,
    clock: Option<Arc<dyn Clock>>,
}

impl AliasContextBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            backend: None,
            query: None,
            mutation: None,
            owner: None,
            notifier: None,
            subscriptions: None,
            clock: None,
        }
    }

    pub fn backend(mut self, backend: Arc<dyn KeyValueStore>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Use one value for both transports
    pub fn hub<H>(mut self, hub: Arc<H>) -> Self
    where
        H: HubQuery + HubMutation + 'static,
    {
        let query: Arc<dyn HubQuery> = hub.clone();
        let mutation: Arc<dyn HubMutation> = hub;
        self.query = Some(query);
        self.mutation = Some(mutation);
        self
    }

    pub fn query(mut self, query: Arc<dyn HubQuery>) -> Self {
        self.query = Some(query);
        self
    }

    pub fn mutation(mut self, mutation: Arc<dyn HubMutation>) -> Self {
        self.mutation = Some(mutation);
        self
    }

    pub fn owner(mut self, owner: Arc<dyn OwnerIdentity>) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn subscriptions(mut self, subscriptions: Arc<dyn SpaceSubscription>) -> Self {
        self.subscriptions = Some(subscriptions);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> AliasResult<AliasContext> {
        self.config.validate().map_err(|e| AliasError::Config(e.to_string()))?;

        let backend = self.backend.ok_or_else(|| missing("storage backend"))?;
        let query = self.query.ok_or_else(|| missing("query transport"))?;
        let mutation = self.mutation.ok_or_else(|| missing("mutation transport"))?;
        let owner = self.owner.ok_or_else(|| missing("owner identity"))?;
        let notifier = self.notifier.unwrap_or_else(|| Arc::new(LogNotifier));
        let subscriptions =
            self.subscriptions.unwrap_or_else(|| Arc::new(InMemorySubscriptions::new()));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        let store = Arc::new(AliasStore::new(backend));
        let session = Arc::new(AliasSession::new(
            store.clone(),
            query.clone(),
            mutation.clone(),
            owner,
            clock.clone(),
            self.config.alias.validity_window,
        ));
        let guard = ActionGuard::new(session.clone(), notifier.clone());
        let follows = FollowRegistry::new(
            session.clone(),
            query,
            mutation,
            subscriptions,
            notifier,
            clock,
            self.config.follow.clone(),
        );

        debug!(
            validity_window = ?self.config.alias.validity_window,
            error_policy = ?self.config.follow.error_policy,
            "alias context ready"
        );
        Ok(AliasContext { config: self.config, store, session, guard, follows })
    }
}

fn missing(what: &str) -> AliasError {
    AliasError::Config(format!("{} is required", what))
}
