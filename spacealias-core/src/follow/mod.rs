//! Follow registry
//!
//! Keeps the accounts the connected owner follows and the followers of a
//! space, and toggles follow state through the owner's delegated session.
//! Follow and unfollow messages are signed by the alias wallet with payload
//! `{from: owner, space}`; the hub rejects them unless the alias is bound.

mod cache;

pub use cache::RelationCache;

use crate::clock::Clock;
use crate::config::{ErrorPolicy, FollowConfig};
use crate::errors::{AliasError, AliasResult};
use crate::guard::BusyGuard;
use crate::hub::{Action, FollowPayload, FollowRelation, HubMutation, HubQuery, Query, UnsignedMessage};
use crate::identity::Wallet;
use crate::metrics::{record_counter, FOLLOW_SUBMISSIONS};
use crate::notify::{Notifier, Severity, SOMETHING_WENT_WRONG};
use crate::session::AliasSession;
use crate::subscription::SpaceSubscription;
use crate::types::{Address, SpaceId};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Result of a follow toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowOutcome {
    Followed,
    Unfollowed,
}

/// Result of a follow button press
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickOutcome {
    /// The owner's connection is still being established
    Ignored,
    /// No connected account; the caller should prompt for one
    AccountRequired,
    Completed(FollowOutcome),
}

pub struct FollowRegistry {
    session: Arc<AliasSession>,
    query: Arc<dyn HubQuery>,
    mutation: Arc<dyn HubMutation>,
    subscriptions: Arc<dyn SpaceSubscription>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    config: FollowConfig,
    cache: RelationCache,
}

impl FollowRegistry {
    pub fn new(
        session: Arc<AliasSession>,
        query: Arc<dyn HubQuery>,
        mutation: Arc<dyn HubMutation>,
        subscriptions: Arc<dyn SpaceSubscription>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        config: FollowConfig,
    ) -> Self {
        Self {
            session,
            query,
            mutation,
            subscriptions,
            notifier,
            clock,
            config,
            cache: RelationCache::new(),
        }
    }

    pub fn cache(&self) -> &RelationCache {
        &self.cache
    }

    fn authenticated_account(&self) -> Option<Address> {
        let identity = self.session.owner_identity();
        if identity.is_authenticated() {
            identity.account()
        } else {
            None
        }
    }

    /// Reload the spaces the connected owner follows
    ///
    /// Does nothing without an authenticated account. On failure the
    /// previous collection is kept.
    pub async fn load_follows(&self, limit: Option<u32>) {
        let Some(owner) = self.authenticated_account() else {
            return;
        };
        let _loading = BusyGuard::set(&self.cache.loading_follows);

        let query = Query::new(limit.unwrap_or(self.config.load_limit)).follower_in(vec![owner.clone()]);
        match self.query.follows(&query).await {
            Ok(relations) => {
                debug!(owner = %owner, count = relations.len(), "follows loaded");
                self.cache.replace_following(relations).await;
            }
            Err(e) => error!(owner = %owner, error = %e, "failed to load follows"),
        }
    }

    /// Reload the followers of `space`
    pub async fn load_followers(&self, space: &SpaceId, limit: Option<u32>) {
        let _loading = BusyGuard::set(&self.cache.loading_followers);

        let query =
            Query::new(limit.unwrap_or(self.config.followers_limit)).space_in(vec![space.clone()]);
        match self.query.follows(&query).await {
            Ok(relations) => {
                debug!(space = %space, count = relations.len(), "space followers loaded");
                self.cache.replace_space_followers(relations).await;
            }
            Err(e) => error!(space = %space, error = %e, "failed to load space followers"),
        }
    }

    /// Follow `space`, or unfollow it if the owner already follows it
    ///
    /// Registers a new alias when the current one is not valid, up to
    /// `max_registration_retries` times. Errors are logged (and notified
    /// under [`ErrorPolicy::Notify`]) before being returned.
    pub async fn follow(&self, space: &SpaceId) -> AliasResult<FollowOutcome> {
        let _busy = self.cache.mark_busy(space);

        let result = self.toggle(space).await;
        if let Err(e) = &result {
            error!(space = %space, error = %e, "follow failed");
            if self.config.error_policy == ErrorPolicy::Notify {
                self.notifier.notify(Severity::Error, SOMETHING_WENT_WRONG);
            }
        }
        result
    }

    /// Follow button entry point
    pub async fn click_follow(&self, space: &SpaceId) -> AliasResult<ClickOutcome> {
        let identity = self.session.owner_identity();
        if identity.is_auth_loading() {
            return Ok(ClickOutcome::Ignored);
        }
        if identity.account().is_none() {
            return Ok(ClickOutcome::AccountRequired);
        }
        self.follow(space).await.map(ClickOutcome::Completed)
    }

    async fn toggle(&self, space: &SpaceId) -> AliasResult<FollowOutcome> {
        let owner = self
            .session
            .owner_identity()
            .account()
            .ok_or(AliasError::Unauthenticated)?;
        let wallet = self.ensure_session(&owner).await?;

        let outcome = if self.cache.contains(space, &owner).await {
            if self.subscriptions.is_subscribed(space).await? {
                self.subscriptions.toggle(space).await?;
                debug!(space = %space, "unsubscribed before unfollow");
            }
            self.submit(&owner, &wallet, Action::Unfollow, space).await?;
            FollowOutcome::Unfollowed
        } else {
            self.submit(&owner, &wallet, Action::Follow, space).await?;
            FollowOutcome::Followed
        };
        info!(owner = %owner, space = %space, outcome = ?outcome, "follow state changed");

        self.load_follows(None).await;
        Ok(outcome)
    }

    async fn ensure_session(&self, owner: &Address) -> AliasResult<Wallet> {
        let mut state = self.session.check_validity(Some(owner)).await?;
        let mut registrations = 0;

        loop {
            if state.is_valid() {
                if let Some(wallet) = self.session.derive_wallet(owner).await? {
                    return Ok(wallet);
                }
            }
            if registrations >= self.config.max_registration_retries {
                return Err(AliasError::InvalidSessionState { owner: owner.clone() });
            }

            registrations += 1;
            debug!(owner = %owner, attempt = registrations, "alias not valid, registering");
            self.session.register(owner).await?;
            state = self.session.state(owner).await;
        }
    }

    async fn submit(
        &self,
        owner: &Address,
        wallet: &Wallet,
        action: Action,
        space: &SpaceId,
    ) -> AliasResult<()> {
        let payload = FollowPayload { from: owner.clone(), space: space.clone() };
        let message = UnsignedMessage::new(wallet.address(), action, &payload, self.clock.now_secs())?
            .sign_with(wallet)?;
        self.mutation.submit(message).await?;
        record_counter(FOLLOW_SUBMISSIONS, 1);
        Ok(())
    }

    pub async fn following(&self) -> Vec<FollowRelation> {
        self.cache.following().await
    }

    pub async fn space_followers(&self) -> Vec<FollowRelation> {
        self.cache.space_followers().await
    }

    /// Spaces the connected owner follows, as last loaded
    pub async fn following_spaces(&self) -> Vec<SpaceId> {
        let Some(owner) = self.session.owner_identity().account() else {
            return Vec::new();
        };
        self.cache
            .following()
            .await
            .into_iter()
            .filter(|f| f.follower == owner)
            .map(|f| f.space)
            .collect()
    }

    pub async fn is_following(&self, space: &SpaceId) -> bool {
        match self.session.owner_identity().account() {
            Some(owner) => self.cache.contains(space, &owner).await,
            None => false,
        }
    }

    /// Most recently started follow toggle still in flight
    pub fn loading_follow(&self) -> Option<SpaceId> {
        self.cache.busy_space()
    }

    /// Whether a follow toggle on `space` is in flight
    pub fn is_loading_follow(&self, space: &SpaceId) -> bool {
        self.cache.is_busy(space)
    }

    pub fn is_loading_follows(&self) -> bool {
        self.cache.is_loading_follows()
    }

    pub fn is_loading_followers(&self) -> bool {
        self.cache.is_loading_followers()
    }
}
