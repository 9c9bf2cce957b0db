//! In-process hub for testing and demos
//!
//! Implements the server rules the client depends on:
//! - every submission must carry a valid signature
//! - `alias` binds the signer (owner) to `payload.alias`
//! - `follow`/`unfollow` must be signed by an alias bound to `payload.from`
//!   inside the validity window
//! - at most one relation per `(space, follower)`; duplicate follows and
//!   unfollows of missing relations are acknowledged without change
//!
//! Faults can be injected to exercise client error paths.

use super::{
    Action, AliasPayload, AliasRecord, FollowPayload, FollowRelation, HubMutation, HubQuery, Query,
    Receipt, SignedMessage, TransportError,
};
use crate::clock::Clock;
use crate::types::Address;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Default)]
struct HubState {
    aliases: Vec<AliasRecord>,
    follows: Vec<FollowRelation>,
    submissions: Vec<SignedMessage>,
    alias_queries: usize,
    follow_queries: usize,
}

/// In-memory hub
pub struct InMemoryHub {
    state: Mutex<HubState>,
    clock: Arc<dyn Clock>,
    validity_window: Duration,
    failing_queries: AtomicUsize,
    fail_submissions: AtomicBool,
    drop_alias_bindings: AtomicBool,
    ignore_alias_filters: AtomicBool,
}

impl InMemoryHub {
    pub fn new(clock: Arc<dyn Clock>, validity_window: Duration) -> Self {
        Self {
            state: Mutex::new(HubState::default()),
            clock,
            validity_window,
            failing_queries: AtomicUsize::new(0),
            fail_submissions: AtomicBool::new(false),
            drop_alias_bindings: AtomicBool::new(false),
            ignore_alias_filters: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        // State is plain data; a panic mid-update cannot leave it half-written
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fail the next `n` queries with a transport error
    pub fn fail_next_queries(&self, n: usize) {
        self.failing_queries.store(n, Ordering::SeqCst);
    }

    /// Fail every submission with a transport error
    pub fn set_fail_submissions(&self, fail: bool) {
        self.fail_submissions.store(fail, Ordering::SeqCst);
    }

    /// Acknowledge `alias` submissions without recording the binding
    pub fn set_drop_alias_bindings(&self, drop: bool) {
        self.drop_alias_bindings.store(drop, Ordering::SeqCst);
    }

    /// Answer alias queries with every binding, ignoring the filter
    pub fn set_ignore_alias_filters(&self, ignore: bool) {
        self.ignore_alias_filters.store(ignore, Ordering::SeqCst);
    }

    /// Seed a binding directly
    pub fn insert_alias_record(&self, record: AliasRecord) {
        self.lock().aliases.push(record);
    }

    /// Seed a relation directly
    pub fn insert_follow(&self, relation: FollowRelation) {
        self.lock().follows.push(relation);
    }

    pub fn alias_records(&self) -> Vec<AliasRecord> {
        self.lock().aliases.clone()
    }

    pub fn follow_relations(&self) -> Vec<FollowRelation> {
        self.lock().follows.clone()
    }

    /// Every message received, accepted or not
    pub fn submissions(&self) -> Vec<SignedMessage> {
        self.lock().submissions.clone()
    }

    pub fn submissions_for(&self, action: Action) -> Vec<SignedMessage> {
        self.lock()
            .submissions
            .iter()
            .filter(|m| m.action == action)
            .cloned()
            .collect()
    }

    pub fn alias_query_count(&self) -> usize {
        self.lock().alias_queries
    }

    pub fn follow_query_count(&self) -> usize {
        self.lock().follow_queries
    }

    fn take_query_fault(&self) -> Result<(), TransportError> {
        let injected = self
            .failing_queries
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(TransportError::Query("injected query failure".to_string()));
        }
        Ok(())
    }

    fn window_start(&self) -> u64 {
        self.clock.now_secs().saturating_sub(self.validity_window.as_secs())
    }

    fn apply(&self, message: &SignedMessage) -> Result<(), TransportError> {
        let now = self.clock.now_secs();

        match message.action {
            Action::Alias => {
                let payload: AliasPayload = message.payload_as()?;
                if self.drop_alias_bindings.load(Ordering::SeqCst) {
                    debug!(owner = %message.address, "dropping alias binding");
                    return Ok(());
                }
                self.lock().aliases.push(AliasRecord {
                    address: message.address.clone(),
                    alias: payload.alias,
                    created: now,
                });
            }
            Action::Follow | Action::Unfollow => {
                let payload: FollowPayload = message.payload_as()?;
                self.check_delegation(&payload.from, &message.address)?;

                let mut state = self.lock();
                let exists = state
                    .follows
                    .iter()
                    .any(|f| f.space == payload.space && f.follower == payload.from);

                if message.action == Action::Follow {
                    if !exists {
                        state.follows.push(FollowRelation {
                            space: payload.space,
                            follower: payload.from,
                            created: now,
                        });
                    }
                } else {
                    state
                        .follows
                        .retain(|f| !(f.space == payload.space && f.follower == payload.from));
                }
            }
        }
        Ok(())
    }

    fn check_delegation(&self, owner: &Address, alias: &Address) -> Result<(), TransportError> {
        let window_start = self.window_start();
        let authorized = self
            .lock()
            .aliases
            .iter()
            .any(|r| &r.address == owner && &r.alias == alias && r.created > window_start);

        if authorized {
            Ok(())
        } else {
            Err(TransportError::Rejected(format!("{} is not a valid alias of {}", alias, owner)))
        }
    }
}

/// Newest first: later `created` wins, and later insertion breaks ties
fn newest_first<T: Clone>(items: &[T], created: impl Fn(&T) -> u64, first: u32) -> Vec<T> {
    let mut result: Vec<T> = items.iter().rev().cloned().collect();
    result.sort_by(|a, b| created(b).cmp(&created(a)));
    result.truncate(first as usize);
    result
}

#[async_trait]
impl HubQuery for InMemoryHub {
    async fn aliases(&self, query: &Query) -> Result<Vec<AliasRecord>, TransportError> {
        tokio::task::yield_now().await;
        self.take_query_fault()?;

        let ignore_filters = self.ignore_alias_filters.load(Ordering::SeqCst);
        let mut state = self.lock();
        state.alias_queries += 1;

        let matching: Vec<AliasRecord> = state
            .aliases
            .iter()
            .filter(|r| ignore_filters || r.matches(&query.filter))
            .cloned()
            .collect();
        Ok(newest_first(&matching, |r| r.created, query.first))
    }

    async fn follows(&self, query: &Query) -> Result<Vec<FollowRelation>, TransportError> {
        tokio::task::yield_now().await;
        self.take_query_fault()?;

        let mut state = self.lock();
        state.follow_queries += 1;

        let matching: Vec<FollowRelation> = state
            .follows
            .iter()
            .filter(|f| f.matches(&query.filter))
            .cloned()
            .collect();
        Ok(newest_first(&matching, |f| f.created, query.first))
    }
}

#[async_trait]
impl HubMutation for InMemoryHub {
    async fn submit(&self, message: SignedMessage) -> Result<Receipt, TransportError> {
        tokio::task::yield_now().await;
        self.lock().submissions.push(message.clone());

        if self.fail_submissions.load(Ordering::SeqCst) {
            return Err(TransportError::Unavailable("injected submission failure".to_string()));
        }

        message.verify()?;
        if let Err(e) = self.apply(&message) {
            warn!(action = %message.action, signer = %message.address, error = %e, "hub rejected message");
            return Err(e);
        }

        Ok(Receipt { id: uuid::Uuid::new_v4().to_string() })
    }
}
