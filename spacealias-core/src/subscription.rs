//! Space notification subscriptions
//!
//! Consumed by the follow registry: leaving a space also unsubscribes from
//! its notifications.

use crate::hub::TransportError;
use crate::types::SpaceId;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

/// Subscription toggle collaborator
#[async_trait]
pub trait SpaceSubscription: Send + Sync {
    async fn is_subscribed(&self, space: &SpaceId) -> Result<bool, TransportError>;

    /// Flip the subscription state for `space`
    async fn toggle(&self, space: &SpaceId) -> Result<(), TransportError>;
}

/// In-memory subscriptions
#[derive(Debug, Default)]
pub struct InMemorySubscriptions {
    subscribed: Mutex<HashSet<SpaceId>>,
    toggles: Mutex<Vec<SpaceId>>,
}

impl InMemorySubscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    fn subscribed(&self) -> MutexGuard<'_, HashSet<SpaceId>> {
        self.subscribed.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn subscribe(&self, space: SpaceId) {
        self.subscribed().insert(space);
    }

    /// Spaces passed to `toggle`, in call order
    pub fn toggles(&self) -> Vec<SpaceId> {
        self.toggles
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl SpaceSubscription for InMemorySubscriptions {
    async fn is_subscribed(&self, space: &SpaceId) -> Result<bool, TransportError> {
        Ok(self.subscribed().contains(space))
    }

    async fn toggle(&self, space: &SpaceId) -> Result<(), TransportError> {
        {
            let mut subscribed = self.subscribed();
            if !subscribed.remove(space) {
                subscribed.insert(space.clone());
            }
        }
        self.toggles
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(space.clone());
        Ok(())
    }
}
