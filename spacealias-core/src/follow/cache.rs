//! Local mirror of follow relations

use crate::guard::in_flight;
use crate::hub::FollowRelation;
use crate::types::{Address, SpaceId};
use std::sync::atomic::AtomicUsize;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::RwLock;

/// Relation collections and the flags the UI renders from
///
/// Collections are replaced wholesale by reloads and may be stale until the
/// reload after a mutation completes.
#[derive(Debug, Default)]
pub struct RelationCache {
    following: RwLock<Vec<FollowRelation>>,
    space_followers: RwLock<Vec<FollowRelation>>,
    pub(crate) loading_follows: AtomicUsize,
    pub(crate) loading_followers: AtomicUsize,
    /// One entry per toggle in flight, oldest first; a space appears twice
    /// when two toggles on it overlap
    busy: Mutex<Vec<SpaceId>>,
}

/// Removes its own entry from the busy set when dropped
pub(crate) struct BusyMarker<'a> {
    cache: &'a RelationCache,
    space: SpaceId,
}

impl Drop for BusyMarker<'_> {
    fn drop(&mut self) {
        let mut busy = self.cache.busy();
        if let Some(pos) = busy.iter().position(|s| s == &self.space) {
            busy.remove(pos);
        }
    }
}

impl RelationCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn busy(&self) -> MutexGuard<'_, Vec<SpaceId>> {
        self.busy.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn mark_busy(&self, space: &SpaceId) -> BusyMarker<'_> {
        self.busy().push(space.clone());
        BusyMarker { cache: self, space: space.clone() }
    }

    /// Most recently started toggle still in flight
    pub fn busy_space(&self) -> Option<SpaceId> {
        self.busy().last().cloned()
    }

    /// Whether a toggle on `space` is in flight
    pub fn is_busy(&self, space: &SpaceId) -> bool {
        self.busy().contains(space)
    }

    pub async fn following(&self) -> Vec<FollowRelation> {
        self.following.read().await.clone()
    }

    pub async fn space_followers(&self) -> Vec<FollowRelation> {
        self.space_followers.read().await.clone()
    }

    pub(crate) async fn replace_following(&self, relations: Vec<FollowRelation>) {
        *self.following.write().await = relations;
    }

    pub(crate) async fn replace_space_followers(&self, relations: Vec<FollowRelation>) {
        *self.space_followers.write().await = relations;
    }

    /// Whether `follower` has a cached relation to `space`
    pub async fn contains(&self, space: &SpaceId, follower: &Address) -> bool {
        self.following
            .read()
            .await
            .iter()
            .any(|f| &f.space == space && &f.follower == follower)
    }

    pub fn is_loading_follows(&self) -> bool {
        in_flight(&self.loading_follows)
    }

    pub fn is_loading_followers(&self) -> bool {
        in_flight(&self.loading_followers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relation(space: &str, follower: &str) -> FollowRelation {
        FollowRelation { space: SpaceId::from(space), follower: Address::from(follower), created: 1 }
    }

    #[tokio::test]
    async fn test_replace_and_contains() {
        let cache = RelationCache::new();
        cache.replace_following(vec![relation("space-1", "0xa")]).await;

        assert!(cache.contains(&SpaceId::from("space-1"), &Address::from("0xa")).await);
        assert!(!cache.contains(&SpaceId::from("space-1"), &Address::from("0xb")).await);

        cache.replace_following(Vec::new()).await;
        assert!(cache.following().await.is_empty());
    }

    #[test]
    fn test_busy_marker_clears_on_drop() {
        let cache = RelationCache::new();
        {
            let _marker = cache.mark_busy(&SpaceId::from("space-1"));
            assert_eq!(cache.busy_space(), Some(SpaceId::from("space-1")));
        }
        assert_eq!(cache.busy_space(), None);
    }

    #[test]
    fn test_overlapping_markers_release_independently() {
        let cache = RelationCache::new();
        let a = SpaceId::from("space-a");
        let b = SpaceId::from("space-b");

        let marker_a = cache.mark_busy(&a);
        let marker_b = cache.mark_busy(&b);
        let second_a = cache.mark_busy(&a);
        assert_eq!(cache.busy_space(), Some(a.clone()));

        drop(marker_a);
        assert!(cache.is_busy(&a));
        assert!(cache.is_busy(&b));

        drop(second_a);
        assert!(!cache.is_busy(&a));
        assert_eq!(cache.busy_space(), Some(b.clone()));

        drop(marker_b);
        assert_eq!(cache.busy_space(), None);
    }
}
