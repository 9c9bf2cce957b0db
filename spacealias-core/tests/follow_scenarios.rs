//! End-to-end follow flows over the in-memory hub

use spacealias_core::alias_store::StoreError;
use spacealias_core::clock::Clock;
use spacealias_core::hub::{
    Action, AliasRecord, FollowPayload, FollowRelation, HubMutation, UnsignedMessage,
};
use spacealias_core::identity::Wallet;
use spacealias_core::test_utils::TestHarness;
use spacealias_core::{AliasError, FollowOutcome, SessionState, SpaceId};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[tokio::test]
async fn test_first_follow_registers_alias() {
    let h = TestHarness::new();
    let owner = h.owner_address();
    let space = SpaceId::from("space-1");
    assert!(h.context.store().get(&owner).await.unwrap().is_none());

    let outcome = h.follows().follow(&space).await.unwrap();
    assert_eq!(outcome, FollowOutcome::Followed);

    let alias = h.context.store().get(&owner).await.unwrap().unwrap();
    let submissions = h.hub.submissions();
    assert_eq!(submissions.len(), 2);
    assert_eq!(submissions[0].action, Action::Alias);
    assert_eq!(submissions[1].action, Action::Follow);
    assert_eq!(submissions[1].address, alias.address());

    let payload: FollowPayload = submissions[1].payload_as().unwrap();
    assert_eq!(payload.from, owner);
    assert_eq!(payload.space, space);

    assert_eq!(h.follows().following().await.len(), 1);
    assert!(h.hub.follow_query_count() >= 1);
}

#[tokio::test]
async fn test_stale_alias_is_replaced() {
    let h = TestHarness::new();
    let owner = h.owner_address();
    let stale = Wallet::generate();
    h.context.store().set(&owner, &stale).await.unwrap();
    h.hub.insert_alias_record(AliasRecord {
        address: owner.clone(),
        alias: Wallet::generate().address(),
        created: h.clock.now_secs(),
    });

    let outcome = h.follows().follow(&SpaceId::from("space-1")).await.unwrap();
    assert_eq!(outcome, FollowOutcome::Followed);

    let current = h.context.store().get(&owner).await.unwrap().unwrap();
    assert_ne!(current.address(), stale.address());
    assert_eq!(h.session().state(&owner).await, SessionState::Valid);

    let follow = &h.hub.submissions_for(Action::Follow)[0];
    assert_eq!(follow.address, current.address());
}

#[tokio::test]
async fn test_unfollow_unsubscribes_first() {
    let h = TestHarness::new();
    let owner = h.owner_address();
    let space = SpaceId::from("space-1");

    h.follows().follow(&space).await.unwrap();
    h.subscriptions.subscribe(space.clone());

    let outcome = h.follows().follow(&space).await.unwrap();

    assert_eq!(outcome, FollowOutcome::Unfollowed);
    assert_eq!(h.subscriptions.toggles(), vec![space.clone()]);
    let unfollows = h.hub.submissions_for(Action::Unfollow);
    assert_eq!(unfollows.len(), 1);
    let payload: FollowPayload = unfollows[0].payload_as().unwrap();
    assert_eq!(payload.from, owner);
    assert!(h.follows().following().await.is_empty());
}

#[tokio::test]
async fn test_unfollow_when_not_subscribed_skips_toggle() {
    let h = TestHarness::new();
    let space = SpaceId::from("space-1");

    h.follows().follow(&space).await.unwrap();
    h.follows().follow(&space).await.unwrap();

    assert!(h.subscriptions.toggles().is_empty());
}

#[tokio::test]
async fn test_concurrent_follows_both_submit() {
    let h = TestHarness::new();
    let space = SpaceId::from("space-1");
    h.session().register(&h.owner_address()).await.unwrap();

    let (a, b) = tokio::join!(h.follows().follow(&space), h.follows().follow(&space));

    assert_eq!(a.unwrap(), FollowOutcome::Followed);
    assert_eq!(b.unwrap(), FollowOutcome::Followed);
    assert_eq!(h.hub.submissions_for(Action::Follow).len(), 2);
    assert_eq!(h.hub.follow_relations().len(), 1);
    assert_eq!(h.follows().loading_follow(), None);
}

#[tokio::test]
async fn test_follow_preseeded_relation_unfollows() {
    let h = TestHarness::new();
    let space = SpaceId::from("balancer.eth");
    h.session().register(&h.owner_address()).await.unwrap();
    h.hub.insert_follow(FollowRelation {
        space: space.clone(),
        follower: h.owner_address(),
        created: h.clock.now_secs(),
    });
    h.follows().load_follows(None).await;

    let outcome = h.follows().follow(&space).await.unwrap();

    assert_eq!(outcome, FollowOutcome::Unfollowed);
    assert!(h.hub.follow_relations().is_empty());
}

#[tokio::test]
async fn test_storage_failure_clears_busy_marker() {
    let h = TestHarness::new();
    h.backend.set_available(false);

    let result = h.follows().follow(&SpaceId::from("space-1")).await;

    assert!(matches!(result, Err(AliasError::StorageUnavailable(StoreError::Unavailable(_)))));
    assert_eq!(h.follows().loading_follow(), None);
    assert!(h.hub.submissions().is_empty());
}

#[tokio::test]
async fn test_query_failure_during_check() {
    let h = TestHarness::new();
    h.session().register(&h.owner_address()).await.unwrap();
    h.hub.fail_next_queries(1);

    let result = h.follows().follow(&SpaceId::from("space-1")).await;

    assert!(matches!(result, Err(AliasError::TransportFailure(_))));
    assert!(h.hub.submissions_for(Action::Follow).is_empty());
}

#[tokio::test]
async fn test_guarded_follow_uses_alias() {
    let h = TestHarness::new();
    let hub = h.hub.clone();
    let owner = h.owner_address();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let receipt = h
        .context
        .guard()
        .run(|alias| async move {
            counter.fetch_add(1, Ordering::SeqCst);
            let payload = FollowPayload { from: owner, space: SpaceId::from("space-9") };
            let message = UnsignedMessage::new(alias.address(), Action::Follow, &payload, 0)?
                .sign_with(&alias)?;
            HubMutation::submit(hub.as_ref(), message).await
        })
        .await;

    assert!(receipt.is_some());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.hub.follow_relations().len(), 1);
    assert!(h.notifier.events().is_empty());
}
