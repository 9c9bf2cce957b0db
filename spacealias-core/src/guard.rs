//! Guarded execution of delegated actions
//!
//! [`ActionGuard::run`] makes sure the connected owner has a valid alias
//! before handing that alias to the action, registering a new one at most
//! once per call. Failures never escape: they are logged, reported to the
//! notifier, and turned into `None`.

use crate::errors::{AliasError, AliasResult};
use crate::identity::Wallet;
use crate::metrics::{record_counter, GUARD_ACTIONS_FAILED};
use crate::notify::{Notifier, Severity, SOMETHING_WENT_WRONG};
use crate::session::AliasSession;
use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, error};

/// Counts one in-flight operation for its lifetime
///
/// Overlapping operations each hold their own guard, so the counter only
/// returns to zero once the last of them finishes.
pub(crate) struct BusyGuard<'a>(&'a AtomicUsize);

impl<'a> BusyGuard<'a> {
    pub(crate) fn set(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub(crate) fn in_flight(counter: &AtomicUsize) -> bool {
    counter.load(Ordering::SeqCst) > 0
}

enum Failure<E> {
    Session(AliasError),
    Action(E),
}

/// Runs actions under a valid delegated session
pub struct ActionGuard {
    session: Arc<AliasSession>,
    notifier: Arc<dyn Notifier>,
    busy: AtomicUsize,
}

impl ActionGuard {
    pub fn new(session: Arc<AliasSession>, notifier: Arc<dyn Notifier>) -> Self {
        Self { session, notifier, busy: AtomicUsize::new(0) }
    }

    /// Whether any `run` is in progress
    pub fn is_busy(&self) -> bool {
        in_flight(&self.busy)
    }

    /// Alias to act with, registering a new one if the current is not valid
    async fn ensure_alias(&self) -> AliasResult<Wallet> {
        let owner = self
            .session
            .owner_identity()
            .account()
            .ok_or(AliasError::Unauthenticated)?;

        let state = self.session.check_validity(Some(&owner)).await?;
        if state.is_valid() {
            if let Some(wallet) = self.session.derive_wallet(&owner).await? {
                return Ok(wallet);
            }
        }

        debug!(owner = %owner, state = %state, "registering alias before action");
        self.session.register(&owner).await?;
        self.session
            .derive_wallet(&owner)
            .await?
            .ok_or(AliasError::InvalidSessionState { owner })
    }

    /// Run `action` with a valid alias wallet
    ///
    /// The action is invoked exactly once unless establishing the session
    /// fails first. Returns `None` if anything failed.
    pub async fn run<F, Fut, T, E>(&self, action: F) -> Option<T>
    where
        F: FnOnce(Wallet) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let _busy = BusyGuard::set(&self.busy);

        let result = match self.ensure_alias().await {
            Ok(wallet) => action(wallet).await.map_err(Failure::Action),
            Err(e) => Err(Failure::Session(e)),
        };

        match result {
            Ok(value) => Some(value),
            Err(failure) => {
                match failure {
                    Failure::Session(e) => error!(error = %e, "could not establish alias session"),
                    Failure::Action(e) => error!(error = %e, "delegated action failed"),
                }
                record_counter(GUARD_ACTIONS_FAILED, 1);
                self.notifier.notify(Severity::Error, SOMETHING_WENT_WRONG);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::Action;
    use crate::test_utils::TestHarness;

    #[tokio::test]
    async fn test_registers_then_runs_once() {
        let h = TestHarness::new();
        let calls = AtomicUsize::new(0);

        let result = h
            .context
            .guard()
            .run(|wallet| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Ok::<_, AliasError>(wallet.address()) }
            })
            .await;

        let alias = result.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.hub.submissions_for(Action::Alias).len(), 1);
        let stored = h.context.store().get(&h.owner_address()).await.unwrap().unwrap();
        assert_eq!(stored.address(), alias);
        assert!(!h.context.guard().is_busy());
    }

    #[tokio::test]
    async fn test_valid_session_skips_registration() {
        let h = TestHarness::new();
        h.session().register(&h.owner_address()).await.unwrap();

        let result = h.context.guard().run(|_| async { Ok::<_, AliasError>(7) }).await;

        assert_eq!(result, Some(7));
        assert_eq!(h.hub.submissions_for(Action::Alias).len(), 1);
    }

    #[tokio::test]
    async fn test_runs_once_even_if_still_invalid_after_registration() {
        let h = TestHarness::new();
        h.hub.set_drop_alias_bindings(true);
        let calls = AtomicUsize::new(0);

        let result = h
            .context
            .guard()
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, AliasError>(()) }
            })
            .await;

        assert!(result.is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.hub.submissions_for(Action::Alias).len(), 1);
    }

    #[tokio::test]
    async fn test_action_error_is_notified() {
        let h = TestHarness::new();

        let result = h
            .context
            .guard()
            .run(|_| async { Err::<(), _>("hub said no") })
            .await;

        assert!(result.is_none());
        assert_eq!(
            h.notifier.events(),
            vec![(Severity::Error, SOMETHING_WENT_WRONG.to_string())]
        );
        assert!(!h.context.guard().is_busy());
    }

    #[tokio::test]
    async fn test_registration_failure_skips_action() {
        let h = TestHarness::new();
        h.hub.set_fail_submissions(true);
        let calls = AtomicUsize::new(0);

        let result = h
            .context
            .guard()
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, AliasError>(()) }
            })
            .await;

        assert!(result.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.notifier.events().len(), 1);
        assert!(!h.context.guard().is_busy());
    }

    #[tokio::test]
    async fn test_no_account_skips_action() {
        let h = TestHarness::new();
        h.owner.disconnect();

        let result = h.context.guard().run(|_| async { Ok::<_, AliasError>(()) }).await;

        assert!(result.is_none());
        assert_eq!(h.notifier.events().len(), 1);
    }

    #[tokio::test]
    async fn test_busy_while_running() {
        let h = TestHarness::new();
        h.session().register(&h.owner_address()).await.unwrap();
        let guard = h.context.guard();

        let observed = guard
            .run(|_| async { Ok::<_, AliasError>(guard.is_busy()) })
            .await;

        assert_eq!(observed, Some(true));
        assert!(!guard.is_busy());
    }

    #[tokio::test]
    async fn test_stays_busy_until_last_overlapping_run_ends() {
        let h = TestHarness::new();
        h.session().register(&h.owner_address()).await.unwrap();
        let guard = h.context.guard();
        let (release, released) = tokio::sync::oneshot::channel::<()>();

        let slow = guard.run(|_| async move { released.await.map_err(|e| e.to_string()) });
        let fast = async {
            let result = guard.run(|_| async { Ok::<_, AliasError>(1) }).await;
            let busy_after_fast = guard.is_busy();
            release.send(()).unwrap();
            (result, busy_after_fast)
        };
        let (slow_result, (fast_result, busy_after_fast)) = tokio::join!(slow, fast);

        assert_eq!(fast_result, Some(1));
        assert!(busy_after_fast);
        assert_eq!(slow_result, Some(()));
        assert!(!guard.is_busy());
    }

    #[test]
    fn test_busy_guard_counts_overlaps() {
        let counter = AtomicUsize::new(0);
        let first = BusyGuard::set(&counter);
        let second = BusyGuard::set(&counter);
        drop(first);
        assert!(in_flight(&counter));
        drop(second);
        assert!(!in_flight(&counter));
    }
}
