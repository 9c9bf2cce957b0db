//! Delegated-signing sessions
//!
//! An [`AliasSession`] pairs the connected owner with the alias wallet kept
//! in the [`AliasStore`] and tracks whether the hub currently recognizes that
//! alias. Validity per owner moves through [`SessionState`]:
//!
//! ```text
//! Unchecked --check--> Valid | Invalid
//! Valid | Invalid --check--> Valid | Invalid
//! any --commit_local / invalidate--> Unchecked
//! ```
//!
//! A `Valid` state is only recorded after a query returned a binding whose
//! `address` and `alias` exactly match the owner and the current alias. It is
//! never expired by time; callers reset it with [`AliasSession::invalidate`].

mod state;

pub use state::{AliasSessionState, SessionState};

use crate::alias_store::AliasStore;
use crate::clock::Clock;
use crate::errors::{AliasError, AliasResult};
use crate::hub::{Action, AliasPayload, HubMutation, HubQuery, Query, UnsignedMessage};
use crate::identity::{OwnerIdentity, Wallet};
use crate::metrics::{
    record_counter, ALIAS_CHECKS_INVALID, ALIAS_CHECKS_VALID, ALIAS_REGISTRATIONS,
    ALIAS_REGISTRATIONS_FAILED,
};
use crate::types::Address;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Alias lifecycle for the owners of one client session
pub struct AliasSession {
    store: Arc<AliasStore>,
    query: Arc<dyn HubQuery>,
    mutation: Arc<dyn HubMutation>,
    owner: Arc<dyn OwnerIdentity>,
    clock: Arc<dyn Clock>,
    validity_window: Duration,
    states: RwLock<HashMap<Address, SessionState>>,
}

impl AliasSession {
    pub fn new(
        store: Arc<AliasStore>,
        query: Arc<dyn HubQuery>,
        mutation: Arc<dyn HubMutation>,
        owner: Arc<dyn OwnerIdentity>,
        clock: Arc<dyn Clock>,
        validity_window: Duration,
    ) -> Self {
        Self {
            store,
            query,
            mutation,
            owner,
            clock,
            validity_window,
            states: RwLock::new(HashMap::new()),
        }
    }

    /// Primary identity this session registers aliases with
    pub fn owner_identity(&self) -> &Arc<dyn OwnerIdentity> {
        &self.owner
    }

    pub fn validity_window(&self) -> Duration {
        self.validity_window
    }

    /// Alias wallet currently stored for `owner`
    pub async fn derive_wallet(&self, owner: &Address) -> AliasResult<Option<Wallet>> {
        Ok(self.store.get(owner).await?)
    }

    /// Last observed validity for `owner`
    pub async fn state(&self, owner: &Address) -> SessionState {
        self.states.read().await.get(owner).copied().unwrap_or_default()
    }

    /// Owner, alias and validity, if an alias is stored for `owner`
    pub async fn snapshot(&self, owner: &Address) -> AliasResult<Option<AliasSessionState>> {
        let Some(wallet) = self.derive_wallet(owner).await? else {
            return Ok(None);
        };
        Ok(Some(AliasSessionState {
            owner: owner.clone(),
            alias: wallet.address(),
            state: self.state(owner).await,
        }))
    }

    /// Forget the cached validity for `owner`
    pub async fn invalidate(&self, owner: &Address) {
        if self.states.write().await.remove(owner).is_some() {
            debug!(owner = %owner, "alias session invalidated");
        }
    }

    async fn set_state(&self, owner: &Address, state: SessionState) {
        self.states.write().await.insert(owner.clone(), state);
    }

    /// Ask the hub whether the stored alias for `owner` is bound and current
    ///
    /// Leaves the state untouched when there is no owner or no stored alias.
    pub async fn check_validity(&self, owner: Option<&Address>) -> AliasResult<SessionState> {
        let Some(owner) = owner else {
            return Ok(SessionState::Unchecked);
        };
        let Some(wallet) = self.derive_wallet(owner).await? else {
            return Ok(self.state(owner).await);
        };

        let alias = wallet.address();
        let created_after = self.clock.now_secs().saturating_sub(self.validity_window.as_secs());
        let query = Query::new(1)
            .address(owner.clone())
            .alias(alias.clone())
            .created_after(created_after);

        let records = self.query.aliases(&query).await?;
        let state = match records.first() {
            Some(record) if &record.address == owner && record.alias == alias => SessionState::Valid,
            _ => SessionState::Invalid,
        };

        if state.is_valid() {
            record_counter(ALIAS_CHECKS_VALID, 1);
        } else {
            record_counter(ALIAS_CHECKS_INVALID, 1);
        }
        debug!(owner = %owner, alias = %alias, state = %state, "alias validity checked");

        self.set_state(owner, state).await;
        Ok(state)
    }

    fn ensure_owner(&self, owner: &Address) -> AliasResult<()> {
        match self.owner.account() {
            None => Err(AliasError::Unauthenticated),
            Some(connected) if &connected != owner => {
                Err(AliasError::OwnerMismatch { requested: owner.clone(), connected })
            }
            Some(_) => Ok(()),
        }
    }

    /// Local phase of registration: generate and persist a fresh alias
    ///
    /// The key stays persisted whatever happens to the remote phase. The
    /// cached validity is reset because it described the previous alias.
    pub async fn commit_local(&self, owner: &Address) -> AliasResult<Wallet> {
        let wallet = self.store.generate(owner).await?;
        self.set_state(owner, SessionState::Unchecked).await;
        debug!(owner = %owner, alias = %wallet.address(), "alias committed locally");
        Ok(wallet)
    }

    /// Remote phase of registration: bind `wallet` to `owner` on the hub,
    /// signed by the owner's primary identity
    pub async fn confirm_remote(&self, owner: &Address, wallet: &Wallet) -> AliasResult<()> {
        self.ensure_owner(owner)?;
        let public_key = self.owner.public_key().ok_or(AliasError::Unauthenticated)?;

        let message = UnsignedMessage::new(
            owner.clone(),
            Action::Alias,
            &AliasPayload { alias: wallet.address() },
            self.clock.now_secs(),
        )?;
        let signature = self.owner.sign(&message.signing_bytes()?).await?;
        let receipt = self.mutation.submit(message.into_signed(&public_key, &signature)).await?;

        info!(owner = %owner, alias = %wallet.address(), receipt = %receipt.id, "alias registered");
        Ok(())
    }

    /// Generate, persist and register a new alias for `owner`, then check it
    ///
    /// Returns the new alias address. `owner` must be the connected account.
    pub async fn register(&self, owner: &Address) -> AliasResult<Address> {
        self.ensure_owner(owner)?;
        record_counter(ALIAS_REGISTRATIONS, 1);

        let wallet = self.commit_local(owner).await?;
        if let Err(e) = self.confirm_remote(owner, &wallet).await {
            record_counter(ALIAS_REGISTRATIONS_FAILED, 1);
            warn!(owner = %owner, alias = %wallet.address(), error = %e, "alias registration failed");
            return Err(e);
        }

        self.check_validity(Some(owner)).await?;
        Ok(wallet.address())
    }
}
