//! Observable store of a realm's classified accounts.
//!
//! Consumers hold an [`AssetStore`] (usually behind an `Arc`) and either
//! read the latest [`AssetSnapshot`] or subscribe to every publish.
//! Collections are only ever replaced whole, never edited in place.

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::watch;

use super::models::{Governance, GovernedAccount};
use super::pubkey::Pubkey;

/// What subscribers see after each publish.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetSnapshot {
    /// Realm of the pass that produced this snapshot.
    pub realm: Option<Pubkey>,
    /// Every classified account.
    pub asset_accounts: Arc<Vec<GovernedAccount>>,
    /// Token, NFT, and native balance accounts.
    pub governed_token_accounts: Arc<Vec<GovernedAccount>>,
    /// True while a pass is still running.
    pub loading: bool,
    /// Incremented on every accepted publish.
    pub version: u64,
}

impl AssetSnapshot {
    fn replace_accounts(&mut self, accounts: Vec<GovernedAccount>) {
        let tokens = accounts
            .iter()
            .filter(|account| account.is_governed_token())
            .cloned()
            .collect();
        self.asset_accounts = Arc::new(accounts);
        self.governed_token_accounts = Arc::new(tokens);
    }
}

/// Shared, injectable holder of governances and published accounts.
#[derive(Debug)]
pub struct AssetStore {
    hidden_governances: HashSet<Pubkey>,
    governances: RwLock<Vec<Governance>>,
    sender: watch::Sender<AssetSnapshot>,
}

impl Default for AssetStore {
    fn default() -> Self {
        Self::new(HashSet::new())
    }
}

impl AssetStore {
    #[must_use]
    pub fn new(hidden_governances: HashSet<Pubkey>) -> Self {
        let (sender, _receiver) = watch::channel(AssetSnapshot::default());
        Self {
            hidden_governances,
            governances: RwLock::new(Vec::new()),
            sender,
        }
    }

    /// Replace the governance list, dropping hidden governances.
    pub fn set_governances(&self, governances: Vec<Governance>) {
        let visible: Vec<Governance> = governances
            .into_iter()
            .filter(|g| !self.hidden_governances.contains(&g.address))
            .collect();
        tracing::debug!(governances = visible.len(), "Governances updated");
        *self.governances.write().unwrap_or_else(PoisonError::into_inner) = visible;
    }

    #[must_use]
    pub fn governances(&self) -> Vec<Governance> {
        self.governances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Start a pass for `realm`. Switching realms clears the published accounts.
    pub fn begin_pass(&self, realm: Pubkey) {
        self.sender.send_modify(|snapshot| {
            if snapshot.realm != Some(realm) {
                snapshot.replace_accounts(Vec::new());
                snapshot.realm = Some(realm);
            }
            snapshot.loading = true;
            snapshot.version += 1;
        });
    }

    /// Replace the collections if `realm` is still the current realm.
    ///
    /// Returns `false` when the publish was dropped as stale.
    pub fn publish(&self, realm: &Pubkey, accounts: Vec<GovernedAccount>, loading: bool) -> bool {
        let accepted = self.sender.send_if_modified(|snapshot| {
            if snapshot.realm.as_ref() != Some(realm) {
                return false;
            }
            snapshot.replace_accounts(accounts);
            snapshot.loading = loading;
            snapshot.version += 1;
            true
        });
        if !accepted {
            tracing::debug!(realm = %realm, "Dropping publish for a realm that is no longer current");
        }
        accepted
    }

    /// Mark the pass for `realm` as finished without touching the accounts.
    pub fn finish_pass(&self, realm: &Pubkey) {
        self.sender.send_if_modified(|snapshot| {
            if snapshot.realm.as_ref() != Some(realm) || !snapshot.loading {
                return false;
            }
            snapshot.loading = false;
            snapshot.version += 1;
            true
        });
    }

    /// Current realm, if a pass has started.
    #[must_use]
    pub fn current_realm(&self) -> Option<Pubkey> {
        self.sender.borrow().realm
    }

    #[must_use]
    pub fn snapshot(&self) -> AssetSnapshot {
        self.sender.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AssetSnapshot> {
        self.sender.subscribe()
    }
}
