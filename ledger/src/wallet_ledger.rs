//! In-memory wallet repository.
//!
//! Wallets are owned by the ledger and looked up through three indices kept
//! mutually consistent: by address, by public key and by delegate username.
//! Open HTLC locks are additionally indexed by lock transaction id, and
//! settled locks are retained so that undoing a claim or refund can restore
//! them exactly. Force-applied transactions keep the prior state of whatever
//! they overwrote until they are undone.

use crate::wallet::{HtlcLock, Wallet};
use kestrel_crypto::derive_address;
use kestrel_types::{Address, PublicKey, TransactionId};
use std::collections::HashMap;

/// A claimed or refunded lock, kept for undo.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SettledLock {
    pub owner: Address,
    pub lock: HtlcLock,
}

/// A set of wallet and lock-index writes produced by one transaction.
///
/// Built off to the side and committed in one step, so a failing transaction
/// leaves the ledger untouched.
#[derive(Clone, Debug, Default)]
pub(crate) struct LedgerChanges {
    pub(crate) wallets: Vec<Wallet>,
    /// `Some(owner)` opens the lock, `None` drops it from the open index.
    pub(crate) open_locks: Vec<(TransactionId, Option<Address>)>,
    /// `Some` records a settled lock, `None` forgets it.
    pub(crate) settled_locks: Vec<(TransactionId, Option<SettledLock>)>,
}

#[derive(Clone, Debug, Default)]
pub struct WalletLedger {
    by_address: HashMap<Address, Wallet>,
    by_public_key: HashMap<PublicKey, Address>,
    by_username: HashMap<String, Address>,
    open_locks: HashMap<TransactionId, Address>,
    settled_locks: HashMap<TransactionId, SettledLock>,
    /// Writes restoring the state a force-applied transaction replaced.
    forced: HashMap<TransactionId, LedgerChanges>,
}

impl WalletLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// The wallet at `address`, created cold if absent.
    pub fn find_or_create_by_address(&mut self, address: &Address) -> &mut Wallet {
        self.by_address
            .entry(address.clone())
            .or_insert_with(|| Wallet::new(address.clone()))
    }

    /// The wallet of `public_key`, created cold if absent. Records the key on
    /// a wallet that did not know it yet.
    pub fn find_or_create_by_public_key(&mut self, public_key: &PublicKey) -> &mut Wallet {
        let address = match self.by_public_key.get(public_key) {
            Some(address) => address.clone(),
            None => {
                let address = derive_address(public_key);
                self.by_public_key.insert(*public_key, address.clone());
                address
            }
        };
        let wallet = self
            .by_address
            .entry(address.clone())
            .or_insert_with(|| Wallet::new(address));
        wallet.public_key.get_or_insert(*public_key);
        wallet
    }

    pub fn find_by_address(&self, address: &Address) -> Option<&Wallet> {
        self.by_address.get(address)
    }

    /// Wallet of `public_key`, including cold wallets whose key is not yet
    /// recorded.
    pub fn find_by_public_key(&self, public_key: &PublicKey) -> Option<&Wallet> {
        match self.by_public_key.get(public_key) {
            Some(address) => self.by_address.get(address),
            None => self.by_address.get(&derive_address(public_key)),
        }
    }

    /// Case-insensitive delegate lookup.
    pub fn find_by_username(&self, username: &str) -> Option<&Wallet> {
        self.by_username
            .get(&username.to_lowercase())
            .and_then(|address| self.by_address.get(address))
    }

    /// (Re)insert `wallet` and bring every index in line with it.
    pub fn index(&mut self, wallet: Wallet) {
        let address = wallet.address.clone();
        let previous = self
            .by_address
            .get(&address)
            .and_then(Wallet::username)
            .map(str::to_lowercase);
        if let Some(previous) = previous {
            if self.by_username.get(&previous) == Some(&address) {
                self.by_username.remove(&previous);
            }
        }
        if let Some(public_key) = wallet.public_key {
            self.by_public_key.insert(public_key, address.clone());
        }
        if let Some(username) = wallet.username() {
            self.by_username.insert(username.to_lowercase(), address.clone());
        }
        self.by_address.insert(address, wallet);
    }

    /// Drop every wallet and index.
    pub fn reset(&mut self) {
        self.by_address.clear();
        self.by_public_key.clear();
        self.by_username.clear();
        self.open_locks.clear();
        self.settled_locks.clear();
        self.forced.clear();
    }

    pub fn len(&self) -> usize {
        self.by_address.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_address.is_empty()
    }

    pub fn wallets(&self) -> impl Iterator<Item = &Wallet> {
        self.by_address.values()
    }

    /// Mutable access for bulk passes that leave addresses, keys and
    /// usernames untouched (vote balances, ranks).
    pub fn wallets_mut(&mut self) -> impl Iterator<Item = &mut Wallet> {
        self.by_address.values_mut()
    }

    pub fn delegates(&self) -> impl Iterator<Item = &Wallet> {
        self.by_address.values().filter(|w| w.is_delegate())
    }

    /// Owner of an open lock.
    pub fn lock_owner(&self, lock_id: &TransactionId) -> Option<&Address> {
        self.open_locks.get(lock_id)
    }

    /// The open lock with this id, with its owner.
    pub fn open_lock(&self, lock_id: &TransactionId) -> Option<(&Address, &HtlcLock)> {
        let owner = self.open_locks.get(lock_id)?;
        let lock = self.by_address.get(owner)?.attributes.htlc.locks.get(lock_id)?;
        Some((owner, lock))
    }

    pub fn settled_lock(&self, lock_id: &TransactionId) -> Option<&SettledLock> {
        self.settled_locks.get(lock_id)
    }

    /// Locks past their expiration height at `height`, still unsettled.
    pub fn expired_locks(&self, height: u64) -> Vec<(TransactionId, Address)> {
        let mut expired: Vec<_> = self
            .open_locks
            .iter()
            .filter(|(id, owner)| {
                self.by_address
                    .get(*owner)
                    .and_then(|w| w.attributes.htlc.locks.get(*id))
                    .is_some_and(|lock| lock.expiration_height <= height)
            })
            .map(|(id, owner)| (*id, owner.clone()))
            .collect();
        expired.sort();
        expired
    }

    /// Writes that put back everything `changes` is about to overwrite.
    /// Wallets that do not exist yet come back as cold wallets.
    pub(crate) fn prior_state(&self, changes: &LedgerChanges) -> LedgerChanges {
        LedgerChanges {
            wallets: changes
                .wallets
                .iter()
                .map(|wallet| {
                    self.by_address
                        .get(&wallet.address)
                        .cloned()
                        .unwrap_or_else(|| Wallet::new(wallet.address.clone()))
                })
                .collect(),
            open_locks: changes
                .open_locks
                .iter()
                .map(|(id, _)| (*id, self.open_locks.get(id).cloned()))
                .collect(),
            settled_locks: changes
                .settled_locks
                .iter()
                .map(|(id, _)| (*id, self.settled_locks.get(id).cloned()))
                .collect(),
        }
    }

    pub(crate) fn record_forced(&mut self, id: TransactionId, prior: LedgerChanges) {
        self.forced.insert(id, prior);
    }

    pub(crate) fn take_forced(&mut self, id: &TransactionId) -> Option<LedgerChanges> {
        self.forced.remove(id)
    }

    pub(crate) fn commit(&mut self, changes: LedgerChanges) {
        for wallet in changes.wallets {
            self.index(wallet);
        }
        for (id, owner) in changes.open_locks {
            match owner {
                Some(owner) => self.open_locks.insert(id, owner),
                None => self.open_locks.remove(&id),
            };
        }
        for (id, settled) in changes.settled_locks {
            match settled {
                Some(settled) => self.settled_locks.insert(id, settled),
                None => self.settled_locks.remove(&id),
            };
        }
    }
}
