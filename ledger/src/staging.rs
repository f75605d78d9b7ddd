//! Copy-on-write staging of one transaction's effects.

use crate::wallet::Wallet;
use crate::wallet_ledger::{LedgerChanges, SettledLock};
use crate::WalletLedger;
use kestrel_crypto::derive_address;
use kestrel_types::{Address, PublicKey, TransactionId};
use std::collections::BTreeMap;

/// Wallet copies and lock-index writes pending against a borrowed ledger.
pub(crate) struct Staged<'a> {
    ledger: &'a WalletLedger,
    wallets: BTreeMap<Address, Wallet>,
    changes: LedgerChanges,
}

impl<'a> Staged<'a> {
    pub(crate) fn new(ledger: &'a WalletLedger) -> Self {
        Self {
            ledger,
            wallets: BTreeMap::new(),
            changes: LedgerChanges::default(),
        }
    }

    pub(crate) fn ledger(&self) -> &'a WalletLedger {
        self.ledger
    }

    /// Staged copy of the wallet at `address`; a cold wallet if unknown.
    pub(crate) fn wallet(&mut self, address: &Address) -> &mut Wallet {
        let ledger = self.ledger;
        self.wallets.entry(address.clone()).or_insert_with(|| {
            ledger
                .find_by_address(address)
                .cloned()
                .unwrap_or_else(|| Wallet::new(address.clone()))
        })
    }

    pub(crate) fn wallet_by_public_key(&mut self, public_key: &PublicKey) -> &mut Wallet {
        let address = self
            .ledger
            .find_by_public_key(public_key)
            .map(|w| w.address.clone())
            .unwrap_or_else(|| derive_address(public_key));
        let wallet = self.wallet(&address);
        wallet.public_key.get_or_insert(*public_key);
        wallet
    }

    pub(crate) fn open_lock(&mut self, id: TransactionId, owner: Address) {
        self.changes.open_locks.push((id, Some(owner)));
    }

    pub(crate) fn close_lock(&mut self, id: TransactionId) {
        self.changes.open_locks.push((id, None));
    }

    pub(crate) fn settle(&mut self, id: TransactionId, settled: SettledLock) {
        self.changes.settled_locks.push((id, Some(settled)));
    }

    pub(crate) fn unsettle(&mut self, id: TransactionId) {
        self.changes.settled_locks.push((id, None));
    }

    pub(crate) fn finish(self) -> LedgerChanges {
        let mut changes = self.changes;
        changes.wallets = self.wallets.into_values().collect();
        changes
    }
}
