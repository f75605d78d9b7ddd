//! Nullable transaction pool.

use kestrel_store::{StoreError, TransactionPool};
use kestrel_transactions::Transaction;
use kestrel_types::TransactionId;
use std::sync::Mutex;

#[derive(Default)]
struct Inner {
    /// Highest priority first.
    pending: Vec<Transaction>,
    removed: Vec<TransactionId>,
    clean_ups: usize,
    requested: Vec<usize>,
    fail_removals: bool,
}

/// An in-memory [`TransactionPool`] that serves transactions in insertion
/// order.
#[derive(Default)]
pub struct NullPool {
    inner: Mutex<Inner>,
}

impl NullPool {
    pub fn new(pending: Vec<Transaction>) -> Self {
        Self {
            inner: Mutex::new(Inner { pending, ..Inner::default() }),
        }
    }

    pub fn add(&self, tx: Transaction) {
        self.inner.lock().unwrap().pending.push(tx);
    }

    /// Make every following `remove_transaction` fail with a backend error.
    pub fn fail_removals(&self, fail: bool) {
        self.inner.lock().unwrap().fail_removals = fail;
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &TransactionId) -> bool {
        self.inner.lock().unwrap().pending.iter().any(|tx| tx.id == *id)
    }

    pub fn removed(&self) -> Vec<TransactionId> {
        self.inner.lock().unwrap().removed.clone()
    }

    pub fn clean_ups(&self) -> usize {
        self.inner.lock().unwrap().clean_ups
    }

    /// Every limit passed to `get_from_highest_priority`.
    pub fn requested(&self) -> Vec<usize> {
        self.inner.lock().unwrap().requested.clone()
    }
}

impl TransactionPool for NullPool {
    fn get_from_highest_priority(&self, limit: usize) -> Result<Vec<Transaction>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.requested.push(limit);
        Ok(inner.pending.iter().take(limit).cloned().collect())
    }

    fn remove_transaction(&self, tx: &Transaction) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_removals {
            return Err(StoreError::Backend(format!("cannot remove {}", tx.id)));
        }
        inner.pending.retain(|pending| pending.id != tx.id);
        inner.removed.push(tx.id);
        Ok(())
    }

    fn clean_up(&self) -> Result<(), StoreError> {
        self.inner.lock().unwrap().clean_ups += 1;
        Ok(())
    }
}
