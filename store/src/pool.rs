//! Pending transaction pool.

use crate::StoreError;
use kestrel_transactions::Transaction;

/// The pool of unconfirmed transactions, ordered by priority.
pub trait TransactionPool {
    /// Up to `limit` pending transactions, highest priority first.
    fn get_from_highest_priority(&self, limit: usize) -> Result<Vec<Transaction>, StoreError>;

    fn remove_transaction(&self, tx: &Transaction) -> Result<(), StoreError>;

    /// Drop expired and already-confirmed entries.
    fn clean_up(&self) -> Result<(), StoreError>;
}
