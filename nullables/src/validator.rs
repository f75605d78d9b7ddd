//! Nullable transaction validator.

use kestrel_ledger::{LedgerError, TransactionValidator};
use kestrel_transactions::Transaction;
use kestrel_types::TransactionId;
use std::collections::HashSet;

/// Accepts everything except the transactions marked invalid, and counts
/// calls.
#[derive(Default)]
pub struct NullValidator {
    invalid: HashSet<TransactionId>,
    validated: Vec<TransactionId>,
}

impl NullValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject(mut self, id: TransactionId) -> Self {
        self.invalid.insert(id);
        self
    }

    pub fn calls(&self) -> usize {
        self.validated.len()
    }

    /// Ids passed to `validate`, in call order.
    pub fn validated(&self) -> &[TransactionId] {
        &self.validated
    }
}

impl TransactionValidator for NullValidator {
    fn validate(&mut self, tx: &Transaction) -> Result<(), LedgerError> {
        self.validated.push(tx.id);
        if self.invalid.contains(&tx.id) {
            return Err(LedgerError::CannotApply {
                id: tx.id,
                reason: "rejected by validator".into(),
            });
        }
        Ok(())
    }
}
