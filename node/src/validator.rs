//! Candidate validation against a scratch copy of the ledger.

use kestrel_ledger::{LedgerError, LedgerMutator, TransactionValidator, WalletLedger};
use kestrel_transactions::Transaction;

/// Validates pool transactions for the block at `height` by applying them to
/// a private copy of the ledger.
///
/// Accepted candidates stay applied to the copy, so a later candidate from the
/// same sender sees the earlier one's nonce and balance effects. The live
/// ledger is never touched.
pub struct LedgerValidator<'a> {
    mutator: &'a LedgerMutator,
    scratch: WalletLedger,
    height: u64,
}

impl<'a> LedgerValidator<'a> {
    pub fn new(mutator: &'a LedgerMutator, ledger: &WalletLedger, height: u64) -> Self {
        Self {
            mutator,
            scratch: ledger.clone(),
            height,
        }
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    /// The copy with every accepted candidate applied.
    pub fn scratch(&self) -> &WalletLedger {
        &self.scratch
    }
}

impl TransactionValidator for LedgerValidator<'_> {
    fn validate(&mut self, tx: &Transaction) -> Result<(), LedgerError> {
        self.mutator.apply_transaction(&mut self.scratch, tx, self.height)
    }
}
