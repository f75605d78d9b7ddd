use crate::LedgerError;
use kestrel_transactions::Transaction;

/// Checks a pending transaction against ledger state before it is included
/// in a block.
///
/// Implementations may keep per-collation state, so that consecutive
/// transactions from one sender see each other's effects.
pub trait TransactionValidator {
    fn validate(&mut self, tx: &Transaction) -> Result<(), LedgerError>;
}
