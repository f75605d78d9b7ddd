use kestrel_types::{Amount, PublicKey, TransactionId};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("cannot apply transaction {id}: {reason}")]
    CannotApply { id: TransactionId, reason: String },

    #[error("delegate username {0:?} is already registered")]
    DuplicateDelegateName(String),

    #[error("vote target {0} is not a delegate")]
    UnknownVoteTarget(PublicKey),

    #[error("insufficient balance: needed {needed}, available {available}")]
    InsufficientBalance { needed: Amount, available: Amount },

    #[error("sender {0} has no wallet")]
    UnknownSender(PublicKey),

    #[error("generator {0} is not a known delegate")]
    UnknownGenerator(PublicKey),

    #[error("block reward overflows at height {height}")]
    RewardOverflow { height: u64 },

    #[error("cannot undo transaction {id}: {reason}")]
    UndoFailed { id: TransactionId, reason: String },

    #[error("corrupted chain: {0}")]
    CorruptedChain(String),
}

impl LedgerError {
    /// Undo-time failures mean the ledger no longer matches the chain.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::UndoFailed { .. } | Self::CorruptedChain(_))
    }

    pub(crate) fn cannot_apply(id: TransactionId, reason: impl Into<String>) -> Self {
        Self::CannotApply { id, reason: reason.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_undo_failures_are_fatal() {
        let id = TransactionId::ZERO;
        assert!(LedgerError::UndoFailed { id, reason: "x".into() }.is_fatal());
        assert!(LedgerError::CorruptedChain("x".into()).is_fatal());
        assert!(!LedgerError::cannot_apply(id, "x").is_fatal());
        assert!(!LedgerError::DuplicateDelegateName("x".into()).is_fatal());
    }
}
