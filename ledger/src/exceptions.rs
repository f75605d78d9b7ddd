//! Force-apply allow-list.
//!
//! Transactions listed here were accepted by the network despite failing
//! validation, so replaying the chain must apply them without checks.

use kestrel_types::{TransactionId, TypeError};
use std::collections::HashSet;

#[derive(Clone, Debug, Default)]
pub struct Exceptions {
    transactions: HashSet<TransactionId>,
}

impl Exceptions {
    pub fn new(transactions: impl IntoIterator<Item = TransactionId>) -> Self {
        Self { transactions: transactions.into_iter().collect() }
    }

    /// Build from hex transaction ids, as found in configuration.
    pub fn from_hex<S: AsRef<str>>(ids: &[S]) -> Result<Self, TypeError> {
        let transactions = ids
            .iter()
            .map(|id| id.as_ref().parse())
            .collect::<Result<HashSet<TransactionId>, _>>()?;
        Ok(Self { transactions })
    }

    pub fn contains(&self, id: &TransactionId) -> bool {
        self.transactions.contains(id)
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_hex_parses_ids() {
        let hex = "ab".repeat(32);
        let exceptions = Exceptions::from_hex(&[hex]).unwrap();
        assert_eq!(exceptions.len(), 1);
        assert!(exceptions.contains(&TransactionId::new([0xab; 32])));
        assert!(!exceptions.contains(&TransactionId::ZERO));
    }

    #[test]
    fn from_hex_rejects_garbage() {
        assert!(Exceptions::from_hex(&["not-hex"]).is_err());
    }
}
