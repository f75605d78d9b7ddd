//! Vote balance aggregation.
//!
//! Always recomputed from the full wallet set: every voting wallet lends its
//! vote weight (balance plus HTLC-locked balance) to the delegate it votes
//! for. Nothing is carried over between rebuilds.

use crate::DposError;
use kestrel_ledger::WalletLedger;
use kestrel_types::{Amount, PublicKey};
use std::collections::HashMap;
use tracing::warn;

/// Delegate public key → total weight voting for it.
#[derive(Debug, Default)]
pub struct VoteBalances {
    balances: HashMap<PublicKey, Amount>,
}

impl VoteBalances {
    /// Aggregate every vote in `ledger`.
    pub fn rebuild(ledger: &WalletLedger) -> Result<Self, DposError> {
        let mut balances: HashMap<PublicKey, Amount> = HashMap::new();
        for wallet in ledger.wallets() {
            if let Some(delegate) = wallet.attributes.vote {
                let entry = balances.entry(delegate).or_default();
                let current = *entry;
                *entry = wallet
                    .vote_weight()
                    .and_then(|weight| current.checked_add(weight))
                    .ok_or(DposError::VoteWeightOverflow(delegate))?;
            }
        }
        Ok(Self { balances })
    }

    /// Weight voting for `delegate`; zero if nobody votes for it.
    pub fn balance(&self, delegate: &PublicKey) -> Amount {
        self.balances.get(delegate).copied().unwrap_or_default()
    }

    /// Sum over every delegate; `None` on overflow.
    pub fn total(&self) -> Option<Amount> {
        Amount::checked_sum(self.balances.values().copied())
    }

    /// Write the aggregated balances onto every delegate wallet.
    pub fn apply(&self, ledger: &mut WalletLedger) {
        let mut assigned = 0usize;
        for wallet in ledger.wallets_mut() {
            let Some(public_key) = wallet.public_key else { continue };
            if let Some(delegate) = wallet.attributes.delegate.as_mut() {
                delegate.vote_balance = self.balance(&public_key);
                if self.balances.contains_key(&public_key) {
                    assigned += 1;
                }
            }
        }
        if assigned < self.balances.len() {
            warn!(
                orphaned = self.balances.len() - assigned,
                "votes point at wallets that are not delegates"
            );
        }
    }
}
