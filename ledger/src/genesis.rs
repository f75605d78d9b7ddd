//! Genesis allocations.
//!
//! Balances seeded into an empty ledger before the genesis block is applied,
//! so that genesis transactions spend real funds.

use crate::WalletLedger;
use kestrel_types::{Address, Amount};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisConfig {
    #[serde(default)]
    pub allocations: Vec<GenesisAllocation>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisAllocation {
    pub address: Address,
    pub balance: Amount,
}

impl GenesisConfig {
    /// Credit every allocation. Repeated addresses accumulate.
    pub fn seed(&self, ledger: &mut WalletLedger) {
        for allocation in &self.allocations {
            let wallet = ledger.find_or_create_by_address(&allocation.address);
            wallet.balance = wallet.balance + allocation.balance;
        }
    }

    pub fn total_supply(&self) -> Option<Amount> {
        Amount::checked_sum(self.allocations.iter().map(|a| a.balance))
    }
}
