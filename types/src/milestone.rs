//! Protocol milestones: height-indexed sets of protocol parameters.
//!
//! A milestone takes effect at its `height` and stays active until the next
//! milestone. The first milestone always starts at height 1.

use crate::amount::Amount;
use crate::error::TypeError;
use crate::network::NetworkId;
use serde::{Deserialize, Serialize};

/// Raw units per whole token.
pub const TOKEN_UNIT: i128 = 100_000_000;

/// Protocol parameters active from `height` onwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    /// First height at which these parameters apply.
    pub height: u64,
    /// Number of forging delegates per round.
    pub active_delegates: u32,
    /// Maximum number of transactions in one block.
    pub max_transactions: u32,
    /// Block reward credited to the generator.
    pub reward: Amount,
    /// Maximum number of payments in one multi-payment transaction.
    pub multi_payment_limit: u32,
}

/// The ordered milestone schedule of a network.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Milestones {
    milestones: Vec<Milestone>,
}

impl Milestones {
    /// Build a schedule, sorting by height.
    ///
    /// Fails if the list is empty, does not start at height 1, repeats a
    /// height, or configures zero active delegates.
    pub fn new(mut milestones: Vec<Milestone>) -> Result<Self, TypeError> {
        milestones.sort_by_key(|m| m.height);
        match milestones.first() {
            None => return Err(TypeError::InvalidMilestones("no milestones".into())),
            Some(first) if first.height != 1 => {
                return Err(TypeError::InvalidMilestones(format!(
                    "first milestone starts at height {}, expected 1",
                    first.height
                )))
            }
            Some(_) => {}
        }
        if milestones.windows(2).any(|w| w[0].height == w[1].height) {
            return Err(TypeError::InvalidMilestones("duplicate milestone height".into()));
        }
        if milestones.iter().any(|m| m.active_delegates == 0) {
            return Err(TypeError::InvalidMilestones(
                "active_delegates must be positive".into(),
            ));
        }
        Ok(Self { milestones })
    }

    /// Default schedule for a network.
    pub fn for_network(network: NetworkId) -> Self {
        let milestones = match network {
            NetworkId::Live => vec![
                Milestone {
                    height: 1,
                    active_delegates: 51,
                    max_transactions: 50,
                    reward: Amount::ZERO,
                    multi_payment_limit: 64,
                },
                Milestone {
                    height: 75_600,
                    active_delegates: 51,
                    max_transactions: 150,
                    reward: Amount::new(2 * TOKEN_UNIT),
                    multi_payment_limit: 128,
                },
            ],
            NetworkId::Test => vec![Milestone {
                height: 1,
                active_delegates: 51,
                max_transactions: 150,
                reward: Amount::new(2 * TOKEN_UNIT),
                multi_payment_limit: 128,
            }],
            NetworkId::Dev => vec![Milestone {
                height: 1,
                active_delegates: 5,
                max_transactions: 150,
                reward: Amount::new(2 * TOKEN_UNIT),
                multi_payment_limit: 256,
            }],
        };
        Self { milestones }
    }

    /// The milestone active at `height`.
    pub fn get(&self, height: u64) -> &Milestone {
        let idx = self
            .milestones
            .partition_point(|m| m.height <= height.max(1));
        &self.milestones[idx.saturating_sub(1)]
    }

    /// Milestones in ascending height order.
    pub fn iter(&self) -> impl Iterator<Item = &Milestone> {
        self.milestones.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn milestone(height: u64, active_delegates: u32) -> Milestone {
        Milestone {
            height,
            active_delegates,
            max_transactions: 10,
            reward: Amount::ZERO,
            multi_payment_limit: 4,
        }
    }

    #[test]
    fn get_returns_latest_active() {
        let ms = Milestones::new(vec![milestone(1, 3), milestone(100, 5)]).unwrap();
        assert_eq!(ms.get(0).active_delegates, 3);
        assert_eq!(ms.get(1).active_delegates, 3);
        assert_eq!(ms.get(99).active_delegates, 3);
        assert_eq!(ms.get(100).active_delegates, 5);
        assert_eq!(ms.get(u64::MAX).active_delegates, 5);
    }

    #[test]
    fn new_sorts_unordered_input() {
        let ms = Milestones::new(vec![milestone(100, 5), milestone(1, 3)]).unwrap();
        let heights: Vec<u64> = ms.iter().map(|m| m.height).collect();
        assert_eq!(heights, vec![1, 100]);
    }

    #[test]
    fn new_rejects_bad_schedules() {
        assert!(Milestones::new(vec![]).is_err());
        assert!(Milestones::new(vec![milestone(2, 3)]).is_err());
        assert!(Milestones::new(vec![milestone(1, 3), milestone(1, 4)]).is_err());
        assert!(Milestones::new(vec![milestone(1, 0)]).is_err());
    }

    #[test]
    fn network_defaults_start_at_genesis() {
        for network in [NetworkId::Live, NetworkId::Test, NetworkId::Dev] {
            assert_eq!(Milestones::for_network(network).get(1).height, 1);
        }
    }
}
