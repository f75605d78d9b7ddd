//! Height to round mapping.
//!
//! Round 1 starts at height 1. Each round spans `active_delegates` heights of
//! the milestone in force, so a milestone changing the delegate count must
//! land exactly on a round boundary.

use crate::DposError;
use kestrel_types::Milestones;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RoundInfo {
    pub round: u64,
    /// First height of the round.
    pub round_height: u64,
    pub next_round: u64,
    pub max_delegates: u32,
}

impl RoundInfo {
    pub fn for_height(height: u64, milestones: &Milestones) -> Result<Self, DposError> {
        let height = height.max(1);
        let mut round = 1u64;
        let mut round_height = 1u64;
        let mut active = milestones.get(1).active_delegates;

        for milestone in milestones.iter().skip(1) {
            if milestone.height > height {
                break;
            }
            if milestone.active_delegates == active {
                continue;
            }
            let span = milestone.height - round_height;
            if span % u64::from(active) != 0 {
                return Err(DposError::InvalidMilestoneSpan {
                    height: milestone.height,
                    active_delegates: active,
                });
            }
            round += span / u64::from(active);
            round_height = milestone.height;
            active = milestone.active_delegates;
        }

        let rounds = (height - round_height) / u64::from(active);
        round += rounds;
        round_height += rounds * u64::from(active);

        Ok(Self {
            round,
            round_height,
            next_round: round + 1,
            max_delegates: active,
        })
    }

    /// Whether `height` is the first height of its round.
    pub fn is_new_round(height: u64, milestones: &Milestones) -> Result<bool, DposError> {
        Ok(Self::for_height(height, milestones)?.round_height == height)
    }

    pub fn last_height(&self) -> u64 {
        self.round_height + u64::from(self.max_delegates) - 1
    }
}
