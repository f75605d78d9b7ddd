//! Round-boundary delegate selection.
//!
//! At every round boundary the engine recomputes vote balances from scratch,
//! ranks all non-resigned delegates by `(vote_balance desc, public_key asc)`
//! and assigns the top `max_delegates` to the new round. Built rounds are kept
//! in a bounded history so reverting a round-closing block can restore the
//! previous round exactly.

use crate::round::RoundInfo;
use crate::vote_balances::VoteBalances;
use crate::DposError;
use kestrel_crypto::sha256;
use kestrel_ledger::WalletLedger;
use kestrel_types::{Address, Amount, Milestones, PublicKey};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

/// Rounds retained for revert.
pub const DEFAULT_ROUND_HISTORY: usize = 10;

/// A delegate's place in a ranking.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RankedDelegate {
    pub address: Address,
    pub public_key: PublicKey,
    pub username: String,
    pub vote_balance: Amount,
    /// 1-based.
    pub rank: u32,
}

/// The delegates assigned to forge one round.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Round {
    pub info: RoundInfo,
    /// Round delegates in rank order.
    pub delegates: Vec<RankedDelegate>,
    /// `delegate.round` of each round delegate before this round stamped it.
    previous_stamps: Vec<(Address, Option<u64>)>,
}

impl Round {
    pub fn contains(&self, public_key: &PublicKey) -> bool {
        self.delegates.iter().any(|d| d.public_key == *public_key)
    }
}

pub struct DposRoundEngine {
    milestones: Milestones,
    current: Option<Round>,
    history: BTreeMap<u64, Round>,
    history_limit: usize,
}

impl DposRoundEngine {
    pub fn new(milestones: Milestones) -> Self {
        Self::with_history(milestones, DEFAULT_ROUND_HISTORY)
    }

    pub fn with_history(milestones: Milestones, history_limit: usize) -> Self {
        Self {
            milestones,
            current: None,
            history: BTreeMap::new(),
            history_limit: history_limit.max(1),
        }
    }

    pub fn milestones(&self) -> &Milestones {
        &self.milestones
    }

    pub fn current_round(&self) -> Option<&Round> {
        self.current.as_ref()
    }

    pub fn round_info(&self, height: u64) -> Result<RoundInfo, DposError> {
        RoundInfo::for_height(height, &self.milestones)
    }

    /// Recompute every delegate's vote balance from zero.
    pub fn build_vote_balances(&self, ledger: &mut WalletLedger) -> Result<(), DposError> {
        VoteBalances::rebuild(ledger)?.apply(ledger);
        Ok(())
    }

    /// Rank every non-resigned delegate and stamp its rank; resigned
    /// delegates lose theirs.
    pub fn build_delegate_ranking(
        &self,
        ledger: &mut WalletLedger,
    ) -> Result<Vec<RankedDelegate>, DposError> {
        let mut candidates = Vec::new();
        for wallet in ledger.delegates() {
            let Some(delegate) = wallet.attributes.delegate.as_ref() else { continue };
            if delegate.resigned {
                continue;
            }
            let public_key = wallet
                .public_key
                .ok_or_else(|| DposError::MissingPublicKey(wallet.address.clone()))?;
            candidates.push(RankedDelegate {
                address: wallet.address.clone(),
                public_key,
                username: delegate.username.clone(),
                vote_balance: delegate.vote_balance,
                rank: 0,
            });
        }

        candidates.sort_by(|a, b| {
            b.vote_balance
                .cmp(&a.vote_balance)
                .then_with(|| a.public_key.cmp(&b.public_key))
        });
        if let Some(pair) = candidates
            .windows(2)
            .find(|w| w[0].vote_balance == w[1].vote_balance && w[0].public_key == w[1].public_key)
        {
            return Err(DposError::DuplicateDelegateIndex {
                public_key: pair[0].public_key,
                vote_balance: pair[0].vote_balance,
            });
        }

        let mut ranks: HashMap<Address, u32> = HashMap::with_capacity(candidates.len());
        for (index, candidate) in candidates.iter_mut().enumerate() {
            candidate.rank = index as u32 + 1;
            ranks.insert(candidate.address.clone(), candidate.rank);
        }
        for wallet in ledger.wallets_mut() {
            if let Some(delegate) = wallet.attributes.delegate.as_mut() {
                delegate.rank = ranks.get(&wallet.address).copied();
            }
        }
        Ok(candidates)
    }

    /// Assign the top `info.max_delegates` of `ranked` to round `info.round`.
    pub fn set_delegates_round(
        &mut self,
        ledger: &mut WalletLedger,
        info: RoundInfo,
        ranked: &[RankedDelegate],
    ) -> Result<&Round, DposError> {
        let required = info.max_delegates as usize;
        if ranked.len() < required {
            return Err(DposError::InsufficientDelegates {
                required: info.max_delegates,
                available: ranked.len() as u32,
            });
        }

        let delegates = ranked[..required].to_vec();
        let mut previous_stamps = Vec::with_capacity(required);
        for delegate in &delegates {
            let mut wallet = match ledger.find_by_address(&delegate.address) {
                Some(wallet) => wallet.clone(),
                None => return Err(DposError::MissingPublicKey(delegate.address.clone())),
            };
            if let Some(attribute) = wallet.attributes.delegate.as_mut() {
                previous_stamps.push((delegate.address.clone(), attribute.round));
                attribute.round = Some(info.round);
            }
            ledger.index(wallet);
        }

        let round = Round { info, delegates, previous_stamps };
        self.history.insert(info.round, round.clone());
        while self.history.len() > self.history_limit {
            self.history.pop_first();
        }
        Ok(self.current.insert(round))
    }

    /// Build the round that `height` belongs to.
    pub fn build_round(&mut self, ledger: &mut WalletLedger, height: u64) -> Result<&Round, DposError> {
        let info = self.round_info(height)?;
        self.build_vote_balances(ledger)?;
        let ranked = self.build_delegate_ranking(ledger)?;
        let round = self.set_delegates_round(ledger, info, &ranked)?;
        info!(
            round = round.info.round,
            height,
            delegates = round.delegates.len(),
            ranked = ranked.len(),
            "round built"
        );
        Ok(round)
    }

    /// Undo the round built after `closing_height`, the last block of the
    /// round before it, which has just been reverted.
    ///
    /// Restores the previous round from history; rebuilds it from current
    /// ledger state when history no longer has it.
    pub fn revert_round(&mut self, ledger: &mut WalletLedger, closing_height: u64) -> Result<(), DposError> {
        let reverted = self.round_info(closing_height + 1)?;
        if let Some(round) = self.history.remove(&reverted.round) {
            for (address, stamp) in round.previous_stamps {
                if let Some(wallet) = ledger.find_by_address(&address) {
                    let mut wallet = wallet.clone();
                    if let Some(attribute) = wallet.attributes.delegate.as_mut() {
                        attribute.round = stamp;
                    }
                    ledger.index(wallet);
                }
            }
        }

        let info = self.round_info(closing_height)?;
        match self.history.get(&info.round).cloned() {
            Some(round) => {
                debug!(round = info.round, "restored round from history");
                self.current = Some(round);
            }
            None => {
                self.build_round(ledger, closing_height)?;
            }
        }
        Ok(())
    }

    /// Drop the current round and all history, for a ledger rebuild.
    pub fn reset(&mut self) {
        self.current = None;
        self.history.clear();
    }

    /// Current round delegates in forging order: a shuffle seeded with the
    /// SHA-256 of the round number, re-hashed after every four swaps.
    pub fn forging_order(&self) -> Vec<PublicKey> {
        let Some(round) = &self.current else { return Vec::new() };
        let mut order: Vec<PublicKey> = round.delegates.iter().map(|d| d.public_key).collect();
        let count = order.len();
        let mut seed = sha256(round.info.round.to_string().as_bytes());
        let mut i = 0;
        while i < count {
            for byte in &seed[..4] {
                if i >= count {
                    break;
                }
                order.swap(i, *byte as usize % count);
                i += 1;
            }
            seed = sha256(&seed);
        }
        order
    }

    /// Delegate expected to forge `slot` of the current round.
    pub fn forger_for_slot(&self, slot: u64) -> Option<PublicKey> {
        let order = self.forging_order();
        if order.is_empty() {
            return None;
        }
        Some(order[(slot % order.len() as u64) as usize])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_crypto::keypair_from_seed;
    use kestrel_ledger::DelegateAttribute;
    use kestrel_types::{Milestone, NetworkId};

    fn key(seed: u8) -> PublicKey {
        keypair_from_seed(&[seed; 32]).public
    }

    fn milestones(active: u32) -> Milestones {
        Milestones::new(vec![Milestone {
            height: 1,
            active_delegates: active,
            max_transactions: 50,
            reward: Amount::ZERO,
            multi_payment_limit: 64,
        }])
        .unwrap()
    }

    fn add_delegate(ledger: &mut WalletLedger, seed: u8, votes: i128) {
        let mut wallet = ledger.find_or_create_by_public_key(&key(seed)).clone();
        wallet.attributes.delegate = Some(DelegateAttribute::new(format!("d{seed}")));
        ledger.index(wallet);
        if votes > 0 {
            let voter = ledger.find_or_create_by_public_key(&key(seed + 100));
            voter.balance = Amount::new(votes);
            voter.attributes.vote = Some(key(seed));
        }
    }

    #[test]
    fn ranking_orders_by_balance_then_key() {
        let mut ledger = WalletLedger::new();
        add_delegate(&mut ledger, 1, 10);
        add_delegate(&mut ledger, 2, 30);
        add_delegate(&mut ledger, 3, 10);
        let engine = DposRoundEngine::new(milestones(3));
        engine.build_vote_balances(&mut ledger).unwrap();
        let ranked = engine.build_delegate_ranking(&mut ledger).unwrap();

        assert_eq!(ranked[0].public_key, key(2));
        let (low, high) = if key(1) < key(3) { (key(1), key(3)) } else { (key(3), key(1)) };
        assert_eq!(ranked[1].public_key, low);
        assert_eq!(ranked[2].public_key, high);
        assert_eq!(ranked.iter().map(|d| d.rank).collect::<Vec<_>>(), vec![1, 2, 3]);
        let stamped = ledger.find_by_public_key(&key(2)).unwrap();
        assert_eq!(stamped.attributes.delegate.as_ref().unwrap().rank, Some(1));
    }

    #[test]
    fn resigned_delegates_are_not_ranked() {
        let mut ledger = WalletLedger::new();
        add_delegate(&mut ledger, 1, 10);
        add_delegate(&mut ledger, 2, 30);
        let mut wallet = ledger.find_by_public_key(&key(2)).unwrap().clone();
        wallet.attributes.delegate.as_mut().unwrap().resigned = true;
        ledger.index(wallet);

        let engine = DposRoundEngine::new(milestones(1));
        engine.build_vote_balances(&mut ledger).unwrap();
        let ranked = engine.build_delegate_ranking(&mut ledger).unwrap();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].public_key, key(1));
        let resigned = ledger.find_by_public_key(&key(2)).unwrap();
        assert_eq!(resigned.attributes.delegate.as_ref().unwrap().rank, None);
    }

    #[test]
    fn same_key_twice_is_fatal() {
        let mut ledger = WalletLedger::new();
        add_delegate(&mut ledger, 1, 0);
        // A second wallet carrying the same public key: an indexing bug.
        let mut copy = ledger.find_by_public_key(&key(1)).unwrap().clone();
        copy.address = Address::new(format!("kst_{}", "9".repeat(60)));
        copy.attributes.delegate = Some(DelegateAttribute::new("shadow"));
        ledger.index(copy);

        let engine = DposRoundEngine::new(milestones(1));
        assert_eq!(
            engine.build_delegate_ranking(&mut ledger),
            Err(DposError::DuplicateDelegateIndex { public_key: key(1), vote_balance: Amount::ZERO })
        );
    }

    #[test]
    fn too_few_delegates_is_fatal() {
        let mut ledger = WalletLedger::new();
        add_delegate(&mut ledger, 1, 10);
        let mut engine = DposRoundEngine::new(milestones(2));
        assert_eq!(
            engine.build_round(&mut ledger, 1).map(|_| ()),
            Err(DposError::InsufficientDelegates { required: 2, available: 1 })
        );
    }

    #[test]
    fn round_takes_top_delegates_and_stamps_them() {
        let mut ledger = WalletLedger::new();
        for seed in 1..=4 {
            add_delegate(&mut ledger, seed, i128::from(seed) * 10);
        }
        let mut engine = DposRoundEngine::new(milestones(3));
        let round = engine.build_round(&mut ledger, 4).unwrap();
        assert_eq!(round.info.round, 2);
        let keys: Vec<_> = round.delegates.iter().map(|d| d.public_key).collect();
        assert_eq!(keys, vec![key(4), key(3), key(2)]);

        let stamp = |seed| {
            ledger.find_by_public_key(&key(seed)).unwrap().attributes.delegate.as_ref().unwrap().round
        };
        assert_eq!(stamp(4), Some(2));
        assert_eq!(stamp(1), None);
    }

    #[test]
    fn revert_round_restores_previous_round_and_stamps() {
        let mut ledger = WalletLedger::new();
        for seed in 1..=3 {
            add_delegate(&mut ledger, seed, i128::from(seed) * 10);
        }
        let mut engine = DposRoundEngine::new(milestones(2));
        engine.build_round(&mut ledger, 1).unwrap();
        let first = engine.current_round().unwrap().clone();

        // Delegate 1 overtakes everyone before the round closes at height 2.
        ledger.find_or_create_by_public_key(&key(101)).balance = Amount::new(1_000);
        engine.build_round(&mut ledger, 3).unwrap();
        assert!(engine.current_round().unwrap().contains(&key(1)));

        engine.revert_round(&mut ledger, 2).unwrap();
        assert_eq!(engine.current_round(), Some(&first));
        let stamp = ledger.find_by_public_key(&key(1)).unwrap().attributes.delegate.as_ref().unwrap().round;
        assert_eq!(stamp, None);
    }

    #[test]
    fn revert_without_history_rebuilds() {
        let mut ledger = WalletLedger::new();
        for seed in 1..=2 {
            add_delegate(&mut ledger, seed, 10);
        }
        let mut engine = DposRoundEngine::with_history(milestones(2), 1);
        engine.build_round(&mut ledger, 1).unwrap();
        engine.build_round(&mut ledger, 3).unwrap();
        engine.revert_round(&mut ledger, 2).unwrap();
        assert_eq!(engine.current_round().unwrap().info.round, 1);
    }

    #[test]
    fn forging_order_is_deterministic_permutation() {
        let mut ledger = WalletLedger::new();
        for seed in 1..=5 {
            add_delegate(&mut ledger, seed, i128::from(seed));
        }
        let mut engine = DposRoundEngine::new(Milestones::for_network(NetworkId::Dev));
        engine.build_round(&mut ledger, 1).unwrap();
        let order = engine.forging_order();
        assert_eq!(order, engine.forging_order());

        let mut sorted = order.clone();
        sorted.sort();
        let mut expected: Vec<_> = (1..=5).map(key).collect();
        expected.sort();
        assert_eq!(sorted, expected);

        assert_eq!(engine.forger_for_slot(0), Some(order[0]));
        assert_eq!(engine.forger_for_slot(7), Some(order[2]));
    }

    #[test]
    fn no_round_means_no_forger() {
        let engine = DposRoundEngine::new(milestones(1));
        assert!(engine.forging_order().is_empty());
        assert_eq!(engine.forger_for_slot(0), None);
    }
}
