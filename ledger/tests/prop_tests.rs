use proptest::prelude::*;

use kestrel_crypto::{derive_address, keypair_from_seed};
use kestrel_ledger::{Exceptions, LedgerMutator, Wallet, WalletLedger};
use kestrel_transactions::{Transaction, TransactionAsset, TransactionBuilder, VoteAction};
use kestrel_types::{Amount, Milestones, NetworkId, PublicKey};

fn key(index: u8) -> PublicKey {
    keypair_from_seed(&[index + 1; 32]).public
}

fn mutator() -> LedgerMutator {
    LedgerMutator::new(Milestones::for_network(NetworkId::Dev), Exceptions::default())
}

fn ledger_with(balances: &[i128]) -> WalletLedger {
    let mut ledger = WalletLedger::new();
    for (index, balance) in balances.iter().enumerate() {
        ledger.find_or_create_by_public_key(&key(index as u8)).balance = Amount::new(*balance);
    }
    ledger
}

fn snapshot(ledger: &WalletLedger) -> Vec<Wallet> {
    let mut wallets: Vec<Wallet> = ledger.wallets().cloned().collect();
    wallets.sort_by(|a, b| a.address.cmp(&b.address));
    wallets
}

fn next_nonce(ledger: &WalletLedger, sender: &PublicKey) -> u64 {
    ledger.find_by_public_key(sender).map_or(1, |w| w.nonce + 1)
}

proptest! {
    /// Undoing an applied transfer restores both wallets exactly.
    #[test]
    fn transfer_round_trip(
        balance in 0i128..1_000_000,
        amount in 1i128..1_000_000,
        fee in 0i128..1_000,
    ) {
        prop_assume!(amount + fee <= balance);
        let mut ledger = ledger_with(&[balance, 0]);
        let before = snapshot(&ledger);
        let tx = TransactionBuilder::transfer(key(0), 1, derive_address(&key(1)), Amount::new(amount))
            .fee(Amount::new(fee))
            .build();
        let mutator = mutator();
        mutator.apply_transaction(&mut ledger, &tx, 2).unwrap();
        mutator.undo_transaction(&mut ledger, &tx).unwrap();
        prop_assert_eq!(snapshot(&ledger), before);
    }

    /// Registration and voting undo back to the original attributes.
    #[test]
    fn vote_round_trip(voter_balance in 0i128..1_000, fee in 0i128..10) {
        prop_assume!(fee <= voter_balance);
        let mut ledger = ledger_with(&[voter_balance, 100]);
        let mutator = mutator();
        let register = TransactionBuilder::new(
            key(1),
            1,
            TransactionAsset::DelegateRegistration { username: "delegate".into() },
        )
        .build();
        mutator.apply_transaction(&mut ledger, &register, 2).unwrap();

        let before = snapshot(&ledger);
        let vote = TransactionBuilder::new(key(0), 1, TransactionAsset::Vote(VoteAction::Vote(key(1))))
            .fee(Amount::new(fee))
            .build();
        mutator.apply_transaction(&mut ledger, &vote, 2).unwrap();
        mutator.undo_transaction(&mut ledger, &vote).unwrap();
        prop_assert_eq!(snapshot(&ledger), before);
    }

    /// Random transfer traffic never drives a balance negative, and undoing
    /// everything that was applied restores the starting ledger.
    #[test]
    fn balances_stay_non_negative(
        ops in prop::collection::vec((0u8..4, 0u8..4, 1i128..600, 0i128..20), 1..40),
    ) {
        let mut ledger = ledger_with(&[1_000, 1_000, 1_000, 1_000]);
        let before = snapshot(&ledger);
        let mutator = mutator();
        let mut applied: Vec<Transaction> = Vec::new();

        for (from, to, amount, fee) in ops {
            let nonce = next_nonce(&ledger, &key(from));
            let tx = TransactionBuilder::transfer(key(from), nonce, derive_address(&key(to)), Amount::new(amount))
                .fee(Amount::new(fee))
                .build();
            if mutator.apply_transaction(&mut ledger, &tx, 2).is_ok() {
                applied.push(tx);
            }
            prop_assert!(ledger.wallets().all(|w| !w.balance.is_negative()));
        }

        for tx in applied.iter().rev() {
            mutator.undo_transaction(&mut ledger, tx).unwrap();
        }
        prop_assert_eq!(snapshot(&ledger), before);
    }
}
