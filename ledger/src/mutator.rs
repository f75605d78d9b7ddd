//! Reversible application of transactions and blocks to the wallet ledger.
//!
//! A block applies transaction by transaction in recorded order, then credits
//! the generator. Any failure unwinds the transactions already applied, so a
//! block is never left half applied. Undo is the exact inverse and is expected
//! to succeed on anything previously applied; its failures are fatal.
//!
//! Each transaction's writes are staged on copies of the wallets it touches
//! and committed in one step, so a failing transaction changes nothing.

use crate::error::LedgerError;
use crate::exceptions::Exceptions;
use crate::staging::Staged;
use crate::wallet::{
    Bridgechain, BusinessAttribute, DelegateAttribute, HtlcLock, MultiSignatureAttribute, Wallet,
};
use crate::wallet_ledger::{LedgerChanges, SettledLock};
use crate::WalletLedger;
use kestrel_crypto::{derive_address, sha256, verify_signature};
use kestrel_transactions::{validate_transaction, Block, Transaction, TransactionAsset, VoteAction};
use kestrel_types::{Address, Amount, Milestones, TransactionId};
use std::collections::HashSet;
use tracing::{debug, error, warn};

pub struct LedgerMutator {
    milestones: Milestones,
    exceptions: Exceptions,
}

impl LedgerMutator {
    pub fn new(milestones: Milestones, exceptions: Exceptions) -> Self {
        Self { milestones, exceptions }
    }

    pub fn milestones(&self) -> &Milestones {
        &self.milestones
    }

    pub fn exceptions(&self) -> &Exceptions {
        &self.exceptions
    }

    /// Apply every transaction of `block`, then its reward.
    pub fn apply_block(&self, ledger: &mut WalletLedger, block: &Block) -> Result<(), LedgerError> {
        if !block.is_genesis() {
            let known = ledger
                .find_by_public_key(&block.generator_public_key)
                .is_some_and(Wallet::is_delegate);
            if !known {
                return Err(LedgerError::UnknownGenerator(block.generator_public_key));
            }
        }

        let mut applied: Vec<&Transaction> = Vec::with_capacity(block.transactions.len());
        for tx in &block.transactions {
            if let Err(err) = self.apply_transaction(ledger, tx, block.height) {
                warn!(height = block.height, id = %tx.id, error = %err, "transaction rejected, unwinding block");
                self.unwind(ledger, &applied)?;
                return Err(err);
            }
            applied.push(tx);
        }

        if let Err(err) = apply_reward(ledger, block) {
            self.unwind(ledger, &applied)?;
            return Err(err);
        }
        Ok(())
    }

    /// Undo the reward, then every transaction in reverse order. A failing
    /// transaction undo re-applies what was already undone before reporting.
    pub fn undo_block(&self, ledger: &mut WalletLedger, block: &Block) -> Result<(), LedgerError> {
        undo_reward(ledger, block)?;

        let mut undone: Vec<&Transaction> = Vec::with_capacity(block.transactions.len());
        for tx in block.transactions.iter().rev() {
            if let Err(err) = self.undo_transaction(ledger, tx) {
                error!(height = block.height, id = %tx.id, error = %err, "transaction undo failed");
                for tx in undone.iter().rev() {
                    let changes = stage_apply(ledger, tx).map_err(LedgerError::CorruptedChain)?;
                    self.commit_apply(ledger, tx, changes);
                }
                apply_reward(ledger, block)
                    .map_err(|e| LedgerError::CorruptedChain(e.to_string()))?;
                return Err(err);
            }
            undone.push(tx);
        }
        Ok(())
    }

    /// Validate `tx` against current state at `height` and apply it.
    ///
    /// Transactions on the exceptions list skip validation entirely. The
    /// state they overwrite is kept so their undo restores it exactly.
    pub fn apply_transaction(
        &self,
        ledger: &mut WalletLedger,
        tx: &Transaction,
        height: u64,
    ) -> Result<(), LedgerError> {
        if height > 1 && ledger.find_by_public_key(&tx.sender_public_key).is_none() {
            return Err(LedgerError::UnknownSender(tx.sender_public_key));
        }

        if self.exceptions.contains(&tx.id) {
            warn!(id = %tx.id, height, kind = %tx.kind(), "force-applying excepted transaction");
        } else {
            self.can_apply(ledger, tx, height)?;
        }

        let changes = stage_apply(ledger, tx)
            .map_err(|reason| LedgerError::cannot_apply(tx.id, reason))?;
        self.commit_apply(ledger, tx, changes);
        debug!(id = %tx.id, height, kind = %tx.kind(), "applied transaction");
        Ok(())
    }

    /// Exact inverse of [`apply_transaction`](Self::apply_transaction).
    pub fn undo_transaction(&self, ledger: &mut WalletLedger, tx: &Transaction) -> Result<(), LedgerError> {
        if let Some(prior) = ledger.take_forced(&tx.id) {
            ledger.commit(prior);
            debug!(id = %tx.id, kind = %tx.kind(), "restored state before excepted transaction");
            return Ok(());
        }
        let changes = stage_undo(ledger, tx)
            .map_err(|reason| LedgerError::UndoFailed { id: tx.id, reason })?;
        ledger.commit(changes);
        debug!(id = %tx.id, kind = %tx.kind(), "undid transaction");
        Ok(())
    }

    /// Every check `apply_transaction` runs, without mutating anything.
    pub fn can_apply(&self, ledger: &WalletLedger, tx: &Transaction, height: u64) -> Result<(), LedgerError> {
        check_registry(ledger, tx)?;
        self.check_preconditions(ledger, tx, height)
    }

    fn commit_apply(&self, ledger: &mut WalletLedger, tx: &Transaction, changes: LedgerChanges) {
        if self.exceptions.contains(&tx.id) {
            let prior = ledger.prior_state(&changes);
            ledger.record_forced(tx.id, prior);
        }
        ledger.commit(changes);
    }

    fn unwind(&self, ledger: &mut WalletLedger, applied: &[&Transaction]) -> Result<(), LedgerError> {
        for tx in applied.iter().rev() {
            self.undo_transaction(ledger, tx)?;
        }
        Ok(())
    }

    fn check_preconditions(
        &self,
        ledger: &WalletLedger,
        tx: &Transaction,
        height: u64,
    ) -> Result<(), LedgerError> {
        let reject = |reason: String| LedgerError::cannot_apply(tx.id, reason);

        validate_transaction(tx, self.milestones.get(height)).map_err(|e| reject(e.to_string()))?;

        let cold;
        let sender = match ledger.find_by_public_key(&tx.sender_public_key) {
            Some(wallet) => wallet,
            None => {
                cold = Wallet::new(derive_address(&tx.sender_public_key));
                &cold
            }
        };

        if sender.nonce.checked_add(1) != Some(tx.nonce) {
            return Err(reject(format!(
                "nonce {} does not follow {}",
                tx.nonce, sender.nonce
            )));
        }

        check_signatures(sender, tx).map_err(reject)?;

        let needed = spent(tx).map_err(reject)?;
        if sender.balance < needed {
            return Err(LedgerError::InsufficientBalance {
                needed,
                available: sender.balance,
            });
        }

        let attributes = &sender.attributes;
        match &tx.asset {
            TransactionAsset::Transfer | TransactionAsset::MultiPayment { .. } => Ok(()),
            TransactionAsset::SecondSignature { .. } => match attributes.second_public_key {
                Some(_) => Err(reject("second signature already registered".into())),
                None => Ok(()),
            },
            TransactionAsset::DelegateRegistration { username } => {
                if sender.is_delegate() {
                    return Err(reject("wallet is already a delegate".into()));
                }
                if *username != username.to_lowercase() {
                    return Err(reject(format!("username {username:?} is not lower case")));
                }
                Ok(())
            }
            TransactionAsset::Vote(VoteAction::Vote(target)) => {
                if attributes.vote.is_some() {
                    return Err(reject("wallet already votes".into()));
                }
                let resigned = ledger
                    .find_by_public_key(target)
                    .and_then(|w| w.attributes.delegate.as_ref())
                    .is_some_and(|d| d.resigned);
                if resigned {
                    return Err(reject(format!("delegate {target} has resigned")));
                }
                Ok(())
            }
            TransactionAsset::Vote(VoteAction::Unvote(target)) => {
                if attributes.vote != Some(*target) {
                    return Err(reject(format!("wallet does not vote for {target}")));
                }
                Ok(())
            }
            TransactionAsset::MultiSignature { min, public_keys } => {
                if attributes.multisignature.is_some() {
                    return Err(reject("multisignature already registered".into()));
                }
                if public_keys.len() + 1 < *min as usize {
                    return Err(reject(format!("{} keys cannot meet min {}", public_keys.len(), min)));
                }
                if public_keys.len() != tx.signatures.len() {
                    return Err(reject(format!(
                        "{} keys but {} signatures",
                        public_keys.len(),
                        tx.signatures.len()
                    )));
                }
                let hash = tx.signing_hash();
                let mut seen = HashSet::new();
                for signed in &tx.signatures {
                    let verified = public_keys
                        .get(signed.index as usize)
                        .is_some_and(|key| verify_signature(&hash, &signed.signature, key));
                    if !verified || !seen.insert(signed.index) {
                        return Err(reject(format!("signature {} does not verify", signed.index)));
                    }
                }
                Ok(())
            }
            TransactionAsset::DelegateResignation => match &attributes.delegate {
                None => Err(reject("wallet is not a delegate".into())),
                Some(delegate) if delegate.resigned => Err(reject("delegate already resigned".into())),
                Some(_) => Ok(()),
            },
            TransactionAsset::HtlcLock { expiration_height, .. } => {
                if *expiration_height <= height {
                    return Err(reject(format!("lock expires at {expiration_height}, now {height}")));
                }
                Ok(())
            }
            TransactionAsset::HtlcClaim { lock_transaction_id, unlock_secret } => {
                let (_, lock) = ledger
                    .open_lock(lock_transaction_id)
                    .ok_or_else(|| reject(format!("no open lock {lock_transaction_id}")))?;
                if lock.recipient_id != sender.address {
                    return Err(reject("claimer is not the lock recipient".into()));
                }
                if sha256(unlock_secret) != lock.secret_hash {
                    return Err(reject("unlock secret does not match".into()));
                }
                if height >= lock.expiration_height {
                    return Err(reject("lock has expired".into()));
                }
                Ok(())
            }
            TransactionAsset::HtlcRefund { lock_transaction_id } => {
                let (owner, lock) = ledger
                    .open_lock(lock_transaction_id)
                    .ok_or_else(|| reject(format!("no open lock {lock_transaction_id}")))?;
                if *owner != sender.address {
                    return Err(reject("refund sender does not own the lock".into()));
                }
                if height < lock.expiration_height {
                    return Err(reject("lock has not expired".into()));
                }
                Ok(())
            }
            TransactionAsset::BusinessRegistration { .. } => match attributes.business {
                Some(_) => Err(reject("business already registered".into())),
                None => Ok(()),
            },
            TransactionAsset::BridgechainRegistration { name, .. } => match &attributes.business {
                None => Err(reject("no business registered".into())),
                Some(business) if business.has_bridgechain(name) => {
                    Err(reject(format!("bridgechain {name:?} already registered")))
                }
                Some(_) => Ok(()),
            },
        }
    }
}

/// Checks against the global indices rather than the sender's own wallet.
fn check_registry(ledger: &WalletLedger, tx: &Transaction) -> Result<(), LedgerError> {
    match &tx.asset {
        TransactionAsset::DelegateRegistration { username } => {
            if ledger.find_by_username(username).is_some() {
                return Err(LedgerError::DuplicateDelegateName(username.clone()));
            }
            Ok(())
        }
        TransactionAsset::Vote(action) => {
            let target = action.delegate();
            match ledger.find_by_public_key(target) {
                Some(wallet) if wallet.is_delegate() => Ok(()),
                _ => Err(LedgerError::UnknownVoteTarget(*target)),
            }
        }
        _ => Ok(()),
    }
}

fn check_signatures(sender: &Wallet, tx: &Transaction) -> Result<(), String> {
    let hash = tx.signing_hash();
    if let Some(second) = &sender.attributes.second_public_key {
        match &tx.second_signature {
            None => return Err("missing second signature".into()),
            Some(signature) if !verify_signature(&hash, signature, second) => {
                return Err("second signature does not verify".into())
            }
            Some(_) => {}
        }
    }
    if let Some(multisignature) = &sender.attributes.multisignature {
        let valid: HashSet<u8> = tx
            .signatures
            .iter()
            .filter(|signed| {
                multisignature
                    .public_keys
                    .get(signed.index as usize)
                    .is_some_and(|key| verify_signature(&hash, &signed.signature, key))
            })
            .map(|signed| signed.index)
            .collect();
        if valid.len() < multisignature.min as usize {
            return Err(format!(
                "{} of {} required signatures",
                valid.len(),
                multisignature.min
            ));
        }
    }
    Ok(())
}

/// Total debited from the sender: amount (or payment sum) plus fee.
fn spent(tx: &Transaction) -> Result<Amount, String> {
    let amount = match &tx.asset {
        TransactionAsset::MultiPayment { payments } => {
            Amount::checked_sum(payments.iter().map(|p| p.amount))
                .ok_or_else(|| "payment sum overflows".to_string())?
        }
        _ => tx.amount,
    };
    amount
        .checked_add(tx.fee)
        .ok_or_else(|| "amount plus fee overflows".to_string())
}

fn credit(target: &mut Amount, amount: Amount) -> Result<(), String> {
    *target = target
        .checked_add(amount)
        .ok_or_else(|| format!("credit of {amount} overflows"))?;
    Ok(())
}

fn debit(target: &mut Amount, amount: Amount) -> Result<(), String> {
    *target = target
        .checked_sub(amount)
        .ok_or_else(|| format!("debit of {amount} overflows"))?;
    Ok(())
}

fn recipient(tx: &Transaction) -> Result<&Address, String> {
    tx.recipient_id
        .as_ref()
        .ok_or_else(|| format!("{} without recipient", tx.kind()))
}

fn stage_apply(ledger: &WalletLedger, tx: &Transaction) -> Result<LedgerChanges, String> {
    let mut staged = Staged::new(ledger);
    let total = spent(tx)?;
    let sender = staged.wallet_by_public_key(&tx.sender_public_key);
    let sender_address = sender.address.clone();
    debit(&mut sender.balance, total)?;
    sender.nonce = tx.nonce;

    match &tx.asset {
        TransactionAsset::Transfer => {
            credit(&mut staged.wallet(recipient(tx)?).balance, tx.amount)?;
        }
        TransactionAsset::SecondSignature { public_key } => {
            staged.wallet(&sender_address).attributes.second_public_key = Some(*public_key);
        }
        TransactionAsset::DelegateRegistration { username } => {
            staged.wallet(&sender_address).attributes.delegate =
                Some(DelegateAttribute::new(username.clone()));
        }
        TransactionAsset::Vote(VoteAction::Vote(target)) => {
            staged.wallet(&sender_address).attributes.vote = Some(*target);
        }
        TransactionAsset::Vote(VoteAction::Unvote(_)) => {
            staged.wallet(&sender_address).attributes.vote = None;
        }
        TransactionAsset::MultiSignature { min, public_keys } => {
            staged.wallet(&sender_address).attributes.multisignature = Some(MultiSignatureAttribute {
                min: *min,
                public_keys: public_keys.clone(),
            });
        }
        TransactionAsset::MultiPayment { payments } => {
            for payment in payments {
                credit(&mut staged.wallet(&payment.recipient_id).balance, payment.amount)?;
            }
        }
        TransactionAsset::DelegateResignation => {
            staged
                .wallet(&sender_address)
                .attributes
                .delegate
                .as_mut()
                .ok_or("sender is not a delegate")?
                .resigned = true;
        }
        TransactionAsset::HtlcLock { secret_hash, expiration_height } => {
            let lock = HtlcLock {
                amount: tx.amount,
                recipient_id: recipient(tx)?.clone(),
                secret_hash: *secret_hash,
                expiration_height: *expiration_height,
            };
            let htlc = &mut staged.wallet(&sender_address).attributes.htlc;
            credit(&mut htlc.locked_balance, tx.amount)?;
            htlc.locks.insert(tx.id, lock);
            staged.open_lock(tx.id, sender_address);
        }
        TransactionAsset::HtlcClaim { lock_transaction_id, .. }
        | TransactionAsset::HtlcRefund { lock_transaction_id } => {
            settle_lock(&mut staged, lock_transaction_id, &sender_address)?;
        }
        TransactionAsset::BusinessRegistration { name, website } => {
            staged.wallet(&sender_address).attributes.business = Some(BusinessAttribute {
                name: name.clone(),
                website: website.clone(),
                bridgechains: Vec::new(),
            });
        }
        TransactionAsset::BridgechainRegistration { name, seed_nodes } => {
            staged
                .wallet(&sender_address)
                .attributes
                .business
                .as_mut()
                .ok_or("sender has no business")?
                .bridgechains
                .push(Bridgechain { name: name.clone(), seed_nodes: seed_nodes.clone() });
        }
    }

    Ok(staged.finish())
}

fn stage_undo(ledger: &WalletLedger, tx: &Transaction) -> Result<LedgerChanges, String> {
    let sender_address = ledger
        .find_by_public_key(&tx.sender_public_key)
        .map(|w| w.address.clone())
        .ok_or("sender has no wallet")?;
    let mut staged = Staged::new(ledger);

    match &tx.asset {
        TransactionAsset::Transfer => {
            debit(&mut staged.wallet(recipient(tx)?).balance, tx.amount)?;
        }
        TransactionAsset::SecondSignature { .. } => {
            staged.wallet(&sender_address).attributes.second_public_key = None;
        }
        TransactionAsset::DelegateRegistration { .. } => {
            staged.wallet(&sender_address).attributes.delegate = None;
        }
        TransactionAsset::Vote(VoteAction::Vote(_)) => {
            staged.wallet(&sender_address).attributes.vote = None;
        }
        TransactionAsset::Vote(VoteAction::Unvote(target)) => {
            staged.wallet(&sender_address).attributes.vote = Some(*target);
        }
        TransactionAsset::MultiSignature { .. } => {
            staged.wallet(&sender_address).attributes.multisignature = None;
        }
        TransactionAsset::MultiPayment { payments } => {
            for payment in payments.iter().rev() {
                debit(&mut staged.wallet(&payment.recipient_id).balance, payment.amount)?;
            }
        }
        TransactionAsset::DelegateResignation => {
            staged
                .wallet(&sender_address)
                .attributes
                .delegate
                .as_mut()
                .ok_or("sender is not a delegate")?
                .resigned = false;
        }
        TransactionAsset::HtlcLock { .. } => {
            let htlc = &mut staged.wallet(&sender_address).attributes.htlc;
            let lock = htlc
                .locks
                .remove(&tx.id)
                .ok_or_else(|| format!("lock {} is not open", tx.id))?;
            debit(&mut htlc.locked_balance, lock.amount)?;
            staged.close_lock(tx.id);
        }
        TransactionAsset::HtlcClaim { lock_transaction_id, .. }
        | TransactionAsset::HtlcRefund { lock_transaction_id } => {
            unsettle_lock(&mut staged, lock_transaction_id, &sender_address)?;
        }
        TransactionAsset::BusinessRegistration { .. } => {
            staged.wallet(&sender_address).attributes.business = None;
        }
        TransactionAsset::BridgechainRegistration { name, .. } => {
            let business = staged
                .wallet(&sender_address)
                .attributes
                .business
                .as_mut()
                .ok_or("sender has no business")?;
            let position = business
                .bridgechains
                .iter()
                .rposition(|b| b.name == *name)
                .ok_or_else(|| format!("bridgechain {name:?} is not registered"))?;
            business.bridgechains.remove(position);
        }
    }

    let total = spent(tx)?;
    let sender = staged.wallet(&sender_address);
    if sender.nonce != tx.nonce {
        return Err(format!(
            "sender nonce {} is not the nonce {} being undone",
            sender.nonce, tx.nonce
        ));
    }
    credit(&mut sender.balance, total)?;
    sender.nonce = tx
        .nonce
        .checked_sub(1)
        .ok_or_else(|| format!("nonce {} cannot be undone", tx.nonce))?;
    Ok(staged.finish())
}

/// Move an open lock's funds to `beneficiary` and retire the lock.
fn settle_lock(staged: &mut Staged<'_>, lock_id: &TransactionId, beneficiary: &Address) -> Result<(), String> {
    let owner = staged
        .ledger()
        .lock_owner(lock_id)
        .cloned()
        .ok_or_else(|| format!("no open lock {lock_id}"))?;
    let htlc = &mut staged.wallet(&owner).attributes.htlc;
    let lock = htlc
        .locks
        .remove(lock_id)
        .ok_or_else(|| format!("lock {lock_id} missing from its owner"))?;
    debit(&mut htlc.locked_balance, lock.amount)?;
    credit(&mut staged.wallet(beneficiary).balance, lock.amount)?;
    staged.close_lock(*lock_id);
    staged.settle(*lock_id, SettledLock { owner, lock });
    Ok(())
}

fn unsettle_lock(staged: &mut Staged<'_>, lock_id: &TransactionId, beneficiary: &Address) -> Result<(), String> {
    let SettledLock { owner, lock } = staged
        .ledger()
        .settled_lock(lock_id)
        .cloned()
        .ok_or_else(|| format!("lock {lock_id} was never settled"))?;
    debit(&mut staged.wallet(beneficiary).balance, lock.amount)?;
    let htlc = &mut staged.wallet(&owner).attributes.htlc;
    credit(&mut htlc.locked_balance, lock.amount)?;
    htlc.locks.insert(*lock_id, lock);
    staged.open_lock(*lock_id, owner);
    staged.unsettle(*lock_id);
    Ok(())
}

fn apply_reward(ledger: &mut WalletLedger, block: &Block) -> Result<(), LedgerError> {
    let overflow = || LedgerError::RewardOverflow { height: block.height };
    let mut generator = ledger
        .find_by_public_key(&block.generator_public_key)
        .cloned()
        .unwrap_or_else(|| Wallet::new(derive_address(&block.generator_public_key)));
    generator.public_key.get_or_insert(block.generator_public_key);

    let earned = block.reward.checked_add(block.total_fee).ok_or_else(overflow)?;
    generator.balance = generator.balance.checked_add(earned).ok_or_else(overflow)?;
    if let Some(delegate) = generator.attributes.delegate.as_mut() {
        delegate.produced_blocks += 1;
        delegate.forged_fees = delegate.forged_fees.checked_add(block.total_fee).ok_or_else(overflow)?;
        delegate.forged_rewards = delegate.forged_rewards.checked_add(block.reward).ok_or_else(overflow)?;
    }
    ledger.index(generator);
    Ok(())
}

fn undo_reward(ledger: &mut WalletLedger, block: &Block) -> Result<(), LedgerError> {
    let corrupted = |what: &str| {
        LedgerError::CorruptedChain(format!("cannot undo reward of block {}: {what}", block.height))
    };
    let mut generator = ledger
        .find_by_public_key(&block.generator_public_key)
        .cloned()
        .ok_or_else(|| corrupted("generator has no wallet"))?;

    let earned = block
        .reward
        .checked_add(block.total_fee)
        .ok_or_else(|| corrupted("reward overflows"))?;
    generator.balance = generator
        .balance
        .checked_sub(earned)
        .ok_or_else(|| corrupted("balance overflows"))?;
    if let Some(delegate) = generator.attributes.delegate.as_mut() {
        delegate.produced_blocks = delegate
            .produced_blocks
            .checked_sub(1)
            .ok_or_else(|| corrupted("no produced blocks"))?;
        delegate.forged_fees = delegate.forged_fees - block.total_fee;
        delegate.forged_rewards = delegate.forged_rewards - block.reward;
    }
    ledger.index(generator);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_crypto::keypair_from_seed;
    use kestrel_transactions::{Payment, TransactionBuilder};
    use kestrel_types::{BlockId, KeyPair, NetworkId, PublicKey, Timestamp};

    fn kp(seed: u8) -> KeyPair {
        keypair_from_seed(&[seed; 32])
    }

    fn pk(seed: u8) -> PublicKey {
        kp(seed).public
    }

    fn addr(seed: u8) -> Address {
        derive_address(&pk(seed))
    }

    fn mutator() -> LedgerMutator {
        LedgerMutator::new(Milestones::for_network(NetworkId::Dev), Exceptions::default())
    }

    fn funded(balances: &[(u8, i128)]) -> WalletLedger {
        let mut ledger = WalletLedger::new();
        for (seed, balance) in balances {
            ledger.find_or_create_by_public_key(&pk(*seed)).balance = Amount::new(*balance);
        }
        ledger
    }

    fn snapshot(ledger: &WalletLedger) -> Vec<Wallet> {
        let mut wallets: Vec<Wallet> = ledger.wallets().cloned().collect();
        wallets.sort_by(|a, b| a.address.cmp(&b.address));
        wallets
    }

    fn transfer(from: u8, nonce: u64, to: u8, amount: i128, fee: i128) -> Transaction {
        TransactionBuilder::transfer(pk(from), nonce, addr(to), Amount::new(amount))
            .fee(Amount::new(fee))
            .build()
    }

    fn register(seed: u8, nonce: u64, username: &str) -> Transaction {
        TransactionBuilder::new(
            pk(seed),
            nonce,
            TransactionAsset::DelegateRegistration { username: username.into() },
        )
        .build()
    }

    #[test]
    fn transfer_moves_amount_and_fee() {
        let mut ledger = funded(&[(1, 1_000)]);
        let tx = transfer(1, 1, 2, 300, 10);
        mutator().apply_transaction(&mut ledger, &tx, 2).unwrap();

        let sender = ledger.find_by_address(&addr(1)).unwrap();
        assert_eq!(sender.balance, Amount::new(690));
        assert_eq!(sender.nonce, 1);
        assert_eq!(sender.public_key, Some(pk(1)));
        assert_eq!(ledger.find_by_address(&addr(2)).unwrap().balance, Amount::new(300));
    }

    #[test]
    fn undo_transaction_restores_wallets() {
        let mut ledger = funded(&[(1, 1_000), (2, 5)]);
        let before = snapshot(&ledger);
        let tx = transfer(1, 1, 2, 300, 10);
        let mutator = mutator();
        mutator.apply_transaction(&mut ledger, &tx, 2).unwrap();
        mutator.undo_transaction(&mut ledger, &tx).unwrap();
        assert_eq!(snapshot(&ledger), before);
    }

    #[test]
    fn insufficient_balance_is_rejected() {
        let mut ledger = funded(&[(1, 100)]);
        let err = mutator()
            .apply_transaction(&mut ledger, &transfer(1, 1, 2, 95, 10), 2)
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientBalance { needed: Amount::new(105), available: Amount::new(100) }
        );
    }

    #[test]
    fn nonce_must_follow_wallet_nonce() {
        let mut ledger = funded(&[(1, 100)]);
        let err = mutator()
            .apply_transaction(&mut ledger, &transfer(1, 2, 2, 1, 0), 2)
            .unwrap_err();
        assert!(matches!(err, LedgerError::CannotApply { .. }));
    }

    #[test]
    fn unknown_sender_rejected_after_genesis() {
        let mut ledger = WalletLedger::new();
        let err = mutator()
            .apply_transaction(&mut ledger, &transfer(1, 1, 2, 1, 0), 2)
            .unwrap_err();
        assert_eq!(err, LedgerError::UnknownSender(pk(1)));
        assert!(ledger.is_empty());
    }

    #[test]
    fn duplicate_delegate_name_leaves_ledger_unchanged() {
        let mut ledger = funded(&[(1, 100), (2, 100)]);
        let mutator = mutator();
        mutator.apply_transaction(&mut ledger, &register(1, 1, "alice"), 2).unwrap();
        let before = snapshot(&ledger);

        let dup = TransactionBuilder::new(
            pk(2),
            1,
            TransactionAsset::DelegateRegistration { username: "alice".into() },
        )
        .build();
        let err = mutator.apply_transaction(&mut ledger, &dup, 2).unwrap_err();
        assert_eq!(err, LedgerError::DuplicateDelegateName("alice".into()));
        assert_eq!(snapshot(&ledger), before);
    }

    #[test]
    fn duplicate_check_ignores_case() {
        let mut ledger = funded(&[(1, 100), (2, 100)]);
        let mutator = mutator();
        mutator.apply_transaction(&mut ledger, &register(1, 1, "alice"), 2).unwrap();
        // Upper-case input still collides with the indexed lower-case name.
        let err = mutator
            .apply_transaction(&mut ledger, &register(2, 1, "ALICE"), 2)
            .unwrap_err();
        assert_eq!(err, LedgerError::DuplicateDelegateName("ALICE".into()));
    }

    #[test]
    fn upper_case_username_fails_precondition() {
        let mut ledger = funded(&[(1, 100)]);
        let err = mutator()
            .apply_transaction(&mut ledger, &register(1, 1, "Alice"), 2)
            .unwrap_err();
        assert!(matches!(err, LedgerError::CannotApply { .. }));
    }

    #[test]
    fn vote_requires_delegate_target() {
        let mut ledger = funded(&[(1, 100), (2, 100)]);
        let vote = TransactionBuilder::new(pk(1), 1, TransactionAsset::Vote(VoteAction::Vote(pk(2)))).build();
        let err = mutator().apply_transaction(&mut ledger, &vote, 2).unwrap_err();
        assert_eq!(err, LedgerError::UnknownVoteTarget(pk(2)));
    }

    #[test]
    fn vote_and_unvote_toggle() {
        let mut ledger = funded(&[(1, 100), (2, 100)]);
        let mutator = mutator();
        mutator.apply_transaction(&mut ledger, &register(2, 1, "bob"), 2).unwrap();

        let vote = TransactionBuilder::new(pk(1), 1, TransactionAsset::Vote(VoteAction::Vote(pk(2)))).build();
        mutator.apply_transaction(&mut ledger, &vote, 2).unwrap();
        assert_eq!(ledger.find_by_address(&addr(1)).unwrap().attributes.vote, Some(pk(2)));

        let again = TransactionBuilder::new(pk(1), 2, TransactionAsset::Vote(VoteAction::Vote(pk(2)))).build();
        assert!(matches!(
            mutator.apply_transaction(&mut ledger, &again, 2),
            Err(LedgerError::CannotApply { .. })
        ));

        let unvote = TransactionBuilder::new(pk(1), 2, TransactionAsset::Vote(VoteAction::Unvote(pk(2)))).build();
        mutator.apply_transaction(&mut ledger, &unvote, 2).unwrap();
        assert_eq!(ledger.find_by_address(&addr(1)).unwrap().attributes.vote, None);

        mutator.undo_transaction(&mut ledger, &unvote).unwrap();
        assert_eq!(ledger.find_by_address(&addr(1)).unwrap().attributes.vote, Some(pk(2)));
    }

    #[test]
    fn resigned_delegate_cannot_be_voted_for() {
        let mut ledger = funded(&[(1, 100), (2, 100)]);
        let mutator = mutator();
        mutator.apply_transaction(&mut ledger, &register(2, 1, "bob"), 2).unwrap();
        let resign = TransactionBuilder::new(pk(2), 2, TransactionAsset::DelegateResignation).build();
        mutator.apply_transaction(&mut ledger, &resign, 2).unwrap();
        assert_eq!(ledger.find_by_username("bob").unwrap().username(), Some("bob"));

        let vote = TransactionBuilder::new(pk(1), 1, TransactionAsset::Vote(VoteAction::Vote(pk(2)))).build();
        assert!(matches!(
            mutator.apply_transaction(&mut ledger, &vote, 2),
            Err(LedgerError::CannotApply { .. })
        ));
    }

    #[test]
    fn second_signature_enforced_after_registration() {
        let mut ledger = funded(&[(1, 100)]);
        let mutator = mutator();
        let second = kp(9);
        let register_second = TransactionBuilder::new(
            pk(1),
            1,
            TransactionAsset::SecondSignature { public_key: second.public },
        )
        .build();
        mutator.apply_transaction(&mut ledger, &register_second, 2).unwrap();

        let unsigned = transfer(1, 2, 2, 1, 0);
        assert!(matches!(
            mutator.apply_transaction(&mut ledger, &unsigned, 2),
            Err(LedgerError::CannotApply { .. })
        ));

        let signed = TransactionBuilder::transfer(pk(1), 2, addr(2), Amount::new(1))
            .second_sign(&second.private)
            .build();
        mutator.apply_transaction(&mut ledger, &signed, 2).unwrap();
    }

    #[test]
    fn multisignature_registration_needs_all_signatures() {
        let mut ledger = funded(&[(1, 100)]);
        let mutator = mutator();
        let (a, b) = (kp(10), kp(11));
        let asset = TransactionAsset::MultiSignature { min: 2, public_keys: vec![a.public, b.public] };

        let partial = TransactionBuilder::new(pk(1), 1, asset.clone()).multi_sign(0, &a.private).build();
        assert!(mutator.apply_transaction(&mut ledger, &partial, 2).is_err());

        let full = TransactionBuilder::new(pk(1), 1, asset)
            .multi_sign(0, &a.private)
            .multi_sign(1, &b.private)
            .build();
        mutator.apply_transaction(&mut ledger, &full, 2).unwrap();

        let single = TransactionBuilder::transfer(pk(1), 2, addr(2), Amount::new(1))
            .multi_sign(0, &a.private)
            .build();
        assert!(mutator.apply_transaction(&mut ledger, &single, 2).is_err());
    }

    #[test]
    fn multi_payment_credits_every_recipient() {
        let mut ledger = funded(&[(1, 100)]);
        let payments = vec![
            Payment { recipient_id: addr(2), amount: Amount::new(10) },
            Payment { recipient_id: addr(3), amount: Amount::new(20) },
        ];
        let tx = TransactionBuilder::new(pk(1), 1, TransactionAsset::MultiPayment { payments })
            .fee(Amount::new(1))
            .build();
        let before = snapshot(&ledger);
        let mutator = mutator();
        mutator.apply_transaction(&mut ledger, &tx, 2).unwrap();
        assert_eq!(ledger.find_by_address(&addr(1)).unwrap().balance, Amount::new(69));
        assert_eq!(ledger.find_by_address(&addr(3)).unwrap().balance, Amount::new(20));

        mutator.undo_transaction(&mut ledger, &tx).unwrap();
        let after: Vec<Wallet> = snapshot(&ledger)
            .into_iter()
            .filter(|w| w.address == addr(1))
            .collect();
        assert_eq!(after[0].balance, before[0].balance);
        assert_eq!(after[0].nonce, 0);
    }

    #[test]
    fn htlc_claim_and_undo() {
        let mut ledger = funded(&[(1, 1_000), (2, 10)]);
        let mutator = mutator();
        let secret = [7u8; 32];
        let lock = TransactionBuilder::new(
            pk(1),
            1,
            TransactionAsset::HtlcLock { secret_hash: sha256(&secret), expiration_height: 50 },
        )
        .recipient(addr(2))
        .amount(Amount::new(400))
        .build();
        mutator.apply_transaction(&mut ledger, &lock, 2).unwrap();
        let owner = ledger.find_by_address(&addr(1)).unwrap();
        assert_eq!(owner.balance, Amount::new(600));
        assert_eq!(owner.attributes.htlc.locked_balance, Amount::new(400));
        assert_eq!(owner.vote_weight(), Some(Amount::new(1_000)));

        let wrong = TransactionBuilder::new(
            pk(2),
            1,
            TransactionAsset::HtlcClaim { lock_transaction_id: lock.id, unlock_secret: [8u8; 32] },
        )
        .build();
        assert!(mutator.apply_transaction(&mut ledger, &wrong, 3).is_err());

        let before_claim = snapshot(&ledger);
        let claim = TransactionBuilder::new(
            pk(2),
            1,
            TransactionAsset::HtlcClaim { lock_transaction_id: lock.id, unlock_secret: secret },
        )
        .build();
        mutator.apply_transaction(&mut ledger, &claim, 3).unwrap();
        assert_eq!(ledger.find_by_address(&addr(2)).unwrap().balance, Amount::new(410));
        assert!(ledger.open_lock(&lock.id).is_none());
        assert!(ledger.settled_lock(&lock.id).is_some());

        mutator.undo_transaction(&mut ledger, &claim).unwrap();
        assert_eq!(snapshot(&ledger), before_claim);
        assert!(ledger.open_lock(&lock.id).is_some());
        assert!(ledger.settled_lock(&lock.id).is_none());
    }

    #[test]
    fn htlc_refund_only_after_expiration() {
        let mut ledger = funded(&[(1, 1_000), (2, 10)]);
        let mutator = mutator();
        let lock = TransactionBuilder::new(
            pk(1),
            1,
            TransactionAsset::HtlcLock { secret_hash: [0u8; 32], expiration_height: 10 },
        )
        .recipient(addr(2))
        .amount(Amount::new(400))
        .build();
        mutator.apply_transaction(&mut ledger, &lock, 2).unwrap();
        assert_eq!(ledger.expired_locks(10), vec![(lock.id, addr(1))]);

        let refund = TransactionBuilder::new(
            pk(1),
            2,
            TransactionAsset::HtlcRefund { lock_transaction_id: lock.id },
        )
        .build();
        assert!(mutator.apply_transaction(&mut ledger, &refund, 9).is_err());
        mutator.apply_transaction(&mut ledger, &refund, 10).unwrap();
        let owner = ledger.find_by_address(&addr(1)).unwrap();
        assert_eq!(owner.balance, Amount::new(1_000));
        assert_eq!(owner.attributes.htlc.locked_balance, Amount::ZERO);
    }

    #[test]
    fn bridgechain_requires_business_and_unique_name() {
        let mut ledger = funded(&[(1, 100)]);
        let mutator = mutator();
        let bridgechain = |nonce, name: &str| {
            TransactionBuilder::new(
                pk(1),
                nonce,
                TransactionAsset::BridgechainRegistration { name: name.into(), seed_nodes: vec!["10.0.0.1".into()] },
            )
            .build()
        };
        assert!(mutator.apply_transaction(&mut ledger, &bridgechain(1, "side"), 2).is_err());

        let business = TransactionBuilder::new(
            pk(1),
            1,
            TransactionAsset::BusinessRegistration { name: "acme".into(), website: "https://acme.example".into() },
        )
        .build();
        mutator.apply_transaction(&mut ledger, &business, 2).unwrap();
        mutator.apply_transaction(&mut ledger, &bridgechain(2, "side"), 2).unwrap();
        assert!(mutator.apply_transaction(&mut ledger, &bridgechain(3, "SIDE"), 2).is_err());
    }

    #[test]
    fn excepted_transaction_bypasses_validation() {
        let mut ledger = funded(&[(1, 10)]);
        let tx = transfer(1, 1, 2, 50, 0);
        let mutator = LedgerMutator::new(
            Milestones::for_network(NetworkId::Dev),
            Exceptions::new([tx.id]),
        );
        mutator.apply_transaction(&mut ledger, &tx, 2).unwrap();
        assert_eq!(ledger.find_by_address(&addr(1)).unwrap().balance, Amount::new(-40));

        mutator.undo_transaction(&mut ledger, &tx).unwrap();
        assert_eq!(ledger.find_by_address(&addr(1)).unwrap().balance, Amount::new(10));
    }

    fn excepting(tx: &Transaction) -> LedgerMutator {
        LedgerMutator::new(Milestones::for_network(NetworkId::Dev), Exceptions::new([tx.id]))
    }

    #[test]
    fn excepted_transaction_with_out_of_order_nonce_undoes_exactly() {
        for nonce in [0, 5] {
            let mut ledger = funded(&[(1, 1_000)]);
            let before = snapshot(&ledger);
            let tx = transfer(1, nonce, 2, 50, 1);
            let mutator = excepting(&tx);

            mutator.apply_transaction(&mut ledger, &tx, 2).unwrap();
            assert_eq!(ledger.find_by_address(&addr(1)).unwrap().nonce, nonce);

            mutator.undo_transaction(&mut ledger, &tx).unwrap();
            let after: Vec<Wallet> = snapshot(&ledger)
                .into_iter()
                .filter(|w| w.address == addr(1))
                .collect();
            assert_eq!(after, before);
            assert_eq!(ledger.find_by_address(&addr(2)).unwrap().balance, Amount::ZERO);
        }
    }

    #[test]
    fn excepted_vote_undo_restores_previous_vote() {
        let mut ledger = funded(&[(1, 100), (2, 100)]);
        let plain = mutator();
        plain.apply_transaction(&mut ledger, &register(2, 1, "bob"), 2).unwrap();
        let vote = TransactionBuilder::new(pk(1), 1, TransactionAsset::Vote(VoteAction::Vote(pk(2)))).build();
        plain.apply_transaction(&mut ledger, &vote, 2).unwrap();
        let before = snapshot(&ledger);

        // A second vote while already voting only goes through as an exception.
        let revote = TransactionBuilder::new(pk(1), 2, TransactionAsset::Vote(VoteAction::Vote(pk(3)))).build();
        let mutator = excepting(&revote);
        mutator.apply_transaction(&mut ledger, &revote, 2).unwrap();
        assert_eq!(ledger.find_by_address(&addr(1)).unwrap().attributes.vote, Some(pk(3)));

        mutator.undo_transaction(&mut ledger, &revote).unwrap();
        assert_eq!(snapshot(&ledger), before);
        assert_eq!(ledger.find_by_address(&addr(1)).unwrap().attributes.vote, Some(pk(2)));
    }

    #[test]
    fn excepted_transaction_undoes_exactly_inside_block() {
        let mut ledger = funded(&[(1, 1_000), (3, 10)]);
        let forced = transfer(3, 0, 2, 500, 0);
        let mutator = excepting(&forced);
        mutator.apply_block(&mut ledger, &genesis_block(vec![register(1, 1, "genesis")])).unwrap();
        let before = snapshot(&ledger);

        let block = Block::new(2, BlockId::ZERO, Timestamp::new(8), pk(1), Amount::new(3), vec![forced]);
        mutator.apply_block(&mut ledger, &block).unwrap();
        assert_eq!(ledger.find_by_address(&addr(3)).unwrap().balance, Amount::new(-490));

        mutator.undo_block(&mut ledger, &block).unwrap();
        let after: Vec<Wallet> = snapshot(&ledger)
            .into_iter()
            .filter(|w| w.address != addr(2))
            .collect();
        assert_eq!(after, before);
    }

    #[test]
    fn failed_undo_reapplies_what_was_already_undone() {
        let mut ledger = funded(&[(1, 1_000), (3, 500), (5, 500)]);
        let mutator = mutator();
        mutator.apply_block(&mut ledger, &genesis_block(vec![register(1, 1, "genesis")])).unwrap();

        let block = Block::new(
            2,
            BlockId::ZERO,
            Timestamp::new(8),
            pk(1),
            Amount::new(20),
            vec![transfer(3, 1, 2, 10, 1), transfer(5, 1, 4, 10, 1), transfer(3, 2, 6, 10, 1)],
        );
        mutator.apply_block(&mut ledger, &block).unwrap();

        // Debiting the middle recipient on undo now overflows.
        let mut recipient = ledger.find_by_address(&addr(4)).unwrap().clone();
        recipient.balance = Amount::new(i128::MIN);
        ledger.index(recipient);
        let applied = snapshot(&ledger);

        let err = mutator.undo_block(&mut ledger, &block).unwrap_err();
        assert!(matches!(err, LedgerError::UndoFailed { .. }));
        assert!(err.is_fatal());
        assert_eq!(snapshot(&ledger), applied);
    }

    fn genesis_block(transactions: Vec<Transaction>) -> Block {
        Block::new(1, BlockId::ZERO, Timestamp::EPOCH, pk(1), Amount::ZERO, transactions)
    }

    #[test]
    fn genesis_block_creates_generator() {
        let mut ledger = funded(&[(1, 1_000)]);
        let block = genesis_block(vec![register(1, 1, "genesis")]);
        mutator().apply_block(&mut ledger, &block).unwrap();
        let generator = ledger.find_by_username("genesis").unwrap();
        assert_eq!(generator.attributes.delegate.as_ref().unwrap().produced_blocks, 1);
    }

    #[test]
    fn block_reward_and_fees_go_to_generator() {
        let mut ledger = funded(&[(1, 1_000), (3, 500)]);
        let mutator = mutator();
        mutator.apply_block(&mut ledger, &genesis_block(vec![register(1, 1, "genesis")])).unwrap();
        let before = snapshot(&ledger);

        let block = Block::new(
            2,
            BlockId::ZERO,
            Timestamp::new(8),
            pk(1),
            Amount::new(200),
            vec![transfer(3, 1, 2, 100, 7)],
        );
        mutator.apply_block(&mut ledger, &block).unwrap();
        let generator = ledger.find_by_address(&addr(1)).unwrap();
        assert_eq!(generator.balance, Amount::new(1_207));
        let delegate = generator.attributes.delegate.as_ref().unwrap();
        assert_eq!(delegate.forged_fees, Amount::new(7));
        assert_eq!(delegate.forged_rewards, Amount::new(200));
        assert_eq!(delegate.produced_blocks, 2);

        mutator.undo_block(&mut ledger, &block).unwrap();
        let after: Vec<Wallet> = snapshot(&ledger)
            .into_iter()
            .filter(|w| w.address != addr(2))
            .collect();
        assert_eq!(after, before);
    }

    #[test]
    fn failing_transaction_unwinds_whole_block() {
        let mut ledger = funded(&[(1, 1_000), (3, 500)]);
        let mutator = mutator();
        mutator.apply_block(&mut ledger, &genesis_block(vec![register(1, 1, "genesis")])).unwrap();
        let before = snapshot(&ledger);

        let block = Block::new(
            2,
            BlockId::ZERO,
            Timestamp::new(8),
            pk(1),
            Amount::ZERO,
            vec![transfer(3, 1, 1, 100, 0), transfer(3, 2, 1, 10_000, 0)],
        );
        let err = mutator.apply_block(&mut ledger, &block).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
        assert_eq!(snapshot(&ledger), before);
    }

    #[test]
    fn non_delegate_generator_rejected() {
        let mut ledger = funded(&[(1, 1_000)]);
        let block = Block::new(2, BlockId::ZERO, Timestamp::EPOCH, pk(1), Amount::ZERO, vec![]);
        assert_eq!(
            mutator().apply_block(&mut ledger, &block),
            Err(LedgerError::UnknownGenerator(pk(1)))
        );
    }

    #[test]
    fn undo_of_unapplied_transaction_is_fatal() {
        let mut ledger = funded(&[(1, 1_000)]);
        let err = mutator()
            .undo_transaction(&mut ledger, &transfer(1, 1, 2, 1, 0))
            .unwrap_err();
        assert!(err.is_fatal());
    }
}
