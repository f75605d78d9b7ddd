//! Stateless transaction validation.
//!
//! Checks that need no wallet state: amount signs, recipient presence and the
//! shape of each asset. Balance, nonce and signature checks against registered
//! keys belong to the ledger.

use crate::error::TransactionError;
use crate::{Transaction, TransactionAsset};
use kestrel_types::Milestone;
use std::collections::HashSet;

/// Longest delegate username.
pub const MAX_USERNAME_LEN: usize = 20;
/// Most participants in a multisignature wallet.
pub const MAX_MULTISIGNATURE_KEYS: usize = 16;
/// Longest business or bridgechain name.
pub const MAX_NAME_LEN: usize = 40;

/// Validate a transaction's structure under the milestone active at the
/// height it is about to be applied at.
pub fn validate_transaction(tx: &Transaction, milestone: &Milestone) -> Result<(), TransactionError> {
    if tx.amount.is_negative() {
        return Err(TransactionError::NegativeAmount);
    }
    if tx.fee.is_negative() {
        return Err(TransactionError::NegativeFee);
    }

    let kind = tx.kind().to_string();
    match &tx.asset {
        TransactionAsset::Transfer | TransactionAsset::HtlcLock { .. } => {
            if tx.recipient_id.is_none() {
                return Err(TransactionError::MissingRecipient(kind));
            }
            if tx.amount.is_zero() {
                return Err(TransactionError::ZeroAmount);
            }
        }
        _ => {
            if tx.recipient_id.is_some() {
                return Err(TransactionError::UnexpectedRecipient(kind));
            }
            if !tx.amount.is_zero() {
                return Err(TransactionError::UnexpectedAmount(kind));
            }
        }
    }

    match &tx.asset {
        TransactionAsset::DelegateRegistration { username } => validate_username(username),
        TransactionAsset::MultiSignature { min, public_keys } => {
            if public_keys.is_empty() || public_keys.len() > MAX_MULTISIGNATURE_KEYS {
                return Err(TransactionError::InvalidMultiSignature(format!(
                    "{} keys, expected 1..={}",
                    public_keys.len(),
                    MAX_MULTISIGNATURE_KEYS
                )));
            }
            if *min == 0 || *min as usize > public_keys.len() {
                return Err(TransactionError::InvalidMultiSignature(format!(
                    "min {} out of range for {} keys",
                    min,
                    public_keys.len()
                )));
            }
            let unique: HashSet<_> = public_keys.iter().collect();
            if unique.len() != public_keys.len() {
                return Err(TransactionError::InvalidMultiSignature("duplicate key".into()));
            }
            Ok(())
        }
        TransactionAsset::MultiPayment { payments } => {
            let limit = milestone.multi_payment_limit as usize;
            if payments.len() < 2 || payments.len() > limit {
                return Err(TransactionError::InvalidMultiPayment(format!(
                    "{} payments, expected 2..={}",
                    payments.len(),
                    limit
                )));
            }
            if payments.iter().any(|p| p.amount.is_zero() || p.amount.is_negative()) {
                return Err(TransactionError::ZeroAmount);
            }
            Ok(())
        }
        TransactionAsset::BusinessRegistration { name, website } => {
            validate_name(name)?;
            if website.is_empty() {
                return Err(TransactionError::InvalidAsset("empty website".into()));
            }
            Ok(())
        }
        TransactionAsset::BridgechainRegistration { name, seed_nodes } => {
            validate_name(name)?;
            if seed_nodes.is_empty() {
                return Err(TransactionError::InvalidAsset("no seed nodes".into()));
            }
            Ok(())
        }
        TransactionAsset::Transfer
        | TransactionAsset::SecondSignature { .. }
        | TransactionAsset::Vote(_)
        | TransactionAsset::DelegateResignation
        | TransactionAsset::HtlcLock { .. }
        | TransactionAsset::HtlcClaim { .. }
        | TransactionAsset::HtlcRefund { .. } => Ok(()),
    }
}

/// Usernames are 1 to 20 characters of `a-z 0-9 ! @ $ & _ .`.
///
/// Upper-case letters are rejected here rather than folded; the ledger
/// reports them as a failed precondition.
fn validate_username(username: &str) -> Result<(), TransactionError> {
    if username.is_empty() || username.len() > MAX_USERNAME_LEN {
        return Err(TransactionError::InvalidUsername(format!(
            "length {} outside 1..={}",
            username.len(),
            MAX_USERNAME_LEN
        )));
    }
    let allowed = |c: char| c.is_ascii_alphanumeric() || "!@$&_.".contains(c);
    if !username.chars().all(allowed) {
        return Err(TransactionError::InvalidUsername(username.to_string()));
    }
    Ok(())
}

fn validate_name(name: &str) -> Result<(), TransactionError> {
    if name.trim().is_empty() || name.len() > MAX_NAME_LEN {
        return Err(TransactionError::InvalidAsset(format!("bad name {name:?}")));
    }
    Ok(())
}
