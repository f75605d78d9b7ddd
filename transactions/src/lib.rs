//! Kestrel transaction and block types.
//!
//! Transaction types are a closed set, carried by [`TransactionAsset`]:
//! - **Transfer**: move `amount` from the sender to `recipient_id`
//! - **SecondSignature**: register a second signing key
//! - **DelegateRegistration**: claim a delegate username
//! - **Vote**: vote for or unvote a delegate
//! - **MultiSignature**: turn the wallet into an m-of-n multisignature wallet
//! - **MultiPayment**: pay several recipients at once
//! - **DelegateResignation**: permanently leave the forging ranking
//! - **HtlcLock / HtlcClaim / HtlcRefund**: hash time-locked transfers
//! - **BusinessRegistration / BridgechainRegistration**: business facets
//!
//! Blocks and transactions reach the core already deserialized and with their
//! primary signature verified; only second-signature and multisignature checks
//! are performed here.

pub mod block;
pub mod error;
pub mod validation;

pub use block::Block;
pub use error::TransactionError;
pub use validation::validate_transaction;

use kestrel_crypto::{blake2b_256, blake2b_256_multi, sign_message};
use kestrel_types::{Address, Amount, PrivateKey, PublicKey, Signature, TransactionId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Vote direction of a vote transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoteAction {
    Vote(PublicKey),
    Unvote(PublicKey),
}

impl VoteAction {
    pub fn delegate(&self) -> &PublicKey {
        match self {
            Self::Vote(key) | Self::Unvote(key) => key,
        }
    }
}

/// One leg of a multi-payment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub recipient_id: Address,
    pub amount: Amount,
}

/// A multisignature participant signature, positioned by key index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedSignature {
    pub index: u8,
    pub signature: Signature,
}

/// Type-specific payload. The variant is the transaction type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionAsset {
    Transfer,
    SecondSignature {
        public_key: PublicKey,
    },
    DelegateRegistration {
        username: String,
    },
    Vote(VoteAction),
    MultiSignature {
        min: u8,
        public_keys: Vec<PublicKey>,
    },
    MultiPayment {
        payments: Vec<Payment>,
    },
    DelegateResignation,
    HtlcLock {
        secret_hash: [u8; 32],
        expiration_height: u64,
    },
    HtlcClaim {
        lock_transaction_id: TransactionId,
        unlock_secret: [u8; 32],
    },
    HtlcRefund {
        lock_transaction_id: TransactionId,
    },
    BusinessRegistration {
        name: String,
        website: String,
    },
    BridgechainRegistration {
        name: String,
        seed_nodes: Vec<String>,
    },
}

/// Fieldless view of the transaction type, for logs and metrics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransactionType {
    Transfer,
    SecondSignature,
    DelegateRegistration,
    Vote,
    MultiSignature,
    MultiPayment,
    DelegateResignation,
    HtlcLock,
    HtlcClaim,
    HtlcRefund,
    BusinessRegistration,
    BridgechainRegistration,
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Transfer => "transfer",
            Self::SecondSignature => "second_signature",
            Self::DelegateRegistration => "delegate_registration",
            Self::Vote => "vote",
            Self::MultiSignature => "multi_signature",
            Self::MultiPayment => "multi_payment",
            Self::DelegateResignation => "delegate_resignation",
            Self::HtlcLock => "htlc_lock",
            Self::HtlcClaim => "htlc_claim",
            Self::HtlcRefund => "htlc_refund",
            Self::BusinessRegistration => "business_registration",
            Self::BridgechainRegistration => "bridgechain_registration",
        };
        f.write_str(name)
    }
}

/// A deserialized, primary-signature-verified transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub sender_public_key: PublicKey,
    pub recipient_id: Option<Address>,
    pub amount: Amount,
    pub fee: Amount,
    /// Per-sender counter; the first transaction of a wallet has nonce 1.
    pub nonce: u64,
    pub asset: TransactionAsset,
    pub second_signature: Option<Signature>,
    pub signatures: Vec<IndexedSignature>,
}

#[derive(Serialize)]
struct SigningView<'a> {
    sender_public_key: &'a PublicKey,
    recipient_id: &'a Option<Address>,
    amount: &'a Amount,
    fee: &'a Amount,
    nonce: u64,
    asset: &'a TransactionAsset,
}

impl Transaction {
    pub fn kind(&self) -> TransactionType {
        match &self.asset {
            TransactionAsset::Transfer => TransactionType::Transfer,
            TransactionAsset::SecondSignature { .. } => TransactionType::SecondSignature,
            TransactionAsset::DelegateRegistration { .. } => TransactionType::DelegateRegistration,
            TransactionAsset::Vote(_) => TransactionType::Vote,
            TransactionAsset::MultiSignature { .. } => TransactionType::MultiSignature,
            TransactionAsset::MultiPayment { .. } => TransactionType::MultiPayment,
            TransactionAsset::DelegateResignation => TransactionType::DelegateResignation,
            TransactionAsset::HtlcLock { .. } => TransactionType::HtlcLock,
            TransactionAsset::HtlcClaim { .. } => TransactionType::HtlcClaim,
            TransactionAsset::HtlcRefund { .. } => TransactionType::HtlcRefund,
            TransactionAsset::BusinessRegistration { .. } => TransactionType::BusinessRegistration,
            TransactionAsset::BridgechainRegistration { .. } => {
                TransactionType::BridgechainRegistration
            }
        }
    }

    /// Hash of every field covered by signatures (everything but the id and
    /// the signatures themselves).
    pub fn signing_hash(&self) -> [u8; 32] {
        let view = SigningView {
            sender_public_key: &self.sender_public_key,
            recipient_id: &self.recipient_id,
            amount: &self.amount,
            fee: &self.fee,
            nonce: self.nonce,
            asset: &self.asset,
        };
        let bytes = bincode::serialize(&view).expect("signing view is plain data");
        blake2b_256(&bytes)
    }

    /// Id over the signing hash plus all attached signatures.
    pub fn compute_id(&self) -> TransactionId {
        let signatures = bincode::serialize(&(&self.second_signature, &self.signatures))
            .expect("signatures are plain data");
        TransactionId::new(blake2b_256_multi(&[&self.signing_hash(), &signatures]))
    }

    /// Serialized length in bytes; a transaction that cannot be sized never
    /// fits any byte budget.
    pub fn serialized_len(&self) -> usize {
        bincode::serialized_size(self)
            .map(|n| n as usize)
            .unwrap_or(usize::MAX)
    }
}

/// Assembles a transaction and computes its id.
pub struct TransactionBuilder {
    tx: Transaction,
}

impl TransactionBuilder {
    pub fn new(sender_public_key: PublicKey, nonce: u64, asset: TransactionAsset) -> Self {
        Self {
            tx: Transaction {
                id: TransactionId::ZERO,
                sender_public_key,
                recipient_id: None,
                amount: Amount::ZERO,
                fee: Amount::ZERO,
                nonce,
                asset,
                second_signature: None,
                signatures: Vec::new(),
            },
        }
    }

    /// A plain transfer.
    pub fn transfer(sender_public_key: PublicKey, nonce: u64, to: Address, amount: Amount) -> Self {
        Self::new(sender_public_key, nonce, TransactionAsset::Transfer)
            .recipient(to)
            .amount(amount)
    }

    pub fn recipient(mut self, recipient_id: Address) -> Self {
        self.tx.recipient_id = Some(recipient_id);
        self
    }

    pub fn amount(mut self, amount: Amount) -> Self {
        self.tx.amount = amount;
        self
    }

    pub fn fee(mut self, fee: Amount) -> Self {
        self.tx.fee = fee;
        self
    }

    /// Sign with the sender's registered second key.
    pub fn second_sign(mut self, key: &PrivateKey) -> Self {
        self.tx.second_signature = Some(sign_message(&self.tx.signing_hash(), key));
        self
    }

    /// Add a multisignature participant signature at key position `index`.
    pub fn multi_sign(mut self, index: u8, key: &PrivateKey) -> Self {
        let signature = sign_message(&self.tx.signing_hash(), key);
        self.tx.signatures.push(IndexedSignature { index, signature });
        self
    }

    pub fn build(mut self) -> Transaction {
        self.tx.id = self.tx.compute_id();
        self.tx
    }
}
