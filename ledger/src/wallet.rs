//! Wallet state and its optional capability facets.

use kestrel_types::{Address, Amount, PublicKey, TransactionId};
use std::collections::BTreeMap;

/// Ledger state of one address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Wallet {
    pub address: Address,
    /// Unknown until the first transaction sent from this address.
    pub public_key: Option<PublicKey>,
    pub balance: Amount,
    /// Nonce of the last applied transaction sent from this wallet.
    pub nonce: u64,
    pub attributes: WalletAttributes,
}

impl Wallet {
    /// A cold wallet: zero balance, no public key, no attributes.
    pub fn new(address: Address) -> Self {
        Self {
            address,
            public_key: None,
            balance: Amount::ZERO,
            nonce: 0,
            attributes: WalletAttributes::default(),
        }
    }

    pub fn is_delegate(&self) -> bool {
        self.attributes.delegate.is_some()
    }

    pub fn username(&self) -> Option<&str> {
        self.attributes
            .delegate
            .as_ref()
            .map(|d| d.username.as_str())
            .filter(|name| !name.is_empty())
    }

    /// Weight this wallet lends to the delegate it votes for: spendable plus
    /// HTLC-locked balance.
    /// Balance plus HTLC-locked balance; `None` on overflow.
    pub fn vote_weight(&self) -> Option<Amount> {
        self.balance.checked_add(self.attributes.htlc.locked_balance)
    }
}

/// Facets present only once the wallet registered the capability.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WalletAttributes {
    /// Public key of the delegate this wallet votes for.
    pub vote: Option<PublicKey>,
    pub second_public_key: Option<PublicKey>,
    pub multisignature: Option<MultiSignatureAttribute>,
    pub delegate: Option<DelegateAttribute>,
    pub htlc: HtlcAttribute,
    pub business: Option<BusinessAttribute>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MultiSignatureAttribute {
    pub min: u8,
    pub public_keys: Vec<PublicKey>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DelegateAttribute {
    pub username: String,
    pub vote_balance: Amount,
    pub forged_fees: Amount,
    pub forged_rewards: Amount,
    pub produced_blocks: u64,
    /// 1-based position in the last ranking; `None` until ranked.
    pub rank: Option<u32>,
    /// Last round this delegate was assigned to forge in.
    pub round: Option<u64>,
    /// Resigned delegates keep their username but never rank again.
    pub resigned: bool,
}

impl DelegateAttribute {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            vote_balance: Amount::ZERO,
            forged_fees: Amount::ZERO,
            forged_rewards: Amount::ZERO,
            produced_blocks: 0,
            rank: None,
            round: None,
            resigned: false,
        }
    }
}

/// Hash time-locked funds owned by this wallet.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HtlcAttribute {
    pub locked_balance: Amount,
    /// Open locks keyed by the id of the lock transaction.
    pub locks: BTreeMap<TransactionId, HtlcLock>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HtlcLock {
    pub amount: Amount,
    pub recipient_id: Address,
    /// SHA-256 of the unlock secret.
    pub secret_hash: [u8; 32],
    /// Claimable strictly below this height, refundable from it on.
    pub expiration_height: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BusinessAttribute {
    pub name: String,
    pub website: String,
    pub bridgechains: Vec<Bridgechain>,
}

impl BusinessAttribute {
    pub fn has_bridgechain(&self, name: &str) -> bool {
        self.bridgechains
            .iter()
            .any(|b| b.name.eq_ignore_ascii_case(name))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bridgechain {
    pub name: String,
    pub seed_nodes: Vec<String>,
}
