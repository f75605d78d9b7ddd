//! Wallet ledger for the Kestrel DPoS chain.
//!
//! [`WalletLedger`] owns every [`Wallet`] and keeps the address, public key
//! and username indices consistent. [`LedgerMutator`] applies and undoes
//! transactions and blocks against it with all-or-nothing semantics per
//! block.

pub mod error;
pub mod exceptions;
pub mod genesis;
pub mod mutator;
mod staging;
pub mod validator;
pub mod wallet;
pub mod wallet_ledger;

pub use error::LedgerError;
pub use exceptions::Exceptions;
pub use genesis::{GenesisAllocation, GenesisConfig};
pub use mutator::LedgerMutator;
pub use validator::TransactionValidator;
pub use wallet::{
    Bridgechain, BusinessAttribute, DelegateAttribute, HtlcAttribute, HtlcLock,
    MultiSignatureAttribute, Wallet, WalletAttributes,
};
pub use wallet_ledger::{SettledLock, WalletLedger};
