//! Fundamental types for the Kestrel ledger core.
//!
//! This crate defines the core types shared across every other crate in the workspace:
//! addresses, identifiers, amounts, keys, timestamps and the height-indexed
//! protocol milestones.

pub mod address;
pub mod amount;
pub mod block;
pub mod error;
pub mod hash;
pub mod keys;
pub mod milestone;
pub mod network;
pub mod time;

pub use address::Address;
pub use amount::Amount;
pub use block::BlockId;
pub use error::TypeError;
pub use hash::TransactionId;
pub use keys::{KeyPair, PrivateKey, PublicKey, Signature};
pub use milestone::{Milestone, Milestones};
pub use network::NetworkId;
pub use time::Timestamp;
