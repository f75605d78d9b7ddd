//! Cryptographic primitives for the Kestrel ledger core.
//!
//! - **Ed25519** for second-signature and multisignature verification
//! - **Blake2b** for transaction and block ids
//! - **SHA-256** for HTLC secret hashes and the round shuffle seed
//! - Address derivation with `kst_` prefix and base32 encoding

pub mod address;
pub mod hash;
pub mod keys;
pub mod sign;

pub use address::{derive_address, validate_address};
pub use hash::{blake2b_256, blake2b_256_multi, sha256};
pub use keys::{keypair_from_seed, public_from_private};
pub use sign::{sign_message, verify_signature};
