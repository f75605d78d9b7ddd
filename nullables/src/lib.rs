//! Nullable infrastructure for deterministic testing.
//!
//! The ledger core reaches its collaborators (block database, chain state,
//! transaction pool, validator) only through traits. This crate provides test-friendly
//! implementations that:
//! - Return deterministic, scripted values
//! - Record every call so tests can assert on the interaction
//! - Never touch the filesystem or network
//!
//! Usage: swap real implementations for nullables in tests.

pub mod pool;
pub mod state;
pub mod store;
pub mod validator;

pub use pool::NullPool;
pub use state::{NullStateStore, StateWrite};
pub use store::{chain, NullDatabase};
pub use validator::NullValidator;
