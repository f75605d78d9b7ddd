//! Collaborator contracts consumed by the Kestrel ledger core.
//!
//! The persistence engine, the in-memory chain state and the transaction pool
//! live outside the core. Every backend (SQL, in-memory for testing) implements
//! these traits; the rest of the codebase depends only on the traits.

pub mod database;
pub mod error;
pub mod pool;
pub mod state;

pub use database::Database;
pub use error::StoreError;
pub use pool::TransactionPool;
pub use state::StateStore;
