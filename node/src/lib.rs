//! Kestrel chain core: drives the wallet ledger through the chain.
//!
//! The node crate is the coordinator that:
//! - Verifies, applies and persists incoming blocks, one at a time
//! - Reverts the tip when a fork must be discarded
//! - Rolls the block database back to the last consistent height
//! - Rebuilds delegate rounds at round boundaries
//! - Collates pool transactions for the next forged block
//!
//! Collaborators (database, state store, transaction pool) are reached
//! through the `kestrel-store` traits only.

pub mod chain_event;
pub mod collator;
pub mod config;
pub mod driver;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod shutdown;
pub mod state_machine;
pub mod state_store;
pub mod tracing_spans;
pub mod validator;

pub use chain_event::{ChainEvent, EventBus};
pub use collator::CandidateCollator;
pub use config::{DatabaseRollbackConfig, ExceptionsConfig, NodeConfig, PoolConfig};
pub use driver::{ChainCommand, ChainDriver};
pub use error::NodeError;
pub use logging::{init_logging, LogFormat};
pub use metrics::NodeMetrics;
pub use shutdown::ShutdownController;
pub use state_machine::{BlockchainMachine, ChainState, Dispatch, GENESIS_FLOOR};
pub use state_store::MemoryStateStore;
pub use validator::LedgerValidator;
