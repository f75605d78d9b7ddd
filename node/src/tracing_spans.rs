//! Pre-built [`tracing::Span`] constructors for chain operations.
//!
//! Using consistent span names and field sets across the codebase makes it
//! easy to filter, search, and correlate traces.

use tracing::{info_span, Span};

/// Span covering verification and application of a single block.
pub fn block_apply_span(height: u64, id: &str) -> Span {
    info_span!("block_apply", height, id = %id)
}

/// Span covering the revert of the chain tip.
pub fn block_revert_span(height: u64, id: &str) -> Span {
    info_span!("block_revert", height, id = %id)
}

/// Span covering one run of the database rollback loop.
pub fn database_rollback_span(height: u64, max_block_rewind: u64, steps: u64) -> Span {
    info_span!("database_rollback", height, max_block_rewind, steps)
}

/// Span covering a round rebuild at a round boundary.
pub fn round_build_span(height: u64) -> Span {
    info_span!("round_build", height)
}

/// Span covering candidate transaction collation for the next block.
pub fn collation_span(height: u64, max_transactions: u32) -> Span {
    info_span!("collation", height, max_transactions)
}
