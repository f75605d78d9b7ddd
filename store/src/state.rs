//! In-memory chain state shared with the surrounding node.

use kestrel_transactions::Block;

/// Tip tracking and the recent-block cache.
///
/// Setting the last block also records it in the recent-block cache,
/// discarding any cached block at the same or a greater height.
pub trait StateStore {
    /// The current tip, if any block has been accepted yet.
    fn get_last_block(&self) -> Option<Block>;

    fn set_last_block(&self, block: &Block);

    fn set_last_stored_block_height(&self, height: u64);

    fn set_restored_database_integrity(&self, restored: bool);

    /// Up to `count` most recent blocks, newest first.
    fn get_last_blocks(&self, count: usize) -> Vec<Block>;
}
