//! Persisted block storage.

use crate::StoreError;
use kestrel_transactions::Block;

/// The on-disk block store.
///
/// Calls may block on I/O. The core never issues them concurrently.
pub trait Database {
    /// Run the store's own integrity check over the persisted chain.
    fn verify_blockchain(&self) -> Result<bool, StoreError>;

    /// The highest persisted block.
    fn get_last_block(&self) -> Result<Block, StoreError>;

    /// Delete the `count` highest persisted blocks.
    fn remove_top_blocks(&self, count: u64) -> Result<(), StoreError>;

    /// Delete `block`, which must be the highest persisted block.
    fn revert_block(&self, block: &Block) -> Result<(), StoreError>;

    /// Persist an accepted block on top of the chain.
    fn save_block(&self, block: &Block) -> Result<(), StoreError>;
}
