//! Nullable state store that records every setter call.

use kestrel_store::StateStore;
use kestrel_transactions::Block;
use std::sync::Mutex;

/// A setter call observed by [`NullStateStore`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StateWrite {
    LastBlock(u64),
    LastStoredBlockHeight(u64),
    RestoredDatabaseIntegrity(bool),
}

#[derive(Default)]
struct Inner {
    last_block: Option<Block>,
    /// Oldest first.
    recent: Vec<Block>,
    writes: Vec<StateWrite>,
}

/// An in-memory [`StateStore`] for testing. Caches every block set as last
/// block, without a bound.
#[derive(Default)]
pub struct NullStateStore {
    inner: Mutex<Inner>,
}

impl NullStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the tip and the cache without recording a write.
    pub fn with_blocks(blocks: Vec<Block>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                last_block: blocks.last().cloned(),
                recent: blocks,
                writes: Vec::new(),
            }),
        }
    }

    pub fn writes(&self) -> Vec<StateWrite> {
        self.inner.lock().unwrap().writes.clone()
    }

    /// Drop the recent-block cache, keeping the tip.
    pub fn clear_cache(&self) {
        self.inner.lock().unwrap().recent.clear();
    }
}

impl StateStore for NullStateStore {
    fn get_last_block(&self) -> Option<Block> {
        self.inner.lock().unwrap().last_block.clone()
    }

    fn set_last_block(&self, block: &Block) {
        let mut inner = self.inner.lock().unwrap();
        inner.recent.retain(|cached| cached.height < block.height);
        inner.recent.push(block.clone());
        inner.last_block = Some(block.clone());
        inner.writes.push(StateWrite::LastBlock(block.height));
    }

    fn set_last_stored_block_height(&self, height: u64) {
        self.inner
            .lock()
            .unwrap()
            .writes
            .push(StateWrite::LastStoredBlockHeight(height));
    }

    fn set_restored_database_integrity(&self, restored: bool) {
        self.inner
            .lock()
            .unwrap()
            .writes
            .push(StateWrite::RestoredDatabaseIntegrity(restored));
    }

    fn get_last_blocks(&self, count: usize) -> Vec<Block> {
        self.inner.lock().unwrap().recent.iter().rev().take(count).cloned().collect()
    }
}
