//! In-memory chain state: the tip, the last persisted height and a bounded
//! cache of recent blocks.
//!
//! The cache is a bounded FIFO: when full, the oldest block is evicted to make
//! room. Setting a new tip first drops every cached block at or above its
//! height, so the cache always describes a single chain ending at the tip.

use kestrel_store::StateStore;
use kestrel_transactions::Block;
use std::collections::VecDeque;
use std::sync::RwLock;

struct Inner {
    last_block: Option<Block>,
    last_stored_height: Option<u64>,
    restored_integrity: Option<bool>,
    /// Oldest first.
    recent: VecDeque<Block>,
}

pub struct MemoryStateStore {
    inner: RwLock<Inner>,
    capacity: usize,
}

impl MemoryStateStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(Inner {
                last_block: None,
                last_stored_height: None,
                restored_integrity: None,
                recent: VecDeque::with_capacity(capacity),
            }),
            capacity,
        }
    }

    /// Height last reported as persisted, if any.
    pub fn last_stored_block_height(&self) -> Option<u64> {
        self.read(|inner| inner.last_stored_height)
    }

    /// Outcome last reported by a database rollback, if any.
    pub fn restored_database_integrity(&self) -> Option<bool> {
        self.read(|inner| inner.restored_integrity)
    }

    /// Number of cached blocks.
    pub fn cached(&self) -> usize {
        self.read(|inner| inner.recent.len())
    }

    /// Drop every cached block, keeping the tip.
    pub fn clear_cache(&self) {
        self.write(|inner| inner.recent.clear());
    }

    fn read<T>(&self, f: impl FnOnce(&Inner) -> T) -> T {
        match self.inner.read() {
            Ok(guard) => f(&guard),
            Err(poisoned) => f(&poisoned.into_inner()),
        }
    }

    fn write<T>(&self, f: impl FnOnce(&mut Inner) -> T) -> T {
        match self.inner.write() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

impl StateStore for MemoryStateStore {
    fn get_last_block(&self) -> Option<Block> {
        self.read(|inner| inner.last_block.clone())
    }

    fn set_last_block(&self, block: &Block) {
        let capacity = self.capacity;
        self.write(|inner| {
            inner.recent.retain(|cached| cached.height < block.height);
            if capacity > 0 {
                if inner.recent.len() >= capacity {
                    inner.recent.pop_front();
                }
                inner.recent.push_back(block.clone());
            }
            inner.last_block = Some(block.clone());
        });
    }

    fn set_last_stored_block_height(&self, height: u64) {
        self.write(|inner| inner.last_stored_height = Some(height));
    }

    fn set_restored_database_integrity(&self, restored: bool) {
        self.write(|inner| inner.restored_integrity = Some(restored));
    }

    fn get_last_blocks(&self, count: usize) -> Vec<Block> {
        self.read(|inner| inner.recent.iter().rev().take(count).cloned().collect())
    }
}
