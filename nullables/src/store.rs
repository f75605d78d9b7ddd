//! Nullable block database: an in-memory chain with scripted integrity checks.

use kestrel_store::{Database, StoreError};
use kestrel_transactions::Block;
use kestrel_types::{Amount, BlockId, PublicKey, Timestamp};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Generator key stamped on every block built by [`chain`].
pub const CHAIN_GENERATOR: PublicKey = PublicKey([7u8; 32]);

/// An empty-block chain of `height` linked blocks, genesis first.
pub fn chain(height: u64) -> Vec<Block> {
    let mut blocks = Vec::with_capacity(height as usize);
    let mut previous = BlockId::ZERO;
    for h in 1..=height {
        let block = Block::new(
            h,
            previous,
            Timestamp::new(h * 8),
            CHAIN_GENERATOR,
            Amount::ZERO,
            Vec::new(),
        );
        previous = block.id;
        blocks.push(block);
    }
    blocks
}

#[derive(Default)]
struct Inner {
    blocks: Vec<Block>,
    verify_script: VecDeque<bool>,
    verify_default: bool,
    verify_calls: usize,
    removals: Vec<u64>,
    reverted: Vec<BlockId>,
    saved: Vec<BlockId>,
    fail_saves: bool,
    fail_reverts: bool,
}

/// An in-memory [`Database`] for testing.
///
/// `verify_blockchain` answers from a script, then falls back to a default
/// (`true` unless changed). Thread-safe for use with tokio's multi-threaded
/// runtime.
pub struct NullDatabase {
    inner: Mutex<Inner>,
}

impl NullDatabase {
    pub fn new() -> Self {
        Self::with_blocks(Vec::new())
    }

    pub fn with_blocks(blocks: Vec<Block>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                blocks,
                verify_default: true,
                ..Inner::default()
            }),
        }
    }

    /// A database holding [`chain`]`(height)`.
    pub fn with_height(height: u64) -> Self {
        Self::with_blocks(chain(height))
    }

    /// Queue answers for the next `verify_blockchain` calls.
    pub fn script_verify(&self, results: impl IntoIterator<Item = bool>) {
        self.inner.lock().unwrap().verify_script.extend(results);
    }

    /// Answer once the script runs out.
    pub fn set_verify_default(&self, result: bool) {
        self.inner.lock().unwrap().verify_default = result;
    }

    /// Make every following `save_block` fail with a backend error.
    pub fn fail_saves(&self, fail: bool) {
        self.inner.lock().unwrap().fail_saves = fail;
    }

    /// Make every following `revert_block` fail with a backend error.
    pub fn fail_reverts(&self, fail: bool) {
        self.inner.lock().unwrap().fail_reverts = fail;
    }

    pub fn verify_calls(&self) -> usize {
        self.inner.lock().unwrap().verify_calls
    }

    /// Every `remove_top_blocks` count, in call order.
    pub fn removals(&self) -> Vec<u64> {
        self.inner.lock().unwrap().removals.clone()
    }

    pub fn removed_total(&self) -> u64 {
        self.inner.lock().unwrap().removals.iter().sum()
    }

    pub fn reverted(&self) -> Vec<BlockId> {
        self.inner.lock().unwrap().reverted.clone()
    }

    pub fn saved(&self) -> Vec<BlockId> {
        self.inner.lock().unwrap().saved.clone()
    }

    pub fn height(&self) -> u64 {
        self.inner.lock().unwrap().blocks.last().map_or(0, |b| b.height)
    }

    pub fn block_at(&self, height: u64) -> Option<Block> {
        let inner = self.inner.lock().unwrap();
        inner.blocks.iter().find(|b| b.height == height).cloned()
    }
}

impl Default for NullDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl Database for NullDatabase {
    fn verify_blockchain(&self) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.verify_calls += 1;
        let default = inner.verify_default;
        Ok(inner.verify_script.pop_front().unwrap_or(default))
    }

    fn get_last_block(&self) -> Result<Block, StoreError> {
        self.inner
            .lock()
            .unwrap()
            .blocks
            .last()
            .cloned()
            .ok_or_else(|| StoreError::NotFound("last block".into()))
    }

    fn remove_top_blocks(&self, count: u64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if count as usize > inner.blocks.len() {
            return Err(StoreError::Backend(format!(
                "cannot remove {count} blocks from a chain of {}",
                inner.blocks.len()
            )));
        }
        let keep = inner.blocks.len() - count as usize;
        inner.blocks.truncate(keep);
        inner.removals.push(count);
        Ok(())
    }

    fn revert_block(&self, block: &Block) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_reverts {
            return Err(StoreError::Backend("revert failure injected".into()));
        }
        match inner.blocks.last() {
            Some(top) if top.id == block.id => {
                inner.blocks.pop();
                inner.reverted.push(block.id);
                Ok(())
            }
            _ => Err(StoreError::Corruption(format!("block {} is not the top block", block.id))),
        }
    }

    fn save_block(&self, block: &Block) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_saves {
            return Err(StoreError::Backend("save failure injected".into()));
        }
        let expected = inner.blocks.last().map_or(1, |b| b.height + 1);
        if block.height != expected {
            return Err(StoreError::Backend(format!(
                "block at height {} does not extend height {}",
                block.height,
                expected - 1
            )));
        }
        inner.saved.push(block.id);
        inner.blocks.push(block.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_links_blocks() {
        let blocks = chain(3);
        assert_eq!(blocks[0].previous_block, BlockId::ZERO);
        assert_eq!(blocks[1].previous_block, blocks[0].id);
        assert_eq!(blocks[2].previous_block, blocks[1].id);
    }

    #[test]
    fn verify_follows_script_then_default() {
        let db = NullDatabase::with_height(3);
        db.script_verify([false, false]);
        db.set_verify_default(true);
        assert!(!db.verify_blockchain().unwrap());
        assert!(!db.verify_blockchain().unwrap());
        assert!(db.verify_blockchain().unwrap());
        assert_eq!(db.verify_calls(), 3);
    }

    #[test]
    fn remove_top_blocks_moves_tip() {
        let db = NullDatabase::with_height(10);
        db.remove_top_blocks(4).unwrap();
        assert_eq!(db.get_last_block().unwrap().height, 6);
        assert_eq!(db.removals(), vec![4]);
        assert!(db.remove_top_blocks(7).is_err());
    }

    #[test]
    fn revert_only_accepts_top_block() {
        let blocks = chain(3);
        let db = NullDatabase::with_blocks(blocks.clone());
        assert!(db.revert_block(&blocks[1]).is_err());
        db.revert_block(&blocks[2]).unwrap();
        assert_eq!(db.height(), 2);
        assert_eq!(db.reverted(), vec![blocks[2].id]);
    }

    #[test]
    fn save_requires_next_height() {
        let blocks = chain(3);
        let db = NullDatabase::with_blocks(blocks[..2].to_vec());
        assert!(db.save_block(&blocks[0]).is_err());
        db.save_block(&blocks[2]).unwrap();
        assert_eq!(db.height(), 3);
    }

    #[test]
    fn injected_failures_leave_chain_untouched() {
        let blocks = chain(3);
        let db = NullDatabase::with_blocks(blocks[..2].to_vec());
        db.fail_saves(true);
        db.fail_reverts(true);
        assert!(db.save_block(&blocks[2]).is_err());
        assert!(db.revert_block(&blocks[1]).is_err());
        assert_eq!(db.height(), 2);
        assert!(db.saved().is_empty() && db.reverted().is_empty());

        db.fail_saves(false);
        db.save_block(&blocks[2]).unwrap();
        assert_eq!(db.height(), 3);
    }
}
