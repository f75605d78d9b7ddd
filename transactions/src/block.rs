//! Block type.

use crate::Transaction;
use kestrel_crypto::blake2b_256;
use kestrel_types::{Amount, BlockId, PublicKey, Timestamp};
use serde::{Deserialize, Serialize};

/// A deserialized block. Height 1 is genesis.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    pub height: u64,
    pub previous_block: BlockId,
    pub timestamp: Timestamp,
    pub generator_public_key: PublicKey,
    pub reward: Amount,
    pub total_fee: Amount,
    pub transactions: Vec<Transaction>,
}

#[derive(Serialize)]
struct Header<'a> {
    height: u64,
    previous_block: &'a BlockId,
    timestamp: Timestamp,
    generator_public_key: &'a PublicKey,
    reward: &'a Amount,
    total_fee: &'a Amount,
    transactions: Vec<&'a [u8; 32]>,
}

impl Block {
    /// Assemble a block, summing fees and computing its id.
    pub fn new(
        height: u64,
        previous_block: BlockId,
        timestamp: Timestamp,
        generator_public_key: PublicKey,
        reward: Amount,
        transactions: Vec<Transaction>,
    ) -> Self {
        let total_fee = transactions.iter().map(|tx| tx.fee).sum();
        let mut block = Self {
            id: BlockId::ZERO,
            height,
            previous_block,
            timestamp,
            generator_public_key,
            reward,
            total_fee,
            transactions,
        };
        block.id = block.compute_id();
        block
    }

    pub fn is_genesis(&self) -> bool {
        self.height == 1
    }

    pub fn compute_id(&self) -> BlockId {
        let header = Header {
            height: self.height,
            previous_block: &self.previous_block,
            timestamp: self.timestamp,
            generator_public_key: &self.generator_public_key,
            reward: &self.reward,
            total_fee: &self.total_fee,
            transactions: self.transactions.iter().map(|tx| tx.id.as_bytes()).collect(),
        };
        let bytes = bincode::serialize(&header).expect("block header is plain data");
        BlockId::new(blake2b_256(&bytes))
    }

    /// Sum of transaction fees, `None` on overflow.
    pub fn fee_sum(&self) -> Option<Amount> {
        Amount::checked_sum(self.transactions.iter().map(|tx| tx.fee))
    }
}
