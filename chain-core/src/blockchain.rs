//! Append-only chain of blocks

use crate::{Amount, Block, BlockIndex, CoreError, CoreResult, Hash, Nonce, PublicKey, Transaction};
use std::collections::HashSet;

/// Ordered sequence of blocks linked by hash, starting at genesis.
///
/// Keeps the set of finalized `(sender, nonce)` pairs so replay checks do
/// not scan every block. A pair is spent once it is finalized, whatever the
/// payload it was signed with.
#[derive(Debug, Clone)]
pub struct Blockchain {
    blocks: Vec<Block>,
    finalized: HashSet<(PublicKey, Nonce)>,
}

impl Blockchain {
    /// Chain containing only the genesis block
    pub fn new() -> CoreResult<Self> {
        Ok(Self {
            blocks: vec![Block::genesis()?],
            finalized: HashSet::new(),
        })
    }

    /// Wrap blocks received from a peer without checking their links.
    ///
    /// Only requires the first block to be a genesis block.
    pub fn from_blocks(blocks: Vec<Block>) -> CoreResult<Self> {
        match blocks.first() {
            Some(first) if first.is_genesis() => {}
            _ => return Err(CoreError::MissingGenesis),
        }

        let finalized = blocks
            .iter()
            .flat_map(|b| b.transactions.iter())
            .map(Transaction::replay_key)
            .collect();

        Ok(Self { blocks, finalized })
    }

    /// Last block of the chain
    pub fn tip(&self) -> &Block {
        // never empty: constructors guarantee a genesis block
        &self.blocks[self.blocks.len() - 1]
    }

    /// Hash a new block must reference
    pub fn tip_hash(&self) -> Hash {
        self.tip().current_hash
    }

    /// Index the next block must carry
    pub fn next_index(&self) -> BlockIndex {
        self.tip().index + 1
    }

    /// Append a block extending the tip. Returns the fees it carries.
    pub fn append(&mut self, block: Block) -> CoreResult<Amount> {
        if block.previous_hash != self.tip_hash() || block.index != self.next_index() {
            return Err(CoreError::BrokenLink {
                index: block.index,
                expected: self.tip_hash(),
                actual: block.previous_hash,
            });
        }

        self.finalized
            .extend(block.transactions.iter().map(Transaction::replay_key));

        let fees = block.total_fees();
        self.blocks.push(block);
        Ok(fees)
    }

    /// Whether the transaction's sender already spent its nonce on chain
    pub fn contains(&self, tx: &Transaction) -> bool {
        self.finalized.contains(&tx.replay_key())
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Always false; a chain holds at least its genesis block
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}
