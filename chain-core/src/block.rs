//! Block data structures and operations

use crate::{Amount, BlockIndex, CoreError, CoreResult, Hash, PublicKey, Transaction};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

/// Fields covered by the block hash
#[derive(bincode::Encode)]
struct BlockForHashing<'a> {
    index: BlockIndex,
    previous_hash: Hash,
    validator: PublicKey,
    transactions: &'a [Transaction],
}

/// Block minted by the elected validator. Immutable once constructed.
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct Block {
    /// Position in the chain (genesis is 0)
    pub index: BlockIndex,
    /// Transactions in pool order
    pub transactions: Vec<Transaction>,
    /// Hash of the predecessor block
    pub previous_hash: Hash,
    /// Public key of the minter
    pub validator: PublicKey,
    /// Hash over index, previous hash, validator and transactions
    pub current_hash: Hash,
}

impl Block {
    /// Create a new block and compute its hash
    pub fn new(
        index: BlockIndex,
        transactions: Vec<Transaction>,
        previous_hash: Hash,
        validator: PublicKey,
    ) -> CoreResult<Self> {
        let current_hash = Self::compute_hash(index, &previous_hash, &validator, &transactions)?;
        Ok(Self {
            index,
            transactions,
            previous_hash,
            validator,
            current_hash,
        })
    }

    /// Create genesis block. Identical on every node.
    pub fn genesis() -> CoreResult<Self> {
        Self::new(0, Vec::new(), Hash::zero(), PublicKey::zero())
    }

    fn compute_hash(
        index: BlockIndex,
        previous_hash: &Hash,
        validator: &PublicKey,
        transactions: &[Transaction],
    ) -> CoreResult<Hash> {
        let header = BlockForHashing {
            index,
            previous_hash: *previous_hash,
            validator: *validator,
            transactions,
        };
        let encoded = bincode::encode_to_vec(&header, bincode::config::standard())
            .map_err(|e| CoreError::Bincode(e.to_string()))?;
        let hash_bytes = Keccak256::digest(&encoded);
        Ok(Hash::from_slice(hash_bytes.as_slice()))
    }

    /// Recompute the hash and compare it with `current_hash`
    pub fn hash_matches(&self) -> CoreResult<bool> {
        let expected = Self::compute_hash(
            self.index,
            &self.previous_hash,
            &self.validator,
            &self.transactions,
        )?;
        Ok(expected == self.current_hash)
    }

    /// Sum of the fees of all contained transactions
    pub fn total_fees(&self) -> Amount {
        self.transactions
            .iter()
            .fold(0, |acc: Amount, tx| acc.saturating_add(tx.fee))
    }

    /// Check if block is genesis
    pub fn is_genesis(&self) -> bool {
        self.index == 0
    }
}
