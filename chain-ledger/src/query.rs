//! Read-only views served to operators

use crate::registry::PeerRegistry;
use chain_core::{Amount, Block, BlockIndex, Nonce, PeerId, Transaction, TransactionKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Own tentative balance and committed stake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceView {
    pub balance: Amount,
    pub stake: Amount,
}

/// Transaction with keys resolved to peer ids where known
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionView {
    pub kind: TransactionKind,
    pub sender: String,
    pub receiver: String,
    pub amount: Amount,
    pub fee: Amount,
    pub message: Option<String>,
    pub nonce: Nonce,
}

impl TransactionView {
    pub fn new(tx: &Transaction, registry: &PeerRegistry) -> Self {
        Self {
            kind: tx.kind,
            sender: display_key(registry, &tx.sender),
            receiver: display_key(registry, &tx.receiver),
            amount: tx.amount,
            fee: tx.fee,
            message: tx.message.clone(),
            nonce: tx.nonce,
        }
    }
}

/// One block of a chain dump
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockView {
    pub index: BlockIndex,
    /// Minter's peer id, `None` for genesis
    pub validator: Option<PeerId>,
    pub validator_key: String,
    pub previous_hash: String,
    pub current_hash: String,
    pub transactions: Vec<TransactionView>,
}

impl BlockView {
    pub fn new(block: &Block, registry: &PeerRegistry) -> Self {
        Self {
            index: block.index,
            validator: registry.id_of(&block.validator).cloned(),
            validator_key: block.validator.to_hex(),
            previous_hash: block.previous_hash.to_hex(),
            current_hash: block.current_hash.to_hex(),
            transactions: block
                .transactions
                .iter()
                .map(|tx| TransactionView::new(tx, registry))
                .collect(),
        }
    }
}

/// Exchange addressed to this node, observed in a finalized block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboxEntry {
    pub from: PeerId,
    pub amount: Amount,
    pub message: Option<String>,
    pub block_index: BlockIndex,
    pub observed_at: DateTime<Utc>,
}

fn display_key(registry: &PeerRegistry, key: &chain_core::PublicKey) -> String {
    match registry.id_of(key) {
        Some(id) => id.to_string(),
        None => key.short(),
    }
}
