//! Transaction pool

use chain_core::Transaction;

/// Validated, unconfirmed transactions in admission order
#[derive(Debug, Clone)]
pub struct TransactionPool {
    transactions: Vec<Transaction>,
    capacity: usize,
}

impl TransactionPool {
    /// Create a pool that asks for a block once `capacity` transactions wait
    pub fn new(capacity: usize) -> Self {
        Self {
            transactions: Vec::new(),
            capacity,
        }
    }

    pub fn push(&mut self, tx: Transaction) {
        self.transactions.push(tx);
    }

    /// Whether a transaction with the same sender and nonce is waiting
    pub fn contains(&self, tx: &Transaction) -> bool {
        self.transactions
            .iter()
            .any(|pooled| pooled.replay_key() == tx.replay_key())
    }

    /// True once enough transactions wait to fill a block
    pub fn validation_required(&self) -> bool {
        self.transactions.len() >= self.capacity
    }

    /// Remove every pooled transaction whose sender and nonce appear in `txs`
    pub fn remove_all(&mut self, txs: &[Transaction]) -> usize {
        let before = self.transactions.len();
        self.transactions.retain(|pooled| {
            !txs.iter()
                .any(|tx| tx.replay_key() == pooled.replay_key())
        });
        before - self.transactions.len()
    }

    /// Keep only the transactions matching `keep`
    pub fn retain<F: FnMut(&Transaction) -> bool>(&mut self, keep: F) {
        self.transactions.retain(keep);
    }

    /// Transactions in admission order
    pub fn iter(&self) -> impl Iterator<Item = &Transaction> {
        self.transactions.iter()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}
