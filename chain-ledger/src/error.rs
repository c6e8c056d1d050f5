//! Ledger error types

use chain_consensus::ConsensusError;
use chain_core::{Amount, BlockIndex, CoreError, Hash, PeerId, PublicKey};
use thiserror::Error;

/// Ledger error type.
///
/// Every variant is recoverable by rejecting the offending transaction,
/// block or chain, except `MalformedSnapshot` and `Config` which abort
/// engine construction.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Signature does not verify against the sender's key
    #[error("Invalid transaction signature")]
    InvalidSignature,

    /// Sender cannot cover the transaction
    #[error("Insufficient funds for {peer}: available {available}, required {required}")]
    InsufficientFunds {
        peer: PeerId,
        available: Amount,
        required: Amount,
    },

    /// Sender and nonce already finalized, pooled or repeated in the block
    #[error("Duplicate transaction")]
    DuplicateTransaction,

    /// Public key not present in the peer registry
    #[error("Unknown peer with key {0}")]
    UnknownPeer(PublicKey),

    /// Peer id not present in the peer registry
    #[error("Unknown peer id {0}")]
    UnknownPeerId(PeerId),

    /// Block does not reference the expected parent
    #[error("Invalid block link: expected parent {expected}, got {actual}")]
    InvalidBlockLink { expected: Hash, actual: Hash },

    /// Block index does not follow its parent
    #[error("Invalid block index: expected {expected}, got {actual}")]
    InvalidBlockIndex {
        expected: BlockIndex,
        actual: BlockIndex,
    },

    /// Stored block hash does not match the block contents
    #[error("Block {index} hash does not match its contents")]
    InvalidBlockHash { index: BlockIndex },

    /// Block minted by someone other than the elected validator
    #[error("Invalid validator: expected {expected}, got {actual}")]
    InvalidValidator {
        expected: PublicKey,
        actual: PublicKey,
    },

    /// Block carries more transactions than the configured capacity
    #[error("Block holds {size} transactions, capacity is {capacity}")]
    BlockTooLarge { size: usize, capacity: usize },

    /// A block of a submitted chain failed validation
    #[error("Invalid chain at block {index}: {reason}")]
    InvalidChain {
        index: BlockIndex,
        reason: Box<LedgerError>,
    },

    /// Balance would exceed the representable range
    #[error("Balance overflow for {0}")]
    BalanceOverflow(PeerId),

    /// Cluster snapshot cannot initialize the ledger
    #[error("Malformed cluster snapshot: {0}")]
    MalformedSnapshot(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Consensus(#[from] ConsensusError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;
