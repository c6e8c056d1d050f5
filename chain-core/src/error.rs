//! Error types for the core crate

use crate::{BlockIndex, Hash};
use thiserror::Error;

/// Core ledger errors
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Block {index} does not extend the chain tip (expected parent {expected}, got {actual})")]
    BrokenLink {
        index: BlockIndex,
        expected: Hash,
        actual: Hash,
    },

    #[error("Chain must start with a genesis block")]
    MissingGenesis,

    #[error("Keystore error: {0}")]
    Keystore(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),

    #[error("Bincode error: {0}")]
    Bincode(String),
}

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;
