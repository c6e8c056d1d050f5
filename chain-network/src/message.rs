//! Wire message envelope

use crate::{NetworkError, NetworkResult};
use bytes::Bytes;
use chain_core::{Block, Transaction};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Message size limits
pub mod limits {
    /// Maximum encoded message size (16 MB, enough for a full chain dump)
    pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;
}

/// Type tag of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    Transaction,
    Block,
    Blockchain,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            MessageKind::Transaction => "TRANSACTION",
            MessageKind::Block => "BLOCK",
            MessageKind::Blockchain => "BLOCKCHAIN",
        };
        f.write_str(tag)
    }
}

/// Messages exchanged between nodes
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub enum NetworkMessage {
    /// A newly created transaction
    Transaction(Transaction),
    /// A freshly minted block
    Block(Block),
    /// A whole chain offered as a replacement
    Blockchain(Vec<Block>),
}

impl NetworkMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            NetworkMessage::Transaction(_) => MessageKind::Transaction,
            NetworkMessage::Block(_) => MessageKind::Block,
            NetworkMessage::Blockchain(_) => MessageKind::Blockchain,
        }
    }

    /// Encode into a single frame
    pub fn encode(&self) -> NetworkResult<Bytes> {
        let encoded = bincode::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| NetworkError::Encoding(e.to_string()))?;
        if encoded.len() > limits::MAX_MESSAGE_SIZE {
            return Err(NetworkError::MessageTooLarge {
                size: encoded.len(),
                limit: limits::MAX_MESSAGE_SIZE,
            });
        }
        Ok(Bytes::from(encoded))
    }

    /// Decode a frame produced by [`NetworkMessage::encode`]
    pub fn decode(frame: &[u8]) -> NetworkResult<Self> {
        if frame.len() > limits::MAX_MESSAGE_SIZE {
            return Err(NetworkError::MessageTooLarge {
                size: frame.len(),
                limit: limits::MAX_MESSAGE_SIZE,
            });
        }

        let (message, read): (Self, usize) =
            bincode::decode_from_slice(frame, bincode::config::standard())
                .map_err(|e| NetworkError::Decoding(e.to_string()))?;
        if read != frame.len() {
            return Err(NetworkError::Decoding(format!(
                "{} trailing bytes after message",
                frame.len() - read
            )));
        }
        Ok(message)
    }
}
