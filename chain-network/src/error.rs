//! Network error types

use chain_core::PeerId;
use thiserror::Error;

pub type NetworkResult<T> = Result<T, NetworkError>;

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Message encoding error: {0}")]
    Encoding(String),

    #[error("Message decoding error: {0}")]
    Decoding(String),

    #[error("Message too large: {size} bytes (limit {limit})")]
    MessageTooLarge { size: usize, limit: usize },

    #[error("Connection to {0} is closed")]
    ChannelClosed(PeerId),

    #[error("Peer connection error: {0}")]
    Connection(String),

    #[error("Peer already connected: {0}")]
    DuplicatePeer(PeerId),
}
