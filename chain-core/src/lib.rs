//! Core ledger data structures
//!
//! This crate provides the fundamental building blocks for the proof-of-stake node:
//! - Basic types (Hash, PublicKey, PeerId, Amount, etc.)
//! - Transaction and Block structures
//! - The append-only Blockchain
//! - Wallet identity and transaction signing

pub mod block;
pub mod blockchain;
pub mod error;
pub mod identity;
pub mod transaction;
pub mod types;

// Re-export commonly used types
pub use block::*;
pub use blockchain::*;
pub use error::*;
pub use identity::*;
pub use transaction::*;
pub use types::*;
