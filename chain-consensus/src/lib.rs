//! Blockchain consensus engine
//!
//! This crate provides stake-weighted leader election: every node holding
//! the same stake snapshot elects the same validator for a given chain tip.

pub mod error;
pub mod pos;

pub use error::{ConsensusError, ConsensusResult};
pub use pos::{ProofOfStake, StakeTable};
