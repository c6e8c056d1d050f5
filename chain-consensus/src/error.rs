//! Consensus error types

use thiserror::Error;

/// Consensus error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    /// No peer holds any stake, so nobody can be elected
    #[error("No eligible validator: total stake is zero")]
    NoEligibleValidator,

    /// Stake table error
    #[error("Stake table error: {0}")]
    StakeTable(String),
}

/// Result type for consensus operations
pub type ConsensusResult<T> = Result<T, ConsensusError>;
