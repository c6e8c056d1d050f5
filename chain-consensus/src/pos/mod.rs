//! Proof of Stake leader election

pub mod selector;
pub mod stake;

pub use selector::ProofOfStake;
pub use stake::StakeTable;
