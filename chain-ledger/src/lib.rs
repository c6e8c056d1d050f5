//! Proof-of-stake ledger
//!
//! This crate holds the per-node ledger and the consensus state machine:
//! - Peer registry (committed balances and stakes) and tentative ledger
//! - Transaction validation, admission and the transaction pool
//! - Block minting by the elected validator, block and chain acceptance
//! - Configuration, cluster snapshot files and the read-only query surface

pub mod config;
pub mod effect;
pub mod engine;
pub mod error;
pub mod pool;
pub mod query;
pub mod registry;
pub mod state;
pub mod tentative;

pub use config::{ClusterConfig, LedgerConfig, PeerConfig};
pub use effect::{Accounts, Effect};
pub use engine::LedgerEngine;
pub use error::{LedgerError, LedgerResult};
pub use pool::TransactionPool;
pub use query::{BalanceView, BlockView, InboxEntry, TransactionView};
pub use registry::{ClusterSnapshot, PeerRecord, PeerRegistry};
pub use state::{LedgerState, MintOutcome};
pub use tentative::TentativeLedger;
