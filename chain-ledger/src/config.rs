//! Ledger configuration and cluster snapshot files

use crate::registry::{ClusterSnapshot, PeerRecord};
use crate::{LedgerError, LedgerResult};
use chain_core::{Amount, FeeSchedule, PeerId, PublicKey};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Ledger configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Number of peers in the cluster
    pub peer_count: usize,
    /// Maximum transactions per block; a full pool triggers minting
    pub block_capacity: usize,
    /// Amount the distributor sends to every other peer at start
    pub initial_amount: Amount,
    /// Fee charged on exchanges, in percent of the amount
    pub fee_percent: u64,
    /// Peer running the initial distribution (lowest id when unset)
    #[serde(default)]
    pub distributor: Option<PeerId>,
    /// Maximum number of observed events kept for the query surface
    #[serde(default = "default_inbox_limit")]
    pub inbox_limit: usize,
}

fn default_inbox_limit() -> usize {
    256
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            peer_count: 5,
            block_capacity: 5,
            initial_amount: 1000,
            fee_percent: 3,
            distributor: None,
            inbox_limit: default_inbox_limit(),
        }
    }
}

impl LedgerConfig {
    /// Create a new ledger configuration
    pub fn new(peer_count: usize, block_capacity: usize) -> Self {
        Self {
            peer_count,
            block_capacity,
            ..Self::default()
        }
    }

    /// Load configuration from file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> LedgerResult<Self> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| LedgerError::Config(format!("Failed to read config file: {}", e)))?;

        let config: LedgerConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> LedgerResult<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), content)
            .map_err(|e| LedgerError::Config(format!("Failed to write config file: {}", e)))?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> LedgerResult<()> {
        if self.peer_count == 0 {
            return Err(LedgerError::Config(
                "Peer count must be greater than 0".to_string(),
            ));
        }

        if self.block_capacity == 0 {
            return Err(LedgerError::Config(
                "Block capacity must be greater than 0".to_string(),
            ));
        }

        if self.fee_percent > 100 {
            return Err(LedgerError::Config(format!(
                "Fee percent must be at most 100, got {}",
                self.fee_percent
            )));
        }

        Ok(())
    }

    /// Fee schedule handed to the node's identity
    pub fn fee_schedule(&self) -> FeeSchedule {
        FeeSchedule::new(self.fee_percent)
    }

    /// Set initial distribution amount
    pub fn with_initial_amount(mut self, amount: Amount) -> Self {
        self.initial_amount = amount;
        self
    }

    /// Set exchange fee percentage
    pub fn with_fee_percent(mut self, percent: u64) -> Self {
        self.fee_percent = percent;
        self
    }

    /// Set the distributing peer
    pub fn with_distributor(mut self, distributor: PeerId) -> Self {
        self.distributor = Some(distributor);
        self
    }
}

/// One peer of the cluster file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerConfig {
    /// Peer id
    pub id: String,
    /// Hex-encoded Ed25519 public key
    pub public_key: String,
    /// Initial balance
    pub balance: Amount,
    /// Initial stake
    pub stake: Amount,
}

/// Out-of-band peer list used to form the cluster
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub peers: Vec<PeerConfig>,
}

impl ClusterConfig {
    /// Load cluster file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> LedgerResult<Self> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| LedgerError::Config(format!("Failed to read cluster file: {}", e)))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save cluster file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> LedgerResult<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), content)
            .map_err(|e| LedgerError::Config(format!("Failed to write cluster file: {}", e)))?;
        Ok(())
    }

    /// Build the cluster file from registry records
    pub fn from_snapshot(snapshot: &[PeerRecord]) -> Self {
        Self {
            peers: snapshot
                .iter()
                .map(|record| PeerConfig {
                    id: record.id.to_string(),
                    public_key: record.public_key.to_hex(),
                    balance: record.balance,
                    stake: record.stake,
                })
                .collect(),
        }
    }

    /// Validate and convert into a registry snapshot
    pub fn to_snapshot(&self, expected_peers: usize) -> LedgerResult<ClusterSnapshot> {
        if self.peers.len() != expected_peers {
            return Err(LedgerError::MalformedSnapshot(format!(
                "expected {} peers, found {}",
                expected_peers,
                self.peers.len()
            )));
        }

        let mut ids = HashSet::new();
        let mut snapshot = Vec::with_capacity(self.peers.len());
        for (i, peer) in self.peers.iter().enumerate() {
            if peer.id.is_empty() || !ids.insert(peer.id.as_str()) {
                return Err(LedgerError::MalformedSnapshot(format!(
                    "peer {} has an empty or duplicate id {:?}",
                    i, peer.id
                )));
            }

            let public_key = PublicKey::from_hex(&peer.public_key).map_err(|e| {
                LedgerError::MalformedSnapshot(format!(
                    "invalid public key for {}: {}",
                    peer.id, e
                ))
            })?;

            snapshot.push(PeerRecord {
                id: PeerId::new(peer.id.clone()),
                public_key,
                balance: peer.balance,
                stake: peer.stake,
            });
        }

        Ok(snapshot)
    }
}
