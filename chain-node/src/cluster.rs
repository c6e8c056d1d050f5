//! In-process cluster: N engines wired to each other over channels

use chain_core::{Amount, Identity, PeerId};
use chain_ledger::{ClusterSnapshot, LedgerConfig, LedgerEngine, LedgerResult, PeerRecord};
use chain_network::{channel, serve_connection, PeerSet};
use futures::future::join_all;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Fully connected set of nodes running in one process
pub struct LocalCluster {
    engines: Vec<Arc<LedgerEngine>>,
    peer_sets: Vec<Arc<PeerSet>>,
    connections: Vec<JoinHandle<usize>>,
}

impl LocalCluster {
    /// Snapshot funding the first peer with everything it will distribute
    pub fn genesis_snapshot(
        identities: &[Identity],
        config: &LedgerConfig,
        stake: Amount,
    ) -> ClusterSnapshot {
        let funds = config
            .initial_amount
            .saturating_mul(identities.len() as Amount);
        identities
            .iter()
            .enumerate()
            .map(|(i, identity)| PeerRecord {
                id: PeerId::indexed(i),
                public_key: identity.public_key(),
                balance: if i == 0 { funds } else { 0 },
                stake,
            })
            .collect()
    }

    /// Start one engine per identity and connect every pair of nodes.
    ///
    /// Must run inside a tokio runtime; each inbound connection is served by
    /// its own task.
    pub fn start(
        identities: Vec<Identity>,
        snapshot: ClusterSnapshot,
        config: LedgerConfig,
    ) -> LedgerResult<Self> {
        let mut engines = Vec::with_capacity(identities.len());
        let mut peer_sets = Vec::with_capacity(identities.len());
        for identity in identities {
            let peers = Arc::new(PeerSet::new());
            let engine =
                LedgerEngine::new(identity, snapshot.clone(), config.clone(), peers.clone())?;
            engines.push(Arc::new(engine));
            peer_sets.push(peers);
        }

        let mut connections = Vec::new();
        for (from, peers) in engines.iter().zip(&peer_sets) {
            for to in &engines {
                if Arc::ptr_eq(from, to) {
                    continue;
                }
                let (sink, inbound) = channel(to.local_id().clone());
                if let Err(e) = peers.connect(to.local_id().clone(), sink) {
                    warn!("Skipping connection {} -> {}: {}", from.local_id(), to.local_id(), e);
                    continue;
                }
                connections.push(tokio::spawn(serve_connection(
                    from.local_id().clone(),
                    inbound,
                    to.clone(),
                )));
            }
        }

        info!(
            "Started {} nodes with {} connections",
            engines.len(),
            connections.len()
        );
        Ok(Self {
            engines,
            peer_sets,
            connections,
        })
    }

    pub fn engines(&self) -> &[Arc<LedgerEngine>] {
        &self.engines
    }

    /// Node holding the longest chain
    pub fn longest_chain(&self) -> Option<&Arc<LedgerEngine>> {
        self.engines.iter().max_by_key(|engine| engine.chain_len())
    }

    /// Close every connection and wait for the serving tasks.
    ///
    /// Returns the number of messages handled across the cluster.
    pub async fn shutdown(self) -> usize {
        for (engine, peers) in self.engines.iter().zip(&self.peer_sets) {
            for id in peers.peer_ids() {
                peers.disconnect(&id);
            }
            info!("{} disconnected", engine.local_id());
        }

        join_all(self.connections)
            .await
            .into_iter()
            .filter_map(|handled| match handled {
                Ok(count) => Some(count),
                Err(e) => {
                    warn!("Connection task failed: {}", e);
                    None
                }
            })
            .sum()
    }
}
