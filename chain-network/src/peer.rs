//! Connected peers and outbound broadcast

use crate::message::NetworkMessage;
use crate::{NetworkError, NetworkResult};
use bytes::Bytes;
use chain_core::PeerId;
use parking_lot::RwLock;
use std::fmt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Outbound half of a connection to one peer
pub trait PeerSink: Send + Sync {
    /// Fire-and-forget delivery of one encoded frame
    fn send(&self, frame: Bytes) -> NetworkResult<()>;
}

/// Outbound broadcast contract used by the ledger
pub trait Broadcaster: Send + Sync {
    /// Attempt delivery to every connected peer independently
    fn broadcast(&self, message: &NetworkMessage) -> NetworkResult<BroadcastReport>;
}

/// Outcome of one broadcast
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Number of peers the frame was handed to
    pub delivered: usize,
    /// Peers whose send failed
    pub failed: Vec<PeerId>,
}

impl BroadcastReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// In-process connection backed by an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    peer: PeerId,
    tx: mpsc::UnboundedSender<Bytes>,
}

impl PeerSink for ChannelSink {
    fn send(&self, frame: Bytes) -> NetworkResult<()> {
        self.tx
            .send(frame)
            .map_err(|_| NetworkError::ChannelClosed(self.peer.clone()))
    }
}

/// Create an in-process connection towards `peer`.
///
/// The receiver is the peer's inbound end and is usually handed to
/// [`crate::dispatch::serve_connection`].
pub fn channel(peer: PeerId) -> (ChannelSink, mpsc::UnboundedReceiver<Bytes>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelSink { peer, tx }, rx)
}

struct PeerLink {
    id: PeerId,
    sink: Box<dyn PeerSink>,
}

/// Set of currently connected peers
#[derive(Default)]
pub struct PeerSet {
    peers: RwLock<Vec<PeerLink>>,
}

impl PeerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the outbound end of a connection
    pub fn connect(&self, id: PeerId, sink: impl PeerSink + 'static) -> NetworkResult<()> {
        let mut peers = self.peers.write();
        if peers.iter().any(|link| link.id == id) {
            return Err(NetworkError::DuplicatePeer(id));
        }
        debug!("Connected to peer {}", id);
        peers.push(PeerLink {
            id,
            sink: Box::new(sink),
        });
        Ok(())
    }

    /// Drop a connection. Returns whether the peer was connected.
    pub fn disconnect(&self, id: &PeerId) -> bool {
        let mut peers = self.peers.write();
        let before = peers.len();
        peers.retain(|link| &link.id != id);
        peers.len() != before
    }

    pub fn peer_ids(&self) -> Vec<PeerId> {
        self.peers.read().iter().map(|link| link.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }
}

impl Broadcaster for PeerSet {
    fn broadcast(&self, message: &NetworkMessage) -> NetworkResult<BroadcastReport> {
        let frame = message.encode()?;
        let mut report = BroadcastReport::default();

        for link in self.peers.read().iter() {
            match link.sink.send(frame.clone()) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!("Failed to send {} to {}: {}", message.kind(), link.id, e);
                    report.failed.push(link.id.clone());
                }
            }
        }

        debug!(
            "Broadcast {} to {} peers ({} failed)",
            message.kind(),
            report.delivered,
            report.failed.len()
        );
        Ok(report)
    }
}

impl fmt::Debug for PeerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerSet")
            .field("peers", &self.peer_ids())
            .finish()
    }
}
