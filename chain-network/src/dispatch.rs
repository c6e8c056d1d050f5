//! Inbound message dispatch

use crate::message::NetworkMessage;
use bytes::Bytes;
use chain_core::{Block, PeerId, Transaction};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Receiver of decoded inbound messages, one method per message type
pub trait MessageHandler: Send + Sync {
    fn handle_transaction(&self, transaction: Transaction);

    fn handle_block(&self, block: Block);

    fn handle_blockchain(&self, blocks: Vec<Block>);
}

/// Deliver a decoded message to the handler for its type
pub fn dispatch<H: MessageHandler + ?Sized>(handler: &H, message: NetworkMessage) {
    match message {
        NetworkMessage::Transaction(tx) => handler.handle_transaction(tx),
        NetworkMessage::Block(block) => handler.handle_block(block),
        NetworkMessage::Blockchain(blocks) => handler.handle_blockchain(blocks),
    }
}

/// Serve one inbound connection until its sender side closes.
///
/// Frames are handled one at a time, so messages from the same connection
/// are processed in receipt order. Frames that fail to decode are logged and
/// skipped.
pub async fn serve_connection<H>(
    from: PeerId,
    mut inbound: mpsc::UnboundedReceiver<Bytes>,
    handler: Arc<H>,
) -> usize
where
    H: MessageHandler + ?Sized,
{
    let mut handled = 0;
    while let Some(frame) = inbound.recv().await {
        match NetworkMessage::decode(&frame) {
            Ok(message) => {
                debug!("Received {} from {}", message.kind(), from);
                dispatch(handler.as_ref(), message);
                handled += 1;
            }
            Err(e) => warn!("Dropping malformed frame from {}: {}", from, e),
        }
    }

    info!("Connection from {} closed after {} messages", from, handled);
    handled
}
