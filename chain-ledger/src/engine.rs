//! Ledger engine: shared node state behind one lock

use crate::config::LedgerConfig;
use crate::query::{BalanceView, BlockView, InboxEntry};
use crate::registry::{ClusterSnapshot, PeerRecord};
use crate::state::{LedgerState, MintOutcome};
use crate::{LedgerError, LedgerResult};
use chain_core::{Amount, Block, Hash, Identity, PeerId, PublicKey, Transaction, TransactionKind};
use chain_network::{Broadcaster, MessageHandler, NetworkMessage};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{info, warn};

/// Consensus and ledger engine of one node.
///
/// Every operation takes the state lock once, mutates, collects outbound
/// messages, releases the lock and only then broadcasts.
pub struct LedgerEngine {
    local_id: PeerId,
    public_key: PublicKey,
    config: LedgerConfig,
    state: Mutex<LedgerState>,
    broadcaster: Arc<dyn Broadcaster>,
}

impl LedgerEngine {
    /// Create an engine from the cluster snapshot
    pub fn new(
        identity: Identity,
        snapshot: ClusterSnapshot,
        config: LedgerConfig,
        broadcaster: Arc<dyn Broadcaster>,
    ) -> LedgerResult<Self> {
        let public_key = identity.public_key();
        let state = LedgerState::new(identity, snapshot, &config)?;
        let local_id = state.local_id().clone();

        info!(
            "Ledger engine {} ready ({} peers, block capacity {})",
            local_id, config.peer_count, config.block_capacity
        );

        Ok(Self {
            local_id,
            public_key,
            config,
            state: Mutex::new(state),
            broadcaster,
        })
    }

    pub fn local_id(&self) -> &PeerId {
        &self.local_id
    }

    pub fn public_key(&self) -> PublicKey {
        self.public_key
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Create, admit and broadcast a transaction, then try to mint
    pub fn submit_transaction(
        &self,
        receiver: PublicKey,
        kind: TransactionKind,
        amount: Amount,
        message: Option<String>,
    ) -> LedgerResult<Transaction> {
        let mut outbound = Vec::new();
        let tx = {
            let mut state = self.state.lock();
            let tx = state.create_transaction(receiver, kind, amount, message)?;
            state.admit_transaction(tx.clone())?;
            outbound.push(NetworkMessage::Transaction(tx.clone()));
            Self::mint(&mut state, &mut outbound);
            tx
        };

        self.send(outbound);
        Ok(tx)
    }

    /// Send `amount` to the peer with the given id
    pub fn transfer(
        &self,
        to: &PeerId,
        amount: Amount,
        message: Option<String>,
    ) -> LedgerResult<Transaction> {
        let receiver = self
            .state
            .lock()
            .registry()
            .public_key(to)
            .ok_or_else(|| LedgerError::UnknownPeerId(to.clone()))?;
        self.submit_transaction(receiver, TransactionKind::Exchange, amount, message)
    }

    /// Set this node's stake to `amount`
    pub fn stake(&self, amount: Amount) -> LedgerResult<Transaction> {
        self.submit_transaction(self.public_key, TransactionKind::Stake, amount, None)
    }

    /// Fund every other peer with the initial amount.
    ///
    /// Only the distributor sends anything. Returns the number of funding
    /// transactions created.
    pub fn initial_distribution(&self) -> LedgerResult<usize> {
        let (distributor, recipients) = {
            let state = self.state.lock();
            let registry = state.registry();
            let distributor = match &self.config.distributor {
                Some(id) => id.clone(),
                None => registry
                    .ids()
                    .next()
                    .cloned()
                    .ok_or_else(|| LedgerError::MalformedSnapshot("no peers".to_string()))?,
            };
            let recipients: Vec<_> = registry
                .iter()
                .filter(|record| record.id != distributor)
                .map(|record| record.public_key)
                .collect();
            (distributor, recipients)
        };

        if distributor != self.local_id {
            return Ok(0);
        }

        info!(
            "Distributing {} to {} peers",
            self.config.initial_amount,
            recipients.len()
        );
        for receiver in &recipients {
            self.submit_transaction(
                *receiver,
                TransactionKind::Initialization,
                self.config.initial_amount,
                None,
            )?;
        }
        Ok(recipients.len())
    }

    /// Validate and admit an inbound transaction, then try to mint
    pub fn process_transaction(&self, tx: Transaction) -> LedgerResult<()> {
        let mut outbound = Vec::new();
        {
            let mut state = self.state.lock();
            state.admit_transaction(tx)?;
            Self::mint(&mut state, &mut outbound);
        }
        self.send(outbound);
        Ok(())
    }

    /// Validate and apply an inbound block. Clears the awaiting latch either way.
    pub fn process_block(&self, block: Block) -> LedgerResult<()> {
        let mut outbound = Vec::new();
        let index = block.index;
        let result = {
            let mut state = self.state.lock();
            let result = state.accept_block(block);
            if result.is_ok() {
                Self::mint(&mut state, &mut outbound);
            }
            result
        };

        if result.is_ok() {
            info!("Accepted block {}", index);
        }
        self.send(outbound);
        result
    }

    /// Replace the local chain with a valid candidate
    pub fn process_blockchain(&self, blocks: Vec<Block>) -> LedgerResult<()> {
        self.state.lock().replace_chain(blocks)
    }

    /// Offer the local chain to every peer
    pub fn broadcast_blockchain(&self) {
        let blocks = self.state.lock().chain().blocks().to_vec();
        self.send(vec![NetworkMessage::Blockchain(blocks)]);
    }

    fn mint(state: &mut LedgerState, outbound: &mut Vec<NetworkMessage>) {
        match state.try_mint() {
            Ok(MintOutcome::Minted(block)) => outbound.push(NetworkMessage::Block(block)),
            Ok(MintOutcome::Awaiting { .. }) | Ok(MintOutcome::Idle) => {}
            Err(e) => warn!("Minting failed: {}", e),
        }
    }

    fn send(&self, outbound: Vec<NetworkMessage>) {
        for message in outbound {
            match self.broadcaster.broadcast(&message) {
                Ok(report) if !report.is_complete() => warn!(
                    "{} reached {} peers, {} unreachable",
                    message.kind(),
                    report.delivered,
                    report.failed.len()
                ),
                Ok(_) => {}
                Err(e) => warn!("Failed to broadcast {}: {}", message.kind(), e),
            }
        }
    }

    /// Tentative balance and committed stake of this node
    pub fn balance(&self) -> BalanceView {
        self.state.lock().balance()
    }

    /// Last finalized block, with its validator's peer id
    pub fn last_block(&self) -> BlockView {
        self.state.lock().last_block()
    }

    pub fn chain_dump(&self) -> Vec<BlockView> {
        self.state.lock().chain_dump()
    }

    /// Exchanges addressed to this node, oldest first
    pub fn inbox(&self) -> Vec<InboxEntry> {
        self.state.lock().inbox()
    }

    pub fn registry_snapshot(&self) -> Vec<PeerRecord> {
        self.state.lock().registry_snapshot()
    }

    pub fn pool_len(&self) -> usize {
        self.state.lock().pool().len()
    }

    pub fn chain_len(&self) -> usize {
        self.state.lock().chain().len()
    }

    pub fn tip_hash(&self) -> Hash {
        self.state.lock().chain().tip_hash()
    }

    pub fn is_awaiting_block(&self) -> bool {
        self.state.lock().is_awaiting_block()
    }

    /// Committed balances plus stakes over all peers
    pub fn total_holdings(&self) -> u128 {
        self.state.lock().registry().total_holdings()
    }
}

impl MessageHandler for LedgerEngine {
    fn handle_transaction(&self, transaction: Transaction) {
        let nonce = transaction.nonce;
        if let Err(e) = self.process_transaction(transaction) {
            warn!("{} rejected transaction (nonce {}): {}", self.local_id, nonce, e);
        }
    }

    fn handle_block(&self, block: Block) {
        let index = block.index;
        if let Err(e) = self.process_block(block) {
            warn!("{} rejected block {}: {}", self.local_id, index, e);
        }
    }

    fn handle_blockchain(&self, blocks: Vec<Block>) {
        let len = blocks.len();
        if let Err(e) = self.process_blockchain(blocks) {
            warn!("{} rejected chain of {} blocks: {}", self.local_id, len, e);
        }
    }
}

impl std::fmt::Debug for LedgerEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerEngine")
            .field("local_id", &self.local_id)
            .field("public_key", &self.public_key)
            .finish()
    }
}
