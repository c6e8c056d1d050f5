//! Ledger state machine: admission, minting, block and chain handling

use crate::config::LedgerConfig;
use crate::effect::{Accounts, Effect};
use crate::pool::TransactionPool;
use crate::query::{BalanceView, BlockView, InboxEntry};
use crate::registry::{ClusterSnapshot, PeerRecord, PeerRegistry};
use crate::tentative::TentativeLedger;
use crate::{LedgerError, LedgerResult};
use chain_consensus::{ConsensusError, ProofOfStake};
use chain_core::{
    Amount, Block, Blockchain, Identity, PeerId, PublicKey, Transaction, TransactionKind,
};
use std::collections::{BTreeMap, VecDeque};
use tracing::{debug, info, warn};

/// Result of a minting attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MintOutcome {
    /// Pool not full, already waiting, or nothing left to include
    Idle,
    /// Another peer is elected; the node now waits for its block
    Awaiting { elected: PeerId },
    /// This node minted and finalized a block
    Minted(Block),
}

/// All mutable state of one node.
///
/// Owned by a single lock in [`crate::LedgerEngine`]. Methods take `&mut
/// self` and never lock, so one acquisition covers a whole operation.
#[derive(Debug)]
pub struct LedgerState {
    identity: Identity,
    local_id: PeerId,
    registry: PeerRegistry,
    tentative: TentativeLedger,
    pool: TransactionPool,
    chain: Blockchain,
    pos: ProofOfStake,
    awaiting_block: bool,
    inbox: VecDeque<InboxEntry>,
    inbox_limit: usize,
}

impl LedgerState {
    /// Initialize registry, tentative ledger and selector from the snapshot
    pub fn new(
        identity: Identity,
        snapshot: ClusterSnapshot,
        config: &LedgerConfig,
    ) -> LedgerResult<Self> {
        config.validate()?;
        if snapshot.len() != config.peer_count {
            return Err(LedgerError::MalformedSnapshot(format!(
                "expected {} peers, found {}",
                config.peer_count,
                snapshot.len()
            )));
        }

        let registry = PeerRegistry::from_snapshot(snapshot)?;
        let local_id = registry
            .id_of(&identity.public_key())
            .cloned()
            .ok_or_else(|| {
                LedgerError::MalformedSnapshot(format!(
                    "local key {} is not part of the cluster",
                    identity.public_key().short()
                ))
            })?;

        let identity = identity.with_fee_schedule(config.fee_schedule());
        let tentative = TentativeLedger::from_registry(&registry);
        let pos = ProofOfStake::new(registry.stake_table());

        Ok(Self {
            identity,
            local_id,
            registry,
            tentative,
            pool: TransactionPool::new(config.block_capacity),
            chain: Blockchain::new()?,
            pos,
            awaiting_block: false,
            inbox: VecDeque::new(),
            inbox_limit: config.inbox_limit,
        })
    }

    /// Sign a new transaction with the node's identity
    pub fn create_transaction(
        &mut self,
        receiver: PublicKey,
        kind: TransactionKind,
        amount: Amount,
        message: Option<String>,
    ) -> LedgerResult<Transaction> {
        Ok(self
            .identity
            .create_transaction(receiver, kind, amount, message)?)
    }

    /// Check a transaction against the tentative ledger.
    ///
    /// Order: signature, coverage, replay against chain and pool.
    pub fn validate_transaction(&self, tx: &Transaction) -> LedgerResult<Effect> {
        if !matches!(tx.verify_signature(), Ok(true)) {
            return Err(LedgerError::InvalidSignature);
        }

        let effect = Effect::resolve(tx, &self.registry)?;
        effect.check_covered(&self.tentative)?;

        if self.chain.contains(tx) || self.pool.contains(tx) {
            return Err(LedgerError::DuplicateTransaction);
        }
        Ok(effect)
    }

    /// Validate, apply to the tentative ledger and pool the transaction
    pub fn admit_transaction(&mut self, tx: Transaction) -> LedgerResult<()> {
        let effect = self.validate_transaction(&tx)?;
        effect.apply_to(&mut self.tentative)?;
        debug!(
            "Admitted {} from {} (nonce {}), pool size {}",
            tx.kind,
            effect.sender(),
            tx.nonce,
            self.pool.len() + 1
        );
        self.pool.push(tx);
        Ok(())
    }

    /// Validator elected for the block after the current tip
    pub fn elected(&self) -> LedgerResult<PeerId> {
        Ok(self.pos.validator(&self.chain.tip_hash())?)
    }

    /// Mint a block if the pool is full and this node is elected.
    ///
    /// Pool transactions that no longer apply to committed state are dropped
    /// and left out of the block.
    pub fn try_mint(&mut self) -> LedgerResult<MintOutcome> {
        if self.awaiting_block || !self.pool.validation_required() {
            return Ok(MintOutcome::Idle);
        }

        let elected = match self.elected() {
            Ok(elected) => elected,
            Err(LedgerError::Consensus(ConsensusError::NoEligibleValidator)) => {
                warn!("No peer holds stake, cannot elect a validator");
                return Ok(MintOutcome::Idle);
            }
            Err(e) => return Err(e),
        };

        if elected != self.local_id {
            debug!("{} is elected, waiting for its block", elected);
            self.awaiting_block = true;
            return Ok(MintOutcome::Awaiting { elected });
        }

        let mut staged = self.registry.clone();
        let mut included = Vec::new();
        let mut stale = Vec::new();
        for tx in self.pool.iter() {
            if included.len() == self.pool.capacity() {
                break;
            }
            match Effect::resolve(tx, &staged).and_then(|effect| effect.apply_to(&mut staged)) {
                Ok(()) => included.push(tx.clone()),
                Err(e) => {
                    warn!("Dropping pooled transaction (nonce {}): {}", tx.nonce, e);
                    stale.push(tx.clone());
                }
            }
        }
        self.pool.remove_all(&stale);

        if included.is_empty() {
            return Ok(MintOutcome::Idle);
        }

        let block = Block::new(
            self.chain.next_index(),
            included,
            self.chain.tip_hash(),
            self.identity.public_key(),
        )?;
        self.finalize(block.clone(), staged)?;

        info!(
            "Minted block {} with {} transactions",
            block.index,
            block.transactions.len()
        );
        Ok(MintOutcome::Minted(block))
    }

    /// Check `block` as the successor of `parent`
    fn check_link(&self, block: &Block, parent: &Block) -> LedgerResult<()> {
        if block.previous_hash != parent.current_hash {
            return Err(LedgerError::InvalidBlockLink {
                expected: parent.current_hash,
                actual: block.previous_hash,
            });
        }

        if block.index != parent.index + 1 {
            return Err(LedgerError::InvalidBlockIndex {
                expected: parent.index + 1,
                actual: block.index,
            });
        }

        if !block.hash_matches()? {
            return Err(LedgerError::InvalidBlockHash { index: block.index });
        }

        let elected = self.pos.validator(&parent.current_hash)?;
        let expected = self
            .registry
            .public_key(&elected)
            .ok_or(LedgerError::UnknownPeerId(elected))?;
        if block.validator != expected {
            return Err(LedgerError::InvalidValidator {
                expected,
                actual: block.validator,
            });
        }

        if block.transactions.len() > self.pool.capacity() {
            return Err(LedgerError::BlockTooLarge {
                size: block.transactions.len(),
                capacity: self.pool.capacity(),
            });
        }

        Ok(())
    }

    /// Check that `block` extends the local tip and comes from its elected validator
    pub fn validate_block(&self, block: &Block) -> LedgerResult<()> {
        self.check_link(block, self.chain.tip())
    }

    /// Apply every transaction of the block to a copy of committed state
    fn stage_block(&self, block: &Block) -> LedgerResult<PeerRegistry> {
        let mut staged = self.registry.clone();
        for (i, tx) in block.transactions.iter().enumerate() {
            if !matches!(tx.verify_signature(), Ok(true)) {
                return Err(LedgerError::InvalidSignature);
            }
            let repeated = block.transactions[..i]
                .iter()
                .any(|earlier| earlier.replay_key() == tx.replay_key());
            if repeated || self.chain.contains(tx) {
                return Err(LedgerError::DuplicateTransaction);
            }
            Effect::resolve(tx, &staged)?.apply_to(&mut staged)?;
        }
        Ok(staged)
    }

    /// Handle a block received from a peer.
    ///
    /// Clears the awaiting latch whether or not the block is accepted. A
    /// rejected block leaves state untouched.
    pub fn accept_block(&mut self, block: Block) -> LedgerResult<()> {
        let staged = self
            .validate_block(&block)
            .and_then(|()| self.stage_block(&block));
        let result = match staged {
            Ok(staged) => self.finalize(block, staged),
            Err(e) => Err(e),
        };
        self.awaiting_block = false;
        result
    }

    /// Commit a staged block: fee credit, append, resync, pool cleanup
    fn finalize(&mut self, block: Block, mut staged: PeerRegistry) -> LedgerResult<()> {
        let validator = staged.resolve(&block.validator)?;
        let fees = block.total_fees();
        staged.credit(&validator, fees)?;

        self.chain.append(block.clone())?;
        self.registry = staged;
        self.tentative.resync(&self.registry);
        let removed = self.pool.remove_all(&block.transactions);

        debug!(
            "Finalized block {} from {}: {} fees, {} pooled transactions confirmed",
            block.index, validator, fees, removed
        );
        self.record_block_effects(&block);
        Ok(())
    }

    /// Stake updates and messages carried by a finalized block
    fn record_block_effects(&mut self, block: &Block) {
        let local_key = self.identity.public_key();
        let mut latest_stakes = BTreeMap::new();

        for tx in &block.transactions {
            let Some(sender) = self.registry.id_of(&tx.sender).cloned() else {
                continue;
            };
            match tx.kind {
                TransactionKind::Stake => {
                    latest_stakes.insert(sender, tx.amount);
                }
                TransactionKind::Exchange if tx.receiver == local_key => {
                    match &tx.message {
                        Some(message) => info!("User with ID {} messaged you: {}", sender, message),
                        None => info!("User with ID {} sent you {}", sender, tx.amount),
                    }
                    if self.inbox.len() == self.inbox_limit {
                        self.inbox.pop_front();
                    }
                    if self.inbox_limit > 0 {
                        self.inbox.push_back(InboxEntry {
                            from: sender,
                            amount: tx.amount,
                            message: tx.message.clone(),
                            block_index: block.index,
                            observed_at: chrono::Utc::now(),
                        });
                    }
                }
                _ => {}
            }
        }

        for (peer, stake) in &latest_stakes {
            debug!("Stake of {} is now {}", peer, stake);
        }
        self.pos.set_stakes(self.registry.stake_table());
    }

    /// Check every non-genesis block of a candidate chain against its predecessor
    pub fn validate_chain(&self, blocks: &[Block]) -> LedgerResult<()> {
        let genesis = Block::genesis()?;
        match blocks.first() {
            Some(first) if *first == genesis => {}
            _ => {
                return Err(LedgerError::InvalidChain {
                    index: 0,
                    reason: Box::new(LedgerError::Core(chain_core::CoreError::MissingGenesis)),
                })
            }
        }

        for pair in blocks.windows(2) {
            self.check_link(&pair[1], &pair[0])
                .map_err(|reason| LedgerError::InvalidChain {
                    index: pair[1].index,
                    reason: Box::new(reason),
                })?;
        }
        Ok(())
    }

    /// Replace the local chain with a valid candidate.
    ///
    /// Balances and stakes are kept as they are; only pooled transactions the
    /// new chain already finalized are dropped. Clears the awaiting latch.
    pub fn replace_chain(&mut self, blocks: Vec<Block>) -> LedgerResult<()> {
        self.validate_chain(&blocks)?;
        let previous_len = self.chain.len();
        self.chain = Blockchain::from_blocks(blocks)?;
        self.pool.retain(|tx| !self.chain.contains(tx));
        self.awaiting_block = false;

        info!(
            "Replaced chain of {} blocks with {} blocks",
            previous_len,
            self.chain.len()
        );
        Ok(())
    }

    pub fn local_id(&self) -> &PeerId {
        &self.local_id
    }

    pub fn public_key(&self) -> PublicKey {
        self.identity.public_key()
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    pub fn tentative(&self) -> &TentativeLedger {
        &self.tentative
    }

    pub fn pool(&self) -> &TransactionPool {
        &self.pool
    }

    pub fn chain(&self) -> &Blockchain {
        &self.chain
    }

    pub fn is_awaiting_block(&self) -> bool {
        self.awaiting_block
    }

    /// Tentative balance and committed stake of this node
    pub fn balance(&self) -> BalanceView {
        BalanceView {
            balance: self.tentative.balance(&self.local_id).unwrap_or_default(),
            stake: self
                .registry
                .get(&self.local_id)
                .map(|record| record.stake)
                .unwrap_or_default(),
        }
    }

    /// Tip block with its validator and transactions
    pub fn last_block(&self) -> BlockView {
        BlockView::new(self.chain.tip(), &self.registry)
    }

    pub fn chain_dump(&self) -> Vec<BlockView> {
        self.chain
            .blocks()
            .iter()
            .map(|block| BlockView::new(block, &self.registry))
            .collect()
    }

    pub fn inbox(&self) -> Vec<InboxEntry> {
        self.inbox.iter().cloned().collect()
    }

    pub fn registry_snapshot(&self) -> Vec<PeerRecord> {
        self.registry.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_core::Hash;
    use proptest::prelude::*;

    fn identity(i: usize) -> Identity {
        Identity::from_secret([i as u8 + 1; 32])
    }

    fn key(i: usize) -> PublicKey {
        identity(i).public_key()
    }

    /// Snapshot from `(balance, stake)` per peer
    fn snapshot(peers: &[(Amount, Amount)]) -> ClusterSnapshot {
        peers
            .iter()
            .enumerate()
            .map(|(i, (balance, stake))| PeerRecord {
                id: PeerId::indexed(i),
                public_key: key(i),
                balance: *balance,
                stake: *stake,
            })
            .collect()
    }

    fn state(i: usize, snapshot: &ClusterSnapshot, capacity: usize) -> LedgerState {
        let config = LedgerConfig::new(snapshot.len(), capacity);
        LedgerState::new(identity(i), snapshot.clone(), &config).unwrap()
    }

    /// Index of the peer elected on top of genesis
    fn genesis_leader(snapshot: &ClusterSnapshot) -> usize {
        let pos = ProofOfStake::new(
            snapshot
                .iter()
                .map(|record| (record.id.clone(), record.stake))
                .collect(),
        );
        let elected = pos.validator(&Block::genesis().unwrap().current_hash).unwrap();
        snapshot.iter().position(|r| r.id == elected).unwrap()
    }

    /// Every state sees every transaction; minted blocks reach all others
    struct Cluster {
        states: Vec<LedgerState>,
        wallets: Vec<Identity>,
    }

    impl Cluster {
        fn new(snapshot: &ClusterSnapshot, capacity: usize) -> Self {
            Self {
                states: (0..snapshot.len())
                    .map(|i| state(i, snapshot, capacity))
                    .collect(),
                wallets: (0..snapshot.len()).map(identity).collect(),
            }
        }

        fn exchange(&mut self, from: usize, to: usize, amount: Amount) -> Option<Block> {
            let tx = self.wallets[from]
                .create_transaction(key(to), TransactionKind::Exchange, amount, None)
                .unwrap();
            for state in &mut self.states {
                state.admit_transaction(tx.clone()).unwrap();
            }

            let mut minted = None;
            for i in 0..self.states.len() {
                if let MintOutcome::Minted(block) = self.states[i].try_mint().unwrap() {
                    for (j, other) in self.states.iter_mut().enumerate() {
                        if j != i {
                            other.accept_block(block.clone()).unwrap();
                        }
                    }
                    minted = Some(block);
                }
            }
            minted
        }
    }

    #[test]
    fn test_malformed_snapshot_aborts() {
        let peers = snapshot(&[(100, 1), (0, 1)]);
        let config = LedgerConfig::new(3, 2);
        assert!(matches!(
            LedgerState::new(identity(0), peers.clone(), &config),
            Err(LedgerError::MalformedSnapshot(_))
        ));

        let config = LedgerConfig::new(2, 2);
        assert!(matches!(
            LedgerState::new(identity(5), peers, &config),
            Err(LedgerError::MalformedSnapshot(_))
        ));
    }

    #[test]
    fn test_scenario_a_all_nodes_elect_the_same_validator() {
        let peers = snapshot(&[(0, 10), (0, 20), (0, 30)]);
        let states: Vec<_> = (0..3).map(|i| state(i, &peers, 5)).collect();

        let elected: Vec<_> = states.iter().map(|s| s.elected().unwrap()).collect();
        assert!(elected.iter().all(|id| *id == elected[0]));

        // genesis prefix reduced mod 60 lands in exactly one interval
        let ticket = Block::genesis().unwrap().current_hash.prefix_u64() % 60;
        let expected = match ticket {
            0..=9 => 0,
            10..=29 => 1,
            _ => 2,
        };
        assert_eq!(elected[0], PeerId::indexed(expected));
    }

    #[test]
    fn test_scenario_b_exact_balance_without_fee_room() {
        let peers = snapshot(&[(1000, 10), (0, 10)]);
        let mut node = state(1, &peers, 5);
        let mut sender = identity(0);

        let tx = sender
            .create_transaction_with_fee(key(1), TransactionKind::Exchange, 1000, 1, None)
            .unwrap();
        assert!(matches!(
            node.admit_transaction(tx),
            Err(LedgerError::InsufficientFunds {
                available: 1000,
                required: 1001,
                ..
            })
        ));
        assert!(node.pool().is_empty());
        assert_eq!(node.tentative().balance(&PeerId::indexed(0)), Some(1000));
        assert_eq!(node.tentative().balance(&PeerId::indexed(1)), Some(0));
    }

    #[test]
    fn test_scenario_c_stake_transition_is_zero_sum() {
        let peers = snapshot(&[(100, 5), (100, 5)]);
        let leader = genesis_leader(&peers);
        let mut node = state(leader, &peers, 1);
        let before = node.registry().total_holdings();

        let tx = node
            .create_transaction(node.public_key(), TransactionKind::Stake, 8, None)
            .unwrap();
        node.admit_transaction(tx).unwrap();
        assert!(matches!(node.try_mint().unwrap(), MintOutcome::Minted(_)));

        let id = PeerId::indexed(leader);
        assert_eq!(node.registry().balance_of(&id).unwrap(), 97);
        assert_eq!(node.registry().stake_of(&id).unwrap(), 8);
        assert_eq!(node.registry().total_holdings(), before);
        assert_eq!(node.balance(), BalanceView { balance: 97, stake: 8 });
    }

    #[test]
    fn test_scenario_d_full_pool_is_minted_in_admission_order() {
        let peers = snapshot(&[(1000, 10), (0, 10), (0, 10)]);
        let leader = genesis_leader(&peers);
        let mut node = state(leader, &peers, 5);
        let mut sender = identity(0);

        let mut admitted = Vec::new();
        for i in 0..5 {
            let tx = sender
                .create_transaction(key(1 + i % 2), TransactionKind::Exchange, 10, None)
                .unwrap();
            node.admit_transaction(tx.clone()).unwrap();
            admitted.push(tx);
            if i < 4 {
                assert_eq!(node.try_mint().unwrap(), MintOutcome::Idle);
            }
        }

        let block = match node.try_mint().unwrap() {
            MintOutcome::Minted(block) => block,
            other => panic!("expected a block, got {:?}", other),
        };
        assert_eq!(block.transactions, admitted);
        assert_eq!(block.index, 1);
        assert!(node.pool().is_empty());
        assert_eq!(node.chain().len(), 2);
        assert!(node.tentative().is_synced_with(node.registry()));
    }

    #[test]
    fn test_double_spend_rejected_on_tentative_balance() {
        let peers = snapshot(&[(100, 10), (0, 10)]);
        let mut node = state(1, &peers, 5);
        let mut sender = identity(0);

        let first = sender
            .create_transaction(key(1), TransactionKind::Exchange, 60, None)
            .unwrap();
        let second = sender
            .create_transaction(key(1), TransactionKind::Exchange, 60, None)
            .unwrap();

        node.admit_transaction(first).unwrap();
        assert!(matches!(
            node.admit_transaction(second),
            Err(LedgerError::InsufficientFunds { .. })
        ));
        // committed state only moves on finalization
        assert_eq!(node.registry().balance_of(&PeerId::indexed(0)).unwrap(), 100);
    }

    #[test]
    fn test_forged_signature_rejected() {
        let peers = snapshot(&[(100, 10), (0, 10)]);
        let mut node = state(1, &peers, 5);

        let mut tx = identity(0)
            .create_transaction(key(1), TransactionKind::Exchange, 10, None)
            .unwrap();
        tx.amount = 90;
        assert!(matches!(
            node.admit_transaction(tx),
            Err(LedgerError::InvalidSignature)
        ));
    }

    #[test]
    fn test_replay_of_finalized_and_pooled_transactions() {
        let peers = snapshot(&[(1000, 10), (0, 10)]);
        let leader = genesis_leader(&peers);
        let mut node = state(leader, &peers, 1);
        let mut sender = identity(0);
        let other = if leader == 0 { 1 } else { 0 };

        let tx = sender
            .create_transaction(key(1), TransactionKind::Exchange, 10, None)
            .unwrap();
        node.admit_transaction(tx.clone()).unwrap();
        assert!(matches!(node.try_mint().unwrap(), MintOutcome::Minted(_)));
        assert!(matches!(
            node.admit_transaction(tx),
            Err(LedgerError::DuplicateTransaction)
        ));

        let mut pooled_node = state(other, &peers, 5);
        let tx = sender
            .create_transaction(key(1), TransactionKind::Exchange, 10, None)
            .unwrap();
        pooled_node.admit_transaction(tx.clone()).unwrap();
        assert!(matches!(
            pooled_node.admit_transaction(tx),
            Err(LedgerError::DuplicateTransaction)
        ));
    }

    #[test]
    fn test_awaiting_latch_cleared_by_any_block() {
        let peers = snapshot(&[(1000, 10), (0, 10)]);
        let leader = genesis_leader(&peers);
        let follower = 1 - leader;
        let mut node = state(follower, &peers, 1);
        let mut sender = identity(0);

        let tx = sender
            .create_transaction(key(1), TransactionKind::Exchange, 10, None)
            .unwrap();
        node.admit_transaction(tx).unwrap();
        assert_eq!(
            node.try_mint().unwrap(),
            MintOutcome::Awaiting {
                elected: PeerId::indexed(leader)
            }
        );
        assert!(node.is_awaiting_block());
        assert_eq!(node.try_mint().unwrap(), MintOutcome::Idle);

        let forged = Block::new(1, Vec::new(), Hash::new([7u8; 32]), key(leader)).unwrap();
        assert!(matches!(
            node.accept_block(forged),
            Err(LedgerError::InvalidBlockLink { .. })
        ));
        assert!(!node.is_awaiting_block());
        assert_eq!(node.chain().len(), 1);
        assert_eq!(node.pool().len(), 1);
    }

    #[test]
    fn test_block_from_wrong_validator_rejected() {
        let peers = snapshot(&[(1000, 10), (0, 10)]);
        let leader = genesis_leader(&peers);
        let node = state(leader, &peers, 5);

        let impostor = key(1 - leader);
        let block = Block::new(1, Vec::new(), node.chain().tip_hash(), impostor).unwrap();
        assert!(matches!(
            node.validate_block(&block),
            Err(LedgerError::InvalidValidator { .. })
        ));

        let honest = Block::new(1, Vec::new(), node.chain().tip_hash(), key(leader)).unwrap();
        assert!(node.validate_block(&honest).is_ok());
    }

    #[test]
    fn test_received_block_applies_like_minted_one() {
        let peers = snapshot(&[(1000, 10), (0, 10), (0, 10)]);
        let mut cluster = Cluster::new(&peers, 2);

        assert!(cluster.exchange(0, 1, 100).is_none());
        let block = cluster.exchange(0, 2, 200).expect("pool full, block minted");
        assert_eq!(block.transactions.len(), 2);

        let reference = cluster.states[0].registry_snapshot();
        for state in &cluster.states {
            assert_eq!(state.registry_snapshot(), reference);
            assert_eq!(state.chain().tip_hash(), block.current_hash);
            assert!(state.pool().is_empty());
            assert!(!state.is_awaiting_block());
        }

        // fees 3 + 6 are credited to the minter
        let minter = cluster.states[0]
            .registry()
            .resolve(&block.validator)
            .unwrap();
        let minter_balance = cluster.states[0].registry().balance_of(&minter).unwrap();
        let expected_base = match minter.as_str() {
            "id0" => 1000 - 103 - 206,
            "id1" => 100,
            _ => 200,
        };
        assert_eq!(minter_balance, expected_base + 9);
        assert_eq!(cluster.states[0].registry().total_holdings(), 1030);

        let receiver = &cluster.states[1];
        assert_eq!(receiver.inbox().len(), 1);
        assert_eq!(receiver.inbox()[0].from, PeerId::indexed(0));
        assert_eq!(receiver.inbox()[0].amount, 100);
        let last = receiver.last_block();
        assert_eq!(last.index, 1);
        assert_eq!(last.validator, Some(minter));
        assert_eq!(last.transactions.len(), 2);
        assert_eq!(last.transactions[0].amount, 100);
    }

    #[test]
    fn test_chain_replacement() {
        let peers = snapshot(&[(1000, 10), (0, 10), (0, 10)]);
        let mut cluster = Cluster::new(&peers, 1);
        for i in 0..3 {
            assert!(cluster.exchange(0, 1 + i % 2, 10).is_some());
        }
        let candidate = cluster.states[0].chain().blocks().to_vec();
        assert_eq!(candidate.len(), 4);

        let mut late = state(1, &peers, 1);
        let mut sender = identity(0);
        let pending = sender
            .create_transaction(key(1), TransactionKind::Exchange, 10, None)
            .unwrap();
        assert_eq!(pending, candidate[1].transactions[0]);
        late.admit_transaction(pending).unwrap();

        late.replace_chain(candidate.clone()).unwrap();
        assert_eq!(late.chain().len(), 4);
        assert_eq!(late.chain().tip_hash(), candidate[3].current_hash);
        assert!(late.pool().is_empty());

        let mut relinked = candidate.clone();
        relinked[2].previous_hash = Hash::new([1u8; 32]);
        assert!(matches!(
            late.validate_chain(&relinked),
            Err(LedgerError::InvalidChain { index: 2, .. })
        ));

        let mut stolen = candidate.clone();
        let parent = stolen[0].current_hash;
        let wrong = (0..3)
            .map(key)
            .find(|k| *k != stolen[1].validator)
            .unwrap();
        stolen[1] = Block::new(1, stolen[1].transactions.clone(), parent, wrong).unwrap();
        assert!(matches!(
            late.replace_chain(stolen),
            Err(LedgerError::InvalidChain { index: 1, .. })
        ));
        assert_eq!(late.chain().len(), 4);

        let mut rehashed = candidate.clone();
        rehashed[3].current_hash = Hash::new([9u8; 32]);
        match late.validate_chain(&rehashed) {
            Err(LedgerError::InvalidChain { index, reason }) => {
                assert_eq!(index, 3);
                assert!(matches!(*reason, LedgerError::InvalidBlockHash { index: 3 }));
            }
            other => panic!("expected an invalid chain, got {:?}", other),
        }

        assert!(late.validate_chain(&[]).is_err());
    }

    #[test]
    fn test_same_nonce_with_new_payload_is_a_replay() {
        let peers = snapshot(&[(1000, 10), (0, 10)]);
        let leader = genesis_leader(&peers);
        let first = identity(0)
            .create_transaction(key(1), TransactionKind::Exchange, 100, None)
            .unwrap();
        let rival = identity(0)
            .create_transaction(key(1), TransactionKind::Exchange, 200, None)
            .unwrap();
        assert_eq!(first.nonce, rival.nonce);

        let mut pooled = state(leader, &peers, 2);
        pooled.admit_transaction(first.clone()).unwrap();
        assert!(matches!(
            pooled.admit_transaction(rival.clone()),
            Err(LedgerError::DuplicateTransaction)
        ));
        assert_eq!(pooled.pool().len(), 1);

        let mut follower = state(1 - leader, &peers, 2);
        let block = Block::new(
            1,
            vec![first.clone(), rival.clone()],
            follower.chain().tip_hash(),
            key(leader),
        )
        .unwrap();
        assert!(matches!(
            follower.accept_block(block),
            Err(LedgerError::DuplicateTransaction)
        ));
        assert_eq!(follower.chain().len(), 1);

        let mut minter = state(leader, &peers, 1);
        minter.admit_transaction(first.clone()).unwrap();
        assert!(matches!(minter.try_mint().unwrap(), MintOutcome::Minted(_)));
        for tx in [first, rival] {
            assert!(matches!(
                minter.admit_transaction(tx),
                Err(LedgerError::DuplicateTransaction)
            ));
        }
        assert_eq!(
            minter.registry().balance_of(&PeerId::indexed(1)).unwrap(),
            if leader == 1 { 103 } else { 100 }
        );
    }

    #[test]
    fn test_block_with_rewritten_hash_rejected() {
        let peers = snapshot(&[(1000, 10), (0, 10)]);
        let leader = genesis_leader(&peers);
        let mut node = state(1 - leader, &peers, 5);
        let tip = node.chain().tip_hash();

        let mut block = Block::new(1, Vec::new(), tip, key(leader)).unwrap();
        block.current_hash = Hash::new([0x42; 32]);
        assert!(matches!(
            node.accept_block(block),
            Err(LedgerError::InvalidBlockHash { index: 1 })
        ));
        assert_eq!(node.chain().len(), 1);
        assert_eq!(node.chain().tip_hash(), tip);
    }

    #[test]
    fn test_overdrawing_block_rejected_whole() {
        let peers = snapshot(&[(1000, 10), (0, 10), (0, 10)]);
        let leader = genesis_leader(&peers);
        let follower = (0..3).find(|i| *i != leader).unwrap();
        let mut node = state(follower, &peers, 2);

        let valid = identity(0)
            .create_transaction(key(1), TransactionKind::Exchange, 100, None)
            .unwrap();
        let overdraw = identity(2)
            .create_transaction(key(1), TransactionKind::Exchange, 50, None)
            .unwrap();
        node.admit_transaction(valid.clone()).unwrap();

        let registry = node.registry_snapshot();
        let tentative = node.tentative().clone();
        let block = Block::new(
            1,
            vec![valid, overdraw],
            node.chain().tip_hash(),
            key(leader),
        )
        .unwrap();
        assert!(matches!(
            node.accept_block(block),
            Err(LedgerError::InsufficientFunds { available: 0, .. })
        ));

        assert_eq!(node.registry_snapshot(), registry);
        assert_eq!(*node.tentative(), tentative);
        assert_eq!(node.chain().len(), 1);
        assert_eq!(node.pool().len(), 1);
    }

    #[test]
    fn test_block_with_forged_or_repeated_transaction_rejected() {
        let peers = snapshot(&[(1000, 10), (0, 10)]);
        let leader = genesis_leader(&peers);
        let mut node = state(1 - leader, &peers, 2);
        let tip = node.chain().tip_hash();

        let tx = identity(0)
            .create_transaction(key(1), TransactionKind::Exchange, 100, None)
            .unwrap();
        let mut forged = tx.clone();
        forged.amount = 900;

        let block = Block::new(1, vec![forged], tip, key(leader)).unwrap();
        assert!(matches!(
            node.accept_block(block),
            Err(LedgerError::InvalidSignature)
        ));

        let block = Block::new(1, vec![tx.clone(), tx], tip, key(leader)).unwrap();
        assert!(matches!(
            node.accept_block(block),
            Err(LedgerError::DuplicateTransaction)
        ));
        assert_eq!(node.chain().len(), 1);
        assert_eq!(node.registry().total_holdings(), 1020);
    }

    #[test]
    fn test_block_size_and_index_checked() {
        let peers = snapshot(&[(1000, 10), (0, 10)]);
        let leader = genesis_leader(&peers);
        let node = state(1 - leader, &peers, 1);
        let tip = node.chain().tip_hash();

        let mut sender = identity(0);
        let txs: Vec<_> = (0..2)
            .map(|_| {
                sender
                    .create_transaction(key(1), TransactionKind::Exchange, 10, None)
                    .unwrap()
            })
            .collect();
        let oversized = Block::new(1, txs, tip, key(leader)).unwrap();
        assert!(matches!(
            node.validate_block(&oversized),
            Err(LedgerError::BlockTooLarge {
                size: 2,
                capacity: 1
            })
        ));

        let skipped = Block::new(2, Vec::new(), tip, key(leader)).unwrap();
        assert!(matches!(
            node.validate_block(&skipped),
            Err(LedgerError::InvalidBlockIndex {
                expected: 1,
                actual: 2
            })
        ));
    }

    #[test]
    fn test_try_mint_drops_stale_transactions() {
        let peers = snapshot(&[(1000, 10), (0, 10)]);
        let leader = genesis_leader(&peers);
        let mut node = state(leader, &peers, 2);

        let valid = identity(0)
            .create_transaction(key(1), TransactionKind::Exchange, 100, None)
            .unwrap();
        let stale = identity(1)
            .create_transaction(key(0), TransactionKind::Exchange, 50, None)
            .unwrap();
        node.admit_transaction(valid.clone()).unwrap();
        node.pool.push(stale.clone());

        let block = match node.try_mint().unwrap() {
            MintOutcome::Minted(block) => block,
            other => panic!("expected a block, got {:?}", other),
        };
        assert_eq!(block.transactions, vec![valid]);
        assert!(node.pool().is_empty());
        assert_eq!(node.chain().len(), 2);

        let mut idle = state(leader, &peers, 1);
        idle.pool.push(stale);
        assert_eq!(idle.try_mint().unwrap(), MintOutcome::Idle);
        assert!(idle.pool().is_empty());
        assert_eq!(idle.chain().len(), 1);
    }

    #[test]
    fn test_last_stake_in_block_wins() {
        let peers = snapshot(&[(100, 5), (100, 5)]);
        let leader = genesis_leader(&peers);
        let mut node = state(leader, &peers, 2);
        let me = node.public_key();

        for target in [8, 3] {
            let tx = node
                .create_transaction(me, TransactionKind::Stake, target, None)
                .unwrap();
            node.admit_transaction(tx).unwrap();
        }
        let block = match node.try_mint().unwrap() {
            MintOutcome::Minted(block) => block,
            other => panic!("expected a block, got {:?}", other),
        };
        assert_eq!(block.transactions.len(), 2);

        let id = PeerId::indexed(leader);
        assert_eq!(node.registry().stake_of(&id).unwrap(), 3);
        assert_eq!(node.registry().balance_of(&id).unwrap(), 102);
        assert_eq!(node.pos.stakes().get(&id), Some(3));
        assert_eq!(node.balance(), BalanceView { balance: 102, stake: 3 });
    }

    #[test]
    fn test_chain_replacement_clears_awaiting_latch() {
        let peers = snapshot(&[(1000, 10), (0, 10)]);
        let leader = genesis_leader(&peers);
        let mut cluster = Cluster::new(&peers, 1);
        assert!(cluster.exchange(0, 1, 10).is_some());
        let candidate = cluster.states[leader].chain().blocks().to_vec();

        let mut late = state(1 - leader, &peers, 1);
        let pending = identity(0)
            .create_transaction(key(1), TransactionKind::Exchange, 10, None)
            .unwrap();
        late.admit_transaction(pending).unwrap();
        assert!(matches!(
            late.try_mint().unwrap(),
            MintOutcome::Awaiting { .. }
        ));
        assert!(late.is_awaiting_block());

        late.replace_chain(candidate).unwrap();
        assert!(!late.is_awaiting_block());
        assert!(late.pool().is_empty());
        assert_eq!(late.chain().len(), 2);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Exchange { from: usize, to: usize, amount: Amount },
        Stake { from: usize, target: Amount },
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0..3usize, 0..3usize, 0..400u64)
                .prop_map(|(from, to, amount)| Op::Exchange { from, to, amount }),
            (0..3usize, 0..60u64).prop_map(|(from, target)| Op::Stake { from, target }),
        ]
    }

    proptest! {
        #[test]
        fn prop_committed_holdings_are_conserved(ops in prop::collection::vec(op(), 1..40)) {
            let peers = snapshot(&[(600, 10), (300, 20), (100, 30)]);
            let mut cluster = Cluster::new(&peers, 2);
            let total = cluster.states[0].registry().total_holdings();

            for op in ops {
                let tx = match op {
                    Op::Exchange { from, to, amount } => cluster.wallets[from]
                        .create_transaction(key(to), TransactionKind::Exchange, amount, None),
                    Op::Stake { from, target } => cluster.wallets[from]
                        .create_transaction(key(from), TransactionKind::Stake, target, None),
                }
                .unwrap();

                for state in &mut cluster.states {
                    let _ = state.admit_transaction(tx.clone());
                }
                for i in 0..cluster.states.len() {
                    if let MintOutcome::Minted(block) = cluster.states[i].try_mint().unwrap() {
                        for (j, other) in cluster.states.iter_mut().enumerate() {
                            if j != i {
                                prop_assert!(other.accept_block(block.clone()).is_ok());
                            }
                        }
                    }
                }

                for state in &cluster.states {
                    prop_assert_eq!(state.registry().total_holdings(), total);
                }
            }
        }
    }
}
