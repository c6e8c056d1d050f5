//! Peer registry: committed balances and stakes

use crate::effect::Accounts;
use crate::{LedgerError, LedgerResult};
use chain_consensus::StakeTable;
use chain_core::{Amount, PeerId, PublicKey};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Finalized state of one peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRecord {
    pub id: PeerId,
    pub public_key: PublicKey,
    pub balance: Amount,
    pub stake: Amount,
}

/// Peer list the registry is formed from at cluster start
pub type ClusterSnapshot = Vec<PeerRecord>;

/// Single source of truth for finalized balances and stakes.
///
/// Keeps a reverse index from public key to peer id.
#[derive(Debug, Clone)]
pub struct PeerRegistry {
    peers: BTreeMap<PeerId, PeerRecord>,
    by_key: HashMap<PublicKey, PeerId>,
}

impl PeerRegistry {
    /// Form the registry from the cluster snapshot
    pub fn from_snapshot(snapshot: ClusterSnapshot) -> LedgerResult<Self> {
        if snapshot.is_empty() {
            return Err(LedgerError::MalformedSnapshot(
                "cluster has no peers".to_string(),
            ));
        }

        let mut peers = BTreeMap::new();
        let mut by_key = HashMap::new();
        for record in snapshot {
            if by_key.insert(record.public_key, record.id.clone()).is_some() {
                return Err(LedgerError::MalformedSnapshot(format!(
                    "public key of {} is shared with another peer",
                    record.id
                )));
            }
            let id = record.id.clone();
            if peers.insert(id.clone(), record).is_some() {
                return Err(LedgerError::MalformedSnapshot(format!(
                    "duplicate peer id {}",
                    id
                )));
            }
        }

        Ok(Self { peers, by_key })
    }

    pub fn get(&self, id: &PeerId) -> Option<&PeerRecord> {
        self.peers.get(id)
    }

    /// Peer id owning a public key
    pub fn id_of(&self, key: &PublicKey) -> Option<&PeerId> {
        self.by_key.get(key)
    }

    /// Like [`PeerRegistry::id_of`], failing with `UnknownPeer`
    pub fn resolve(&self, key: &PublicKey) -> LedgerResult<PeerId> {
        self.id_of(key)
            .cloned()
            .ok_or(LedgerError::UnknownPeer(*key))
    }

    pub fn public_key(&self, id: &PeerId) -> Option<PublicKey> {
        self.peers.get(id).map(|record| record.public_key)
    }

    /// Current stake weights for leader election
    pub fn stake_table(&self) -> StakeTable {
        self.peers
            .values()
            .map(|record| (record.id.clone(), record.stake))
            .collect()
    }

    /// Sum of balances and stakes over all peers
    pub fn total_holdings(&self) -> u128 {
        self.peers
            .values()
            .map(|record| u128::from(record.balance) + u128::from(record.stake))
            .sum()
    }

    /// Records in peer id order
    pub fn iter(&self) -> impl Iterator<Item = &PeerRecord> {
        self.peers.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &PeerId> {
        self.peers.keys()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    fn record_mut(&mut self, id: &PeerId) -> LedgerResult<&mut PeerRecord> {
        self.peers
            .get_mut(id)
            .ok_or_else(|| LedgerError::UnknownPeerId(id.clone()))
    }
}

impl Accounts for PeerRegistry {
    fn balance_of(&self, id: &PeerId) -> LedgerResult<Amount> {
        self.get(id)
            .map(|record| record.balance)
            .ok_or_else(|| LedgerError::UnknownPeerId(id.clone()))
    }

    fn stake_of(&self, id: &PeerId) -> LedgerResult<Amount> {
        self.get(id)
            .map(|record| record.stake)
            .ok_or_else(|| LedgerError::UnknownPeerId(id.clone()))
    }

    fn set_balance(&mut self, id: &PeerId, balance: Amount) -> LedgerResult<()> {
        self.record_mut(id)?.balance = balance;
        Ok(())
    }

    fn set_stake(&mut self, id: &PeerId, stake: Amount) -> LedgerResult<()> {
        self.record_mut(id)?.stake = stake;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(i: usize, balance: Amount, stake: Amount) -> PeerRecord {
        PeerRecord {
            id: PeerId::indexed(i),
            public_key: PublicKey::new([i as u8 + 1; 32]),
            balance,
            stake,
        }
    }

    #[test]
    fn test_reverse_index() {
        let registry =
            PeerRegistry::from_snapshot(vec![record(0, 100, 1), record(1, 50, 2)]).unwrap();

        let key = PublicKey::new([2u8; 32]);
        assert_eq!(registry.id_of(&key), Some(&PeerId::indexed(1)));
        assert_eq!(registry.public_key(&PeerId::indexed(1)), Some(key));
        assert!(matches!(
            registry.resolve(&PublicKey::new([9u8; 32])),
            Err(LedgerError::UnknownPeer(_))
        ));
    }

    #[test]
    fn test_stake_table_and_holdings() {
        let registry =
            PeerRegistry::from_snapshot(vec![record(1, 50, 20), record(0, 100, 10)]).unwrap();

        let table = registry.stake_table();
        assert_eq!(table.get(&PeerId::indexed(0)), Some(10));
        assert_eq!(table.total(), 30);
        assert_eq!(registry.total_holdings(), 180);

        let ids: Vec<_> = registry.ids().map(|id| id.to_string()).collect();
        assert_eq!(ids, vec!["id0", "id1"]);
    }

    #[test]
    fn test_malformed_snapshots() {
        assert!(PeerRegistry::from_snapshot(vec![]).is_err());

        let mut twin = record(1, 0, 0);
        twin.public_key = record(0, 0, 0).public_key;
        assert!(matches!(
            PeerRegistry::from_snapshot(vec![record(0, 0, 0), twin]),
            Err(LedgerError::MalformedSnapshot(_))
        ));

        let mut clash = record(1, 0, 0);
        clash.id = PeerId::indexed(0);
        assert!(PeerRegistry::from_snapshot(vec![record(0, 0, 0), clash]).is_err());
    }

    #[test]
    fn test_accounts_access() {
        let mut registry = PeerRegistry::from_snapshot(vec![record(0, 100, 10)]).unwrap();
        let id = PeerId::indexed(0);

        registry.set_stake(&id, 25).unwrap();
        registry.credit(&id, 5).unwrap();

        assert_eq!(registry.stake_of(&id).unwrap(), 25);
        assert_eq!(registry.balance_of(&id).unwrap(), 105);
        assert!(registry.set_balance(&PeerId::indexed(7), 1).is_err());
    }
}
