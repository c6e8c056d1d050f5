//! Stake-weight snapshot used for leader election

use chain_core::{Amount, PeerId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Stake per peer, ordered by peer id.
///
/// The ordering is the stable key that lays out the cumulative stake
/// intervals, so it must be identical on every node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeTable {
    stakes: BTreeMap<PeerId, Amount>,
}

impl StakeTable {
    pub fn get(&self, id: &PeerId) -> Option<Amount> {
        self.stakes.get(id).copied()
    }

    /// Sum of all stakes
    pub fn total(&self) -> u128 {
        self.stakes.values().map(|s| u128::from(*s)).sum()
    }

    /// Entries in peer id order
    pub fn iter(&self) -> impl Iterator<Item = (&PeerId, Amount)> {
        self.stakes.iter().map(|(id, stake)| (id, *stake))
    }

    pub fn len(&self) -> usize {
        self.stakes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stakes.is_empty()
    }
}

impl FromIterator<(PeerId, Amount)> for StakeTable {
    fn from_iter<I: IntoIterator<Item = (PeerId, Amount)>>(iter: I) -> Self {
        Self {
            stakes: iter.into_iter().collect(),
        }
    }
}
