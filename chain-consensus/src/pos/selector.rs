//! Stake-weighted validator selection

use crate::pos::StakeTable;
use crate::{ConsensusError, ConsensusResult};
use chain_core::{Hash, PeerId};
use tracing::debug;

/// Deterministic stake-weighted leader election.
///
/// The elected validator for a chain tip depends only on the stake table and
/// the tip hash: the first eight bytes of the hash, read as a big-endian
/// integer and reduced modulo the total stake, land in exactly one peer's
/// cumulative stake interval. Peers with zero stake own an empty interval and
/// never win.
#[derive(Debug, Clone, Default)]
pub struct ProofOfStake {
    stakes: StakeTable,
}

impl ProofOfStake {
    /// Create a selector over an initial stake snapshot
    pub fn new(stakes: StakeTable) -> Self {
        Self { stakes }
    }

    /// Replace the whole weight table
    pub fn set_stakes(&mut self, stakes: StakeTable) {
        self.stakes = stakes;
    }

    /// Current weight table
    pub fn stakes(&self) -> &StakeTable {
        &self.stakes
    }

    /// Position inside the cumulative stake range selected by `prev_hash`
    pub fn ticket(&self, prev_hash: &Hash) -> ConsensusResult<u128> {
        let total = self.stakes.total();
        if total == 0 {
            return Err(ConsensusError::NoEligibleValidator);
        }
        Ok(u128::from(prev_hash.prefix_u64()) % total)
    }

    /// Elected validator for the block following `prev_hash`
    pub fn validator(&self, prev_hash: &Hash) -> ConsensusResult<PeerId> {
        let ticket = self.ticket(prev_hash)?;

        let mut cursor = ticket;
        for (id, stake) in self.stakes.iter() {
            let stake = u128::from(stake);
            if cursor < stake {
                debug!("Ticket {} elects {} for parent {}", ticket, id, prev_hash);
                return Ok(id.clone());
            }
            cursor -= stake;
        }

        // ticket < total, so the loop always returns
        Err(ConsensusError::StakeTable(format!(
            "ticket {} outside stake range",
            ticket
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn hash_with_prefix(prefix: u64) -> Hash {
        let mut bytes = [0xabu8; 32];
        bytes[..8].copy_from_slice(&prefix.to_be_bytes());
        Hash::new(bytes)
    }

    fn three_peers() -> ProofOfStake {
        ProofOfStake::new(
            vec![
                (PeerId::indexed(0), 10),
                (PeerId::indexed(1), 20),
                (PeerId::indexed(2), 30),
            ]
            .into_iter()
            .collect(),
        )
    }

    #[test]
    fn test_cumulative_intervals() {
        let pos = three_peers();

        // id0 owns [0, 10), id1 owns [10, 30), id2 owns [30, 60)
        assert_eq!(pos.validator(&hash_with_prefix(0)).unwrap().as_str(), "id0");
        assert_eq!(pos.validator(&hash_with_prefix(9)).unwrap().as_str(), "id0");
        assert_eq!(pos.validator(&hash_with_prefix(10)).unwrap().as_str(), "id1");
        assert_eq!(pos.validator(&hash_with_prefix(29)).unwrap().as_str(), "id1");
        assert_eq!(pos.validator(&hash_with_prefix(30)).unwrap().as_str(), "id2");
        assert_eq!(pos.validator(&hash_with_prefix(59)).unwrap().as_str(), "id2");
        // wraps modulo the total stake
        assert_eq!(pos.validator(&hash_with_prefix(75)).unwrap().as_str(), "id1");
    }

    #[test]
    fn test_independent_instances_agree_on_genesis() {
        let genesis = chain_core::Block::genesis().unwrap();
        let elected: Vec<_> = (0..3)
            .map(|_| three_peers().validator(&genesis.current_hash).unwrap())
            .collect();

        assert_eq!(elected[0], elected[1]);
        assert_eq!(elected[1], elected[2]);
    }

    #[test]
    fn test_zero_stake_never_wins() {
        let pos = ProofOfStake::new(
            vec![
                (PeerId::indexed(0), 0),
                (PeerId::indexed(1), 5),
                (PeerId::indexed(2), 0),
            ]
            .into_iter()
            .collect(),
        );

        for prefix in 0..50 {
            assert_eq!(
                pos.validator(&hash_with_prefix(prefix)).unwrap().as_str(),
                "id1"
            );
        }
    }

    #[test]
    fn test_no_stake_elects_nobody() {
        let pos = ProofOfStake::new(vec![(PeerId::indexed(0), 0)].into_iter().collect());
        assert_eq!(
            pos.validator(&Hash::zero()),
            Err(ConsensusError::NoEligibleValidator)
        );
        assert_eq!(
            ProofOfStake::default().validator(&Hash::zero()),
            Err(ConsensusError::NoEligibleValidator)
        );
    }

    #[test]
    fn test_set_stakes_changes_election() {
        let mut pos = three_peers();
        pos.set_stakes(vec![(PeerId::indexed(2), 1)].into_iter().collect());
        assert_eq!(pos.validator(&hash_with_prefix(0)).unwrap().as_str(), "id2");
        assert_eq!(pos.stakes().len(), 1);
    }

    proptest! {
        #[test]
        fn prop_election_is_deterministic(
            stakes in proptest::collection::vec(0u64..1_000, 1..8usize),
            prefix in any::<u64>(),
        ) {
            let table: StakeTable = stakes
                .iter()
                .enumerate()
                .map(|(i, s)| (PeerId::indexed(i), *s))
                .collect();
            let first = ProofOfStake::new(table.clone());
            let second = ProofOfStake::new(table.clone());
            let hash = hash_with_prefix(prefix);

            let elected = first.validator(&hash);
            prop_assert_eq!(elected.clone(), first.validator(&hash));
            prop_assert_eq!(elected.clone(), second.validator(&hash));

            if let Ok(id) = elected {
                prop_assert!(table.get(&id).unwrap_or(0) > 0);
            } else {
                prop_assert_eq!(table.total(), 0);
            }
        }
    }
}
