//! Tentative balances: committed state plus pool-resident transactions

use crate::effect::Accounts;
use crate::registry::PeerRegistry;
use crate::{LedgerError, LedgerResult};
use chain_core::{Amount, PeerId};
use std::collections::BTreeMap;

/// Shadow of the registry used for admission checks.
///
/// Equal to the committed balances right after [`TentativeLedger::resync`];
/// in between it diverges only by the effect of admitted, unconfirmed
/// transactions. Stakes are shadowed as well so stake transitions can be
/// checked against the pending stake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TentativeLedger {
    balances: BTreeMap<PeerId, Amount>,
    stakes: BTreeMap<PeerId, Amount>,
}

impl TentativeLedger {
    pub fn from_registry(registry: &PeerRegistry) -> Self {
        let mut ledger = Self {
            balances: BTreeMap::new(),
            stakes: BTreeMap::new(),
        };
        ledger.resync(registry);
        ledger
    }

    /// Discard every tentative change and copy the committed state
    pub fn resync(&mut self, registry: &PeerRegistry) {
        self.balances = registry
            .iter()
            .map(|record| (record.id.clone(), record.balance))
            .collect();
        self.stakes = registry
            .iter()
            .map(|record| (record.id.clone(), record.stake))
            .collect();
    }

    pub fn balance(&self, id: &PeerId) -> Option<Amount> {
        self.balances.get(id).copied()
    }

    pub fn stake(&self, id: &PeerId) -> Option<Amount> {
        self.stakes.get(id).copied()
    }

    /// Whether this ledger matches the registry exactly
    pub fn is_synced_with(&self, registry: &PeerRegistry) -> bool {
        *self == Self::from_registry(registry)
    }
}

impl Accounts for TentativeLedger {
    fn balance_of(&self, id: &PeerId) -> LedgerResult<Amount> {
        self.balance(id)
            .ok_or_else(|| LedgerError::UnknownPeerId(id.clone()))
    }

    fn stake_of(&self, id: &PeerId) -> LedgerResult<Amount> {
        self.stake(id)
            .ok_or_else(|| LedgerError::UnknownPeerId(id.clone()))
    }

    fn set_balance(&mut self, id: &PeerId, balance: Amount) -> LedgerResult<()> {
        match self.balances.get_mut(id) {
            Some(slot) => {
                *slot = balance;
                Ok(())
            }
            None => Err(LedgerError::UnknownPeerId(id.clone())),
        }
    }

    fn set_stake(&mut self, id: &PeerId, stake: Amount) -> LedgerResult<()> {
        match self.stakes.get_mut(id) {
            Some(slot) => {
                *slot = stake;
                Ok(())
            }
            None => Err(LedgerError::UnknownPeerId(id.clone())),
        }
    }
}
