//! Balance effects of transactions

use crate::registry::PeerRegistry;
use crate::{LedgerError, LedgerResult};
use chain_core::{Amount, PeerId, Transaction, TransactionKind};

/// Read/write access to per-peer balance and stake.
///
/// Implemented by the committed registry and the tentative ledger so both
/// apply identical arithmetic.
pub trait Accounts {
    fn balance_of(&self, id: &PeerId) -> LedgerResult<Amount>;

    fn stake_of(&self, id: &PeerId) -> LedgerResult<Amount>;

    fn set_balance(&mut self, id: &PeerId, balance: Amount) -> LedgerResult<()>;

    fn set_stake(&mut self, id: &PeerId, stake: Amount) -> LedgerResult<()>;

    /// Add to a balance (fee income)
    fn credit(&mut self, id: &PeerId, amount: Amount) -> LedgerResult<()> {
        let balance = self.balance_of(id)?;
        let credited = add(id, balance, amount)?;
        self.set_balance(id, credited)
    }
}

/// Transaction resolved against the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Exchange or initialization: the sender pays `amount + fee`, the
    /// receiver gets `amount`
    Transfer {
        sender: PeerId,
        receiver: PeerId,
        amount: Amount,
        fee: Amount,
    },
    /// Stake transition: the sender's stake becomes `target`, funded from or
    /// refunded to its balance
    Restake {
        sender: PeerId,
        target: Amount,
        fee: Amount,
    },
}

impl Effect {
    /// Map the transaction's keys to peer ids
    pub fn resolve(tx: &Transaction, registry: &PeerRegistry) -> LedgerResult<Self> {
        let sender = registry.resolve(&tx.sender)?;
        match tx.kind {
            TransactionKind::Exchange | TransactionKind::Initialization => Ok(Effect::Transfer {
                sender,
                receiver: registry.resolve(&tx.receiver)?,
                amount: tx.amount,
                fee: tx.fee,
            }),
            TransactionKind::Stake => Ok(Effect::Restake {
                sender,
                target: tx.amount,
                fee: tx.fee,
            }),
        }
    }

    pub fn sender(&self) -> &PeerId {
        match self {
            Effect::Transfer { sender, .. } | Effect::Restake { sender, .. } => sender,
        }
    }

    /// Balance the sender must hold for the effect to apply.
    ///
    /// Transfers need `amount + fee`. A stake increase needs the increase
    /// plus the fee; lowering the stake only needs the fee.
    pub fn required_funds<A: Accounts>(&self, accounts: &A) -> LedgerResult<Amount> {
        match self {
            Effect::Transfer {
                sender,
                amount,
                fee,
                ..
            } => add(sender, *amount, *fee),
            Effect::Restake {
                sender,
                target,
                fee,
            } => {
                let current = accounts.stake_of(sender)?;
                add(sender, target.saturating_sub(current), *fee)
            }
        }
    }

    /// Whether the sender's balance covers the effect
    pub fn check_covered<A: Accounts>(&self, accounts: &A) -> LedgerResult<()> {
        let sender = self.sender();
        let available = accounts.balance_of(sender)?;
        let required = self.required_funds(accounts)?;
        if available < required {
            return Err(LedgerError::InsufficientFunds {
                peer: sender.clone(),
                available,
                required,
            });
        }
        Ok(())
    }

    /// Apply the effect. Nothing is written when it fails.
    pub fn apply_to<A: Accounts>(&self, accounts: &mut A) -> LedgerResult<()> {
        match self {
            Effect::Transfer {
                sender,
                receiver,
                amount,
                fee,
            } => {
                let cost = add(sender, *amount, *fee)?;
                let debited = sub(sender, accounts.balance_of(sender)?, cost)?;
                if sender == receiver {
                    let credited = add(sender, debited, *amount)?;
                    accounts.set_balance(sender, credited)
                } else {
                    let credited = add(receiver, accounts.balance_of(receiver)?, *amount)?;
                    accounts.set_balance(sender, debited)?;
                    accounts.set_balance(receiver, credited)
                }
            }
            Effect::Restake {
                sender,
                target,
                fee,
            } => {
                let balance = accounts.balance_of(sender)?;
                let previous = accounts.stake_of(sender)?;
                let balance = if *target >= previous {
                    sub(sender, balance, add(sender, *target - previous, *fee)?)?
                } else {
                    sub(sender, add(sender, balance, previous - *target)?, *fee)?
                };
                accounts.set_balance(sender, balance)?;
                accounts.set_stake(sender, *target)
            }
        }
    }
}

fn add(id: &PeerId, a: Amount, b: Amount) -> LedgerResult<Amount> {
    a.checked_add(b)
        .ok_or_else(|| LedgerError::BalanceOverflow(id.clone()))
}

fn sub(id: &PeerId, available: Amount, required: Amount) -> LedgerResult<Amount> {
    available
        .checked_sub(required)
        .ok_or_else(|| LedgerError::InsufficientFunds {
            peer: id.clone(),
            available,
            required,
        })
}
