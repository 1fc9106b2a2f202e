//! Spend planning over caller-chosen outputs.
//!
//! Selection is explicit: the caller decides which outputs are spent (by
//! default every confirmed output) and the selector only checks that they
//! cover the payment and fee. No minimal-fee search is attempted, since
//! that would change which funds are spent.

use std::collections::HashSet;

use bitcoin::{Address, OutPoint};
use satchel_core::constants::DUST_THRESHOLD;
use satchel_core::types::{FeeRate, Utxo};

use crate::error::WalletError;
use crate::fee::FeeEstimator;

/// Which tracked outputs a send consumes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SelectionPolicy {
    /// Every confirmed output.
    #[default]
    AllConfirmed,
    /// Every output, confirmed or not.
    All,
    /// Exactly these outpoints. Each must be tracked.
    Explicit(Vec<OutPoint>),
}

impl SelectionPolicy {
    /// Pick outputs from `candidates`, keeping their order.
    pub fn apply(&self, candidates: &[Utxo]) -> Result<Vec<Utxo>, WalletError> {
        match self {
            SelectionPolicy::AllConfirmed => {
                Ok(candidates.iter().filter(|u| u.confirmed).cloned().collect())
            }
            SelectionPolicy::All => Ok(candidates.to_vec()),
            SelectionPolicy::Explicit(outpoints) => {
                let mut wanted = HashSet::with_capacity(outpoints.len());
                for op in outpoints {
                    if !wanted.insert(*op) {
                        return Err(WalletError::InvalidAmount(format!(
                            "outpoint {op} selected twice"
                        )));
                    }
                    if !candidates.iter().any(|u| u.outpoint == *op) {
                        return Err(WalletError::InvalidAmount(format!(
                            "outpoint {op} is not a tracked output"
                        )));
                    }
                }
                Ok(candidates
                    .iter()
                    .filter(|u| wanted.contains(&u.outpoint))
                    .cloned()
                    .collect())
            }
        }
    }
}

/// How much to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendAmount {
    /// A fixed amount in sats; leftover goes to a change output.
    Exact(u64),
    /// Everything selected minus the fee, with no change.
    Max,
}

/// A fully priced send. Transient: built, turned into a transaction, dropped.
///
/// `total_input == amount + fee + change` always holds, and `change` is
/// either zero or above the dust threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendPlan {
    pub selected: Vec<Utxo>,
    pub recipient: Address,
    pub amount: u64,
    pub fee_rate: FeeRate,
    pub fee: u64,
    pub change: u64,
    pub total_input: u64,
}

impl SpendPlan {
    pub fn has_change(&self) -> bool {
        self.change > 0
    }

    /// Number of outputs the resulting transaction will carry.
    pub fn output_count(&self) -> usize {
        if self.has_change() { 2 } else { 1 }
    }

    pub fn outpoints(&self) -> Vec<OutPoint> {
        self.selected.iter().map(|u| u.outpoint).collect()
    }
}

/// Checks caller-selected outputs against a payment.
pub struct CoinSelector;

impl CoinSelector {
    /// Apply `policy` to `candidates` and price the send.
    pub fn plan(
        candidates: &[Utxo],
        policy: &SelectionPolicy,
        recipient: Address,
        amount: SendAmount,
        fee_rate: FeeRate,
    ) -> Result<SpendPlan, WalletError> {
        let selected = policy.apply(candidates)?;
        Self::select(selected, recipient, amount, fee_rate)
    }

    /// Price a send that spends exactly `selected`.
    ///
    /// An exact send is priced with a change output; if the change comes out
    /// at zero the transaction simply carries one output. Returns
    /// [`WalletError::InsufficientFunds`] if the inputs cannot cover the
    /// amount and fee, and [`WalletError::DustChange`] if the leftover is
    /// positive but not above the dust threshold.
    pub fn select(
        selected: Vec<Utxo>,
        recipient: Address,
        amount: SendAmount,
        fee_rate: FeeRate,
    ) -> Result<SpendPlan, WalletError> {
        if selected.is_empty() {
            return Err(WalletError::NoUtxos);
        }
        let total_input = selected
            .iter()
            .try_fold(0u64, |acc, u| acc.checked_add(u.value))
            .ok_or_else(|| WalletError::InvalidAmount("input total overflows".into()))?;
        let inputs = selected.len();

        let (amount, fee, change) = match amount {
            SendAmount::Exact(amount) => {
                if amount <= DUST_THRESHOLD {
                    return Err(WalletError::InvalidAmount(format!(
                        "amount {amount} must be above the dust threshold of {DUST_THRESHOLD}"
                    )));
                }
                let fee = FeeEstimator::fee_for(fee_rate, inputs, 2);
                let need = amount
                    .checked_add(fee)
                    .ok_or_else(|| WalletError::InvalidAmount("amount plus fee overflows".into()))?;
                if total_input < need {
                    return Err(WalletError::InsufficientFunds {
                        have: total_input,
                        need,
                    });
                }
                let change = total_input - need;
                Self::check_change(change)?;
                (amount, fee, change)
            }
            SendAmount::Max => {
                let fee = FeeEstimator::fee_for(fee_rate, inputs, 1);
                let amount = total_input.saturating_sub(fee);
                if amount <= DUST_THRESHOLD {
                    return Err(WalletError::InsufficientFundsForFee {
                        available: total_input,
                        fee,
                    });
                }
                (amount, fee, 0)
            }
        };

        Ok(SpendPlan {
            selected,
            recipient,
            amount,
            fee_rate,
            fee,
            change,
            total_input,
        })
    }

    /// Zero change is fine; positive change must clear the dust threshold.
    pub fn check_change(change: u64) -> Result<(), WalletError> {
        if change > 0 && change <= DUST_THRESHOLD {
            return Err(WalletError::DustChange {
                change,
                threshold: DUST_THRESHOLD,
            });
        }
        Ok(())
    }
}
