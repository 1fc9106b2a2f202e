//! Decoding and editing externally supplied transactions.
//!
//! The editor never sees the values of the outputs being spent, so when it
//! rewrites amounts it treats the transaction's original total output value
//! as the input total. That is exact only if the original paid no fee; the
//! result is an approximation the caller must review. Witness data is
//! carried over unchanged and is invalid after any edit, so an edited
//! transaction has to be re-signed elsewhere.

use bitcoin::consensus::encode;
use bitcoin::{Address, Amount, Network, OutPoint, ScriptBuf, Transaction, Txid};
use satchel_core::constants::DUST_THRESHOLD;
use satchel_core::types::FeeRate;

use crate::coin_selection::CoinSelector;
use crate::error::WalletError;
use crate::fee::FeeEstimator;

/// Where an output pays, as far as it can be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputDestination {
    Address(Address),
    /// Non-standard or data-carrying script.
    Unparseable(ScriptBuf),
}

impl OutputDestination {
    pub fn address(&self) -> Option<&Address> {
        match self {
            OutputDestination::Address(a) => Some(a),
            OutputDestination::Unparseable(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedInput {
    pub previous_output: OutPoint,
    pub sequence: u32,
    pub has_witness: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedOutput {
    pub index: usize,
    pub value: u64,
    pub destination: OutputDestination,
}

/// Structured view of a raw transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedTransaction {
    pub txid: Txid,
    pub version: i32,
    pub lock_time: u32,
    pub vsize: usize,
    pub inputs: Vec<DecodedInput>,
    pub outputs: Vec<DecodedOutput>,
    pub total_output: u64,
}

impl DecodedTransaction {
    pub fn signals_rbf(&self) -> bool {
        self.inputs.iter().any(|i| i.sequence < 0xffff_fffe)
    }
}

/// Result of an edit: a transaction whose witnesses no longer match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditedTransaction {
    pub tx: Transaction,
    /// Original total output value, standing in for the input total.
    pub assumed_input_total: u64,
    pub fee: u64,
    /// New value of the last output; zero means it was dropped.
    pub change: u64,
}

impl EditedTransaction {
    pub fn to_hex(&self) -> String {
        encode::serialize_hex(&self.tx)
    }
}

/// Editor over one decoded transaction.
#[derive(Debug, Clone)]
pub struct RawTransactionEditor {
    tx: Transaction,
    network: Network,
}

impl RawTransactionEditor {
    /// Parse a hex-encoded transaction.
    pub fn decode(raw_hex: &str, network: Network) -> Result<Self, WalletError> {
        let bytes = hex::decode(raw_hex.trim())
            .map_err(|e| WalletError::InvalidTransaction(format!("bad hex: {e}")))?;
        let tx: Transaction = encode::deserialize(&bytes)
            .map_err(|e| WalletError::InvalidTransaction(e.to_string()))?;
        Ok(Self::from_transaction(tx, network))
    }

    pub fn from_transaction(tx: Transaction, network: Network) -> Self {
        Self { tx, network }
    }

    pub fn transaction(&self) -> &Transaction {
        &self.tx
    }

    /// Decode inputs and outputs. Output addresses are best effort: a script
    /// that is not a standard address becomes
    /// [`OutputDestination::Unparseable`] without affecting other outputs.
    pub fn decode_outputs(&self) -> DecodedTransaction {
        let outputs: Vec<DecodedOutput> = self
            .tx
            .output
            .iter()
            .enumerate()
            .map(|(index, out)| DecodedOutput {
                index,
                value: out.value.to_sat(),
                destination: match Address::from_script(&out.script_pubkey, self.network) {
                    Ok(address) => OutputDestination::Address(address),
                    Err(_) => OutputDestination::Unparseable(out.script_pubkey.clone()),
                },
            })
            .collect();
        DecodedTransaction {
            txid: self.tx.compute_txid(),
            version: self.tx.version.0,
            lock_time: self.tx.lock_time.to_consensus_u32(),
            vsize: self.tx.vsize(),
            inputs: self
                .tx
                .input
                .iter()
                .map(|i| DecodedInput {
                    previous_output: i.previous_output,
                    sequence: i.sequence.0,
                    has_witness: !i.witness.is_empty(),
                })
                .collect(),
            total_output: outputs
                .iter()
                .fold(0u64, |acc, o| acc.saturating_add(o.value)),
            outputs,
        }
    }

    /// Set the first output to `first_value` and recompute the last output
    /// as change at `fee_rate`.
    ///
    /// Outputs between the first and last keep their values. Fails with
    /// [`WalletError::InsufficientFundsForFee`] if the change would be
    /// negative and [`WalletError::DustChange`] if it would be positive but
    /// not above dust. Zero change drops the last output.
    pub fn edit(&self, first_value: u64, fee_rate: FeeRate) -> Result<EditedTransaction, WalletError> {
        let count = self.tx.output.len();
        if count < 2 {
            return Err(WalletError::InvalidTransaction(format!(
                "editing needs a payment and a change output, found {count} output(s)"
            )));
        }
        if first_value <= DUST_THRESHOLD {
            return Err(WalletError::InvalidAmount(format!(
                "amount {first_value} must be above the dust threshold of {DUST_THRESHOLD}"
            )));
        }

        let assumed_input_total = self
            .tx
            .output
            .iter()
            .try_fold(0u64, |acc, o| acc.checked_add(o.value.to_sat()))
            .ok_or_else(|| WalletError::InvalidTransaction("output total overflows".into()))?;
        let middle: u64 = self.tx.output[1..count - 1]
            .iter()
            .map(|o| o.value.to_sat())
            .sum();
        let fee = FeeEstimator::fee_for(fee_rate, self.tx.input.len(), count);

        let available = assumed_input_total
            .saturating_sub(first_value)
            .saturating_sub(middle);
        let spent = first_value
            .checked_add(middle)
            .and_then(|v| v.checked_add(fee));
        let change = match spent {
            Some(spent) if spent <= assumed_input_total => assumed_input_total - spent,
            _ => return Err(WalletError::InsufficientFundsForFee { available, fee }),
        };
        CoinSelector::check_change(change)?;

        let mut tx = self.tx.clone();
        tx.output[0].value = Amount::from_sat(first_value);
        if change == 0 {
            tx.output.pop();
        } else if let Some(last) = tx.output.last_mut() {
            last.value = Amount::from_sat(change);
        }
        Ok(EditedTransaction {
            tx,
            assumed_input_total,
            fee,
            change,
        })
    }
}
