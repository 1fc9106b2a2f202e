//! Response bodies of the explorer REST endpoints.

use std::collections::HashMap;

use bitcoin::{OutPoint, Txid};
use satchel_core::constants::{ECONOMY_TARGET_BLOCKS, FAST_TARGET_BLOCKS, MEDIUM_TARGET_BLOCKS};
use satchel_core::types::{AddressStats, FeePresets, FeeRate, RemoteUtxo};
use serde::{Deserialize, Serialize};

/// Funding and spending counters for one side (chain or mempool).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TxoStats {
    pub funded_txo_count: u64,
    pub funded_txo_sum: u64,
    pub spent_txo_count: u64,
    pub spent_txo_sum: u64,
    pub tx_count: u64,
}

/// `GET /address/:address`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressInfo {
    pub address: String,
    #[serde(default)]
    pub chain_stats: TxoStats,
    #[serde(default)]
    pub mempool_stats: TxoStats,
}

impl From<AddressInfo> for AddressStats {
    fn from(info: AddressInfo) -> Self {
        let (chain, mempool) = (info.chain_stats, info.mempool_stats);
        AddressStats {
            tx_count: chain.tx_count,
            mempool_tx_count: mempool.tx_count,
            funded_txo_count: chain.funded_txo_count.saturating_add(mempool.funded_txo_count),
            funded_sum: chain.funded_txo_sum.saturating_add(mempool.funded_txo_sum),
            spent_sum: chain.spent_txo_sum.saturating_add(mempool.spent_txo_sum),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxStatus {
    pub confirmed: bool,
    #[serde(default)]
    pub block_height: Option<u32>,
    #[serde(default)]
    pub block_hash: Option<String>,
    #[serde(default)]
    pub block_time: Option<u64>,
}

/// One element of `GET /address/:address/utxo`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoEntry {
    pub txid: Txid,
    pub vout: u32,
    pub value: u64,
    #[serde(default)]
    pub status: TxStatus,
}

impl From<UtxoEntry> for RemoteUtxo {
    fn from(entry: UtxoEntry) -> Self {
        RemoteUtxo {
            outpoint: OutPoint::new(entry.txid, entry.vout),
            value: entry.value,
            confirmed: entry.status.confirmed,
            block_height: entry.status.block_height,
        }
    }
}

/// `GET /fee-estimates`: confirmation target in blocks -> sat/vB.
pub type FeeEstimates = HashMap<String, f64>;

/// Pick the economy, medium and fast presets from an estimate table.
///
/// A missing target falls back to the closest slower target, then to the
/// lowest rate on offer. Returns `None` for an empty or unusable table.
pub fn presets_from_estimates(estimates: &FeeEstimates) -> Option<FeePresets> {
    let mut table: Vec<(u16, FeeRate)> = estimates
        .iter()
        .filter_map(|(target, rate)| {
            Some((target.parse().ok()?, FeeRate::from_sat_per_vb_f64(*rate)?))
        })
        .collect();
    if table.is_empty() {
        return None;
    }
    table.sort();

    let pick = |target: u16| -> FeeRate {
        table
            .iter()
            .find(|(t, _)| *t >= target)
            .map(|(_, rate)| *rate)
            .or_else(|| table.iter().map(|(_, rate)| *rate).min())
            .unwrap_or(FeeRate::ZERO)
    };
    Some(FeePresets {
        economy: pick(ECONOMY_TARGET_BLOCKS),
        medium: pick(MEDIUM_TARGET_BLOCKS),
        fast: pick(FAST_TARGET_BLOCKS),
    })
}
