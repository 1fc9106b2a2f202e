//! Virtual size and fee estimation for witness-pubkey-hash transactions.

use std::fmt;
use std::str::FromStr;

use satchel_core::constants::{P2WPKH_INPUT_VBYTES, P2WPKH_OUTPUT_VBYTES, TX_OVERHEAD_VBYTES};
use satchel_core::types::{FeePresets, FeeRate};

use crate::error::WalletError;

/// Linear size model. Agnostic to where the fee rate comes from.
pub struct FeeEstimator;

impl FeeEstimator {
    /// Estimated virtual size in vbytes.
    ///
    /// The per-input weight assumes the largest DER signature, so the
    /// estimate is never below the signed size.
    pub fn estimate_virtual_size(inputs: usize, outputs: usize) -> u64 {
        (inputs as u64)
            .saturating_mul(P2WPKH_INPUT_VBYTES)
            .saturating_add((outputs as u64).saturating_mul(P2WPKH_OUTPUT_VBYTES))
            .saturating_add(TX_OVERHEAD_VBYTES)
    }

    /// `ceil(rate * vbytes)`.
    pub fn estimate_fee(rate: FeeRate, vbytes: u64) -> u64 {
        rate.fee_for_vbytes(vbytes)
    }

    /// Fee for a transaction with the given shape.
    pub fn fee_for(rate: FeeRate, inputs: usize, outputs: usize) -> u64 {
        Self::estimate_fee(rate, Self::estimate_virtual_size(inputs, outputs))
    }
}

/// One of the three externally supplied fee-rate presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeePreset {
    Economy,
    Medium,
    Fast,
}

impl FeePreset {
    pub fn resolve(self, presets: &FeePresets) -> FeeRate {
        match self {
            FeePreset::Economy => presets.economy,
            FeePreset::Medium => presets.medium,
            FeePreset::Fast => presets.fast,
        }
    }
}

impl fmt::Display for FeePreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FeePreset::Economy => "economy",
            FeePreset::Medium => "medium",
            FeePreset::Fast => "fast",
        };
        f.write_str(name)
    }
}

impl FromStr for FeePreset {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "economy" | "slow" => Ok(FeePreset::Economy),
            "medium" | "normal" => Ok(FeePreset::Medium),
            "fast" => Ok(FeePreset::Fast),
            other => Err(WalletError::InvalidConfig(format!(
                "unknown fee preset '{other}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vsize_linear_model() {
        assert_eq!(FeeEstimator::estimate_virtual_size(1, 1), 110);
        assert_eq!(FeeEstimator::estimate_virtual_size(1, 2), 141);
        assert_eq!(FeeEstimator::estimate_virtual_size(2, 2), 209);
        assert_eq!(FeeEstimator::estimate_virtual_size(0, 0), 11);
    }

    #[test]
    fn fee_is_ceiling() {
        let rate = FeeRate::from_sat_per_kvb(9_569);
        // 9.569 * 209 = 1999.921
        assert_eq!(FeeEstimator::estimate_fee(rate, 209), 2_000);
        assert_eq!(FeeEstimator::fee_for(rate, 2, 2), 2_000);
        assert_eq!(FeeEstimator::fee_for(FeeRate::from_sat_per_vb(1), 1, 2), 141);
    }

    #[test]
    fn preset_resolution() {
        let presets = FeePresets {
            economy: FeeRate::from_sat_per_vb(1),
            medium: FeeRate::from_sat_per_vb(4),
            fast: FeeRate::from_sat_per_vb(9),
        };
        assert_eq!(FeePreset::Economy.resolve(&presets), presets.economy);
        assert_eq!(FeePreset::Medium.resolve(&presets), presets.medium);
        assert_eq!(FeePreset::Fast.resolve(&presets), presets.fast);
    }

    #[test]
    fn preset_parse_and_display() {
        assert_eq!("FAST".parse::<FeePreset>().unwrap(), FeePreset::Fast);
        assert_eq!("economy".parse::<FeePreset>().unwrap(), FeePreset::Economy);
        assert_eq!(FeePreset::Medium.to_string(), "medium");
        assert!("turbo".parse::<FeePreset>().is_err());
    }
}
