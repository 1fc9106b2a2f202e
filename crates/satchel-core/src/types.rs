//! Core wallet types: tracked outputs, address activity, fee rates.
//!
//! All monetary values are in satoshis and carried as `u64`.

use std::fmt;
use std::str::FromStr;

use bitcoin::{Address, OutPoint};
use serde::{Deserialize, Serialize};

/// A spendable output as reported by the chain source, before the wallet
/// attaches the owning address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteUtxo {
    /// The outpoint identifying this output.
    pub outpoint: OutPoint,
    /// Value in satoshis.
    pub value: u64,
    /// Whether the creating transaction is mined.
    pub confirmed: bool,
    /// Height of the confirming block, if any.
    pub block_height: Option<u32>,
}

/// A spendable output owned by one of the wallet's addresses.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Utxo {
    /// The outpoint identifying this output.
    pub outpoint: OutPoint,
    /// Value in satoshis.
    pub value: u64,
    /// The wallet address the output pays to.
    pub address: Address,
    /// Whether the creating transaction is mined.
    pub confirmed: bool,
    /// Height of the confirming block, if any.
    pub block_height: Option<u32>,
}

impl Utxo {
    /// Attach an owning address to a remote output.
    pub fn from_remote(remote: RemoteUtxo, address: Address) -> Self {
        Self {
            outpoint: remote.outpoint,
            value: remote.value,
            address,
            confirmed: remote.confirmed,
            block_height: remote.block_height,
        }
    }
}

/// On-chain and mempool activity counters for one address.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressStats {
    /// Confirmed transactions touching the address.
    pub tx_count: u64,
    /// Unconfirmed transactions touching the address.
    pub mempool_tx_count: u64,
    /// Outputs ever funded to the address (confirmed and unconfirmed).
    pub funded_txo_count: u64,
    /// Total value ever received, in satoshis.
    pub funded_sum: u64,
    /// Total value ever spent, in satoshis.
    pub spent_sum: u64,
}

impl AddressStats {
    /// Whether the address has ever received funds or sent a transaction.
    pub fn has_activity(&self) -> bool {
        self.tx_count > 0 || self.mempool_tx_count > 0 || self.funded_txo_count > 0
    }
}

/// Fee rate in satoshis per 1000 virtual bytes.
///
/// Integer representation keeps `ceil(rate * vbytes)` exact for
/// fractional sat/vB rates such as `1.5`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct FeeRate(u64);

impl FeeRate {
    pub const ZERO: Self = Self(0);

    /// Create a fee rate from satoshis per 1000 vbytes.
    pub const fn from_sat_per_kvb(sat_per_kvb: u64) -> Self {
        Self(sat_per_kvb)
    }

    /// Create a fee rate from whole satoshis per vbyte.
    pub const fn from_sat_per_vb(sat_per_vb: u64) -> Self {
        Self(sat_per_vb.saturating_mul(1000))
    }

    /// Convert a decimal sat/vB rate (as served by explorer fee endpoints),
    /// rounding up to the next milli-satoshi.
    pub fn from_sat_per_vb_f64(sat_per_vb: f64) -> Option<Self> {
        if !sat_per_vb.is_finite() || sat_per_vb < 0.0 {
            return None;
        }
        let scaled = (sat_per_vb * 1000.0).ceil();
        if scaled > u64::MAX as f64 {
            return None;
        }
        Some(Self(scaled as u64))
    }

    /// The rate in satoshis per 1000 vbytes.
    pub const fn sat_per_kvb(&self) -> u64 {
        self.0
    }

    /// `ceil(rate * vbytes)` in satoshis.
    pub fn fee_for_vbytes(&self, vbytes: u64) -> u64 {
        let product = self.0 as u128 * vbytes as u128;
        let fee = product.div_ceil(1000);
        u64::try_from(fee).unwrap_or(u64::MAX)
    }
}

impl fmt::Display for FeeRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / 1000;
        let frac = self.0 % 1000;
        if frac == 0 {
            write!(f, "{whole} sat/vB")
        } else {
            let digits = format!("{frac:03}");
            write!(f, "{whole}.{} sat/vB", digits.trim_end_matches('0'))
        }
    }
}

/// Error parsing a decimal sat/vB fee rate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid fee rate: {0}")]
pub struct ParseFeeRateError(String);

impl FromStr for FeeRate {
    type Err = ParseFeeRateError;

    /// Parse a decimal sat/vB string with at most three fractional digits.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(ParseFeeRateError(s.to_string()));
        }
        let digits = |part: &str| part.chars().all(|c| c.is_ascii_digit());
        if frac.len() > 3 || !digits(whole) || !digits(frac) {
            return Err(ParseFeeRateError(s.to_string()));
        }
        let whole: u64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| ParseFeeRateError(s.to_string()))?
        };
        let mut milli: u64 = 0;
        for (i, c) in frac.chars().enumerate() {
            let digit = u64::from(c as u8 - b'0');
            milli += digit * 10u64.pow(2 - i as u32);
        }
        whole
            .checked_mul(1000)
            .and_then(|w| w.checked_add(milli))
            .map(Self)
            .ok_or_else(|| ParseFeeRateError(s.to_string()))
    }
}

/// Externally supplied fee-rate presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeePresets {
    pub economy: FeeRate,
    pub medium: FeeRate,
    pub fast: FeeRate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fee_rounds_up() {
        let rate = FeeRate::from_sat_per_kvb(1_500);
        // 1.5 * 141 = 211.5
        assert_eq!(rate.fee_for_vbytes(141), 212);
    }

    #[test]
    fn fee_exact_when_whole() {
        let rate = FeeRate::from_sat_per_vb(10);
        assert_eq!(rate.fee_for_vbytes(209), 2_090);
    }

    #[test]
    fn zero_rate_zero_fee() {
        assert_eq!(FeeRate::ZERO.fee_for_vbytes(1_000), 0);
    }

    #[test]
    fn from_f64_rounds_up_to_milli() {
        assert_eq!(
            FeeRate::from_sat_per_vb_f64(1.0001),
            Some(FeeRate::from_sat_per_kvb(1_001))
        );
        assert_eq!(
            FeeRate::from_sat_per_vb_f64(12.0),
            Some(FeeRate::from_sat_per_vb(12))
        );
        assert_eq!(FeeRate::from_sat_per_vb_f64(-1.0), None);
        assert_eq!(FeeRate::from_sat_per_vb_f64(f64::NAN), None);
    }

    #[test]
    fn parse_decimal() {
        assert_eq!("2.5".parse::<FeeRate>().unwrap(), FeeRate::from_sat_per_kvb(2_500));
        assert_eq!("7".parse::<FeeRate>().unwrap(), FeeRate::from_sat_per_vb(7));
        assert_eq!(".25".parse::<FeeRate>().unwrap(), FeeRate::from_sat_per_kvb(250));
        assert_eq!("1.005".parse::<FeeRate>().unwrap(), FeeRate::from_sat_per_kvb(1_005));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("".parse::<FeeRate>().is_err());
        assert!("abc".parse::<FeeRate>().is_err());
        assert!("1.0001".parse::<FeeRate>().is_err());
        assert!("1.x".parse::<FeeRate>().is_err());
        assert!("-3".parse::<FeeRate>().is_err());
        assert!("+5".parse::<FeeRate>().is_err());
        assert!("+1.5".parse::<FeeRate>().is_err());
        assert!("1 2".parse::<FeeRate>().is_err());
    }

    #[test]
    fn display_trims_fraction() {
        assert_eq!(FeeRate::from_sat_per_kvb(2_500).to_string(), "2.5 sat/vB");
        assert_eq!(FeeRate::from_sat_per_vb(3).to_string(), "3 sat/vB");
        assert_eq!(FeeRate::from_sat_per_kvb(1_005).to_string(), "1.005 sat/vB");
    }

    #[test]
    fn stats_activity() {
        assert!(!AddressStats::default().has_activity());
        let mempool_only = AddressStats {
            mempool_tx_count: 1,
            ..AddressStats::default()
        };
        assert!(mempool_only.has_activity());
    }

    #[test]
    fn fee_rate_serde_roundtrip() {
        let rate = FeeRate::from_sat_per_kvb(4_200);
        let json = serde_json::to_string(&rate).unwrap();
        let back: FeeRate = serde_json::from_str(&json).unwrap();
        assert_eq!(rate, back);
    }
}
