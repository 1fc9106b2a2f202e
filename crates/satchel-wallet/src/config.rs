//! Wallet configuration.

use bitcoin::Network;
use satchel_core::constants::{DEFAULT_GAP_LIMIT, DEFAULT_LOOKAHEAD};
use serde::{Deserialize, Serialize};

use crate::error::WalletError;

/// Tunables for one wallet session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    /// Network addresses are encoded for.
    pub network: Network,
    /// Account index (hardened level of the derivation path).
    pub account: u32,
    /// Chain index: 0 external, 1 internal.
    pub chain: u32,
    /// Consecutive unused addresses that end a discovery scan.
    pub gap_limit: u32,
    /// Unused receive addresses kept derived past the gap. At least 1.
    pub lookahead: u32,
    /// Activity lookups issued concurrently during discovery. 1 is sequential.
    pub discovery_window: u32,
    /// Whether the default selection includes unconfirmed outputs.
    pub select_unconfirmed: bool,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            network: Network::Testnet,
            account: 0,
            chain: 0,
            gap_limit: DEFAULT_GAP_LIMIT,
            lookahead: DEFAULT_LOOKAHEAD,
            discovery_window: 1,
            select_unconfirmed: false,
        }
    }
}

impl WalletConfig {
    /// Default configuration on `network`.
    pub fn for_network(network: Network) -> Self {
        Self {
            network,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), WalletError> {
        if self.gap_limit == 0 {
            return Err(WalletError::InvalidConfig("gap_limit must be at least 1".into()));
        }
        if self.lookahead == 0 {
            return Err(WalletError::InvalidConfig("lookahead must be at least 1".into()));
        }
        if self.discovery_window == 0 {
            return Err(WalletError::InvalidConfig(
                "discovery_window must be at least 1".into(),
            ));
        }
        if self.chain > 1 {
            return Err(WalletError::InvalidConfig(format!(
                "chain must be 0 or 1, got {}",
                self.chain
            )));
        }
        Ok(())
    }
}
