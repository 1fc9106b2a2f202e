//! Trait interfaces for external collaborators.
//!
//! - [`ChainSource`]: block-explorer view of the chain (satchel-explorer implements)

use async_trait::async_trait;
use bitcoin::{Address, Txid};

use crate::error::SourceError;
use crate::types::{AddressStats, FeePresets, RemoteUtxo};

/// Read-mostly view of the chain served by an external block explorer.
///
/// The wallet never validates consensus rules itself; it trusts this
/// source for activity and spendable outputs and hands signed transactions
/// to it for relay. Timeouts are the implementor's policy.
#[async_trait]
pub trait ChainSource: Send + Sync {
    /// Activity counters for an address (confirmed and mempool).
    async fn address_stats(&self, address: &Address) -> Result<AddressStats, SourceError>;

    /// Unspent outputs paying to an address.
    async fn address_utxos(&self, address: &Address) -> Result<Vec<RemoteUtxo>, SourceError>;

    /// Relay a hex-encoded signed transaction. Returns the txid on acceptance
    /// and [`SourceError::Rejected`] with the verbatim error body otherwise.
    async fn broadcast(&self, tx_hex: &str) -> Result<Txid, SourceError>;

    /// Economy, medium and fast fee-rate presets.
    async fn fee_presets(&self) -> Result<FeePresets, SourceError>;
}
