//! Shared test helpers for end-to-end and property tests.
//!
//! This is the canonical `MockChain`. `satchel-wallet` keeps a mirror in its
//! `#[cfg(test)] testing` module for its own unit tests; the two share one
//! API and change together.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bitcoin::hashes::Hash;
use bitcoin::{Address, Network, OutPoint, Transaction, Txid};
use parking_lot::Mutex;
use satchel_core::error::SourceError;
use satchel_core::traits::ChainSource;
use satchel_core::types::{AddressStats, FeePresets, FeeRate, RemoteUtxo, Utxo};
use satchel_wallet::{KeyChain, Wallet, WalletConfig};
use tokio_util::sync::CancellationToken;

/// The all-"abandon" test mnemonic.
pub const ABANDON_ABOUT: &str = "abandon abandon abandon abandon abandon abandon \
                                 abandon abandon abandon abandon abandon about";

/// First three testnet receive addresses of [`ABANDON_ABOUT`].
pub const TESTNET_ADDRESSES: [&str; 3] = [
    "tb1q6rz28mcfaxtmd6v789l9rrlrusdprr9pqcpvkl",
    "tb1qd7spv5q28348xl4myc8zmh983w5jx32cjhkn97",
    "tb1qxdyjf6h5d6qxap4n2dap97q4j5ps6ua8sll0ct",
];

pub fn testnet_wallet() -> Wallet {
    Wallet::restore(WalletConfig::default(), ABANDON_ABOUT, "").unwrap()
}

/// An address no test wallet owns.
pub fn foreign_address() -> Address {
    KeyChain::derive_root(ABANDON_ABOUT, "someone else", Network::Testnet, 0, 0)
        .unwrap()
        .address_at(0)
        .unwrap()
}

/// Deterministic outpoint with a txid filled with `tag`.
pub fn outpoint(tag: u8, vout: u32) -> OutPoint {
    OutPoint::new(Txid::from_byte_array([tag; 32]), vout)
}

pub fn confirmed(tag: u8, vout: u32, value: u64) -> RemoteUtxo {
    RemoteUtxo {
        outpoint: outpoint(tag, vout),
        value,
        confirmed: true,
        block_height: Some(800_000),
    }
}

pub fn unconfirmed(tag: u8, vout: u32, value: u64) -> RemoteUtxo {
    RemoteUtxo {
        outpoint: outpoint(tag, vout),
        value,
        confirmed: false,
        block_height: None,
    }
}

/// Owned outputs paying `address`, one per value.
pub fn utxos_at(address: &Address, values: &[u64]) -> Vec<Utxo> {
    values
        .iter()
        .enumerate()
        .map(|(i, &v)| Utxo::from_remote(confirmed(i as u8 + 1, 0, v), address.clone()))
        .collect()
}

/// In-memory chain source with scripted activity, failures and relay.
#[derive(Default)]
pub struct MockChain {
    active: Mutex<HashSet<Address>>,
    failing: Mutex<HashSet<Address>>,
    utxos: Mutex<HashMap<Address, Vec<RemoteUtxo>>>,
    relayed: Mutex<Vec<Transaction>>,
    reject_with: Mutex<Option<String>>,
    cancel_after: Mutex<Option<(usize, CancellationToken)>>,
    stats_queries: AtomicUsize,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_active(&self, address: &Address) {
        self.active.lock().insert(address.clone());
    }

    pub fn set_failing(&self, address: &Address) {
        self.failing.lock().insert(address.clone());
    }

    /// Credit `address` with an output and mark it used.
    pub fn fund(&self, address: &Address, utxo: RemoteUtxo) {
        self.active.lock().insert(address.clone());
        self.utxos.lock().entry(address.clone()).or_default().push(utxo);
    }

    pub fn clear_utxos(&self, address: &Address) {
        self.utxos.lock().remove(address);
    }

    pub fn reject_broadcasts(&self, reason: &str) {
        *self.reject_with.lock() = Some(reason.to_string());
    }

    /// Cancel `token` once `queries` stats lookups have been served.
    pub fn cancel_after(&self, queries: usize, token: CancellationToken) {
        *self.cancel_after.lock() = Some((queries, token));
    }

    pub fn stats_queries(&self) -> usize {
        self.stats_queries.load(Ordering::SeqCst)
    }

    /// Transactions accepted for relay, in order.
    pub fn relayed(&self) -> Vec<Transaction> {
        self.relayed.lock().clone()
    }
}

#[async_trait]
impl ChainSource for MockChain {
    async fn address_stats(&self, address: &Address) -> Result<AddressStats, SourceError> {
        let served = self.stats_queries.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((limit, token)) = self.cancel_after.lock().as_ref() {
            if served >= *limit {
                token.cancel();
            }
        }
        if self.failing.lock().contains(address) {
            return Err(SourceError::Transport("connection refused".into()));
        }
        if self.active.lock().contains(address) {
            Ok(AddressStats {
                tx_count: 1,
                funded_txo_count: 1,
                ..AddressStats::default()
            })
        } else {
            Ok(AddressStats::default())
        }
    }

    async fn address_utxos(&self, address: &Address) -> Result<Vec<RemoteUtxo>, SourceError> {
        if self.failing.lock().contains(address) {
            return Err(SourceError::Status {
                status: 502,
                body: "bad gateway".into(),
            });
        }
        Ok(self.utxos.lock().get(address).cloned().unwrap_or_default())
    }

    async fn broadcast(&self, tx_hex: &str) -> Result<Txid, SourceError> {
        if let Some(reason) = self.reject_with.lock().clone() {
            return Err(SourceError::Rejected(reason));
        }
        let bytes = hex::decode(tx_hex).map_err(|e| SourceError::Decode(e.to_string()))?;
        let tx: Transaction = bitcoin::consensus::deserialize(&bytes)
            .map_err(|e| SourceError::Decode(e.to_string()))?;
        let txid = tx.compute_txid();
        self.relayed.lock().push(tx);
        Ok(txid)
    }

    async fn fee_presets(&self) -> Result<FeePresets, SourceError> {
        Ok(FeePresets {
            economy: FeeRate::from_sat_per_vb(1),
            medium: FeeRate::from_sat_per_vb(4),
            fast: FeeRate::from_sat_per_vb(10),
        })
    }
}
