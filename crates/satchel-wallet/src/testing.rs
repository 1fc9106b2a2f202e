//! Shared fixtures for unit tests: the canonical mnemonic and a scripted
//! in-memory chain source.
//!
//! `satchel_tests::helpers` holds the canonical `MockChain`. Unit tests in
//! this crate cannot link against it without compiling `satchel-wallet`
//! twice, so this copy mirrors its API method for method. Change both
//! together.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bitcoin::hashes::Hash;
use bitcoin::{Address, Network, OutPoint, Transaction, Txid};
use parking_lot::Mutex;
use satchel_core::error::SourceError;
use satchel_core::traits::ChainSource;
use satchel_core::types::{AddressStats, FeePresets, FeeRate, RemoteUtxo};
use tokio_util::sync::CancellationToken;

use crate::keys::KeyChain;

pub const ABANDON_ABOUT: &str = "abandon abandon abandon abandon abandon abandon \
                                 abandon abandon abandon abandon abandon about";

pub fn testnet_keychain() -> KeyChain {
    KeyChain::derive_root(ABANDON_ABOUT, "", Network::Testnet, 0, 0).unwrap()
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
        block_height: Some(100),
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
            return Err(SourceError::Transport("connection reset".into()));
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
                status: 503,
                body: "unavailable".into(),
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
            economy: FeeRate::from_sat_per_vb(2),
            medium: FeeRate::from_sat_per_vb(5),
            fast: FeeRate::from_sat_per_vb(12),
        })
    }
}
