//! UTXO tracking.
//!
//! The tracker holds no authoritative state. Each refresh rebuilds a
//! snapshot from the chain source and swaps it in only once complete, so
//! readers always see the most recently completed refresh. Dropping a
//! refresh future leaves the previous snapshot in place.

use std::collections::HashSet;
use std::sync::Arc;

use bitcoin::{Address, OutPoint};
use futures::stream::{self, StreamExt};
use parking_lot::RwLock;
use satchel_core::traits::ChainSource;
use satchel_core::types::Utxo;
use tracing::{info, warn};

use crate::addresses::DiscoveredAddressSet;

/// Default number of address queries in flight during a refresh.
const DEFAULT_REFRESH_CONCURRENCY: usize = 4;

/// An immutable view of the wallet's spendable outputs.
///
/// Outputs are ordered by owning address index, then by outpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UtxoSnapshot {
    utxos: Vec<Utxo>,
    failed_addresses: Vec<Address>,
}

impl UtxoSnapshot {
    pub fn new(utxos: Vec<Utxo>, failed_addresses: Vec<Address>) -> Self {
        Self {
            utxos,
            failed_addresses,
        }
    }

    pub fn utxos(&self) -> &[Utxo] {
        &self.utxos
    }

    /// Addresses whose query failed during the refresh that produced this
    /// snapshot. Their outputs are missing, not known to be absent.
    pub fn failed_addresses(&self) -> &[Address] {
        &self.failed_addresses
    }

    pub fn len(&self) -> usize {
        self.utxos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.utxos.is_empty()
    }

    pub fn get(&self, outpoint: &OutPoint) -> Option<&Utxo> {
        self.utxos.iter().find(|u| &u.outpoint == outpoint)
    }

    pub fn total(&self) -> u64 {
        self.utxos.iter().map(|u| u.value).sum()
    }

    pub fn confirmed_total(&self) -> u64 {
        self.utxos.iter().filter(|u| u.confirmed).map(|u| u.value).sum()
    }

    pub fn unconfirmed_total(&self) -> u64 {
        self.utxos.iter().filter(|u| !u.confirmed).map(|u| u.value).sum()
    }

    /// Copy of this snapshot without the given outpoints.
    pub fn without(&self, spent: &[OutPoint]) -> Self {
        let spent: HashSet<&OutPoint> = spent.iter().collect();
        Self {
            utxos: self
                .utxos
                .iter()
                .filter(|u| !spent.contains(&u.outpoint))
                .cloned()
                .collect(),
            failed_addresses: self.failed_addresses.clone(),
        }
    }
}

/// Aggregates spendable outputs over the wallet's known addresses.
#[derive(Debug)]
pub struct UtxoTracker {
    current: RwLock<Arc<UtxoSnapshot>>,
    concurrency: usize,
}

impl UtxoTracker {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(UtxoSnapshot::default())),
            concurrency: DEFAULT_REFRESH_CONCURRENCY,
        }
    }

    /// Limit the number of address queries in flight.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// The most recently completed snapshot.
    pub fn snapshot(&self) -> Arc<UtxoSnapshot> {
        self.current.read().clone()
    }

    /// Query every address and replace the snapshot.
    ///
    /// Per-address failures are logged and excluded rather than failing the
    /// refresh.
    pub async fn refresh(
        &self,
        addresses: &DiscoveredAddressSet,
        source: &dyn ChainSource,
    ) -> Arc<UtxoSnapshot> {
        let results: Vec<_> = stream::iter(addresses.iter())
            .map(|(index, address)| async move {
                (index, address, source.address_utxos(address).await)
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut keyed = Vec::new();
        let mut failed_addresses = Vec::new();
        for (index, address, result) in results {
            match result {
                Ok(remote) => {
                    keyed.extend(
                        remote
                            .into_iter()
                            .map(|r| (index, Utxo::from_remote(r, address.clone()))),
                    );
                }
                Err(e) => {
                    warn!(index, %address, error = %e, "utxo query failed, excluding address");
                    failed_addresses.push(address.clone());
                }
            }
        }
        keyed.sort_by(|(ia, a), (ib, b)| ia.cmp(ib).then_with(|| a.outpoint.cmp(&b.outpoint)));
        keyed.dedup_by(|(_, a), (_, b)| a.outpoint == b.outpoint);

        let snapshot = Arc::new(UtxoSnapshot::new(
            keyed.into_iter().map(|(_, u)| u).collect(),
            failed_addresses,
        ));
        info!(
            utxos = snapshot.len(),
            total = snapshot.total(),
            failed = snapshot.failed_addresses().len(),
            "utxo refresh complete"
        );
        *self.current.write() = Arc::clone(&snapshot);
        snapshot
    }

    /// Drop outpoints consumed by a broadcast transaction from the current
    /// snapshot.
    pub fn mark_spent(&self, spent: &[OutPoint]) {
        let mut current = self.current.write();
        let next = current.without(spent);
        *current = Arc::new(next);
    }
}

impl Default for UtxoTracker {
    fn default() -> Self {
        Self::new()
    }
}
