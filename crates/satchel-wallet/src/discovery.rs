//! Gap-limit address discovery.
//!
//! Walks the wallet's chain from index 0, asking the chain source whether
//! each address has ever been used, and stops after `gap_limit` consecutive
//! unused addresses. Lookups may run in a bounded window, but the running
//! tally is always resolved in index order by the single task driving the
//! scan.

use bitcoin::Address;
use futures::future::join_all;
use satchel_core::traits::ChainSource;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::addresses::DiscoveredAddressSet;
use crate::config::WalletConfig;
use crate::error::WalletError;
use crate::keys::KeyChain;

/// Progress for one resolved index, emitted in index order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanProgress {
    pub index: u32,
    pub address: Address,
    /// The source reported activity.
    pub active: bool,
    /// The lookup failed and was counted as unused.
    pub lookup_failed: bool,
    pub consecutive_unused: u32,
    pub highest_used: Option<u32>,
}

/// Result of a scan. A cancelled scan still reports what it resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryOutcome {
    /// Highest active index seen by this scan.
    pub highest_used: Option<u32>,
    /// Indices resolved.
    pub scanned: u32,
    /// Lookups that failed and were counted as unused.
    pub failed_lookups: u32,
    /// Number of addresses kept derived after the scan.
    pub boundary: u32,
    /// `false` if the scan was cancelled before reaching the gap.
    pub completed: bool,
}

/// Gap-limit scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressDiscovery {
    gap_limit: u32,
    lookahead: u32,
    window: u32,
}

impl AddressDiscovery {
    /// Sequential scanner. Zero values are raised to 1.
    pub fn new(gap_limit: u32, lookahead: u32) -> Self {
        Self {
            gap_limit: gap_limit.max(1),
            lookahead: lookahead.max(1),
            window: 1,
        }
    }

    /// Issue up to `window` lookups concurrently.
    pub fn with_window(mut self, window: u32) -> Self {
        self.window = window.max(1);
        self
    }

    pub fn from_config(config: &WalletConfig) -> Self {
        Self::new(config.gap_limit, config.lookahead).with_window(config.discovery_window)
    }

    pub fn gap_limit(&self) -> u32 {
        self.gap_limit
    }

    pub fn lookahead(&self) -> u32 {
        self.lookahead
    }

    /// Number of addresses to keep derived for a given highest used index:
    /// `highest_used + gap_limit + lookahead` is the last derived index.
    pub fn boundary(&self, highest_used: Option<u32>) -> u32 {
        let first_unused = highest_used.map_or(0, |h| h.saturating_add(1));
        first_unused
            .saturating_add(self.gap_limit)
            .saturating_add(self.lookahead)
    }

    /// Run a scan from index 0.
    ///
    /// Activity is merged into `addresses` as each index resolves, so a
    /// cancelled scan leaves the set extended and never retracted. Failed
    /// lookups count toward the gap.
    pub async fn scan(
        &self,
        keychain: &KeyChain,
        addresses: &mut DiscoveredAddressSet,
        source: &dyn ChainSource,
        cancel: &CancellationToken,
        progress: Option<&UnboundedSender<ScanProgress>>,
    ) -> Result<DiscoveryOutcome, WalletError> {
        let mut next: u32 = 0;
        let mut consecutive_unused: u32 = 0;
        let mut highest_used: Option<u32> = None;
        let mut scanned: u32 = 0;
        let mut failed_lookups: u32 = 0;

        while consecutive_unused < self.gap_limit {
            if cancel.is_cancelled() {
                return Ok(self.cancelled(addresses, highest_used, scanned, failed_lookups));
            }

            let batch_len = self.window.min(self.gap_limit - consecutive_unused);
            let batch_end = next.checked_add(batch_len).ok_or_else(|| {
                WalletError::DerivationFailure("address index space exhausted".into())
            })?;
            addresses.extend_to(keychain, batch_end)?;
            let batch: Vec<Address> = (next..batch_end)
                .filter_map(|i| addresses.get(i).cloned())
                .collect();

            debug!(from = next, to = batch_end, "querying address activity");
            let lookups = join_all(batch.iter().map(|address| source.address_stats(address)));
            let results = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Ok(self.cancelled(addresses, highest_used, scanned, failed_lookups));
                }
                results = lookups => results,
            };

            for ((index, address), result) in (next..batch_end).zip(batch).zip(results) {
                let (active, lookup_failed) = match result {
                    Ok(stats) => (stats.has_activity(), false),
                    Err(e) => {
                        warn!(index, %address, error = %e, "activity lookup failed, treating as unused");
                        failed_lookups += 1;
                        (false, true)
                    }
                };
                scanned += 1;
                if active {
                    consecutive_unused = 0;
                    highest_used = Some(index);
                    addresses.mark_used(index);
                } else {
                    consecutive_unused += 1;
                }
                if let Some(tx) = progress {
                    let _ = tx.send(ScanProgress {
                        index,
                        address,
                        active,
                        lookup_failed,
                        consecutive_unused,
                        highest_used,
                    });
                }
            }
            next = batch_end;
        }

        let boundary = self.boundary(highest_used);
        addresses.extend_to(keychain, boundary)?;
        info!(
            highest_used = ?highest_used,
            scanned,
            failed_lookups,
            boundary,
            "address discovery complete"
        );
        Ok(DiscoveryOutcome {
            highest_used,
            scanned,
            failed_lookups,
            boundary,
            completed: true,
        })
    }

    fn cancelled(
        &self,
        addresses: &DiscoveredAddressSet,
        highest_used: Option<u32>,
        scanned: u32,
        failed_lookups: u32,
    ) -> DiscoveryOutcome {
        info!(scanned, highest_used = ?highest_used, "address discovery cancelled");
        DiscoveryOutcome {
            highest_used,
            scanned,
            failed_lookups,
            boundary: addresses.len() as u32,
            completed: false,
        }
    }
}

impl Default for AddressDiscovery {
    fn default() -> Self {
        Self::from_config(&WalletConfig::default())
    }
}
