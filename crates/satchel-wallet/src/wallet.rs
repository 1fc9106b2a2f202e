//! The wallet session.
//!
//! [`Wallet`] owns the keychain for its lifetime and is passed by reference
//! to whatever needs it; there is no global wallet state. It ties together
//! discovery, UTXO tracking, spend planning, signing and persistence.

use std::fmt;
use std::sync::Arc;

use bitcoin::address::NetworkUnchecked;
use bitcoin::{Address, Network, Txid};
use satchel_core::constants::COIN;
use satchel_core::traits::ChainSource;
use satchel_core::types::FeeRate;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::addresses::DiscoveredAddressSet;
use crate::builder::{FinalizedTransaction, TransactionBuilder};
use crate::coin_selection::{CoinSelector, SelectionPolicy, SendAmount, SpendPlan};
use crate::config::WalletConfig;
use crate::discovery::{AddressDiscovery, DiscoveryOutcome, ScanProgress};
use crate::error::WalletError;
use crate::fee::FeePreset;
use crate::keys::KeyChain;
use crate::mnemonic::{WordCount, generate_mnemonic, parse_mnemonic};
use crate::store::{WalletRecord, WalletStore};
use crate::tracker::{UtxoSnapshot, UtxoTracker};

/// Balance summary from the latest UTXO snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalletBalance {
    /// Sats in mined outputs.
    pub confirmed: u64,
    /// Sats in mempool outputs.
    pub unconfirmed: u64,
    pub utxo_count: usize,
}

impl WalletBalance {
    pub fn total(&self) -> u64 {
        self.confirmed.saturating_add(self.unconfirmed)
    }

    /// Total in BTC (display helper only).
    pub fn total_btc(&self) -> f64 {
        self.total() as f64 / COIN as f64
    }
}

/// One wallet session.
pub struct Wallet {
    config: WalletConfig,
    keychain: KeyChain,
    mnemonic: Zeroizing<String>,
    passphrase: Zeroizing<String>,
    addresses: DiscoveredAddressSet,
    discovery: AddressDiscovery,
    tracker: UtxoTracker,
    /// Next index the session may hand out as a receive or change address.
    next_index: u32,
}

impl Wallet {
    /// Create a wallet from a freshly generated mnemonic.
    pub fn create(
        config: WalletConfig,
        words: WordCount,
        passphrase: &str,
    ) -> Result<Self, WalletError> {
        let mnemonic = generate_mnemonic(words)?;
        Self::restore(config, &mnemonic.to_string(), passphrase)
    }

    /// Restore a wallet from an existing mnemonic and passphrase.
    pub fn restore(
        config: WalletConfig,
        phrase: &str,
        passphrase: &str,
    ) -> Result<Self, WalletError> {
        config.validate()?;
        let mnemonic = parse_mnemonic(phrase)?;
        let normalized = Zeroizing::new(mnemonic.to_string());
        let keychain = KeyChain::derive_root(
            &normalized,
            passphrase,
            config.network,
            config.account,
            config.chain,
        )?;
        let discovery = AddressDiscovery::from_config(&config);
        let mut addresses = DiscoveredAddressSet::new();
        addresses.extend_to(&keychain, discovery.boundary(None))?;
        info!(network = %config.network, path = %keychain.path_template(), "wallet opened");
        Ok(Self {
            config,
            keychain,
            mnemonic: normalized,
            passphrase: Zeroizing::new(passphrase.to_string()),
            addresses,
            discovery,
            tracker: UtxoTracker::new(),
            next_index: 0,
        })
    }

    /// Reopen a persisted wallet. The record's network wins over `config`.
    pub fn from_record(record: &WalletRecord, config: WalletConfig) -> Result<Self, WalletError> {
        let config = WalletConfig {
            network: record.network,
            ..config
        };
        let mut wallet = Self::restore(config, &record.mnemonic, &record.passphrase)?;
        wallet.next_index = record.receive_index;
        let cover = wallet.cover_for(record.receive_index)?;
        wallet.addresses.extend_to(&wallet.keychain, cover)?;
        Ok(wallet)
    }

    /// Load from `store`, or `None` if nothing was saved.
    pub fn load(store: &dyn WalletStore, config: WalletConfig) -> Result<Option<Self>, WalletError> {
        store
            .load()?
            .map(|record| Self::from_record(&record, config))
            .transpose()
    }

    /// The persistable part of this session.
    pub fn record(&self) -> WalletRecord {
        let mut record = WalletRecord::new(
            self.mnemonic.to_string(),
            self.passphrase.to_string(),
            self.config.network,
        );
        record.receive_index = self.next_index;
        record
    }

    pub fn save(&self, store: &dyn WalletStore) -> Result<(), WalletError> {
        store.save(&self.record())
    }

    /// The normalized mnemonic, for backup display.
    pub fn mnemonic(&self) -> &str {
        &self.mnemonic
    }

    pub fn network(&self) -> Network {
        self.config.network
    }

    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    pub fn keychain(&self) -> &KeyChain {
        &self.keychain
    }

    pub fn addresses(&self) -> &DiscoveredAddressSet {
        &self.addresses
    }

    /// Run a gap-limit scan and extend the known address set.
    pub async fn discover(
        &mut self,
        source: &dyn ChainSource,
        cancel: &CancellationToken,
        progress: Option<&UnboundedSender<ScanProgress>>,
    ) -> Result<DiscoveryOutcome, WalletError> {
        self.discovery
            .scan(&self.keychain, &mut self.addresses, source, cancel, progress)
            .await
    }

    /// The current receive address: the first index that is neither used
    /// on chain nor already handed out. Does not advance.
    pub fn receive_address(&mut self) -> Result<Address, WalletError> {
        let index = self.cursor();
        Ok(self.addresses.ensure(&self.keychain, index)?.clone())
    }

    /// Hand out the current receive address and advance past it.
    pub fn next_receive_address(&mut self) -> Result<Address, WalletError> {
        self.take_unused()
    }

    /// Reserve an unused address for change. Reserved addresses are never
    /// handed out again in this session.
    pub fn reserve_change_address(&mut self) -> Result<Address, WalletError> {
        self.take_unused()
    }

    /// Refresh spendable outputs over every known address.
    pub async fn refresh(&self, source: &dyn ChainSource) -> Arc<UtxoSnapshot> {
        self.tracker.refresh(&self.addresses, source).await
    }

    /// The most recently completed UTXO snapshot.
    pub fn utxos(&self) -> Arc<UtxoSnapshot> {
        self.tracker.snapshot()
    }

    pub fn balance(&self) -> WalletBalance {
        let snapshot = self.tracker.snapshot();
        WalletBalance {
            confirmed: snapshot.confirmed_total(),
            unconfirmed: snapshot.unconfirmed_total(),
            utxo_count: snapshot.len(),
        }
    }

    /// Parse an address string and check it belongs to this wallet's network.
    pub fn parse_address(&self, s: &str) -> Result<Address, WalletError> {
        s.trim()
            .parse::<Address<NetworkUnchecked>>()
            .map_err(|e| WalletError::InvalidAddress(format!("{s}: {e}")))?
            .require_network(self.config.network)
            .map_err(|e| WalletError::InvalidAddress(format!("{s}: {e}")))
    }

    /// The selection policy used when the caller does not choose one.
    pub fn default_policy(&self) -> SelectionPolicy {
        if self.config.select_unconfirmed {
            SelectionPolicy::All
        } else {
            SelectionPolicy::AllConfirmed
        }
    }

    /// Fetch a fee-rate preset from the chain source.
    pub async fn preset_fee_rate(
        &self,
        source: &dyn ChainSource,
        preset: FeePreset,
    ) -> Result<FeeRate, WalletError> {
        let presets = source.fee_presets().await?;
        Ok(preset.resolve(&presets))
    }

    /// Price a send against the latest snapshot.
    pub fn plan_send(
        &self,
        recipient: Address,
        amount: SendAmount,
        fee_rate: FeeRate,
        policy: Option<SelectionPolicy>,
    ) -> Result<SpendPlan, WalletError> {
        let snapshot = self.tracker.snapshot();
        let policy = policy.unwrap_or_else(|| self.default_policy());
        CoinSelector::plan(snapshot.utxos(), &policy, recipient, amount, fee_rate)
    }

    /// Build, sign and finalize a planned send. A change address is
    /// reserved only when the plan has change.
    pub fn build_transaction(
        &mut self,
        plan: &SpendPlan,
    ) -> Result<FinalizedTransaction, WalletError> {
        let change_address = if plan.has_change() {
            Some(self.reserve_change_address()?)
        } else {
            None
        };
        let finalized = TransactionBuilder::from_plan(plan, change_address.as_ref())?
            .sign(&self.keychain, &self.addresses)?
            .finalize()?;
        info!(
            txid = %finalized.txid(),
            amount = finalized.amount(),
            fee = finalized.fee(),
            change = finalized.change(),
            "transaction signed"
        );
        Ok(finalized)
    }

    /// Relay a finalized transaction and drop its inputs from the snapshot.
    ///
    /// Rejections are returned verbatim as
    /// [`WalletError::BroadcastRejected`] and never retried.
    pub async fn broadcast(
        &self,
        tx: &FinalizedTransaction,
        source: &dyn ChainSource,
    ) -> Result<Txid, WalletError> {
        let txid = source.broadcast(&tx.to_hex()).await?;
        if txid != tx.txid() {
            warn!(expected = %tx.txid(), reported = %txid, "broadcast returned unexpected txid");
        }
        self.tracker.mark_spent(tx.spent_outpoints());
        info!(%txid, "transaction broadcast");
        Ok(txid)
    }

    fn cursor(&self) -> u32 {
        self.next_index.max(self.addresses.first_unused())
    }

    fn take_unused(&mut self) -> Result<Address, WalletError> {
        let index = self.cursor();
        let cover = self.cover_for(index.saturating_add(1))?;
        self.addresses.extend_to(&self.keychain, cover)?;
        let address = self.addresses.ensure(&self.keychain, index)?.clone();
        self.next_index = index.saturating_add(1);
        Ok(address)
    }

    /// Address count that keeps `lookahead` addresses derived past `next`.
    fn cover_for(&self, next: u32) -> Result<u32, WalletError> {
        next.checked_add(self.discovery.lookahead())
            .ok_or_else(|| WalletError::DerivationFailure("address index space exhausted".into()))
    }
}

impl fmt::Debug for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wallet")
            .field("network", &self.config.network)
            .field("path", &self.keychain.path_template())
            .field("addresses", &self.addresses.len())
            .field("next_index", &self.next_index)
            .finish_non_exhaustive()
    }
}
