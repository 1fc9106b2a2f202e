//! # satchel-wallet: HD wallet engine for native segwit outputs.
//!
//! Derives keys and addresses from a BIP-39 mnemonic along the BIP-84 path,
//! discovers used addresses with a gap-limit scan, tracks spendable outputs,
//! and builds, signs and serializes transactions for broadcast.
//!
//! # Modules
//!
//! - [`error`]: `WalletError` enum
//! - [`mnemonic`]: BIP-39 phrase generation and parsing
//! - [`keys`]: Seed, KeyChain, BIP-32 child derivation
//! - [`addresses`]: Discovered address set (index <-> address cache)
//! - [`discovery`]: Gap-limit address discovery
//! - [`tracker`]: UTXO snapshot refresh
//! - [`fee`]: Virtual size and fee estimation
//! - [`coin_selection`]: Spend planning over caller-chosen outputs
//! - [`builder`]: Transaction builder state machine and signer
//! - [`raw_editor`]: Decode and edit externally supplied transactions
//! - [`encryption`]: AES-256-GCM wallet file encryption
//! - [`store`]: Persisted wallet record
//! - [`config`]: Wallet configuration
//! - [`wallet`]: High-level wallet session

pub mod addresses;
pub mod builder;
pub mod coin_selection;
pub mod config;
pub mod discovery;
pub mod encryption;
pub mod error;
pub mod fee;
pub mod keys;
pub mod mnemonic;
pub mod raw_editor;
pub mod store;
pub mod tracker;
pub mod wallet;

#[cfg(test)]
mod testing;

// Re-exports for convenient access
pub use addresses::DiscoveredAddressSet;
pub use builder::{
    FinalizedTransaction, InputDescriptor, InputsAdded, SignedTransaction, TransactionBuilder,
    UnsignedTransaction,
};
pub use coin_selection::{CoinSelector, SelectionPolicy, SendAmount, SpendPlan};
pub use config::WalletConfig;
pub use discovery::{AddressDiscovery, DiscoveryOutcome, ScanProgress};
pub use error::WalletError;
pub use fee::{FeeEstimator, FeePreset};
pub use keys::{ChildKey, KeyChain, Seed};
pub use mnemonic::{WordCount, generate_mnemonic, parse_mnemonic};
pub use raw_editor::{
    DecodedInput, DecodedOutput, DecodedTransaction, EditedTransaction, OutputDestination,
    RawTransactionEditor,
};
pub use store::{FileStore, MemoryStore, WalletRecord, WalletStore};
pub use tracker::{UtxoSnapshot, UtxoTracker};
pub use wallet::{Wallet, WalletBalance};
