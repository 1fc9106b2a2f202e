//! # satchel-core
//! Foundation types and traits shared by the Satchel wallet crates.

pub mod constants;
pub mod error;
pub mod traits;
pub mod types;

pub use bitcoin::{Address, Network, OutPoint, Txid};
pub use error::SourceError;
pub use traits::ChainSource;
pub use types::{AddressStats, FeePresets, FeeRate, RemoteUtxo, Utxo};
