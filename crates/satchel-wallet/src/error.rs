//! Wallet error types.

use satchel_core::error::SourceError;
use thiserror::Error;

/// Errors that can occur in wallet operations.
///
/// Every variant except [`WalletError::DerivationFailure`] is recoverable:
/// the caller adjusts input, retries, or re-enters data. A derivation
/// failure means a derivation invariant was violated and should be treated
/// as a bug.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    /// Mnemonic failed word-list or checksum validation.
    #[error("invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    /// BIP-32 derivation failed for a well-formed path.
    #[error("key derivation failure: {0}")]
    DerivationFailure(String),

    /// Selected outputs cannot cover the amount plus fee.
    #[error("insufficient funds: have {have}, need {need}")]
    InsufficientFunds {
        /// Total value of the selected outputs in sats.
        have: u64,
        /// Amount plus fee in sats.
        need: u64,
    },

    /// Nothing is left over to pay the fee.
    #[error("insufficient funds for fee: {available} available, fee {fee}")]
    InsufficientFundsForFee {
        /// Value available after the payment, in sats.
        available: u64,
        /// Required fee in sats.
        fee: u64,
    },

    /// Change would be positive but not above the dust threshold.
    #[error("change of {change} sats is at or below the dust threshold of {threshold}")]
    DustChange {
        /// The leftover change in sats.
        change: u64,
        /// The dust threshold in sats.
        threshold: u64,
    },

    /// An input's address does not map back to a derivation index.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// An external call failed. Always retryable.
    #[error("network failure: {0}")]
    NetworkFailure(String),

    /// The broadcast collaborator refused the transaction.
    #[error("broadcast rejected: {0}")]
    BroadcastRejected(String),

    /// No UTXOs available for spending.
    #[error("no UTXOs available")]
    NoUtxos,

    /// Invalid monetary amount or selection.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Invalid address string or wrong network.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Malformed or unsupported transaction.
    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    /// Invalid wallet configuration.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Encryption failure.
    #[error("encryption: {0}")]
    Encryption(String),

    /// Wrong password for wallet file.
    #[error("invalid password")]
    InvalidPassword,

    /// Wallet file is corrupted or has invalid format.
    #[error("corrupted file: {0}")]
    CorruptedFile(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(String),

    /// Serialization error.
    #[error("serialization: {0}")]
    Serialization(String),
}

impl WalletError {
    /// Whether the caller is expected to branch on this error.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, WalletError::DerivationFailure(_))
    }
}

impl From<SourceError> for WalletError {
    fn from(e: SourceError) -> Self {
        match e {
            SourceError::Rejected(body) => WalletError::BroadcastRejected(body),
            other => WalletError::NetworkFailure(other.to_string()),
        }
    }
}

impl From<bitcoin::bip32::Error> for WalletError {
    fn from(e: bitcoin::bip32::Error) -> Self {
        WalletError::DerivationFailure(e.to_string())
    }
}
