//! Error types for external chain collaborators.

use thiserror::Error;

/// Failures reported by a [`ChainSource`](crate::traits::ChainSource).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// Connection, TLS or timeout failure.
    #[error("transport: {0}")]
    Transport(String),

    /// Non-success HTTP status.
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    /// Response body could not be decoded.
    #[error("decode: {0}")]
    Decode(String),

    /// The transaction was refused; the body is kept verbatim.
    #[error("rejected: {0}")]
    Rejected(String),
}
