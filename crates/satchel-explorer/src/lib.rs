//! # satchel-explorer
//!
//! HTTP client for an Esplora-style block explorer, implementing
//! [`ChainSource`](satchel_core::ChainSource). The endpoint is injected as a
//! base URL; the client does not care which network it serves.
//!
//! - [`api`]: response bodies of the explorer endpoints
//! - [`client`]: `EsploraClient`
//! - [`config`]: base URL and timeout

pub mod api;
pub mod client;
pub mod config;

pub use client::EsploraClient;
pub use config::ExplorerConfig;
