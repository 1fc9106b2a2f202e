//! Explorer endpoint configuration.

use std::time::Duration;

use bitcoin::Network;

/// Request timeout applied to every call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplorerConfig {
    /// API root, without a trailing slash.
    pub base_url: String,
    pub timeout: Duration,
}

impl ExplorerConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Public default endpoint for `network`.
    pub fn for_network(network: Network) -> Self {
        let url = match network {
            Network::Bitcoin => "https://blockstream.info/api",
            Network::Signet => "https://mempool.space/signet/api",
            Network::Regtest => "http://127.0.0.1:3002",
            _ => "https://blockstream.info/testnet/api",
        };
        Self::new(url)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
