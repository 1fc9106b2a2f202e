//! CLI configuration from environment variables and global flags.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use bitcoin::Network;
use satchel_core::constants::DEFAULT_GAP_LIMIT;
use satchel_explorer::ExplorerConfig;
use satchel_wallet::WalletConfig;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Encrypted wallet file.
    pub wallet_path: PathBuf,
    pub network: Network,
    /// Explorer API root; `None` uses the network's public default.
    pub explorer_url: Option<String>,
    pub gap_limit: u32,
    /// Non-interactive wallet password.
    pub password: Option<String>,
}

impl Config {
    /// Load configuration from `SATCHEL_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let wallet_path = match lookup("SATCHEL_WALLET_PATH") {
            Some(path) => PathBuf::from(path),
            None => default_wallet_path()?,
        };

        let network = match lookup("SATCHEL_NETWORK") {
            Some(name) => parse_network(&name)?,
            None => Network::Testnet,
        };

        let gap_limit = match lookup("SATCHEL_GAP_LIMIT") {
            Some(v) => v
                .parse()
                .context("SATCHEL_GAP_LIMIT must be a positive integer")?,
            None => DEFAULT_GAP_LIMIT,
        };
        if gap_limit == 0 {
            bail!("SATCHEL_GAP_LIMIT must be at least 1");
        }

        Ok(Config {
            wallet_path,
            network,
            explorer_url: lookup("SATCHEL_EXPLORER_URL"),
            gap_limit,
            password: lookup("SATCHEL_WALLET_PASSWORD"),
        })
    }

    pub fn wallet_config(&self) -> WalletConfig {
        WalletConfig {
            gap_limit: self.gap_limit,
            ..WalletConfig::for_network(self.network)
        }
    }

    pub fn explorer_config(&self) -> ExplorerConfig {
        match &self.explorer_url {
            Some(url) => ExplorerConfig::new(url.clone()),
            None => ExplorerConfig::for_network(self.network),
        }
    }
}

/// `~/.satchel/wallet.dat`
pub fn default_wallet_path() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".satchel").join("wallet.dat"))
}

/// Parse a network name, accepting `mainnet` as an alias of `bitcoin`.
pub fn parse_network(s: &str) -> Result<Network> {
    match s.trim().to_lowercase().as_str() {
        "mainnet" | "bitcoin" => Ok(Network::Bitcoin),
        "testnet" => Ok(Network::Testnet),
        "signet" => Ok(Network::Signet),
        "regtest" => Ok(Network::Regtest),
        other => bail!("Invalid network '{other}' (expected mainnet, testnet, signet or regtest)"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn env_values_are_read() {
        let cfg = Config::from_lookup(lookup(&[
            ("SATCHEL_WALLET_PATH", "/tmp/w.dat"),
            ("SATCHEL_NETWORK", "signet"),
            ("SATCHEL_EXPLORER_URL", "http://localhost:3002"),
            ("SATCHEL_GAP_LIMIT", "50"),
        ]))
        .unwrap();
        assert_eq!(cfg.wallet_path, PathBuf::from("/tmp/w.dat"));
        assert_eq!(cfg.network, Network::Signet);
        assert_eq!(cfg.gap_limit, 50);
        assert_eq!(cfg.explorer_config().base_url, "http://localhost:3002");
        assert_eq!(cfg.wallet_config().gap_limit, 50);
        assert_eq!(cfg.wallet_config().network, Network::Signet);
    }

    #[test]
    fn defaults_without_env() {
        let cfg = Config::from_lookup(lookup(&[("SATCHEL_WALLET_PATH", "w.dat")])).unwrap();
        assert_eq!(cfg.network, Network::Testnet);
        assert_eq!(cfg.gap_limit, 20);
        assert!(cfg.password.is_none());
        assert_eq!(
            cfg.explorer_config().base_url,
            ExplorerConfig::for_network(Network::Testnet).base_url
        );
    }

    #[test]
    fn bad_values_rejected() {
        assert!(Config::from_lookup(lookup(&[("SATCHEL_NETWORK", "moon")])).is_err());
        assert!(Config::from_lookup(lookup(&[("SATCHEL_GAP_LIMIT", "0")])).is_err());
        assert!(Config::from_lookup(lookup(&[("SATCHEL_GAP_LIMIT", "-5")])).is_err());
    }

    #[test]
    fn network_aliases() {
        assert_eq!(parse_network("Mainnet").unwrap(), Network::Bitcoin);
        assert_eq!(parse_network("regtest").unwrap(), Network::Regtest);
    }
}
