//! Target network descriptions.
//!
//! A [`NetworkProfile`] is loaded once per run and is read-only afterwards. Profiles
//! either come from one of the built-in [`Network`] presets or from a TOML file layered
//! on top of a preset with `figment`.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

/// Default number of blocks that must be built on top of a deployment transaction.
pub const DEFAULT_CONFIRMATION_DEPTH: u64 = 5;

/// Etherscan V2 multichain API. The target chain is selected with the `chainid` parameter.
pub const ETHERSCAN_V2_API_URL: &str = "https://api.etherscan.io/v2/api";

/// Default timeout for a single JSON-RPC request.
pub const DEFAULT_RPC_TIMEOUT_SECS: u64 = 60;

/// Built-in network presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum Network {
    BscTestnet,
    BscMainnet,
}

impl Network {
    pub fn to_chain_id(&self) -> u64 {
        match self {
            Network::BscTestnet => 97,
            Network::BscMainnet => 56,
        }
    }

    /// Build the static profile for this preset.
    pub fn to_profile(&self) -> NetworkProfile {
        match self {
            Network::BscTestnet => NetworkProfile {
                name: self.to_string(),
                chain_id: self.to_chain_id(),
                rpc_url: parse_static_url("https://bsc-testnet-rpc.publicnode.com"),
                confirmation_depth: DEFAULT_CONFIRMATION_DEPTH,
                explorer_api_url: parse_static_url(ETHERSCAN_V2_API_URL),
                explorer_browser_url: parse_static_url("https://testnet.bscscan.com"),
                native_symbol: "tBNB".to_string(),
                rpc_timeout_secs: DEFAULT_RPC_TIMEOUT_SECS,
            },
            Network::BscMainnet => NetworkProfile {
                name: self.to_string(),
                chain_id: self.to_chain_id(),
                rpc_url: parse_static_url("https://bsc-rpc.publicnode.com"),
                confirmation_depth: DEFAULT_CONFIRMATION_DEPTH,
                explorer_api_url: parse_static_url(ETHERSCAN_V2_API_URL),
                explorer_browser_url: parse_static_url("https://bscscan.com"),
                native_symbol: "BNB".to_string(),
                rpc_timeout_secs: DEFAULT_RPC_TIMEOUT_SECS,
            },
        }
    }
}

// Preset URLs are literals covered by `test_presets`.
fn parse_static_url(url: &str) -> Url {
    Url::parse(url).expect("Built-in network URLs should be valid")
}

/// Static description of a target network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkProfile {
    /// Human readable network name, used in reports.
    pub name: String,
    /// The EIP-155 chain id.
    pub chain_id: u64,
    /// JSON-RPC endpoint.
    pub rpc_url: Url,
    /// Number of blocks (including the inclusion block) required before an artifact is final.
    pub confirmation_depth: u64,
    /// Explorer verification API endpoint.
    pub explorer_api_url: Url,
    /// Explorer web UI, used to build links in reports.
    pub explorer_browser_url: Url,
    /// Symbol of the native asset that pays for gas.
    pub native_symbol: String,
    /// Per-request JSON-RPC timeout in seconds.
    pub rpc_timeout_secs: u64,
}

impl NetworkProfile {
    /// Load a profile from a TOML file, using `base` for every key the file omits.
    pub fn load_from_file(path: &Path, base: Network) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("Network profile not found: {}", path.display());
        }

        let profile: Self = Figment::from(Serialized::defaults(base.to_profile()))
            .merge(Toml::file(path))
            .extract()
            .with_context(|| format!("Failed to parse network profile {}", path.display()))?;

        profile.validate()?;

        tracing::info!(path = %path.display(), network = %profile.name, "Network profile loaded");
        Ok(profile)
    }

    /// Save the profile to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize network profile to TOML")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write network profile to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Network profile saved");
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.confirmation_depth == 0 {
            anyhow::bail!("confirmation_depth must be at least 1");
        }
        if self.chain_id == 0 {
            anyhow::bail!("chain_id must be non-zero");
        }
        Ok(())
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }

    /// Explorer page for a deployed address.
    pub fn address_url(&self, address: impl std::fmt::Display) -> String {
        format!(
            "{}/address/{}",
            self.explorer_browser_url.as_str().trim_end_matches('/'),
            address
        )
    }

    /// Explorer page for a transaction.
    pub fn transaction_url(&self, tx_hash: impl std::fmt::Display) -> String {
        format!(
            "{}/tx/{}",
            self.explorer_browser_url.as_str().trim_end_matches('/'),
            tx_hash
        )
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use tempdir::TempDir;

    use super::*;

    #[test]
    fn test_presets() {
        let testnet = Network::BscTestnet.to_profile();
        assert_eq!(testnet.chain_id, 97);
        assert_eq!(testnet.confirmation_depth, 5);
        assert_eq!(testnet.explorer_api_url.as_str(), "https://api.etherscan.io/v2/api");
        assert!(testnet.validate().is_ok());

        let mainnet = Network::BscMainnet.to_profile();
        assert_eq!(mainnet.chain_id, 56);
        assert_eq!(mainnet.native_symbol, "BNB");
        assert!(mainnet.validate().is_ok());
    }

    #[test]
    fn test_network_from_str() {
        assert_eq!(Network::from_str("bsc-testnet").unwrap(), Network::BscTestnet);
        assert_eq!(Network::from_str("bsc-mainnet").unwrap(), Network::BscMainnet);
        assert!(Network::from_str("goerli").is_err());
    }

    #[test]
    fn test_explorer_links() {
        let profile = Network::BscTestnet.to_profile();
        assert_eq!(
            profile.address_url("0xabc"),
            "https://testnet.bscscan.com/address/0xabc"
        );
        assert_eq!(profile.transaction_url("0x01"), "https://testnet.bscscan.com/tx/0x01");
    }

    #[test]
    fn test_load_overrides_preset() {
        let temp_dir = TempDir::new("crypticorn-test").expect("Failed to create temp dir");
        let path = temp_dir.path().join("network.toml");
        std::fs::write(
            &path,
            "name = \"local\"\nchain_id = 31337\nconfirmation_depth = 1\nrpc_url = \"http://localhost:8545/\"\n",
        )
        .expect("Failed to write profile");

        let profile =
            NetworkProfile::load_from_file(&path, Network::BscTestnet).expect("Failed to load");
        assert_eq!(profile.name, "local");
        assert_eq!(profile.chain_id, 31337);
        assert_eq!(profile.confirmation_depth, 1);
        // Untouched keys come from the preset.
        assert_eq!(profile.native_symbol, "tBNB");
    }

    #[test]
    fn test_load_rejects_zero_depth() {
        let temp_dir = TempDir::new("crypticorn-test").expect("Failed to create temp dir");
        let path = temp_dir.path().join("network.toml");
        std::fs::write(&path, "confirmation_depth = 0\n").expect("Failed to write profile");

        assert!(NetworkProfile::load_from_file(&path, Network::BscTestnet).is_err());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new("crypticorn-test").expect("Failed to create temp dir");
        let path = temp_dir.path().join("network.toml");

        let original = Network::BscMainnet.to_profile();
        original.save_to_file(&path).expect("Failed to save");
        let loaded =
            NetworkProfile::load_from_file(&path, Network::BscTestnet).expect("Failed to load");

        assert_eq!(original, loaded);
    }
}
