//! # Node Configuration
//!
//! One TOML file, every section optional. Missing keys fall back to the
//! protocol defaults.
//!
//! ```toml
//! [api]
//! port = 9741
//!
//! [protection]
//! min_delay_blocks = 2
//! reveal_poll_interval_ms = 2000
//!
//! [detector]
//! reference_gas_price_gwei = 25
//!
//! [devnet]
//! block_time_ms = 2000
//!
//! [keys]
//! proving_key = "keys/proving.key"
//! verifying_key = "keys/verifying.key"
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ethers_core::types::Address;
use serde::{Deserialize, Serialize};

use zkmev_protocol::config::{DetectorConfig, ProtectionConfig};

pub const DEFAULT_API_PORT: u16 = 9741;
pub const DEFAULT_METRICS_PORT: u16 = 9742;
/// Devnet block cadence. Roughly mainnet's.
pub const DEFAULT_BLOCK_TIME_MS: u64 = 12_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: DEFAULT_API_PORT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub host: String,
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: DEFAULT_METRICS_PORT,
        }
    }
}

/// The in-process protector contract and its block clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DevnetConfig {
    pub block_time_ms: u64,
    /// Contract owner (fee updates, withdrawals).
    pub owner: Address,
    /// Account the node submits commitments and reveals from.
    pub account: Address,
}

impl Default for DevnetConfig {
    fn default() -> Self {
        Self {
            block_time_ms: DEFAULT_BLOCK_TIME_MS,
            owner: Address::repeat_byte(0x01),
            account: Address::repeat_byte(0x02),
        }
    }
}

/// Key files written by `zkmev-node setup`. Without them the node runs an
/// ephemeral setup at startup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeysConfig {
    pub proving_key: Option<PathBuf>,
    pub verifying_key: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// JSON-lines file MEV events are appended to.
    pub path: Option<PathBuf>,
    pub alert_channel_capacity: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            path: None,
            alert_channel_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub network: String,
    pub auto_reveal: bool,
    pub api: ApiConfig,
    pub metrics: MetricsConfig,
    pub protection: ProtectionConfig,
    pub detector: DetectorConfig,
    pub devnet: DevnetConfig,
    pub keys: KeysConfig,
    pub audit: AuditConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            network: "devnet".into(),
            auto_reveal: true,
            api: ApiConfig::default(),
            metrics: MetricsConfig::default(),
            protection: ProtectionConfig::default(),
            detector: DetectorConfig::default(),
            devnet: DevnetConfig::default(),
            keys: KeysConfig::default(),
            audit: AuditConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Read and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: NodeConfig = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.protection.validate().context("invalid [protection] section")?;
        self.detector.validate().context("invalid [detector] section")?;
        if self.devnet.block_time_ms == 0 {
            anyhow::bail!("[devnet] block_time_ms must be positive");
        }
        if self.keys.proving_key.is_some() != self.keys.verifying_key.is_some() {
            anyhow::bail!("[keys] proving_key and verifying_key must be set together");
        }
        Ok(())
    }

    pub fn api_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.api.host, self.api.port)
            .parse()
            .with_context(|| format!("invalid API address {}:{}", self.api.host, self.api.port))
    }

    pub fn metrics_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.metrics.host, self.metrics.port)
            .parse()
            .with_context(|| format!("invalid metrics address {}:{}", self.metrics.host, self.metrics.port))
    }
}
