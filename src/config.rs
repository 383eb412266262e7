//! Configuration management
//!
//! Handles loading of the JSON configuration file with environment variable
//! support for API credentials. Every section has defaults, so a missing file
//! yields a usable testnet configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Binance USD-M futures testnet
pub const TESTNET_BASE_URL: &str = "https://testnet.binancefuture.com";

/// Binance USD-M futures production
pub const MAINNET_BASE_URL: &str = "https://fapi.binance.com";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub twap: TwapConfig,
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default)]
    pub journal: JournalConfig,
}

impl Config {
    /// Load configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        let mut config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;
        config.exchange.load_credentials_from_env();
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise fall back to defaults
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))
        } else {
            let mut config = Config::default();
            config.exchange.load_credentials_from_env();
            Ok(config)
        }
    }
}

/// Exchange connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    /// Credentials are taken from the environment only
    #[serde(skip)]
    pub api_key: Option<String>,
    #[serde(skip)]
    pub api_secret: Option<String>,
    /// Overrides the testnet/mainnet URL, e.g. for a local mock server
    pub base_url: Option<String>,
    /// Trade on production instead of the testnet
    pub mainnet: bool,
    /// Timestamp tolerance sent with every signed request
    pub recv_window_ms: u64,
    pub timeout_secs: u64,
    pub max_requests_per_second: usize,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        ExchangeConfig {
            api_key: None,
            api_secret: None,
            base_url: None,
            mainnet: false,
            recv_window_ms: 60_000,
            timeout_secs: 30,
            max_requests_per_second: 10,
        }
    }
}

impl ExchangeConfig {
    /// Read `BINANCE_API_KEY` / `BINANCE_API_SECRET`
    pub fn load_credentials_from_env(&mut self) {
        if let Ok(api_key) = std::env::var("BINANCE_API_KEY") {
            self.api_key = Some(api_key);
        }
        if let Ok(api_secret) = std::env::var("BINANCE_API_SECRET") {
            self.api_secret = Some(api_secret);
        }
    }

    pub fn resolved_base_url(&self) -> &str {
        match &self.base_url {
            Some(url) => url.as_str(),
            None if self.mainnet => MAINNET_BASE_URL,
            None => TESTNET_BASE_URL,
        }
    }
}

/// TWAP defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TwapConfig {
    /// Decimal places of the exchange quantity step
    pub quantity_precision: u32,
}

impl Default for TwapConfig {
    fn default() -> Self {
        TwapConfig {
            quantity_precision: 3,
        }
    }
}

/// Grid defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Decimal places of the exchange price tick
    pub price_precision: u32,
    pub monitor_interval_secs: u64,
}

impl Default for GridConfig {
    fn default() -> Self {
        GridConfig {
            price_precision: 2,
            monitor_interval_secs: 60,
        }
    }
}

/// Execution journal output
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    /// JSON-lines file receiving every recorded order; in-memory only when unset
    pub path: Option<PathBuf>,
}
