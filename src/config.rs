use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::news::FeedSource;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Listener address, overridden by `HOST` / `PORT`
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum number of items rendered on the index page
    #[serde(default = "default_news_limit")]
    pub news_limit: usize,
    /// Entries taken from the head of each feed
    #[serde(default = "default_per_feed_limit")]
    pub per_feed_limit: usize,
    #[serde(default = "default_feed_timeout_secs")]
    pub feed_timeout_secs: u64,
    pub feeds: Vec<FeedSource>,
    #[serde(default)]
    pub prices: PriceConfig,
}

fn default_bind() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_news_limit() -> usize {
    100
}

fn default_per_feed_limit() -> usize {
    40
}

fn default_feed_timeout_secs() -> u64 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct PriceConfig {
    #[serde(default = "default_ticker_url")]
    pub ticker_url: String,
    #[serde(default = "default_btc_market")]
    pub btc_market: String,
    #[serde(default = "default_eth_market")]
    pub eth_market: String,
    #[serde(default = "default_price_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub fx: FxSource,
}

impl Default for PriceConfig {
    fn default() -> Self {
        Self {
            ticker_url: default_ticker_url(),
            btc_market: default_btc_market(),
            eth_market: default_eth_market(),
            timeout_secs: default_price_timeout_secs(),
            fx: FxSource::default(),
        }
    }
}

fn default_ticker_url() -> String {
    "https://api.upbit.com/v1/ticker".to_string()
}

fn default_btc_market() -> String {
    "KRW-BTC".to_string()
}

fn default_eth_market() -> String {
    "KRW-ETH".to_string()
}

fn default_price_timeout_secs() -> u64 {
    3
}

/// Where the USD/KRW rate comes from and what its body looks like.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FxSource {
    /// `{"rates": {"KRW": 1350.2}}`
    Rates { url: String },
    /// `[{"currencyCode": "USD", "basePrice": 1350.2}, ...]`
    Records { url: String },
}

impl FxSource {
    pub fn url(&self) -> &str {
        match self {
            FxSource::Rates { url } | FxSource::Records { url } => url,
        }
    }
}

impl Default for FxSource {
    fn default() -> Self {
        FxSource::Rates {
            url: "https://open.er-api.com/v6/latest/USD".to_string(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse config from a TOML string (useful for testing)
    pub fn from_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    pub fn feed_timeout(&self) -> Duration {
        Duration::from_secs(self.feed_timeout_secs)
    }

    /// Bind address with `HOST` and `PORT` applied on top of the file value.
    pub fn bind_addr(&self) -> String {
        self.bind_addr_with(std::env::var("HOST").ok(), std::env::var("PORT").ok())
    }

    fn bind_addr_with(&self, host: Option<String>, port: Option<String>) -> String {
        let (file_host, file_port) = match self.bind.rsplit_once(':') {
            Some((h, p)) => (h, p),
            None => (self.bind.as_str(), "5000"),
        };
        format!(
            "{}:{}",
            host.as_deref().unwrap_or(file_host),
            port.as_deref().unwrap_or(file_port)
        )
    }
}

impl PriceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
