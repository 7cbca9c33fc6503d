//! Crypto and FX price snapshot.
//!
//! Two upstreams are queried independently: a ticker endpoint for the
//! KRW-quoted BTC/ETH markets and an FX endpoint for the USD/KRW rate.
//! A failing upstream only leaves its own fields empty.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Local;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{FxSource, PriceConfig};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Point-in-time prices. Any value may be missing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceSnapshot {
    #[serde(rename = "BTC_KRW")]
    pub btc_krw: Option<f64>,
    #[serde(rename = "ETH_KRW")]
    pub eth_krw: Option<f64>,
    #[serde(rename = "USDKRW")]
    pub usd_krw: Option<f64>,
    #[serde(rename = "timestamp")]
    pub generated_at: String,
}

impl PriceSnapshot {
    pub fn empty() -> Self {
        Self {
            btc_krw: None,
            eth_krw: None,
            usd_krw: None,
            generated_at: Local::now().format(TIMESTAMP_FORMAT).to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PriceError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("no KRW rate in FX response")]
    RateNotFound,
}

/// One entry of the ticker response
#[derive(Debug, Deserialize)]
pub struct Ticker {
    #[serde(default)]
    pub market: Option<String>,
    #[serde(default)]
    pub trade_price: Option<f64>,
}

/// `{"rates": {"KRW": 1350.2, ...}}`; other currencies may be null
#[derive(Debug, Deserialize)]
struct RatesResponse {
    rates: HashMap<String, Option<f64>>,
}

/// Per-currency FX record. Field names differ between providers, and some
/// send several of them at once (`code` next to `currencyCode`).
#[derive(Debug, Deserialize)]
struct FxRecord {
    #[serde(rename = "currencyCode")]
    currency_code: Option<String>,
    cur_unit: Option<String>,
    code: Option<String>,
    #[serde(rename = "basePrice")]
    base_price: Option<RateValue>,
    deal_bas_r: Option<RateValue>,
    rate: Option<RateValue>,
}

impl FxRecord {
    fn currency(&self) -> &str {
        self.currency_code
            .as_deref()
            .or(self.cur_unit.as_deref())
            .or(self.code.as_deref())
            .unwrap_or("")
    }

    fn krw_rate(&self) -> Option<f64> {
        self.base_price
            .as_ref()
            .or(self.deal_bas_r.as_ref())
            .or(self.rate.as_ref())
            .and_then(RateValue::as_f64)
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RateValue {
    Number(f64),
    Text(String),
}

impl RateValue {
    fn as_f64(&self) -> Option<f64> {
        match self {
            RateValue::Number(n) => Some(*n),
            RateValue::Text(s) => s.replace(',', "").trim().parse().ok(),
        }
    }
}

pub struct PriceAggregator {
    client: Client,
    ticker_url: String,
    btc_market: String,
    eth_market: String,
    fx: FxSource,
    timeout: Duration,
}

impl PriceAggregator {
    pub fn new(client: Client, config: &PriceConfig) -> Self {
        Self {
            client,
            ticker_url: config.ticker_url.clone(),
            btc_market: config.btc_market.clone(),
            eth_market: config.eth_market.clone(),
            fx: config.fx.clone(),
            timeout: config.timeout(),
        }
    }

    /// Build a snapshot from whatever upstreams answer. Never fails.
    pub async fn fetch_prices(&self) -> PriceSnapshot {
        let mut snapshot = PriceSnapshot::empty();

        match self.fetch_tickers().await {
            Ok(tickers) => {
                snapshot.btc_krw = trade_price(&tickers, &self.btc_market);
                snapshot.eth_krw = trade_price(&tickers, &self.eth_market);
            }
            Err(e) => warn!("Ticker request to {} failed: {}", self.ticker_url, e),
        }

        match self.fetch_usd_krw().await {
            Ok(rate) => snapshot.usd_krw = Some(rate),
            Err(e) => warn!("FX request to {} failed: {}", self.fx.url(), e),
        }

        info!(
            "Price snapshot: BTC={:?} ETH={:?} USD={:?}",
            snapshot.btc_krw, snapshot.eth_krw, snapshot.usd_krw
        );
        snapshot
    }

    pub async fn fetch_tickers(&self) -> Result<Vec<Ticker>, PriceError> {
        let markets = format!("{},{}", self.btc_market, self.eth_market);
        let body = self
            .client
            .get(&self.ticker_url)
            .query(&[("markets", markets.as_str())])
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        parse_tickers(&body)
    }

    pub async fn fetch_usd_krw(&self) -> Result<f64, PriceError> {
        let body = self
            .client
            .get(self.fx.url())
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        extract_usd_krw(&self.fx, &body)
    }
}

pub fn parse_tickers(body: &[u8]) -> Result<Vec<Ticker>, PriceError> {
    Ok(serde_json::from_slice(body)?)
}

pub fn trade_price(tickers: &[Ticker], market: &str) -> Option<f64> {
    tickers
        .iter()
        .find(|t| t.market.as_deref() == Some(market))
        .and_then(|t| t.trade_price)
}

/// Locate the KRW price of one US dollar in an FX response body.
pub fn extract_usd_krw(source: &FxSource, body: &[u8]) -> Result<f64, PriceError> {
    match source {
        FxSource::Rates { .. } => {
            let response: RatesResponse = serde_json::from_slice(body)?;
            response
                .rates
                .get("KRW")
                .copied()
                .flatten()
                .ok_or(PriceError::RateNotFound)
        }
        FxSource::Records { .. } => {
            let records: Vec<FxRecord> = serde_json::from_slice(body)?;
            records
                .iter()
                .find(|r| r.currency().starts_with("USD"))
                .and_then(FxRecord::krw_rate)
                .ok_or(PriceError::RateNotFound)
        }
    }
}
