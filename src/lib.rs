//! Econ News - economic headlines and KRW price snapshot
//!
//! This crate merges several RSS feeds into one time-sorted news page and
//! serves a JSON snapshot of BTC, ETH and USD prices in KRW. Everything is
//! fetched on demand per request; nothing is stored.

pub mod config;
pub mod news;
pub mod prices;
pub mod routes;

/// Shared client for feeds and price upstreams. Timeouts are set per request.
pub fn http_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent("EconNews/1.0 (RSS Aggregator)")
        .build()
}
