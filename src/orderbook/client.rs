//! Polymarket CLOB REST client for order book snapshots
//!
//! Fetches `GET /book?token_id=` and converts the response into an
//! [`OrderBook`]. Wire order of levels is not trusted; both sides are
//! re-sorted best first.

use super::{BookError, BookSource, OrderBook, PriceLevel};
use crate::config::NetConfig;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;

/// Polymarket CLOB REST base URL
pub const CLOB_API_URL: &str = "https://clob.polymarket.com";

/// Configuration for the CLOB book client
#[derive(Debug, Clone)]
pub struct ClobConfig {
    /// Base URL for the CLOB API
    pub base_url: String,
    /// Request timeout
    pub timeout: Duration,
    /// Retries per snapshot before reporting unavailable
    pub max_retries: u32,
    net: NetConfig,
}

impl Default for ClobConfig {
    fn default() -> Self {
        Self::from_net(&NetConfig::default())
    }
}

impl ClobConfig {
    pub fn from_net(net: &NetConfig) -> Self {
        Self {
            base_url: net.clob_url.clone(),
            timeout: net.request_timeout(),
            max_retries: net.max_retries,
            net: net.clone(),
        }
    }
}

/// REST client for CLOB order book snapshots
pub struct ClobBookClient {
    config: ClobConfig,
    client: Client,
}

impl ClobBookClient {
    /// Create a new client with default configuration
    pub fn new() -> Self {
        Self::with_config(ClobConfig::default())
    }

    /// Create a new client with custom configuration
    pub fn with_config(config: ClobConfig) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Failed to build HTTP client, using defaults");
                Client::new()
            });

        Self { config, client }
    }

    async fn fetch_once(&self, token_id: &str) -> anyhow::Result<OrderBook> {
        let url = format!("{}/book", self.config.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[("token_id", token_id)])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("CLOB API error: {} - {}", status, body);
        }

        let raw: BookResponse = response.json().await?;
        Ok(raw.into_order_book(token_id))
    }
}

impl Default for ClobBookClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BookSource for ClobBookClient {
    async fn fetch_book(&self, token_id: &str) -> Result<OrderBook, BookError> {
        let mut attempt = 0;
        loop {
            match self.fetch_once(token_id).await {
                Ok(book) => {
                    tracing::trace!(
                        token_id,
                        bid_count = book.bids.len(),
                        ask_count = book.asks.len(),
                        best_bid = ?book.best_bid(),
                        best_ask = ?book.best_ask(),
                        "Fetched order book"
                    );
                    return Ok(book);
                }
                Err(e) => {
                    attempt += 1;
                    if attempt > self.config.max_retries {
                        return Err(BookError::Unavailable {
                            token_id: token_id.to_string(),
                            reason: e.to_string(),
                        });
                    }
                    let delay = self.config.net.backoff(attempt);
                    tracing::debug!(error = %e, token_id, attempt, "Book fetch failed, retrying");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// Order book snapshot as returned by the CLOB
#[derive(Debug, Deserialize)]
struct BookResponse {
    #[serde(default)]
    asset_id: Option<String>,
    #[serde(default)]
    bids: Vec<BookLevel>,
    #[serde(default)]
    asks: Vec<BookLevel>,
    #[serde(default)]
    timestamp: Option<String>,
}

/// Price level in the order book
#[derive(Debug, Deserialize)]
struct BookLevel {
    price: String,
    size: String,
}

impl BookLevel {
    fn parse(&self) -> Option<PriceLevel> {
        let price = Decimal::from_str(&self.price).ok()?;
        let size = Decimal::from_str(&self.size).ok()?;
        Some(PriceLevel { price, size })
    }
}

impl BookResponse {
    fn into_order_book(self, requested_token: &str) -> OrderBook {
        let bids = self.bids.iter().filter_map(BookLevel::parse).collect();
        let asks = self.asks.iter().filter_map(BookLevel::parse).collect();

        // Milliseconds since epoch
        let updated_at = self
            .timestamp
            .as_deref()
            .and_then(|ts| ts.parse::<i64>().ok())
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
            .unwrap_or_else(Utc::now);

        let token_id = self.asset_id.unwrap_or_else(|| requested_token.to_string());
        OrderBook::from_levels(token_id, bids, asks, updated_at)
    }
}
