//! Gamma API client for market discovery
//!
//! Pages through every open market on Polymarket's Gamma API and converts
//! each raw record into a [`MarketRecord`]. Gamma is loose with types:
//! lists arrive as JSON-encoded strings and numbers sometimes arrive as
//! strings, so the raw record keeps those fields as `serde_json::Value`
//! and the conversion step parses them.

use super::{DiscoveryError, MarketRecord, MarketSource};
use crate::config::NetConfig;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;

/// Gamma API base URL
pub const GAMMA_API_URL: &str = "https://gamma-api.polymarket.com";

/// Configuration for the Gamma client
#[derive(Debug, Clone)]
pub struct GammaConfig {
    /// Base URL for the Gamma API
    pub base_url: String,
    /// Request timeout
    pub timeout: Duration,
    /// Markets per page
    pub page_limit: usize,
    /// Safety bound on pages per discovery cycle
    pub max_pages: usize,
    /// Retries per page before giving up
    pub max_retries: u32,
    net: NetConfig,
}

impl Default for GammaConfig {
    fn default() -> Self {
        Self::from_net(&NetConfig::default())
    }
}

impl GammaConfig {
    pub fn from_net(net: &NetConfig) -> Self {
        Self {
            base_url: net.gamma_url.clone(),
            timeout: net.request_timeout(),
            page_limit: net.page_limit,
            max_pages: 500,
            max_retries: net.max_retries,
            net: net.clone(),
        }
    }
}

/// Client for Polymarket's Gamma API
pub struct GammaClient {
    config: GammaConfig,
    client: Client,
}

impl GammaClient {
    /// Create a new Gamma API client with default configuration
    pub fn new() -> Self {
        Self::with_config(GammaConfig::default())
    }

    /// Create a new client with custom configuration
    pub fn with_config(config: GammaConfig) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Failed to build HTTP client, using defaults");
                Client::new()
            });

        Self { config, client }
    }

    /// Fetch every open market, de-duplicated by condition id
    pub async fn fetch_all(&self) -> Result<Vec<MarketRecord>, DiscoveryError> {
        let mut records = Vec::new();
        let mut seen = HashSet::new();
        let mut offset = 0;

        for _ in 0..self.config.max_pages {
            let page = self.fetch_page_with_retry(offset).await?;
            if page.is_empty() {
                break;
            }
            offset += page.len();

            for raw in page {
                match raw.into_record() {
                    Some(record) => {
                        if seen.insert(record.condition_id.clone()) {
                            records.push(record);
                        }
                    }
                    None => tracing::debug!("Skipping Gamma market without condition id or slug"),
                }
            }
        }

        tracing::info!(fetched = records.len(), "Fetched markets from Gamma API");
        Ok(records)
    }

    /// Fetch up to `n` markets from the first pages (smoke test)
    pub async fn fetch_first(&self, n: usize) -> Result<Vec<MarketRecord>, DiscoveryError> {
        let mut records = Vec::new();
        let mut offset = 0;
        while records.len() < n {
            let page = self.fetch_page_with_retry(offset).await?;
            if page.is_empty() {
                break;
            }
            offset += page.len();
            records.extend(page.into_iter().filter_map(GammaMarket::into_record));
        }
        records.truncate(n);
        Ok(records)
    }

    async fn fetch_page_with_retry(
        &self,
        offset: usize,
    ) -> Result<Vec<GammaMarket>, DiscoveryError> {
        let mut attempt = 0;
        loop {
            match self.fetch_page(offset).await {
                Ok(page) => return Ok(page),
                Err(e) => {
                    attempt += 1;
                    if attempt > self.config.max_retries {
                        tracing::error!(
                            error = %e,
                            offset,
                            attempts = attempt,
                            "Gamma page fetch failed"
                        );
                        return Err(DiscoveryError::Unavailable {
                            attempts: attempt,
                            reason: e.to_string(),
                        });
                    }
                    let delay = self.config.net.backoff(attempt);
                    tracing::warn!(
                        error = %e,
                        offset,
                        attempt,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Gamma request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn fetch_page(&self, offset: usize) -> anyhow::Result<Vec<GammaMarket>> {
        let url = format!("{}/markets", self.config.base_url);

        tracing::debug!(
            url = %url,
            offset,
            limit = self.config.page_limit,
            "Fetching Gamma markets page"
        );

        let response = self
            .client
            .get(&url)
            .query(&[
                ("limit", self.config.page_limit.to_string()),
                ("offset", offset.to_string()),
                ("closed", "false".to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Gamma API error: {} - {}", status, body);
        }

        Ok(response.json().await?)
    }
}

impl Default for GammaClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarketSource for GammaClient {
    async fn fetch_markets(&self) -> Result<Vec<MarketRecord>, DiscoveryError> {
        self.fetch_all().await
    }
}

/// Reward spread in price units; values above 1 are cents
pub fn normalize_rewards_max_spread(value: Decimal) -> Decimal {
    if value > Decimal::ONE {
        value / Decimal::ONE_HUNDRED
    } else {
        value
    }
}

/// Raw market response from Gamma API
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GammaMarket {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    slug: Option<String>,
    #[serde(default)]
    condition_id: Option<String>,
    #[serde(default)]
    active: Value,
    #[serde(default)]
    closed: Value,
    #[serde(default)]
    accepting_orders: Value,
    #[serde(default)]
    enable_order_book: Value,
    #[serde(default)]
    restricted: Value,
    #[serde(default)]
    rewards_min_size: Value,
    #[serde(default)]
    rewards_max_spread: Value,
    #[serde(default)]
    outcomes: Value,
    #[serde(default)]
    clob_token_ids: Value,
    #[serde(default)]
    competitive: Value,
    #[serde(default)]
    one_hour_price_change: Value,
    #[serde(default)]
    volume24hr_clob: Value,
    #[serde(default)]
    liquidity_clob: Value,
    #[serde(default)]
    end_date: Option<String>,
    #[serde(default)]
    order_price_min_tick_size: Value,
    #[serde(default)]
    order_min_size: Value,
}

impl GammaMarket {
    /// Convert to a [`MarketRecord`]; reward spread normalization happens here and only here
    fn into_record(self) -> Option<MarketRecord> {
        let condition_id = self.condition_id.filter(|c| !c.is_empty())?;
        let slug = self.slug.filter(|s| !s.is_empty())?;

        let rewards_max_spread = normalize_rewards_max_spread(
            value_decimal(&self.rewards_max_spread).unwrap_or(Decimal::ZERO),
        );

        Some(MarketRecord {
            id: match &self.id {
                Value::String(s) => s.clone(),
                Value::Null => condition_id.clone(),
                other => other.to_string(),
            },
            condition_id,
            slug,
            active: value_bool(&self.active).unwrap_or(false),
            closed: value_bool(&self.closed).unwrap_or(false),
            accepting_orders: value_bool(&self.accepting_orders).unwrap_or(false),
            enable_order_book: value_bool(&self.enable_order_book).unwrap_or(false),
            restricted: value_bool(&self.restricted).unwrap_or(false),
            rewards_min_size: value_decimal(&self.rewards_min_size).unwrap_or(Decimal::ZERO),
            rewards_max_spread,
            outcomes: value_string_list(&self.outcomes),
            token_ids: value_string_list(&self.clob_token_ids),
            competitiveness: value_f64(&self.competitive),
            one_hour_price_change: value_f64(&self.one_hour_price_change),
            volume_24h: value_f64(&self.volume24hr_clob),
            liquidity: value_f64(&self.liquidity_clob),
            end_date: self.end_date.as_deref().and_then(parse_end_date),
            tick_size: value_decimal(&self.order_price_min_tick_size)
                .filter(|t| *t > Decimal::ZERO),
            min_order_size: value_decimal(&self.order_min_size),
        })
    }
}

fn value_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_f64(value: &Value) -> Option<f64> {
    let parsed: Option<f64> = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

fn value_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .ok()
            .or_else(|| n.as_f64().and_then(Decimal::from_f64)),
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

/// Accepts a JSON array or a string holding a JSON-encoded array
fn value_string_list(value: &Value) -> Vec<String> {
    let items = match value {
        Value::Array(items) => items.clone(),
        Value::String(s) => match serde_json::from_str::<Vec<Value>>(s) {
            Ok(items) => items,
            Err(_) => return vec![],
        },
        _ => return vec![],
    };

    items
        .into_iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .collect()
}

fn parse_end_date(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
