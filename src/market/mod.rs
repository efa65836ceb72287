//! Market discovery module
//!
//! Reward-eligible market records from Polymarket's Gamma API

mod gamma;

pub use gamma::{normalize_rewards_max_spread, GammaClient, GammaConfig, GAMMA_API_URL};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Discovery errors
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Retries exhausted; the selection cycle must abort
    #[error("discovery unavailable after {attempts} attempts: {reason}")]
    Unavailable { attempts: u32, reason: String },
}

/// Immutable snapshot of one market, produced fresh every discovery cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketRecord {
    /// Gamma market id
    pub id: String,
    /// Condition identifier (unique per market)
    pub condition_id: String,
    pub slug: String,
    pub active: bool,
    pub closed: bool,
    pub accepting_orders: bool,
    pub enable_order_book: bool,
    pub restricted: bool,
    /// Minimum order size that earns rewards
    pub rewards_min_size: Decimal,
    /// Maximum distance from midpoint that earns rewards, in price units
    pub rewards_max_spread: Decimal,
    /// Outcome labels, same order as `token_ids`
    pub outcomes: Vec<String>,
    pub token_ids: Vec<String>,
    pub competitiveness: Option<f64>,
    pub one_hour_price_change: Option<f64>,
    pub volume_24h: Option<f64>,
    pub liquidity: Option<f64>,
    pub end_date: Option<DateTime<Utc>>,
    pub tick_size: Option<Decimal>,
    pub min_order_size: Option<Decimal>,
}

impl MarketRecord {
    /// Outcome label paired with its token id
    pub fn outcome_tokens(&self) -> Vec<(String, String)> {
        self.outcomes
            .iter()
            .cloned()
            .zip(self.token_ids.iter().cloned())
            .collect()
    }
}

/// Source of market records for one discovery cycle
///
/// Implementations own pagination and retry; the result is finite and
/// de-duplicated by condition id.
#[async_trait]
pub trait MarketSource: Send + Sync {
    async fn fetch_markets(&self) -> Result<Vec<MarketRecord>, DiscoveryError>;
}
