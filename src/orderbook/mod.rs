//! Order book module
//!
//! Per-token depth snapshots from the Polymarket CLOB

mod book;
mod client;

pub use book::OrderBook;
pub use client::{ClobBookClient, ClobConfig, CLOB_API_URL};

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A price level in the order book
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    /// Price at this level
    pub price: Decimal,
    /// Total size available
    pub size: Decimal,
}

/// Order book errors
#[derive(Debug, Error)]
pub enum BookError {
    /// Snapshot could not be fetched after retries; quotes for the token
    /// are disabled for the cycle
    #[error("order book unavailable for {token_id}: {reason}")]
    Unavailable { token_id: String, reason: String },
}

/// Source of order book snapshots
#[async_trait]
pub trait BookSource: Send + Sync {
    async fn fetch_book(&self, token_id: &str) -> Result<OrderBook, BookError>;
}
