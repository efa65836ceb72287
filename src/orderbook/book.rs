//! Order book snapshot

use super::PriceLevel;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// L2 aggregated order book for a token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBook {
    /// Token identifier
    pub token_id: String,
    /// Bid levels, sorted best (highest) to worst
    pub bids: Vec<PriceLevel>,
    /// Ask levels, sorted best (lowest) to worst
    pub asks: Vec<PriceLevel>,
    /// Snapshot timestamp
    pub updated_at: DateTime<Utc>,
}

impl OrderBook {
    /// Create a new empty order book
    pub fn new(token_id: impl Into<String>) -> Self {
        Self {
            token_id: token_id.into(),
            bids: vec![],
            asks: vec![],
            updated_at: Utc::now(),
        }
    }

    /// Build a book from levels in any order, sorting each side best first
    ///
    /// Levels with non-positive size carry no depth and are dropped.
    pub fn from_levels(
        token_id: impl Into<String>,
        mut bids: Vec<PriceLevel>,
        mut asks: Vec<PriceLevel>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        bids.retain(|l| l.size > Decimal::ZERO);
        asks.retain(|l| l.size > Decimal::ZERO);
        bids.sort_by(|a, b| b.price.cmp(&a.price));
        asks.sort_by(|a, b| a.price.cmp(&b.price));

        Self {
            token_id: token_id.into(),
            bids,
            asks,
            updated_at,
        }
    }

    /// Get best bid price
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.first().map(|l| l.price)
    }

    /// Get best ask price
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first().map(|l| l.price)
    }

    /// Bid price at which cumulative bid size first reaches `cutoff`
    pub fn bid_cutoff_price(&self, cutoff: Decimal) -> Option<Decimal> {
        cutoff_price(&self.bids, cutoff)
    }

    /// Ask price at which cumulative ask size first reaches `cutoff`
    pub fn ask_cutoff_price(&self, cutoff: Decimal) -> Option<Decimal> {
        cutoff_price(&self.asks, cutoff)
    }
}

fn cutoff_price(levels: &[PriceLevel], cutoff: Decimal) -> Option<Decimal> {
    let mut cumulative = Decimal::ZERO;
    for level in levels {
        cumulative += level.size;
        if cumulative >= cutoff {
            return Some(level.price);
        }
    }
    None
}
