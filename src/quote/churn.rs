//! Churn controller
//!
//! A resting order is left alone unless it has fallen out of the reward
//! band, drifted a material number of ticks from its target, or shrunk
//! below the reward minimum through partial fills.

use super::QuoteTarget;
use crate::config::QuoteConfig;
use crate::execution::Side;
use crate::market::MarketRecord;
use rust_decimal::Decimal;
use serde::Serialize;

/// Why a resting order must be replaced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplaceReason {
    /// Further from the midpoint than the reward spread
    OutOfBand,
    /// Price at least `update_min_ticks` ticks from target
    MaterialMove,
    /// Remaining size below the reward minimum
    SizeShortfall,
}

/// Price and remaining size of an order on the book
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestingQuote {
    pub price: Decimal,
    pub remaining_size: Decimal,
}

/// Per-instrument replacement thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChurnPolicy {
    pub rewards_max_spread: Decimal,
    pub rewards_min_size: Decimal,
    pub update_min_ticks: u32,
}

impl ChurnPolicy {
    pub fn new(market: &MarketRecord, config: &QuoteConfig) -> Self {
        Self {
            rewards_max_spread: market.rewards_max_spread,
            rewards_min_size: market.rewards_min_size,
            update_min_ticks: config.update_min_ticks,
        }
    }

    /// First condition forcing a replace, checked per side
    pub fn replace_reason(
        &self,
        current: &RestingQuote,
        target: &QuoteTarget,
        side: Side,
    ) -> Option<ReplaceReason> {
        if (current.price - target.midpoint).abs() > self.rewards_max_spread {
            return Some(ReplaceReason::OutOfBand);
        }
        let threshold = Decimal::from(self.update_min_ticks) * target.tick_size;
        if (current.price - target.price(side)).abs() >= threshold {
            return Some(ReplaceReason::MaterialMove);
        }
        if current.remaining_size < self.rewards_min_size {
            return Some(ReplaceReason::SizeShortfall);
        }
        None
    }

    pub fn needs_replace(&self, current: &RestingQuote, target: &QuoteTarget, side: Side) -> bool {
        self.replace_reason(current, target, side).is_some()
    }

    /// Within the reward spread of the midpoint with at least the reward size
    pub fn is_in_band(&self, price: Decimal, size: Decimal, midpoint: Decimal) -> bool {
        (price - midpoint).abs() <= self.rewards_max_spread && size >= self.rewards_min_size
    }

    /// An order may only be created if it is in band and a valid price
    pub fn is_placeable(&self, price: Decimal, size: Decimal, midpoint: Decimal) -> bool {
        price > Decimal::ZERO && price < Decimal::ONE && self.is_in_band(price, size, midpoint)
    }
}
