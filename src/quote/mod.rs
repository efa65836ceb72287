//! Quote engine module
//!
//! Depth-weighted midpoint proxy and the bid/ask targets derived from it.
//! The churn controller in [`churn`] decides whether a resting order has
//! drifted far enough from its target to be replaced.

pub mod churn;

pub use churn::{ChurnPolicy, ReplaceReason, RestingQuote};

use crate::config::QuoteConfig;
use crate::execution::Side;
use crate::market::MarketRecord;
use crate::orderbook::OrderBook;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::Serialize;

/// Midpoint below which the fine tick applies
const FINE_TICK_THRESHOLD: Decimal = dec!(0.1);
const FINE_TICK: Decimal = dec!(0.001);
const COARSE_TICK: Decimal = dec!(0.01);

/// Quote target for one outcome token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuoteTarget {
    pub midpoint: Decimal,
    pub bid: Decimal,
    pub ask: Decimal,
    pub size: Decimal,
    pub tick_size: Decimal,
}

impl QuoteTarget {
    /// Target price for one side of the book
    pub fn price(&self, side: Side) -> Decimal {
        match side {
            Side::Buy => self.bid,
            Side::Sell => self.ask,
        }
    }
}

/// Size-cutoff midpoint proxy
///
/// Average of the bid and ask prices at which cumulative displayed size
/// first reaches `cutoff`. Absent when either side is too thin.
pub fn compute_midpoint_proxy(book: &OrderBook, cutoff: Decimal) -> Option<Decimal> {
    let bid = book.bid_cutoff_price(cutoff)?;
    let ask = book.ask_cutoff_price(cutoff)?;
    Some((bid + ask) / Decimal::TWO)
}

/// Tick used for rounding: the market's own tick when known
pub fn tick_size(midpoint: Decimal, market_tick: Option<Decimal>) -> Decimal {
    match market_tick {
        Some(tick) if tick > Decimal::ZERO => tick,
        _ if midpoint < FINE_TICK_THRESHOLD => FINE_TICK,
        _ => COARSE_TICK,
    }
}

pub fn round_down_to_tick(price: Decimal, tick: Decimal) -> Decimal {
    (price / tick).floor() * tick
}

pub fn round_up_to_tick(price: Decimal, tick: Decimal) -> Decimal {
    (price / tick).ceil() * tick
}

/// Order size that earns rewards and clears the venue minimum
pub fn target_size(market: &MarketRecord, config: &QuoteConfig) -> Decimal {
    let reward_size = market.rewards_min_size * config.size_buffer;
    let size = match market.min_order_size {
        Some(min) if min > reward_size => min,
        _ => reward_size,
    };
    size.round_dp_with_strategy(2, RoundingStrategy::ToPositiveInfinity)
}

/// Bid/ask targets around a midpoint
///
/// Half-spread is `rewards_max_spread × half_spread_frac`; the bid rounds
/// down and the ask rounds up so both stay on the outside of the target.
pub fn compute_quote_targets(
    midpoint: Decimal,
    market: &MarketRecord,
    config: &QuoteConfig,
) -> QuoteTarget {
    let half_spread = market.rewards_max_spread * config.half_spread_frac;
    let tick = tick_size(midpoint, market.tick_size);

    QuoteTarget {
        midpoint,
        bid: round_down_to_tick(midpoint - half_spread, tick),
        ask: round_up_to_tick(midpoint + half_spread, tick),
        size: target_size(market, config),
        tick_size: tick,
    }
}

/// Midpoint and targets for one token from its book
///
/// `None` disables the token's quotes for the cycle.
pub fn quote_from_book(
    book: &OrderBook,
    market: &MarketRecord,
    config: &QuoteConfig,
) -> Option<QuoteTarget> {
    let midpoint = compute_midpoint_proxy(book, market.rewards_min_size)?;
    Some(compute_quote_targets(midpoint, market, config))
}
