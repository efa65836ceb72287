//! Stability-first market score

use crate::market::MarketRecord;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

const SPREAD_WEIGHT: f64 = 2.0;
const VOLUME_WEIGHT: f64 = 1.0;
const LIQUIDITY_WEIGHT: f64 = 0.5;
const PRICE_CHANGE_PENALTY: f64 = 4.0;
const COMPETITIVENESS_PENALTY: f64 = 1.5;
const CAPITAL_PENALTY: f64 = 0.8;

/// Desirability of a feasible market; higher is better
///
/// ```text
/// 2.0·ln(1 + max_spread·100) + ln(1 + vol24h) + 0.5·ln(1 + liquidity)
///   − 4.0·|one_hour_change| − 1.5·competitiveness − 0.8·(capital / per_market_cap)
/// ```
///
/// Missing stats count as zero. Log arguments are floored at 1 so a bad
/// negative volume cannot turn the score into NaN.
pub fn score(record: &MarketRecord, capital_estimate: Decimal, per_market_cap: Decimal) -> f64 {
    let max_spread = record.rewards_max_spread.to_f64().unwrap_or(0.0);
    let volume = record.volume_24h.unwrap_or(0.0);
    let liquidity = record.liquidity.unwrap_or(0.0);
    let one_hour_change = record.one_hour_price_change.unwrap_or(0.0);
    let competitiveness = record.competitiveness.unwrap_or(0.0);

    let capital_ratio = if per_market_cap > Decimal::ZERO {
        (capital_estimate / per_market_cap).to_f64().unwrap_or(0.0)
    } else {
        0.0
    };

    SPREAD_WEIGHT * ln_1p(max_spread * 100.0)
        + VOLUME_WEIGHT * ln_1p(volume)
        + LIQUIDITY_WEIGHT * ln_1p(liquidity)
        - PRICE_CHANGE_PENALTY * one_hour_change.abs()
        - COMPETITIVENESS_PENALTY * competitiveness
        - CAPITAL_PENALTY * capital_ratio
}

fn ln_1p(x: f64) -> f64 {
    (1.0 + x.max(0.0)).ln()
}
