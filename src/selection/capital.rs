//! Capital feasibility gate

use crate::config::Config;
use crate::market::MarketRecord;
use rust_decimal::Decimal;
use serde::Serialize;

/// Standing-order multiple: four quotes per market, with buffer
const CAPITAL_MULTIPLE: Decimal = Decimal::from_parts(3, 0, 0, false, 0);

/// Capital needed by one market against the per-market budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CapitalEstimate {
    pub capital_estimate: Decimal,
    pub per_market_cap: Decimal,
    pub feasible: bool,
}

/// Budget available to each instrument
pub fn per_market_cap(config: &Config) -> Decimal {
    let usable = config.capital.total_cap_usdc * config.capital.usable_cap_frac;
    usable / Decimal::from(config.capital.num_markets.max(1))
}

/// Does the market fit the per-market capital budget
pub fn estimate(record: &MarketRecord, config: &Config) -> CapitalEstimate {
    let quantity = config.quote.size_buffer * record.rewards_min_size;
    let capital_estimate = CAPITAL_MULTIPLE * quantity;
    let per_market_cap = per_market_cap(config);

    CapitalEstimate {
        capital_estimate,
        per_market_cap,
        feasible: capital_estimate <= per_market_cap,
    }
}
