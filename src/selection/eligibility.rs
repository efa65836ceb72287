//! Reward eligibility filter

use crate::config::FilterConfig;
use crate::market::MarketRecord;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

/// Why a market is not reward-eligible
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Ineligible {
    NotActive,
    Closed,
    NotAcceptingOrders,
    NoOrderBook,
    NoRewardSize,
    NoRewardSpread,
    Restricted,
    ExpiresTooSoon,
    LowVolume,
}

impl Ineligible {
    pub fn as_str(&self) -> &'static str {
        match self {
            Ineligible::NotActive => "not_active",
            Ineligible::Closed => "closed",
            Ineligible::NotAcceptingOrders => "not_accepting_orders",
            Ineligible::NoOrderBook => "no_order_book",
            Ineligible::NoRewardSize => "no_reward_size",
            Ineligible::NoRewardSpread => "no_reward_spread",
            Ineligible::Restricted => "restricted",
            Ineligible::ExpiresTooSoon => "expires_too_soon",
            Ineligible::LowVolume => "low_volume",
        }
    }
}

/// First failing eligibility condition, if any
///
/// A market without an end date has no known expiry and passes the
/// expiry check. Missing volume counts as zero.
pub fn check(
    record: &MarketRecord,
    filter: &FilterConfig,
    now: DateTime<Utc>,
) -> Result<(), Ineligible> {
    if !record.active {
        return Err(Ineligible::NotActive);
    }
    if record.closed {
        return Err(Ineligible::Closed);
    }
    if !record.accepting_orders {
        return Err(Ineligible::NotAcceptingOrders);
    }
    if !record.enable_order_book {
        return Err(Ineligible::NoOrderBook);
    }
    if record.rewards_min_size <= Decimal::ZERO {
        return Err(Ineligible::NoRewardSize);
    }
    if record.rewards_max_spread <= Decimal::ZERO {
        return Err(Ineligible::NoRewardSpread);
    }
    if filter.exclude_restricted && record.restricted {
        return Err(Ineligible::Restricted);
    }
    if let Some(end) = record.end_date {
        let buffer = Duration::try_days(filter.end_date_buffer_days).unwrap_or(Duration::MAX);
        if end - now <= buffer {
            return Err(Ineligible::ExpiresTooSoon);
        }
    }
    if record.volume_24h.unwrap_or(0.0) < filter.min_volume24h {
        return Err(Ineligible::LowVolume);
    }
    Ok(())
}

/// Is the market reward-eligible
pub fn is_eligible(record: &MarketRecord, filter: &FilterConfig, now: DateTime<Utc>) -> bool {
    check(record, filter, now).is_ok()
}
