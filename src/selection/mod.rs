//! Market selection module
//!
//! Eligibility filter, capital feasibility gate, stability score and the
//! ranked top-N selector that composes them.

pub mod capital;
pub mod eligibility;
pub mod score;

pub use capital::{estimate, per_market_cap, CapitalEstimate};
pub use eligibility::{check, is_eligible, Ineligible};
pub use score::score;

use crate::config::Config;
use crate::market::MarketRecord;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::cmp::Ordering;
use thiserror::Error;

/// Selection errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("insufficient candidates: needed {needed}, found {available}")]
    InsufficientCandidates { needed: usize, available: usize },
}

/// Eligible, feasible market with its derived score
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredMarket {
    pub record: MarketRecord,
    pub capital_estimate: Decimal,
    pub per_market_cap: Decimal,
    pub score: f64,
}

impl ScoredMarket {
    pub fn condition_id(&self) -> &str {
        &self.record.condition_id
    }

    pub fn slug(&self) -> &str {
        &self.record.slug
    }
}

/// All feasible candidates of one cycle, best first
#[derive(Debug, Clone, Default)]
pub struct Ranking {
    /// Records seen by the cycle
    pub fetched: usize,
    /// Records passing the eligibility filter
    pub eligible: usize,
    /// Scored candidates in descending score order
    pub ranked: Vec<ScoredMarket>,
}

impl Ranking {
    /// First `n` candidates, or fewer when the ranking is short
    pub fn top(&self, n: usize) -> &[ScoredMarket] {
        &self.ranked[..n.min(self.ranked.len())]
    }

    /// Exactly `n` candidates
    pub fn require(&self, n: usize) -> Result<&[ScoredMarket], SelectionError> {
        if self.ranked.len() < n {
            return Err(SelectionError::InsufficientCandidates {
                needed: n,
                available: self.ranked.len(),
            });
        }
        Ok(&self.ranked[..n])
    }

    /// Candidate by condition id
    pub fn get(&self, condition_id: &str) -> Option<&ScoredMarket> {
        self.ranked.iter().find(|m| m.condition_id() == condition_id)
    }
}

/// Filter, gate, score and rank every record
///
/// Infeasible markets are dropped before scoring. Ordering is descending
/// score, then slug, then condition id, so identical input always yields
/// the identical ranking.
pub fn rank_candidates(records: &[MarketRecord], config: &Config, now: DateTime<Utc>) -> Ranking {
    let mut eligible = 0usize;
    let mut ranked = Vec::new();

    for record in records {
        if !is_eligible(record, &config.filter, now) {
            continue;
        }
        eligible += 1;

        let cap = estimate(record, config);
        if !cap.feasible {
            tracing::debug!(
                slug = %record.slug,
                capital_estimate = %cap.capital_estimate,
                per_market_cap = %cap.per_market_cap,
                "Dropping infeasible market"
            );
            continue;
        }

        ranked.push(ScoredMarket {
            score: score(record, cap.capital_estimate, cap.per_market_cap),
            record: record.clone(),
            capital_estimate: cap.capital_estimate,
            per_market_cap: cap.per_market_cap,
        });
    }

    ranked.sort_by(compare_ranked);

    Ranking {
        fetched: records.len(),
        eligible,
        ranked,
    }
}

/// Top `n` candidates, failing when fewer than `n` exist
pub fn select_top(
    records: &[MarketRecord],
    config: &Config,
    n: usize,
    now: DateTime<Utc>,
) -> Result<Vec<ScoredMarket>, SelectionError> {
    rank_candidates(records, config, now)
        .require(n)
        .map(|top| top.to_vec())
}

fn compare_ranked(a: &ScoredMarket, b: &ScoredMarket) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.record.slug.cmp(&b.record.slug))
        .then_with(|| a.record.condition_id.cmp(&b.record.condition_id))
}
