//! Rotation module
//!
//! Active instrument bookkeeping and the hysteresis rules that decide when
//! a newly ranked candidate may displace an incumbent.

mod controller;

pub use controller::{RejectReason, Rejection, Rotation, RotationController, RotationPlan};

use crate::selection::ScoredMarket;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One currently traded instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveInstrumentState {
    pub condition_id: String,
    pub slug: String,
    /// Fixed for as long as the instrument stays active
    pub entered_at: DateTime<Utc>,
    pub score_at_entry: f64,
    /// (outcome label, token id) pairs
    pub outcome_tokens: Vec<(String, String)>,
}

impl ActiveInstrumentState {
    /// Admit a scored candidate
    pub fn admit(candidate: &ScoredMarket, now: DateTime<Utc>) -> Self {
        Self {
            condition_id: candidate.record.condition_id.clone(),
            slug: candidate.record.slug.clone(),
            entered_at: now,
            score_at_entry: candidate.score,
            outcome_tokens: candidate.record.outcome_tokens(),
        }
    }

    pub fn token_ids(&self) -> impl Iterator<Item = &str> {
        self.outcome_tokens.iter().map(|(_, token)| token.as_str())
    }
}
