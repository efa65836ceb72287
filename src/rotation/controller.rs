//! Hysteresis rotation controller
//!
//! Pure: [`RotationController::evaluate`] reads the ranking and the active
//! set and returns a plan. Applying the plan is the orchestrator's job.

use super::ActiveInstrumentState;
use crate::config::RotationConfig;
use crate::selection::ScoredMarket;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashSet;

/// Why a displacement was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Global cooldown since the last rotation has not elapsed
    Cooldown,
    /// Incumbent has not served its minimum tenure
    Tenure,
    /// Candidate does not clear the incumbent's entry score bar
    Score,
    /// Incumbent's orders cannot be confirmed cancellable
    ShutdownSafety,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::Cooldown => "cooldown",
            RejectReason::Tenure => "tenure",
            RejectReason::Score => "score",
            RejectReason::ShutdownSafety => "shutdown_safety",
        }
    }
}

/// A refused (candidate, incumbent) pair
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rejection {
    pub candidate: String,
    pub candidate_score: f64,
    pub incumbent: String,
    pub incumbent_entry_score: f64,
    pub reason: RejectReason,
}

/// An accepted displacement
#[derive(Debug, Clone, PartialEq)]
pub struct Rotation {
    pub evicted: ActiveInstrumentState,
    pub admitted: ScoredMarket,
}

/// Outcome of one evaluation
#[derive(Debug, Clone, Default)]
pub struct RotationPlan {
    /// Candidates admitted into vacancies, best first
    pub fills: Vec<ScoredMarket>,
    /// At most one displacement per evaluation
    pub rotation: Option<Rotation>,
    pub rejections: Vec<Rejection>,
}

impl RotationPlan {
    pub fn is_empty(&self) -> bool {
        self.fills.is_empty() && self.rotation.is_none()
    }
}

/// Rotation hysteresis rules
#[derive(Debug, Clone)]
pub struct RotationController {
    cooldown: Duration,
    min_tenure: Duration,
    multiplier: f64,
}

impl RotationController {
    pub fn new(config: &RotationConfig) -> Self {
        Self {
            cooldown: seconds(config.rotation_cooldown_sec),
            min_tenure: seconds(config.min_tenure_sec),
            multiplier: config.score_replace_multiplier,
        }
    }

    /// Score a candidate must reach to displace `incumbent`
    ///
    /// `entry × multiplier` for positive entry scores. The margin is taken
    /// on the magnitude so a negative entry score still demands a strictly
    /// better candidate.
    pub fn required_score(&self, incumbent: &ActiveInstrumentState) -> f64 {
        let entry = incumbent.score_at_entry;
        entry + entry.abs() * (self.multiplier - 1.0)
    }

    /// First condition refusing this displacement, if any
    pub fn check(
        &self,
        candidate: &ScoredMarket,
        incumbent: &ActiveInstrumentState,
        last_rotation: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        shutdown_safe: bool,
    ) -> Option<RejectReason> {
        if let Some(last) = last_rotation {
            if now - last < self.cooldown {
                return Some(RejectReason::Cooldown);
            }
        }
        if now - incumbent.entered_at < self.min_tenure {
            return Some(RejectReason::Tenure);
        }
        if candidate.score < self.required_score(incumbent) {
            return Some(RejectReason::Score);
        }
        if !shutdown_safe {
            return Some(RejectReason::ShutdownSafety);
        }
        None
    }

    /// Plan vacancy fills and at most one displacement
    ///
    /// Vacancies are filled from the ranking with no gating. Once the set is
    /// full, each non-active candidate in the top `target` is tried against
    /// incumbents weakest entry score first; the first pair passing every
    /// check is accepted and evaluation stops.
    pub fn evaluate<F>(
        &self,
        ranked: &[ScoredMarket],
        active: &[ActiveInstrumentState],
        target: usize,
        last_rotation: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        shutdown_safe: F,
    ) -> RotationPlan
    where
        F: Fn(&ActiveInstrumentState) -> bool,
    {
        let active_ids: HashSet<&str> = active.iter().map(|a| a.condition_id.as_str()).collect();
        let is_new = |c: &&ScoredMarket| !active_ids.contains(c.record.condition_id.as_str());

        let mut plan = RotationPlan::default();
        let vacancies = target.saturating_sub(active.len());
        if vacancies > 0 {
            plan.fills = ranked.iter().filter(is_new).take(vacancies).cloned().collect();
            return plan;
        }

        let mut incumbents: Vec<&ActiveInstrumentState> = active.iter().collect();
        incumbents.sort_by(|a, b| {
            a.score_at_entry
                .total_cmp(&b.score_at_entry)
                .then_with(|| a.entered_at.cmp(&b.entered_at))
        });

        for candidate in ranked.iter().take(target).filter(is_new) {
            for &incumbent in &incumbents {
                let safe = shutdown_safe(incumbent);
                match self.check(candidate, incumbent, last_rotation, now, safe) {
                    None => {
                        plan.rotation = Some(Rotation {
                            evicted: incumbent.clone(),
                            admitted: candidate.clone(),
                        });
                        return plan;
                    }
                    Some(reason) => plan.rejections.push(Rejection {
                        candidate: candidate.record.slug.clone(),
                        candidate_score: candidate.score,
                        incumbent: incumbent.slug.clone(),
                        incumbent_entry_score: incumbent.score_at_entry,
                        reason,
                    }),
                }
            }
        }

        plan
    }
}

/// Saturates instead of panicking on spans chrono cannot represent
fn seconds(secs: u64) -> Duration {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}
