//! Append-only event log
//!
//! One JSON object per line, each carrying `ts` (unix seconds) and `kind`.
//! Consumed by observability tooling; diagnostic logging goes through
//! `tracing` instead.

mod writer;

pub use writer::EventLog;

use crate::quote::{QuoteTarget, ReplaceReason};
use crate::rotation::Rejection;
use rust_decimal::Decimal;
use serde::Serialize;

/// File name of the event log inside the event directory
pub const EVENT_FILE: &str = "maker.jsonl";

/// Structured event
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    /// Selection cycle summary
    SelectTopN {
        fetched: usize,
        eligible: usize,
        feasible: usize,
        chosen: Vec<ChosenMarket>,
    },
    DiscoveryFailed {
        reason: String,
    },
    PaperHeartbeat(Heartbeat),
    LiveHeartbeat(Heartbeat),
    InstrumentAdmitted {
        slug: String,
        condition_id: String,
        score: f64,
    },
    InstrumentRetired {
        slug: String,
        condition_id: String,
        reason: String,
    },
    /// Retirement held back because some orders could not be cancelled
    RetireDeferred {
        slug: String,
        condition_id: String,
        reason: String,
        failed_order_ids: Vec<String>,
    },
    InstrumentPaused {
        slug: String,
        condition_id: String,
        reason: String,
        pause_sec: u64,
    },
    RotationAccepted {
        evicted: String,
        evicted_entry_score: f64,
        admitted: String,
        admitted_score: f64,
    },
    RotationRejected(Rejection),
    ShutdownCancelAttempt {
        slug: String,
        condition_id: String,
        succeeded: usize,
        failed: usize,
        failed_order_ids: Vec<String>,
    },
    PersistFailed {
        context: String,
        error: String,
    },
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::SelectTopN { .. } => "select_top_n",
            Event::DiscoveryFailed { .. } => "discovery_failed",
            Event::PaperHeartbeat(_) => "paper_heartbeat",
            Event::LiveHeartbeat(_) => "live_heartbeat",
            Event::InstrumentAdmitted { .. } => "instrument_admitted",
            Event::InstrumentRetired { .. } => "instrument_retired",
            Event::RetireDeferred { .. } => "retire_deferred",
            Event::InstrumentPaused { .. } => "instrument_paused",
            Event::RotationAccepted { .. } => "rotation_accepted",
            Event::RotationRejected(_) => "rotation_rejected",
            Event::ShutdownCancelAttempt { .. } => "shutdown_cancel_attempt",
            Event::PersistFailed { .. } => "persist_failed",
        }
    }
}

/// Chosen market in a selection summary
#[derive(Debug, Clone, Serialize)]
pub struct ChosenMarket {
    pub slug: String,
    pub condition_id: String,
    pub score: f64,
    pub capital_estimate: Decimal,
}

/// Per-worker heartbeat
#[derive(Debug, Clone, Serialize)]
pub struct Heartbeat {
    pub slug: String,
    pub condition_id: String,
    pub status: String,
    pub tokens: Vec<TokenQuote>,
    pub resting_orders: usize,
}

/// Quote state of one outcome token in a heartbeat
#[derive(Debug, Clone, Serialize)]
pub struct TokenQuote {
    pub outcome: String,
    pub token_id: String,
    /// Absent when the book is one-sided, too thin or unavailable
    pub midpoint: Option<Decimal>,
    pub target: Option<QuoteTarget>,
    pub bid: SideQuote,
    pub ask: SideQuote,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub book_error: Option<String>,
}

/// Churn view of one side of one token
#[derive(Debug, Clone, Default, Serialize)]
pub struct SideQuote {
    pub resting_price: Option<Decimal>,
    pub in_band: Option<bool>,
    pub replace: Option<ReplaceReason>,
    pub placed: bool,
}
