//! Engine module
//!
//! Orchestrator, per-instrument workers and the selection cycle that
//! drives them.

mod cycle;
mod orchestrator;
mod worker;

pub use cycle::{run_selection_cycle, SelectionCycle};
pub use orchestrator::{EngineDeps, Orchestrator};
pub use worker::{
    spawn as spawn_worker, StopMode, StopReport, WorkerDeps, WorkerHandle, WorkerState,
    WorkerStatus,
};

use crate::store::StoreError;
use thiserror::Error;

/// Engine errors
#[derive(Debug, Error)]
pub enum EngineError {
    /// State could not be persisted; the engine stops
    #[error("failed to persist state: {0}")]
    Persist(#[from] StoreError),
    /// Some orders could not be cancelled on shutdown
    #[error("shutdown left {} orders uncancelled: {}", failed.len(), failed.join(", "))]
    ShutdownCancelIncomplete { failed: Vec<String> },
}
