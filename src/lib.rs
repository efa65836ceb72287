//! reward-maker: low-churn two-sided quoting for Polymarket liquidity rewards
//!
//! This library provides the core components for:
//! - Market discovery via Gamma API
//! - Reward eligibility, capital feasibility and stability scoring
//! - Depth-weighted midpoint proxy and quote targets
//! - Churn control for resting orders
//! - Rotation hysteresis over the active instrument set
//! - Paper/live order execution
//! - SQLite state persistence and a JSONL event log
//! - Orchestrator with one worker per instrument

pub mod cli;
pub mod config;
pub mod engine;
pub mod events;
pub mod execution;
pub mod market;
pub mod orderbook;
pub mod quote;
pub mod rotation;
pub mod selection;
pub mod store;
pub mod telemetry;
