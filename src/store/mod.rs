//! Persistent state store
//!
//! SQLite tables holding everything a restart needs: runtime state (last
//! rotation, mode, version), the active instrument set and the orders the
//! live path has placed.

mod sqlite;

pub use sqlite::StateStore;

use crate::execution::{OrderStatus, Side};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

/// Persistence errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// A stored value could not be decoded
    #[error("corrupt stored value for {field}: {value}")]
    Corrupt { field: &'static str, value: String },
    #[error("store lock poisoned")]
    Poisoned,
}

/// A tracked order row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderRecord {
    pub order_id: String,
    pub condition_id: String,
    pub token_id: String,
    pub side: Side,
    pub price: Decimal,
    pub size: Decimal,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
