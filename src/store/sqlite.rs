//! SQLite-backed state store

use super::{OrderRecord, StoreError};
use crate::config::ExecutionMode;
use crate::execution::{OrderStatus, Side};
use crate::rotation::ActiveInstrumentState;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

const KEY_LAST_ROTATION: &str = "last_rotation_ts";
const KEY_MODE: &str = "mode";
const KEY_VERSION: &str = "version";

/// Restart-safety store
pub struct StateStore {
    conn: Mutex<Connection>,
}

impl StateStore {
    /// Open (or create) the database file and its schema
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Self::init(Connection::open(path)?)
    }

    /// Throwaway store for one-shot commands and tests
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS runtime_state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS active_markets (
                condition_id TEXT PRIMARY KEY,
                slug TEXT NOT NULL,
                entered_at INTEGER NOT NULL,
                score_at_entry REAL NOT NULL,
                outcome_tokens TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS open_orders (
                order_id TEXT PRIMARY KEY,
                condition_id TEXT NOT NULL,
                token_id TEXT NOT NULL,
                side TEXT NOT NULL,
                price TEXT NOT NULL,
                size TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_open_orders_condition ON open_orders(condition_id);
            "#,
        )?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    pub fn get_state(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM runtime_state WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set_state(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let conn = self.conn()?;
        upsert_state(&conn, key, value)?;
        Ok(())
    }

    /// Record the mode and crate version of the running process
    pub fn record_runtime(&self, mode: ExecutionMode, version: &str) -> Result<(), StoreError> {
        let conn = self.conn()?;
        upsert_state(&conn, KEY_MODE, mode.as_str())?;
        upsert_state(&conn, KEY_VERSION, version)?;
        Ok(())
    }

    pub fn last_rotation(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        match self.get_state(KEY_LAST_ROTATION)? {
            Some(value) => {
                let millis = value.parse::<i64>().map_err(|_| corrupt(KEY_LAST_ROTATION, &value))?;
                Ok(Some(from_millis(KEY_LAST_ROTATION, millis)?))
            }
            None => Ok(None),
        }
    }

    pub fn set_last_rotation(&self, ts: DateTime<Utc>) -> Result<(), StoreError> {
        self.set_state(KEY_LAST_ROTATION, &ts.timestamp_millis().to_string())
    }

    /// Active instruments in entry order
    pub fn load_active(&self) -> Result<Vec<ActiveInstrumentState>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT condition_id, slug, entered_at, score_at_entry, outcome_tokens
             FROM active_markets ORDER BY entered_at, condition_id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(condition_id, slug, entered_at, score_at_entry, tokens)| {
                let outcome_tokens =
                    serde_json::from_str(&tokens).map_err(|_| corrupt("outcome_tokens", &tokens))?;
                Ok(ActiveInstrumentState {
                    condition_id,
                    slug,
                    entered_at: from_millis("entered_at", entered_at)?,
                    score_at_entry,
                    outcome_tokens,
                })
            })
            .collect()
    }

    pub fn upsert_active(&self, state: &ActiveInstrumentState) -> Result<(), StoreError> {
        let conn = self.conn()?;
        insert_active(&conn, state)?;
        Ok(())
    }

    pub fn remove_active(&self, condition_id: &str) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM active_markets WHERE condition_id = ?1", params![condition_id])?;
        Ok(())
    }

    /// Swap an incumbent for a newcomer and stamp the rotation atomically
    pub fn apply_rotation(
        &self,
        evicted: &str,
        admitted: &ActiveInstrumentState,
        ts: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM active_markets WHERE condition_id = ?1", params![evicted])?;
        insert_active(&tx, admitted)?;
        upsert_state(&tx, KEY_LAST_ROTATION, &ts.timestamp_millis().to_string())?;
        tx.commit()?;
        Ok(())
    }

    pub fn insert_order(&self, order: &OrderRecord) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO open_orders
             (order_id, condition_id, token_id, side, price, size, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                order.order_id,
                order.condition_id,
                order.token_id,
                order.side.as_str(),
                order.price.to_string(),
                order.size.to_string(),
                order.status.as_str(),
                order.created_at.timestamp_millis(),
                order.updated_at.timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    /// Update an order's status; returns false when the order is unknown
    pub fn update_order_status(
        &self,
        order_id: &str,
        status: OrderStatus,
        ts: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE open_orders SET status = ?1, updated_at = ?2 WHERE order_id = ?3",
            params![status.as_str(), ts.timestamp_millis(), order_id],
        )?;
        Ok(changed > 0)
    }

    /// Orders still OPEN or PARTIAL, optionally for one instrument
    pub fn live_orders(&self, condition_id: Option<&str>) -> Result<Vec<OrderRecord>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT order_id, condition_id, token_id, side, price, size, status,
                    created_at, updated_at
             FROM open_orders
             WHERE status IN ('OPEN', 'PARTIAL') AND (?1 IS NULL OR condition_id = ?1)
             ORDER BY created_at, order_id",
        )?;
        let rows = stmt
            .query_map(params![condition_id], |row| {
                Ok(RawOrder {
                    order_id: row.get(0)?,
                    condition_id: row.get(1)?,
                    token_id: row.get(2)?,
                    side: row.get(3)?,
                    price: row.get(4)?,
                    size: row.get(5)?,
                    status: row.get(6)?,
                    created_at: row.get(7)?,
                    updated_at: row.get(8)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(RawOrder::decode).collect()
    }
}

/// Order row as stored
struct RawOrder {
    order_id: String,
    condition_id: String,
    token_id: String,
    side: String,
    price: String,
    size: String,
    status: String,
    created_at: i64,
    updated_at: i64,
}

impl RawOrder {
    fn decode(self) -> Result<OrderRecord, StoreError> {
        Ok(OrderRecord {
            side: Side::from_str(&self.side).map_err(|_| corrupt("side", &self.side))?,
            price: Decimal::from_str(&self.price).map_err(|_| corrupt("price", &self.price))?,
            size: Decimal::from_str(&self.size).map_err(|_| corrupt("size", &self.size))?,
            status: OrderStatus::from_str(&self.status)
                .map_err(|_| corrupt("status", &self.status))?,
            created_at: from_millis("created_at", self.created_at)?,
            updated_at: from_millis("updated_at", self.updated_at)?,
            order_id: self.order_id,
            condition_id: self.condition_id,
            token_id: self.token_id,
        })
    }
}

fn upsert_state(conn: &Connection, key: &str, value: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT INTO runtime_state (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )
}

fn insert_active(conn: &Connection, state: &ActiveInstrumentState) -> Result<(), StoreError> {
    let tokens = serde_json::to_string(&state.outcome_tokens)
        .map_err(|e| corrupt("outcome_tokens", &e.to_string()))?;
    conn.execute(
        "INSERT OR REPLACE INTO active_markets
         (condition_id, slug, entered_at, score_at_entry, outcome_tokens)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            state.condition_id,
            state.slug,
            state.entered_at.timestamp_millis(),
            state.score_at_entry,
            tokens,
        ],
    )?;
    Ok(())
}

fn from_millis(field: &'static str, millis: i64) -> Result<DateTime<Utc>, StoreError> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| corrupt(field, &millis.to_string()))
}

fn corrupt(field: &'static str, value: &str) -> StoreError {
    StoreError::Corrupt {
        field,
        value: value.to_string(),
    }
}
