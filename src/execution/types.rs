//! Execution types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Order identifier as assigned by the executor
pub type OrderId = String;

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// Bid
    Buy,
    /// Ask
    Sell,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Buy, Side::Sell];

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BUY" => Ok(Side::Buy),
            "SELL" => Ok(Side::Sell),
            other => Err(format!("unknown side: {other}")),
        }
    }
}

/// Lifecycle status of a tracked order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    Open,
    Canceled,
    Filled,
    Partial,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Open => "OPEN",
            OrderStatus::Canceled => "CANCELED",
            OrderStatus::Filled => "FILLED",
            OrderStatus::Partial => "PARTIAL",
        }
    }

    /// Still resting on the book
    pub fn is_live(&self) -> bool {
        matches!(self, OrderStatus::Open | OrderStatus::Partial)
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(OrderStatus::Open),
            "CANCELED" => Ok(OrderStatus::Canceled),
            "FILLED" => Ok(OrderStatus::Filled),
            "PARTIAL" => Ok(OrderStatus::Partial),
            other => Err(format!("unknown order status: {other}")),
        }
    }
}

/// A GTC limit order to be placed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub token_id: String,
    pub side: Side,
    /// Pre-rounded to the tick size
    pub price: Decimal,
    pub size: Decimal,
}

/// An order resting on the book
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenOrder {
    pub order_id: OrderId,
    pub token_id: String,
    pub side: Side,
    pub price: Decimal,
    /// Size at placement
    pub original_size: Decimal,
    /// Size filled so far
    #[serde(default)]
    pub size_matched: Decimal,
}

impl OpenOrder {
    pub fn remaining(&self) -> Decimal {
        (self.original_size - self.size_matched).max(Decimal::ZERO)
    }

    pub fn status(&self) -> OrderStatus {
        if self.size_matched > Decimal::ZERO {
            OrderStatus::Partial
        } else {
            OrderStatus::Open
        }
    }
}

/// A fill (executed trade)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: OrderId,
    pub token_id: String,
    pub side: Side,
    pub price: Decimal,
    pub size: Decimal,
    pub timestamp: DateTime<Utc>,
}
