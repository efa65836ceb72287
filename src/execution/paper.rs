//! Paper trading executor

use super::{ExecutionError, Fill, OpenOrder, OrderExecutor, OrderId, OrderRequest};
use crate::config::ExecutionMode;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Simulated executor: orders rest in memory and never fill on their own
#[derive(Clone, Default)]
pub struct PaperExecutor {
    open: Arc<RwLock<HashMap<OrderId, OpenOrder>>>,
    fills: Arc<RwLock<Vec<Fill>>>,
}

impl PaperExecutor {
    /// Create a new paper executor
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fill against a resting order; fully filled orders leave the book
    #[cfg(test)]
    pub async fn simulate_fill(&self, order_id: &str, size: Decimal) -> Result<(), ExecutionError> {
        let mut open = self.open.write().await;
        let order = open
            .get_mut(order_id)
            .ok_or_else(|| ExecutionError::NotFound(order_id.to_string()))?;

        let filled = size.min(order.remaining());
        order.size_matched += filled;
        let fill = Fill {
            order_id: order.order_id.clone(),
            token_id: order.token_id.clone(),
            side: order.side,
            price: order.price,
            size: filled,
            timestamp: chrono::Utc::now(),
        };
        if order.remaining().is_zero() {
            open.remove(order_id);
        }

        self.fills.write().await.push(fill);
        Ok(())
    }
}

#[async_trait]
impl OrderExecutor for PaperExecutor {
    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Paper
    }

    async fn place(&self, order: &OrderRequest) -> Result<OrderId, ExecutionError> {
        let order_id = format!("paper-{}", Uuid::new_v4());
        let resting = OpenOrder {
            order_id: order_id.clone(),
            token_id: order.token_id.clone(),
            side: order.side,
            price: order.price,
            original_size: order.size,
            size_matched: Decimal::ZERO,
        };
        self.open.write().await.insert(order_id.clone(), resting);

        tracing::debug!(
            %order_id,
            token_id = %order.token_id,
            side = %order.side,
            price = %order.price,
            "Paper order placed"
        );
        Ok(order_id)
    }

    async fn cancel(&self, order_id: &str) -> Result<(), ExecutionError> {
        match self.open.write().await.remove(order_id) {
            Some(_) => {
                tracing::debug!(order_id, "Paper order cancelled");
                Ok(())
            }
            None => Err(ExecutionError::NotFound(order_id.to_string())),
        }
    }

    async fn list_open(&self) -> Result<Vec<OpenOrder>, ExecutionError> {
        Ok(self.open.read().await.values().cloned().collect())
    }

    async fn list_fills(&self) -> Result<Vec<Fill>, ExecutionError> {
        Ok(self.fills.read().await.clone())
    }
}
