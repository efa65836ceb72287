//! Execution module
//!
//! Order placement capability with a simulated paper implementation and a
//! live implementation backed by an HTTP order gateway.

mod live;
mod paper;
mod types;

pub use live::{GatewayConfig, GatewayExecutor};
pub use paper::PaperExecutor;
pub use types::{Fill, OpenOrder, OrderId, OrderRequest, OrderStatus, Side};

use crate::config::{ExecutionMode, NetConfig};
use async_trait::async_trait;
use std::future::Future;
use thiserror::Error;

/// Order action errors
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// Executor answered with a non-success status
    #[error("order action rejected ({status}): {body}")]
    Rejected { status: u16, body: String },
    /// Request never got an answer
    #[error("transport error: {0}")]
    Transport(String),
    /// The order is not known to the executor
    #[error("order not found: {0}")]
    NotFound(OrderId),
    /// A placement was sent but its outcome is unknown; it may be resting
    #[error("placement unconfirmed: {0}")]
    Unconfirmed(String),
}

impl ExecutionError {
    /// Worth another attempt
    ///
    /// An unconfirmed placement is never retried blindly: repeating it can
    /// leave two orders resting where one was intended.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ExecutionError::NotFound(_) | ExecutionError::Unconfirmed(_))
    }
}

/// Order placement capability injected into each worker
#[async_trait]
pub trait OrderExecutor: Send + Sync {
    fn mode(&self) -> ExecutionMode;
    /// Place a GTC limit order
    async fn place(&self, order: &OrderRequest) -> Result<OrderId, ExecutionError>;
    /// Cancel a resting order
    async fn cancel(&self, order_id: &str) -> Result<(), ExecutionError>;
    /// Every order still resting
    async fn list_open(&self) -> Result<Vec<OpenOrder>, ExecutionError>;
    /// Every fill observed so far
    async fn list_fills(&self) -> Result<Vec<Fill>, ExecutionError>;
}

/// Run an order action with up to `max_retries` retries
///
/// Non-retryable errors return immediately.
pub async fn with_retries<T, F, Fut>(net: &NetConfig, mut op: F) -> Result<T, ExecutionError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ExecutionError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_retryable() || attempt >= net.max_retries => return Err(e),
            Err(e) => {
                attempt += 1;
                let delay = net.backoff(attempt);
                tracing::warn!(
                    error = %e,
                    attempt,
                    max_retries = net.max_retries,
                    "Order action failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
