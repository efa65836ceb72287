//! Live executor backed by an order gateway
//!
//! The gateway is a small HTTP service that holds the venue signing
//! credentials and speaks JSON:
//!
//! | Call | Request |
//! |---|---|
//! | place | `POST /orders` with `{token_id, side, price, size, order_type}` → `{order_id}` |
//! | cancel | `DELETE /orders/{order_id}` |
//! | list open | `GET /orders?status=open` → `[OpenOrder]` |
//! | list fills | `GET /fills` → `[Fill]` |
//!
//! Every call carries `Authorization: Bearer <key>`.

use super::{ExecutionError, Fill, OpenOrder, OrderExecutor, OrderId, OrderRequest};
use crate::config::{ConfigError, ExecutionMode, LiveConfig, NetConfig};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Gateway connection settings
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
}

impl GatewayConfig {
    /// Resolve the gateway settings, reading the API key from the environment
    pub fn from_config(live: &LiveConfig, net: &NetConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: live.gateway_url.trim_end_matches('/').to_string(),
            api_key: live.api_key()?,
            timeout: net.request_timeout(),
        })
    }
}

/// Live order executor
pub struct GatewayExecutor {
    config: GatewayConfig,
    client: Client,
}

impl GatewayExecutor {
    pub fn new(config: GatewayConfig) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Failed to build HTTP client, using defaults");
                Client::new()
            });

        Self { config, client }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, ExecutionError> {
        let response = request
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(|e| ExecutionError::Transport(e.to_string()))?;
        Self::check_status(response).await
    }

    /// Send a placement; failures after the request left are unconfirmed
    async fn send_placement(
        &self,
        request: RequestBuilder,
    ) -> Result<reqwest::Response, ExecutionError> {
        let response = request
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_builder() {
                    ExecutionError::Transport(e.to_string())
                } else {
                    ExecutionError::Unconfirmed(e.to_string())
                }
            })?;
        Self::check_status(response).await
    }

    async fn check_status(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ExecutionError> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(ExecutionError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[derive(Debug, Serialize)]
struct PlaceBody<'a> {
    #[serde(flatten)]
    order: &'a OrderRequest,
    order_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct PlaceResponse {
    order_id: OrderId,
}

#[async_trait]
impl OrderExecutor for GatewayExecutor {
    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Live
    }

    async fn place(&self, order: &OrderRequest) -> Result<OrderId, ExecutionError> {
        let body = PlaceBody {
            order,
            order_type: "GTC",
        };
        let request = self.client.post(self.url("/orders")).json(&body);
        let placed: PlaceResponse = self
            .send_placement(request)
            .await?
            .json()
            .await
            .map_err(|e| ExecutionError::Unconfirmed(e.to_string()))?;

        tracing::info!(
            order_id = %placed.order_id,
            token_id = %order.token_id,
            side = %order.side,
            price = %order.price,
            size = %order.size,
            "Live order placed"
        );
        Ok(placed.order_id)
    }

    async fn cancel(&self, order_id: &str) -> Result<(), ExecutionError> {
        let request = self.client.delete(self.url(&format!("/orders/{order_id}")));
        match self.send(request).await {
            Ok(_) => {
                tracing::info!(order_id, "Live order cancelled");
                Ok(())
            }
            Err(ExecutionError::Rejected { status, .. })
                if status == StatusCode::NOT_FOUND.as_u16() =>
            {
                Err(ExecutionError::NotFound(order_id.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    async fn list_open(&self) -> Result<Vec<OpenOrder>, ExecutionError> {
        let request = self.client.get(self.url("/orders")).query(&[("status", "open")]);
        self.send(request)
            .await?
            .json()
            .await
            .map_err(|e| ExecutionError::Transport(e.to_string()))
    }

    async fn list_fills(&self) -> Result<Vec<Fill>, ExecutionError> {
        self.send(self.client.get(self.url("/fills")))
            .await?
            .json()
            .await
            .map_err(|e| ExecutionError::Transport(e.to_string()))
    }
}
