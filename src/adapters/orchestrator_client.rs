//! Outbound client for the external text processor.
//!
//! One bounded-time POST per submission, no retries. Concurrency is capped
//! twice: once across all calls and once per target host. The processor is
//! a single host, so in practice the lower of the two limits applies.
use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use eyre::{Result, WrapErr};
use reqwest::{Client, header};
use tokio::sync::Semaphore;
use url::Url;

use crate::{
    config::models::OrchestratorConfig,
    core::payload::Payload,
    ports::orchestrator::{Orchestrator, OrchestratorError, OrchestratorResult},
};

/// Path appended to the configured base URL
pub const PROCESS_PATH: &str = "/api/llm/process";

pub struct OrchestratorClient {
    client: Client,
    endpoint: Url,
    timeout: Duration,
    total_permits: Arc<Semaphore>,
    route_permits: Arc<Semaphore>,
}

impl OrchestratorClient {
    pub fn from_config(config: &OrchestratorConfig) -> Result<Self> {
        let timeout = config
            .timeout_duration()
            .wrap_err_with(|| format!("Invalid orchestrator timeout '{}'", config.timeout))?;
        let pool_idle = config.pool_idle_duration().wrap_err_with(|| {
            format!(
                "Invalid orchestrator pool_idle_timeout '{}'",
                config.pool_idle_timeout
            )
        })?;

        let endpoint = Url::parse(&format!(
            "{}{}",
            config.base_url.trim_end_matches('/'),
            PROCESS_PATH
        ))
        .wrap_err_with(|| format!("Invalid orchestrator base_url '{}'", config.base_url))?;

        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .pool_idle_timeout(pool_idle)
            .pool_max_idle_per_host(config.max_connections_per_route)
            .build()
            .wrap_err("Failed to build orchestrator HTTP client")?;

        tracing::info!(
            endpoint = %endpoint,
            timeout = ?timeout,
            max_connections_total = config.max_connections_total,
            max_connections_per_route = config.max_connections_per_route,
            "Orchestrator client ready"
        );

        Ok(Self {
            client,
            endpoint,
            timeout,
            total_permits: Arc::new(Semaphore::new(config.max_connections_total)),
            route_permits: Arc::new(Semaphore::new(config.max_connections_per_route)),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn map_transport(&self, e: reqwest::Error) -> OrchestratorError {
        if e.is_timeout() {
            OrchestratorError::Timeout(self.timeout)
        } else {
            OrchestratorError::Transport(e.to_string())
        }
    }

    /// Wait for a connection slot, then post the payload and read the answer.
    async fn forward(&self, payload: &Payload) -> OrchestratorResult<String> {
        let _total = self
            .total_permits
            .acquire()
            .await
            .map_err(|e| OrchestratorError::Transport(e.to_string()))?;
        let _route = self
            .route_permits
            .acquire()
            .await
            .map_err(|e| OrchestratorError::Transport(e.to_string()))?;

        let body = payload.clone().strip_absent();
        tracing::debug!(
            endpoint = %self.endpoint,
            fields = body.len(),
            "Submitting payload to processor"
        );

        let response = self
            .client
            .post(self.endpoint.clone())
            .header(header::CONTENT_TYPE, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| self.map_transport(e))?;

        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "Processor answered with failure status");
            return Err(OrchestratorError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        if text.trim().is_empty() {
            return Err(OrchestratorError::EmptyResponse);
        }

        Ok(text)
    }
}

#[async_trait]
impl Orchestrator for OrchestratorClient {
    async fn submit(&self, payload: &Payload) -> OrchestratorResult<String> {
        // The deadline starts before the slot wait, not when the request is sent.
        tokio::time::timeout(self.timeout, self.forward(payload))
            .await
            .map_err(|_| {
                tracing::warn!(timeout = ?self.timeout, "Processor call abandoned");
                OrchestratorError::Timeout(self.timeout)
            })?
    }
}
