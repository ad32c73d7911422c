use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::core::payload::Payload;

/// Failures of the external text processor call
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum OrchestratorError {
    #[error("Processor call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Transport error: {0}")]
    Transport(String),

    /// Processor reachable but answered with a non-success status
    #[error("Processor returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Processor returned an empty response")]
    EmptyResponse,
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// Orchestrator defines the port for the external processing service.
#[async_trait]
pub trait Orchestrator: Send + Sync + 'static {
    /// Submit one payload and return the processor's raw text answer.
    ///
    /// An empty answer is reported as [`OrchestratorError::EmptyResponse`],
    /// never as `Ok("")`.
    async fn submit(&self, payload: &Payload) -> OrchestratorResult<String>;
}
