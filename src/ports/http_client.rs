use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body as AxumBody;
use hyper::{Request, Response};
use thiserror::Error;

/// Failures while forwarding a request to an upstream
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpClientError {
    /// Connect or transport failure before a response arrived
    #[error("Upstream unreachable: {0}")]
    Unreachable(String),

    /// No response headers within the configured limit
    #[error("Upstream timed out after {0:?}")]
    Timeout(Duration),

    /// The outbound request could not be sent as built
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

pub type HttpClientResult<T> = Result<T, HttpClientError>;

/// Port for forwarding gateway traffic upstream.
#[async_trait]
pub trait HttpClient: Send + Sync + 'static {
    /// Send a fully rewritten request (absolute URI) to its upstream.
    ///
    /// Any status the upstream answers with is a success here. A
    /// `101 Switching Protocols` response keeps its upgrade handle in the
    /// response extensions.
    async fn send_request(&self, req: Request<AxumBody>) -> HttpClientResult<Response<AxumBody>>;
}
