//! Outermost request observer.
//!
//! Every inbound request produces exactly two records on the configured
//! [`TraceSink`]: one before any routing happens and one after the response
//! is ready, including for requests that end in 404 or 502. The filter never
//! changes the request; on the response it only adds `X-Request-ID`.
use std::{
    net::SocketAddr,
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    extract::{ConnectInfo, Request},
    http::{HeaderValue, header},
    middleware::Next,
    response::Response,
};
use tracing::Instrument;

pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

/// Metadata captured for one request/response exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTrace {
    pub request_id: String,
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub remote_addr: Option<SocketAddr>,
    pub user_agent: Option<String>,
    pub content_type: Option<String>,
    /// Set on the response record only
    pub status: Option<u16>,
    /// Set on the response record only
    pub elapsed: Option<Duration>,
}

impl RequestTrace {
    fn from_request(req: &Request, request_id: String) -> Self {
        let header_str = |name: header::HeaderName| {
            req.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };

        Self {
            request_id,
            method: req.method().to_string(),
            path: req.uri().path().to_string(),
            query: req.uri().query().map(str::to_string),
            remote_addr: req
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| *addr),
            user_agent: header_str(header::USER_AGENT),
            content_type: header_str(header::CONTENT_TYPE),
            status: None,
            elapsed: None,
        }
    }
}

/// Receiver of request traces. Implementations must be cheap; they run
/// inline on the request path.
pub trait TraceSink: Send + Sync + 'static {
    fn on_request(&self, trace: &RequestTrace);
    fn on_response(&self, trace: &RequestTrace);
}

/// Default sink: one structured `tracing` event per phase.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl TraceSink for TracingSink {
    fn on_request(&self, trace: &RequestTrace) {
        tracing::info!(
            request_id = %trace.request_id,
            method = %trace.method,
            path = %trace.path,
            query = trace.query.as_deref().unwrap_or(""),
            remote_addr = ?trace.remote_addr,
            user_agent = trace.user_agent.as_deref().unwrap_or(""),
            content_type = trace.content_type.as_deref().unwrap_or(""),
            "request received"
        );
    }

    fn on_response(&self, trace: &RequestTrace) {
        tracing::info!(
            request_id = %trace.request_id,
            method = %trace.method,
            path = %trace.path,
            status = trace.status.unwrap_or_default(),
            elapsed_ms = trace.elapsed.map(|d| d.as_millis() as u64).unwrap_or_default(),
            "response sent"
        );
    }
}

/// Record the exchange on `sink` and tag the response with a request id.
pub async fn trace_requests(req: Request, next: Next, sink: Arc<dyn TraceSink>) -> Response {
    let start = Instant::now();
    let request_id = uuid::Uuid::new_v4().to_string();

    let mut trace = RequestTrace::from_request(&req, request_id.clone());
    sink.on_request(&trace);

    let span = tracing::info_span!("request", request_id = %request_id);
    let mut response = next.run(req).instrument(span).await;

    trace.status = Some(response.status().as_u16());
    trace.elapsed = Some(start.elapsed());
    sink.on_response(&trace);

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    response
}

/// Create a cloneable closure wrapping [`trace_requests`] for
/// `axum::middleware::from_fn`.
pub fn create_trace_middleware(
    sink: Arc<dyn TraceSink>,
) -> impl Fn(Request, Next) -> std::pin::Pin<Box<dyn std::future::Future<Output = Response> + Send>>
+ Clone {
    move |req, next| {
        let sink = sink.clone();
        Box::pin(async move { trace_requests(req, next, sink).await })
    }
}
