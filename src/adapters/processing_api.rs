//! HTTP surface of the processing service.
//!
//! Routes (with `base` defaulting to `/summary/stt`):
//! - `POST {base}/process` runs the pipeline for one request
//! - `GET {base}/query/{key}` returns the stored job
//! - `GET /health` liveness probe
//!
//! The body is parsed by hand so that malformed JSON becomes an `E400`
//! envelope instead of axum's plain-text rejection.
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
};
use bytes::Bytes;

use crate::core::{
    envelope::ProcessResponse,
    payload::ProcessRequest,
    pipeline::{ProcessingPipeline, RequestError},
};

pub const DEFAULT_BASE_PATH: &str = "/summary/stt";

/// Build the processing service router rooted at `base_path`.
pub fn router(pipeline: Arc<ProcessingPipeline>, base_path: &str) -> Router {
    let base = base_path.trim_end_matches('/');
    Router::new()
        .route(&format!("{base}/process"), post(process_handler))
        .route(&format!("{base}/query/{{key}}"), get(query_handler))
        .route("/health", get(health_handler))
        .with_state(pipeline)
}

async fn process_handler(
    State(pipeline): State<Arc<ProcessingPipeline>>,
    body: Bytes,
) -> impl IntoResponse {
    let response = match serde_json::from_slice::<ProcessRequest>(&body) {
        Ok(request) => pipeline.process(&request).await,
        Err(e) => {
            tracing::debug!("Rejected malformed process body: {}", e);
            let err = RequestError::Malformed(e.to_string());
            ProcessResponse::failure(err.code(), err.to_string())
        }
    };
    (response.status(), Json(response))
}

async fn query_handler(
    State(pipeline): State<Arc<ProcessingPipeline>>,
    Path(key): Path<String>,
) -> impl IntoResponse {
    let response = pipeline.query(&key).await;
    (response.status(), Json(response))
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}
