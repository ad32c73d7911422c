use async_trait::async_trait;
use axum::http::{HeaderMap, StatusCode, request::Parts};

/// Outcome of an authorization check.
#[derive(Debug, Clone)]
pub enum AuthDecision {
    /// Forward the request, merging `headers` into it first
    /// (e.g. a resolved identity header).
    Allow { headers: HeaderMap },
    /// Answer the caller directly with this status.
    Deny { status: StatusCode },
}

impl AuthDecision {
    pub fn allow() -> Self {
        AuthDecision::Allow {
            headers: HeaderMap::new(),
        }
    }

    pub fn deny() -> Self {
        AuthDecision::Deny {
            status: StatusCode::UNAUTHORIZED,
        }
    }
}

/// AuthGate is consulted by the dispatcher before forwarding a request on a
/// route marked `auth_required`. Credential verification itself lives
/// outside this crate.
#[async_trait]
pub trait AuthGate: Send + Sync + 'static {
    async fn authorize(&self, route_id: &str, parts: &Parts) -> AuthDecision;
}
