//! Gateway request dispatcher.
//!
//! Resolves the inbound path against the [`RouteTable`], consults the
//! [`AuthGate`] for protected routes and forwards through the [`HttpClient`]
//! port. Per-kind header handling:
//! - `http` routes get `Host` rewritten to the upstream authority
//! - `websocket` routes keep the caller's `Host`, always carry the upgrade
//!   headers, and are bridged byte-for-byte once the upstream answers `101`
use std::{net::SocketAddr, sync::Arc};

use axum::{
    Router,
    body::Body as AxumBody,
    extract::{ConnectInfo, Request as AxumRequest},
    http::{HeaderName, HeaderValue, StatusCode, Uri, header},
    response::IntoResponse,
};
use eyre::{Result, WrapErr};
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;

use crate::{
    config::models::RouteKind,
    core::route_table::{Route, RouteTable},
    ports::{
        auth_gate::{AuthDecision, AuthGate},
        http_client::{HttpClient, HttpClientError},
    },
};

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");

pub const WEBSOCKET_VERSION: &str = "13";

/// Build the outbound URI: the target's scheme and authority with the
/// inbound path and query. Socket schemes travel as their HTTP equivalents.
pub fn outbound_uri(target: &Uri, inbound: &Uri) -> Result<Uri> {
    let scheme = match target.scheme_str() {
        Some("ws") | None => "http",
        Some("wss") => "https",
        Some(other) => other,
    };
    let authority = target
        .authority()
        .ok_or_else(|| eyre::eyre!("Route target {} has no authority", target))?;
    let path_and_query = inbound.path_and_query().map_or("/", |pq| pq.as_str());

    Uri::builder()
        .scheme(scheme)
        .authority(authority.as_str())
        .path_and_query(path_and_query)
        .build()
        .wrap_err_with(|| format!("Failed to build outbound URI for {target}{path_and_query}"))
}

/// Force the headers an upstream socket server needs to accept an upgrade.
pub fn apply_upgrade_headers(headers: &mut axum::http::HeaderMap) {
    headers.insert(header::CONNECTION, HeaderValue::from_static("Upgrade"));
    headers.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
    headers.insert(
        header::SEC_WEBSOCKET_VERSION,
        HeaderValue::from_static(WEBSOCKET_VERSION),
    );
}

/// Gateway dispatcher: route match, optional auth, forward.
#[derive(Clone)]
pub struct Dispatcher {
    routes: Arc<RouteTable>,
    http_client: Arc<dyn HttpClient>,
    auth_gate: Option<Arc<dyn AuthGate>>,
    health_path: Option<String>,
}

impl Dispatcher {
    pub fn new(routes: Arc<RouteTable>, http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            routes,
            http_client,
            auth_gate: None,
            health_path: None,
        }
    }

    pub fn with_auth_gate(mut self, gate: Arc<dyn AuthGate>) -> Self {
        self.auth_gate = Some(gate);
        self
    }

    /// Answer `GET {path}` locally instead of routing it.
    pub fn with_health_path(mut self, path: Option<String>) -> Self {
        self.health_path = path;
        self
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// An axum router sending every request through this dispatcher.
    pub fn into_router(self) -> Router {
        let dispatcher = Arc::new(self);
        Router::new().fallback(move |req: AxumRequest| {
            let dispatcher = dispatcher.clone();
            async move {
                let client_addr = req
                    .extensions()
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| *addr);
                match dispatcher.handle_request(req, client_addr).await {
                    Ok(response) => response,
                    Err(e) => {
                        tracing::error!("Dispatch failed: {:#}", e);
                        (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
                    }
                }
            }
        })
    }

    /// Main request entry point.
    pub async fn handle_request(
        &self,
        req: Request<AxumBody>,
        client_addr: Option<SocketAddr>,
    ) -> Result<Response<AxumBody>, eyre::Error> {
        let path = req.uri().path().to_string();

        if req.method() == hyper::Method::GET && self.health_path.as_deref() == Some(path.as_str()) {
            return self.handle_health_check();
        }

        let Some(route) = self.routes.resolve(&path) else {
            tracing::debug!("No route matches {}", path);
            return plain_response(StatusCode::NOT_FOUND, "Not Found");
        };

        tracing::debug!("Route {} matched {}", route.id, path);

        let req = if route.auth_required {
            match self.authorize(route, req).await {
                Ok(req) => req,
                Err(status) => {
                    tracing::info!("Route {} denied {} with {}", route.id, path, status);
                    return plain_response(status, status.canonical_reason().unwrap_or("Denied"));
                }
            }
        } else {
            req
        };

        match route.kind {
            RouteKind::Http => self.forward_http(route, req, client_addr).await,
            RouteKind::Websocket => self.forward_upgrade(route, req, client_addr).await,
        }
    }

    fn handle_health_check(&self) -> Result<Response<AxumBody>, eyre::Error> {
        let health_data = serde_json::json!({
            "status": "ok",
            "routes": self.routes.enabled_count(),
        });

        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "application/json")
            .body(AxumBody::from(health_data.to_string()))
            .wrap_err("Failed to build health check response")
    }

    async fn authorize(
        &self,
        route: &Route,
        req: Request<AxumBody>,
    ) -> Result<Request<AxumBody>, StatusCode> {
        let Some(gate) = &self.auth_gate else {
            tracing::warn!("Route {} requires auth but no gate is configured", route.id);
            return Err(StatusCode::UNAUTHORIZED);
        };

        let (mut parts, body) = req.into_parts();
        match gate.authorize(&route.id, &parts).await {
            AuthDecision::Allow { headers } => {
                parts.headers.extend(headers);
                Ok(Request::from_parts(parts, body))
            }
            AuthDecision::Deny { status } => Err(status),
        }
    }

    async fn forward_http(
        &self,
        route: &Route,
        mut req: Request<AxumBody>,
        client_addr: Option<SocketAddr>,
    ) -> Result<Response<AxumBody>, eyre::Error> {
        let original_host = req.headers().get(header::HOST).cloned();
        *req.uri_mut() = outbound_uri(&route.target, req.uri())?;

        let upstream_host = req
            .uri()
            .authority()
            .map(|authority| HeaderValue::from_str(authority.as_str()))
            .transpose()
            .wrap_err("Failed to encode upstream host")?;

        let headers = req.headers_mut();
        add_forwarded_headers(headers, client_addr, original_host);
        if let Some(host) = upstream_host {
            headers.insert(header::HOST, host);
        }

        self.send(route, req).await
    }

    async fn forward_upgrade(
        &self,
        route: &Route,
        mut req: Request<AxumBody>,
        client_addr: Option<SocketAddr>,
    ) -> Result<Response<AxumBody>, eyre::Error> {
        // Must be taken before the request is handed to the client.
        let inbound_upgrade = hyper::upgrade::on(&mut req);

        let original_host = req.headers().get(header::HOST).cloned();
        *req.uri_mut() = outbound_uri(&route.target, req.uri())?;

        let headers = req.headers_mut();
        add_forwarded_headers(headers, client_addr, original_host);
        apply_upgrade_headers(headers);

        let mut response = self.send(route, req).await?;
        if response.status() != StatusCode::SWITCHING_PROTOCOLS {
            tracing::debug!(
                "Upstream for {} declined upgrade with {}",
                route.id,
                response.status()
            );
            return Ok(response);
        }

        let upstream_upgrade = hyper::upgrade::on(&mut response);
        let route_id = route.id.clone();
        tokio::spawn(async move {
            let (inbound, upstream) = match tokio::try_join!(inbound_upgrade, upstream_upgrade) {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::warn!("Upgrade on route {} failed: {}", route_id, e);
                    return;
                }
            };

            let mut inbound = TokioIo::new(inbound);
            let mut upstream = TokioIo::new(upstream);
            match tokio::io::copy_bidirectional(&mut inbound, &mut upstream).await {
                Ok((to_upstream, to_client)) => tracing::debug!(
                    "Tunnel on route {} closed ({} bytes up, {} bytes down)",
                    route_id,
                    to_upstream,
                    to_client
                ),
                Err(e) => tracing::debug!("Tunnel on route {} ended: {}", route_id, e),
            }
        });

        Ok(response)
    }

    async fn send(
        &self,
        route: &Route,
        req: Request<AxumBody>,
    ) -> Result<Response<AxumBody>, eyre::Error> {
        match self.http_client.send_request(req).await {
            Ok(response) => Ok(response),
            Err(HttpClientError::Timeout(limit)) => {
                tracing::error!("Upstream for route {} timed out after {:?}", route.id, limit);
                plain_response(StatusCode::GATEWAY_TIMEOUT, "Upstream timed out")
            }
            Err(e) => {
                tracing::error!("Upstream request for route {} failed: {}", route.id, e);
                plain_response(StatusCode::BAD_GATEWAY, "Bad Gateway")
            }
        }
    }
}

fn add_forwarded_headers(
    headers: &mut axum::http::HeaderMap,
    client_addr: Option<SocketAddr>,
    original_host: Option<HeaderValue>,
) {
    if let Some(addr) = client_addr {
        let chain = match headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
            Some(existing) => format!("{existing}, {}", addr.ip()),
            None => addr.ip().to_string(),
        };
        if let Ok(value) = HeaderValue::from_str(&chain) {
            headers.insert(X_FORWARDED_FOR, value);
        }
    }
    if let Some(host) = original_host {
        headers.insert(X_FORWARDED_HOST, host);
    }
    headers
        .entry(X_FORWARDED_PROTO)
        .or_insert(HeaderValue::from_static("http"));
}

fn plain_response(status: StatusCode, body: &'static str) -> Result<Response<AxumBody>, eyre::Error> {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(AxumBody::from(body))
        .wrap_err("Failed to build plain response")
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use axum::http::request::Parts;
    use http_body_util::BodyExt;

    use super::*;
    use crate::{
        config::models::{RouteDescriptor, default_routes},
        core::environment::Environment,
        ports::http_client::HttpClientResult,
    };

    /// Records outbound requests and answers with a fixed status.
    struct RecordingClient {
        status: StatusCode,
        fail: bool,
        seen: Mutex<Vec<(Uri, axum::http::HeaderMap)>>,
    }

    impl RecordingClient {
        fn answering(status: StatusCode) -> Arc<Self> {
            Arc::new(Self {
                status,
                fail: false,
                seen: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                status: StatusCode::OK,
                fail: true,
                seen: Mutex::new(Vec::new()),
            })
        }

        fn last(&self) -> (Uri, axum::http::HeaderMap) {
            self.seen.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl HttpClient for RecordingClient {
        async fn send_request(&self, req: Request<AxumBody>) -> HttpClientResult<Response<AxumBody>> {
            self.seen
                .lock()
                .unwrap()
                .push((req.uri().clone(), req.headers().clone()));
            if self.fail {
                return Err(HttpClientError::Unreachable("refused".into()));
            }
            Ok(Response::builder()
                .status(self.status)
                .body(AxumBody::from("upstream"))
                .unwrap())
        }
    }

    struct StaticGate(AuthDecision);

    #[async_trait]
    impl AuthGate for StaticGate {
        async fn authorize(&self, _route_id: &str, _parts: &Parts) -> AuthDecision {
            self.0.clone()
        }
    }

    fn dispatcher(client: Arc<RecordingClient>, env: Environment) -> Dispatcher {
        let table = RouteTable::build(&default_routes(), env).unwrap();
        Dispatcher::new(Arc::new(table), client).with_health_path(Some("/health".into()))
    }

    fn get(uri: &str) -> Request<AxumBody> {
        Request::builder()
            .uri(uri)
            .header(header::HOST, "gateway.example.com")
            .body(AxumBody::empty())
            .unwrap()
    }

    #[test]
    fn test_outbound_uri_maps_socket_schemes() {
        let target: Uri = "ws://core-container:8087".parse().unwrap();
        let inbound: Uri = "/ws/info?t=1".parse().unwrap();
        assert_eq!(
            outbound_uri(&target, &inbound).unwrap().to_string(),
            "http://core-container:8087/ws/info?t=1"
        );

        let secure: Uri = "wss://core:443".parse().unwrap();
        assert_eq!(
            outbound_uri(&secure, &"/topic/a".parse().unwrap())
                .unwrap()
                .scheme_str(),
            Some("https")
        );
    }

    #[tokio::test]
    async fn test_http_route_rewrites_host() {
        let client = RecordingClient::answering(StatusCode::OK);
        let dispatcher = dispatcher(client.clone(), Environment::Development);

        let addr: SocketAddr = "10.0.0.7:5000".parse().unwrap();
        let response = dispatcher
            .handle_request(get("/auth/login?next=%2F"), Some(addr))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let (uri, headers) = client.last();
        assert_eq!(uri.to_string(), "http://localhost:28089/auth/login?next=%2F");
        assert_eq!(headers[header::HOST], "localhost:28089");
        assert_eq!(headers["x-forwarded-host"], "gateway.example.com");
        assert_eq!(headers["x-forwarded-for"], "10.0.0.7");
    }

    #[tokio::test]
    async fn test_production_uses_alternate_target() {
        let client = RecordingClient::answering(StatusCode::OK);
        let dispatcher = dispatcher(client.clone(), Environment::Production);

        dispatcher
            .handle_request(get("/summary/stt/process"), None)
            .await
            .unwrap();
        let (uri, _) = client.last();
        assert_eq!(uri.authority().unwrap().as_str(), "llm-api-container:8090");
    }

    #[tokio::test]
    async fn test_websocket_route_keeps_host_and_sets_upgrade_headers() {
        let client = RecordingClient::answering(StatusCode::BAD_REQUEST);
        let dispatcher = dispatcher(client.clone(), Environment::Development);

        let response = dispatcher.handle_request(get("/ws/info"), None).await.unwrap();
        // a non-101 answer is passed through untouched
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let (uri, headers) = client.last();
        assert_eq!(uri.to_string(), "http://localhost:8087/ws/info");
        assert_eq!(headers[header::HOST], "gateway.example.com");
        assert_eq!(headers[header::CONNECTION], "Upgrade");
        assert_eq!(headers[header::UPGRADE], "websocket");
        assert_eq!(headers[header::SEC_WEBSOCKET_VERSION], "13");
    }

    #[tokio::test]
    async fn test_unknown_path_is_404_without_forwarding() {
        let client = RecordingClient::answering(StatusCode::OK);
        let dispatcher = dispatcher(client.clone(), Environment::Development);

        // extension routes are disabled by default
        let response = dispatcher.handle_request(get("/api/v1/items"), None).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(client.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_502() {
        let dispatcher = dispatcher(RecordingClient::failing(), Environment::Development);
        let response = dispatcher.handle_request(get("/auth/x"), None).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_upstream_status_passes_through() {
        let client = RecordingClient::answering(StatusCode::IM_A_TEAPOT);
        let dispatcher = dispatcher(client, Environment::Development);
        let response = dispatcher.handle_request(get("/auth/x"), None).await.unwrap();
        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"upstream");
    }

    #[tokio::test]
    async fn test_health_is_answered_locally() {
        let client = RecordingClient::answering(StatusCode::OK);
        let dispatcher = dispatcher(client.clone(), Environment::Development);

        let response = dispatcher.handle_request(get("/health"), None).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json, serde_json::json!({"status": "ok", "routes": 3}));
        assert!(client.seen.lock().unwrap().is_empty());
    }

    fn protected_table() -> Arc<RouteTable> {
        let routes = vec![
            RouteDescriptor::new("secure", &["/secure/**"], "http://localhost:9000", "http://secure:9000")
                .auth_required(true),
        ];
        Arc::new(RouteTable::build(&routes, Environment::Development).unwrap())
    }

    #[tokio::test]
    async fn test_auth_required_without_gate_fails_closed() {
        let client = RecordingClient::answering(StatusCode::OK);
        let dispatcher = Dispatcher::new(protected_table(), client.clone());

        let response = dispatcher.handle_request(get("/secure/a"), None).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(client.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_auth_gate_deny_and_allow() {
        let client = RecordingClient::answering(StatusCode::OK);
        let denying = Dispatcher::new(protected_table(), client.clone()).with_auth_gate(Arc::new(
            StaticGate(AuthDecision::Deny {
                status: StatusCode::FORBIDDEN,
            }),
        ));
        let response = denying.handle_request(get("/secure/a"), None).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let mut identity = axum::http::HeaderMap::new();
        identity.insert("x-user-id", HeaderValue::from_static("42"));
        let allowing = Dispatcher::new(protected_table(), client.clone())
            .with_auth_gate(Arc::new(StaticGate(AuthDecision::Allow { headers: identity })));
        let response = allowing.handle_request(get("/secure/a"), None).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let (_, headers) = client.last();
        assert_eq!(headers["x-user-id"], "42");
    }
}
