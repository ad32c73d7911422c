//! Configuration data structures for edgeway.
//!
//! These types map directly to TOML (also JSON / YAML) configuration files. They are
//! serde‑friendly and include defaults so that a minimal config only names what differs
//! from the stock deployment. The route list is an ordered `Vec`: declaration order is
//! match priority.
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::environment::Environment;

/// Top level configuration shared by the `gateway` and `processor` commands.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Deployment profile; `prod`/`production` selects alternate route targets.
    pub environment: Environment,
    pub logging: LoggingConfig,
    pub gateway: GatewayConfig,
    pub processor: ProcessorConfig,
}

/// Logging output configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, overridden by `RUST_LOG` when set
    pub level: String,
    /// Emit JSON lines instead of the pretty console format
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
        }
    }
}

/// How a matched route forwards traffic.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RouteKind {
    /// Plain request/response proxying with the host header rewritten
    #[default]
    Http,
    /// Connection upgrade proxying with the original host header preserved
    Websocket,
}

fn default_enabled() -> bool {
    true
}

/// A single route declaration.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RouteDescriptor {
    /// Unique route id
    pub id: String,
    /// Glob-style path patterns; any of them matching selects the route
    pub paths: Vec<String>,
    /// Target used in the development environment
    pub uri: String,
    /// Target used in the production environment
    pub prod_uri: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub kind: RouteKind,
    /// Consult the auth gate before forwarding
    #[serde(default)]
    pub auth_required: bool,
}

impl RouteDescriptor {
    pub fn new(
        id: impl Into<String>,
        paths: &[&str],
        uri: impl Into<String>,
        prod_uri: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            paths: paths.iter().map(|p| p.to_string()).collect(),
            uri: uri.into(),
            prod_uri: prod_uri.into(),
            enabled: true,
            kind: RouteKind::Http,
            auth_required: false,
        }
    }

    pub fn kind(mut self, kind: RouteKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn auth_required(mut self, required: bool) -> Self {
        self.auth_required = required;
        self
    }
}

/// Gateway listener and route table configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct GatewayConfig {
    pub listen_addr: String,
    /// Local liveness endpoint answered by the gateway itself; `None` disables it
    pub health_path: Option<String>,
    /// Time allowed for an upstream to produce response headers, humantime format
    pub upstream_timeout: String,
    pub routes: Vec<RouteDescriptor>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            health_path: Some("/health".to_string()),
            upstream_timeout: "60s".to_string(),
            routes: default_routes(),
        }
    }
}

impl GatewayConfig {
    pub fn upstream_timeout_duration(&self) -> Result<Duration, humantime::DurationError> {
        humantime::parse_duration(&self.upstream_timeout)
    }
}

/// The stock route set: auth service, processing service, the socket
/// upgrade route and five extension slots that start disabled.
pub fn default_routes() -> Vec<RouteDescriptor> {
    let mut routes = vec![
        RouteDescriptor::new(
            "authService",
            &["/auth/**"],
            "http://localhost:28089",
            "http://auth-container:28089",
        ),
        RouteDescriptor::new(
            "processingService",
            &["/summary/stt/**"],
            "http://localhost:8090",
            "http://llm-api-container:8090",
        ),
        RouteDescriptor::new(
            "coreSockJsWebSocket",
            &["/ws/**", "/ws", "/topic/**"],
            "ws://localhost:8087",
            "ws://core-container:8087",
        )
        .kind(RouteKind::Websocket),
    ];

    for slot in 1..=5 {
        routes.push(
            RouteDescriptor::new(
                format!("customRoute{slot}"),
                &[format!("/api/v{slot}/**").as_str()],
                format!("http://localhost:808{slot}"),
                format!("http://service{slot}-container:808{slot}"),
            )
            .enabled(false),
        );
    }

    routes
}

/// Processing service configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ProcessorConfig {
    pub listen_addr: String,
    /// Path prefix for `/process` and `/query/{key}`
    pub base_path: String,
    pub store: StoreConfig,
    pub orchestrator: OrchestratorConfig,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8090".to_string(),
            base_path: "/summary/stt".to_string(),
            store: StoreConfig::default(),
            orchestrator: OrchestratorConfig::default(),
        }
    }
}

/// Job store backend selection
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum StoreConfig {
    Memory,
    Sqlite {
        /// e.g. `sqlite://jobs.db?mode=rwc` or `sqlite::memory:`
        url: String,
        #[serde(default = "default_max_connections")]
        max_connections: u32,
    },
}

fn default_max_connections() -> u32 {
    5
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::Sqlite {
            url: "sqlite://edgeway.db?mode=rwc".to_string(),
            max_connections: default_max_connections(),
        }
    }
}

/// Outbound client settings for the external text processor
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub base_url: String,
    /// Bounds connection establishment and the full response, humantime format
    pub timeout: String,
    pub max_connections_total: usize,
    pub max_connections_per_route: usize,
    /// Idle pooled connections older than this are dropped, humantime format
    pub pool_idle_timeout: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout: "120s".to_string(),
            max_connections_total: 200,
            max_connections_per_route: 100,
            pool_idle_timeout: "30s".to_string(),
        }
    }
}

impl OrchestratorConfig {
    pub fn timeout_duration(&self) -> Result<Duration, humantime::DurationError> {
        humantime::parse_duration(&self.timeout)
    }

    pub fn pool_idle_duration(&self) -> Result<Duration, humantime::DurationError> {
        humantime::parse_duration(&self.pool_idle_timeout)
    }
}
