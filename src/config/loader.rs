use std::path::Path;

use config::{Config, Environment as EnvSource, File, FileFormat};
use eyre::{Context, Result};

use crate::config::models::AppConfig;

/// Prefix for environment overrides, e.g. `EDGEWAY__ENVIRONMENT=prod`
pub const ENV_PREFIX: &str = "EDGEWAY";
/// Separator between nested keys in environment overrides
pub const ENV_SEPARATOR: &str = "__";

/// Configuration written by `edgeway init`.
pub const SAMPLE_CONFIG: &str = r#"# edgeway configuration

# Deployment profile: "prod" selects each route's prod_uri, anything else its uri
environment = "local"

[logging]
level = "info"
json = true

[gateway]
listen_addr = "0.0.0.0:8080"
health_path = "/health"
upstream_timeout = "60s"

[[gateway.routes]]
id = "authService"
paths = ["/auth/**"]
uri = "http://localhost:28089"
prod_uri = "http://auth-container:28089"

[[gateway.routes]]
id = "processingService"
paths = ["/summary/stt/**"]
uri = "http://localhost:8090"
prod_uri = "http://llm-api-container:8090"

[[gateway.routes]]
id = "coreSockJsWebSocket"
paths = ["/ws/**", "/ws", "/topic/**"]
uri = "ws://localhost:8087"
prod_uri = "ws://core-container:8087"
kind = "websocket"

# Extension slot, enable and point at a service as needed
[[gateway.routes]]
id = "customRoute1"
paths = ["/api/v1/**"]
uri = "http://localhost:8081"
prod_uri = "http://service1-container:8081"
enabled = false

[processor]
listen_addr = "0.0.0.0:8090"
base_path = "/summary/stt"

[processor.store]
type = "sqlite"
url = "sqlite://edgeway.db?mode=rwc"
max_connections = 5

[processor.orchestrator]
base_url = "http://localhost:8000"
timeout = "120s"
max_connections_total = 200
max_connections_per_route = 100
pool_idle_timeout = "30s"
"#;

/// Load configuration from a file using the config crate, then apply
/// `EDGEWAY__*` environment overrides.
/// Supports multiple formats: YAML, JSON, TOML.
pub async fn load_config(config_path: &str) -> Result<AppConfig> {
    load_config_sync(config_path)
}

/// Load configuration synchronously
pub fn load_config_sync(config_path: &str) -> Result<AppConfig> {
    let config_path = Path::new(config_path);

    // Determine file format based on extension
    let format = match config_path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => FileFormat::Yaml,
        Some("json") => FileFormat::Json,
        _ => FileFormat::Toml,
    };

    let settings = Config::builder()
        .add_source(File::new(
            config_path
                .to_str()
                .ok_or_else(|| eyre::eyre!("Invalid UTF-8 path: {}", config_path.display()))?,
            format,
        ))
        .add_source(env_source())
        .build()
        .with_context(|| format!("Failed to build config from {}", config_path.display()))?;

    settings.try_deserialize().with_context(|| {
        format!(
            "Failed to deserialize config from {}",
            config_path.display()
        )
    })
}

/// Built-in defaults plus environment overrides, for running without a file.
pub fn load_default_config() -> Result<AppConfig> {
    Config::builder()
        .add_source(env_source())
        .build()
        .context("Failed to build config from environment")?
        .try_deserialize()
        .context("Failed to deserialize config from environment")
}

fn env_source() -> EnvSource {
    EnvSource::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_SEPARATOR)
        .separator(ENV_SEPARATOR)
        .try_parsing(true)
}
