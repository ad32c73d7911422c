#![allow(clippy::collapsible_if)]

use std::net::SocketAddr;

use eyre::Result;
use regex::Regex;

use crate::{
    config::models::{AppConfig, GatewayConfig, LoggingConfig, ProcessorConfig, StoreConfig},
    core::route_table::RouteTable,
};

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Invalid route table: {message}")]
    InvalidRoutes { message: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Whole-application configuration validator.
///
/// Every check runs; failures are collected and reported together.
pub struct AppConfigValidator;

impl AppConfigValidator {
    pub fn validate(config: &AppConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        Self::validate_logging(&config.logging, &mut errors);
        Self::validate_gateway(config, &mut errors);
        Self::validate_processor(&config.processor, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    fn validate_logging(logging: &LoggingConfig, errors: &mut Vec<ValidationError>) {
        if let Err(e) = tracing_subscriber::EnvFilter::try_new(&logging.level) {
            errors.push(ValidationError::InvalidField {
                field: "logging.level".to_string(),
                message: e.to_string(),
            });
        }
    }

    fn validate_gateway(config: &AppConfig, errors: &mut Vec<ValidationError>) {
        let gateway: &GatewayConfig = &config.gateway;

        if let Err(e) = Self::validate_listen_address(&gateway.listen_addr) {
            errors.push(e);
        }

        if let Some(path) = &gateway.health_path {
            if !path.starts_with('/') {
                errors.push(ValidationError::InvalidField {
                    field: "gateway.health_path".to_string(),
                    message: "Must start with '/'".to_string(),
                });
            }
        }

        if let Err(e) = humantime::parse_duration(&gateway.upstream_timeout) {
            errors.push(ValidationError::InvalidField {
                field: "gateway.upstream_timeout".to_string(),
                message: e.to_string(),
            });
        }

        if gateway.routes.is_empty() {
            errors.push(ValidationError::MissingField {
                field: "gateway.routes".to_string(),
            });
            return;
        }

        let id_regex = Regex::new(r"^[A-Za-z][A-Za-z0-9_\-]*$").expect("Invalid regex pattern");
        for route in &gateway.routes {
            if !id_regex.is_match(&route.id) {
                errors.push(ValidationError::InvalidField {
                    field: format!("route id '{}'", route.id),
                    message: "Must start with a letter and contain only letters, digits, '_' or '-'"
                        .to_string(),
                });
            }
        }

        // Building the table checks patterns, targets and id uniqueness.
        if let Err(e) = RouteTable::build(&gateway.routes, config.environment) {
            errors.push(ValidationError::InvalidRoutes {
                message: e.to_string(),
            });
        }
    }

    fn validate_processor(processor: &ProcessorConfig, errors: &mut Vec<ValidationError>) {
        if let Err(e) = Self::validate_listen_address(&processor.listen_addr) {
            errors.push(e);
        }

        let base = &processor.base_path;
        if !base.starts_with('/') || base.contains('{') || base.contains('}') {
            errors.push(ValidationError::InvalidField {
                field: "processor.base_path".to_string(),
                message: "Must start with '/' and contain no '{' or '}'".to_string(),
            });
        }

        if let StoreConfig::Sqlite {
            url,
            max_connections,
        } = &processor.store
        {
            if !url.starts_with("sqlite:") {
                errors.push(ValidationError::InvalidField {
                    field: "processor.store.url".to_string(),
                    message: format!("Expected a 'sqlite:' URL, got '{url}'"),
                });
            }
            if *max_connections == 0 {
                errors.push(ValidationError::InvalidField {
                    field: "processor.store.max_connections".to_string(),
                    message: "Must be at least 1".to_string(),
                });
            }
        }

        let orchestrator = &processor.orchestrator;
        if let Err(e) = Self::validate_url(&orchestrator.base_url, "processor.orchestrator.base_url")
        {
            errors.push(e);
        }
        if let Err(e) = orchestrator.timeout_duration() {
            errors.push(ValidationError::InvalidField {
                field: "processor.orchestrator.timeout".to_string(),
                message: e.to_string(),
            });
        }
        if let Err(e) = orchestrator.pool_idle_duration() {
            errors.push(ValidationError::InvalidField {
                field: "processor.orchestrator.pool_idle_timeout".to_string(),
                message: e.to_string(),
            });
        }
        for (field, value) in [
            ("max_connections_total", orchestrator.max_connections_total),
            ("max_connections_per_route", orchestrator.max_connections_per_route),
        ] {
            if value == 0 {
                errors.push(ValidationError::InvalidField {
                    field: format!("processor.orchestrator.{field}"),
                    message: "Must be at least 1".to_string(),
                });
            }
        }
    }

    /// Validate listen address format
    fn validate_listen_address(address: &str) -> ValidationResult<()> {
        if address.parse::<SocketAddr>().is_err() {
            return Err(ValidationError::InvalidListenAddress {
                address: address.to_string(),
                reason: "Must be in format 'IP:PORT' (e.g., '127.0.0.1:3000' or '0.0.0.0:8080')"
                    .to_string(),
            });
        }
        Ok(())
    }

    fn validate_url(url_str: &str, context: &str) -> ValidationResult<()> {
        match url::Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    return Err(ValidationError::InvalidField {
                        field: context.to_string(),
                        message: format!(
                            "URL scheme must be 'http' or 'https', got '{}'",
                            url.scheme()
                        ),
                    });
                }

                if url.host().is_none() {
                    return Err(ValidationError::InvalidField {
                        field: context.to_string(),
                        message: "URL must have a valid host".to_string(),
                    });
                }

                Ok(())
            }
            Err(e) => Err(ValidationError::InvalidField {
                field: context.to_string(),
                message: format!("Invalid URL format: {e}"),
            }),
        }
    }

    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        if errors.len() == 1 {
            return errors[0].to_string();
        }

        let mut message = format!("Found {} validation errors:\n", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("  {}. {}\n", i + 1, error));
        }
        message
    }
}
