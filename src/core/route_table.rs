//! Immutable route table.
//!
//! The `RouteTable` is built once from the ordered list of
//! [`RouteDescriptor`]s and never mutated afterwards, so request handling can
//! share it behind an `Arc` without locking. It provides:
//! * Glob pattern compilation (`*`, `?`, `{var}` inside a segment, `**` across segments)
//! * First‑match lookup in declaration order, skipping disabled routes
//! * Environment‑aware target selection, resolved at build time
//!
//! Any malformed pattern, duplicate id or unusable target makes `build` fail;
//! the process must not start with a partial table.
use std::collections::HashSet;

use http::Uri;
use regex::Regex;
use thiserror::Error;

use crate::{
    config::{RouteDescriptor, RouteKind},
    core::environment::Environment,
};

/// Errors raised while building the route table
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RouteTableError {
    #[error("Duplicate route id: {0}")]
    DuplicateId(String),

    #[error("Route '{0}' declares no paths")]
    NoPaths(String),

    #[error("Invalid path pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Route '{id}' has invalid target '{target}': {reason}")]
    InvalidTarget {
        id: String,
        target: String,
        reason: String,
    },
}

/// A compiled glob-style path pattern.
#[derive(Debug, Clone)]
pub struct RoutePattern {
    raw: String,
    regex: Regex,
}

impl RoutePattern {
    pub fn compile(raw: &str) -> Result<Self, RouteTableError> {
        let invalid = |reason: &str| RouteTableError::InvalidPattern {
            pattern: raw.to_string(),
            reason: reason.to_string(),
        };

        if !raw.starts_with('/') {
            return Err(invalid("pattern must start with '/'"));
        }

        let mut expr = String::from("^");
        if raw == "/" {
            expr.push('/');
        } else {
            for segment in raw[1..].split('/') {
                if segment == "**" {
                    // zero or more whole segments, so "/ws/**" also matches "/ws"
                    expr.push_str("(?:/.*)?");
                    continue;
                }
                if segment.contains("**") {
                    return Err(invalid("'**' must occupy a whole segment"));
                }

                expr.push('/');
                let mut chars = segment.chars();
                while let Some(c) = chars.next() {
                    match c {
                        '*' => expr.push_str("[^/]*"),
                        '?' => expr.push_str("[^/]"),
                        '{' => {
                            let mut name_len = 0;
                            let mut closed = false;
                            for n in chars.by_ref() {
                                match n {
                                    '}' => {
                                        closed = true;
                                        break;
                                    }
                                    '{' => return Err(invalid("nested '{' in path variable")),
                                    _ => name_len += 1,
                                }
                            }
                            if !closed {
                                return Err(invalid("unclosed '{' in path variable"));
                            }
                            if name_len == 0 {
                                return Err(invalid("empty path variable name"));
                            }
                            expr.push_str("[^/]+");
                        }
                        '}' => return Err(invalid("unbalanced '}'")),
                        other => {
                            let mut buf = [0u8; 4];
                            expr.push_str(&regex::escape(other.encode_utf8(&mut buf)));
                        }
                    }
                }
            }
        }
        expr.push('$');

        let regex = Regex::new(&expr).map_err(|e| invalid(&e.to_string()))?;
        Ok(Self {
            raw: raw.to_string(),
            regex,
        })
    }

    pub fn matches(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

/// A route as held by the table, with its target already resolved for the
/// process environment.
#[derive(Debug, Clone)]
pub struct Route {
    pub id: String,
    pub ordinal: usize,
    pub patterns: Vec<RoutePattern>,
    pub enabled: bool,
    pub kind: RouteKind,
    pub auth_required: bool,
    /// Environment-selected upstream
    pub target: Uri,
}

impl Route {
    pub fn matches(&self, path: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(path))
    }

    pub fn is_upgrade(&self) -> bool {
        self.kind == RouteKind::Websocket
    }
}

/// Ordered, read-only set of routes.
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<Route>,
    environment: Environment,
}

impl RouteTable {
    /// Build the table from route declarations, in declaration order.
    pub fn build(
        descriptors: &[RouteDescriptor],
        environment: Environment,
    ) -> Result<Self, RouteTableError> {
        let mut seen = HashSet::new();
        let mut routes = Vec::with_capacity(descriptors.len());

        for (ordinal, descriptor) in descriptors.iter().enumerate() {
            if !seen.insert(descriptor.id.as_str()) {
                return Err(RouteTableError::DuplicateId(descriptor.id.clone()));
            }
            if descriptor.paths.is_empty() {
                return Err(RouteTableError::NoPaths(descriptor.id.clone()));
            }

            let patterns = descriptor
                .paths
                .iter()
                .map(|p| RoutePattern::compile(p))
                .collect::<Result<Vec<_>, _>>()?;

            // Both targets are checked so a bad production URI fails in development too
            let primary = Self::parse_target(&descriptor.id, &descriptor.uri)?;
            let alternate = Self::parse_target(&descriptor.id, &descriptor.prod_uri)?;
            let target = environment.select(primary, alternate);

            routes.push(Route {
                id: descriptor.id.clone(),
                ordinal,
                patterns,
                enabled: descriptor.enabled,
                kind: descriptor.kind,
                auth_required: descriptor.auth_required,
                target,
            });
        }

        for route in routes.iter().filter(|r| r.enabled) {
            tracing::info!(
                route.id = %route.id,
                route.target = %route.target,
                route.kind = ?route.kind,
                route.paths = ?route.patterns.iter().map(RoutePattern::as_str).collect::<Vec<_>>(),
                "Route enabled"
            );
        }

        Ok(Self {
            routes,
            environment,
        })
    }

    fn parse_target(id: &str, raw: &str) -> Result<Uri, RouteTableError> {
        let invalid = |reason: String| RouteTableError::InvalidTarget {
            id: id.to_string(),
            target: raw.to_string(),
            reason,
        };

        let uri: Uri = raw.parse().map_err(|e: http::uri::InvalidUri| invalid(e.to_string()))?;
        match uri.scheme_str() {
            Some("http" | "https" | "ws" | "wss") => {}
            Some(other) => return Err(invalid(format!("unsupported scheme '{other}'"))),
            None => return Err(invalid("missing scheme".to_string())),
        }
        if uri.authority().is_none() {
            return Err(invalid("missing host".to_string()));
        }
        Ok(uri)
    }

    /// First enabled route, in declaration order, with a pattern matching `path`.
    pub fn resolve(&self, path: &str) -> Option<&Route> {
        let found = self
            .routes
            .iter()
            .filter(|route| route.enabled)
            .find(|route| route.matches(path));

        if let Some(route) = found {
            tracing::debug!("Path {} matched route {} -> {}", path, route.id, route.target);
        }
        found
    }

    /// Target URI for `path`, if any route matches.
    pub fn resolve_target(&self, path: &str) -> Option<&Uri> {
        self.resolve(path).map(|route| &route.target)
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn get(&self, id: &str) -> Option<&Route> {
        self.routes.iter().find(|r| r.id == id)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn enabled_count(&self) -> usize {
        self.routes.iter().filter(|r| r.enabled).count()
    }
}
