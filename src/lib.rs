//! edgeway - an edge gateway and an idempotent text-processing service.
//!
//! The crate ships two services that are usually deployed side by side:
//!
//! - the **gateway** resolves each inbound path against an ordered route table,
//!   picks the local or production target according to the deployment
//!   environment, and forwards plain HTTP or upgraded WebSocket connections
//! - the **processor** accepts keyed text submissions, persists them as jobs,
//!   hands the text to a downstream orchestrator and answers with a
//!   `{result, code, answer}` envelope
//!
//! # Quick Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use edgeway::{Dispatcher, HttpClientAdapter, core::RouteTable};
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let cfg = edgeway::config::load_config("edgeway.toml").await?;
//! let routes = RouteTable::build(&cfg.gateway.routes, cfg.environment)?;
//! let app = Dispatcher::new(Arc::new(routes), Arc::new(HttpClientAdapter::new()?)).into_router();
//! # let _ = app;
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! Traits live in `ports`, their implementations in `adapters`, and the
//! routing and pipeline logic in `core`, which depends only on the ports.
//!
//! # Error Handling
//! Service boundaries use `eyre::Result<T>`; ports and core types carry
//! `thiserror` enums so callers can match on the failure.
pub mod config;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

pub mod adapters;
pub mod core;

// Re-export the specific types needed by the binary crate
pub use crate::{
    adapters::{Dispatcher, HttpClientAdapter, InMemoryJobStore, OrchestratorClient, SqliteJobStore},
    core::{ProcessingPipeline, RouteTable},
    ports::{HttpClient, JobStore, Orchestrator},
    utils::GracefulShutdown,
};
