pub mod dispatcher;
pub mod http_client;
pub mod job_store;
pub mod orchestrator_client;
pub mod processing_api;
pub mod trace_filter;

/// Re-export commonly used types from adapters
pub use dispatcher::Dispatcher;
pub use http_client::HttpClientAdapter;
pub use job_store::{InMemoryJobStore, SqliteJobStore};
pub use orchestrator_client::OrchestratorClient;
pub use trace_filter::{RequestTrace, TraceSink, TracingSink, create_trace_middleware};
