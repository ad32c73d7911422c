pub mod auth_gate;
pub mod http_client;
pub mod job_store;
pub mod orchestrator;

pub use auth_gate::{AuthDecision, AuthGate};
pub use http_client::{HttpClient, HttpClientError};
pub use job_store::{JobStore, StoreError};
pub use orchestrator::{Orchestrator, OrchestratorError};
