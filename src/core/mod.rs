pub mod envelope;
pub mod environment;
pub mod job;
pub mod payload;
pub mod pipeline;
pub mod route_table;

pub use envelope::{ErrorCode, ProcessResponse, QueryResponse};
pub use environment::Environment;
pub use job::Job;
pub use payload::{Payload, ProcessRequest};
pub use pipeline::ProcessingPipeline;
pub use route_table::{Route, RouteTable, RouteTableError};
