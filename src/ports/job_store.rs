use async_trait::async_trait;
use thiserror::Error;

use crate::core::job::Job;

/// Errors raised by job persistence backends
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum StoreError {
    /// Insert lost against an existing row with the same key
    #[error("Duplicate job key: {0}")]
    Duplicate(String),

    /// Update targeted a key with no stored row
    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    /// Stored data could not be decoded into a [`Job`]
    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// JobStore is the port for the single keyed job table.
///
/// Key uniqueness is enforced by the backend: concurrent inserts for the
/// same key must leave exactly one row and fail the losers with
/// [`StoreError::Duplicate`].
#[async_trait]
pub trait JobStore: Send + Sync + 'static {
    async fn find_by_key(&self, key: &str) -> StoreResult<Option<Job>>;

    /// Persist a new job. Fails with `Duplicate` if the key exists.
    async fn insert(&self, job: &Job) -> StoreResult<()>;

    /// Overwrite the mutable fields of an existing job.
    async fn update(&self, job: &Job) -> StoreResult<()>;
}
