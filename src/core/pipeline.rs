//! Idempotent store-call-persist pipeline.
//!
//! `process` is keyed by the caller's key:
//! - the first submission creates the job row
//! - a later submission with different input overwrites the input in place
//! - the processor is called on every submission, repeat or not
//! - output is persisted only once the processor returns a non-empty answer
//!
//! Failures never escape as errors; they come back as envelopes with a
//! taxonomy code and are logged with the key.
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
    core::{
        envelope::{ErrorCode, ProcessResponse, QueryResponse},
        job::Job,
        payload::{Payload, ProcessRequest},
    },
    ports::{
        job_store::{JobStore, StoreError},
        orchestrator::{Orchestrator, OrchestratorError},
    },
};

/// Source of "now" for job timestamps
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Rejections detected before any persistence or network work
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("key is required")]
    MissingKey,
    #[error("input text is required")]
    MissingInput,
    #[error("malformed request: {0}")]
    Malformed(String),
}

impl RequestError {
    pub fn code(&self) -> ErrorCode {
        match self {
            RequestError::MissingKey | RequestError::Malformed(_) => ErrorCode::BadRequest,
            RequestError::MissingInput => ErrorCode::MissingInput,
        }
    }
}

/// Check the fields `process` depends on. The key is checked first.
pub fn validate_request(request: &ProcessRequest) -> Result<(), RequestError> {
    if request.key_str().trim().is_empty() {
        return Err(RequestError::MissingKey);
    }
    if request.input_str().trim().is_empty() {
        return Err(RequestError::MissingInput);
    }
    Ok(())
}

#[derive(Error, Debug)]
enum PipelineError {
    #[error("job store: {0}")]
    Store(#[from] StoreError),
    #[error("processor: {0}")]
    Orchestrator(#[from] OrchestratorError),
}

#[derive(Clone)]
pub struct ProcessingPipeline {
    store: Arc<dyn JobStore>,
    orchestrator: Arc<dyn Orchestrator>,
    clock: Clock,
}

impl ProcessingPipeline {
    pub fn new(store: Arc<dyn JobStore>, orchestrator: Arc<dyn Orchestrator>) -> Self {
        Self {
            store,
            orchestrator,
            clock: Arc::new(Utc::now),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    pub async fn process(&self, request: &ProcessRequest) -> ProcessResponse {
        if let Err(e) = validate_request(request) {
            debug!(error = %e, "rejected process request");
            return ProcessResponse::failure(e.code(), e.to_string());
        }

        let key = request.key_str();
        match self.run(request).await {
            Ok(answer) => {
                info!(key = %key, answer_len = answer.len(), "job processed");
                ProcessResponse::success(answer)
            }
            Err(e) => {
                error!(key = %key, error = %e, "job processing failed");
                ProcessResponse::failure(ErrorCode::Internal, e.to_string())
            }
        }
    }

    pub async fn query(&self, key: &str) -> QueryResponse {
        if key.trim().is_empty() {
            return QueryResponse::failure(ErrorCode::BadRequest, RequestError::MissingKey.to_string());
        }

        match self.store.find_by_key(key).await {
            Ok(Some(job)) => QueryResponse::success(job),
            Ok(None) => QueryResponse::failure(ErrorCode::NotFound, format!("no job for key {key}")),
            Err(e) => {
                error!(key = %key, error = %e, "job query failed");
                QueryResponse::failure(ErrorCode::Internal, e.to_string())
            }
        }
    }

    async fn run(&self, request: &ProcessRequest) -> Result<String, PipelineError> {
        let key = request.key_str();
        let input = request.input_str();

        let mut job = match self.store.find_by_key(key).await? {
            Some(existing) => self.reconcile_input(existing, input).await?,
            None => self.create(key, input).await?,
        };

        // No store interaction is held open across this call.
        let payload = Payload::from_request(request);
        let answer = self.orchestrator.submit(&payload).await?;
        if answer.trim().is_empty() {
            return Err(OrchestratorError::EmptyResponse.into());
        }

        job.set_output(answer.as_str(), self.now());
        self.store.update(&job).await?;
        Ok(answer)
    }

    async fn create(&self, key: &str, input: &str) -> Result<Job, PipelineError> {
        let job = Job::new(key, input, self.now());
        match self.store.insert(&job).await {
            Ok(()) => {
                debug!(key = %key, "job created");
                Ok(job)
            }
            Err(StoreError::Duplicate(_)) => {
                // Another submission created the row first; continue as its update.
                warn!(key = %key, "lost first-insert race, continuing as update");
                let existing = self
                    .store
                    .find_by_key(key)
                    .await?
                    .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
                self.reconcile_input(existing, input).await
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn reconcile_input(&self, mut job: Job, input: &str) -> Result<Job, PipelineError> {
        if job.update_input(input, self.now()) {
            debug!(key = %job.key, "input changed, overwriting");
            self.store.update(&job).await?;
        }
        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicI64, AtomicUsize, Ordering},
    };

    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::{
        adapters::job_store::InMemoryJobStore,
        ports::{job_store::StoreResult, orchestrator::OrchestratorResult},
    };

    /// Returns a fixed answer and records every payload it receives.
    struct ScriptedOrchestrator {
        answer: Mutex<Result<String, ()>>,
        calls: Mutex<Vec<Payload>>,
    }

    impl ScriptedOrchestrator {
        fn answering(answer: &str) -> Arc<Self> {
            Arc::new(Self {
                answer: Mutex::new(Ok(answer.to_string())),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn unreachable() -> Arc<Self> {
            Arc::new(Self {
                answer: Mutex::new(Err(())),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn set_answer(&self, answer: &str) {
            *self.answer.lock().unwrap() = Ok(answer.to_string());
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Orchestrator for ScriptedOrchestrator {
        async fn submit(&self, payload: &Payload) -> OrchestratorResult<String> {
            self.calls.lock().unwrap().push(payload.clone());
            match &*self.answer.lock().unwrap() {
                Ok(answer) => Ok(answer.clone()),
                Err(()) => Err(OrchestratorError::Transport("connection refused".into())),
            }
        }
    }

    /// Reports the key as absent on the first lookup even though another
    /// writer already stored it, forcing the insert path to collide.
    struct RacingStore {
        inner: InMemoryJobStore,
        lookups: AtomicUsize,
    }

    #[async_trait]
    impl JobStore for RacingStore {
        async fn find_by_key(&self, key: &str) -> StoreResult<Option<Job>> {
            if self.lookups.fetch_add(1, Ordering::SeqCst) == 0 {
                return Ok(None);
            }
            self.inner.find_by_key(key).await
        }

        async fn insert(&self, job: &Job) -> StoreResult<()> {
            self.inner.insert(job).await
        }

        async fn update(&self, job: &Job) -> StoreResult<()> {
            self.inner.update(job).await
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl JobStore for BrokenStore {
        async fn find_by_key(&self, _key: &str) -> StoreResult<Option<Job>> {
            Err(StoreError::Connection("database is locked".into()))
        }

        async fn insert(&self, _job: &Job) -> StoreResult<()> {
            Err(StoreError::Connection("database is locked".into()))
        }

        async fn update(&self, _job: &Job) -> StoreResult<()> {
            Err(StoreError::Connection("database is locked".into()))
        }
    }

    /// Each call returns one second after the previous one.
    fn ticking_clock() -> (Clock, DateTime<Utc>) {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let ticks = Arc::new(AtomicI64::new(0));
        let clock: Clock = Arc::new(move || {
            start + Duration::seconds(ticks.fetch_add(1, Ordering::SeqCst))
        });
        (clock, start)
    }

    fn pipeline(
        store: Arc<dyn JobStore>,
        orchestrator: Arc<dyn Orchestrator>,
    ) -> (ProcessingPipeline, DateTime<Utc>) {
        let (clock, start) = ticking_clock();
        (ProcessingPipeline::new(store, orchestrator).with_clock(clock), start)
    }

    #[tokio::test]
    async fn test_first_submission_creates_and_persists_output() {
        let store = Arc::new(InMemoryJobStore::new());
        let processor = ScriptedOrchestrator::answering("A");
        let (pipeline, start) = pipeline(store.clone(), processor.clone());

        let response = pipeline.process(&ProcessRequest::new("k1", "hello")).await;
        assert!(response.is_success());
        assert_eq!(response.answer, "A");

        let job = store.find_by_key("k1").await.unwrap().unwrap();
        assert_eq!(job.input_text, "hello");
        assert_eq!(job.output_text.as_deref(), Some("A"));
        assert_eq!(job.created_at, start);
        assert!(job.updated_at > job.created_at);
        assert_eq!(processor.call_count(), 1);
    }

    #[tokio::test]
    async fn test_repeat_submission_is_idempotent_on_rows() {
        let store = Arc::new(InMemoryJobStore::new());
        let processor = ScriptedOrchestrator::answering("A");
        let (pipeline, _) = pipeline(store.clone(), processor.clone());

        let first = pipeline.process(&ProcessRequest::new("k1", "hello")).await;
        let second = pipeline.process(&ProcessRequest::new("k1", "hello")).await;

        assert_eq!(first, second);
        assert_eq!(store.len(), 1);
        // processor is called again for repeats
        assert_eq!(processor.call_count(), 2);
    }

    #[tokio::test]
    async fn test_changed_input_overwrites_in_place() {
        let store = Arc::new(InMemoryJobStore::new());
        let processor = ScriptedOrchestrator::answering("A");
        let (pipeline, _) = pipeline(store.clone(), processor.clone());

        pipeline.process(&ProcessRequest::new("k1", "x")).await;
        let before = store.find_by_key("k1").await.unwrap().unwrap();

        processor.set_answer("B");
        let response = pipeline.process(&ProcessRequest::new("k1", "y")).await;
        assert_eq!(response.answer, "B");

        let after = store.find_by_key("k1").await.unwrap().unwrap();
        assert_eq!(after.input_text, "y");
        assert_eq!(after.output_text.as_deref(), Some("B"));
        assert_eq!(after.created_at, before.created_at);
        assert!(after.updated_at > before.updated_at);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_answer_is_internal_and_keeps_output() {
        let store = Arc::new(InMemoryJobStore::new());
        let processor = ScriptedOrchestrator::answering("first");
        let (pipeline, _) = pipeline(store.clone(), processor.clone());
        pipeline.process(&ProcessRequest::new("k1", "hello")).await;

        processor.set_answer("");
        let response = pipeline.process(&ProcessRequest::new("k1", "hello")).await;
        assert_eq!(response.code, "E500");
        assert_eq!(response.result, "0");

        let job = store.find_by_key("k1").await.unwrap().unwrap();
        assert_eq!(job.output_text.as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn test_unreachable_processor_leaves_input_row() {
        let store = Arc::new(InMemoryJobStore::new());
        let (pipeline, _) = pipeline(store.clone(), ScriptedOrchestrator::unreachable());

        let response = pipeline.process(&ProcessRequest::new("k1", "hello")).await;
        assert_eq!(response.code, "E500");
        assert!(response.answer.contains("connection refused"));

        let job = store.find_by_key("k1").await.unwrap().unwrap();
        assert_eq!(job.input_text, "hello");
        assert!(job.output_text.is_none());
    }

    #[tokio::test]
    async fn test_validation_short_circuits() {
        let store = Arc::new(InMemoryJobStore::new());
        let processor = ScriptedOrchestrator::answering("A");
        let (pipeline, _) = pipeline(store.clone(), processor.clone());

        let missing_key = pipeline.process(&ProcessRequest::new("  ", "hello")).await;
        assert_eq!(missing_key.code, "E400");

        let missing_input = pipeline.process(&ProcessRequest::new("k1", "")).await;
        assert_eq!(missing_input.code, "E401");

        // both missing: key wins
        let both = pipeline.process(&ProcessRequest::default()).await;
        assert_eq!(both.code, "E400");

        assert!(store.is_empty());
        assert_eq!(processor.call_count(), 0);
    }

    #[tokio::test]
    async fn test_lost_insert_race_continues_as_update() {
        let inner = InMemoryJobStore::new();
        let t = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        inner.insert(&Job::new("k1", "from other writer", t)).await.unwrap();
        let store = Arc::new(RacingStore {
            inner,
            lookups: AtomicUsize::new(0),
        });
        let (pipeline, _) = pipeline(store.clone(), ScriptedOrchestrator::answering("A"));

        let response = pipeline.process(&ProcessRequest::new("k1", "mine")).await;
        assert!(response.is_success());

        let job = store.inner.find_by_key("k1").await.unwrap().unwrap();
        assert_eq!(job.input_text, "mine");
        assert_eq!(job.created_at, t);
        assert_eq!(store.inner.len(), 1);
    }

    #[tokio::test]
    async fn test_query_after_process() {
        let store = Arc::new(InMemoryJobStore::new());
        let (pipeline, _) = pipeline(store, ScriptedOrchestrator::answering("A"));
        pipeline.process(&ProcessRequest::new("k1", "hello")).await;

        let found = pipeline.query("k1").await;
        assert!(found.is_success());
        assert_eq!(found.input_text.as_deref(), Some("hello"));
        assert_eq!(found.output_text.as_deref(), Some("A"));

        let missing = pipeline.query("nope").await;
        assert_eq!(missing.code, "E404");
    }

    #[tokio::test]
    async fn test_store_failure_maps_to_internal() {
        let (pipeline, _) = pipeline(Arc::new(BrokenStore), ScriptedOrchestrator::answering("A"));

        let processed = pipeline.process(&ProcessRequest::new("k1", "hello")).await;
        assert_eq!(processed.code, "E500");

        let queried = pipeline.query("k1").await;
        assert_eq!(queried.code, "E500");
        assert!(queried.message.unwrap().contains("database is locked"));
    }

    #[tokio::test]
    async fn test_payload_reaches_processor() {
        let processor = ScriptedOrchestrator::answering("A");
        let (pipeline, _) = pipeline(Arc::new(InMemoryJobStore::new()), processor.clone());
        let request = ProcessRequest::new("k1", "hello").with_system_prompt("be brief");
        pipeline.process(&request).await;

        let calls = processor.calls.lock().unwrap();
        assert_eq!(calls[0].get("callkey"), Some(&serde_json::json!("k1")));
        assert_eq!(calls[0].get("system_prompt"), Some(&serde_json::json!("be brief")));
    }
}
