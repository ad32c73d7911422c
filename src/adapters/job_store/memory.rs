use async_trait::async_trait;
use scc::HashMap;

use crate::{
    core::job::Job,
    ports::job_store::{JobStore, StoreError, StoreResult},
};

/// In-process job store backed by `scc::HashMap`.
///
/// Used for tests and for `store.type = "memory"` deployments where losing
/// jobs on restart is acceptable.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: HashMap<String, Job>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn find_by_key(&self, key: &str) -> StoreResult<Option<Job>> {
        Ok(self
            .jobs
            .get_async(key)
            .await
            .map(|entry| entry.get().clone()))
    }

    async fn insert(&self, job: &Job) -> StoreResult<()> {
        self.jobs
            .insert_async(job.key.clone(), job.clone())
            .await
            .map_err(|(key, _)| StoreError::Duplicate(key))
    }

    async fn update(&self, job: &Job) -> StoreResult<()> {
        match self.jobs.get_async(job.key.as_str()).await {
            Some(mut entry) => {
                let stored = entry.get_mut();
                // key and created_at are immutable once stored
                stored.input_text = job.input_text.clone();
                stored.output_text = job.output_text.clone();
                stored.updated_at = job.updated_at;
                Ok(())
            }
            None => Err(StoreError::NotFound(job.key.clone())),
        }
    }
}
