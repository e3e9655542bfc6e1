//! Job persistence boundary

use crate::error::{OrchestrationError, OrchestrationResult};
use crate::job::{Job, JobId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

/// Storage for job records.
///
/// The orchestrator serializes its own read-modify-write cycles, so a store
/// only needs whole-record `save` and `load`.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert or replace a job record
    async fn save(&self, job: &Job) -> OrchestrationResult<()>;

    /// Load a job record
    async fn load(&self, id: JobId) -> OrchestrationResult<Option<Job>>;

    /// Every job record, in no particular order
    async fn list(&self) -> OrchestrationResult<Vec<Job>>;
}

/// Job store backed by a `HashMap`
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<E: std::fmt::Display>(err: E) -> OrchestrationError {
    OrchestrationError::Store {
        message: format!("job store lock poisoned: {}", err),
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn save(&self, job: &Job) -> OrchestrationResult<()> {
        self.jobs
            .write()
            .map_err(poisoned)?
            .insert(job.id, job.clone());
        Ok(())
    }

    async fn load(&self, id: JobId) -> OrchestrationResult<Option<Job>> {
        Ok(self.jobs.read().map_err(poisoned)?.get(&id).cloned())
    }

    async fn list(&self) -> OrchestrationResult<Vec<Job>> {
        Ok(self.jobs.read().map_err(poisoned)?.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{EtlRequest, JobInput};

    #[tokio::test]
    async fn test_save_load_list() {
        let store = InMemoryJobStore::new();
        let job = Job::new(1, JobInput::Etl(EtlRequest::new("a", "b", "rule")), None);
        store.save(&job).await.unwrap();
        assert_eq!(store.load(job.id).await.unwrap(), Some(job.clone()));
        assert_eq!(store.list().await.unwrap().len(), 1);
        assert_eq!(store.load(uuid::Uuid::new_v4()).await.unwrap(), None);
    }
}
