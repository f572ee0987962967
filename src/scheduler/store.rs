use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::scheduler::job::{Job, JobId, NewJob};

const DEFAULT_MAX_JOBS: usize = 100_000;

/// Durable record of every accepted job.
///
/// Jobs are append-only: the store assigns ids on insert and never updates or
/// removes a record afterwards.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a job and return it with its assigned id.
    async fn insert(&self, job: NewJob) -> Result<Job, StoreError>;

    /// Point lookup by id.
    async fn get(&self, id: JobId) -> Result<Option<Job>, StoreError>;

    /// Full scan sorted by `(priority, has_dependency)`, ties in insertion order.
    async fn list_ordered(&self) -> Result<Vec<Job>, StoreError>;

    async fn len(&self) -> Result<usize, StoreError>;
}

/// In-process job store backed by an id-ordered map.
#[derive(Debug)]
pub struct MemoryJobStore {
    inner: RwLock<StoreState>,
    max_jobs: usize,
}

#[derive(Debug, Default)]
struct StoreState {
    jobs: BTreeMap<JobId, Job>,
    next_id: u64,
}

impl Default for MemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_JOBS)
    }

    pub fn with_capacity(max_jobs: usize) -> Self {
        Self {
            inner: RwLock::new(StoreState {
                jobs: BTreeMap::new(),
                next_id: 1,
            }),
            max_jobs,
        }
    }

    /// Load already-persisted records, keeping their ids.
    ///
    /// Used to restore a store from another backend; new inserts continue
    /// after the highest seeded id.
    pub async fn seed(&self, jobs: impl IntoIterator<Item = Job>) {
        let mut state = self.inner.write().await;
        for job in jobs {
            state.next_id = state.next_id.max(job.id.0 + 1);
            state.jobs.insert(job.id, job);
        }
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, job: NewJob) -> Result<Job, StoreError> {
        let mut state = self.inner.write().await;
        if state.jobs.len() >= self.max_jobs {
            return Err(StoreError::Full(self.max_jobs));
        }
        let id = JobId(state.next_id);
        state.next_id += 1;
        let job = Job::from_new(id, job);
        state.jobs.insert(id, job.clone());
        tracing::debug!(job_id = %id, category = %job.category, "Job persisted");
        Ok(job)
    }

    async fn get(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        Ok(self.inner.read().await.jobs.get(&id).cloned())
    }

    async fn list_ordered(&self) -> Result<Vec<Job>, StoreError> {
        let state = self.inner.read().await;
        // BTreeMap iterates by id, which is insertion order; sort_by_key is stable.
        let mut jobs: Vec<Job> = state.jobs.values().cloned().collect();
        jobs.sort_by_key(Job::base_order_key);
        Ok(jobs)
    }

    async fn len(&self) -> Result<usize, StoreError> {
        Ok(self.inner.read().await.jobs.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::job::{Category, Priority};

    fn new_job(name: &str, priority: Priority, dependency: Option<u64>) -> NewJob {
        NewJob {
            name: name.to_string(),
            priority,
            submitted_at: 0,
            dependency: dependency.map(JobId),
            category: Category::from("mail"),
        }
    }

    #[tokio::test]
    async fn insert_assigns_monotonic_ids() {
        let store = MemoryJobStore::new();
        let a = store.insert(new_job("a", Priority::Low, None)).await.unwrap();
        let b = store.insert(new_job("b", Priority::High, None)).await.unwrap();
        assert_eq!(a.id, JobId(1));
        assert_eq!(b.id, JobId(2));
        assert_eq!(store.len().await.unwrap(), 2);
        assert_eq!(store.get(JobId(2)).await.unwrap().unwrap().name, "b");
        assert!(store.get(JobId(3)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_ordered_sorts_by_priority_then_dependency() {
        let store = MemoryJobStore::new();
        store.insert(new_job("low", Priority::Low, None)).await.unwrap();
        store.insert(new_job("high-dep", Priority::High, Some(1))).await.unwrap();
        store.insert(new_job("high", Priority::High, None)).await.unwrap();
        store.insert(new_job("high-2", Priority::High, None)).await.unwrap();

        let names: Vec<String> = store
            .list_ordered()
            .await
            .unwrap()
            .into_iter()
            .map(|j| j.name)
            .collect();
        assert_eq!(names, vec!["high", "high-2", "high-dep", "low"]);
    }

    #[tokio::test]
    async fn insert_rejected_at_capacity() {
        let store = MemoryJobStore::with_capacity(1);
        store.insert(new_job("a", Priority::Low, None)).await.unwrap();
        let err = store
            .insert(new_job("b", Priority::Low, None))
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::Full(1));
        assert_eq!(store.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn seed_keeps_ids_and_continues_after_them() {
        let store = MemoryJobStore::new();
        store
            .seed(vec![Job::from_new(JobId(7), new_job("seeded", Priority::Medium, None))])
            .await;
        let next = store.insert(new_job("next", Priority::Low, None)).await.unwrap();
        assert_eq!(next.id, JobId(8));
    }
}
