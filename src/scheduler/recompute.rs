use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::scheduler::order::{compute_schedule, ExclusionReason};
use crate::scheduler::publish::{PublishAck, SchedulePublisher};
use crate::scheduler::store::JobStore;

/// Serializes read-store → compute → publish.
///
/// Only one recomputation runs at a time and each one reads the job store
/// after acquiring the gate, so the schedule published last always covers
/// every job persisted before it started. Two concurrent submissions can
/// never leave a schedule computed from an older snapshot in place.
pub struct Recomputer {
    jobs: Arc<dyn JobStore>,
    publisher: SchedulePublisher,
    gate: Mutex<()>,
}

impl Recomputer {
    pub fn new(jobs: Arc<dyn JobStore>, publisher: SchedulePublisher) -> Self {
        Self {
            jobs,
            publisher,
            gate: Mutex::new(()),
        }
    }

    /// Recompute the schedule from the whole job store and publish it.
    pub async fn recompute(&self) -> Result<PublishAck, StoreError> {
        let _guard = self.gate.lock().await;

        let jobs = self.jobs.list_ordered().await?;
        let outcome = compute_schedule(&jobs);

        let cyclic = outcome
            .excluded
            .iter()
            .filter(|e| e.reason == ExclusionReason::CyclicDependency)
            .count();
        if !outcome.excluded.is_empty() {
            tracing::warn!(
                excluded = outcome.excluded.len(),
                cyclic,
                "Jobs excluded from schedule"
            );
        }

        self.publisher.publish(outcome.entries).await
    }
}
