use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::{Rejection, StoreError};
use crate::intake::submission::Submission;
use crate::intake::validator::IntakeValidator;
use crate::queue::{QueueMessage, SubmissionQueue};
use crate::scheduler::job::{Category, Job};
use crate::scheduler::publish::PublishAck;
use crate::scheduler::recompute::Recomputer;
use crate::scheduler::store::JobStore;

/// What happened to one queue message.
#[derive(Debug)]
pub enum ProcessOutcome {
    /// Persisted. `publish` is `None` if the follow-up recompute failed.
    Accepted {
        job: Job,
        publish: Option<PublishAck>,
    },
    /// Refused permanently; the message was acked and dropped.
    Rejected(Rejection),
    /// Transient failure before persistence; the message was nacked.
    Requeued(StoreError),
}

/// Drains one category queue: validate → persist → recompute → publish → ack.
pub struct SubmissionConsumer {
    category: Category,
    queue: Arc<dyn SubmissionQueue>,
    validator: Arc<IntakeValidator>,
    jobs: Arc<dyn JobStore>,
    recomputer: Arc<Recomputer>,
}

impl SubmissionConsumer {
    pub fn new(
        category: Category,
        queue: Arc<dyn SubmissionQueue>,
        validator: Arc<IntakeValidator>,
        jobs: Arc<dyn JobStore>,
        recomputer: Arc<Recomputer>,
    ) -> Self {
        Self {
            category,
            queue,
            validator,
            jobs,
            recomputer,
        }
    }

    /// Process messages one at a time until shutdown or until the queue closes.
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(category = %self.category, queue = %self.queue.name(), "Consumer started");

        loop {
            let message = tokio::select! {
                _ = shutdown.cancelled() => break,
                message = self.queue.receive() => match message {
                    Some(message) => message,
                    None => break,
                },
            };
            self.process(message).await;
        }

        tracing::info!(category = %self.category, "Consumer stopped");
    }

    /// Handle a single delivery, including its ack or nack.
    pub async fn process(&self, message: QueueMessage) -> ProcessOutcome {
        let delivery_id = message.delivery_id;
        tracing::debug!(
            category = %self.category,
            delivery_id = %delivery_id,
            attempt = message.attempt,
            body = %String::from_utf8_lossy(&message.body),
            "Received submission"
        );

        let outcome = self.handle(&message).await;

        let settled = match &outcome {
            ProcessOutcome::Requeued(_) => self.queue.nack(delivery_id).await,
            _ => self.queue.ack(delivery_id).await,
        };
        if let Err(e) = settled {
            tracing::error!(delivery_id = %delivery_id, error = %e, "Failed to settle message");
        }

        outcome
    }

    async fn handle(&self, message: &QueueMessage) -> ProcessOutcome {
        let submission = match Submission::from_json(&message.body) {
            Ok(submission) => submission,
            Err(e) => return self.reject(Rejection::Validation(e)),
        };

        let candidate = match self.validator.validate(&submission, &self.category).await {
            Ok(candidate) => candidate,
            Err(Rejection::Store(e)) => return self.requeue(e),
            Err(rejection) => return self.reject(rejection),
        };

        let job = match self.jobs.insert(candidate).await {
            Ok(job) => job,
            Err(e) => return self.requeue(e),
        };
        tracing::info!(
            job_id = %job.id,
            category = %job.category,
            priority = %job.priority,
            dependency = ?job.dependency.map(|d| d.0),
            "Job accepted"
        );

        // The job is stored; a retry would insert it twice, so never requeue past here.
        let publish = match self.recomputer.recompute().await {
            Ok(ack) => Some(ack),
            Err(e) => {
                tracing::error!(job_id = %job.id, error = %e, "Schedule recompute failed");
                None
            }
        };

        ProcessOutcome::Accepted { job, publish }
    }

    fn reject(&self, rejection: Rejection) -> ProcessOutcome {
        tracing::warn!(category = %self.category, reason = %rejection, "Submission rejected");
        ProcessOutcome::Rejected(rejection)
    }

    fn requeue(&self, error: StoreError) -> ProcessOutcome {
        tracing::error!(category = %self.category, error = %error, "Job store unavailable, requeueing");
        ProcessOutcome::Requeued(error)
    }
}
