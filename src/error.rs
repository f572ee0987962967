use thiserror::Error;

use crate::scheduler::job::JobId;

/// Submission shape problems caught before any store lookup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("name is required")]
    MissingName,

    #[error("priority is required")]
    MissingPriority,

    #[error("invalid priority: {0} (expected High, Medium, Low or 1-3)")]
    InvalidPriority(String),

    #[error("malformed dependency: {0}")]
    MalformedDependency(String),

    #[error("malformed submission: {0}")]
    MalformedPayload(String),
}

/// Why an intake candidate was refused.
#[derive(Error, Debug)]
pub enum Rejection {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("dependency {0} does not exist")]
    DependencyNotFound(JobId),

    #[error(
        "dependency {dependency} was submitted at {dependency_submitted_at}, after its dependent ({submitted_at})"
    )]
    DependencyCausalityViolation {
        dependency: JobId,
        dependency_submitted_at: i64,
        submitted_at: i64,
    },

    #[error("dependency chain starting at {0} is cyclic")]
    CyclicDependency(JobId),

    #[error("job store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("job store is at capacity ({0} jobs)")]
    Full(usize),

    #[error("job store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue {0} is closed")]
    Closed(String),

    #[error("queue {queue} is at capacity ({capacity} messages)")]
    Full { queue: String, capacity: usize },

    #[error("unknown delivery {0}")]
    UnknownDelivery(uuid::Uuid),

    #[error("no queue for category {0}")]
    UnknownCategory(String),
}

/// Fatal errors that stop a listener.
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Transport error: {0}")]
    TransportError(#[from] tonic::transport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
