pub mod job;
pub mod order;
pub mod publish;
pub mod recompute;
pub mod store;

pub use job::{Category, Job, JobId, NewJob, Priority, ScheduleEntry};
pub use order::{compute_schedule, Exclusion, ExclusionReason, ScheduleOutcome};
pub use publish::{
    MemoryScheduleStore, PublishAck, Schedule, SchedulePublisher, ScheduleReader, ScheduleStore,
};
pub use recompute::Recomputer;
pub use store::{JobStore, MemoryJobStore};
