//! Job intake: from raw queue messages to persisted jobs.
//!
//! - [`Submission`]: the JSON shape producers send, with pure normalization
//! - [`LogicalClock`]: monotonic millisecond timestamps for submissions
//! - [`IntakeValidator`]: dependency existence, causality and cycle checks
//! - [`SubmissionConsumer`]: per-category loop that persists accepted jobs and
//!   triggers a schedule recompute before acking

pub mod clock;
pub mod consumer;
pub mod submission;
pub mod validator;

pub use clock::LogicalClock;
pub use consumer::{ProcessOutcome, SubmissionConsumer};
pub use submission::{NormalizedSubmission, RawDependency, RawPriority, Submission};
pub use validator::IntakeValidator;
