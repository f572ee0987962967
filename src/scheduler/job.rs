use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Store-assigned job identifier. Ids start at 1 and only grow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for JobId {
    fn from(id: u64) -> Self {
        JobId(id)
    }
}

/// Ordinal urgency tier. Lower numbers run first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Priority {
    High = 1,
    Medium = 2,
    Low = 3,
}

impl Priority {
    pub fn rank(self) -> u8 {
        self as u8
    }

    /// Parse either a tier name or its numeral.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        match raw.trim() {
            "High" | "1" => Ok(Priority::High),
            "Medium" | "2" => Ok(Priority::Medium),
            "Low" | "3" => Ok(Priority::Low),
            other => Err(ValidationError::InvalidPriority(other.to_string())),
        }
    }
}

impl TryFrom<u8> for Priority {
    type Error = ValidationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::try_from(value as i64)
    }
}

impl TryFrom<i64> for Priority {
    type Error = ValidationError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Priority::High),
            2 => Ok(Priority::Medium),
            3 => Ok(Priority::Low),
            other => Err(ValidationError::InvalidPriority(other.to_string())),
        }
    }
}

impl From<Priority> for u8 {
    fn from(p: Priority) -> Self {
        p.rank()
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::High => write!(f, "High"),
            Priority::Medium => write!(f, "Medium"),
            Priority::Low => write!(f, "Low"),
        }
    }
}

/// Routing tag naming the downstream consumer a job belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Category(String);

impl Category {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the message queue carrying this category's submissions.
    pub fn queue_name(&self) -> String {
        format!("{}-queue", self.0)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Category {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// An accepted submission that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJob {
    pub name: String,
    pub priority: Priority,
    pub submitted_at: i64,
    pub dependency: Option<JobId>,
    pub category: Category,
}

/// A persisted job. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub name: String,
    pub priority: Priority,
    pub submitted_at: i64,
    pub dependency: Option<JobId>,
    pub category: Category,
}

impl Job {
    pub fn from_new(id: JobId, job: NewJob) -> Self {
        Self {
            id,
            name: job.name,
            priority: job.priority,
            submitted_at: job.submitted_at,
            dependency: job.dependency,
            category: job.category,
        }
    }

    pub fn has_dependency(&self) -> bool {
        self.dependency.is_some()
    }

    /// Base ordering key: tier first, independent jobs ahead of dependent ones.
    pub fn base_order_key(&self) -> (Priority, bool) {
        (self.priority, self.has_dependency())
    }

    pub fn entry(&self) -> ScheduleEntry {
        ScheduleEntry {
            name: self.name.clone(),
            category: self.category.clone(),
        }
    }
}

/// One position in a published schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub category: Category,
}
