use std::collections::HashSet;
use std::sync::Arc;

use crate::error::Rejection;
use crate::intake::clock::LogicalClock;
use crate::intake::submission::Submission;
use crate::scheduler::job::{Category, JobId, NewJob};
use crate::scheduler::store::JobStore;

/// Turns raw submissions into jobs ready to persist.
///
/// Besides the shape checks of [`Submission::normalize`], a dependency must
/// already be stored, must not have been submitted after the new job, and its
/// own chain must not loop.
pub struct IntakeValidator {
    jobs: Arc<dyn JobStore>,
    clock: Arc<LogicalClock>,
}

impl IntakeValidator {
    pub fn new(jobs: Arc<dyn JobStore>, clock: Arc<LogicalClock>) -> Self {
        Self { jobs, clock }
    }

    pub async fn validate(
        &self,
        submission: &Submission,
        category: &Category,
    ) -> Result<NewJob, Rejection> {
        let normalized = submission.normalize()?;

        let submitted_at = match normalized.time_stamp {
            Some(ts) => {
                self.clock.observe(ts);
                ts
            }
            None => self.clock.now(),
        };

        if let Some(dependency) = normalized.dependency {
            let dep = self
                .jobs
                .get(dependency)
                .await?
                .ok_or(Rejection::DependencyNotFound(dependency))?;

            if dep.submitted_at > submitted_at {
                return Err(Rejection::DependencyCausalityViolation {
                    dependency,
                    dependency_submitted_at: dep.submitted_at,
                    submitted_at,
                });
            }

            self.check_acyclic(dependency, dep.dependency).await?;
        }

        Ok(NewJob {
            name: normalized.name,
            priority: normalized.priority,
            submitted_at,
            dependency: normalized.dependency,
            category: category.clone(),
        })
    }

    /// Follow the stored chain from `start`; any revisit is a cycle.
    async fn check_acyclic(&self, start: JobId, mut next: Option<JobId>) -> Result<(), Rejection> {
        let mut seen = HashSet::from([start]);
        while let Some(id) = next {
            if !seen.insert(id) {
                return Err(Rejection::CyclicDependency(start));
            }
            // A dangling link ends the chain; scheduling excludes it later.
            next = match self.jobs.get(id).await? {
                Some(job) => job.dependency,
                None => None,
            };
        }
        Ok(())
    }
}
