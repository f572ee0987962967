//! Dependency-aware priority ordering.
//!
//! [`compute_schedule`] turns the full job set into one total order:
//!
//! 1. **Base order**: stable sort by `(priority, has_dependency)`, so within a
//!    tier independent jobs come first and ties keep store order.
//! 2. **Hoisting walk**: jobs are emitted in base order, but before a job is
//!    emitted its unplaced dependency chain is emitted first, deepest link
//!    first. A dependency therefore always precedes its dependents even when
//!    it sits in a lower tier; unrelated jobs keep their base positions.
//!
//! A chain that loops back on itself is excluded, and so is every job whose
//! chain runs into an excluded or missing job. Exclusions are reported in
//! [`ScheduleOutcome::excluded`] and never abort the computation.

use std::collections::HashMap;

use crate::scheduler::job::{Job, JobId, ScheduleEntry};

/// Why a job was left out of the schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExclusionReason {
    /// The job is a member of a dependency cycle.
    CyclicDependency,
    /// The job depends, directly or transitively, on an excluded job.
    DependencyExcluded { dependency: JobId },
    /// The job depends on an id absent from the job set.
    DependencyMissing { dependency: JobId },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exclusion {
    pub job_id: JobId,
    pub name: String,
    pub reason: ExclusionReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleOutcome {
    pub entries: Vec<ScheduleEntry>,
    pub excluded: Vec<Exclusion>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Placed,
    Excluded,
}

/// How a dependency chain walk ended.
enum ChainEnd {
    /// Reached a job with no (or a self-) dependency, or an already placed one.
    Resolved,
    /// Revisited the job at this position of the chain.
    Cycle(usize),
    /// Ran into a job that was excluded earlier.
    Excluded(JobId),
    /// Referenced an id that is not in the job set.
    Missing(JobId),
}

/// Order every job so dependencies precede dependents and tiers stay grouped.
///
/// Pure and deterministic: the same input slice always yields the same outcome.
pub fn compute_schedule(jobs: &[Job]) -> ScheduleOutcome {
    let mut base: Vec<&Job> = jobs.iter().collect();
    base.sort_by_key(|job| job.base_order_key());

    let mut walk = Walk {
        index: jobs.iter().map(|job| (job.id, job)).collect(),
        marks: HashMap::with_capacity(jobs.len()),
        outcome: ScheduleOutcome {
            entries: Vec::with_capacity(jobs.len()),
            excluded: Vec::new(),
        },
    };

    for job in base {
        if walk.marks.contains_key(&job.id) {
            continue;
        }
        walk.emit(job);
    }

    walk.outcome
}

struct Walk<'a> {
    index: HashMap<JobId, &'a Job>,
    marks: HashMap<JobId, Mark>,
    outcome: ScheduleOutcome,
}

impl<'a> Walk<'a> {
    /// Emit `start` after its unplaced dependency chain.
    fn emit(&mut self, start: &'a Job) {
        // chain[0] is `start`, each later element is the previous one's dependency.
        let mut chain: Vec<&'a Job> = Vec::new();
        let mut cursor = Some(start);

        let end = loop {
            let Some(job) = cursor else {
                break ChainEnd::Resolved;
            };
            match self.marks.get(&job.id) {
                Some(Mark::Placed) => break ChainEnd::Resolved,
                Some(Mark::Excluded) => break ChainEnd::Excluded(job.id),
                Some(Mark::Visiting) => {
                    let at = chain
                        .iter()
                        .position(|j| j.id == job.id)
                        .unwrap_or_default();
                    break ChainEnd::Cycle(at);
                }
                None => {}
            }
            self.marks.insert(job.id, Mark::Visiting);
            chain.push(job);

            cursor = match job.dependency {
                // Self-reference short-circuits.
                Some(dep) if dep == job.id => None,
                Some(dep) => match self.index.get(&dep) {
                    Some(next) => Some(*next),
                    None => break ChainEnd::Missing(dep),
                },
                None => None,
            };
        };

        match end {
            ChainEnd::Resolved => {
                for job in chain.iter().rev() {
                    self.marks.insert(job.id, Mark::Placed);
                    self.outcome.entries.push(job.entry());
                }
            }
            ChainEnd::Cycle(at) => {
                let members: Vec<String> = chain[at..].iter().map(|j| j.id.to_string()).collect();
                tracing::warn!(
                    job_id = %start.id,
                    cycle = %members.join(" -> "),
                    "Cyclic dependency detected, excluding chain from schedule"
                );
                for (pos, job) in chain.iter().enumerate().rev() {
                    let reason = if pos >= at {
                        ExclusionReason::CyclicDependency
                    } else {
                        ExclusionReason::DependencyExcluded {
                            dependency: chain[pos + 1].id,
                        }
                    };
                    self.exclude(job, reason);
                }
            }
            ChainEnd::Excluded(dependency) | ChainEnd::Missing(dependency) => {
                let missing = matches!(end, ChainEnd::Missing(_));
                let last = chain.len().saturating_sub(1);
                for (pos, job) in chain.iter().enumerate().rev() {
                    let reason = match (pos == last, missing) {
                        (true, true) => ExclusionReason::DependencyMissing { dependency },
                        (true, false) => ExclusionReason::DependencyExcluded { dependency },
                        (false, _) => ExclusionReason::DependencyExcluded {
                            dependency: chain[pos + 1].id,
                        },
                    };
                    self.exclude(job, reason);
                }
            }
        }
    }

    fn exclude(&mut self, job: &Job, reason: ExclusionReason) {
        tracing::debug!(job_id = %job.id, name = %job.name, ?reason, "Job excluded from schedule");
        self.marks.insert(job.id, Mark::Excluded);
        self.outcome.excluded.push(Exclusion {
            job_id: job.id,
            name: job.name.clone(),
            reason,
        });
    }
}
