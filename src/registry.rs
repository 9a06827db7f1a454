//! In-memory job registry: the only shared mutable state in the service.
//!
//! A single `RwLock` around the map is the whole concurrency story. Every
//! mutation (`create`, `complete`, `fail`) replaces a whole [`JobState`]
//! under the write lock, so readers see either the old state or the new
//! one, never a `done` job without its receipt. Reads share the lock.
//!
//! Nothing is persisted: jobs live exactly as long as the process.

use crate::job::{Job, JobId, JobKind, JobState, JobStatus};
use crate::receipt::Receipt;
use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, error, warn};

/// Number of jobs in each lifecycle status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobCounts {
    pub processing: usize,
    pub done: usize,
    pub error: usize,
}

/// Cheaply cloneable handle to the shared job map.
#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<RwLock<HashMap<JobId, Job>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new `processing` job and return its identifier.
    ///
    /// The job becomes visible to readers only once it is fully inserted,
    /// already carrying its `processing` status.
    pub fn create(&self, kind: JobKind) -> JobId {
        let mut jobs = self.write();
        loop {
            let job = Job::new(kind);
            // v4 collisions are not expected; the vacancy check keeps
            // `create` from ever overwriting an existing job regardless.
            if let Entry::Vacant(slot) = jobs.entry(job.id) {
                let id = job.id;
                slot.insert(job);
                debug!(job_id = %id, kind = ?kind, "Job created");
                return id;
            }
        }
    }

    /// Transition a `processing` job to `done` with its receipt.
    ///
    /// Returns `false` (and logs) if the id is unknown or the job is
    /// already terminal; existing state is left untouched in both cases.
    pub fn complete(&self, id: JobId, receipt: Receipt) -> bool {
        self.finish(id, JobState::Done(receipt))
    }

    /// Transition a `processing` job to `error` with a failure detail.
    ///
    /// Same unknown-id / already-terminal policy as [`Self::complete`].
    pub fn fail(&self, id: JobId, error_detail: impl Into<String>) -> bool {
        self.finish(id, JobState::Error(error_detail.into()))
    }

    /// Snapshot of a job, or `None` if the id was never issued.
    pub fn get(&self, id: JobId) -> Option<Job> {
        self.read().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Per-status tally of every job in the registry.
    pub fn counts(&self) -> JobCounts {
        self.read()
            .values()
            .fold(JobCounts::default(), |mut acc, job| {
                match job.status() {
                    JobStatus::Processing => acc.processing += 1,
                    JobStatus::Done => acc.done += 1,
                    JobStatus::Error => acc.error += 1,
                }
                acc
            })
    }

    fn finish(&self, id: JobId, next: JobState) -> bool {
        let next_status = next.status();
        let mut jobs = self.write();
        let Some(job) = jobs.get_mut(&id) else {
            error!(job_id = %id, status = %next_status, "Transition for unknown job ignored");
            return false;
        };
        if job.status().is_terminal() {
            warn!(
                job_id = %id,
                current = %job.status(),
                requested = %next_status,
                "Job already finished; transition ignored"
            );
            return false;
        }
        job.state = next;
        debug!(job_id = %id, status = %next_status, "Job finished");
        true
    }

    // A panic while holding the lock cannot leave a half-written job: every
    // mutation is a single insert or field assignment. Recover the guard.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<JobId, Job>> {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<JobId, Job>> {
        self.jobs.write().unwrap_or_else(PoisonError::into_inner)
    }
}
