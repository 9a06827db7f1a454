//! Status lookup for polling clients.

use crate::job::{JobId, JobState};
use crate::receipt::Receipt;
use crate::registry::JobRegistry;

/// What a poll for one job id resolves to.
#[derive(Debug, Clone, PartialEq)]
pub enum JobView {
    /// The id was never issued (or is not even a well-formed id).
    NotFound,
    Processing,
    Done(Receipt),
    Failed(String),
}

/// Resolve a client-supplied job id to its current state.
///
/// A malformed id is indistinguishable from an unknown one: both were
/// never issued by this registry.
pub fn get_status(registry: &JobRegistry, job_id: &str) -> JobView {
    let Ok(id) = job_id.parse::<JobId>() else {
        return JobView::NotFound;
    };
    match registry.get(id).map(|job| job.state) {
        None => JobView::NotFound,
        Some(JobState::Processing) => JobView::Processing,
        Some(JobState::Done(receipt)) => JobView::Done(receipt),
        Some(JobState::Error(detail)) => JobView::Failed(detail),
    }
}
