//! Job identity and lifecycle state.
//!
//! ```text
//! processing ──(success)──▶ done   (terminal)
//!     │
//!     └──────(failure)──▶ error  (terminal)
//! ```
//!
//! The result and the error detail live inside [`JobState`] itself, so a
//! job can never be `done` without a receipt or carry both a receipt and
//! an error.

use crate::receipt::Receipt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Opaque, globally unique job identifier (random UUID v4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Which input modality a job was submitted with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Image,
    Text,
}

/// Coarse lifecycle status, as reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Processing,
    Done,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Processing => "processing",
            JobStatus::Done => "done",
            JobStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Processing)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state together with the data that state owns.
#[derive(Debug, Clone, PartialEq)]
pub enum JobState {
    Processing,
    Done(Receipt),
    Error(String),
}

impl JobState {
    pub fn status(&self) -> JobStatus {
        match self {
            JobState::Processing => JobStatus::Processing,
            JobState::Done(_) => JobStatus::Done,
            JobState::Error(_) => JobStatus::Error,
        }
    }
}

/// A unit of asynchronous extraction work.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub state: JobState,
}

impl Job {
    /// A freshly submitted job, always in `processing`.
    pub fn new(kind: JobKind) -> Self {
        Self {
            id: JobId::new(),
            kind,
            state: JobState::Processing,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.state.status()
    }

    /// The receipt, present only when `done`.
    pub fn result(&self) -> Option<&Receipt> {
        match &self.state {
            JobState::Done(r) => Some(r),
            _ => None,
        }
    }

    /// The failure detail, present only when `error`.
    pub fn error_detail(&self) -> Option<&str> {
        match &self.state {
            JobState::Error(e) => Some(e),
            _ => None,
        }
    }
}
