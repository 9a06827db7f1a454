//! Error types for the cupom-fiscal service.
//!
//! Three error types reflect three distinct audiences:
//!
//! * [`CupomError`] — **Fatal**: the service cannot start or keep serving
//!   (credential missing, provider not configured, socket bind failed).
//!   Returned from startup and from [`crate::server::run`].
//!
//! * [`SubmissionError`] — **Client-caused**: a submission was rejected
//!   synchronously (no image, unsupported media type, missing `text`).
//!   No job is ever created for a rejected submission.
//!
//! * [`JobFailure`] — **Per-job**: the background extraction for one job
//!   failed. It is never returned to the submitter; its `Display` text is
//!   stored as the job's error detail and surfaced on a later poll.
//!
//! [`JobFailure`] keeps collaborator outages ("extraction failed") apart
//! from prompt/format drift ("invalid structured data") so operators can
//! tell the two apart from the stored detail alone.

use crate::pipeline::media::SUPPORTED_MEDIA_TYPES;
use thiserror::Error;

/// All fatal errors returned by the cupom-fiscal library.
#[derive(Debug, Error)]
pub enum CupomError {
    // ── Startup errors ────────────────────────────────────────────────────
    /// The Extractor credential is absent from the environment.
    #[error("Missing credential: environment variable '{var}' is not set.\nExport it or add it to a .env file before starting the service.")]
    MissingCredential { var: String },

    /// The configured provider could not be initialised.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not bind the HTTP listener.
    #[error("Failed to bind '{addr}': {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The HTTP server stopped with an I/O error.
    #[error("HTTP server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// A submission rejected before any job was created.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmissionError {
    /// The multipart request carried no image (or an empty one).
    #[error("No image uploaded: send the receipt in the 'image' multipart field")]
    MissingImage,

    /// The media type could not be determined from the filename or the
    /// declared content type.
    #[error("Could not determine the media type of the upload; supported types: {supported}", supported = SUPPORTED_MEDIA_TYPES.join(", "))]
    UnknownMediaType,

    /// The media type was determined but is not accepted.
    #[error("Unsupported media type '{media_type}'; supported types: {supported}", supported = SUPPORTED_MEDIA_TYPES.join(", "))]
    UnsupportedMediaType { media_type: String },

    /// A required request field is absent or blank.
    #[error("Field '{0}' is required")]
    MissingField(&'static str),

    /// The request body is not well-formed.
    #[error("Malformed request body: {0}")]
    MalformedBody(String),

    /// The extraction queue has no free slot.
    #[error("Extraction queue is full; retry later")]
    QueueFull,

    /// The extraction dispatcher has stopped.
    #[error("Extraction workers are not running")]
    WorkersUnavailable,
}

/// Failure reported by a [`crate::pipeline::extractor::DocumentExtractor`].
#[derive(Debug, Clone, Error)]
pub enum ExtractorError {
    /// The provider call failed (transport, quota, auth, model error).
    #[error("{message}")]
    Api { message: String },
}

/// Why the Extractor's raw text could not become a [`crate::receipt::Receipt`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    /// The fence-stripped text is not JSON.
    #[error("response is not valid JSON: {0}")]
    InvalidJson(String),

    /// The text is JSON but not an object.
    #[error("expected a JSON object, got {0}")]
    NotAnObject(&'static str),
}

/// Terminal failure of one background extraction job.
///
/// The `Display` output is what gets stored as the job's error detail.
#[derive(Debug, Clone, Error)]
pub enum JobFailure {
    /// The Extractor call itself failed.
    #[error("extraction failed: {detail}")]
    Extraction { detail: String },

    /// The Extractor call exceeded the configured timeout.
    #[error("extraction failed: timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The Extractor answered but its output is not usable structured data.
    #[error("invalid structured data in extractor response: {0}")]
    Normalization(#[from] NormalizeError),

    /// The worker running the job panicked.
    #[error("extraction failed: worker aborted: {detail}")]
    Aborted { detail: String },
}

impl From<ExtractorError> for JobFailure {
    fn from(e: ExtractorError) -> Self {
        JobFailure::Extraction {
            detail: e.to_string(),
        }
    }
}
