//! # cupom-fiscal
//!
//! Turn photos or text of Brazilian fiscal receipts (NFC-e / SAT cupons)
//! into structured JSON using a Vision Language Model.
//!
//! ## Flow
//!
//! ```text
//! client ──POST──▶ gateway ──▶ registry: processing ──▶ 202 {jobId}
//!                     │
//!                     └─▶ queue ──▶ worker ──▶ extractor (VLM)
//!                                      │
//!                                      ├─ normalise (fences, aliases)
//!                                      └─ registry: done(receipt) | error(detail)
//!
//! client ──GET /api/status?jobId=…──▶ registry ──▶ 200 / 202 / 404 / 500
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cupom_fiscal::{server, ServiceConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reads the credential from GEMINI_API_KEY by default.
//!     let config = ServiceConfig::builder().workers(4).build()?;
//!     server::run(config).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `cupomd` binary (clap + anyhow + dotenvy + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod ingest;
pub mod job;
pub mod pipeline;
pub mod prompts;
pub mod receipt;
pub mod registry;
pub mod server;
pub mod status;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ServiceConfig, ServiceConfigBuilder};
pub use error::{CupomError, ExtractorError, JobFailure, NormalizeError, SubmissionError};
pub use ingest::IngestionGateway;
pub use job::{Job, JobId, JobKind, JobState, JobStatus};
pub use pipeline::extractor::{DocumentExtractor, ExtractionPayload, ImagePayload, LlmExtractor};
pub use pipeline::normalize::normalize_receipt;
pub use receipt::Receipt;
pub use registry::{JobCounts, JobRegistry};
pub use server::{create_router, AppState};
pub use status::{get_status, JobView};
