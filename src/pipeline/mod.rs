//! Stages between an accepted submission and a stored receipt.
//!
//! ```text
//! media ──▶ extractor ──▶ normalize
//! (type check, base64)  (VLM call)  (fences, aliases)
//! ```
//!
//! 1. [`media`]     — resolve and validate the upload's media type, base64 it
//! 2. [`extractor`] — the [`extractor::DocumentExtractor`] seam and its VLM
//!    implementation; the only stage with network I/O
//! 3. [`normalize`] — turn the model's raw answer into a [`crate::Receipt`]

pub mod extractor;
pub mod media;
pub mod normalize;
