//! Media-type resolution and image encoding for the extractor request.
//!
//! The extension of the uploaded filename decides the media type; the
//! content type declared by the client is only a fallback when the
//! extension is missing or unknown. Clients routinely send
//! `application/octet-stream` for everything, while receipt photos almost
//! always arrive with a meaningful `.jpg`/`.png` name.
//!
//! Vision APIs take images as base64 text embedded in the JSON request,
//! so encoding happens here, once, on the request path.

use crate::error::SubmissionError;
use crate::pipeline::extractor::ImagePayload;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::debug;

/// Media types the extractor accepts for receipt images.
pub const SUPPORTED_MEDIA_TYPES: [&str; 5] = [
    "image/jpeg",
    "image/png",
    "image/webp",
    "image/heic",
    "image/heif",
];

/// Whether `media_type` is one of [`SUPPORTED_MEDIA_TYPES`].
pub fn is_supported(media_type: &str) -> bool {
    SUPPORTED_MEDIA_TYPES.contains(&media_type)
}

/// Resolve the media type of an upload.
///
/// Extension-based detection wins; the declared type is consulted only when
/// the filename yields nothing. Parameters (`; charset=…`) and case are
/// stripped from the declared type.
pub fn resolve_media_type(filename: Option<&str>, declared: Option<&str>) -> Option<String> {
    if let Some(guessed) = filename.and_then(guess_from_filename) {
        return Some(guessed);
    }
    declared.and_then(normalise_declared)
}

fn guess_from_filename(name: &str) -> Option<String> {
    let ext = name.rsplit_once('.')?.1.to_ascii_lowercase();
    // mime_guess predates HEIF in some releases; pin the two we accept.
    match ext.as_str() {
        "heic" => return Some("image/heic".to_string()),
        "heif" => return Some("image/heif".to_string()),
        _ => {}
    }
    mime_guess::from_ext(&ext)
        .first()
        .map(|m| m.essence_str().to_string())
}

fn normalise_declared(declared: &str) -> Option<String> {
    let essence = declared.split(';').next().unwrap_or("").trim();
    if essence.is_empty() {
        None
    } else {
        Some(essence.to_ascii_lowercase())
    }
}

/// Validate an uploaded image and wrap it for the extractor.
///
/// Rejections here happen before any job exists.
pub fn prepare_image(
    bytes: &[u8],
    filename: Option<&str>,
    declared: Option<&str>,
) -> Result<ImagePayload, SubmissionError> {
    if bytes.is_empty() {
        return Err(SubmissionError::MissingImage);
    }

    let media_type =
        resolve_media_type(filename, declared).ok_or(SubmissionError::UnknownMediaType)?;
    if !is_supported(&media_type) {
        return Err(SubmissionError::UnsupportedMediaType { media_type });
    }

    let encoded_bytes = STANDARD.encode(bytes);
    debug!(
        media_type = %media_type,
        raw_bytes = bytes.len(),
        encoded_bytes = encoded_bytes.len(),
        "Encoded receipt image"
    );

    Ok(ImagePayload {
        media_type,
        encoded_bytes,
    })
}
