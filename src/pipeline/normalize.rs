//! Normalisation: turn the extractor's raw text into a [`Receipt`].
//!
//! Models asked for "JSON only" still wrap their answer in a ```` ```json ````
//! fence more often than not, and older prompt variants named some fields
//! differently. This module repairs exactly those two quirks and nothing
//! else: no value coercion, no field guessing, no required fields.
//!
//! ## Steps
//!
//! 1. Strip a leading fence line and a trailing fence marker, trim
//! 2. Parse as JSON; anything but an object is an error
//! 3. Rename legacy keys to their canonical names ([`FIELD_ALIASES`])
//! 4. Default `chave_acesso` to `""` when absent

use crate::error::NormalizeError;
use crate::receipt::Receipt;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

/// Canonical key for the line-item list.
pub const ITEMS_FIELD: &str = "produtos";

/// Canonical key for the 44-digit access key.
pub const ACCESS_KEY_FIELD: &str = "chave_acesso";

/// `(legacy, canonical)` key pairs repaired by [`normalize_object`].
pub const FIELD_ALIASES: &[(&str, &str)] = &[
    ("lista_de_produtos", ITEMS_FIELD),
    ("access_key", ACCESS_KEY_FIELD),
];

/// Normalise raw extractor output into a receipt.
pub fn normalize_receipt(raw: &str) -> Result<Receipt, NormalizeError> {
    normalize_object(raw).map(Receipt::from)
}

/// Fence stripping, parsing and key repair, as a bare JSON object.
pub fn normalize_object(raw: &str) -> Result<Map<String, Value>, NormalizeError> {
    let body = strip_code_fences(raw);
    let value: Value =
        serde_json::from_str(body).map_err(|e| NormalizeError::InvalidJson(e.to_string()))?;

    let mut object = match value {
        Value::Object(map) => map,
        other => return Err(NormalizeError::NotAnObject(json_kind(&other))),
    };

    apply_aliases(&mut object);
    object
        .entry(ACCESS_KEY_FIELD)
        .or_insert_with(|| Value::String(String::new()));

    Ok(object)
}

// ── Step 1: fences ───────────────────────────────────────────────────────────

static RE_OPENING_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^```[A-Za-z0-9_+-]*[ \t]*(?:\r?\n)?").unwrap());

static RE_CLOSING_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:\r?\n)?[ \t]*```$").unwrap());

/// Remove a leading ```` ```lang ```` line and a trailing ```` ``` ````.
///
/// Each marker is stripped independently, so a response that was cut off
/// before its closing fence still loses the opening one.
pub fn strip_code_fences(raw: &str) -> &str {
    let s = raw.trim();
    let s = match RE_OPENING_FENCE.find(s) {
        Some(m) => &s[m.end()..],
        None => s,
    };
    let s = match RE_CLOSING_FENCE.find(s) {
        Some(m) => &s[..m.start()],
        None => s,
    };
    s.trim()
}

// ── Step 3: key repair ───────────────────────────────────────────────────────

fn apply_aliases(object: &mut Map<String, Value>) {
    for (legacy, canonical) in FIELD_ALIASES {
        if let Some(value) = object.remove(*legacy) {
            // An explicit canonical value wins over the legacy one.
            object.entry(*canonical).or_insert(value);
        }
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
