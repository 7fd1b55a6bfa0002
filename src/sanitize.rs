//! Value sanitization for boundary crossings.
//!
//! Data moving between the trusted and untrusted endpoints is reduced to a
//! structural clone: plain objects, arrays, strings, numbers, booleans and
//! null, with no live references, methods or prototypes attached. The clone
//! is produced by a full serialize/deserialize round trip, the same contract
//! as `JSON.parse(JSON.stringify(x))`.
//!
//! Non-serializable inputs (NaN/infinite floats, maps with non-string keys)
//! fail with [`Error::Sanitize`] instead of degrading silently.

// ============================================================================
// Imports
// ============================================================================

use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, Result};

// ============================================================================
// Sanitization
// ============================================================================

/// Structurally clones `value` into plain data.
///
/// The result contains only data reachable from the input's own serialized
/// structure; capability-bearing handles on either side of the bridge never
/// survive the trip. Sanitizing already-plain data is idempotent.
///
/// # Errors
///
/// Returns [`Error::Sanitize`] if the input cannot be represented as plain
/// JSON data.
pub fn sanitize<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| Error::sanitize(e.to_string()))
}

/// Structurally clones `value`, mapping absent data to `Null`.
///
/// Used for reply payloads where the original treated `undefined` as `null`.
pub fn sanitize_or_null<T: Serialize>(value: Option<&T>) -> Result<Value> {
    match value {
        Some(v) => sanitize(v),
        None => Ok(Value::Null),
    }
}

// ============================================================================
// Tests
// ============================================================================
