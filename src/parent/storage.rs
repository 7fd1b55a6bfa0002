//! Extension storage handlers.
//!
//! The key selector is overloaded on the wire: a single string, a list of
//! keys, or an object whose values are per-key defaults. Canonicalization
//! happens here, once, before the host is consulted.

use serde_json::{Map, Value, json};
use tracing::debug;

use crate::error::{Error, Result};

use super::ExecutorInner;

// ============================================================================
// Constants
// ============================================================================

/// Storage area capacity in bytes (5 MiB).
pub(crate) const QUOTA_BYTES: u64 = 5 * 1024 * 1024;

// ============================================================================
// Handlers
// ============================================================================

/// `storage:local:get`: reads the selected keys; absent keys fall back to
/// the selector's defaults or are omitted.
pub(super) async fn get(inner: &ExecutorInner, payload: &Value) -> Result<Value> {
    let (keys, defaults) = canonicalize_keys(&payload["keys"])?;
    let stored = inner.host().storage_get(&keys).await?;

    let mut items = Map::new();
    for key in keys {
        let value = stored
            .get(&key)
            .cloned()
            .or_else(|| defaults.get(&key).cloned());
        if let Some(value) = value {
            items.insert(key, value);
        }
    }
    Ok(json!({ "items": items }))
}

/// `storage:local:set`: writes every entry of `items`.
pub(super) async fn set(inner: &ExecutorInner, payload: &Value) -> Result<Value> {
    let Some(items) = payload["items"].as_object() else {
        return Err(Error::invalid_argument("\"items\" must be an object"));
    };
    inner.host().storage_set(items.clone()).await?;
    debug!(count = items.len(), "storage entries written");
    Ok(json!({}))
}

/// `storage:get:quota`: bytes in use for the selected keys, or the whole
/// area when no selector is given. An empty key list is answered with zero
/// without consulting the host; exactly one response is emitted either way.
pub(super) async fn quota(inner: &ExecutorInner, payload: &Value) -> Result<Value> {
    let bytes = match &payload["keys"] {
        Value::Null => inner.host().storage_usage().await?,
        Value::String(key) => selected_usage(inner, std::slice::from_ref(key)).await?,
        Value::Array(list) if list.is_empty() => 0,
        Value::Array(list) => {
            let keys = list
                .iter()
                .map(|v| {
                    v.as_str()
                        .map(String::from)
                        .ok_or_else(|| Error::invalid_argument("storage keys must be strings"))
                })
                .collect::<Result<Vec<_>>>()?;
            selected_usage(inner, &keys).await?
        }
        _ => {
            return Err(Error::invalid_argument(
                "\"keys\" must be a string or a list of strings",
            ));
        }
    };
    Ok(json!({ "bytesInUse": bytes }))
}

// ============================================================================
// Helpers
// ============================================================================

/// Reduces the overloaded key selector to a key list plus defaults.
fn canonicalize_keys(keys: &Value) -> Result<(Vec<String>, Map<String, Value>)> {
    match keys {
        Value::String(key) => Ok((vec![key.clone()], Map::new())),
        Value::Array(list) => {
            let keys = list
                .iter()
                .map(|v| {
                    v.as_str()
                        .map(String::from)
                        .ok_or_else(|| Error::invalid_argument("storage keys must be strings"))
                })
                .collect::<Result<Vec<_>>>()?;
            Ok((keys, Map::new()))
        }
        Value::Object(map) => Ok((map.keys().cloned().collect(), map.clone())),
        _ => Err(Error::invalid_argument(
            "\"keys\" must be a string, a list of strings, or an object",
        )),
    }
}

async fn selected_usage(inner: &ExecutorInner, keys: &[String]) -> Result<u64> {
    let stored = inner.host().storage_get(keys).await?;
    Ok(stored
        .iter()
        .map(|(key, value)| entry_bytes(key, value))
        .sum())
}

/// Bytes one entry occupies: key length plus serialized value length.
pub(crate) fn entry_bytes(key: &str, value: &Value) -> u64 {
    let value_len = serde_json::to_string(value).map_or(0, |s| s.len() as u64);
    key.len() as u64 + value_len
}

// ============================================================================
// Tests
// ============================================================================
