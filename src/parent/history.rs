//! History and top-sites handlers.
//!
//! History mutations are real and irreversible; the response is emitted
//! only after the store write completed.

use serde_json::{Value, json};
use tracing::debug;

use crate::error::{Error, Result};

use super::ExecutorInner;

// ============================================================================
// Constants
// ============================================================================

/// How many most-visited entries a top-sites query returns.
const TOP_SITES_COUNT: usize = 8;

// ============================================================================
// Handlers
// ============================================================================

/// `history:add:url`: records a visit.
pub(super) async fn add_url(inner: &ExecutorInner, payload: &Value) -> Result<Value> {
    let url = required_url(payload)?;
    inner.host().add_history_url(url).await?;
    debug!(url, "history visit recorded");
    Ok(json!({}))
}

/// `history:delete:url`: removes all visits to one URL.
pub(super) async fn delete_url(inner: &ExecutorInner, payload: &Value) -> Result<Value> {
    let url = required_url(payload)?;
    inner.host().delete_history_url(url).await?;
    debug!(url, "history url deleted");
    Ok(json!({}))
}

/// `history:delete:all`: clears the store.
pub(super) async fn delete_all(inner: &ExecutorInner) -> Result<Value> {
    inner.host().clear_history().await?;
    debug!("history cleared");
    Ok(json!({}))
}

/// `history:get:topsites`: most-visited sites, best first.
pub(super) async fn top_sites(inner: &ExecutorInner) -> Result<Value> {
    let mut sites = inner.host().top_sites().await?;
    sites.truncate(TOP_SITES_COUNT);
    Ok(json!({ "urls": sites }))
}

fn required_url(payload: &Value) -> Result<&str> {
    payload["url"]
        .as_str()
        .ok_or_else(|| Error::invalid_argument("\"url\" must be a string"))
}

// ============================================================================
// Tests
// ============================================================================
