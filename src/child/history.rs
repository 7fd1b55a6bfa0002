//! `chrome.history` and `chrome.topSites` surfaces.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::debug;

use crate::error::Result;
use crate::protocol::RequestKind;
use crate::sanitize::sanitize;

use super::ChromeInner;

// ============================================================================
// History
// ============================================================================

/// Handle for the `chrome.history` namespace.
///
/// Side effects are real and irreversible; completion of the returned
/// future means the history store mutation finished, not merely that the
/// request was accepted.
#[derive(Clone)]
pub struct History {
    inner: Arc<ChromeInner>,
}

impl History {
    pub(crate) fn new(inner: Arc<ChromeInner>) -> Self {
        Self { inner }
    }

    /// Removes all visits to `url`.
    pub async fn delete_url(&self, url: &str) -> Result<()> {
        debug!(url, "history.deleteUrl");
        self.inner
            .call(RequestKind::HistoryDeleteUrl, json!({ "url": url }))
            .await?;
        Ok(())
    }

    /// Clears the entire history store.
    pub async fn delete_all(&self) -> Result<()> {
        debug!("history.deleteAll");
        self.inner
            .call(RequestKind::HistoryDeleteAll, json!({}))
            .await?;
        Ok(())
    }

    /// Records a visit to `url`.
    pub async fn add_url(&self, url: &str) -> Result<()> {
        debug!(url, "history.addUrl");
        self.inner
            .call(RequestKind::HistoryAddUrl, json!({ "url": url }))
            .await?;
        Ok(())
    }
}

// ============================================================================
// TopSites
// ============================================================================

/// Handle for the `chrome.topSites` namespace.
#[derive(Clone)]
pub struct TopSites {
    inner: Arc<ChromeInner>,
}

impl TopSites {
    pub(crate) fn new(inner: Arc<ChromeInner>) -> Self {
        Self { inner }
    }

    /// Returns the most-visited sites, best first.
    pub async fn get(&self) -> Result<Value> {
        let data = self.inner.call(RequestKind::TopSitesGet, json!({})).await?;
        sanitize(&data["urls"])
    }
}

// ============================================================================
// Tests
// ============================================================================
