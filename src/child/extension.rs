//! `chrome.extension` and `chrome.webRequest` surfaces.
//!
//! Most of this namespace exists for API-shape completeness: callers probe
//! these members and expect a fixed answer, not a round trip. Accessors
//! return their documented sentinel (`false`), `setUpdateUrlData` is a
//! silent no-op, and the event objects that cannot fire in this shim are
//! [`StubEvent`]s that accept and discard everything.

use std::sync::Arc;

use tracing::debug;

use crate::error::Result;

use super::ChromeInner;

// ============================================================================
// Extension
// ============================================================================

/// Handle for the `chrome.extension` namespace.
#[derive(Clone)]
pub struct Extension {
    inner: Arc<ChromeInner>,
}

impl Extension {
    pub(crate) fn new(inner: Arc<ChromeInner>) -> Self {
        Self { inner }
    }

    /// Resolves a packaged path against the extension root.
    pub fn get_url(&self, path: &str) -> Result<String> {
        self.inner.resolve_root(path)
    }

    /// Incognito access is never granted. Fixed `false`.
    #[must_use]
    pub fn is_allowed_incognito_access(&self) -> bool {
        false
    }

    /// File-scheme access is never granted. Fixed `false`.
    #[must_use]
    pub fn is_allowed_file_scheme_access(&self) -> bool {
        false
    }

    /// Accepted and discarded. Silent no-op for API-shape completeness.
    pub fn set_update_url_data(&self, _data: &str) {}

    /// The shim never runs in an incognito context. Fixed `false`.
    #[must_use]
    pub fn in_incognito_context(&self) -> bool {
        false
    }
}

// ============================================================================
// WebRequest
// ============================================================================

/// Handle for the `chrome.webRequest` namespace.
///
/// Present for shape only; no web-request interception crosses the bridge.
#[derive(Clone, Default)]
pub struct WebRequest {}

impl WebRequest {
    pub(crate) fn new() -> Self {
        Self {}
    }

    /// `chrome.webRequest.onAuthRequired`: present for API shape only.
    #[must_use]
    pub fn on_auth_required(&self) -> StubEvent {
        StubEvent::new("webRequest.onAuthRequired")
    }
}

// ============================================================================
// StubEvent
// ============================================================================

/// Event object that accepts listener management calls and discards them.
///
/// `add_listener` and `remove_listener` do nothing; `has_listener` is a
/// fixed `false`. Used for the events this shim can never fire.
#[derive(Clone)]
pub struct StubEvent {
    name: &'static str,
}

impl StubEvent {
    pub(crate) fn new(name: &'static str) -> Self {
        Self { name }
    }

    /// Accepted and discarded.
    pub fn add_listener(&self) {
        debug!(event = self.name, "addListener on stub event discarded");
    }

    /// Fixed `false`; nothing is ever registered.
    #[must_use]
    pub fn has_listener(&self) -> bool {
        false
    }

    /// Accepted and discarded.
    pub fn remove_listener(&self) {
        debug!(event = self.name, "removeListener on stub event discarded");
    }
}

// ============================================================================
// Tests
// ============================================================================
