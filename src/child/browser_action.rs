//! `chrome.browserAction` surface.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::protocol::{IconDetails, RequestKind, events as event_names};
use crate::sanitize::sanitize;

use super::ChromeInner;

// ============================================================================
// BrowserAction
// ============================================================================

/// Callback invoked with the active tab on every action-button click.
pub type ClickCallback = dyn Fn(Value) + Send + Sync;

/// Handle for the `chrome.browserAction` namespace.
#[derive(Clone)]
pub struct BrowserAction {
    inner: Arc<ChromeInner>,
}

impl BrowserAction {
    pub(crate) fn new(inner: Arc<ChromeInner>) -> Self {
        Self { inner }
    }

    /// Updates the action button icon. Fire-and-forget.
    ///
    /// Only string paths are supported; relative paths resolve against the
    /// extension root, `http(s)` URLs pass through.
    ///
    /// # Errors
    ///
    /// [`Error::Unimplemented`] for `imageData`, `tabId`, or an object
    /// `path`; [`Error::InvalidArgument`] when `path` is missing. All fail
    /// before any message is emitted.
    pub fn set_icon(&self, details: IconDetails) -> Result<()> {
        if details.image_data.is_some() {
            return Err(Error::unimplemented("\"imageData\""));
        }
        if details.tab_id.is_some() {
            return Err(Error::unimplemented("\"tabId\""));
        }
        let path = match details.path {
            Some(Value::String(path)) => path,
            Some(_) => {
                return Err(Error::unimplemented(
                    "\"path\" as object. Use string instead",
                ));
            }
            None => return Err(Error::invalid_argument("\"path\" is required")),
        };

        let trimmed = path.trim_start_matches('/');
        let resolved = if trimmed.len() >= 4 && trimmed[..4].eq_ignore_ascii_case("http") {
            trimmed.to_string()
        } else {
            self.inner.resolve_root(trimmed)?
        };

        debug!(icon = %resolved, "browserAction.setIcon");
        self.inner
            .fire(event_names::BROWSER_ACTION_SET_ICON, json!(resolved))
    }

    /// `chrome.browserAction.onClicked`
    #[must_use]
    pub fn on_clicked(&self) -> OnClicked {
        OnClicked {
            inner: Arc::clone(&self.inner),
        }
    }
}

// ============================================================================
// OnClicked
// ============================================================================

/// `chrome.browserAction.onClicked` subscription handle.
///
/// Unlike request/response calls, the subscription's listener is
/// deliberately persistent: the same call id is answered repeatedly, once
/// per click.
#[derive(Clone)]
pub struct OnClicked {
    inner: Arc<ChromeInner>,
}

impl OnClicked {
    /// Registers a callback fired with the active tab on every click.
    pub fn add_listener(&self, callback: Arc<ClickCallback>) -> Result<()> {
        let kind = RequestKind::BrowserActionOnClick;
        let id = self.inner.calls().next();
        debug!(%id, "browserAction.onClicked.addListener");

        let mut rx = self
            .inner
            .port()
            .subscribe_matching(kind.response_name(), id.as_u64());
        self.inner
            .port()
            .emit(kind.name(), json!({ "id": id.as_u64() }))?;

        tokio::spawn(async move {
            while let Some(payload) = rx.recv().await {
                match sanitize(&payload["tab"]) {
                    Ok(tab) => callback(tab),
                    Err(e) => warn!(error = %e, "dropping unsanitizable click event"),
                }
            }
        });
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
