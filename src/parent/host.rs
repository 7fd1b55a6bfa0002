//! The host capability seam.
//!
//! The bridge specifies the message contract around privileged browser
//! operations, not the operations themselves. [`Host`] is the boundary:
//! the executor translates requests into calls on a `Host` implementation
//! supplied by the embedder, and everything behind the trait stays out of
//! scope: tab chrome, the history store, the preference service, real
//! network access.
//!
//! [`TabHandle`] is the one capability-bearing type on this side of the
//! boundary. It never crosses the port: the executor maps handles to
//! small-integer ids (see [`super::TabMap`]) before anything reaches
//! untrusted code.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::protocol::{FetchResponse, ProxyCredentials, TopSite};

// ============================================================================
// TabHandle
// ============================================================================

struct TabState {
    url: String,
    title: String,
}

/// Opaque handle to one open tab.
///
/// Cheap to clone; identity is the underlying allocation, so two handles
/// compare equal under [`TabHandle::same_tab`] exactly when they denote the
/// same tab. Dropping every handle releases the tab's resources; nothing
/// in the bridge holds a strong reference behind the embedder's back.
#[derive(Clone)]
pub struct TabHandle {
    state: Arc<TabState>,
}

impl TabHandle {
    /// Creates a handle for a tab showing `url`.
    #[must_use]
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            state: Arc::new(TabState {
                url: url.into(),
                title: title.into(),
            }),
        }
    }

    /// The tab's URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.state.url
    }

    /// The tab's title.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.state.title
    }

    /// Whether both handles denote the same tab.
    #[must_use]
    pub fn same_tab(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    /// Weak reference for identity bookkeeping that must not keep the tab
    /// alive.
    pub(crate) fn downgrade(&self) -> WeakTabHandle {
        WeakTabHandle(Arc::downgrade(&self.state))
    }
}

impl fmt::Debug for TabHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TabHandle")
            .field("url", &self.state.url)
            .field("title", &self.state.title)
            .finish()
    }
}

/// Non-owning tab reference used by the tab-identity map.
pub(crate) struct WeakTabHandle(Weak<TabState>);

impl WeakTabHandle {
    /// Whether the tab is still open somewhere.
    pub(crate) fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }

    /// Whether this entry denotes `tab`.
    pub(crate) fn matches(&self, tab: &TabHandle) -> bool {
        self.0
            .upgrade()
            .is_some_and(|state| Arc::ptr_eq(&state, &tab.state))
    }
}

// ============================================================================
// ResolvedScript
// ============================================================================

/// Script source after the executor resolved packaged file paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptSource {
    /// Inline script text.
    Code(String),
    /// Fully resolved script URL.
    Url(String),
}

/// A content-script injection as handed to the host.
///
/// `when` is the normalized injection point (`start`, `end`, or `ready`);
/// the `document_*` spellings and the `idle` alias are resolved before the
/// host sees them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedScript {
    /// Normalized injection point.
    pub when: String,
    /// What to inject.
    pub source: ScriptSource,
}

// ============================================================================
// PrefValue
// ============================================================================

/// A preference-store value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrefValue {
    /// String preference.
    Str(String),
    /// Integer preference.
    Int(i64),
    /// Boolean preference.
    Bool(bool),
}

// ============================================================================
// FetchRequest
// ============================================================================

/// A privileged network fetch as requested over the bridge.
///
/// Fields mirror the request options the original surface accepted;
/// unrecognized options are dropped on deserialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchRequest {
    /// Target URL.
    pub url: String,

    /// Request headers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Map<String, Value>>,

    /// Request body content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,

    /// Body content type.
    #[serde(
        rename = "contentType",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub content_type: Option<String>,

    /// Whether to send the request without cookies or auth state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anonymous: Option<bool>,
}

// ============================================================================
// Host
// ============================================================================

/// Privileged browser capabilities, implemented by the embedder.
///
/// Handlers call these for the real side effects; side effects are real and
/// irreversible, and every method completes the operation before returning;
/// the executor acknowledges completion, not acceptance. Implementations
/// must tolerate concurrent calls (one task per in-flight request).
#[async_trait]
pub trait Host: Send + Sync {
    // ------------------------------------------------------------------------
    // Tabs
    // ------------------------------------------------------------------------

    /// Currently open tabs, in window order.
    async fn tabs(&self) -> Vec<TabHandle>;

    /// The active tab, if any.
    async fn active_tab(&self) -> Option<TabHandle>;

    /// Opens a tab and resolves once it has loaded.
    async fn open_tab(&self, url: &str) -> Result<TabHandle>;

    /// Closes the given tab.
    async fn close_tab(&self, tab: &TabHandle) -> Result<()>;

    /// Injects a content script into the given tab.
    async fn attach_script(&self, tab: &TabHandle, script: ResolvedScript) -> Result<()>;

    /// Maps a packaged script path to a loadable URL.
    fn resolve_script_url(&self, path: &str) -> String;

    // ------------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------------

    /// Records a visit to `url`.
    async fn add_history_url(&self, url: &str) -> Result<()>;

    /// Removes all visits to `url`.
    async fn delete_history_url(&self, url: &str) -> Result<()>;

    /// Clears the entire history store.
    async fn clear_history(&self) -> Result<()>;

    /// Most-visited sites, best first.
    async fn top_sites(&self) -> Result<Vec<TopSite>>;

    // ------------------------------------------------------------------------
    // Preferences
    // ------------------------------------------------------------------------

    /// Writes a preference.
    async fn set_preference(&self, name: &str, value: PrefValue);

    /// Resets a preference to its default.
    async fn reset_preference(&self, name: &str);

    // ------------------------------------------------------------------------
    // Extension Storage
    // ------------------------------------------------------------------------

    /// Reads the stored values for `keys`; absent keys are omitted.
    async fn storage_get(&self, keys: &[String]) -> Result<Map<String, Value>>;

    /// Writes every entry of `items`.
    async fn storage_set(&self, items: Map<String, Value>) -> Result<()>;

    /// Total bytes in use across the storage area.
    async fn storage_usage(&self) -> Result<u64>;

    // ------------------------------------------------------------------------
    // UI & Network
    // ------------------------------------------------------------------------

    /// Updates the action button icon.
    async fn set_action_icon(&self, path: &str);

    /// Performs a privileged network fetch.
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse>;

    // ------------------------------------------------------------------------
    // Proxy Authentication
    // ------------------------------------------------------------------------

    /// Registers authentication material for the active proxy.
    async fn set_proxy_credentials(&self, credentials: ProxyCredentials);

    /// Enables automatic proxy authentication.
    async fn enable_proxy_auto_login(&self);
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_tab_handle_identity() {
        let a = TabHandle::new("https://a.example", "A");
        let b = TabHandle::new("https://a.example", "A");
        let a2 = a.clone();

        // Identity is the allocation, not the contents.
        assert!(a.same_tab(&a2));
        assert!(!a.same_tab(&b));
    }

    #[test]
    fn test_weak_handle_does_not_keep_tab_alive() {
        let tab = TabHandle::new("https://a.example", "A");
        let weak = tab.downgrade();
        assert!(weak.is_alive());
        assert!(weak.matches(&tab));

        drop(tab);
        assert!(!weak.is_alive());
    }

    #[test]
    fn test_fetch_request_ignores_unknown_options() {
        let request: FetchRequest = serde_json::from_value(json!({
            "url": "https://api.example/v1",
            "headers": { "Accept": "application/json" },
            "overrideMimeType": "text/plain"
        }))
        .expect("parse");
        assert_eq!(request.url, "https://api.example/v1");
        assert!(request.headers.is_some());
        assert_eq!(request.content, None);
    }
}
