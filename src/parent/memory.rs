//! In-memory [`Host`] implementation.
//!
//! Backs the unit tests, the benchmarks, and headless embedding: every
//! capability is a plain in-process store with the same observable contract
//! as a real host (tabs load instantly, history visits accumulate, storage
//! enforces the quota). Inspection helpers expose the recorded state so
//! tests can assert on side effects.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::protocol::{FetchResponse, ProxyCredentials, TopSite};

use super::host::{FetchRequest, Host, PrefValue, ResolvedScript, TabHandle};
use super::storage::{QUOTA_BYTES, entry_bytes};

// ============================================================================
// MemoryHost
// ============================================================================

struct HistoryEntry {
    url: String,
    visits: u32,
}

struct MemoryState {
    tabs: RwLock<Vec<TabHandle>>,
    history: RwLock<Vec<HistoryEntry>>,
    prefs: RwLock<FxHashMap<String, PrefValue>>,
    storage: RwLock<Map<String, Value>>,
    icon: RwLock<Option<String>>,
    credentials: RwLock<Option<ProxyCredentials>>,
    auto_login: AtomicBool,
    injected: RwLock<Vec<ResolvedScript>>,
    canned_fetch: RwLock<FxHashMap<String, FetchResponse>>,
}

/// Complete in-memory host.
///
/// Cheap to clone; all clones share the same stores, so a test can hold one
/// clone for inspection while the executor drives another.
#[derive(Clone)]
pub struct MemoryHost {
    state: Arc<MemoryState>,
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryHost")
            .field("tabs", &self.state.tabs.read().len())
            .field("history", &self.state.history.read().len())
            .field("storage_keys", &self.state.storage.read().len())
            .finish_non_exhaustive()
    }
}

impl MemoryHost {
    /// Creates an empty host.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(MemoryState {
                tabs: RwLock::new(Vec::new()),
                history: RwLock::new(Vec::new()),
                prefs: RwLock::new(FxHashMap::default()),
                storage: RwLock::new(Map::new()),
                icon: RwLock::new(None),
                credentials: RwLock::new(None),
                auto_login: AtomicBool::new(false),
                injected: RwLock::new(Vec::new()),
                canned_fetch: RwLock::new(FxHashMap::default()),
            }),
        }
    }
}

// ============================================================================
// MemoryHost - Setup & Inspection
// ============================================================================

impl MemoryHost {
    /// Opens a tab with an explicit title; it becomes the active tab.
    pub fn add_tab(&self, url: &str, title: &str) -> TabHandle {
        let tab = TabHandle::new(url, title);
        self.state.tabs.write().push(tab.clone());
        tab
    }

    /// URLs of the currently open tabs, in window order.
    #[must_use]
    pub fn tab_urls(&self) -> Vec<String> {
        self.state
            .tabs
            .read()
            .iter()
            .map(|tab| tab.url().to_string())
            .collect()
    }

    /// URLs present in the history store, in first-visit order.
    #[must_use]
    pub fn history_urls(&self) -> Vec<String> {
        self.state
            .history
            .read()
            .iter()
            .map(|entry| entry.url.clone())
            .collect()
    }

    /// Reads a preference, if set.
    #[must_use]
    pub fn preference(&self, name: &str) -> Option<PrefValue> {
        self.state.prefs.read().get(name).cloned()
    }

    /// The most recently applied action icon path.
    #[must_use]
    pub fn action_icon(&self) -> Option<String> {
        self.state.icon.read().clone()
    }

    /// Every content script injected so far, in injection order.
    #[must_use]
    pub fn injected_scripts(&self) -> Vec<ResolvedScript> {
        self.state.injected.read().clone()
    }

    /// The registered proxy credentials, if any.
    #[must_use]
    pub fn proxy_credentials(&self) -> Option<ProxyCredentials> {
        self.state.credentials.read().clone()
    }

    /// Whether automatic proxy authentication was enabled.
    #[must_use]
    pub fn auto_login_enabled(&self) -> bool {
        self.state.auto_login.load(Ordering::SeqCst)
    }

    /// Cans the response returned for fetches of `url`.
    pub fn stub_fetch(&self, url: &str, response: FetchResponse) {
        self.state
            .canned_fetch
            .write()
            .insert(url.to_string(), response);
    }
}

// ============================================================================
// MemoryHost - Host Implementation
// ============================================================================

/// Page titles default to the URL's host.
fn derived_title(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(String::from))
        .unwrap_or_else(|| url.to_string())
}

#[async_trait]
impl Host for MemoryHost {
    async fn tabs(&self) -> Vec<TabHandle> {
        self.state.tabs.read().clone()
    }

    async fn active_tab(&self) -> Option<TabHandle> {
        self.state.tabs.read().last().cloned()
    }

    async fn open_tab(&self, url: &str) -> Result<TabHandle> {
        let tab = TabHandle::new(url, derived_title(url));
        self.state.tabs.write().push(tab.clone());
        Ok(tab)
    }

    async fn close_tab(&self, tab: &TabHandle) -> Result<()> {
        self.state.tabs.write().retain(|open| !open.same_tab(tab));
        Ok(())
    }

    async fn attach_script(&self, _tab: &TabHandle, script: ResolvedScript) -> Result<()> {
        self.state.injected.write().push(script);
        Ok(())
    }

    fn resolve_script_url(&self, path: &str) -> String {
        format!("resource://extension/crx/{}", path.trim_start_matches('/'))
    }

    async fn add_history_url(&self, url: &str) -> Result<()> {
        let mut history = self.state.history.write();
        match history.iter_mut().find(|entry| entry.url == url) {
            Some(entry) => entry.visits += 1,
            None => history.push(HistoryEntry {
                url: url.to_string(),
                visits: 1,
            }),
        }
        Ok(())
    }

    async fn delete_history_url(&self, url: &str) -> Result<()> {
        self.state.history.write().retain(|entry| entry.url != url);
        Ok(())
    }

    async fn clear_history(&self) -> Result<()> {
        self.state.history.write().clear();
        Ok(())
    }

    async fn top_sites(&self) -> Result<Vec<TopSite>> {
        let history = self.state.history.read();
        let mut ranked: Vec<&HistoryEntry> = history.iter().collect();
        // Stable sort keeps insertion order within equal visit counts.
        ranked.sort_by(|a, b| b.visits.cmp(&a.visits));
        Ok(ranked
            .into_iter()
            .map(|entry| TopSite {
                url: entry.url.clone(),
                title: String::new(),
            })
            .collect())
    }

    async fn set_preference(&self, name: &str, value: PrefValue) {
        self.state.prefs.write().insert(name.to_string(), value);
    }

    async fn reset_preference(&self, name: &str) {
        self.state.prefs.write().remove(name);
    }

    async fn storage_get(&self, keys: &[String]) -> Result<Map<String, Value>> {
        let storage = self.state.storage.read();
        let mut items = Map::new();
        for key in keys {
            if let Some(value) = storage.get(key) {
                items.insert(key.clone(), value.clone());
            }
        }
        Ok(items)
    }

    async fn storage_set(&self, items: Map<String, Value>) -> Result<()> {
        let mut storage = self.state.storage.write();
        let mut next = storage.clone();
        for (key, value) in items {
            next.insert(key, value);
        }

        let total: u64 = next
            .iter()
            .map(|(key, value)| entry_bytes(key, value))
            .sum();
        if total > QUOTA_BYTES {
            return Err(Error::operation("storage quota exceeded"));
        }

        *storage = next;
        Ok(())
    }

    async fn storage_usage(&self) -> Result<u64> {
        Ok(self
            .state
            .storage
            .read()
            .iter()
            .map(|(key, value)| entry_bytes(key, value))
            .sum())
    }

    async fn set_action_icon(&self, path: &str) {
        *self.state.icon.write() = Some(path.to_string());
    }

    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse> {
        if let Some(canned) = self.state.canned_fetch.read().get(&request.url) {
            return Ok(canned.clone());
        }
        Ok(FetchResponse {
            url: request.url,
            text: String::new(),
            json: None,
            status: 404,
            status_text: "Not Found".into(),
            headers: Map::new(),
        })
    }

    async fn set_proxy_credentials(&self, credentials: ProxyCredentials) {
        *self.state.credentials.write() = Some(credentials);
    }

    async fn enable_proxy_auto_login(&self) {
        self.state.auto_login.store(true, Ordering::SeqCst);
    }
}

// ============================================================================
// Tests
// ============================================================================
