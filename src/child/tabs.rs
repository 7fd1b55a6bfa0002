//! `chrome.tabs` surface.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::debug;

use crate::error::{Error, Result};
use crate::identifiers::TabId;
use crate::protocol::{CreateOptions, RequestKind, ScriptDetails, TabInfo};
use crate::sanitize::sanitize;

use super::ChromeInner;

// ============================================================================
// Tabs
// ============================================================================

/// Handle for the `chrome.tabs` namespace.
#[derive(Clone)]
pub struct Tabs {
    inner: Arc<ChromeInner>,
}

impl Tabs {
    pub(crate) fn new(inner: Arc<ChromeInner>) -> Self {
        Self { inner }
    }
}

// ============================================================================
// Tabs - Queries
// ============================================================================

impl Tabs {
    /// Enumerates open tabs. Results carry URLs only.
    pub async fn query(&self) -> Result<Vec<TabInfo>> {
        let data = self.inner.call(RequestKind::TabsQuery, json!({})).await?;
        let tabs = sanitize(&data["tabs"])?;
        Ok(serde_json::from_value(tabs)?)
    }

    /// Describes the currently active tab.
    pub async fn get_current(&self) -> Result<TabInfo> {
        let data = self.inner.call(RequestKind::TabsGetCurrent, json!({})).await?;
        let tab = sanitize(&data["tab"])?;
        Ok(serde_json::from_value(tab)?)
    }
}

// ============================================================================
// Tabs - Mutations
// ============================================================================

impl Tabs {
    /// Opens a tab and resolves once it has loaded.
    pub async fn create(&self, options: CreateOptions) -> Result<TabInfo> {
        debug!(url = %options.url, "tabs.create");
        let payload = json!({ "options": sanitize(&options)? });
        let data = self.inner.call(RequestKind::TabsCreate, payload).await?;
        let tab = sanitize(&data["tab"])?;
        Ok(serde_json::from_value(tab)?)
    }

    /// Closes the given tabs. Unknown ids are skipped.
    pub async fn remove(&self, tab_ids: Vec<TabId>) -> Result<()> {
        debug!(count = tab_ids.len(), "tabs.remove");
        let payload = json!({ "tabs": tab_ids });
        self.inner.call(RequestKind::TabsRemove, payload).await?;
        Ok(())
    }

    /// Duplicates a tab, resolving once the copy has loaded.
    pub async fn duplicate(&self, tab_id: TabId) -> Result<TabInfo> {
        debug!(%tab_id, "tabs.duplicate");
        let payload = json!({ "tabId": tab_id });
        let data = self.inner.call(RequestKind::TabsDuplicate, payload).await?;
        let tab = sanitize(&data["tab"])?;
        Ok(serde_json::from_value(tab)?)
    }
}

// ============================================================================
// Tabs - Scripting & Messaging
// ============================================================================

impl Tabs {
    /// Injects a content script into a tab; the active tab when `tab_id`
    /// is `None`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] unless exactly one of `code` or `file`
    /// is set.
    pub async fn execute_script(
        &self,
        tab_id: Option<TabId>,
        details: ScriptDetails,
    ) -> Result<()> {
        match (&details.code, &details.file) {
            (Some(_), Some(_)) => {
                return Err(Error::invalid_argument(
                    "\"details\" must set either \"code\" or \"file\", not both",
                ));
            }
            (None, None) => {
                return Err(Error::invalid_argument(
                    "\"details\" must set \"code\" or \"file\"",
                ));
            }
            _ => {}
        }

        debug!(tab_id = ?tab_id, "tabs.executeScript");
        let payload = json!({ "tabId": tab_id, "details": sanitize(&details)? });
        self.inner
            .call(RequestKind::TabsExecuteScript, payload)
            .await?;
        Ok(())
    }

    /// Sends a message to the given tab's context and awaits the first
    /// listener's reply.
    pub async fn send_message(&self, tab_id: TabId, message: Value) -> Result<Value> {
        debug!(%tab_id, "tabs.sendMessage");
        let payload = json!({ "tabId": tab_id, "message": sanitize(&message)? });
        let data = self.inner.call(RequestKind::TabsSendMessage, payload).await?;
        sanitize(&data["result"])
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;
    use tokio::time::{Duration, timeout};

    use crate::child::{Chrome, ChromeOptions};
    use crate::parent::{Executor, MemoryHost};
    use crate::transport::Port;

    fn test_options() -> ChromeOptions {
        ChromeOptions::new(url::Url::parse("resource://extension/").expect("static url"))
    }

    fn bridge() -> (Chrome, Executor, MemoryHost) {
        let (child_port, parent_port) = Port::pair();
        let host = MemoryHost::new();
        let executor = Executor::new(Arc::new(host.clone()));
        executor.attach(parent_port);
        let chrome = Chrome::new(child_port, test_options());
        (chrome, executor, host)
    }

    #[tokio::test]
    async fn test_create_returns_mapped_tab() {
        let (chrome, _executor, _host) = bridge();

        let tab = chrome
            .tabs()
            .create(CreateOptions::new("https://example.com"))
            .await
            .expect("create");

        assert!(tab.id.is_some());
        assert_eq!(tab.url, "https://example.com");
        assert!(tab.title.is_some());
    }

    #[tokio::test]
    async fn test_query_lists_urls_only() {
        let (chrome, _executor, host) = bridge();
        host.add_tab("https://a.example", "A");
        host.add_tab("https://b.example", "B");

        let tabs = chrome.tabs().query().await.expect("query");
        let urls: Vec<_> = tabs.iter().map(|t| t.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a.example", "https://b.example"]);
        assert!(tabs.iter().all(|t| t.id.is_none()));
    }

    #[tokio::test]
    async fn test_concurrent_queries_resolve_independently() {
        let (chrome, _executor, host) = bridge();
        host.add_tab("https://a.example", "A");

        let tabs = chrome.tabs();
        let calls: Vec<_> = (0..8).map(|_| tabs.query()).collect();
        let results = futures_util::future::join_all(calls).await;

        for result in results {
            let tabs = result.expect("each call resolves once");
            assert_eq!(tabs.len(), 1);
        }
    }

    #[tokio::test]
    async fn test_duplicate_copies_url() {
        let (chrome, _executor, host) = bridge();
        host.add_tab("https://dup.example", "Dup");

        let original = chrome.tabs().get_current().await.expect("current");
        let original_id = original.id.expect("mapped id");

        let copy = chrome.tabs().duplicate(original_id).await.expect("duplicate");
        assert_eq!(copy.url, "https://dup.example");
        assert_ne!(copy.id, Some(original_id));
    }

    #[tokio::test]
    async fn test_duplicate_unknown_tab_surfaces_error() {
        let (chrome, _executor, _host) = bridge();
        let err = chrome
            .tabs()
            .duplicate(TabId::new(99))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Operation { .. }));
    }

    #[tokio::test]
    async fn test_remove_closes_tabs() {
        let (chrome, _executor, host) = bridge();
        host.add_tab("https://a.example", "A");
        host.add_tab("https://b.example", "B");

        let current = chrome.tabs().get_current().await.expect("current");
        chrome
            .tabs()
            .remove(vec![current.id.expect("id")])
            .await
            .expect("remove");

        assert_eq!(host.tab_urls(), vec!["https://a.example".to_string()]);
    }

    #[tokio::test]
    async fn test_execute_script_requires_source() {
        let (chrome, _executor, _host) = bridge();
        let err = chrome
            .tabs()
            .execute_script(None, ScriptDetails::default())
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_execute_script_records_injection() {
        let (chrome, _executor, host) = bridge();
        host.add_tab("https://a.example", "A");

        chrome
            .tabs()
            .execute_script(None, ScriptDetails::code("1 + 1").with_run_at("document_idle"))
            .await
            .expect("execute");

        let injected = host.injected_scripts();
        assert_eq!(injected.len(), 1);
        // document_idle normalizes to the ready point.
        assert_eq!(injected[0].when, "ready");
    }

    #[tokio::test]
    async fn test_send_message_round_trip_between_contexts() {
        let (child_a, parent_a) = Port::pair();
        let (child_b, parent_b) = Port::pair();
        let host = MemoryHost::new();
        host.add_tab("https://page.example", "Page");

        let executor = Executor::new(Arc::new(host.clone()));
        executor.attach(parent_a);
        executor.attach(parent_b);

        let panel = Chrome::new(child_a, test_options());
        let page = Chrome::new(child_b, test_options());

        // The page context answers tab-directed messages.
        page.runtime().on_message().add_listener(Arc::new(
            |message, sender, reply| {
                assert!(sender.tab.is_some());
                reply.send(json!({ "echo": message }));
            },
        ));

        let current = panel.tabs().get_current().await.expect("current");
        let result = timeout(
            Duration::from_secs(2),
            panel
                .tabs()
                .send_message(current.id.expect("id"), json!("ping")),
        )
        .await
        .expect("no timeout")
        .expect("reply");

        assert_eq!(result, json!({ "echo": "ping" }));
    }
}
