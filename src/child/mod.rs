//! Untrusted endpoint: the polyfilled `chrome.*` API surface.
//!
//! [`Chrome`] owns the child end of the port plus all per-endpoint state:
//! the call-id sequence, the cross-extension message-id sequence, and the
//! persistent listener registries. Namespace handles are cheap clones
//! sharing that state.
//!
//! | Namespace | Handle |
//! |-----------|--------|
//! | `chrome.tabs` | [`Tabs`] |
//! | `chrome.runtime` | [`Runtime`] |
//! | `chrome.storage.local` | [`Storage`] → [`LocalStorage`] |
//! | `chrome.proxy.settings` | [`Proxy`] → [`ProxySettings`] |
//! | `chrome.history` | [`History`] |
//! | `chrome.topSites` | [`TopSites`] |
//! | `chrome.browserAction` | [`BrowserAction`] |
//! | `chrome.extension` | [`Extension`] |
//! | `chrome.webRequest` | [`WebRequest`] |
//! | `chrome.helper` | [`Helper`] |
//!
//! Every exposed operation validates its arguments synchronously (failing
//! before any message is emitted), allocates a call id, registers a one-shot
//! listener for the paired response name, emits the request, and resolves
//! exactly once with the sanitized result.

// ============================================================================
// Submodules
// ============================================================================

/// Listener registries and reply plumbing.
pub mod events;

mod browser_action;
mod extension;
mod helper;
mod history;
mod proxy;
mod runtime;
mod storage;
mod tabs;

// ============================================================================
// Re-exports
// ============================================================================

pub use browser_action::BrowserAction;
pub use events::{EventCallback, ListenerRegistry, MessageCallback, MessageSender, SendResponse};
pub use extension::{Extension, StubEvent, WebRequest};
pub use helper::Helper;
pub use history::{History, TopSites};
pub use proxy::{OnProxyChange, Proxy, ProxySettings};
pub use runtime::{OnInstalled, OnMessage, Runtime};
pub use storage::{LocalStorage, Storage};
pub use tabs::Tabs;

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::time::timeout;
use tracing::{debug, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::{CallSequence, MessageSequence, TabId};
use crate::protocol::{RequestKind, events as event_names, payload_error, payload_id};
use crate::sanitize::sanitize;
use crate::transport::Port;

// ============================================================================
// Constants
// ============================================================================

/// Default time to wait for a response before expiring the pending listener.
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// ChromeOptions
// ============================================================================

/// Configuration for the untrusted endpoint.
#[derive(Debug, Clone)]
pub struct ChromeOptions {
    /// Extension root URI; relative paths resolve against it.
    pub root_uri: Url,

    /// The extension's manifest, handed back by `runtime.getManifest`.
    pub manifest: Value,

    /// Per-call response timeout. `None` waits forever, matching the
    /// legacy unbounded behavior.
    pub call_timeout: Option<Duration>,
}

impl ChromeOptions {
    /// Creates options with the given extension root.
    #[must_use]
    pub fn new(root_uri: Url) -> Self {
        Self {
            root_uri,
            manifest: Value::Null,
            call_timeout: Some(DEFAULT_CALL_TIMEOUT),
        }
    }

    /// Sets the manifest value.
    #[must_use]
    pub fn with_manifest(mut self, manifest: Value) -> Self {
        self.manifest = manifest;
        self
    }

    /// Sets the per-call timeout.
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Disables the per-call timeout; pending listeners then live until a
    /// response arrives or the port tears down.
    #[must_use]
    pub fn with_unbounded_wait(mut self) -> Self {
        self.call_timeout = None;
        self
    }
}

// ============================================================================
// Chrome
// ============================================================================

pub(crate) struct ChromeInner {
    port: Port,
    calls: CallSequence,
    messages: MessageSequence,
    options: ChromeOptions,
    message_listeners: ListenerRegistry<MessageCallback>,
    installed_listeners: ListenerRegistry<EventCallback>,
    proxy_change_listeners: ListenerRegistry<EventCallback>,
}

/// The polyfilled `chrome` object for one bridge session.
///
/// Cheap to clone; all clones share the endpoint state.
#[derive(Clone)]
pub struct Chrome {
    inner: Arc<ChromeInner>,
}

impl std::fmt::Debug for Chrome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chrome")
            .field("pending_calls", &self.inner.port.pending_count())
            .finish_non_exhaustive()
    }
}

impl Chrome {
    /// Creates the API surface over the child end of a port.
    #[must_use]
    pub fn new(port: Port, options: ChromeOptions) -> Self {
        let inner = Arc::new(ChromeInner {
            port,
            calls: CallSequence::new(),
            messages: MessageSequence::new(),
            options,
            message_listeners: ListenerRegistry::new(),
            installed_listeners: ListenerRegistry::new(),
            proxy_change_listeners: ListenerRegistry::new(),
        });
        spawn_dispatch(&inner);
        Self { inner }
    }
}

// ============================================================================
// Chrome - Namespaces
// ============================================================================

impl Chrome {
    /// `chrome.tabs`
    #[must_use]
    pub fn tabs(&self) -> Tabs {
        Tabs::new(Arc::clone(&self.inner))
    }

    /// `chrome.runtime`
    #[must_use]
    pub fn runtime(&self) -> Runtime {
        Runtime::new(Arc::clone(&self.inner))
    }

    /// `chrome.storage`
    #[must_use]
    pub fn storage(&self) -> Storage {
        Storage::new(Arc::clone(&self.inner))
    }

    /// `chrome.proxy`
    #[must_use]
    pub fn proxy(&self) -> Proxy {
        Proxy::new(Arc::clone(&self.inner))
    }

    /// `chrome.history`
    #[must_use]
    pub fn history(&self) -> History {
        History::new(Arc::clone(&self.inner))
    }

    /// `chrome.topSites`
    #[must_use]
    pub fn top_sites(&self) -> TopSites {
        TopSites::new(Arc::clone(&self.inner))
    }

    /// `chrome.browserAction`
    #[must_use]
    pub fn browser_action(&self) -> BrowserAction {
        BrowserAction::new(Arc::clone(&self.inner))
    }

    /// `chrome.extension`
    #[must_use]
    pub fn extension(&self) -> Extension {
        Extension::new(Arc::clone(&self.inner))
    }

    /// `chrome.webRequest`
    #[must_use]
    pub fn web_request(&self) -> WebRequest {
        WebRequest::new()
    }

    /// `chrome.helper`
    #[must_use]
    pub fn helper(&self) -> Helper {
        Helper::new(Arc::clone(&self.inner))
    }

    /// `chrome.request`: privileged network fetch.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] unless `options` is an object.
    pub async fn request(&self, options: Value) -> Result<Value> {
        if !options.is_object() {
            return Err(Error::invalid_argument("an object must be passed as argument"));
        }
        let data = self.inner.call(RequestKind::Request, options).await?;
        sanitize(&data["response"])
    }
}

// ============================================================================
// ChromeInner - Call Helper
// ============================================================================

impl ChromeInner {
    /// One request/response exchange: allocate id, register the one-shot
    /// listener, emit, await, surface executor errors.
    pub(crate) async fn call(&self, kind: RequestKind, mut payload: Value) -> Result<Value> {
        let id = self.calls.next();
        debug!(op = kind.name(), %id, "dispatching call");
        payload["id"] = json!(id.as_u64());

        // Listener registration precedes the emit so a fast response can
        // never race past it.
        let rx = self.port.expect(kind.response_name(), id.as_u64());
        self.port.emit(kind.name(), payload)?;

        self.await_response(kind.response_name(), id.as_u64(), rx).await
    }

    /// Awaits a registered one-shot listener, applying the configured
    /// timeout and mapping the executor's `error` field.
    pub(crate) async fn await_response(
        &self,
        response_name: &'static str,
        id: u64,
        rx: tokio::sync::oneshot::Receiver<Value>,
    ) -> Result<Value> {
        let data = match self.options.call_timeout {
            Some(limit) => match timeout(limit, rx).await {
                Ok(received) => received.map_err(|_| Error::PortClosed)?,
                Err(_) => {
                    self.port.forget(response_name, id);
                    return Err(Error::response_timeout(
                        response_name,
                        id,
                        limit.as_millis() as u64,
                    ));
                }
            },
            None => rx.await.map_err(|_| Error::PortClosed)?,
        };

        if let Some(message) = payload_error(&data) {
            return Err(Error::operation(message));
        }
        Ok(data)
    }

    /// Fire-and-forget emission.
    pub(crate) fn fire(&self, name: &str, payload: Value) -> Result<()> {
        self.port.emit(name, payload)
    }

    pub(crate) fn port(&self) -> &Port {
        &self.port
    }

    pub(crate) fn calls(&self) -> &CallSequence {
        &self.calls
    }

    pub(crate) fn messages(&self) -> &MessageSequence {
        &self.messages
    }

    pub(crate) fn options(&self) -> &ChromeOptions {
        &self.options
    }

    pub(crate) fn message_listeners(&self) -> &ListenerRegistry<MessageCallback> {
        &self.message_listeners
    }

    pub(crate) fn installed_listeners(&self) -> &ListenerRegistry<EventCallback> {
        &self.installed_listeners
    }

    pub(crate) fn proxy_change_listeners(&self) -> &ListenerRegistry<EventCallback> {
        &self.proxy_change_listeners
    }

    /// Resolves a packaged path against the extension root.
    pub(crate) fn resolve_root(&self, path: &str) -> Result<String> {
        self.options
            .root_uri
            .join(path.trim_start_matches('/'))
            .map(String::from)
            .map_err(|e| Error::invalid_argument(format!("unresolvable path {path:?}: {e}")))
    }
}

// ============================================================================
// Incoming Broadcast Dispatch
// ============================================================================

/// Wires the four parent-initiated flows into the registries.
fn spawn_dispatch(inner: &Arc<ChromeInner>) {
    // Tab-directed messages: runtime.onMessage with tab sender and a
    // latched sendResponse.
    {
        let mut rx = inner.port.on(RequestKind::TabsSendMessage.name());
        let inner = Arc::clone(inner);
        tokio::spawn(async move {
            while let Some(payload) = rx.recv().await {
                deliver_tab_message(&inner, payload);
            }
        });
    }

    // Cross-extension messages: runtime.onMessage with extension sender.
    {
        let mut rx = inner.port.on(RequestKind::RuntimeSendMessage.name());
        let inner = Arc::clone(inner);
        tokio::spawn(async move {
            while let Some(payload) = rx.recv().await {
                deliver_runtime_message(&inner, payload);
            }
        });
    }

    // Install event.
    {
        let mut rx = inner.port.on(event_names::RUNTIME_ON_INSTALLED);
        let inner = Arc::clone(inner);
        tokio::spawn(async move {
            while rx.recv().await.is_some() {
                debug!("runtime.onInstalled fired");
                for callback in inner.installed_listeners.snapshot() {
                    callback();
                }
            }
        });
    }

    // Proxy settings change event.
    {
        let mut rx = inner.port.on(event_names::PROXY_SETTINGS_ON_CHANGE);
        let inner = Arc::clone(inner);
        tokio::spawn(async move {
            while rx.recv().await.is_some() {
                debug!("proxy.settings.onChange fired");
                for callback in inner.proxy_change_listeners.snapshot() {
                    callback();
                }
            }
        });
    }
}

/// Delivers one tab-directed message to every runtime listener, each with
/// its own sanitized copy and a shared single-use reply.
fn deliver_tab_message(inner: &Arc<ChromeInner>, payload: Value) {
    let Some(id) = payload_id(&payload) else {
        warn!("tab message without id dropped");
        return;
    };

    let reply = SendResponse::new(
        inner.port.clone(),
        RequestKind::TabsSendMessage.response_name(),
        "result",
        id,
    );

    let sender = payload
        .get("tabId")
        .and_then(Value::as_u64)
        .map(|tab_id| MessageSender::from_tab(TabId::new(tab_id as u32)))
        .unwrap_or_default();

    let message = payload.get("message").cloned().unwrap_or(Value::Null);
    dispatch_to_listeners(inner, &message, sender, reply);
}

/// Delivers one cross-extension message to every runtime listener.
fn deliver_runtime_message(inner: &Arc<ChromeInner>, payload: Value) {
    let Some(id) = payload_id(&payload) else {
        warn!("runtime message without id dropped");
        return;
    };

    let reply = SendResponse::new(
        inner.port.clone(),
        RequestKind::RuntimeSendMessage.response_name(),
        "response",
        id,
    );

    let sender = payload
        .get("extensionId")
        .and_then(Value::as_str)
        .map(MessageSender::from_extension)
        .unwrap_or_default();

    let message = payload.get("message").cloned().unwrap_or(Value::Null);
    dispatch_to_listeners(inner, &message, sender, reply);
}

fn dispatch_to_listeners(
    inner: &Arc<ChromeInner>,
    message: &Value,
    sender: MessageSender,
    reply: SendResponse,
) {
    for callback in inner.message_listeners.snapshot() {
        match sanitize(message) {
            Ok(copy) => callback(copy, sender.clone(), reply.clone()),
            Err(e) => warn!(error = %e, "dropping unsanitizable message"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::parent::{Executor, MemoryHost};
    use crate::protocol::FetchResponse;

    fn test_options() -> ChromeOptions {
        ChromeOptions::new(url::Url::parse("resource://extension/").expect("static url"))
    }

    #[tokio::test]
    async fn test_request_round_trip() {
        let (child_port, parent_port) = Port::pair();
        let host = MemoryHost::new();
        host.stub_fetch(
            "https://api.example/",
            FetchResponse {
                url: "https://api.example/".into(),
                text: "pong".into(),
                status: 200,
                status_text: "OK".into(),
                ..FetchResponse::default()
            },
        );
        let executor = Executor::new(Arc::new(host));
        executor.attach(parent_port);
        let chrome = Chrome::new(child_port, test_options());

        let response = chrome
            .request(json!({ "url": "https://api.example/" }))
            .await
            .expect("response");
        assert_eq!(response["status"], json!(200));
        assert_eq!(response["text"], json!("pong"));
    }

    #[tokio::test]
    async fn test_request_requires_object_options() {
        let (child_port, _parent_port) = Port::pair();
        let chrome = Chrome::new(child_port, test_options());
        let err = chrome.request(json!("nope")).await.unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_unanswered_call_times_out_and_expires_its_listener() {
        let (child_port, parent_port) = Port::pair();
        // Peer alive but nothing answers.
        let _parent_port = parent_port;
        let chrome = Chrome::new(
            child_port,
            test_options().with_call_timeout(Duration::from_millis(50)),
        );

        let err = chrome.tabs().query().await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(chrome.inner.port().pending_count(), 0);
    }

    #[tokio::test]
    async fn test_unbounded_wait_leaves_listener_registered() {
        let (child_port, parent_port) = Port::pair();
        let _parent_port = parent_port;
        let chrome = Chrome::new(child_port, test_options().with_unbounded_wait());

        // The call keeps waiting past any deadline; its listener stays.
        let still_pending = timeout(Duration::from_millis(100), chrome.tabs().query()).await;
        assert!(still_pending.is_err());
        assert_eq!(chrome.inner.port().pending_count(), 1);
    }

    #[tokio::test]
    async fn test_peer_teardown_fails_call_with_port_closed() {
        let (child_port, parent_port) = Port::pair();
        let chrome = Chrome::new(child_port, test_options());

        let tabs = chrome.tabs();
        let call = tabs.query();
        drop(parent_port);
        let err = timeout(Duration::from_secs(2), call)
            .await
            .expect("no timeout")
            .unwrap_err();
        assert!(err.is_disconnect());
    }
}
