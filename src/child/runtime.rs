//! `chrome.runtime` surface.
//!
//! Cross-extension messaging uses its own id namespace
//! ([`crate::identifiers::MessageId`]) so a reply can be routed back to the
//! one context that asked, while every other context only sees the
//! broadcast delivery.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::debug;

use crate::error::Result;
use crate::identifiers::ListenerToken;
use crate::protocol::{RequestKind, SendMessageCall};
use crate::sanitize::sanitize;

use super::events::{EventCallback, MessageCallback};
use super::ChromeInner;

// ============================================================================
// Runtime
// ============================================================================

/// Handle for the `chrome.runtime` namespace.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<ChromeInner>,
}

impl Runtime {
    pub(crate) fn new(inner: Arc<ChromeInner>) -> Self {
        Self { inner }
    }
}

// ============================================================================
// Runtime - Messaging
// ============================================================================

impl Runtime {
    /// Sends a message to the other extension contexts and awaits the
    /// first reply.
    pub async fn send_message(&self, message: Value) -> Result<Value> {
        self.dispatch(SendMessageCall::Message { message }).await
    }

    /// Sends a message addressed to a specific extension.
    pub async fn send_message_to(
        &self,
        extension_id: impl Into<String>,
        message: Value,
    ) -> Result<Value> {
        self.dispatch(SendMessageCall::ToExtension {
            extension_id: extension_id.into(),
            message,
        })
        .await
    }

    /// Sends positional arguments through the overload decision table.
    ///
    /// # Errors
    ///
    /// [`crate::Error::AmbiguousArguments`] when the combination cannot be
    /// uniquely classified.
    pub async fn send_message_args(&self, args: Vec<Value>) -> Result<Value> {
        let call = SendMessageCall::classify(args)?;
        self.dispatch(call).await
    }

    async fn dispatch(&self, call: SendMessageCall) -> Result<Value> {
        let canonical = call.canonicalize(true);
        let id = self.inner.messages().next();
        debug!(%id, extension = ?canonical.extension_id, "runtime.sendMessage");

        let kind = RequestKind::RuntimeSendMessage;
        let rx = self.inner.port().expect(kind.response_name(), id.as_u64());
        self.inner.port().emit(
            kind.name(),
            json!({
                "id": id.as_u64(),
                "extensionId": canonical.extension_id,
                "message": sanitize(&canonical.message)?,
            }),
        )?;

        let data = self
            .inner
            .await_response(kind.response_name(), id.as_u64(), rx)
            .await?;
        sanitize(&data["response"])
    }
}

// ============================================================================
// Runtime - Events & Metadata
// ============================================================================

impl Runtime {
    /// `chrome.runtime.onMessage`
    #[must_use]
    pub fn on_message(&self) -> OnMessage {
        OnMessage {
            inner: Arc::clone(&self.inner),
        }
    }

    /// `chrome.runtime.onInstalled`
    #[must_use]
    pub fn on_installed(&self) -> OnInstalled {
        OnInstalled {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Resolves a packaged path against the extension root.
    pub fn get_url(&self, path: &str) -> Result<String> {
        self.inner.resolve_root(path)
    }

    /// Returns the extension manifest.
    #[must_use]
    pub fn get_manifest(&self) -> Value {
        self.inner.options().manifest.clone()
    }
}

// ============================================================================
// OnMessage
// ============================================================================

/// `chrome.runtime.onMessage` registry handle.
#[derive(Clone)]
pub struct OnMessage {
    inner: Arc<ChromeInner>,
}

impl OnMessage {
    /// Appends a listener invoked for every delivered message.
    ///
    /// The callback receives an independently sanitized copy of the
    /// message, a sender descriptor, and a single-use reply function.
    pub fn add_listener(&self, callback: Arc<MessageCallback>) -> ListenerToken {
        self.inner.message_listeners().add_listener(callback)
    }

    /// Identity-based membership test.
    #[must_use]
    pub fn has_listener(&self, token: ListenerToken) -> bool {
        self.inner.message_listeners().has_listener(token)
    }

    /// Accepted and ignored; see [`super::events::ListenerRegistry`].
    pub fn remove_listener(&self, token: ListenerToken) {
        self.inner.message_listeners().remove_listener(token);
    }
}

// ============================================================================
// OnInstalled
// ============================================================================

/// `chrome.runtime.onInstalled` registry handle.
#[derive(Clone)]
pub struct OnInstalled {
    inner: Arc<ChromeInner>,
}

impl OnInstalled {
    /// Appends a listener fired when installation completes.
    pub fn add_listener(&self, callback: Arc<EventCallback>) -> ListenerToken {
        self.inner.installed_listeners().add_listener(callback)
    }

    /// Identity-based membership test.
    #[must_use]
    pub fn has_listener(&self, token: ListenerToken) -> bool {
        self.inner.installed_listeners().has_listener(token)
    }

    /// Accepted and ignored; see [`super::events::ListenerRegistry`].
    pub fn remove_listener(&self, token: ListenerToken) {
        self.inner.installed_listeners().remove_listener(token);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;
    use serde_json::json;
    use tokio::time::{Duration, timeout};

    use crate::child::{Chrome, ChromeOptions};
    use crate::error::Error;
    use crate::parent::{Executor, MemoryHost};
    use crate::transport::Port;

    fn test_options() -> ChromeOptions {
        ChromeOptions::new(url::Url::parse("resource://extension/").expect("static url"))
            .with_manifest(json!({ "name": "bridge-test", "version": "1.0" }))
    }

    fn two_context_bridge() -> (Chrome, Chrome, Executor) {
        let (child_a, parent_a) = Port::pair();
        let (child_b, parent_b) = Port::pair();
        let executor = Executor::new(Arc::new(MemoryHost::new()));
        executor.attach(parent_a);
        executor.attach(parent_b);
        (
            Chrome::new(child_a, test_options()),
            Chrome::new(child_b, test_options()),
            executor,
        )
    }

    #[tokio::test]
    async fn test_send_message_reaches_other_context() {
        let (panel, page, _executor) = two_context_bridge();

        page.runtime().on_message().add_listener(Arc::new(
            |message, sender, reply| {
                assert_eq!(sender.id.as_deref(), Some("ext@vendor"));
                reply.send(json!({ "got": message }));
            },
        ));

        let response = timeout(
            Duration::from_secs(2),
            panel
                .runtime()
                .send_message_to("ext@vendor", json!("hello")),
        )
        .await
        .expect("no timeout")
        .expect("response");

        assert_eq!(response, json!({ "got": "hello" }));
    }

    #[tokio::test]
    async fn test_sender_does_not_receive_own_message() {
        let (panel, page, _executor) = two_context_bridge();

        let own_deliveries = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&own_deliveries);
        panel
            .runtime()
            .on_message()
            .add_listener(Arc::new(move |_, _, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            }));

        page.runtime().on_message().add_listener(Arc::new(
            |_message, _sender, reply| {
                reply.send(json!(null));
            },
        ));

        panel
            .runtime()
            .send_message(json!("no echo"))
            .await
            .expect("response");

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(own_deliveries.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_broadcast_order_and_independent_copies() {
        let (panel, page, _executor) = two_context_bridge();

        let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

        let order_a = Arc::clone(&order);
        page.runtime().on_message().add_listener(Arc::new(
            move |mut message, _sender, reply| {
                order_a.lock().push("first");
                // Mutating this copy must not leak into the next listener.
                message["tampered"] = json!(true);
                reply.send(json!("ack"));
            },
        ));

        let order_b = Arc::clone(&order);
        page.runtime().on_message().add_listener(Arc::new(
            move |message, _sender, _reply| {
                order_b.lock().push("second");
                assert_eq!(message.get("tampered"), None);
            },
        ));

        panel
            .runtime()
            .send_message(json!({ "payload": 1 }))
            .await
            .expect("first listener's reply wins");

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(*order.lock(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_only_first_reply_reaches_sender() {
        let (panel, page, _executor) = two_context_bridge();

        page.runtime().on_message().add_listener(Arc::new(
            |_message, _sender, reply| {
                reply.send(json!("winner"));
            },
        ));
        page.runtime().on_message().add_listener(Arc::new(
            |_message, _sender, reply| {
                assert!(!reply.send(json!("loser")));
            },
        ));

        let response = panel
            .runtime()
            .send_message(json!("race"))
            .await
            .expect("response");
        assert_eq!(response, json!("winner"));
    }

    #[tokio::test]
    async fn test_ambiguous_arguments_fail_before_send() {
        let (panel, _page, _executor) = two_context_bridge();
        let err = panel
            .runtime()
            .send_message_args(vec![json!("ext@vendor"), json!({ "m": 1 })])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AmbiguousArguments { .. }));
    }

    #[tokio::test]
    async fn test_get_manifest_and_url() {
        let (panel, _page, _executor) = two_context_bridge();
        let manifest = panel.runtime().get_manifest();
        assert_eq!(manifest["name"], json!("bridge-test"));

        let resolved = panel.runtime().get_url("/popup.html").expect("resolve");
        assert_eq!(resolved, "resource://extension/popup.html");
    }

    #[tokio::test]
    async fn test_on_installed_broadcast() {
        let (panel, page, executor) = two_context_bridge();

        let fired = Arc::new(AtomicUsize::new(0));
        for chrome in [&panel, &page] {
            let counter = Arc::clone(&fired);
            chrome
                .runtime()
                .on_installed()
                .add_listener(Arc::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }));
        }

        executor.notify_installed();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }
}
