//! Listener registries and per-delivery reply plumbing.
//!
//! Broadcast events (`runtime.onMessage`, `runtime.onInstalled`,
//! `proxy.settings.onChange`) use the persistent add-listener pattern, as
//! opposed to the one-shot request/response correlation: callbacks are
//! appended to an ordered registry and invoked, in registration order, for
//! every future occurrence of the event.
//!
//! `remove_listener` is accepted but has no effect on these registries in
//! this version; membership can still be checked with `has_listener`. This
//! is a carried-over limitation, not a crash.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, trace};

use crate::identifiers::{ListenerToken, TabId};
use crate::transport::Port;

// ============================================================================
// Callback Types
// ============================================================================

/// Callback invoked for each delivered runtime message.
pub type MessageCallback = dyn Fn(Value, MessageSender, SendResponse) + Send + Sync;

/// Callback invoked for bare broadcast events (no payload).
pub type EventCallback = dyn Fn() + Send + Sync;

// ============================================================================
// ListenerRegistry
// ============================================================================

/// Ordered, append-only collection of persistent callbacks.
///
/// Registration order is invocation order. [`ListenerToken`] stands in for
/// JavaScript's function-identity membership test.
pub struct ListenerRegistry<F: ?Sized> {
    entries: Mutex<Vec<(ListenerToken, Arc<F>)>>,
    next_token: AtomicU64,
}

impl<F: ?Sized> Default for ListenerRegistry<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: ?Sized> ListenerRegistry<F> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            next_token: AtomicU64::new(0),
        }
    }

    /// Appends a callback; returns its identity token.
    pub fn add_listener(&self, callback: Arc<F>) -> ListenerToken {
        let token = ListenerToken::from_raw(self.next_token.fetch_add(1, Ordering::Relaxed));
        self.entries.lock().push((token, callback));
        token
    }

    /// Identity-based linear membership test.
    #[must_use]
    pub fn has_listener(&self, token: ListenerToken) -> bool {
        self.entries.lock().iter().any(|(t, _)| *t == token)
    }

    /// Accepted and ignored; listeners stay registered for the life of the
    /// endpoint.
    pub fn remove_listener(&self, token: ListenerToken) {
        debug!(%token, "removeListener has no effect on this registry");
    }

    /// Number of registered callbacks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Clones the callbacks, in registration order, for dispatch outside
    /// the registry lock (re-entrant registration stays safe).
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<F>> {
        self.entries.lock().iter().map(|(_, cb)| Arc::clone(cb)).collect()
    }
}

// ============================================================================
// MessageSender
// ============================================================================

/// Describes the origin of a delivered runtime message.
///
/// Constructed per delivery; never persisted.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MessageSender {
    /// Originating tab, for tab-directed messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tab: Option<SenderTab>,

    /// Sending extension identifier, for cross-extension messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// Tab half of a [`MessageSender`].
#[derive(Debug, Clone, Serialize)]
pub struct SenderTab {
    /// Small-integer tab handle.
    pub id: TabId,
}

impl MessageSender {
    /// Sender descriptor for a tab-directed message.
    #[inline]
    #[must_use]
    pub fn from_tab(id: TabId) -> Self {
        Self {
            tab: Some(SenderTab { id }),
            id: None,
        }
    }

    /// Sender descriptor for a cross-extension message.
    #[inline]
    #[must_use]
    pub fn from_extension(id: impl Into<String>) -> Self {
        Self {
            tab: None,
            id: Some(id.into()),
        }
    }
}

// ============================================================================
// SendResponse
// ============================================================================

/// Scoped reply function handed to each listener for one event delivery.
///
/// At most one listener's reply is emitted: the first call wins the latch,
/// later calls from other listeners are no-ops.
#[derive(Clone)]
pub struct SendResponse {
    sent: Arc<AtomicBool>,
    port: Port,
    response_name: &'static str,
    payload_key: &'static str,
    id: u64,
}

impl SendResponse {
    /// Creates the reply function for one delivery.
    #[must_use]
    pub fn new(
        port: Port,
        response_name: &'static str,
        payload_key: &'static str,
        id: u64,
    ) -> Self {
        Self {
            sent: Arc::new(AtomicBool::new(false)),
            port,
            response_name,
            payload_key,
            id,
        }
    }

    /// Emits the response, unless one was already sent for this delivery.
    ///
    /// Returns whether this call won the latch.
    pub fn send(&self, result: Value) -> bool {
        if self.sent.swap(true, Ordering::SeqCst) {
            trace!(name = self.response_name, id = self.id, "response already sent");
            return false;
        }
        let payload = json!({ "id": self.id, self.payload_key: result });
        let _ = self.port.emit(self.response_name, payload);
        true
    }

    /// Whether a response has been emitted for this delivery.
    #[inline]
    #[must_use]
    pub fn responded(&self) -> bool {
        self.sent.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Tests
// ============================================================================
