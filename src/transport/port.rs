//! The port: a duplex named-message channel endpoint.
//!
//! Each endpoint of a bridge holds one [`Port`]. Messages are
//! [`PortMessage`] frames; delivery on the receiving side goes through a
//! listener table supporting three registration kinds:
//!
//! | Registration | Lifetime | Matching |
//! |--------------|----------|----------|
//! | [`Port::expect`] | until first match, [`Port::forget`], or teardown | name + exact `id` |
//! | [`Port::subscribe_matching`] | until receiver dropped | name + exact `id` |
//! | [`Port::on`] | until receiver dropped | name only |
//!
//! One-shot entries implement at-most-once response delivery: the entry is
//! removed before its payload is handed over, so a double-fired response id
//! finds no listener the second time. Non-matching deliveries leave the
//! entry registered.
//!
//! Dispatch performs only channel sends while holding the table lock, so
//! listeners may be registered from within a delivery callback without
//! corrupting the iteration.
//!
//! Teardown: when a peer's last handle drops, this port's dispatch ends and
//! every pending one-shot entry is dropped, failing its awaiting caller.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::protocol::PortMessage;

// ============================================================================
// Listener Table
// ============================================================================

/// One registered listener.
struct Entry {
    /// Exact-match filter on the payload's `id` field; `None` matches all.
    match_id: Option<u64>,
    sink: Sink,
}

enum Sink {
    /// Consumed on first match.
    Once(Option<oneshot::Sender<Value>>),
    /// Persistent stream; removed when the receiver is gone.
    Stream(mpsc::UnboundedSender<Value>),
}

/// Listener registrations keyed by message name, in registration order.
pub(crate) struct ListenerTable {
    buckets: FxHashMap<String, Vec<Entry>>,
    closed: bool,
}

impl ListenerTable {
    fn new() -> Self {
        Self {
            buckets: FxHashMap::default(),
            closed: false,
        }
    }

    /// Delivers one message to every matching listener.
    ///
    /// Each matching sink receives its own clone of the payload. One-shot
    /// entries are removed before delivery; dead streams are pruned.
    fn deliver(&mut self, message: PortMessage) {
        if self.closed {
            return;
        }

        let Some(bucket) = self.buckets.get_mut(&message.name) else {
            trace!(name = %message.name, "no listener for message");
            return;
        };

        let incoming_id = message.call_id();
        let mut delivered = 0usize;

        bucket.retain_mut(|entry| {
            if let Some(wanted) = entry.match_id
                && incoming_id != Some(wanted)
            {
                // Not ours; stays registered.
                return true;
            }

            match &mut entry.sink {
                Sink::Once(slot) => {
                    if let Some(tx) = slot.take() {
                        delivered += 1;
                        let _ = tx.send(message.payload.clone());
                    }
                    false
                }
                Sink::Stream(tx) => {
                    if tx.send(message.payload.clone()).is_ok() {
                        delivered += 1;
                        true
                    } else {
                        false
                    }
                }
            }
        });

        if bucket.is_empty() {
            self.buckets.remove(&message.name);
        }

        trace!(name = %message.name, id = ?incoming_id, delivered, "message dispatched");
    }

    /// Drops every registration, failing pending one-shot waiters.
    fn close(&mut self) {
        let pending: usize = self
            .buckets
            .values()
            .flat_map(|bucket| bucket.iter())
            .filter(|entry| matches!(entry.sink, Sink::Once(_)))
            .count();
        self.closed = true;
        self.buckets.clear();
        if pending > 0 {
            debug!(pending, "failed pending listeners on port teardown");
        }
    }
}

// ============================================================================
// Port
// ============================================================================

struct PortInner {
    outgoing: mpsc::UnboundedSender<PortMessage>,
    listeners: Arc<Mutex<ListenerTable>>,
}

/// One endpoint of a duplex named-message channel.
///
/// Cheap to clone; all clones share the same listener table and outgoing
/// stream. Use [`Port::pair`] for an in-memory bridge or the
/// `transport::socket` constructors for a cross-process one.
pub struct Port {
    inner: Arc<PortInner>,
}

impl Clone for Port {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl std::fmt::Debug for Port {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Port")
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Port - Constructors
// ============================================================================

impl Port {
    /// Creates a port plus the receiving half of its outgoing stream.
    ///
    /// The caller wires the receiver to a peer (in-memory) or a socket.
    pub(crate) fn new_detached() -> (Self, mpsc::UnboundedReceiver<PortMessage>) {
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let port = Self {
            inner: Arc::new(PortInner {
                outgoing,
                listeners: Arc::new(Mutex::new(ListenerTable::new())),
            }),
        };
        (port, outgoing_rx)
    }

    /// Creates two connected in-memory ports.
    ///
    /// Everything emitted on one side is dispatched, in order, to the other
    /// side's listeners. When the last clone of one side drops, the other
    /// side's pending one-shot listeners fail.
    #[must_use]
    pub fn pair() -> (Self, Self) {
        let (a, a_out) = Self::new_detached();
        let (b, b_out) = Self::new_detached();

        tokio::spawn(Self::run_forward(a_out, Arc::clone(&b.inner.listeners)));
        tokio::spawn(Self::run_forward(b_out, Arc::clone(&a.inner.listeners)));

        (a, b)
    }

    /// Moves emitted frames into the peer's listener table until the
    /// emitting side is gone, then tears the peer down.
    async fn run_forward(
        mut outgoing: mpsc::UnboundedReceiver<PortMessage>,
        peer: Arc<Mutex<ListenerTable>>,
    ) {
        while let Some(message) = outgoing.recv().await {
            peer.lock().deliver(message);
        }
        peer.lock().close();
        debug!("in-memory port forwarding ended");
    }

    /// Shared handle to this port's listener table, for socket glue.
    pub(crate) fn listener_table(&self) -> Arc<Mutex<ListenerTable>> {
        Arc::clone(&self.inner.listeners)
    }

    /// Delivers an inbound frame to this port's listeners.
    pub(crate) fn deliver(table: &Arc<Mutex<ListenerTable>>, message: PortMessage) {
        table.lock().deliver(message);
    }

    /// Tears down this port's listeners, failing pending waiters.
    pub(crate) fn close(table: &Arc<Mutex<ListenerTable>>) {
        table.lock().close();
    }
}

// ============================================================================
// Port - Emission
// ============================================================================

impl Port {
    /// Emits a named message to the peer. Never blocks.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PortClosed`] if the channel to the peer is gone.
    pub fn emit(&self, name: impl Into<String>, payload: Value) -> Result<()> {
        self.emit_message(PortMessage::new(name, payload))
    }

    /// Emits a prebuilt frame to the peer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PortClosed`] if the channel to the peer is gone.
    pub fn emit_message(&self, message: PortMessage) -> Result<()> {
        trace!(name = %message.name, id = ?message.call_id(), "emit");
        self.inner
            .outgoing
            .send(message)
            .map_err(|_| Error::PortClosed)
    }
}

// ============================================================================
// Port - Listener Registration
// ============================================================================

impl Port {
    /// Registers a one-shot listener for `name` matched on the payload's
    /// `id` field.
    ///
    /// Deliveries with a different id are ignored and leave the listener
    /// registered; the first match removes it (at-most-once). The returned
    /// receiver errors if the port tears down first.
    pub fn expect(&self, name: &str, id: u64) -> oneshot::Receiver<Value> {
        let (tx, rx) = oneshot::channel();
        self.register(name, Some(id), Sink::Once(Some(tx)));
        rx
    }

    /// Registers a persistent id-filtered stream for `name`.
    ///
    /// Unlike [`Port::expect`], matches do not deregister the listener.
    /// Used for subscriptions whose response fires repeatedly.
    pub fn subscribe_matching(&self, name: &str, id: u64) -> mpsc::UnboundedReceiver<Value> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.register(name, Some(id), Sink::Stream(tx));
        rx
    }

    /// Registers a persistent stream receiving every `name` message.
    pub fn on(&self, name: &str) -> mpsc::UnboundedReceiver<Value> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.register(name, None, Sink::Stream(tx));
        rx
    }

    /// Removes pending one-shot entries for `(name, id)`.
    ///
    /// Used to expire a correlation entry when a call times out.
    pub fn forget(&self, name: &str, id: u64) {
        let mut table = self.inner.listeners.lock();
        if let Some(bucket) = table.buckets.get_mut(name) {
            bucket.retain(|entry| {
                !(entry.match_id == Some(id) && matches!(entry.sink, Sink::Once(_)))
            });
            if bucket.is_empty() {
                table.buckets.remove(name);
            }
        }
        debug!(name, id, "forgot pending listener");
    }

    /// Number of registered one-shot listeners awaiting a response.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner
            .listeners
            .lock()
            .buckets
            .values()
            .flat_map(|bucket| bucket.iter())
            .filter(|entry| matches!(entry.sink, Sink::Once(_)))
            .count()
    }

    fn register(&self, name: &str, match_id: Option<u64>, sink: Sink) {
        let mut table = self.inner.listeners.lock();
        if table.closed {
            // Entry dropped immediately; the caller's receiver errors.
            return;
        }
        table
            .buckets
            .entry(name.to_string())
            .or_default()
            .push(Entry { match_id, sink });
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

    async fn recv(rx: oneshot::Receiver<Value>) -> Value {
        timeout(Duration::from_secs(1), rx)
            .await
            .expect("no timeout")
            .expect("delivered")
    }

    #[tokio::test]
    async fn test_emit_and_on() {
        let (a, b) = Port::pair();
        let mut rx = b.on("hello");
        a.emit("hello", json!({ "x": 1 })).expect("emit");
        let got = timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("no timeout")
            .expect("open");
        assert_eq!(got, json!({ "x": 1 }));
    }

    #[tokio::test]
    async fn test_expect_matches_only_its_id() {
        let (a, b) = Port::pair();
        let rx = b.expect("op:done", 7);

        // A non-matching id is ignored and leaves the listener registered.
        a.emit("op:done", json!({ "id": 5, "seq": "first" })).expect("emit");
        a.emit("op:done", json!({ "id": 7, "seq": "second" })).expect("emit");

        let got = recv(rx).await;
        assert_eq!(got["seq"], json!("second"));
    }

    #[tokio::test]
    async fn test_out_of_order_resolution() {
        let (a, b) = Port::pair();
        let rx1 = b.expect("op:done", 1);
        let rx2 = b.expect("op:done", 2);
        let rx3 = b.expect("op:done", 3);

        // Responses arrive in reverse send order.
        for id in [3u64, 2, 1] {
            a.emit("op:done", json!({ "id": id })).expect("emit");
        }

        assert_eq!(recv(rx1).await["id"], json!(1));
        assert_eq!(recv(rx2).await["id"], json!(2));
        assert_eq!(recv(rx3).await["id"], json!(3));
    }

    #[tokio::test]
    async fn test_at_most_once_on_double_fire() {
        let (a, b) = Port::pair();
        let rx = b.expect("op:done", 9);

        a.emit("op:done", json!({ "id": 9, "fire": 1 })).expect("emit");
        a.emit("op:done", json!({ "id": 9, "fire": 2 })).expect("emit");

        assert_eq!(recv(rx).await["fire"], json!(1));
        // The duplicate found no listener; nothing to assert beyond the
        // single resolution, which oneshot enforces structurally.
        assert_eq!(b.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_subscribe_matching_fires_repeatedly() {
        let (a, b) = Port::pair();
        let mut rx = b.subscribe_matching("clicked", 4);

        for n in 0..3 {
            a.emit("clicked", json!({ "id": 4, "n": n })).expect("emit");
        }
        a.emit("clicked", json!({ "id": 99, "n": 99 })).expect("emit");

        for n in 0..3 {
            let got = timeout(Duration::from_secs(1), rx.recv())
                .await
                .expect("no timeout")
                .expect("open");
            assert_eq!(got["n"], json!(n));
        }
    }

    #[tokio::test]
    async fn test_peer_drop_fails_pending() {
        let (a, b) = Port::pair();
        let rx = b.expect("op:done", 1);
        drop(a);
        let result = timeout(Duration::from_secs(1), rx).await.expect("no timeout");
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_emit_after_peer_table_closed_is_not_an_error() {
        // Fire-and-forget semantics: emitting into a dead peer is silent.
        let (a, b) = Port::pair();
        drop(b);
        tokio::task::yield_now().await;
        // The forwarding task for `a` still drains the channel.
        a.emit("anything", json!(null)).expect("emit");
    }

    #[tokio::test]
    async fn test_forget_removes_pending_entry() {
        let (a, b) = Port::pair();
        let rx = b.expect("op:done", 6);
        assert_eq!(b.pending_count(), 1);

        b.forget("op:done", 6);
        assert_eq!(b.pending_count(), 0);

        a.emit("op:done", json!({ "id": 6 })).expect("emit");
        let result = timeout(Duration::from_secs(1), rx).await.expect("no timeout");
        assert!(result.is_err(), "forgotten listener must not resolve");
    }

    #[tokio::test]
    async fn test_stream_listeners_fire_in_registration_order() {
        let (a, b) = Port::pair();
        let mut first = b.on("evt");
        let mut second = b.on("evt");

        a.emit("evt", json!({ "k": 1 })).expect("emit");

        // Both receive; ordering across buckets is registration order, which
        // the delivery loop walks front to back.
        let x = timeout(Duration::from_secs(1), first.recv()).await.unwrap().unwrap();
        let y = timeout(Duration::from_secs(1), second.recv()).await.unwrap().unwrap();
        assert_eq!(x, y);
    }

    #[tokio::test]
    async fn test_registration_during_delivery() {
        let (a, b) = Port::pair();
        let mut rx = b.on("first");

        a.emit("first", json!({})).expect("emit");
        timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("no timeout")
            .expect("open");

        // Registering from within a delivery turn must not deadlock or
        // corrupt the table.
        let rx2 = b.expect("second:done", 1);
        a.emit("second:done", json!({ "id": 1 })).expect("emit");
        recv(rx2).await;
    }

    #[tokio::test]
    async fn test_dead_stream_receivers_are_pruned() {
        let (a, b) = Port::pair();
        let rx = b.on("evt");
        drop(rx);
        a.emit("evt", json!(1)).expect("emit");
        tokio::task::yield_now().await;
        // Pruned on delivery; a fresh subscription still works.
        let mut rx2 = b.on("evt");
        a.emit("evt", json!(2)).expect("emit");
        let got = timeout(Duration::from_secs(1), rx2.recv())
            .await
            .expect("no timeout")
            .expect("open");
        assert_eq!(got, json!(2));
    }
}
