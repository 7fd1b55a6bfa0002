//! Trusted endpoint: the operation executor.
//!
//! [`Executor`] answers every request arriving on its attached ports. Per
//! request name it keeps a durable handler; each incoming request runs on
//! its own task, so concurrent requests for the same operation interleave
//! without shared-state races, and every request is answered exactly once
//! with a response embedding the same id. Host failures are embedded as an
//! `error` field in the response payload rather than silently swallowed.
//!
//! More than one child context may attach (a panel and a page, say). A
//! relay hub carries cross-context messaging to every target except the
//! originator, and the `notify_*` methods fan parent-initiated broadcasts
//! out to all targets:
//!
//! | Flow | Mechanism |
//! |------|-----------|
//! | request/response | durable per-name handler, one task per request |
//! | cross-context messaging | hub relay, originator excluded |
//! | install / proxy-change / click events | broadcast to all targets |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `host` | [`Host`] capability trait and its data types |
//! | `memory` | [`MemoryHost`], the in-memory host |
//! | `tab_map` | weak tab-identity side table |
//! | `tabs`, `history`, `storage`, `proxy`, `net` | operation handlers |

// ============================================================================
// Submodules
// ============================================================================

/// Host capability seam.
pub mod host;

mod history;
mod memory;
mod net;
mod proxy;
mod storage;
mod tab_map;
mod tabs;

// ============================================================================
// Re-exports
// ============================================================================

pub use host::{FetchRequest, Host, PrefValue, ResolvedScript, ScriptSource, TabHandle};
pub use memory::MemoryHost;
pub use tab_map::TabMap;

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::identifiers::TargetId;
use crate::protocol::{RequestKind, events as event_names, payload_id};
use crate::transport::Port;

// ============================================================================
// Constants
// ============================================================================

/// Capacity of the cross-context relay hub.
const HUB_CAPACITY: usize = 256;

/// Message names relayed between targets instead of being handled here.
const RELAYED: [&str; 4] = [
    RequestKind::TabsSendMessage.name(),
    RequestKind::TabsSendMessage.response_name(),
    RequestKind::RuntimeSendMessage.name(),
    RequestKind::RuntimeSendMessage.response_name(),
];

/// Request kinds answered directly by this executor.
const HANDLED: [RequestKind; 16] = [
    RequestKind::TabsQuery,
    RequestKind::TabsCreate,
    RequestKind::TabsRemove,
    RequestKind::TabsDuplicate,
    RequestKind::TabsGetCurrent,
    RequestKind::TabsExecuteScript,
    RequestKind::HistoryDeleteUrl,
    RequestKind::HistoryDeleteAll,
    RequestKind::HistoryAddUrl,
    RequestKind::TopSitesGet,
    RequestKind::StorageLocalGet,
    RequestKind::StorageLocalSet,
    RequestKind::StorageGetQuota,
    RequestKind::ProxySettingsSet,
    RequestKind::ProxySettingsClear,
    RequestKind::Request,
];

// ============================================================================
// Relay
// ============================================================================

/// One hub-relayed frame, tagged with its origin for echo suppression.
#[derive(Clone)]
struct Relay {
    origin: TargetId,
    name: &'static str,
    payload: Value,
}

/// One persistent click subscription: the requesting target's port plus the
/// call id it expects every click event to echo.
#[derive(Clone)]
struct ClickSubscription {
    port: Port,
    id: u64,
}

// ============================================================================
// Executor
// ============================================================================

pub(crate) struct ExecutorInner {
    host: Arc<dyn Host>,
    tab_map: TabMap,
    targets: Mutex<Vec<(TargetId, Port)>>,
    target_seq: AtomicU64,
    hub: broadcast::Sender<Relay>,
    click_subscriptions: Mutex<Vec<ClickSubscription>>,
}

/// The trusted endpoint for one bridge session.
///
/// Cheap to clone; all clones share the endpoint state. Attached targets
/// keep being served for as long as any handler task holds the shared
/// state, independent of this handle's lifetime.
#[derive(Clone)]
pub struct Executor {
    inner: Arc<ExecutorInner>,
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("targets", &self.inner.targets.lock().len())
            .field(
                "click_subscriptions",
                &self.inner.click_subscriptions.lock().len(),
            )
            .finish_non_exhaustive()
    }
}

impl Executor {
    /// Creates an executor performing operations through `host`.
    #[must_use]
    pub fn new(host: Arc<dyn Host>) -> Self {
        let (hub, _) = broadcast::channel(HUB_CAPACITY);
        Self {
            inner: Arc::new(ExecutorInner {
                host,
                tab_map: TabMap::new(),
                targets: Mutex::new(Vec::new()),
                target_seq: AtomicU64::new(0),
                hub,
                click_subscriptions: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Attaches one child context and starts serving its requests.
    ///
    /// Registers a durable handler per request name, wires the relay hub,
    /// and starts the fire-and-forget listeners. Service ends when the
    /// child's side of the port is gone.
    pub fn attach(&self, port: Port) {
        let target_id = TargetId::from_raw(self.inner.target_seq.fetch_add(1, Ordering::Relaxed));
        self.inner.targets.lock().push((target_id, port.clone()));
        info!(%target_id, "target attached");

        for kind in HANDLED {
            let mut rx = port.on(kind.name());
            let inner = Arc::clone(&self.inner);
            let port = port.clone();
            tokio::spawn(async move {
                while let Some(payload) = rx.recv().await {
                    // Each request runs on its own task so slow operations
                    // never serialize their name's queue.
                    tokio::spawn(dispatch(Arc::clone(&inner), port.clone(), kind, payload));
                }
            });
        }

        self.wire_relays(&port, target_id);
        self.wire_click_subscriptions(&port);
        self.wire_fire_and_forget(&port);
    }
}

// ============================================================================
// Executor - Parent-Initiated Broadcasts
// ============================================================================

impl Executor {
    /// Fires `chrome.runtime.onInstalled` in every attached context.
    pub fn notify_installed(&self) {
        debug!("broadcasting onInstalled");
        self.inner.broadcast(event_names::RUNTIME_ON_INSTALLED);
    }

    /// Fires `chrome.proxy.settings.onChange` in every attached context.
    pub fn notify_proxy_settings_changed(&self) {
        self.inner.broadcast_proxy_settings_changed();
    }

    /// Delivers an action-button click to every subscription, carrying the
    /// active tab.
    pub fn notify_action_clicked(&self) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let Some(tab) = inner.host.active_tab().await else {
                debug!("action click with no active tab dropped");
                return;
            };
            let tab_json = inner.tab_json(&tab);
            let subscriptions = inner.click_subscriptions.lock().clone();
            for sub in subscriptions {
                let payload = json!({ "id": sub.id, "tab": tab_json.clone() });
                let _ = sub
                    .port
                    .emit(RequestKind::BrowserActionOnClick.response_name(), payload);
            }
        });
    }
}

// ============================================================================
// Executor - Wiring
// ============================================================================

impl Executor {
    /// Cross-context messaging: inbound relayed frames go to the hub, hub
    /// frames from other targets go out on this port.
    fn wire_relays(&self, port: &Port, target_id: TargetId) {
        for name in RELAYED {
            let mut rx = port.on(name);
            let hub = self.inner.hub.clone();
            tokio::spawn(async move {
                while let Some(payload) = rx.recv().await {
                    let _ = hub.send(Relay {
                        origin: target_id,
                        name,
                        payload,
                    });
                }
            });
        }

        let mut hub_rx = self.inner.hub.subscribe();
        let port = port.clone();
        tokio::spawn(async move {
            loop {
                match hub_rx.recv().await {
                    Ok(relay) => {
                        if relay.origin == target_id {
                            continue;
                        }
                        if port.emit(relay.name, relay.payload).is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(%target_id, skipped, "relay hub lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    /// `browser-action:onclick` registers a persistent subscription: the
    /// same id is answered repeatedly, once per click.
    fn wire_click_subscriptions(&self, port: &Port) {
        let mut rx = port.on(RequestKind::BrowserActionOnClick.name());
        let inner = Arc::clone(&self.inner);
        let port = port.clone();
        tokio::spawn(async move {
            while let Some(payload) = rx.recv().await {
                let Some(id) = payload_id(&payload) else {
                    warn!("click subscription without id dropped");
                    continue;
                };
                debug!(id, "click subscription registered");
                inner.click_subscriptions.lock().push(ClickSubscription {
                    port: port.clone(),
                    id,
                });
            }
        });
    }

    /// Fire-and-forget flows: icon updates and proxy-auth helpers.
    fn wire_fire_and_forget(&self, port: &Port) {
        {
            let mut rx = port.on(event_names::BROWSER_ACTION_SET_ICON);
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                while let Some(payload) = rx.recv().await {
                    match payload.as_str() {
                        Some(path) => {
                            debug!(icon = path, "action icon updated");
                            inner.host.set_action_icon(path).await;
                        }
                        None => warn!("setIcon payload was not a path string"),
                    }
                }
            });
        }

        {
            let mut rx = port.on(event_names::HELPER_SET_PROXY_CREDENTIALS);
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                while let Some(payload) = rx.recv().await {
                    proxy::set_credentials(&inner, payload).await;
                }
            });
        }

        {
            let mut rx = port.on(event_names::HELPER_ENABLE_PROXY_AUTO_LOGIN);
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                while rx.recv().await.is_some() {
                    proxy::enable_auto_login(&inner).await;
                }
            });
        }
    }
}

// ============================================================================
// ExecutorInner
// ============================================================================

impl ExecutorInner {
    pub(crate) fn host(&self) -> &dyn Host {
        self.host.as_ref()
    }

    pub(crate) fn tab_map(&self) -> &TabMap {
        &self.tab_map
    }

    /// Tab description as exposed to untrusted code.
    fn tab_json(&self, tab: &TabHandle) -> Value {
        json!({
            "id": self.tab_map.id_for(tab),
            "url": tab.url(),
            "title": tab.title(),
        })
    }

    /// Emits a bare broadcast event on every attached target, pruning
    /// targets whose port is gone.
    fn broadcast(&self, name: &str) {
        let mut targets = self.targets.lock();
        targets.retain(|(id, port)| match port.emit(name, json!({})) {
            Ok(()) => true,
            Err(_) => {
                debug!(%id, "pruning detached target");
                false
            }
        });
    }

    fn broadcast_proxy_settings_changed(&self) {
        debug!("broadcasting proxy settings change");
        self.broadcast(event_names::PROXY_SETTINGS_ON_CHANGE);
    }
}

// ============================================================================
// Request Dispatch
// ============================================================================

/// Serves one request: perform the operation, answer exactly once with the
/// same id, embedding failures as an `error` field.
async fn dispatch(inner: Arc<ExecutorInner>, port: Port, kind: RequestKind, payload: Value) {
    let Some(id) = payload_id(&payload) else {
        warn!(op = kind.name(), "request without id dropped");
        return;
    };

    let result = perform(&inner, kind, &payload).await;
    let succeeded = result.is_ok();
    let mut response = match result {
        Ok(value) => value,
        Err(e) => {
            debug!(op = kind.name(), id, error = %e, "operation failed");
            json!({ "error": e.to_string() })
        }
    };
    response["id"] = json!(id);

    if port.emit(kind.response_name(), response).is_err() {
        debug!(op = kind.name(), id, "target gone before response");
        return;
    }

    // Settings changes are observable by every context, not only the
    // caller's.
    if succeeded
        && matches!(
            kind,
            RequestKind::ProxySettingsSet | RequestKind::ProxySettingsClear
        )
    {
        inner.broadcast_proxy_settings_changed();
    }
}

async fn perform(inner: &ExecutorInner, kind: RequestKind, payload: &Value) -> Result<Value> {
    match kind {
        RequestKind::TabsQuery => tabs::query(inner).await,
        RequestKind::TabsCreate => tabs::create(inner, payload).await,
        RequestKind::TabsRemove => tabs::remove(inner, payload).await,
        RequestKind::TabsDuplicate => tabs::duplicate(inner, payload).await,
        RequestKind::TabsGetCurrent => tabs::get_current(inner).await,
        RequestKind::TabsExecuteScript => tabs::execute_script(inner, payload).await,
        RequestKind::HistoryDeleteUrl => history::delete_url(inner, payload).await,
        RequestKind::HistoryDeleteAll => history::delete_all(inner).await,
        RequestKind::HistoryAddUrl => history::add_url(inner, payload).await,
        RequestKind::TopSitesGet => history::top_sites(inner).await,
        RequestKind::StorageLocalGet => storage::get(inner, payload).await,
        RequestKind::StorageLocalSet => storage::set(inner, payload).await,
        RequestKind::StorageGetQuota => storage::quota(inner, payload).await,
        RequestKind::ProxySettingsSet => proxy::settings_set(inner, payload).await,
        RequestKind::ProxySettingsClear => proxy::settings_clear(inner).await,
        RequestKind::Request => net::request(inner, payload).await,
        RequestKind::TabsSendMessage
        | RequestKind::RuntimeSendMessage
        | RequestKind::BrowserActionOnClick => Err(Error::operation(format!(
            "{} is not a directly handled operation",
            kind.name()
        ))),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::time::{Duration, timeout};

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    }

    fn bridge() -> (Port, Executor, MemoryHost) {
        init_tracing();
        let (child, parent) = Port::pair();
        let host = MemoryHost::new();
        let executor = Executor::new(Arc::new(host.clone()));
        executor.attach(parent);
        (child, executor, host)
    }

    #[tokio::test]
    async fn test_concurrent_same_name_requests_resolve_independently() {
        let (child, _executor, host) = bridge();
        host.add_tab("https://a.example", "A");

        // All listeners registered before any request is emitted; responses
        // may arrive in any order.
        let receivers: Vec<_> = (0..8)
            .map(|id| child.expect(RequestKind::TabsQuery.response_name(), id))
            .collect();
        for id in 0..8u64 {
            child
                .emit(RequestKind::TabsQuery.name(), json!({ "id": id }))
                .expect("emit");
        }

        for (id, rx) in receivers.into_iter().enumerate() {
            let payload = timeout(Duration::from_secs(2), rx)
                .await
                .expect("no timeout")
                .expect("delivered");
            assert_eq!(payload["id"], json!(id as u64));
        }
        assert_eq!(child.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_broadcasts_reach_every_target() {
        let (child_a, parent_a) = Port::pair();
        let (child_b, parent_b) = Port::pair();
        let executor = Executor::new(Arc::new(MemoryHost::new()));
        executor.attach(parent_a);
        executor.attach(parent_b);

        let mut rx_a = child_a.on(event_names::RUNTIME_ON_INSTALLED);
        let mut rx_b = child_b.on(event_names::RUNTIME_ON_INSTALLED);

        executor.notify_installed();

        for rx in [&mut rx_a, &mut rx_b] {
            timeout(Duration::from_secs(2), rx.recv())
                .await
                .expect("no timeout")
                .expect("open");
        }
    }

    #[tokio::test]
    async fn test_relay_excludes_originator() {
        let (child_a, parent_a) = Port::pair();
        let (child_b, parent_b) = Port::pair();
        let executor = Executor::new(Arc::new(MemoryHost::new()));
        executor.attach(parent_a);
        executor.attach(parent_b);

        let mut echo = child_a.on(RequestKind::RuntimeSendMessage.name());
        let mut relayed = child_b.on(RequestKind::RuntimeSendMessage.name());

        child_a
            .emit(
                RequestKind::RuntimeSendMessage.name(),
                json!({ "id": 1, "message": "hello" }),
            )
            .expect("emit");

        let got = timeout(Duration::from_secs(2), relayed.recv())
            .await
            .expect("no timeout")
            .expect("open");
        assert_eq!(got["message"], json!("hello"));

        let echoed = timeout(Duration::from_millis(100), echo.recv()).await;
        assert!(echoed.is_err(), "originator must not receive its own message");
    }

    #[tokio::test]
    async fn test_unknown_message_names_are_ignored() {
        let (child, _executor, _host) = bridge();
        child
            .emit("no:such:operation", json!({ "id": 1 }))
            .expect("emit");
        // Nothing to assert beyond "no crash"; give the loops a turn.
        tokio::task::yield_now().await;
    }

    #[tokio::test]
    async fn test_request_without_id_is_dropped() {
        let (child, _executor, host) = bridge();
        host.add_tab("https://a.example", "A");

        let mut responses = child.on(RequestKind::TabsQuery.response_name());
        child
            .emit(RequestKind::TabsQuery.name(), json!({}))
            .expect("emit");

        let got = timeout(Duration::from_millis(100), responses.recv()).await;
        assert!(got.is_err(), "id-less requests must not be answered");
    }

    #[tokio::test]
    async fn test_click_with_no_active_tab_is_dropped() {
        let (child, executor, _host) = bridge();

        let mut events = child.subscribe_matching(
            RequestKind::BrowserActionOnClick.response_name(),
            4,
        );
        child
            .emit(RequestKind::BrowserActionOnClick.name(), json!({ "id": 4 }))
            .expect("emit");
        tokio::time::sleep(Duration::from_millis(50)).await;

        executor.notify_action_clicked();
        let got = timeout(Duration::from_millis(100), events.recv()).await;
        assert!(got.is_err());
    }
}
