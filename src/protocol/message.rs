//! Port message framing and the operation name table.
//!
//! Every request carries a numeric `id` in its payload and is answered by
//! exactly one response message embedding the same `id`. Response names are
//! irregular per operation (`tabs:query` → `tabs:query:result`,
//! `tabs:create` → `tabs:created`), so the pairing lives in one table,
//! [`RequestKind`], instead of a derived suffix.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// PortMessage
// ============================================================================

/// One named message on the port.
///
/// # Wire Format
///
/// ```json
/// { "name": "tabs:query", "payload": { "id": 7 } }
/// ```
///
/// The payload is an arbitrary structured value; for request/response
/// traffic it is an object carrying `id`. One legacy exception survives:
/// `chrome.browserAction.setIcon` carries a bare path string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortMessage {
    /// Message name; selects the operation or event.
    pub name: String,

    /// Operation-specific data.
    #[serde(default)]
    pub payload: Value,
}

impl PortMessage {
    /// Creates a new message.
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }

    /// Reads the correlation id from the payload, if present.
    #[inline]
    #[must_use]
    pub fn call_id(&self) -> Option<u64> {
        payload_id(&self.payload)
    }
}

/// Reads the numeric `id` field from a payload object.
#[inline]
#[must_use]
pub fn payload_id(payload: &Value) -> Option<u64> {
    payload.get("id").and_then(Value::as_u64)
}

/// Reads the executor-reported `error` field from a response payload.
#[inline]
#[must_use]
pub fn payload_error(payload: &Value) -> Option<&str> {
    payload.get("error").and_then(Value::as_str)
}

// ============================================================================
// RequestKind
// ============================================================================

/// Every correlated request the bridge speaks, with its response name.
///
/// Fire-and-forget messages (`chrome.browserAction.setIcon`,
/// `chrome.helper.*`) are not listed here; they have no response to pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// Enumerate open tabs.
    TabsQuery,
    /// Open a tab and wait for load completion.
    TabsCreate,
    /// Close one or more tabs.
    TabsRemove,
    /// Duplicate a tab by id.
    TabsDuplicate,
    /// Describe the active tab.
    TabsGetCurrent,
    /// Inject a content script into a tab.
    TabsExecuteScript,
    /// Deliver a message to a tab's context.
    TabsSendMessage,
    /// Deliver a message to another extension context.
    RuntimeSendMessage,
    /// Remove one URL from history.
    HistoryDeleteUrl,
    /// Clear all history.
    HistoryDeleteAll,
    /// Record a visit for a URL.
    HistoryAddUrl,
    /// Most-visited sites.
    TopSitesGet,
    /// Read extension storage.
    StorageLocalGet,
    /// Write extension storage.
    StorageLocalSet,
    /// Storage quota usage.
    StorageGetQuota,
    /// Apply PAC proxy settings.
    ProxySettingsSet,
    /// Reset proxy settings.
    ProxySettingsClear,
    /// Subscribe to action-button clicks (fires repeatedly).
    BrowserActionOnClick,
    /// Generic privileged network fetch.
    Request,
}

impl RequestKind {
    /// All correlated request kinds, in table order.
    pub const ALL: [Self; 19] = [
        Self::TabsQuery,
        Self::TabsCreate,
        Self::TabsRemove,
        Self::TabsDuplicate,
        Self::TabsGetCurrent,
        Self::TabsExecuteScript,
        Self::TabsSendMessage,
        Self::RuntimeSendMessage,
        Self::HistoryDeleteUrl,
        Self::HistoryDeleteAll,
        Self::HistoryAddUrl,
        Self::TopSitesGet,
        Self::StorageLocalGet,
        Self::StorageLocalSet,
        Self::StorageGetQuota,
        Self::ProxySettingsSet,
        Self::ProxySettingsClear,
        Self::BrowserActionOnClick,
        Self::Request,
    ];

    /// The request message name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::TabsQuery => "tabs:query",
            Self::TabsCreate => "tabs:create",
            Self::TabsRemove => "tabs:remove",
            Self::TabsDuplicate => "tabs:duplicate",
            Self::TabsGetCurrent => "tabs:get:current",
            Self::TabsExecuteScript => "tabs:execute:script",
            Self::TabsSendMessage => "tabs:send:message",
            Self::RuntimeSendMessage => "runtime:send:message",
            Self::HistoryDeleteUrl => "history:delete:url",
            Self::HistoryDeleteAll => "history:delete:all",
            Self::HistoryAddUrl => "history:add:url",
            Self::TopSitesGet => "history:get:topsites",
            Self::StorageLocalGet => "storage:local:get",
            Self::StorageLocalSet => "storage:local:set",
            Self::StorageGetQuota => "storage:get:quota",
            Self::ProxySettingsSet => "chrome.proxy.settings.set",
            Self::ProxySettingsClear => "chrome.proxy.settings.clear",
            Self::BrowserActionOnClick => "browser-action:onclick",
            Self::Request => "request",
        }
    }

    /// The paired response message name.
    #[must_use]
    pub const fn response_name(self) -> &'static str {
        match self {
            Self::TabsQuery => "tabs:query:result",
            Self::TabsCreate => "tabs:created",
            Self::TabsRemove => "tabs:removed",
            Self::TabsDuplicate => "tabs:duplicated",
            Self::TabsGetCurrent => "tabs:got:current",
            Self::TabsExecuteScript => "tabs:executed:script",
            Self::TabsSendMessage => "tabs:message:response",
            Self::RuntimeSendMessage => "runtime:message:response:callback",
            Self::HistoryDeleteUrl => "history:deleted:url",
            Self::HistoryDeleteAll => "history:deleted:all",
            Self::HistoryAddUrl => "history:added:url",
            Self::TopSitesGet => "history:got:topsites",
            Self::StorageLocalGet => "storage:local:got",
            Self::StorageLocalSet => "storage:local:set:callback",
            Self::StorageGetQuota => "storage:get:quota:callback",
            // set and clear share one completion event.
            Self::ProxySettingsSet | Self::ProxySettingsClear => {
                "chrome.proxy.settings.set::done"
            }
            Self::BrowserActionOnClick => "browser-action:onclicked",
            Self::Request => "request:response",
        }
    }

    /// Looks up a kind by request message name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

// ============================================================================
// Broadcast Event Names
// ============================================================================

/// Parent-initiated broadcast events with no single requester.
pub mod events {
    /// Extension install completed.
    pub const RUNTIME_ON_INSTALLED: &str = "chrome.runtime.onInstalled";
    /// Proxy settings changed.
    pub const PROXY_SETTINGS_ON_CHANGE: &str = "chrome.proxy.settings.onChange";
    /// Action icon update (fire-and-forget, child → parent).
    pub const BROWSER_ACTION_SET_ICON: &str = "chrome.browserAction.setIcon";
    /// Proxy credential registration (fire-and-forget, child → parent).
    pub const HELPER_SET_PROXY_CREDENTIALS: &str = "chrome.helper.setProxyCredentials";
    /// Enable automatic proxy authentication (fire-and-forget, child → parent).
    pub const HELPER_ENABLE_PROXY_AUTO_LOGIN: &str = "chrome.helper.enableProxyAutoLogin";
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_message_wire_format() {
        let msg = PortMessage::new("tabs:query", json!({ "id": 7 }));
        let text = serde_json::to_string(&msg).expect("serialize");
        assert!(text.contains("\"tabs:query\""));
        let back: PortMessage = serde_json::from_str(&text).expect("deserialize");
        assert_eq!(back.name, "tabs:query");
        assert_eq!(back.call_id(), Some(7));
    }

    #[test]
    fn test_bare_string_payload() {
        let msg = PortMessage::new(events::BROWSER_ACTION_SET_ICON, json!("resource://icon.png"));
        assert_eq!(msg.call_id(), None);
        let text = serde_json::to_string(&msg).expect("serialize");
        let back: PortMessage = serde_json::from_str(&text).expect("deserialize");
        assert_eq!(back.payload, json!("resource://icon.png"));
    }

    #[test]
    fn test_name_table_round_trip() {
        for kind in RequestKind::ALL {
            assert_eq!(RequestKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(RequestKind::from_name("no:such:operation"), None);
    }

    #[test]
    fn test_request_names_unique() {
        let mut names: Vec<_> = RequestKind::ALL.iter().map(|k| k.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), RequestKind::ALL.len());
    }

    #[test]
    fn test_spec_pairs() {
        assert_eq!(RequestKind::TabsQuery.response_name(), "tabs:query:result");
        assert_eq!(RequestKind::TabsCreate.response_name(), "tabs:created");
        assert_eq!(
            RequestKind::RuntimeSendMessage.response_name(),
            "runtime:message:response:callback"
        );
        assert_eq!(
            RequestKind::ProxySettingsSet.response_name(),
            RequestKind::ProxySettingsClear.response_name(),
        );
    }

    #[test]
    fn test_payload_error_field() {
        let payload = json!({ "id": 3, "error": "tab not found" });
        assert_eq!(payload_error(&payload), Some("tab not found"));
        assert_eq!(payload_error(&json!({ "id": 3 })), None);
    }
}
