//! `chrome.proxy` surface.
//!
//! Only the PAC-script use case is supported: `settings.set` validates the
//! full argument shape synchronously and converts the PAC source into a
//! `data:` autoconfig URL before it crosses the boundary. Everything the
//! shim does not support fails loudly before any message is emitted.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::identifiers::ListenerToken;
use crate::protocol::RequestKind;

use super::ChromeInner;
use super::events::EventCallback;
use super::extension::StubEvent;

// ============================================================================
// Proxy
// ============================================================================

/// Handle for the `chrome.proxy` namespace.
#[derive(Clone)]
pub struct Proxy {
    inner: Arc<ChromeInner>,
}

impl Proxy {
    pub(crate) fn new(inner: Arc<ChromeInner>) -> Self {
        Self { inner }
    }

    /// `chrome.proxy.settings`
    #[must_use]
    pub fn settings(&self) -> ProxySettings {
        ProxySettings {
            inner: Arc::clone(&self.inner),
        }
    }

    /// `chrome.proxy.onProxyError`: present for API shape only.
    #[must_use]
    pub fn on_proxy_error(&self) -> StubEvent {
        StubEvent::new("proxy.onProxyError")
    }
}

// ============================================================================
// ProxySettings
// ============================================================================

/// Handle for `chrome.proxy.settings`.
#[derive(Clone)]
pub struct ProxySettings {
    inner: Arc<ChromeInner>,
}

impl ProxySettings {
    /// Reports the level of control. Answered locally, no round trip.
    #[must_use]
    pub fn get(&self, _details: Value) -> Value {
        json!({ "levelOfControl": "controllable_by_this_extension" })
    }

    /// Applies PAC-script proxy settings.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] on any shape violation: non-object
    /// `details` or `value`, a mode other than `pac_script`, or a missing
    /// `pacScript.data` string. All of these fail before any message is
    /// emitted.
    pub async fn set(&self, details: Value) -> Result<()> {
        if !details.is_object() {
            return Err(Error::invalid_argument("\"details\" argument must be an object"));
        }
        let value = &details["value"];
        if !value.is_object() {
            return Err(Error::invalid_argument("\"details.value\" must be an object"));
        }
        if value["mode"] != json!("pac_script") {
            return Err(Error::invalid_argument(
                "\"details.value.mode\" must be string \"pac_script\"",
            ));
        }
        let pac_script = &value["pacScript"];
        if !pac_script.is_object() {
            return Err(Error::invalid_argument(
                "\"details.value.pacScript\" must be an object",
            ));
        }
        let Some(data) = pac_script["data"].as_str() else {
            return Err(Error::invalid_argument(
                "\"details.value.pacScript.data\" must be a string",
            ));
        };

        if pac_script.get("mandatory").is_some() {
            warn!("proxy.settings.set does not implement \"pacScript.mandatory\"");
        }
        if details.get("scope").is_some() {
            warn!("proxy.settings.set does not implement \"scope\"");
        }

        let autoconfig_url = format!(
            "data:text/javascript,{}",
            urlencoding::encode(data)
        );
        debug!("proxy.settings.set");

        self.inner
            .call(
                RequestKind::ProxySettingsSet,
                json!({ "autoconfig_url": autoconfig_url }),
            )
            .await?;
        Ok(())
    }

    /// Resets proxy settings to the host defaults.
    pub async fn clear(&self, _details: Value) -> Result<()> {
        debug!("proxy.settings.clear");
        self.inner
            .call(RequestKind::ProxySettingsClear, json!({}))
            .await?;
        Ok(())
    }

    /// `chrome.proxy.settings.onChange`
    #[must_use]
    pub fn on_change(&self) -> OnProxyChange {
        OnProxyChange {
            inner: Arc::clone(&self.inner),
        }
    }
}

// ============================================================================
// OnProxyChange
// ============================================================================

/// `chrome.proxy.settings.onChange` registry handle.
#[derive(Clone)]
pub struct OnProxyChange {
    inner: Arc<ChromeInner>,
}

impl OnProxyChange {
    /// Appends a listener fired on every settings change.
    pub fn add_listener(&self, callback: Arc<EventCallback>) -> ListenerToken {
        self.inner.proxy_change_listeners().add_listener(callback)
    }

    /// Identity-based membership test.
    #[must_use]
    pub fn has_listener(&self, token: ListenerToken) -> bool {
        self.inner.proxy_change_listeners().has_listener(token)
    }

    /// Accepted and ignored; see [`super::events::ListenerRegistry`].
    pub fn remove_listener(&self, token: ListenerToken) {
        self.inner.proxy_change_listeners().remove_listener(token);
    }
}

// ============================================================================
// Tests
// ============================================================================
