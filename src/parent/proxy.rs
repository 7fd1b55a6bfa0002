//! Proxy settings and proxy-authentication handlers.
//!
//! The PAC autoconfig URL arrives fully formed from the child; applying it
//! is two preference writes. The helper messages are fire-and-forget, so
//! malformed payloads are logged and dropped rather than answered.

use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::protocol::ProxyCredentials;

use super::ExecutorInner;
use super::host::PrefValue;

// ============================================================================
// Constants
// ============================================================================

pub(super) const AUTOCONFIG_URL_PREF: &str = "network.proxy.autoconfig_url";
pub(super) const PROXY_TYPE_PREF: &str = "network.proxy.type";

/// Preference value selecting proxy auto-configuration (PAC).
const PROXY_TYPE_PAC: i64 = 2;

// ============================================================================
// Handlers
// ============================================================================

/// `chrome.proxy.settings.set`: applies a PAC autoconfig URL.
pub(super) async fn settings_set(inner: &ExecutorInner, payload: &Value) -> Result<Value> {
    let url = payload["autoconfig_url"]
        .as_str()
        .ok_or_else(|| Error::invalid_argument("\"autoconfig_url\" must be a string"))?;

    inner
        .host()
        .set_preference(AUTOCONFIG_URL_PREF, PrefValue::Str(url.to_string()))
        .await;
    inner
        .host()
        .set_preference(PROXY_TYPE_PREF, PrefValue::Int(PROXY_TYPE_PAC))
        .await;
    debug!("proxy autoconfig applied");
    Ok(json!({}))
}

/// `chrome.proxy.settings.clear`: resets proxy preferences to defaults.
pub(super) async fn settings_clear(inner: &ExecutorInner) -> Result<Value> {
    inner.host().reset_preference(AUTOCONFIG_URL_PREF).await;
    inner.host().reset_preference(PROXY_TYPE_PREF).await;
    debug!("proxy preferences reset");
    Ok(json!({}))
}

/// `chrome.helper.setProxyCredentials`: fire-and-forget.
pub(super) async fn set_credentials(inner: &ExecutorInner, payload: Value) {
    match serde_json::from_value::<ProxyCredentials>(payload) {
        Ok(credentials) => {
            debug!(host = %credentials.host, "proxy credentials registered");
            inner.host().set_proxy_credentials(credentials).await;
        }
        Err(e) => warn!(error = %e, "unparseable proxy credentials dropped"),
    }
}

/// `chrome.helper.enableProxyAutoLogin`: fire-and-forget.
pub(super) async fn enable_auto_login(inner: &ExecutorInner) {
    debug!("proxy auto-login enabled");
    inner.host().enable_proxy_auto_login().await;
}

// ============================================================================
// Tests
// ============================================================================
