//! `chrome.helper` surface.
//!
//! Non-standard members the original shim grew alongside the `chrome.*`
//! tree: proxy authentication material and a manual reply path for
//! cross-extension messages. The proxy members are fire-and-forget; no
//! response message pairs with them.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::debug;

use crate::error::Result;
use crate::identifiers::MessageId;
use crate::protocol::{ProxyCredentials, RequestKind, events as event_names};
use crate::sanitize::sanitize;

use super::ChromeInner;

// ============================================================================
// Helper
// ============================================================================

/// Handle for the `chrome.helper` namespace.
#[derive(Clone)]
pub struct Helper {
    inner: Arc<ChromeInner>,
}

impl Helper {
    pub(crate) fn new(inner: Arc<ChromeInner>) -> Self {
        Self { inner }
    }

    /// Registers authentication material for the active proxy.
    /// Fire-and-forget.
    pub fn set_proxy_credentials(&self, credentials: ProxyCredentials) -> Result<()> {
        debug!(host = %credentials.host, "helper.setProxyCredentials");
        self.inner.fire(
            event_names::HELPER_SET_PROXY_CREDENTIALS,
            sanitize(&credentials)?,
        )
    }

    /// Enables automatic proxy authentication. Fire-and-forget.
    pub fn enable_proxy_auto_login(&self) -> Result<()> {
        debug!("helper.enableProxyAutoLogin");
        self.inner
            .fire(event_names::HELPER_ENABLE_PROXY_AUTO_LOGIN, Value::Null)
    }

    /// Manually answers a cross-extension message by its identifier.
    ///
    /// The regular reply path is the scoped reply function handed to
    /// `runtime.onMessage` listeners; this escape hatch emits the same
    /// response message for callers that carry the identifier themselves.
    pub fn send_response(&self, message_id: MessageId, message: Value) -> Result<()> {
        debug!(%message_id, "helper.sendResponse");
        self.inner.fire(
            RequestKind::RuntimeSendMessage.response_name(),
            json!({
                "id": message_id.as_u64(),
                "response": sanitize(&message)?,
            }),
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc as StdArc;

    use serde_json::json;
    use tokio::time::{Duration, timeout};

    use crate::child::{Chrome, ChromeOptions};
    use crate::parent::{Executor, MemoryHost};
    use crate::transport::Port;

    fn credentials() -> ProxyCredentials {
        ProxyCredentials {
            host: "proxy.example".into(),
            port: 3128,
            realm: "upstream".into(),
            username: "user".into(),
            password: "secret".into(),
        }
    }

    fn bridge() -> (Chrome, MemoryHost) {
        let (child_port, parent_port) = Port::pair();
        let host = MemoryHost::new();
        let executor = Executor::new(StdArc::new(host.clone()));
        executor.attach(parent_port);
        let chrome = Chrome::new(
            child_port,
            ChromeOptions::new(url::Url::parse("resource://extension/").expect("static url")),
        );
        (chrome, host)
    }

    #[tokio::test]
    async fn test_set_proxy_credentials_reaches_host() {
        let (chrome, host) = bridge();

        chrome
            .helper()
            .set_proxy_credentials(credentials())
            .expect("fire");

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(host.proxy_credentials(), Some(credentials()));
    }

    #[tokio::test]
    async fn test_enable_proxy_auto_login_reaches_host() {
        let (chrome, host) = bridge();
        assert!(!host.auto_login_enabled());

        chrome.helper().enable_proxy_auto_login().expect("fire");

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(host.auto_login_enabled());
    }

    #[tokio::test]
    async fn test_send_response_relays_to_other_context() {
        // The panel holds a raw port so the pending listener can be
        // registered with a known message id.
        let (panel_port, parent_a) = Port::pair();
        let (child_b, parent_b) = Port::pair();
        let executor = Executor::new(StdArc::new(MemoryHost::new()));
        executor.attach(parent_a);
        executor.attach(parent_b);

        let page = Chrome::new(
            child_b,
            ChromeOptions::new(url::Url::parse("resource://extension/").expect("static url")),
        );

        let rx = panel_port.expect(RequestKind::RuntimeSendMessage.response_name(), 42);
        page.helper()
            .send_response(MessageId::from_raw(42), json!("manual reply"))
            .expect("fire");

        let payload = timeout(Duration::from_secs(2), rx)
            .await
            .expect("no timeout")
            .expect("delivered");
        assert_eq!(payload["response"], json!("manual reply"));
    }
}
