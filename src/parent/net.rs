//! Privileged network fetch handler.

use serde_json::{Value, json};
use tracing::debug;

use crate::error::Result;

use super::ExecutorInner;
use super::host::FetchRequest;

// ============================================================================
// Handler
// ============================================================================

/// `request`: performs a fetch with the host's network stack and answers
/// with the full response description.
pub(super) async fn request(inner: &ExecutorInner, payload: &Value) -> Result<Value> {
    // The correlation id rides in the same object as the fetch options;
    // everything else is the request.
    let mut options = payload.clone();
    if let Some(map) = options.as_object_mut() {
        map.remove("id");
    }
    let request: FetchRequest = serde_json::from_value(options)?;

    debug!(url = %request.url, "privileged fetch");
    let response = inner.host().fetch(request).await?;
    Ok(json!({ "response": response }))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use tokio::time::{Duration, timeout};

    use crate::parent::{Executor, MemoryHost};
    use crate::protocol::{FetchResponse, RequestKind};
    use crate::transport::Port;

    #[tokio::test]
    async fn test_request_round_trip_with_canned_response() {
        let (child, parent) = Port::pair();
        let host = MemoryHost::new();
        host.stub_fetch(
            "https://api.example/v1/status",
            FetchResponse {
                url: "https://api.example/v1/status".into(),
                text: "{\"ok\":true}".into(),
                json: Some(json!({ "ok": true })),
                status: 200,
                status_text: "OK".into(),
                headers: serde_json::Map::new(),
            },
        );
        let executor = Executor::new(Arc::new(host));
        executor.attach(parent);

        let rx = child.expect(RequestKind::Request.response_name(), 5);
        child
            .emit(
                RequestKind::Request.name(),
                json!({ "id": 5, "url": "https://api.example/v1/status" }),
            )
            .expect("emit");

        let payload = timeout(Duration::from_secs(2), rx)
            .await
            .expect("no timeout")
            .expect("delivered");
        assert_eq!(payload["response"]["status"], json!(200));
        assert_eq!(payload["response"]["json"]["ok"], json!(true));
    }

    #[tokio::test]
    async fn test_unstubbed_url_is_a_not_found_response() {
        let (child, parent) = Port::pair();
        let executor = Executor::new(Arc::new(MemoryHost::new()));
        executor.attach(parent);

        let rx = child.expect(RequestKind::Request.response_name(), 6);
        child
            .emit(
                RequestKind::Request.name(),
                json!({ "id": 6, "url": "https://nowhere.example/" }),
            )
            .expect("emit");

        let payload = timeout(Duration::from_secs(2), rx)
            .await
            .expect("no timeout")
            .expect("delivered");
        assert_eq!(payload["response"]["status"], json!(404));
    }
}
