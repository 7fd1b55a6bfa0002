//! Tab operation handlers.
//!
//! Tab descriptions cross the boundary as plain data with mapped ids;
//! `tabs:query` results deliberately carry URLs only.

use serde_json::{Value, json};
use tracing::debug;

use crate::error::{Error, Result};
use crate::identifiers::TabId;
use crate::protocol::ScriptDetails;

use super::ExecutorInner;
use super::host::{ResolvedScript, ScriptSource, TabHandle};

// ============================================================================
// Handlers
// ============================================================================

/// `tabs:query`: enumerates open tabs, URLs only.
pub(super) async fn query(inner: &ExecutorInner) -> Result<Value> {
    let tabs = inner.host().tabs().await;
    let result: Vec<Value> = tabs.iter().map(|tab| json!({ "url": tab.url() })).collect();
    Ok(json!({ "tabs": result }))
}

/// `tabs:get:current`: describes the active tab.
pub(super) async fn get_current(inner: &ExecutorInner) -> Result<Value> {
    let tab = active_tab(inner).await?;
    Ok(json!({ "tab": inner.tab_json(&tab) }))
}

/// `tabs:create`: opens a tab and answers once it has loaded.
pub(super) async fn create(inner: &ExecutorInner, payload: &Value) -> Result<Value> {
    let url = payload["options"]["url"]
        .as_str()
        .ok_or_else(|| Error::invalid_argument("\"options.url\" must be a string"))?;
    let tab = inner.host().open_tab(url).await?;
    debug!(url, "tab created");
    Ok(json!({ "tab": inner.tab_json(&tab) }))
}

/// `tabs:remove`: closes tabs by id, highest id first. Unknown ids are
/// skipped.
pub(super) async fn remove(inner: &ExecutorInner, payload: &Value) -> Result<Value> {
    let mut ids = match &payload["tabs"] {
        Value::Array(list) => list
            .iter()
            .filter_map(Value::as_u64)
            .map(|raw| TabId::new(raw as u32))
            .collect::<Vec<_>>(),
        // A single bare id is accepted for compatibility.
        Value::Number(n) => n
            .as_u64()
            .map(|raw| vec![TabId::new(raw as u32)])
            .unwrap_or_default(),
        _ => {
            return Err(Error::invalid_argument(
                "\"tabs\" must be a tab id or a list of tab ids",
            ));
        }
    };
    ids.sort_unstable();

    for id in ids.iter().rev() {
        let current = inner.host().tabs().await;
        match inner.tab_map().tab_for(*id, &current) {
            Some(tab) => inner.host().close_tab(&tab).await?,
            None => debug!(%id, "tabs.remove skipped unknown id"),
        }
    }
    Ok(json!({}))
}

/// `tabs:duplicate`: opens a copy of the tab and answers once loaded.
pub(super) async fn duplicate(inner: &ExecutorInner, payload: &Value) -> Result<Value> {
    let tab_id = payload["tabId"]
        .as_u64()
        .map(|raw| TabId::new(raw as u32))
        .ok_or_else(|| Error::invalid_argument("\"tabId\" must be an integer"))?;

    let current = inner.host().tabs().await;
    let source = inner
        .tab_map()
        .tab_for(tab_id, &current)
        .ok_or_else(|| Error::tab_not_found(tab_id))?;

    let copy = inner.host().open_tab(source.url()).await?;
    debug!(%tab_id, "tab duplicated");
    Ok(json!({ "tab": inner.tab_json(&copy) }))
}

/// `tabs:execute:script`: injects a content script; the active tab when
/// no `tabId` is given.
pub(super) async fn execute_script(inner: &ExecutorInner, payload: &Value) -> Result<Value> {
    let tab = match payload["tabId"].as_u64() {
        Some(raw) => {
            let id = TabId::new(raw as u32);
            let current = inner.host().tabs().await;
            inner
                .tab_map()
                .tab_for(id, &current)
                .ok_or_else(|| Error::tab_not_found(id))?
        }
        None => active_tab(inner).await?,
    };

    let details: ScriptDetails = serde_json::from_value(payload["details"].clone())?;
    let when = normalize_run_at(details.run_at.as_deref());
    let source = match (details.code, details.file) {
        (Some(code), _) => ScriptSource::Code(code),
        (None, Some(file)) => ScriptSource::Url(inner.host().resolve_script_url(&file)),
        (None, None) => {
            return Err(Error::invalid_argument(
                "\"details\" must set \"code\" or \"file\"",
            ));
        }
    };

    inner.host().attach_script(&tab, ResolvedScript { when, source }).await?;
    Ok(json!({}))
}

// ============================================================================
// Helpers
// ============================================================================

async fn active_tab(inner: &ExecutorInner) -> Result<TabHandle> {
    inner
        .host()
        .active_tab()
        .await
        .ok_or_else(|| Error::operation("no active tab"))
}

/// Maps the requested `runAt` spelling to the host's injection points:
/// the `document_` prefix is dropped and `idle` lands at `ready`, which is
/// also the default.
fn normalize_run_at(run_at: Option<&str>) -> String {
    let Some(raw) = run_at else {
        return "ready".to_string();
    };
    let stripped = match raw.get(..9) {
        Some(prefix) if prefix.eq_ignore_ascii_case("document_") => &raw[9..],
        _ => raw,
    };
    if stripped.eq_ignore_ascii_case("idle") {
        "ready".to_string()
    } else {
        stripped.to_ascii_lowercase()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_run_at() {
        assert_eq!(normalize_run_at(None), "ready");
        assert_eq!(normalize_run_at(Some("document_start")), "start");
        assert_eq!(normalize_run_at(Some("document_end")), "end");
        assert_eq!(normalize_run_at(Some("document_idle")), "ready");
        assert_eq!(normalize_run_at(Some("idle")), "ready");
        assert_eq!(normalize_run_at(Some("Document_Start")), "start");
    }

    mod end_to_end {
        use std::sync::Arc;

        use serde_json::json;
        use tokio::time::{Duration, timeout};

        use crate::parent::{Executor, MemoryHost};
        use crate::protocol::RequestKind;
        use crate::transport::Port;

        async fn round_trip(
            child: &Port,
            kind: RequestKind,
            id: u64,
            payload: serde_json::Value,
        ) -> serde_json::Value {
            let rx = child.expect(kind.response_name(), id);
            let mut payload = payload;
            payload["id"] = json!(id);
            child.emit(kind.name(), payload).expect("emit");
            timeout(Duration::from_secs(2), rx)
                .await
                .expect("no timeout")
                .expect("delivered")
        }

        #[tokio::test]
        async fn test_each_request_gets_exactly_one_response() {
            let (child, parent) = Port::pair();
            let host = MemoryHost::new();
            host.add_tab("https://a.example", "A");
            let executor = Executor::new(Arc::new(host));
            executor.attach(parent);

            let response = round_trip(&child, RequestKind::TabsQuery, 7, json!({})).await;
            assert_eq!(response["id"], json!(7));
            assert_eq!(response["tabs"], json!([{ "url": "https://a.example" }]));
            assert_eq!(child.pending_count(), 0);
        }

        #[tokio::test]
        async fn test_failure_is_embedded_as_error_field() {
            let (child, parent) = Port::pair();
            let executor = Executor::new(Arc::new(MemoryHost::new()));
            executor.attach(parent);

            let response = round_trip(
                &child,
                RequestKind::TabsDuplicate,
                3,
                json!({ "tabId": 99 }),
            )
            .await;
            assert_eq!(response["id"], json!(3));
            assert_eq!(response["error"], json!("Tab not found: 99"));
        }

        #[tokio::test]
        async fn test_remove_accepts_single_bare_id() {
            let (child, parent) = Port::pair();
            let host = MemoryHost::new();
            host.add_tab("https://a.example", "A");
            let executor = Executor::new(Arc::new(host.clone()));
            executor.attach(parent);

            // Assign an id through get:current first.
            let current = round_trip(&child, RequestKind::TabsGetCurrent, 1, json!({})).await;
            let tab_id = current["tab"]["id"].clone();

            let response =
                round_trip(&child, RequestKind::TabsRemove, 2, json!({ "tabs": tab_id })).await;
            assert_eq!(response["id"], json!(2));
            assert!(host.tab_urls().is_empty());
        }

        #[tokio::test]
        async fn test_interleaved_requests_resolve_out_of_order_safely() {
            let (child, parent) = Port::pair();
            let host = MemoryHost::new();
            host.add_tab("https://a.example", "A");
            let executor = Executor::new(Arc::new(host));
            executor.attach(parent);

            // Register both listeners, then emit both requests before
            // awaiting either.
            let rx_a = child.expect(RequestKind::TabsQuery.response_name(), 10);
            let rx_b = child.expect(RequestKind::TabsGetCurrent.response_name(), 11);
            child
                .emit(RequestKind::TabsQuery.name(), json!({ "id": 10 }))
                .expect("emit");
            child
                .emit(RequestKind::TabsGetCurrent.name(), json!({ "id": 11 }))
                .expect("emit");

            let b = timeout(Duration::from_secs(2), rx_b)
                .await
                .expect("no timeout")
                .expect("delivered");
            let a = timeout(Duration::from_secs(2), rx_a)
                .await
                .expect("no timeout")
                .expect("delivered");
            assert_eq!(a["id"], json!(10));
            assert_eq!(b["id"], json!(11));
        }
    }
}
