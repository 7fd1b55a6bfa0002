//! `chrome.storage` surface.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::debug;

use crate::error::{Error, Result};
use crate::protocol::{RequestKind, StorageKeys};
use crate::sanitize::sanitize;

use super::ChromeInner;

// ============================================================================
// Storage
// ============================================================================

/// Handle for the `chrome.storage` namespace.
#[derive(Clone)]
pub struct Storage {
    inner: Arc<ChromeInner>,
}

impl Storage {
    pub(crate) fn new(inner: Arc<ChromeInner>) -> Self {
        Self { inner }
    }

    /// `chrome.storage.local`
    #[must_use]
    pub fn local(&self) -> LocalStorage {
        LocalStorage {
            inner: Arc::clone(&self.inner),
        }
    }
}

// ============================================================================
// LocalStorage
// ============================================================================

/// Handle for the `chrome.storage.local` area.
#[derive(Clone)]
pub struct LocalStorage {
    inner: Arc<ChromeInner>,
}

impl LocalStorage {
    /// Reads items for the selected keys.
    ///
    /// Passing [`StorageKeys::WithDefaults`] fills absent keys from the
    /// provided defaults.
    pub async fn get(&self, keys: impl Into<StorageKeys>) -> Result<Value> {
        let keys = keys.into();
        debug!(?keys, "storage.local.get");
        let payload = json!({ "keys": sanitize(&keys)? });
        let data = self.inner.call(RequestKind::StorageLocalGet, payload).await?;
        sanitize(&data["items"])
    }

    /// Writes every entry of `items`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] unless `items` is an object.
    pub async fn set(&self, items: Value) -> Result<()> {
        if !items.is_object() {
            return Err(Error::invalid_argument("\"items\" must be an object"));
        }
        debug!("storage.local.set");
        let payload = json!({ "items": sanitize(&items)? });
        self.inner.call(RequestKind::StorageLocalSet, payload).await?;
        Ok(())
    }

    /// Reports bytes in use, for the selected keys or (with `None`) the
    /// whole area.
    pub async fn get_bytes_in_use(&self, keys: Option<StorageKeys>) -> Result<u64> {
        debug!(?keys, "storage.local.getBytesInUse");
        let payload = json!({ "keys": sanitize(&keys)? });
        let data = self.inner.call(RequestKind::StorageGetQuota, payload).await?;
        Ok(data
            .get("bytesInUse")
            .and_then(Value::as_u64)
            .unwrap_or_default())
    }
}

// ============================================================================
// Tests
// ============================================================================
