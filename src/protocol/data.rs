//! Payload data types shared by both endpoints.
//!
//! Everything here is plain serializable data; capability-bearing handles
//! never appear in these shapes.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::identifiers::TabId;

// ============================================================================
// TabInfo
// ============================================================================

/// Tab description as exposed to untrusted code.
///
/// `tabs:query` results carry only `url`; `tabs:created`, `tabs:duplicated`
/// and `tabs:got:current` carry the full shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabInfo {
    /// Small-integer tab handle, when assigned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<TabId>,

    /// Tab URL.
    pub url: String,

    /// Tab title, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Favicon URL. Never populated in this version.
    #[serde(
        rename = "favIconUrl",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub fav_icon_url: Option<String>,
}

// ============================================================================
// CreateOptions
// ============================================================================

/// Options for `tabs.create`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOptions {
    /// URL to open.
    pub url: String,
}

impl CreateOptions {
    /// Creates options opening `url`.
    #[inline]
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

// ============================================================================
// ScriptDetails
// ============================================================================

/// Script-injection request for `tabs.executeScript`.
///
/// Exactly one of `code` or `file` must be set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScriptDetails {
    /// Inline script source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// Script file path, resolved by the trusted endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// Injection point: `document_start`, `document_end`, `document_idle`.
    #[serde(rename = "runAt", default, skip_serializing_if = "Option::is_none")]
    pub run_at: Option<String>,
}

impl ScriptDetails {
    /// Details injecting inline code.
    #[inline]
    #[must_use]
    pub fn code(source: impl Into<String>) -> Self {
        Self {
            code: Some(source.into()),
            ..Self::default()
        }
    }

    /// Details injecting a packaged script file.
    #[inline]
    #[must_use]
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            file: Some(path.into()),
            ..Self::default()
        }
    }

    /// Sets the injection point.
    #[inline]
    #[must_use]
    pub fn with_run_at(mut self, run_at: impl Into<String>) -> Self {
        self.run_at = Some(run_at.into());
        self
    }
}

// ============================================================================
// StorageKeys
// ============================================================================

/// Key selector accepted by `storage.local.get` and `getBytesInUse`.
///
/// Mirrors the overloaded surface: a single key, a list of keys, or an
/// object whose values provide per-key defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StorageKeys {
    /// One key.
    Single(String),
    /// Several keys.
    Many(Vec<String>),
    /// Keys with fallback values.
    WithDefaults(serde_json::Map<String, Value>),
}

impl From<&str> for StorageKeys {
    fn from(key: &str) -> Self {
        Self::Single(key.to_string())
    }
}

impl From<Vec<String>> for StorageKeys {
    fn from(keys: Vec<String>) -> Self {
        Self::Many(keys)
    }
}

// ============================================================================
// IconDetails
// ============================================================================

/// Arguments to `browserAction.setIcon`.
///
/// Only string `path` icons are supported; the other fields exist so the
/// unsupported surface can fail loudly instead of being silently dropped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IconDetails {
    /// Raw pixel data. Not implemented.
    #[serde(
        rename = "imageData",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub image_data: Option<Value>,

    /// Per-tab icon scoping. Not implemented.
    #[serde(rename = "tabId", default, skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<i64>,

    /// Icon path: a string, relative to the extension root or absolute
    /// `http(s)`. Object form (per-size dictionary) is not implemented.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Value>,
}

impl IconDetails {
    /// Details pointing at a path string.
    #[inline]
    #[must_use]
    pub fn path(path: impl Into<String>) -> Self {
        Self {
            path: Some(Value::String(path.into())),
            ..Self::default()
        }
    }
}

// ============================================================================
// ProxyCredentials
// ============================================================================

/// Proxy authentication material registered via `helper`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyCredentials {
    /// Proxy hostname.
    pub host: String,
    /// Proxy port.
    pub port: u16,
    /// Authentication realm.
    pub realm: String,
    /// Username.
    pub username: String,
    /// Password.
    pub password: String,
}

// ============================================================================
// FetchResponse
// ============================================================================

/// Result of a privileged network fetch (`request`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchResponse {
    /// Final URL after redirects.
    pub url: String,

    /// Response body text.
    #[serde(default)]
    pub text: String,

    /// Parsed JSON body, when the response was JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<Value>,

    /// HTTP status code.
    pub status: u16,

    /// HTTP status text.
    #[serde(rename = "statusText", default)]
    pub status_text: String,

    /// Response headers.
    #[serde(default)]
    pub headers: serde_json::Map<String, Value>,
}

// ============================================================================
// TopSite
// ============================================================================

/// One most-visited entry from the history store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopSite {
    /// Site URL.
    pub url: String,

    /// Page title.
    #[serde(default)]
    pub title: String,
}

// ============================================================================
// Tests
// ============================================================================
