//! Wire protocol for the bridge.
//!
//! The protocol is the contract between the two endpoints: named messages
//! with structured payloads, a numeric correlation id per request, and a
//! fixed request-name → response-name table.
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | request | child → parent | privileged operation, carries `id` |
//! | response | parent → child | exactly one per request, echoes `id` |
//! | broadcast | parent → child | event with no single requester |
//! | fire-and-forget | child → parent | no response expected |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `message` | [`PortMessage`] frame and the [`RequestKind`] name table |
//! | `call` | variable-arity `sendMessage` canonicalization |

// ============================================================================
// Submodules
// ============================================================================

/// Message framing and operation names.
pub mod message;

/// Messaging-call canonicalization.
pub mod call;

/// Payload data types shared by both endpoints.
pub mod data;

// ============================================================================
// Re-exports
// ============================================================================

pub use call::{CanonicalSendMessage, SendMessageCall};
pub use data::{
    CreateOptions, FetchResponse, IconDetails, ProxyCredentials, ScriptDetails, StorageKeys,
    TabInfo, TopSite,
};
pub use message::{PortMessage, RequestKind, events, payload_error, payload_id};
