//! Chrome extension API compatibility bridge.
//!
//! This library lets extension code written against a `chrome.*`-shaped API
//! run inside a host exposing a different extension platform. Emulated API
//! calls are forwarded across a privilege boundary as correlated
//! request/response message pairs; the privileged side performs the real
//! browser operation and answers exactly once.
//!
//! # Architecture
//!
//! Two cooperating endpoints connected by a single duplex named-message
//! channel (the port):
//!
//! - **Child (untrusted)**: [`Chrome`] exposes the polyfilled API surface.
//!   Each operation validates its arguments synchronously, allocates a call
//!   identifier, registers a one-shot listener for the paired response name,
//!   and emits the request.
//! - **Parent (trusted)**: [`Executor`] registers a durable handler per
//!   request name, performs the operation through a [`Host`] capability
//!   implementation, and emits one response echoing the request's id.
//!
//! Key design principles:
//!
//! - Responses are matched by identifier, never by arrival order;
//!   concurrent outstanding calls resolve independently
//! - At-most-once delivery: the first matching response removes the listener
//! - All cross-boundary data is sanitized (structural clone, no live
//!   references survive the trip)
//! - Per-endpoint state only; no process-wide globals
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use chrome_bridge::{Chrome, ChromeOptions, CreateOptions, Executor, MemoryHost, Port, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     // In-memory bridge: both endpoints in one process.
//!     let (child_port, parent_port) = Port::pair();
//!
//!     let executor = Executor::new(Arc::new(MemoryHost::new()));
//!     executor.attach(parent_port);
//!
//!     let root = url::Url::parse("resource://extension/").expect("static url");
//!     let chrome = Chrome::new(child_port, ChromeOptions::new(root));
//!
//!     // Emulated API calls round-trip through the executor.
//!     let tab = chrome
//!         .tabs()
//!         .create(CreateOptions::new("https://example.com"))
//!         .await?;
//!     println!("opened tab {:?}: {}", tab.id, tab.url);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`child`] | Untrusted endpoint: polyfilled `chrome.*` API surface |
//! | [`parent`] | Trusted endpoint: operation executor and [`Host`] seam |
//! | [`transport`] | The port: in-memory pair and WebSocket carrier |
//! | [`protocol`] | Message framing, operation name table, call shapes |
//! | [`sanitize`] | Structural-clone value sanitizer |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`error`] | Error types and [`Result`] alias |

// ============================================================================
// Modules
// ============================================================================

/// Untrusted endpoint: the polyfilled API surface.
///
/// [`Chrome`] owns the child end of the port and all per-endpoint state.
pub mod child;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers for bridge entities.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// Trusted endpoint: operation executor and host capabilities.
///
/// [`Executor`] answers requests through a [`Host`] implementation;
/// [`MemoryHost`] is the in-memory implementation for tests and headless
/// embedding.
pub mod parent;

/// Wire protocol message types.
///
/// The request-name → response-name table and payload shapes.
pub mod protocol;

/// Value sanitization for boundary crossings.
pub mod sanitize;

/// The port transport layer.
///
/// In-memory pairing and the WebSocket-framed carrier.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Child endpoint types
pub use child::{Chrome, ChromeOptions};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{CallId, ListenerToken, MessageId, TabId, TargetId};

// Parent endpoint types
pub use parent::{Executor, FetchRequest, Host, MemoryHost, PrefValue, TabHandle};

// Protocol types
pub use protocol::{
    CreateOptions, FetchResponse, IconDetails, PortMessage, ProxyCredentials, RequestKind,
    ScriptDetails, StorageKeys, TabInfo, TopSite,
};

// Transport types
pub use transport::{Port, PortServer};
