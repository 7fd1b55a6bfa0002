//! The port transport layer.
//!
//! Child and parent each hold one [`Port`] end of a single bidirectional
//! named-message channel. Two carriers are provided:
//!
//! ```text
//! ┌──────────────────┐                         ┌──────────────────┐
//! │  Chrome (child)  │      Port::pair()       │ Executor (parent)│
//! │                  │◄───────────────────────►│                  │
//! │  polyfilled API  │   or WebSocket frames   │  host operations │
//! │                  │   (PortServer/connect)  │                  │
//! └──────────────────┘                         └──────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `port` | listener table, dispatch, in-memory pair |
//! | `socket` | WebSocket-framed port for cross-process bridges |

// ============================================================================
// Submodules
// ============================================================================

/// Port endpoint and in-memory pairing.
pub mod port;

/// WebSocket carrier.
pub mod socket;

// ============================================================================
// Re-exports
// ============================================================================

pub use port::Port;
pub use socket::{PortServer, connect};
