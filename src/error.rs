//! Error types for the bridge.
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`].
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Argument validation | [`Error::InvalidArgument`], [`Error::AmbiguousArguments`] |
//! | Unsupported surface | [`Error::Unimplemented`] |
//! | Executor-reported | [`Error::Operation`], [`Error::TabNotFound`] |
//! | Correlation | [`Error::ResponseTimeout`], [`Error::PortClosed`] |
//! | Boundary crossing | [`Error::Sanitize`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`], [`Error::ChannelClosed`] |
//!
//! Validation, unimplemented-feature and ambiguous-overload errors are
//! returned before any message is emitted and are never caught internally.
//! Once a request is on the wire, failures come back as [`Error::Operation`]
//! (the executor embeds an `error` field in the response payload) or as a
//! correlation-level failure. No operation is retried automatically.

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::TabId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Argument Validation Errors
    // ========================================================================
    /// Malformed call arguments.
    ///
    /// Raised synchronously, before any message is sent.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    /// Variable-arity canonicalization could not determine which optional
    /// parameters were omitted.
    #[error("Ambiguous arguments: {message}")]
    AmbiguousArguments {
        /// Description of the ambiguity.
        message: String,
    },

    /// The caller requested an option this shim does not support.
    ///
    /// Unsupported surface fails loudly instead of silently degrading.
    #[error("Not implemented: {feature}")]
    Unimplemented {
        /// The unsupported option or feature.
        feature: String,
    },

    // ========================================================================
    // Executor-Reported Errors
    // ========================================================================
    /// The trusted endpoint failed to perform the operation.
    ///
    /// Carried back in the response payload's `error` field.
    #[error("Operation failed: {message}")]
    Operation {
        /// Failure description from the executor.
        message: String,
    },

    /// No currently open tab maps to the given identifier.
    #[error("Tab not found: {tab_id}")]
    TabNotFound {
        /// The missing tab ID.
        tab_id: TabId,
    },

    // ========================================================================
    // Correlation Errors
    // ========================================================================
    /// No response arrived for a call within the configured timeout.
    #[error("No response to {name} (call {id}) after {timeout_ms}ms")]
    ResponseTimeout {
        /// Response message name that was awaited.
        name: String,
        /// The call identifier that timed out.
        id: u64,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// The port to the peer endpoint is gone.
    ///
    /// All pending calls fail with this when the bridge tears down.
    #[error("Port closed")]
    PortClosed,

    // ========================================================================
    // Boundary Errors
    // ========================================================================
    /// A value could not be structurally cloned across the boundary.
    #[error("Sanitization failed: {message}")]
    Sanitize {
        /// Description of the non-serializable input.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// Channel receive error.
    #[error("Channel closed")]
    ChannelClosed(#[from] RecvError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates an invalid argument error.
    #[inline]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an ambiguous arguments error.
    #[inline]
    pub fn ambiguous(message: impl Into<String>) -> Self {
        Self::AmbiguousArguments {
            message: message.into(),
        }
    }

    /// Creates an unimplemented-feature error.
    #[inline]
    pub fn unimplemented(feature: impl Into<String>) -> Self {
        Self::Unimplemented {
            feature: feature.into(),
        }
    }

    /// Creates an executor-reported operation error.
    #[inline]
    pub fn operation(message: impl Into<String>) -> Self {
        Self::Operation {
            message: message.into(),
        }
    }

    /// Creates a tab not found error.
    #[inline]
    pub fn tab_not_found(tab_id: TabId) -> Self {
        Self::TabNotFound { tab_id }
    }

    /// Creates a response timeout error.
    #[inline]
    pub fn response_timeout(name: impl Into<String>, id: u64, timeout_ms: u64) -> Self {
        Self::ResponseTimeout {
            name: name.into(),
            id,
            timeout_ms,
        }
    }

    /// Creates a sanitization error.
    #[inline]
    pub fn sanitize(message: impl Into<String>) -> Self {
        Self::Sanitize {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this error was raised before any message was sent.
    #[inline]
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument { .. }
                | Self::AmbiguousArguments { .. }
                | Self::Unimplemented { .. }
        )
    }

    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::ResponseTimeout { .. })
    }

    /// Returns `true` if the peer endpoint is unreachable.
    #[inline]
    #[must_use]
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            Self::PortClosed | Self::ChannelClosed(_) | Self::WebSocket(_)
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
