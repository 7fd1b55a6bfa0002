//! Type-safe identifiers for bridge entities.
//!
//! Newtype wrappers prevent mixing incompatible IDs at compile time.
//!
//! # ID Namespaces
//!
//! | Type | Namespace | Generation |
//! |------|-----------|------------|
//! | [`CallId`] | per-endpoint request/response correlation | monotonic counter |
//! | [`MessageId`] | cross-extension messaging callbacks | timestamp + sequence suffix |
//! | [`TabId`] | tab handles exposed to untrusted code | assigned by the parent's tab map |
//! | [`ListenerToken`] | registry membership | monotonic counter |
//! | [`TargetId`] | attached child contexts on the parent | monotonic counter |
//!
//! Both call and message IDs are unique only within the endpoint that
//! allocated them; the peer never allocates in the same namespace, it only
//! echoes the ID it received.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

// ============================================================================
// CallId
// ============================================================================

/// Correlation identifier for one request/response exchange.
///
/// Allocated by [`CallSequence`]; never reused while a response is
/// outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(u64);

impl CallId {
    /// Wraps a raw value received from the wire.
    #[inline]
    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw numeric value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// CallSequence
// ============================================================================

/// Monotonic per-endpoint allocator for [`CallId`]s.
///
/// Starts at zero and never wraps in practice (u64).
#[derive(Debug, Default)]
pub struct CallSequence {
    next: AtomicU64,
}

impl CallSequence {
    /// Creates a new sequence starting at zero.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(0),
        }
    }

    /// Allocates the next call identifier.
    #[inline]
    pub fn next(&self) -> CallId {
        CallId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

// ============================================================================
// MessageId
// ============================================================================

/// Identifier in the cross-extension messaging namespace.
///
/// Encoded as a millisecond timestamp concatenated with a three-digit
/// per-endpoint sequence suffix, so the wire value stays a plain integer
/// while remaining collision-free within one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(u64);

impl MessageId {
    /// Wraps a raw value received from the wire.
    #[inline]
    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw numeric value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// MessageSequence
// ============================================================================

/// Per-endpoint allocator for [`MessageId`]s.
#[derive(Debug, Default)]
pub struct MessageSequence {
    suffix: AtomicU64,
}

impl MessageSequence {
    /// Creates a new sequence.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            suffix: AtomicU64::new(0),
        }
    }

    /// Allocates the next message identifier.
    pub fn next(&self) -> MessageId {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        let suffix = self.suffix.fetch_add(1, Ordering::Relaxed) % 1000;
        MessageId(millis * 1000 + suffix)
    }
}

// ============================================================================
// TabId
// ============================================================================

/// Small-integer tab handle exposed to untrusted code.
///
/// Assigned sequentially by the parent's tab-identity map; carries no
/// capability, only identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(u32);

impl TabId {
    /// Wraps a raw value.
    #[inline]
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Returns the raw numeric value.
    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// ListenerToken
// ============================================================================

/// Opaque identity of one registered listener.
///
/// Returned by `add_listener`; the Rust stand-in for JavaScript's
/// function-identity membership test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerToken(u64);

impl ListenerToken {
    pub(crate) const fn from_raw(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for ListenerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}

// ============================================================================
// TargetId
// ============================================================================

/// Identity of one attached child context on the parent side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetId(u64);

impl TargetId {
    pub(crate) const fn from_raw(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "target#{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_sequence_monotonic() {
        let seq = CallSequence::new();
        let a = seq.next();
        let b = seq.next();
        let c = seq.next();
        assert!(a.as_u64() < b.as_u64());
        assert!(b.as_u64() < c.as_u64());
    }

    #[test]
    fn test_call_id_wire_round_trip() {
        let id = CallId::from_raw(42);
        let json = serde_json::to_value(id).expect("serialize");
        assert_eq!(json, serde_json::json!(42));
        let back: CallId = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, id);
    }

    #[test]
    fn test_message_ids_distinct() {
        let seq = MessageSequence::new();
        let a = seq.next();
        let b = seq.next();
        assert_ne!(a, b);
    }

    #[test]
    fn test_message_id_suffix_namespace() {
        let seq = MessageSequence::new();
        let a = seq.next().as_u64();
        let b = seq.next().as_u64();
        // Consecutive allocations within one millisecond differ in suffix.
        assert_ne!(a % 1000, b % 1000);
    }

    #[test]
    fn test_tab_id_display() {
        assert_eq!(TabId::new(7).to_string(), "7");
    }
}
