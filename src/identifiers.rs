//! Type-safe identifiers.
//!
//! Newtype wrappers prevent mixing incompatible IDs at compile time.
//!
//! | Type | Scope |
//! |------|-------|
//! | [`HandleId`] | One physical connection attempt (process-unique) |
//! | [`AckId`] | Command/ack correlation within one connection |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

// ============================================================================
// HandleId
// ============================================================================

/// Counter for handle IDs. Zero is reserved for the empty handle.
static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one transport handle.
///
/// The empty handle always has [`HandleId::EMPTY`]; every live connection
/// gets a fresh, never reused value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(u64);

impl HandleId {
    /// Identity of the "no connection" sentinel.
    pub const EMPTY: Self = Self(0);

    /// Allocates the next process-unique handle ID.
    #[inline]
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns `true` for the empty sentinel.
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            f.write_str("empty")
        } else {
            write!(f, "#{}", self.0)
        }
    }
}

// ============================================================================
// AckId
// ============================================================================

/// Socket.IO acknowledgement id, the digits between the packet type and
/// the JSON body in `42<id>[...]` / `43<id>[...]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AckId(u64);

impl AckId {
    /// Creates an ack ID from a raw value.
    #[inline]
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for AckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-connection ack id allocator.
#[derive(Debug, Default)]
pub(crate) struct AckCounter(AtomicU64);

impl AckCounter {
    /// Returns the next ack ID for this connection.
    #[inline]
    pub(crate) fn next(&self) -> AckId {
        AckId(self.0.fetch_add(1, Ordering::Relaxed))
    }
}

// ============================================================================
// Tests
// ============================================================================
