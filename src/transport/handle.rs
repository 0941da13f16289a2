//! Transport handle: the value published by the connection controller.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use crate::identifiers::HandleId;

use super::connection::Connection;

// ============================================================================
// HandleState
// ============================================================================

/// Lifecycle of one connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleState {
    /// Socket open, readiness token not yet received.
    Connecting,
    /// Readiness token received.
    Open,
    /// Closed or disposed. Terminal.
    Closed,
}

impl fmt::Display for HandleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

// ============================================================================
// TransportHandle
// ============================================================================

/// Either "no connection" or one live connection.
///
/// Two handles are equal when they have the same [`HandleId`].
#[derive(Clone, Default)]
pub enum TransportHandle {
    /// No usable connection.
    #[default]
    Empty,
    /// A connection that reached the open state.
    Live(Connection),
}

impl TransportHandle {
    /// Returns the handle identity.
    #[inline]
    #[must_use]
    pub fn id(&self) -> HandleId {
        match self {
            Self::Empty => HandleId::EMPTY,
            Self::Live(connection) => connection.id(),
        }
    }

    /// Returns `true` for the empty sentinel.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Returns the live connection, if any.
    #[inline]
    #[must_use]
    pub fn connection(&self) -> Option<&Connection> {
        match self {
            Self::Empty => None,
            Self::Live(connection) => Some(connection),
        }
    }

    /// Returns the lifecycle state. The empty handle reports `Closed`.
    #[must_use]
    pub fn state(&self) -> HandleState {
        match self {
            Self::Empty => HandleState::Closed,
            Self::Live(connection) => connection.state(),
        }
    }

    /// Releases the underlying socket. No-op for the empty handle.
    pub(crate) fn dispose(&self) {
        if let Self::Live(connection) = self {
            connection.shutdown();
        }
    }
}

impl PartialEq for TransportHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for TransportHandle {}

impl From<Connection> for TransportHandle {
    fn from(connection: Connection) -> Self {
        Self::Live(connection)
    }
}

impl fmt::Debug for TransportHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("TransportHandle::Empty"),
            Self::Live(connection) => f
                .debug_tuple("TransportHandle::Live")
                .field(connection)
                .finish(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
