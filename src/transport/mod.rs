//! WebSocket transport layer.
//!
//! This module owns the physical socket and publishes "the current
//! connection" to the rest of the crate.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  connect   ┌──────────────┐   install   ┌──────────────────────┐
//! │  Supervisor  │───────────►│  Connection  │────────────►│ ConnectionController │
//! │  (backoff)   │◄───────────│  event loop  │  payloads   │  current handle +    │
//! └──────────────┘   closed   └──────────────┘────────────►│  broadcast channel   │
//!                                                          └──────────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `Connector::connect` - Open the socket with the session cookies
//! 2. `Connection::wait_ready` - Wait for the readiness token
//! 3. `ConnectionController::compare_and_replace` - Install the handle
//! 4. `Connection::closed` - Socket gone, controller drops to empty
//! 5. `Backoff::next_delay` - Wait, then start over
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | WebSocket connection and event loop |
//! | `controller` | Current handle and event broadcast |
//! | `handle` | Transport handle and lifecycle state |
//! | `reconnect` | Backoff policy |
//! | `supervisor` | Reconnect loop |

// ============================================================================
// Submodules
// ============================================================================

/// WebSocket connection and event loop.
pub mod connection;

/// Current handle and event broadcast.
pub mod controller;

/// Transport handle and lifecycle state.
pub mod handle;

/// Backoff policy.
pub mod reconnect;

/// Reconnect loop.
pub mod supervisor;

#[cfg(test)]
pub(crate) mod testing;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{Connection, ConnectionSettings};
pub use controller::{ChannelEvent, ConnectionController};
pub use handle::{HandleState, TransportHandle};
pub use reconnect::{Backoff, ReconnectPolicy};
pub use supervisor::{Connector, SocketConnector, Supervisor};
