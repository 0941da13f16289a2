//! Engine.IO v3 / Socket.IO wire protocol.
//!
//! This module defines the frame format spoken over the socket.
//!
//! # Protocol Overview
//!
//! | Message | Direction | Purpose |
//! |---------|-----------|---------|
//! | open `0{..}` | Remote → Local | Session id and heartbeat timing |
//! | ping/pong `2`/`3` | Both | Heartbeat |
//! | event `42[..]` | Remote → Local | Subscription payloads |
//! | command `42<ack>[..]` | Local → Remote | Request with ack id |
//! | ack `43<ack>[..]` | Remote → Local | Command response |
//!
//! # Command Naming
//!
//! Subscriptions use `subscribe_<name>` and `unsubscribe_<name>`.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `frame` | Packet types and the pure frame decoder |
//! | `packet` | Handshake, command and ack packets |

// ============================================================================
// Submodules
// ============================================================================

/// Packet types and the pure frame decoder.
pub mod frame;

/// Handshake, command and ack packets.
pub mod packet;

// ============================================================================
// Command Naming
// ============================================================================

/// Prefix of the command that starts a subscription.
pub const SUBSCRIBE_PREFIX: &str = "subscribe_";

/// Returns the subscribe command name for an event channel.
#[inline]
#[must_use]
pub fn subscribe_command(name: &str) -> String {
    format!("{SUBSCRIBE_PREFIX}{name}")
}

/// Returns the unsubscribe command name for an event channel.
#[inline]
#[must_use]
pub fn unsubscribe_command(name: &str) -> String {
    format!("un{}", subscribe_command(name))
}

// ============================================================================
// Re-exports
// ============================================================================

pub use frame::{EnginePacket, HANDSHAKE_TOKEN, SocketPacket, classify, decode, is_handshake};
pub use packet::{AckPacket, CommandPacket, OpenHandshake, PING_FRAME, PONG_FRAME};

// ============================================================================
// Tests
// ============================================================================
