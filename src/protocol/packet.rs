//! Outgoing packets and the structured frames the connection consumes.
//!
//! # Format
//!
//! | Packet | Direction | Wire |
//! |--------|-----------|------|
//! | [`OpenHandshake`] | Server → Client | `0{"sid":"..","pingInterval":25000,"pingTimeout":5000}` |
//! | [`CommandPacket`] | Client → Server | `42<ack>["name",{..}]` |
//! | [`AckPacket`] | Server → Client | `43<ack>[{..}]` |
//! | heartbeat | both | `2` / `3` |

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::AckId;

use super::frame::{EnginePacket, SocketPacket, classify};

// ============================================================================
// Constants
// ============================================================================

/// Client heartbeat frame.
pub const PING_FRAME: &str = "2";

/// Heartbeat reply frame.
pub const PONG_FRAME: &str = "3";

// ============================================================================
// OpenHandshake
// ============================================================================

/// Session parameters sent by the server in the engine `open` packet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OpenHandshake {
    /// Engine session id.
    pub sid: String,

    /// Transports the server offers to upgrade to.
    #[serde(default)]
    pub upgrades: Vec<String>,

    /// Heartbeat interval in milliseconds.
    #[serde(rename = "pingInterval")]
    pub ping_interval_ms: u64,

    /// Time to wait for a pong in milliseconds.
    #[serde(rename = "pingTimeout")]
    pub ping_timeout_ms: u64,
}

impl OpenHandshake {
    /// Parses an engine `open` frame.
    ///
    /// # Errors
    ///
    /// - [`Error::Protocol`] if the frame is not an open packet
    /// - [`Error::Json`] if the handshake body is malformed
    pub fn parse(raw: &str) -> Result<Self> {
        match classify(raw) {
            Some((EnginePacket::Open, _)) => Ok(serde_json::from_str(&raw[1..])?),
            _ => Err(Error::protocol(format!("Expected open packet, got {raw:?}"))),
        }
    }

    /// Returns the heartbeat interval.
    #[inline]
    #[must_use]
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    /// Returns how long the server may stay silent after our ping
    /// before the transport is considered dead.
    #[inline]
    #[must_use]
    pub fn heartbeat_deadline(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms.saturating_add(self.ping_timeout_ms))
    }
}

// ============================================================================
// CommandPacket
// ============================================================================

/// A named request sent as a Socket.IO event with an ack id.
#[derive(Debug, Clone)]
pub struct CommandPacket {
    /// Correlates the server's ack with this command.
    pub ack_id: AckId,

    /// Event name, e.g. `subscribe_chat`.
    pub name: String,

    /// JSON body sent as the single event argument.
    pub body: Value,
}

impl CommandPacket {
    /// Creates a new command packet.
    #[inline]
    #[must_use]
    pub fn new(ack_id: AckId, name: impl Into<String>, body: Value) -> Self {
        Self {
            ack_id,
            name: name.into(),
            body,
        }
    }

    /// Serializes the packet to its wire form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the body cannot be serialized.
    pub fn encode(&self) -> Result<String> {
        let envelope = serde_json::to_string(&(&self.name, &self.body))?;
        Ok(format!(
            "{}{}{}{}",
            EnginePacket::Message.as_char(),
            SocketPacket::Event.as_char(),
            self.ack_id,
            envelope
        ))
    }
}

// ============================================================================
// AckPacket
// ============================================================================

/// Server acknowledgement of a [`CommandPacket`].
#[derive(Debug, Clone, PartialEq)]
pub struct AckPacket {
    /// Ack id copied from the command.
    pub ack_id: AckId,

    /// Arguments the server passed to the ack callback.
    pub args: Vec<Value>,
}

impl AckPacket {
    /// Parses a `43<ack>[...]` frame, optionally namespaced (`43/ns,<ack>[...]`).
    ///
    /// Returns `None` for anything that is not a well-formed ack.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        if classify(raw)? != (EnginePacket::Message, Some(SocketPacket::Ack)) {
            return None;
        }

        let mut rest = &raw[2..];
        if rest.starts_with('/') {
            rest = &rest[rest.find(',')? + 1..];
        }

        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 {
            return None;
        }

        let ack_id = AckId::new(rest[..digits].parse().ok()?);
        let args = match &rest[digits..] {
            "" => Vec::new(),
            body => serde_json::from_str::<Vec<Value>>(body).ok()?,
        };

        Some(Self { ack_id, args })
    }

    /// Collapses the ack arguments into one response value.
    ///
    /// No arguments yield `null`, a single argument is returned as is,
    /// and several arguments are returned as an array.
    #[must_use]
    pub fn into_value(mut self) -> Value {
        match self.args.len() {
            0 => Value::Null,
            1 => self.args.pop().unwrap_or(Value::Null),
            _ => Value::Array(self.args),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
