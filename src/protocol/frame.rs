//! Frame decoding for the two-layer Engine.IO / Socket.IO framing.
//!
//! Every text frame starts with an engine packet type. Engine `message`
//! frames carry a second character with the socket packet type:
//!
//! | Char | Engine | Socket (after engine `4`) |
//! |------|--------|---------------------------|
//! | `0` | open | connect |
//! | `1` | close | disconnect |
//! | `2` | ping | event |
//! | `3` | pong | ack |
//! | `4` | message | error |
//! | `5` | upgrade | |
//! | `6` | noop | |
//!
//! [`decode`] is total: unknown or truncated input decodes to `None`
//! instead of failing.

// ============================================================================
// Constants
// ============================================================================

/// Frame the server emits once the channel is usable.
pub const HANDSHAKE_TOKEN: &str = r#"42["channel_inited",null]"#;

// ============================================================================
// EnginePacket
// ============================================================================

/// Transport-layer packet type (first character of a frame).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnginePacket {
    /// `0` - session open, carries the handshake JSON.
    Open,
    /// `1` - transport close.
    Close,
    /// `2` - heartbeat ping.
    Ping,
    /// `3` - heartbeat pong.
    Pong,
    /// `4` - application message, followed by a [`SocketPacket`].
    Message,
    /// `5` - transport upgrade.
    Upgrade,
    /// `6` - noop.
    Noop,
}

impl EnginePacket {
    /// Maps a wire byte to a packet type.
    #[inline]
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'0' => Some(Self::Open),
            b'1' => Some(Self::Close),
            b'2' => Some(Self::Ping),
            b'3' => Some(Self::Pong),
            b'4' => Some(Self::Message),
            b'5' => Some(Self::Upgrade),
            b'6' => Some(Self::Noop),
            _ => None,
        }
    }

    /// Returns the wire character.
    #[inline]
    #[must_use]
    pub const fn as_char(self) -> char {
        match self {
            Self::Open => '0',
            Self::Close => '1',
            Self::Ping => '2',
            Self::Pong => '3',
            Self::Message => '4',
            Self::Upgrade => '5',
            Self::Noop => '6',
        }
    }
}

// ============================================================================
// SocketPacket
// ============================================================================

/// Application-layer packet type (second character of a message frame).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketPacket {
    /// `0` - namespace connect.
    Connect,
    /// `1` - namespace disconnect.
    Disconnect,
    /// `2` - event.
    Event,
    /// `3` - acknowledgement of a command.
    Ack,
    /// `4` - error.
    Error,
}

impl SocketPacket {
    /// Maps a wire byte to a packet type.
    #[inline]
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'0' => Some(Self::Connect),
            b'1' => Some(Self::Disconnect),
            b'2' => Some(Self::Event),
            b'3' => Some(Self::Ack),
            b'4' => Some(Self::Error),
            _ => None,
        }
    }

    /// Returns the wire character.
    #[inline]
    #[must_use]
    pub const fn as_char(self) -> char {
        match self {
            Self::Connect => '0',
            Self::Disconnect => '1',
            Self::Event => '2',
            Self::Ack => '3',
            Self::Error => '4',
        }
    }
}

// ============================================================================
// Classification
// ============================================================================

/// Returns the packet types of a frame.
///
/// The socket type is only present for engine `message` frames that have
/// a recognised second character.
#[must_use]
pub fn classify(raw: &str) -> Option<(EnginePacket, Option<SocketPacket>)> {
    let bytes = raw.as_bytes();
    let engine = EnginePacket::from_byte(*bytes.first()?)?;

    let socket = match engine {
        EnginePacket::Message => bytes.get(1).copied().and_then(SocketPacket::from_byte),
        _ => None,
    };

    Some((engine, socket))
}

// ============================================================================
// Decoding
// ============================================================================

/// Reduces a raw frame to the application payload it carries.
///
/// - `4` + `2` (event): the frame from offset 2, the `[name, body]` envelope
/// - `4` + `0` (connect): the whole frame, used as a handshake marker
/// - anything else: `None`
#[must_use]
pub fn decode(raw: &str) -> Option<&str> {
    match classify(raw)? {
        (EnginePacket::Message, Some(SocketPacket::Event)) => Some(&raw[2..]),
        (EnginePacket::Message, Some(SocketPacket::Connect)) => Some(raw),
        _ => None,
    }
}

/// Returns `true` when the frame is the channel readiness token.
#[inline]
#[must_use]
pub fn is_handshake(raw: &str) -> bool {
    raw == HANDSHAKE_TOKEN
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    #[test]
    fn test_engine_control_frames_decode_to_none() {
        for raw in ["0{\"sid\":\"abc\"}", "1", "2", "3", "3pong", "5", "6"] {
            assert_eq!(decode(raw), None, "frame {raw:?}");
        }
    }

    #[test]
    fn test_ping_decodes_to_none() {
        assert_eq!(decode("2"), None);
    }

    #[test]
    fn test_event_payload_starts_at_offset_two() {
        assert_eq!(
            decode(r#"42["foo",{"data":{}}]"#),
            Some(r#"["foo",{"data":{}}]"#)
        );
    }

    #[test]
    fn test_socket_connect_returns_whole_frame() {
        assert_eq!(decode("40"), Some("40"));
        assert_eq!(decode("40/chat,"), Some("40/chat,"));
    }

    #[test]
    fn test_socket_noise_decodes_to_none() {
        for raw in ["41", "43[1]", "431[\"ok\"]", "44\"boom\"", "49", "4", "4x"] {
            assert_eq!(decode(raw), None, "frame {raw:?}");
        }
    }

    #[test]
    fn test_unknown_and_empty_frames_decode_to_none() {
        assert_eq!(decode(""), None);
        assert_eq!(decode("7"), None);
        assert_eq!(decode("x42[]"), None);
        assert_eq!(decode("é2"), None);
        assert_eq!(decode("4é"), None);
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify("2"), Some((EnginePacket::Ping, None)));
        assert_eq!(
            classify("43[]"),
            Some((EnginePacket::Message, Some(SocketPacket::Ack)))
        );
        assert_eq!(classify("4"), Some((EnginePacket::Message, None)));
        assert_eq!(classify("9"), None);
    }

    #[test]
    fn test_packet_chars_round_trip() {
        for byte in b'0'..=b'6' {
            let packet = EnginePacket::from_byte(byte).expect("engine packet");
            assert_eq!(packet.as_char() as u8, byte);
        }
        for byte in b'0'..=b'4' {
            let packet = SocketPacket::from_byte(byte).expect("socket packet");
            assert_eq!(packet.as_char() as u8, byte);
        }
    }

    #[test]
    fn test_handshake_predicate() {
        assert!(is_handshake(r#"42["channel_inited",null]"#));
        assert!(!is_handshake(r#"42["channel_inited",{}]"#));
        assert!(!is_handshake(r#"42["message",null]"#));
        assert!(!is_handshake("40"));
    }

    proptest! {
        #[test]
        fn prop_decode_is_total_and_deterministic(raw in ".*") {
            let first = decode(&raw);
            let second = decode(&raw);
            prop_assert_eq!(first, second);
        }

        #[test]
        fn prop_decode_depends_only_on_type_prefix(tail in ".*") {
            let event = format!("42{tail}");
            prop_assert_eq!(decode(&event), Some(tail.as_str()));

            for prefix in ["0", "1", "2", "3", "5", "6", "41", "43", "44"] {
                let frame = format!("{prefix}{tail}");
                prop_assert_eq!(decode(&frame), None);
            }
        }
    }
}
