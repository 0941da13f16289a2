//! Error types for the session socket client.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use session_socket::{Result, SocketClient};
//!
//! async fn example(client: &SocketClient) -> Result<()> {
//!     let reply = client.command("rooms_list", serde_json::json!({})).await?;
//!     println!("{reply}");
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`] |
//! | Protocol | [`Error::Protocol`], [`Error::CommandFailed`], [`Error::RequestTimeout`] |
//! | Session | [`Error::SessionBridge`], [`Error::MissingCookie`] |
//! | Lifecycle | [`Error::Cancelled`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`], [`Error::Http`], [`Error::Url`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::AckId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when client configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Transport failure.
    ///
    /// Returned when the socket cannot be opened or drops abnormally.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Timed out waiting for the server to become ready.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Connection closed while an operation was in flight.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Protocol violation or unexpected frame.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// A command never received its correlated response.
    ///
    /// Surfaced only to the caller of that command.
    #[error("Command {command} failed: {reason}")]
    CommandFailed {
        /// Command name as sent on the wire.
        command: String,
        /// Why the command failed.
        reason: String,
    },

    /// Command response did not arrive in time.
    #[error("Request {ack_id} timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// The ack id that timed out.
        ack_id: AckId,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // Session Errors
    // ========================================================================
    /// Session bridge failure with context.
    #[error("Session bridge failed: {message}")]
    SessionBridge {
        /// Description of the failure.
        message: String,
    },

    /// Expected session cookie was absent from both response and store.
    #[error("Session cookie not found: {name}")]
    MissingCookie {
        /// Name of the missing cookie.
        name: String,
    },

    // ========================================================================
    // Lifecycle Errors
    // ========================================================================
    /// Operation stopped by caller cancellation.
    #[error("Cancelled")]
    Cancelled,

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

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parse error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Channel receive error.
    #[error("Channel closed")]
    ChannelClosed(#[from] RecvError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a command failed error.
    #[inline]
    pub fn command_failed(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CommandFailed {
            command: command.into(),
            reason: reason.into(),
        }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(ack_id: AckId, timeout_ms: u64) -> Self {
        Self::RequestTimeout { ack_id, timeout_ms }
    }

    /// Creates a session bridge error.
    #[inline]
    pub fn session_bridge(message: impl Into<String>) -> Self {
        Self::SessionBridge {
            message: message.into(),
        }
    }

    /// Creates a missing cookie error.
    #[inline]
    pub fn missing_cookie(name: impl Into<String>) -> Self {
        Self::MissingCookie { name: name.into() }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. } | Self::RequestTimeout { .. }
        )
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::WebSocket(_)
                | Self::Io(_)
        )
    }

    /// Returns `true` if the reconnect loop should try again after this error.
    ///
    /// Transport I/O failures, abnormal closes and timeouts are retryable.
    /// Cancellation and configuration errors are not.
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Cancelled | Self::Config { .. } | Self::Url(_) => false,
            Self::Http(e) => e.is_connect() || e.is_timeout(),
            other => {
                other.is_connection_error()
                    || other.is_timeout()
                    || matches!(other, Self::Protocol { .. })
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
