//! Client tunables.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use session_socket::ClientOptions;
//!
//! let options = ClientOptions::new()
//!     .with_command_timeout(Duration::from_secs(10))
//!     .with_event_buffer(256)
//!     .without_session_bridge();
//!
//! assert!(!options.bridge_session);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde_json::Value;

use crate::events::multiplexer::DEFAULT_SUBSCRIPTION_BUFFER;
use crate::transport::ConnectionSettings;
use crate::transport::ReconnectPolicy;
use crate::transport::connection::{DEFAULT_COMMAND_TIMEOUT, MAX_PENDING_REQUESTS, READY_TIMEOUT};
use crate::transport::controller::DEFAULT_EVENT_BUFFER;

// ============================================================================
// ClientOptions
// ============================================================================

/// Connection, reconnection and buffering options.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientOptions {
    /// Reconnection backoff.
    pub reconnect: ReconnectPolicy,

    /// How long a command waits for its ack.
    pub command_timeout: Duration,

    /// How long to wait for the socket to open and become ready.
    pub ready_timeout: Duration,

    /// Cap on in-flight commands per connection.
    pub max_pending: usize,

    /// Capacity of the shared event channel.
    pub event_buffer: usize,

    /// Undelivered events buffered per subscription.
    pub subscription_buffer: usize,

    /// Run the session bridge before the first connection.
    pub bridge_session: bool,

    /// JSON body for the init request. `None` sends a `GET`.
    pub init_body: Option<Value>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl ClientOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            reconnect: ReconnectPolicy::new(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            ready_timeout: READY_TIMEOUT,
            max_pending: MAX_PENDING_REQUESTS,
            event_buffer: DEFAULT_EVENT_BUFFER,
            subscription_buffer: DEFAULT_SUBSCRIPTION_BUFFER,
            bridge_session: true,
            init_body: None,
        }
    }

    /// Per-connection settings derived from these options.
    #[must_use]
    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            command_timeout: self.command_timeout,
            ready_timeout: self.ready_timeout,
            max_pending: self.max_pending,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ClientOptions {
    /// Sets the reconnection policy.
    #[inline]
    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Sets the command timeout.
    #[inline]
    #[must_use]
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Sets the ready timeout.
    #[inline]
    #[must_use]
    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    /// Sets the in-flight command cap.
    #[inline]
    #[must_use]
    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending;
        self
    }

    /// Sets the shared event channel capacity.
    #[inline]
    #[must_use]
    pub fn with_event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity;
        self
    }

    /// Sets the per-subscription buffer.
    #[inline]
    #[must_use]
    pub fn with_subscription_buffer(mut self, capacity: usize) -> Self {
        self.subscription_buffer = capacity;
        self
    }

    /// Skips the session bridge on start.
    #[inline]
    #[must_use]
    pub fn without_session_bridge(mut self) -> Self {
        self.bridge_session = false;
        self
    }

    /// Sends `body` with a `POST` to the init endpoint.
    #[inline]
    #[must_use]
    pub fn with_init_body(mut self, body: Value) -> Self {
        self.init_body = Some(body);
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ClientOptions {
    /// Rejects values the transport cannot work with.
    pub(crate) fn validate(&self) -> crate::Result<()> {
        let checks = [
            (self.command_timeout.is_zero(), "command_timeout must be positive"),
            (self.ready_timeout.is_zero(), "ready_timeout must be positive"),
            (self.max_pending == 0, "max_pending must be positive"),
            (self.event_buffer == 0, "event_buffer must be positive"),
            (self.subscription_buffer == 0, "subscription_buffer must be positive"),
            (
                self.reconnect.base_delay > self.reconnect.max_delay,
                "reconnect base_delay must not exceed max_delay",
            ),
        ];

        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, message)) => Err(crate::Error::config(*message)),
            None => Ok(()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
