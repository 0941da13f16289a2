//! Single source of truth for "the current connection".
//!
//! The controller holds the current [`TransportHandle`] and a broadcast
//! channel carrying both handle changes and inbound payloads. Handle changes
//! are published while the slot lock is held and [`subscribe`] reads the
//! slot under the same lock, so a new subscriber sees the latest handle and
//! then every later change, with no gap and no duplicate.
//!
//! [`subscribe`]: ConnectionController::subscribe

// ============================================================================
// Imports
// ============================================================================

use std::mem;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::identifiers::HandleId;

use super::handle::TransportHandle;

// ============================================================================
// Constants
// ============================================================================

/// Default capacity of the event channel.
pub const DEFAULT_EVENT_BUFFER: usize = 1024;

// ============================================================================
// ChannelEvent
// ============================================================================

/// Item carried on the controller's broadcast channel.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// The current handle changed.
    Handle(TransportHandle),
    /// A decoded payload arrived on the connection `handle`.
    ///
    /// Every connection publishes here, installed or not; observers compare
    /// `handle` with the handle they follow.
    Payload {
        /// Connection the frame arrived on.
        handle: HandleId,
        /// Decoded payload.
        payload: Arc<str>,
    },
}

// ============================================================================
// ConnectionController
// ============================================================================

/// Publishes the current transport handle to any number of observers.
pub struct ConnectionController {
    /// Current handle. Empty until the first connection is installed.
    current: Mutex<TransportHandle>,
    /// Handle changes and payloads.
    events: broadcast::Sender<ChannelEvent>,
}

impl Default for ConnectionController {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER)
    }
}

impl ConnectionController {
    /// Creates a controller holding the empty handle.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            current: Mutex::new(TransportHandle::Empty),
            events,
        }
    }

    /// Returns the current handle.
    #[inline]
    #[must_use]
    pub fn current_handle(&self) -> TransportHandle {
        self.current.lock().clone()
    }

    /// Returns `true` while a live handle is installed.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        !self.current.lock().is_empty()
    }

    /// Returns the latest handle and a receiver for everything after it.
    #[must_use]
    pub fn subscribe(&self) -> (TransportHandle, broadcast::Receiver<ChannelEvent>) {
        let current = self.current.lock();
        (current.clone(), self.events.subscribe())
    }

    /// Sender that connections publish their payloads into.
    pub(crate) fn publisher(&self) -> broadcast::Sender<ChannelEvent> {
        self.events.clone()
    }

    /// Installs `new` unconditionally.
    ///
    /// Returns `false` without doing anything if `new` is already current.
    /// Otherwise the previous handle is disposed after the swap.
    pub fn replace_with(&self, new: TransportHandle) -> bool {
        let previous = {
            let mut current = self.current.lock();
            if current.id() == new.id() {
                return false;
            }
            let previous = mem::replace(&mut *current, new.clone());
            let _ = self.events.send(ChannelEvent::Handle(new));
            previous
        };

        debug!(previous = %previous.id(), "Transport handle replaced");
        previous.dispose();
        true
    }

    /// Installs `new` only if the current handle is still `expected`.
    ///
    /// On success the replaced handle is disposed. On failure `new` is
    /// disposed without ever being published and the winning handle is
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns the current handle when it is not `expected`.
    pub fn compare_and_replace(
        &self,
        expected: HandleId,
        new: TransportHandle,
    ) -> std::result::Result<(), TransportHandle> {
        let previous = {
            let mut current = self.current.lock();
            if current.id() == new.id() {
                return Ok(());
            }
            if current.id() != expected {
                let winner = current.clone();
                drop(current);
                trace!(expected = %expected, winner = %winner.id(), loser = %new.id(), "Lost handle race");
                new.dispose();
                return Err(winner);
            }
            let previous = mem::replace(&mut *current, new.clone());
            let _ = self.events.send(ChannelEvent::Handle(new));
            previous
        };

        debug!(previous = %previous.id(), "Transport handle swapped");
        previous.dispose();
        Ok(())
    }

    /// Drops back to the empty handle, disposing the current one.
    pub fn reset(&self) -> bool {
        self.replace_with(TransportHandle::Empty)
    }

    /// Sends a command over the current connection.
    ///
    /// # Errors
    ///
    /// - [`Error::CommandFailed`] if no connection is installed or it fails
    /// - [`Error::RequestTimeout`] if the ack does not arrive in time
    pub async fn command(&self, name: &str, body: Value) -> Result<Value> {
        match self.current_handle() {
            TransportHandle::Live(connection) => connection.command(name, body).await,
            TransportHandle::Empty => Err(Error::command_failed(name, "not connected")),
        }
    }
}

impl std::fmt::Debug for ConnectionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionController")
            .field("current", &self.current_handle().id())
            .field("receivers", &self.events.receiver_count())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
