//! Fan-out of decoded payloads to named subscriptions.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use futures_util::Stream;
use futures_util::stream;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use crate::transport::{ChannelEvent, ConnectionController};

use super::subscription::{Subscription, SubscriptionRequest};

// ============================================================================
// Constants
// ============================================================================

/// Default number of undelivered events buffered per subscription.
pub const DEFAULT_SUBSCRIPTION_BUFFER: usize = 64;

// ============================================================================
// EventMultiplexer
// ============================================================================

/// Creates event subscriptions over the current connection.
///
/// Subscriptions are independent: two callers asking for the same channel
/// each send their own subscribe and unsubscribe.
#[derive(Debug, Clone)]
pub struct EventMultiplexer {
    controller: Arc<ConnectionController>,
    buffer: usize,
}

impl EventMultiplexer {
    /// Creates a multiplexer over `controller`.
    #[must_use]
    pub fn new(controller: Arc<ConnectionController>) -> Self {
        Self {
            controller,
            buffer: DEFAULT_SUBSCRIPTION_BUFFER,
        }
    }

    /// Sets the per-subscription buffer.
    #[must_use]
    pub fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer;
        self
    }

    /// Subscribes to the channel `name`.
    ///
    /// `arguments` is sent with both the subscribe and the unsubscribe
    /// command. Only payloads containing `filter` are considered.
    #[must_use]
    pub fn events(
        &self,
        name: impl Into<String>,
        arguments: Value,
        filter: impl Into<String>,
    ) -> Subscription {
        let request = SubscriptionRequest {
            name: name.into(),
            arguments,
            filter: filter.into(),
        };

        Subscription::spawn(Arc::clone(&self.controller), request, self.buffer)
    }

    /// Returns `true` while a live handle is installed.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.controller.is_connected()
    }

    /// Stream of connectivity changes.
    ///
    /// Yields the current state first, then every change. Consecutive
    /// duplicates are suppressed.
    pub fn connectivity(&self) -> impl Stream<Item = bool> + Send + 'static {
        let (latest, receiver) = self.controller.subscribe();

        let state = Connectivity {
            controller: Arc::clone(&self.controller),
            receiver,
            pending: Some(!latest.is_empty()),
            last: None,
        };

        stream::unfold(state, |mut state| async move {
            loop {
                let connected = match state.pending.take() {
                    Some(connected) => connected,
                    None => match state.receiver.recv().await {
                        Ok(ChannelEvent::Handle(handle)) => !handle.is_empty(),
                        Ok(ChannelEvent::Payload { .. }) => continue,
                        Err(RecvError::Lagged(_)) => state.controller.is_connected(),
                        Err(RecvError::Closed) => return None,
                    },
                };

                if state.last == Some(connected) {
                    continue;
                }
                state.last = Some(connected);
                return Some((connected, state));
            }
        })
    }

    /// Controller this multiplexer observes.
    #[inline]
    #[must_use]
    pub fn controller(&self) -> &Arc<ConnectionController> {
        &self.controller
    }
}

/// State of a connectivity stream.
struct Connectivity {
    controller: Arc<ConnectionController>,
    receiver: broadcast::Receiver<ChannelEvent>,
    pending: Option<bool>,
    last: Option<bool>,
}

// ============================================================================
// Tests
// ============================================================================
