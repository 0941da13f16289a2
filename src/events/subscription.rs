//! Per-caller event stream.
//!
//! Each [`Subscription`] owns a background task that follows the current
//! transport handle, issues `subscribe_<name>` on every live handle and
//! forwards matching payloads from that handle only. Dropping or cancelling the subscription
//! sends `unsubscribe_<name>` on the handle that accepted the subscribe.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::Stream;
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::identifiers::HandleId;
use crate::protocol::{subscribe_command, unsubscribe_command};
use crate::transport::{ChannelEvent, ConnectionController, TransportHandle};

use super::filter::extract_data;
use super::teardown::{TeardownSlot, UnsubscribeCall};

// ============================================================================
// SubscriptionRequest
// ============================================================================

/// What the caller asked for.
#[derive(Debug, Clone)]
pub(crate) struct SubscriptionRequest {
    pub(crate) name: String,
    pub(crate) arguments: Value,
    pub(crate) filter: String,
}

// ============================================================================
// Subscription
// ============================================================================

/// Stream of `data` objects for one named channel.
///
/// Implements [`Stream`]; the stream ends after [`cancel`](Self::cancel) or
/// when the client shuts down.
pub struct Subscription {
    name: String,
    receiver: mpsc::Receiver<Value>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Starts following `controller` for `request`.
    pub(crate) fn spawn(
        controller: Arc<ConnectionController>,
        request: SubscriptionRequest,
        buffer: usize,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        let cancel = CancellationToken::new();
        let name = request.name.clone();

        // Taken here so that no handle change between now and the first
        // poll of the task is missed.
        let (latest, events) = controller.subscribe();

        let task = tokio::spawn(run(
            controller,
            Arc::new(request),
            latest,
            events,
            sender,
            cancel.clone(),
        ));

        Self {
            name,
            receiver,
            cancel,
            task: Some(task),
        }
    }

    /// Channel name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Waits for the next matching event.
    ///
    /// Returns `None` once the subscription has ended.
    pub async fn next_event(&mut self) -> Option<Value> {
        self.receiver.recv().await
    }

    /// Ends the subscription and waits for the unsubscribe to finish.
    ///
    /// Bounded by the command timeout; unsubscribe failures are logged.
    pub async fn cancel(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Stream for Subscription {
    type Item = Value;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // The task finishes the teardown in the background.
        self.cancel.cancel();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("name", &self.name)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

// ============================================================================
// Task
// ============================================================================

/// Follows handle changes and forwards payloads until cancelled.
async fn run(
    controller: Arc<ConnectionController>,
    request: Arc<SubscriptionRequest>,
    latest: TransportHandle,
    mut events: broadcast::Receiver<ChannelEvent>,
    sender: mpsc::Sender<Value>,
    cancel: CancellationToken,
) {
    let slot = Arc::new(TeardownSlot::default());
    let mut attached = HandleId::EMPTY;

    attach(&slot, &request, &latest, &mut attached);

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => break,

            () = sender.closed() => break,

            event = events.recv() => match event {
                Ok(ChannelEvent::Handle(handle)) => {
                    attach(&slot, &request, &handle, &mut attached);
                }

                Ok(ChannelEvent::Payload { handle, payload }) => {
                    if handle != attached {
                        trace!(name = %request.name, handle = %handle, "Payload from non-current handle dropped");
                        continue;
                    }

                    let Some(data) = extract_data(&payload, &request.filter) else {
                        continue;
                    };

                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => break,
                        sent = sender.send(data) => {
                            if sent.is_err() {
                                break;
                            }
                        }
                    }
                }

                Err(RecvError::Lagged(skipped)) => {
                    warn!(name = %request.name, skipped, "Subscription lagged; payloads dropped");
                    let current = controller.current_handle();
                    attach(&slot, &request, &current, &mut attached);
                }

                Err(RecvError::Closed) => break,
            },
        }
    }

    trace!(name = %request.name, "Subscription ending");
    slot.close().await;
    debug!(name = %request.name, "Subscription closed");
}

/// Subscribes on `handle` if it is not the one already attached.
fn attach(
    slot: &Arc<TeardownSlot>,
    request: &Arc<SubscriptionRequest>,
    handle: &TransportHandle,
    attached: &mut HandleId,
) {
    if handle.id() == *attached && !handle.is_empty() {
        return;
    }
    *attached = handle.id();

    let Some(connection) = handle.connection().cloned() else {
        slot.clear();
        return;
    };

    let unsubscribe = UnsubscribeCall {
        connection: connection.clone(),
        command: unsubscribe_command(&request.name),
        arguments: request.arguments.clone(),
    };

    let Some((generation, cancel)) = slot.begin(unsubscribe.clone()) else {
        return;
    };

    let slot = Arc::clone(slot);
    let request = Arc::clone(request);

    tokio::spawn(async move {
        let command = subscribe_command(&request.name);

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            result = connection.command(&command, request.arguments.clone()) => result,
        };

        match result {
            Ok(_) => {
                debug!(command = %command, handle = %connection.id(), "Subscribed");
                if !slot.complete(generation) {
                    unsubscribe.dispatch();
                }
            }
            Err(e) => {
                warn!(command = %command, handle = %connection.id(), error = %e, "Subscribe failed");
                slot.abandon(generation);
            }
        }
    });
}
