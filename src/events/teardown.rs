//! Swappable teardown for one subscription.
//!
//! Holds whatever must run when the subscription moves to another handle
//! or ends: either an in-flight subscribe to cancel, or an unsubscribe to
//! send. Installing a new teardown runs the old one.

// ============================================================================
// Imports
// ============================================================================

use parking_lot::Mutex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::transport::Connection;

// ============================================================================
// UnsubscribeCall
// ============================================================================

/// An unsubscribe command bound to the connection that accepted the subscribe.
#[derive(Debug, Clone)]
pub(crate) struct UnsubscribeCall {
    pub(crate) connection: Connection,
    pub(crate) command: String,
    pub(crate) arguments: Value,
}

impl UnsubscribeCall {
    /// Sends the unsubscribe. Never fails; problems are logged.
    pub(crate) async fn run(self) {
        if !self.connection.is_open() {
            trace!(command = %self.command, handle = %self.connection.id(), "Skipping unsubscribe on closed handle");
            return;
        }

        match self.connection.command(&self.command, self.arguments).await {
            Ok(_) => debug!(command = %self.command, "Unsubscribed"),
            Err(e) => warn!(command = %self.command, error = %e, "Unsubscribe failed"),
        }
    }

    /// Runs the unsubscribe on a background task.
    pub(crate) fn dispatch(self) {
        tokio::spawn(self.run());
    }
}

// ============================================================================
// Teardown
// ============================================================================

#[derive(Debug, Default)]
enum Teardown {
    /// Nothing to undo.
    #[default]
    Idle,
    /// Subscribe in flight on `unsubscribe.connection`.
    Pending {
        generation: u64,
        cancel: CancellationToken,
        unsubscribe: UnsubscribeCall,
    },
    /// Subscribe acknowledged.
    Armed(UnsubscribeCall),
}

#[derive(Debug, Default)]
struct SlotState {
    generation: u64,
    current: Teardown,
    closed: bool,
}

// ============================================================================
// TeardownSlot
// ============================================================================

/// Teardown cell shared between a subscription and its subscribe tasks.
#[derive(Debug, Default)]
pub(crate) struct TeardownSlot {
    state: Mutex<SlotState>,
}

impl TeardownSlot {
    /// Marks a subscribe as in flight and returns its generation and
    /// cancellation token. The previous teardown is run.
    ///
    /// Returns `None` once the slot is closed.
    pub(crate) fn begin(&self, unsubscribe: UnsubscribeCall) -> Option<(u64, CancellationToken)> {
        let mut state = self.state.lock();
        if state.closed {
            return None;
        }

        state.generation += 1;
        let generation = state.generation;
        let cancel = CancellationToken::new();

        let previous = std::mem::replace(
            &mut state.current,
            Teardown::Pending {
                generation,
                cancel: cancel.clone(),
                unsubscribe,
            },
        );
        drop(state);

        Self::run_detached(previous);
        Some((generation, cancel))
    }

    /// Records that the subscribe of `generation` was acknowledged.
    ///
    /// Returns `false` if the slot moved on to another handle in the
    /// meantime; the caller then owns the unsubscribe for this generation.
    pub(crate) fn complete(&self, generation: u64) -> bool {
        let mut state = self.state.lock();

        match &state.current {
            Teardown::Pending {
                generation: current,
                ..
            } if *current == generation => {}
            _ => return state.closed,
        }

        if let Teardown::Pending { unsubscribe, .. } = std::mem::take(&mut state.current) {
            state.current = Teardown::Armed(unsubscribe);
        }
        true
    }

    /// Forgets the subscribe of `generation` after it failed.
    pub(crate) fn abandon(&self, generation: u64) {
        let mut state = self.state.lock();
        if matches!(&state.current, Teardown::Pending { generation: current, .. } if *current == generation)
        {
            state.current = Teardown::Idle;
        }
    }

    /// Clears the slot because no handle is available.
    pub(crate) fn clear(&self) {
        let previous = std::mem::take(&mut self.state.lock().current);
        Self::run_detached(previous);
    }

    /// Closes the slot and waits for the final unsubscribe.
    pub(crate) async fn close(&self) {
        let previous = {
            let mut state = self.state.lock();
            state.closed = true;
            std::mem::take(&mut state.current)
        };

        match previous {
            Teardown::Idle => {}
            Teardown::Pending {
                cancel,
                unsubscribe,
                ..
            } => {
                // The subscribe may already be on the wire.
                cancel.cancel();
                unsubscribe.run().await;
            }
            Teardown::Armed(unsubscribe) => unsubscribe.run().await,
        }
    }

    /// Returns `true` while a subscribe is in flight or acknowledged.
    #[cfg(test)]
    pub(crate) fn is_active(&self) -> bool {
        !matches!(self.state.lock().current, Teardown::Idle)
    }

    fn run_detached(teardown: Teardown) {
        match teardown {
            Teardown::Idle => {}
            Teardown::Pending { cancel, .. } => cancel.cancel(),
            Teardown::Armed(unsubscribe) => unsubscribe.dispatch(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
