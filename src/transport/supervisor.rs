//! Connection supervisor: keeps the controller populated with a live handle.
//!
//! Each cycle loads the socket cookies, opens a connection, waits for the
//! readiness token and installs the handle. When the connection closes the
//! controller drops back to empty and the supervisor retries after a backoff
//! delay. Cancellation stops the loop and leaves the controller empty.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::session::CookieStore;

use super::connection::{Connection, ConnectionSettings};
use super::controller::{ChannelEvent, ConnectionController};
use super::handle::TransportHandle;
use super::reconnect::ReconnectPolicy;

// ============================================================================
// Connector
// ============================================================================

/// Opens one physical connection.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens a socket that publishes its payloads into `publisher`.
    ///
    /// The returned connection may still be waiting for its readiness token.
    async fn connect(&self, publisher: broadcast::Sender<ChannelEvent>) -> Result<Connection>;
}

/// Connects to the socket URL with cookies from a [`CookieStore`].
pub struct SocketConnector {
    url: Url,
    store: Arc<dyn CookieStore>,
    settings: ConnectionSettings,
}

impl SocketConnector {
    /// Creates a connector for `url`.
    #[must_use]
    pub fn new(url: Url, store: Arc<dyn CookieStore>, settings: ConnectionSettings) -> Self {
        Self {
            url,
            store,
            settings,
        }
    }
}

#[async_trait]
impl Connector for SocketConnector {
    async fn connect(&self, publisher: broadcast::Sender<ChannelEvent>) -> Result<Connection> {
        let cookies = self.store.load(&self.url).await?;
        debug!(url = %self.url, cookies = cookies.len(), "Opening socket");
        Connection::connect(&self.url, &cookies, self.settings, publisher).await
    }
}

// ============================================================================
// Supervisor
// ============================================================================

/// Reconnect loop around a [`Connector`].
pub struct Supervisor {
    controller: Arc<ConnectionController>,
    connector: Arc<dyn Connector>,
    policy: ReconnectPolicy,
}

impl Supervisor {
    /// Creates a supervisor.
    #[must_use]
    pub fn new(
        controller: Arc<ConnectionController>,
        connector: Arc<dyn Connector>,
        policy: ReconnectPolicy,
    ) -> Self {
        Self {
            controller,
            connector,
            policy,
        }
    }

    /// Runs until cancelled or until a non-retryable failure.
    ///
    /// The controller is empty when this returns.
    ///
    /// # Errors
    ///
    /// - The connect error if it is not retryable
    /// - [`Error::Connection`] once `max_attempts` consecutive attempts failed
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let result = self.supervise(&cancel).await;
        self.controller.reset();

        match &result {
            Ok(()) => debug!("Supervisor stopped"),
            Err(e) => error!(error = %e, "Supervisor gave up"),
        }
        result
    }

    async fn supervise(&self, cancel: &CancellationToken) -> Result<()> {
        let mut backoff = self.policy.backoff();

        loop {
            let prior = self.controller.current_handle().id();

            let attempt = tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                attempt = self.open() => attempt,
            };

            match attempt {
                Ok(connection) => {
                    backoff.reset();
                    let id = connection.id();

                    if let Err(winner) = self
                        .controller
                        .compare_and_replace(prior, TransportHandle::Live(connection.clone()))
                    {
                        warn!(handle = %id, winner = %winner.id(), "Another connection was installed first");
                    } else {
                        info!(handle = %id, "Transport installed");

                        tokio::select! {
                            () = cancel.cancelled() => return Ok(()),
                            () = connection.closed() => {}
                        }

                        self.controller
                            .compare_and_replace(id, TransportHandle::Empty)
                            .ok();
                        warn!(handle = %id, "Transport lost");
                    }
                }

                Err(e) if !e.is_retryable() => return Err(e),

                Err(e) => {
                    backoff.record_failure();
                    warn!(failures = backoff.failures(), error = %e, "Connection attempt failed");

                    if !backoff.should_retry() {
                        return Err(Error::connection(format!(
                            "Giving up after {} failed attempts",
                            backoff.failures()
                        )));
                    }
                }
            }

            let delay = backoff.next_delay();
            debug!(delay_ms = delay.as_millis() as u64, "Reconnecting after delay");

            tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                () = sleep(delay) => {}
            }
        }
    }

    /// Opens a connection and waits until it is ready.
    async fn open(&self) -> Result<Connection> {
        let connection = self.connector.connect(self.controller.publisher()).await?;

        if let Err(e) = connection.wait_ready().await {
            connection.shutdown();
            return Err(e);
        }

        Ok(connection)
    }
}

// ============================================================================
// Tests
// ============================================================================
