//! Socket client: session bridge, supervisor and subscriptions in one place.
//!
//! # Example
//!
//! ```no_run
//! use futures_util::StreamExt;
//! use serde_json::json;
//! use session_socket::SocketClient;
//!
//! # async fn example() -> session_socket::Result<()> {
//! let client = SocketClient::builder()
//!     .api_host("api.example.com")
//!     .socket_host("ws.example.com")
//!     .build()?;
//!
//! client.start().await?;
//!
//! let mut messages = client.events("chat", json!({"room": 1}), "chat_message");
//! while let Some(message) = messages.next().await {
//!     println!("{message}");
//! }
//!
//! client.shutdown().await;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use futures_util::Stream;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::endpoints::Endpoints;
use crate::error::{Error, Result};
use crate::events::{EventMultiplexer, Subscription};
use crate::session::{ApiClient, Cookie, CookieStore, SessionBridge};
use crate::transport::{
    ConnectionController, Connector, Supervisor, TransportHandle,
};

use super::builder::ClientBuilder;
use super::options::ClientOptions;

// ============================================================================
// Types
// ============================================================================

/// Internal shared state for the client.
pub(crate) struct ClientInner {
    /// Resolved URLs.
    pub endpoints: Endpoints,

    /// Tunables.
    pub options: ClientOptions,

    /// Cookie persistence.
    pub store: Arc<dyn CookieStore>,

    /// HTTP client for the session bridge and API calls.
    pub http: reqwest::Client,

    /// Opens physical connections.
    pub connector: Arc<dyn Connector>,

    /// Current connection.
    pub controller: Arc<ConnectionController>,

    /// Subscription factory.
    pub multiplexer: EventMultiplexer,

    /// Stops the supervisor.
    pub cancel: CancellationToken,

    /// Running supervisor, if started.
    pub supervisor: Mutex<Option<JoinHandle<Result<()>>>>,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ============================================================================
// SocketClient
// ============================================================================

/// Client for one socket server.
///
/// Cloning is cheap; all clones share the same connection.
#[derive(Clone)]
pub struct SocketClient {
    /// Shared inner state.
    pub(crate) inner: Arc<ClientInner>,
}

// ============================================================================
// SocketClient - Display
// ============================================================================

impl fmt::Debug for SocketClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketClient")
            .field("endpoints", &self.inner.endpoints)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// SocketClient - Public API
// ============================================================================

impl SocketClient {
    /// Creates a configuration builder for the client.
    #[inline]
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Assembles a client from validated parts.
    pub(crate) fn new(
        endpoints: Endpoints,
        options: ClientOptions,
        store: Arc<dyn CookieStore>,
        http: reqwest::Client,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let controller = Arc::new(ConnectionController::new(options.event_buffer));
        let multiplexer = EventMultiplexer::new(Arc::clone(&controller))
            .with_buffer(options.subscription_buffer);

        Self {
            inner: Arc::new(ClientInner {
                endpoints,
                options,
                store,
                http,
                connector,
                controller,
                multiplexer,
                cancel: CancellationToken::new(),
                supervisor: Mutex::new(None),
            }),
        }
    }

    /// Runs the session bridge (if enabled) and starts the supervisor.
    ///
    /// Returns once the supervisor is running; the connection is opened in
    /// the background. Use [`connectivity`](Self::connectivity) to wait for it.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the client was already started
    /// - [`Error::Cancelled`] if the client was shut down
    /// - Any session bridge error
    pub async fn start(&self) -> Result<()> {
        if self.inner.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if self.inner.supervisor.lock().is_some() {
            return Err(Error::config("Client already started"));
        }

        if self.inner.options.bridge_session {
            self.bridge_session().await?;
        }

        let supervisor = Supervisor::new(
            Arc::clone(&self.inner.controller),
            Arc::clone(&self.inner.connector),
            self.inner.options.reconnect.clone(),
        );

        let mut slot = self.inner.supervisor.lock();
        if slot.is_some() {
            return Err(Error::config("Client already started"));
        }
        *slot = Some(tokio::spawn(supervisor.run(self.inner.cancel.child_token())));

        info!(socket = %self.inner.endpoints.socket_url(), "Client started");
        Ok(())
    }

    /// Exchanges the HTTP session for the socket session cookie.
    ///
    /// # Errors
    ///
    /// See [`SessionBridge::run`].
    pub async fn bridge_session(&self) -> Result<Cookie> {
        let mut bridge = SessionBridge::new(
            self.inner.http.clone(),
            self.inner.endpoints.clone(),
            Arc::clone(&self.inner.store),
        );

        if let Some(body) = &self.inner.options.init_body {
            bridge = bridge.with_body(body.clone());
        }

        bridge.run().await
    }

    /// HTTP client for the API host, sharing this client's cookie store.
    #[must_use]
    pub fn api(&self) -> ApiClient {
        ApiClient::new(
            self.inner.http.clone(),
            &self.inner.endpoints,
            Arc::clone(&self.inner.store),
        )
    }

    /// Subscribes to the channel `name`.
    ///
    /// See [`EventMultiplexer::events`].
    #[must_use]
    pub fn events(
        &self,
        name: impl Into<String>,
        arguments: Value,
        filter: impl Into<String>,
    ) -> Subscription {
        self.inner.multiplexer.events(name, arguments, filter)
    }

    /// Sends a command over the current connection and waits for the ack.
    ///
    /// # Errors
    ///
    /// - [`Error::CommandFailed`] if not connected or the connection fails
    /// - [`Error::RequestTimeout`] if the ack does not arrive in time
    pub async fn command(&self, name: &str, body: Value) -> Result<Value> {
        self.inner.controller.command(name, body).await
    }

    /// Returns `true` while a ready connection is installed.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.controller.is_connected()
    }

    /// Stream of connectivity changes, starting with the current state.
    pub fn connectivity(&self) -> impl Stream<Item = bool> + Send + 'static {
        self.inner.multiplexer.connectivity()
    }

    /// Returns the current transport handle.
    #[inline]
    #[must_use]
    pub fn current_handle(&self) -> TransportHandle {
        self.inner.controller.current_handle()
    }

    /// Returns the resolved endpoints.
    #[inline]
    #[must_use]
    pub fn endpoints(&self) -> &Endpoints {
        &self.inner.endpoints
    }

    /// Returns the cookie store.
    #[inline]
    #[must_use]
    pub fn cookie_store(&self) -> &Arc<dyn CookieStore> {
        &self.inner.store
    }

    /// Stops the supervisor and closes the connection.
    ///
    /// Subscriptions end once their streams observe the empty handle or are
    /// dropped. Calling this more than once is harmless.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();

        let task = self.inner.supervisor.lock().take();
        if let Some(task) = task {
            match task.await {
                Ok(Ok(())) => debug!("Supervisor joined"),
                Ok(Err(e)) => warn!(error = %e, "Supervisor ended with error"),
                Err(e) => warn!(error = %e, "Supervisor task failed"),
            }
        }

        self.inner.controller.reset();
        info!("Client shut down");
    }
}

// ============================================================================
// Tests
// ============================================================================
