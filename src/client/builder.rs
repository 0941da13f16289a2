//! Builder pattern for client configuration.
//!
//! Provides a fluent API for configuring and creating [`SocketClient`] instances.
//!
//! # Example
//!
//! ```no_run
//! use session_socket::SocketClient;
//!
//! # fn example() -> session_socket::Result<()> {
//! let client = SocketClient::builder()
//!     .api_host("api.example.com")
//!     .socket_host("ws.example.com")
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::endpoints::Endpoints;
use crate::error::{Error, Result};
use crate::session::{CookieStore, MemoryCookieStore};
use crate::transport::{Connector, ReconnectPolicy, SocketConnector};

use super::core::SocketClient;
use super::options::ClientOptions;

// ============================================================================
// ClientBuilder
// ============================================================================

/// Builder for configuring a [`SocketClient`] instance.
///
/// Use [`SocketClient::builder()`] to create a new builder.
#[derive(Default)]
pub struct ClientBuilder {
    /// Host of the HTTP API.
    api_host: Option<String>,
    /// Host of the socket server.
    socket_host: Option<String>,
    /// Plain `http`/`ws` instead of `https`/`wss`.
    insecure: bool,
    /// Explicit endpoints, overriding the hosts.
    endpoints: Option<Endpoints>,
    /// Cookie persistence.
    cookie_store: Option<Arc<dyn CookieStore>>,
    /// HTTP client for the session bridge.
    http_client: Option<reqwest::Client>,
    /// Custom connector, mainly for tests.
    connector: Option<Arc<dyn Connector>>,
    /// Tunables.
    options: ClientOptions,
}

// ============================================================================
// ClientBuilder Implementation
// ============================================================================

impl ClientBuilder {
    /// Creates a new client builder with no configuration.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the HTTP API host, e.g. `api.example.com` or `127.0.0.1:8080`.
    #[inline]
    #[must_use]
    pub fn api_host(mut self, host: impl Into<String>) -> Self {
        self.api_host = Some(host.into());
        self
    }

    /// Sets the socket host.
    #[inline]
    #[must_use]
    pub fn socket_host(mut self, host: impl Into<String>) -> Self {
        self.socket_host = Some(host.into());
        self
    }

    /// Chooses TLS (`https`/`wss`, the default) or plain (`http`/`ws`).
    #[inline]
    #[must_use]
    pub fn secure(mut self, secure: bool) -> Self {
        self.insecure = !secure;
        self
    }

    /// Uses explicit endpoint URLs instead of host names.
    #[inline]
    #[must_use]
    pub fn endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = Some(endpoints);
        self
    }

    /// Sets the cookie store. Defaults to a [`MemoryCookieStore`].
    #[inline]
    #[must_use]
    pub fn cookie_store(mut self, store: Arc<dyn CookieStore>) -> Self {
        self.cookie_store = Some(store);
        self
    }

    /// Sets the HTTP client used for the session bridge.
    ///
    /// The client should not keep its own cookie jar.
    #[inline]
    #[must_use]
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Replaces the socket connector.
    #[inline]
    #[must_use]
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Replaces all tunables.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the reconnection policy.
    #[inline]
    #[must_use]
    pub fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.options.reconnect = policy;
        self
    }

    /// Sets the command timeout.
    #[inline]
    #[must_use]
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.options.command_timeout = timeout;
        self
    }

    /// Sets the ready timeout.
    #[inline]
    #[must_use]
    pub fn ready_timeout(mut self, timeout: Duration) -> Self {
        self.options.ready_timeout = timeout;
        self
    }

    /// Sets the shared event channel capacity.
    #[inline]
    #[must_use]
    pub fn event_buffer(mut self, capacity: usize) -> Self {
        self.options.event_buffer = capacity;
        self
    }

    /// Enables or disables the session bridge on start.
    #[inline]
    #[must_use]
    pub fn bridge_session(mut self, enabled: bool) -> Self {
        self.options.bridge_session = enabled;
        self
    }

    /// Sends `body` with a `POST` to the init endpoint.
    #[inline]
    #[must_use]
    pub fn init_body(mut self, body: Value) -> Self {
        self.options.init_body = Some(body);
        self
    }

    /// Builds the client with validation.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if no endpoints or hosts are set, or an option is invalid
    /// - [`Error::Url`] if a host does not form a valid URL
    /// - [`Error::Http`] if the default HTTP client cannot be created
    pub fn build(self) -> Result<SocketClient> {
        self.options.validate()?;
        let endpoints = self.validate_endpoints()?;

        let http = match self.http_client {
            Some(client) => client,
            None => reqwest::Client::builder().build()?,
        };

        let store = self
            .cookie_store
            .unwrap_or_else(|| Arc::new(MemoryCookieStore::new()));

        let connector = self.connector.unwrap_or_else(|| {
            Arc::new(SocketConnector::new(
                endpoints.socket_url().clone(),
                Arc::clone(&store),
                self.options.connection_settings(),
            ))
        });

        Ok(SocketClient::new(
            endpoints,
            self.options,
            store,
            http,
            connector,
        ))
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ClientBuilder {
    /// Resolves the endpoint pair.
    fn validate_endpoints(&self) -> Result<Endpoints> {
        if let Some(endpoints) = &self.endpoints {
            return Ok(endpoints.clone());
        }

        let api_host = self.api_host.as_deref().ok_or_else(|| {
            Error::config(
                "API host is required. Use .api_host() or .endpoints() to set it.\n\
                 Example: SocketClient::builder().api_host(\"api.example.com\")",
            )
        })?;

        let socket_host = self.socket_host.as_deref().ok_or_else(|| {
            Error::config(
                "Socket host is required. Use .socket_host() or .endpoints() to set it.\n\
                 Example: SocketClient::builder().socket_host(\"ws.example.com\")",
            )
        })?;

        Endpoints::new(api_host, socket_host, !self.insecure)
    }
}

impl std::fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("api_host", &self.api_host)
            .field("socket_host", &self.socket_host)
            .field("secure", &!self.insecure)
            .field("endpoints", &self.endpoints)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
