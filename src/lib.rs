//! Session Socket - Engine.IO v3 / Socket.IO client with a bridged HTTP session.
//!
//! This library keeps one live socket to a realtime server, multiplexes
//! named event channels over it and reconnects with backoff when it drops.
//!
//! # Architecture
//!
//! The client follows a controller/subscriber model:
//!
//! - **Supervisor**: Opens connections, installs them, reconnects on loss
//! - **Controller**: Holds the current [`TransportHandle`] and broadcasts changes
//! - **Subscriptions**: Follow the controller and re-subscribe on every new handle
//!
//! Key design principles:
//!
//! - Each [`transport::Connection`] owns its socket, heartbeat and event loop
//! - Commands are acked `42<id>["name",body]` / `43<id>[reply]` frames
//! - A connection counts as open only after the server's readiness token
//! - The socket session cookie is derived from the HTTP API session
//!
//! # Quick Start
//!
//! ```no_run
//! use futures_util::StreamExt;
//! use serde_json::json;
//! use session_socket::{Result, SocketClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = SocketClient::builder()
//!         .api_host("api.example.com")
//!         .socket_host("ws.example.com")
//!         .build()?;
//!
//!     // Bridge the session and start the supervisor
//!     client.start().await?;
//!
//!     let mut prices = client.events("ticker", json!({"pair": "BTC"}), "ticker_update");
//!     while let Some(price) = prices.next().await {
//!         println!("{price}");
//!     }
//!
//!     client.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | [`SocketClient`], builder and options |
//! | [`endpoints`] | Init and socket URLs |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`events`] | Channel subscriptions and connectivity |
//! | [`field`] | Observable value with listeners |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Engine.IO / Socket.IO frames |
//! | [`session`] | Cookies, cookie store, session bridge and API calls |
//! | [`transport`] | Connection, controller and reconnection |

// ============================================================================
// Modules
// ============================================================================

/// Client entry point.
///
/// Use [`SocketClient::builder()`] to create a configured client.
pub mod client;

/// Init and socket endpoint URLs.
pub mod endpoints;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Channel subscriptions over the current connection.
pub mod events;

/// Observable value with synchronous change listeners.
pub mod field;

/// Type-safe identifiers for connections and acks.
pub mod identifiers;

/// Engine.IO v3 and Socket.IO frame types.
pub mod protocol;

/// HTTP session to socket session exchange.
pub mod session;

/// WebSocket transport layer.
///
/// Connections, the connection controller and the reconnect supervisor.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Client types
pub use client::{ClientBuilder, ClientOptions, SocketClient};

// Endpoints
pub use endpoints::Endpoints;

// Error types
pub use error::{Error, Result};

// Event types
pub use events::{EventMultiplexer, Subscription, extract_data};

// Observable value
pub use field::{FieldChangeHub, Listener, ListenerGuard};

// Identifier types
pub use identifiers::{AckId, HandleId};

// Session types
pub use session::{ApiClient, Cookie, CookieStore, InitLock, MemoryCookieStore, SessionBridge};

// Transport types
pub use transport::{
    ChannelEvent, Connection, ConnectionController, HandleState, ReconnectPolicy, TransportHandle,
};
