//! WebSocket connection and event loop.
//!
//! One [`Connection`] is one physical connection attempt. It owns a spawned
//! tokio task that handles:
//!
//! - Incoming frames (decoded and published in arrival order)
//! - The Engine.IO heartbeat (client ping, server pong)
//! - Outgoing commands from the Rust API
//! - Command/ack correlation by [`AckId`]
//!
//! # Lifecycle
//!
//! `Connecting` until the server sends the readiness token, then `Open`,
//! then `Closed` once the loop exits for any reason. `Closed` is terminal.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{Instant, sleep_until, timeout};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::COOKIE;
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::{AckCounter, AckId, HandleId};
use crate::protocol::{
    AckPacket, CommandPacket, EnginePacket, OpenHandshake, PING_FRAME, PONG_FRAME, SocketPacket,
    classify, decode, is_handshake,
};
use crate::session::{Cookie, cookie_header};

use super::controller::ChannelEvent;
use super::handle::HandleState;

// ============================================================================
// Constants
// ============================================================================

/// Default timeout for command execution.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum pending commands before rejecting new ones.
pub const MAX_PENDING_REQUESTS: usize = 100;

/// Default timeout for the socket to open and send the readiness token.
pub const READY_TIMEOUT: Duration = Duration::from_secs(30);

/// Lower bound for the server-announced ping interval.
pub const MIN_PING_INTERVAL: Duration = Duration::from_millis(250);

// ============================================================================
// Types
// ============================================================================

/// Map of ack IDs to response channels.
type CorrelationMap = FxHashMap<AckId, oneshot::Sender<Result<Value>>>;

// ============================================================================
// ConnectionSettings
// ============================================================================

/// Per-connection tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// How long a command waits for its ack.
    pub command_timeout: Duration,
    /// How long to wait for the readiness token after the socket opens.
    pub ready_timeout: Duration,
    /// Cap on in-flight commands.
    pub max_pending: usize,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            ready_timeout: READY_TIMEOUT,
            max_pending: MAX_PENDING_REQUESTS,
        }
    }
}

// ============================================================================
// ConnectionCommand
// ============================================================================

/// Internal commands for the event loop.
enum ConnectionCommand {
    /// Send a command and wait for its ack.
    Send {
        packet: CommandPacket,
        response_tx: oneshot::Sender<Result<Value>>,
    },
    /// Remove a timed-out correlation entry.
    RemoveCorrelation(AckId),
    /// Close the socket.
    Shutdown,
}

// ============================================================================
// Shared
// ============================================================================

/// State shared between the handles and the event loop.
struct Shared {
    /// Correlation map.
    correlation: Mutex<CorrelationMap>,
    /// Ack id allocator.
    acks: AckCounter,
    /// Lifecycle state.
    state: watch::Sender<HandleState>,
    /// Tunables.
    settings: ConnectionSettings,
}

impl Shared {
    /// Moves the lifecycle forward. `Closed` is never left.
    fn advance(&self, next: HandleState) -> bool {
        self.state.send_if_modified(|state| {
            if *state == HandleState::Closed || *state == next {
                return false;
            }
            *state = next;
            true
        })
    }
}

// ============================================================================
// Heartbeat
// ============================================================================

/// Engine.IO v3 heartbeat: the client pings, the server pongs.
struct Heartbeat {
    interval: Duration,
    deadline: Duration,
    next_ping: Instant,
    last_seen: Instant,
}

impl Heartbeat {
    fn new(open: &OpenHandshake) -> Self {
        let now = Instant::now();
        let interval = open.ping_interval().max(MIN_PING_INTERVAL);
        Self {
            interval,
            deadline: interval.saturating_add(Duration::from_millis(open.ping_timeout_ms)),
            next_ping: now + interval,
            last_seen: now,
        }
    }
}

/// What the event loop does after handling one inbound frame.
enum Flow {
    Continue,
    Reply(&'static str),
    Heartbeat(OpenHandshake),
    Stop(&'static str),
}

// ============================================================================
// Connection
// ============================================================================

/// A live socket connection.
///
/// Cloning is cheap; all clones refer to the same socket and event loop.
///
/// # Thread Safety
///
/// `Connection` is `Send + Sync` and can be shared across tasks.
#[derive(Clone)]
pub struct Connection {
    /// Identity of this connection attempt.
    id: HandleId,
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
    /// State shared with the event loop.
    shared: Arc<Shared>,
}

impl Connection {
    /// Opens a WebSocket to `url`, attaching `cookies` as a `Cookie` header.
    ///
    /// Returns as soon as the socket is open; use [`wait_ready`](Self::wait_ready)
    /// to wait for the readiness token.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionTimeout`] if the socket does not open in time
    /// - [`Error::WebSocket`] if the upgrade fails
    /// - [`Error::Config`] if the cookie header is not a valid header value
    pub async fn connect(
        url: &Url,
        cookies: &[Cookie],
        settings: ConnectionSettings,
        publisher: broadcast::Sender<ChannelEvent>,
    ) -> Result<Self> {
        let mut request = url.as_str().into_client_request()?;

        if let Some(header) = cookie_header(cookies) {
            let value = HeaderValue::from_str(&header)
                .map_err(|e| Error::config(format!("Invalid cookie header: {e}")))?;
            request.headers_mut().insert(COOKIE, value);
        }

        let (ws_stream, _response) =
            timeout(settings.ready_timeout, tokio_tungstenite::connect_async(request))
                .await
                .map_err(|_| Error::connection_timeout(settings.ready_timeout.as_millis() as u64))??;

        info!(url = %url, "WebSocket connection established");

        Ok(Self::spawn(ws_stream, settings, publisher))
    }

    /// Wraps an established WebSocket stream.
    ///
    /// Spawns the event loop task internally.
    pub fn spawn<S>(
        ws_stream: WebSocketStream<S>,
        settings: ConnectionSettings,
        publisher: broadcast::Sender<ChannelEvent>,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let id = HandleId::next();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(HandleState::Connecting);

        let shared = Arc::new(Shared {
            correlation: Mutex::new(CorrelationMap::default()),
            acks: AckCounter::default(),
            state,
            settings,
        });

        tokio::spawn(Self::run_event_loop(
            id,
            ws_stream,
            command_rx,
            Arc::clone(&shared),
            publisher,
        ));

        Self {
            id,
            command_tx,
            shared,
        }
    }

    /// Returns the identity of this connection.
    #[inline]
    #[must_use]
    pub fn id(&self) -> HandleId {
        self.id
    }

    /// Returns the current lifecycle state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> HandleState {
        *self.shared.state.borrow()
    }

    /// Returns `true` once the readiness token arrived and until the socket closes.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state() == HandleState::Open
    }

    /// Returns the number of pending commands.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.shared.correlation.lock().len()
    }

    /// Waits for the readiness token.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionTimeout`] if the token is not received in time
    /// - [`Error::ConnectionClosed`] if the socket closes first
    pub async fn wait_ready(&self) -> Result<()> {
        let ready_timeout = self.shared.settings.ready_timeout;
        let mut state = self.shared.state.subscribe();

        let reached = timeout(
            ready_timeout,
            state.wait_for(|state| *state != HandleState::Connecting),
        )
        .await
        .map_err(|_| Error::connection_timeout(ready_timeout.as_millis() as u64))?
        .map(|state| *state)
        .map_err(|_| Error::ConnectionClosed)?;

        if reached != HandleState::Open {
            return Err(Error::ConnectionClosed);
        }

        debug!(handle = %self.id, "Readiness token received");
        Ok(())
    }

    /// Resolves once the connection has closed.
    pub async fn closed(&self) {
        let mut state = self.shared.state.subscribe();
        // A dropped sender also means the loop is gone.
        let _ = state.wait_for(|state| *state == HandleState::Closed).await;
    }

    /// Sends a named command and waits for its ack with the default timeout.
    ///
    /// # Errors
    ///
    /// - [`Error::CommandFailed`] if the connection closes or fails before the ack
    /// - [`Error::RequestTimeout`] if the ack does not arrive in time
    /// - [`Error::Protocol`] if too many commands are pending
    pub async fn command(&self, name: &str, body: Value) -> Result<Value> {
        self.command_with_timeout(name, body, self.shared.settings.command_timeout)
            .await
    }

    /// Sends a named command and waits for its ack with a custom timeout.
    ///
    /// # Errors
    ///
    /// See [`command`](Self::command).
    pub async fn command_with_timeout(
        &self,
        name: &str,
        body: Value,
        request_timeout: Duration,
    ) -> Result<Value> {
        self.send(CommandPacket::new(self.shared.acks.next(), name, body), request_timeout)
            .await
            .map_err(|e| match e {
                Error::ConnectionClosed
                | Error::ChannelClosed(_)
                | Error::Connection { .. }
                | Error::WebSocket(_) => Error::command_failed(name, e.to_string()),
                other => other,
            })
    }

    /// Shuts down the connection.
    ///
    /// The state becomes `Closed` immediately; the socket is closed by the
    /// event loop. Calling this more than once is harmless.
    pub fn shutdown(&self) {
        if self.shared.advance(HandleState::Closed) {
            debug!(handle = %self.id, "Connection disposed");
        }
        let _ = self.command_tx.send(ConnectionCommand::Shutdown);
    }

    /// Sends a packet to the event loop and waits for the correlated ack.
    async fn send(&self, packet: CommandPacket, request_timeout: Duration) -> Result<Value> {
        let ack_id = packet.ack_id;
        let max_pending = self.shared.settings.max_pending;

        if self.state() == HandleState::Closed {
            return Err(Error::ConnectionClosed);
        }

        // Check pending request limit
        {
            let correlation = self.shared.correlation.lock();
            if correlation.len() >= max_pending {
                warn!(
                    handle = %self.id,
                    pending = correlation.len(),
                    max = max_pending,
                    "Too many pending commands"
                );
                return Err(Error::protocol(format!(
                    "Too many pending commands: {}/{}",
                    correlation.len(),
                    max_pending
                )));
            }
        }

        let (response_tx, response_rx) = oneshot::channel();

        self.command_tx
            .send(ConnectionCommand::Send {
                packet,
                response_tx,
            })
            .map_err(|_| Error::ConnectionClosed)?;

        match timeout(request_timeout, response_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                let _ = self
                    .command_tx
                    .send(ConnectionCommand::RemoveCorrelation(ack_id));

                Err(Error::request_timeout(
                    ack_id,
                    request_timeout.as_millis() as u64,
                ))
            }
        }
    }

    /// Event loop that handles WebSocket I/O.
    async fn run_event_loop<S>(
        id: HandleId,
        ws_stream: WebSocketStream<S>,
        mut command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
        shared: Arc<Shared>,
        publisher: broadcast::Sender<ChannelEvent>,
    ) where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut ws_write, mut ws_read) = ws_stream.split();
        let mut heartbeat: Option<Heartbeat> = None;

        loop {
            let ping_at = heartbeat.as_ref().map(|h| h.next_ping);

            tokio::select! {
                // Incoming frames from the server
                message = ws_read.next() => {
                    let text = match message {
                        Some(Ok(Message::Text(text))) => text,

                        Some(Ok(Message::Close(frame))) => {
                            debug!(handle = %id, ?frame, "WebSocket closed by remote");
                            break;
                        }

                        Some(Err(e)) => {
                            error!(handle = %id, error = %e, "WebSocket error");
                            break;
                        }

                        None => {
                            debug!(handle = %id, "WebSocket stream ended");
                            break;
                        }

                        // Ignore Binary, Ping, Pong
                        _ => continue,
                    };

                    if let Some(heartbeat) = heartbeat.as_mut() {
                        heartbeat.last_seen = Instant::now();
                    }

                    match Self::handle_incoming_frame(id, &text, &shared, &publisher) {
                        Flow::Continue => {}
                        Flow::Reply(frame) => {
                            if let Err(e) = ws_write.send(Message::Text(frame.into())).await {
                                warn!(handle = %id, error = %e, "Failed to send heartbeat reply");
                                break;
                            }
                        }
                        Flow::Heartbeat(open) => {
                            debug!(
                                handle = %id,
                                sid = %open.sid,
                                ping_interval_ms = open.ping_interval_ms,
                                "Engine session opened"
                            );
                            heartbeat = Some(Heartbeat::new(&open));
                        }
                        Flow::Stop(reason) => {
                            debug!(handle = %id, reason, "Server ended the session");
                            break;
                        }
                    }
                }

                // Commands from Rust API
                command = command_rx.recv() => {
                    match command {
                        Some(ConnectionCommand::Send { packet, response_tx }) => {
                            Self::handle_send_command(
                                id,
                                packet,
                                response_tx,
                                &mut ws_write,
                                &shared,
                            ).await;
                        }

                        Some(ConnectionCommand::RemoveCorrelation(ack_id)) => {
                            shared.correlation.lock().remove(&ack_id);
                            debug!(handle = %id, %ack_id, "Removed timed-out correlation");
                        }

                        Some(ConnectionCommand::Shutdown) => {
                            debug!(handle = %id, "Shutdown command received");
                            let _ = ws_write.close().await;
                            break;
                        }

                        None => {
                            debug!(handle = %id, "Command channel closed");
                            let _ = ws_write.close().await;
                            break;
                        }
                    }
                }

                // Client heartbeat
                () = sleep_until(ping_at.unwrap_or_else(Instant::now)), if ping_at.is_some() => {
                    let Some(beat) = heartbeat.as_mut() else { continue };

                    if beat.last_seen.elapsed() > beat.deadline {
                        warn!(handle = %id, deadline_ms = beat.deadline.as_millis() as u64, "Heartbeat timed out");
                        break;
                    }

                    if let Err(e) = ws_write.send(Message::Text(PING_FRAME.into())).await {
                        warn!(handle = %id, error = %e, "Failed to send ping");
                        break;
                    }

                    trace!(handle = %id, "Ping sent");
                    beat.next_ping = Instant::now() + beat.interval;
                }
            }
        }

        shared.advance(HandleState::Closed);

        // Fail all pending commands on shutdown
        Self::fail_pending_requests(id, &shared);

        debug!(handle = %id, "Event loop terminated");
    }

    /// Handles one inbound text frame.
    fn handle_incoming_frame(
        id: HandleId,
        text: &str,
        shared: &Shared,
        publisher: &broadcast::Sender<ChannelEvent>,
    ) -> Flow {
        let flow = match classify(text) {
            Some((EnginePacket::Open, _)) => match OpenHandshake::parse(text) {
                Ok(open) => Flow::Heartbeat(open),
                Err(e) => {
                    warn!(handle = %id, error = %e, "Malformed open packet");
                    Flow::Continue
                }
            },
            Some((EnginePacket::Close, _)) => Flow::Stop("engine close"),
            Some((EnginePacket::Ping, _)) => Flow::Reply(PONG_FRAME),
            Some((EnginePacket::Message, Some(SocketPacket::Disconnect))) => {
                Flow::Stop("socket disconnect")
            }
            Some((EnginePacket::Message, Some(SocketPacket::Ack))) => {
                Self::handle_ack(id, text, shared);
                Flow::Continue
            }
            Some((EnginePacket::Message, Some(SocketPacket::Error))) => {
                warn!(handle = %id, frame = %text, "Server reported a socket error");
                Flow::Continue
            }
            _ => Flow::Continue,
        };

        if is_handshake(text) && shared.advance(HandleState::Open) {
            info!(handle = %id, "Channel ready");
        }

        if let Some(payload) = decode(text) {
            // No receivers is fine: nobody is subscribed yet.
            let _ = publisher.send(ChannelEvent::Payload {
                handle: id,
                payload: Arc::from(payload),
            });
        }

        flow
    }

    /// Resolves the command waiting for this ack.
    fn handle_ack(id: HandleId, text: &str, shared: &Shared) {
        let Some(ack) = AckPacket::parse(text) else {
            warn!(handle = %id, frame = %text, "Malformed ack");
            return;
        };

        let tx = shared.correlation.lock().remove(&ack.ack_id);

        match tx {
            Some(tx) => {
                let _ = tx.send(Ok(ack.into_value()));
            }
            None => warn!(handle = %id, ack_id = %ack.ack_id, "Ack for unknown command"),
        }
    }

    /// Handles a send command from the Rust API.
    async fn handle_send_command<W>(
        id: HandleId,
        packet: CommandPacket,
        response_tx: oneshot::Sender<Result<Value>>,
        ws_write: &mut W,
        shared: &Shared,
    ) where
        W: futures_util::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
    {
        let ack_id = packet.ack_id;

        let frame = match packet.encode() {
            Ok(frame) => frame,
            Err(e) => {
                let _ = response_tx.send(Err(e));
                return;
            }
        };

        // Store correlation before sending
        shared.correlation.lock().insert(ack_id, response_tx);

        if let Err(e) = ws_write.send(Message::Text(frame.into())).await {
            if let Some(tx) = shared.correlation.lock().remove(&ack_id) {
                let _ = tx.send(Err(Error::connection(e.to_string())));
            }
            return;
        }

        trace!(handle = %id, %ack_id, command = %packet.name, "Command sent");
    }

    /// Fails all pending commands with `ConnectionClosed`.
    fn fail_pending_requests(id: HandleId, shared: &Shared) {
        let pending: Vec<_> = shared.correlation.lock().drain().collect();
        let count = pending.len();

        for (_, tx) in pending {
            let _ = tx.send(Err(Error::ConnectionClosed));
        }

        if count > 0 {
            debug!(handle = %id, count, "Failed pending commands on shutdown");
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::transport::testing::pair;

    fn settings() -> ConnectionSettings {
        ConnectionSettings {
            command_timeout: Duration::from_millis(500),
            ready_timeout: Duration::from_millis(500),
            max_pending: 4,
        }
    }

    #[test]
    fn test_constants() {
        assert_eq!(DEFAULT_COMMAND_TIMEOUT.as_secs(), 30);
        assert_eq!(MAX_PENDING_REQUESTS, 100);
        assert_eq!(READY_TIMEOUT.as_secs(), 30);
    }

    #[tokio::test]
    async fn test_ready_after_handshake_token() {
        let (publisher, _) = broadcast::channel(16);
        let (connection, mut server) = pair(settings(), publisher).await;

        assert_eq!(connection.state(), HandleState::Connecting);
        server.open(25_000).await;

        connection.wait_ready().await.expect("ready");
        assert!(connection.is_open());
    }

    #[tokio::test]
    async fn test_wait_ready_times_out_without_token() {
        let (publisher, _) = broadcast::channel(16);
        let (connection, mut server) = pair(settings(), publisher).await;
        server.send(r#"0{"sid":"s","upgrades":[],"pingInterval":25000,"pingTimeout":5000}"#).await;

        let err = connection.wait_ready().await.expect_err("no token");
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_wait_ready_fails_when_socket_closes() {
        let (publisher, _) = broadcast::channel(16);
        let (connection, server) = pair(settings(), publisher).await;
        drop(server);

        let err = connection.wait_ready().await.expect_err("closed");
        assert!(matches!(err, Error::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_command_resolves_with_ack() {
        let (publisher, _) = broadcast::channel(16);
        let (connection, mut server) = pair(settings(), publisher).await;
        server.open(25_000).await;
        connection.wait_ready().await.expect("ready");

        let client = connection.clone();
        let pending = tokio::spawn(async move {
            client.command("rooms_list", json!({"page": 1})).await
        });

        let frame = server.recv().await.expect("command frame");
        assert_eq!(frame, r#"420["rooms_list",{"page":1}]"#);
        server.send(r#"430[{"rooms":[]}]"#).await;

        let reply = pending.await.expect("join").expect("reply");
        assert_eq!(reply, json!({"rooms": []}));
        assert_eq!(connection.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_command_fails_when_connection_closes() {
        let (publisher, _) = broadcast::channel(16);
        let (connection, mut server) = pair(settings(), publisher).await;
        server.open(25_000).await;
        connection.wait_ready().await.expect("ready");

        let client = connection.clone();
        let pending = tokio::spawn(async move { client.command("slow", json!({})).await });

        let _ = server.recv().await;
        drop(server);

        let err = pending.await.expect("join").expect_err("closed");
        assert!(matches!(err, Error::CommandFailed { ref command, .. } if command == "slow"));
    }

    #[tokio::test]
    async fn test_command_times_out() {
        let (publisher, _) = broadcast::channel(16);
        let (connection, mut server) = pair(settings(), publisher).await;
        server.open(25_000).await;
        connection.wait_ready().await.expect("ready");

        let err = connection
            .command_with_timeout("ignored", json!({}), Duration::from_millis(50))
            .await
            .expect_err("timeout");

        assert!(matches!(err, Error::RequestTimeout { .. }));
    }

    #[tokio::test]
    async fn test_command_after_shutdown_fails() {
        let (publisher, _) = broadcast::channel(16);
        let (connection, _server) = pair(settings(), publisher).await;

        connection.shutdown();
        assert_eq!(connection.state(), HandleState::Closed);

        let err = connection.command("x", json!({})).await.expect_err("closed");
        assert!(matches!(err, Error::CommandFailed { .. }));
    }

    #[tokio::test]
    async fn test_pending_limit() {
        let (publisher, _) = broadcast::channel(16);
        let (connection, mut server) = pair(settings(), publisher).await;
        server.open(25_000).await;
        connection.wait_ready().await.expect("ready");

        let mut waiting = Vec::new();
        for _ in 0..4 {
            let client = connection.clone();
            waiting.push(tokio::spawn(async move {
                client.command("hold", json!({})).await
            }));
            let _ = server.recv().await;
        }

        let err = connection.command("one_more", json!({})).await.expect_err("limit");
        assert!(matches!(err, Error::Protocol { .. }));

        for task in waiting {
            task.abort();
        }
    }

    #[tokio::test]
    async fn test_events_published_in_order() {
        let (publisher, mut events) = broadcast::channel(16);
        let (connection, mut server) = pair(settings(), publisher).await;
        server.open(25_000).await;
        connection.wait_ready().await.expect("ready");

        server.send("3").await;
        server.send(r#"42["a",{"data":{"n":1}}]"#).await;
        server.send("41x").await;
        server.send(r#"42["b",{"data":{"n":2}}]"#).await;

        let mut payloads = Vec::new();
        while payloads.len() < 4 {
            if let ChannelEvent::Payload { handle, payload } = events.recv().await.expect("event") {
                assert_eq!(handle, connection.id());
                payloads.push(payload.to_string());
            }
        }

        // "40" and the readiness token come first, then the events in order.
        assert_eq!(payloads[0], "40");
        assert_eq!(payloads[1], r#"["channel_inited",null]"#);
        assert_eq!(payloads[2], r#"["a",{"data":{"n":1}}]"#);
        assert_eq!(payloads[3], r#"["b",{"data":{"n":2}}]"#);
    }

    #[tokio::test]
    async fn test_client_pings_and_times_out_without_pong() {
        let (publisher, _) = broadcast::channel(16);
        let (connection, mut server) = pair(settings(), publisher).await;
        server
            .send(r#"0{"sid":"s","upgrades":[],"pingInterval":20,"pingTimeout":20}"#)
            .await;
        server.send(r#"42["channel_inited",null]"#).await;
        connection.wait_ready().await.expect("ready");

        assert_eq!(server.recv_raw().await.as_deref(), Some(PING_FRAME));

        // Stay silent; the client gives up after interval + timeout.
        timeout(Duration::from_secs(2), connection.closed())
            .await
            .expect("closed after missed pongs");
        assert_eq!(connection.state(), HandleState::Closed);
    }

    #[test]
    fn test_heartbeat_clamps_interval() {
        let open = OpenHandshake {
            sid: "s".to_string(),
            upgrades: Vec::new(),
            ping_interval_ms: 0,
            ping_timeout_ms: 100,
        };

        let heartbeat = Heartbeat::new(&open);
        assert_eq!(heartbeat.interval, MIN_PING_INTERVAL);
        assert_eq!(heartbeat.deadline, MIN_PING_INTERVAL + Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_zero_ping_interval_does_not_flood() {
        let (publisher, _) = broadcast::channel(16);
        let (connection, mut server) = pair(settings(), publisher).await;
        server
            .send(r#"0{"sid":"s","upgrades":[],"pingInterval":0,"pingTimeout":5000}"#)
            .await;
        server.send(r#"42["channel_inited",null]"#).await;
        connection.wait_ready().await.expect("ready");

        let early = timeout(MIN_PING_INTERVAL / 2, server.recv_raw()).await;
        assert!(early.is_err(), "no ping before the minimum interval");

        assert_eq!(server.recv_raw().await.as_deref(), Some(PING_FRAME));
    }

    #[tokio::test]
    async fn test_server_close_packet_ends_connection() {
        let (publisher, _) = broadcast::channel(16);
        let (connection, mut server) = pair(settings(), publisher).await;
        server.open(25_000).await;
        connection.wait_ready().await.expect("ready");

        server.send("1").await;
        timeout(Duration::from_secs(1), connection.closed())
            .await
            .expect("closed");
    }

    #[allow(dead_code)]
    fn assert_send_sync() {
        fn check<T: Send + Sync>() {}
        check::<Connection>();
    }
}
