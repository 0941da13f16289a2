//! In-memory Engine.IO peer for tests.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::io::{DuplexStream, duplex};
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::Role;

use crate::protocol::HANDSHAKE_TOKEN;

use super::connection::{Connection, ConnectionSettings};
use super::controller::ChannelEvent;

/// Server side of an in-memory socket.
pub(crate) struct FakeServer {
    ws: WebSocketStream<DuplexStream>,
}

impl FakeServer {
    /// Sends one text frame. Errors are ignored; the client may be gone.
    pub(crate) async fn send(&mut self, frame: &str) {
        let _ = self.ws.send(Message::Text(frame.into())).await;
    }

    /// Sends the engine open packet, the namespace connect and the readiness token.
    pub(crate) async fn open(&mut self, ping_interval_ms: u64) {
        let open = format!(
            r#"0{{"sid":"test","upgrades":[],"pingInterval":{ping_interval_ms},"pingTimeout":5000}}"#
        );
        self.send(&open).await;
        self.send("40").await;
        self.send(HANDSHAKE_TOKEN).await;
    }

    /// Receives the next text frame, skipping heartbeats.
    ///
    /// Returns `None` if the client closed or nothing arrived within a second.
    pub(crate) async fn recv(&mut self) -> Option<String> {
        loop {
            let message = timeout(Duration::from_secs(1), self.ws.next()).await.ok()??;
            match message.ok()? {
                Message::Text(text) if text.as_str() == "2" => {
                    self.send("3").await;
                }
                Message::Text(text) => return Some(text.to_string()),
                Message::Close(_) => return None,
                _ => {}
            }
        }
    }

    /// Receives the next text frame, including heartbeats.
    pub(crate) async fn recv_raw(&mut self) -> Option<String> {
        loop {
            let message = timeout(Duration::from_secs(1), self.ws.next()).await.ok()??;
            match message.ok()? {
                Message::Text(text) => return Some(text.to_string()),
                Message::Close(_) => return None,
                _ => {}
            }
        }
    }
}

/// Creates a client connection wired to an in-memory server.
pub(crate) async fn pair(
    settings: ConnectionSettings,
    publisher: broadcast::Sender<ChannelEvent>,
) -> (Connection, FakeServer) {
    let (client_io, server_io) = duplex(64 * 1024);

    let (client, server) = tokio::join!(
        WebSocketStream::from_raw_socket(client_io, Role::Client, None),
        WebSocketStream::from_raw_socket(server_io, Role::Server, None),
    );

    (
        Connection::spawn(client, settings, publisher),
        FakeServer { ws: server },
    )
}

/// Server that acks every command and records its name.
pub(crate) struct AckingPeer {
    outbound: mpsc::UnboundedSender<String>,
    commands: Arc<Mutex<Vec<String>>>,
}

impl AckingPeer {
    /// Pushes a frame to the client.
    pub(crate) fn push(&self, frame: &str) {
        let _ = self.outbound.send(frame.to_string());
    }

    /// Number of received commands called `name`.
    pub(crate) fn count(&self, name: &str) -> usize {
        self.commands.lock().iter().filter(|command| *command == name).count()
    }

    /// Names of all received commands, in order.
    pub(crate) fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }
}

impl FakeServer {
    /// Hands the socket to a background task that acks every command.
    ///
    /// Dropping the returned peer closes the socket.
    pub(crate) fn into_acking(self) -> AckingPeer {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let commands = Arc::new(Mutex::new(Vec::new()));

        tokio::spawn(run_acking(self.ws, outbound_rx, Arc::clone(&commands)));

        AckingPeer { outbound, commands }
    }
}

async fn run_acking(
    mut ws: WebSocketStream<DuplexStream>,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
    commands: Arc<Mutex<Vec<String>>>,
) {
    loop {
        tokio::select! {
            frame = outbound_rx.recv() => {
                let Some(frame) = frame else { break };
                if ws.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            }
            message = ws.next() => {
                let text = match message {
                    Some(Ok(Message::Text(text))) => text.to_string(),
                    Some(Ok(_)) => continue,
                    _ => break,
                };

                let reply = if text == "2" {
                    "3".to_string()
                } else if let Some((ack, name)) = parse_command(&text) {
                    commands.lock().push(name);
                    format!(r#"43{ack}[{{"ok":true}}]"#)
                } else {
                    continue;
                };

                if ws.send(Message::Text(reply.into())).await.is_err() {
                    break;
                }
            }
        }
    }

    let _ = ws.close(None).await;
}

/// Splits `42<ack>["name",..]` into ack id and name.
fn parse_command(text: &str) -> Option<(u64, String)> {
    let rest = text.strip_prefix("42")?;
    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }

    let ack = rest[..digits].parse().ok()?;
    let envelope: Vec<Value> = serde_json::from_str(&rest[digits..]).ok()?;
    Some((ack, envelope.first()?.as_str()?.to_string()))
}

/// Creates a connection that already received the readiness token.
pub(crate) async fn ready_pair(
    settings: ConnectionSettings,
    publisher: broadcast::Sender<ChannelEvent>,
) -> (Connection, AckingPeer) {
    let (connection, mut server) = pair(settings, publisher).await;
    server.open(25_000).await;

    if let Err(e) = connection.wait_ready().await {
        panic!("test connection not ready: {e}");
    }

    (connection, server.into_acking())
}

/// Polls `condition` until it holds, panicking after two seconds.
pub(crate) async fn eventually(mut condition: impl FnMut() -> bool) {
    let waited = timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;

    assert!(waited.is_ok(), "condition not reached in time");
}
