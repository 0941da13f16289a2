//! Session bridge, connection and one channel subscription.
//!
//! Demonstrates:
//! - Building a client from host names
//! - Bridging the HTTP session into the socket cookie
//! - Watching connectivity
//! - Subscribing to a channel and printing filtered events
//!
//! Usage:
//!   cargo run --example 001_subscribe
//!   cargo run --example 001_subscribe -- --api-host=api.local --socket-host=ws.local
//!   cargo run --example 001_subscribe -- --debug --no-wait

mod common;

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use common::Args;
use futures_util::StreamExt;
use serde_json::json;
use session_socket::{ReconnectPolicy, Result, SocketClient};

// ============================================================================
// Constants
// ============================================================================

const CHANNEL: &str = "chat";
const EVENT: &str = "chat_message";
const EVENT_LIMIT: usize = 10;

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    common::init_logging(args.debug);

    if let Err(e) = run(args).await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    println!("=== 001: Subscribe ===\n");

    // ========================================================================
    // Create Client
    // ========================================================================

    println!("[1] Creating client...");
    println!("    API: {}", args.api_host);
    println!("    Socket: {}", args.socket_host);

    let client = SocketClient::builder()
        .api_host(&args.api_host)
        .socket_host(&args.socket_host)
        .secure(args.secure)
        .reconnect(ReconnectPolicy::new().with_max_delay(Duration::from_secs(10)))
        .build()?;

    println!("    ✓ Client ready\n");

    // ========================================================================
    // Start
    // ========================================================================

    println!("[2] Starting (session bridge + supervisor)...");
    client.start().await?;

    let mut connectivity = Box::pin(client.connectivity());
    while let Some(connected) = connectivity.next().await {
        println!("    Connected: {connected}");
        if connected {
            break;
        }
    }
    println!("    ✓ Socket open\n");

    // ========================================================================
    // Subscribe
    // ========================================================================

    println!("[3] Subscribing to '{CHANNEL}' (first {EVENT_LIMIT} '{EVENT}' events)...");
    let mut events = client
        .events(CHANNEL, json!({ "room": 1 }), EVENT)
        .take(EVENT_LIMIT);

    while let Some(event) = events.next().await {
        println!("    {event}");
    }
    println!("    ✓ Done\n");

    common::wait_for_exit(args.no_wait).await;

    client.shutdown().await;
    println!("=== Complete ===");
    Ok(())
}
