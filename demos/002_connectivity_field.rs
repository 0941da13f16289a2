//! Mirroring connectivity into an observable field.
//!
//! Demonstrates:
//! - `FieldChangeHub` listeners and guards
//! - Feeding it from the connectivity stream
//! - Issuing a command once connected
//!
//! Usage:
//!   cargo run --example 002_connectivity_field
//!   cargo run --example 002_connectivity_field -- --debug --no-wait

mod common;

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use anyhow::Context;
use common::Args;
use futures_util::StreamExt;
use serde_json::json;
use session_socket::{FieldChangeHub, SocketClient};

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    common::init_logging(args.debug);

    println!("=== 002: Connectivity Field ===\n");

    let client = SocketClient::builder()
        .api_host(&args.api_host)
        .socket_host(&args.socket_host)
        .secure(args.secure)
        .build()
        .context("building client")?;

    // ========================================================================
    // Observable Field
    // ========================================================================

    let online = Arc::new(FieldChangeHub::new(false));
    let _printer = online.register(Arc::new(|connected: &bool| {
        println!("    [field] online = {connected}");
    }));

    let mirror = {
        let online = Arc::clone(&online);
        let mut connectivity = Box::pin(client.connectivity());
        tokio::spawn(async move {
            while let Some(connected) = connectivity.next().await {
                online.set(connected);
            }
        })
    };

    // ========================================================================
    // Start And Command
    // ========================================================================

    println!("[1] Starting...");
    client.start().await.context("starting client")?;

    let mut connectivity = Box::pin(client.connectivity());
    while connectivity.next().await == Some(false) {}

    println!("[2] Sending 'ping_room'...");
    let reply = client
        .command("ping_room", json!({ "room": 1 }))
        .await
        .context("ping_room")?;
    println!("    ✓ Reply: {reply}\n");

    common::wait_for_exit(args.no_wait).await;

    client.shutdown().await;
    mirror.abort();
    println!("    Final value: {}", online.get());
    println!("=== Complete ===");
    Ok(())
}
