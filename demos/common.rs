//! Shared utilities for demos.
//!
//! Provides common functionality used across all demos:
//! - Command-line argument parsing
//! - Logging initialization
//! - Graceful exit handling

#![allow(dead_code)]

// ============================================================================
// Imports
// ============================================================================

use tracing_subscriber::EnvFilter;

// ============================================================================
// Constants
// ============================================================================

/// Fallback HTTP API host.
pub const DEFAULT_API_HOST: &str = "127.0.0.1:8080";

/// Fallback socket host.
pub const DEFAULT_SOCKET_HOST: &str = "127.0.0.1:8081";

// ============================================================================
// Types
// ============================================================================

/// Command-line arguments for demos.
#[derive(Debug, Clone)]
pub struct Args {
    pub debug: bool,
    pub no_wait: bool,
    pub secure: bool,
    pub api_host: String,
    pub socket_host: String,
}

impl Args {
    /// Parse command-line arguments.
    ///
    /// Hosts come from `--api-host=<host>` / `--socket-host=<host>`.
    pub fn parse() -> Self {
        let args: Vec<String> = std::env::args().collect();
        let value = |flag: &str, default: &str| {
            args.iter()
                .find_map(|a| a.strip_prefix(flag).and_then(|v| v.strip_prefix('=')))
                .unwrap_or(default)
                .to_string()
        };

        Self {
            debug: args.iter().any(|a| a == "--debug"),
            no_wait: args.iter().any(|a| a == "--no-wait"),
            secure: args.iter().any(|a| a == "--secure"),
            api_host: value("--api-host", DEFAULT_API_HOST),
            socket_host: value("--socket-host", DEFAULT_SOCKET_HOST),
        }
    }
}

// ============================================================================
// Functions
// ============================================================================

/// Initialize tracing/logging.
pub fn init_logging(debug: bool) {
    let filter = if debug {
        "session_socket=debug"
    } else {
        "session_socket=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}

/// Wait for Ctrl+C or skip if `--no-wait` flag is set.
pub async fn wait_for_exit(no_wait: bool) {
    if no_wait {
        println!("[--no-wait] Skipping wait");
        return;
    }

    println!("Press Ctrl+C to exit...");
    tokio::signal::ctrl_c().await.ok();
}
