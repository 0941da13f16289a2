//! HTTP session to socket session bridging.
//!
//! The socket server authenticates with a `WSSESSID` cookie derived from
//! the HTTP API session (`PHPSESSID`) and the init endpoint's response.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `api` | JSON calls against the API host |
//! | `bridge` | Session-init exchange |
//! | `cookie` | Cookie model and matching |
//! | `store` | Cookie persistence with the init lock |

// ============================================================================
// Submodules
// ============================================================================

/// JSON calls against the API host.
pub mod api;

/// Session-init exchange.
pub mod bridge;

/// Cookie model and matching.
pub mod cookie;

/// Cookie persistence with the init lock.
pub mod store;

// ============================================================================
// Re-exports
// ============================================================================

pub use api::ApiClient;
pub use bridge::{API_SESSION_COOKIE, SOCKET_SESSION_COOKIE, SessionBridge};
pub use cookie::{Cookie, cookie_header};
pub use store::{CookieStore, InitLock, MemoryCookieStore};
