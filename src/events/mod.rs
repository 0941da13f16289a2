//! Named event subscriptions over the shared connection.
//!
//! # Event Flow
//!
//! ```text
//! Connection ──payload──► broadcast ──► Subscription task ──filter──► Stream<Value>
//!                            ▲                 │
//! Controller ──handle────────┘                 └── subscribe_/unsubscribe_<name>
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `filter` | Payload filter and `data` extraction |
//! | `multiplexer` | Subscription factory and connectivity stream |
//! | `subscription` | Per-caller stream and its background task |

// ============================================================================
// Submodules
// ============================================================================

/// Payload filter and `data` extraction.
pub mod filter;

/// Subscription factory and connectivity stream.
pub mod multiplexer;

/// Per-caller stream and its background task.
pub mod subscription;

mod teardown;

// ============================================================================
// Re-exports
// ============================================================================

pub use filter::extract_data;
pub use multiplexer::EventMultiplexer;
pub use subscription::Subscription;
