//! Client connection root and configuration.
//!
//! # Example
//!
//! ```no_run
//! use janus_client::Client;
//!
//! # async fn example() -> janus_client::Result<()> {
//! let client = Client::builder().url("ws://127.0.0.1:8188").build()?;
//! client.connect().await?;
//!
//! let session = client.create_session().await?;
//! session.destroy().await?;
//! client.disconnect();
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `builder` | Fluent client construction |
//! | `core` | Connection state machine and dispatch |
//! | `options` | Configuration |
//! | `reconnect` | Reconnect backoff policy |

// ============================================================================
// Submodules
// ============================================================================

/// Client builder.
pub mod builder;

/// Client core.
pub mod core;

/// Client options.
pub mod options;

/// Reconnect policy.
pub mod reconnect;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::ClientBuilder;
pub use core::{Client, ConnectionState};
pub use options::ClientOptions;
pub use reconnect::ReconnectPolicy;

pub(crate) use core::ClientInner;
