//! Janus client - asynchronous signaling client for the Janus WebRTC gateway.
//!
//! This library speaks the Janus JSON signaling protocol over a persistent
//! WebSocket (`janus-protocol` subprotocol) and keeps the client-side model
//! of sessions and plugin handles in sync with the gateway.
//!
//! # Architecture
//!
//! The client is a request/response multiplexer with an event router:
//!
//! - **Requests**: every request carries a fresh `transaction` ID and is
//!   tracked until its reply, an error, a timeout, or disconnect
//! - **Events**: unsolicited frames are routed by `session_id`, then by
//!   `sender` (plugin handle ID), to listener callbacks
//! - **Liveness**: each session keeps itself alive with periodic
//!   `keepalive` requests and times out after repeated failures
//!
//! Key design principles:
//!
//! - One reader task per transport link dispatches frames in order
//! - Sessions and handles reach the transport only through the [`Client`]
//! - Listener callbacks run synchronously, in registration order
//! - Reconnect revalidates surviving sessions with `claim`
//!
//! # Quick Start
//!
//! ```no_run
//! use janus_client::{Client, Result};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     // Build a client for a local gateway
//!     let client = Client::builder()
//!         .url("ws://127.0.0.1:8188")
//!         .reconnect(true)
//!         .build()?;
//!     client.connect().await?;
//!
//!     // Open a session and attach the VideoRoom plugin
//!     let session = client.create_session().await?;
//!     let handle = session
//!         .create_plugin_handle("janus.plugin.videoroom", None)
//!         .await?;
//!
//!     // Talk to the plugin
//!     let response = handle.request_message(json!({ "request": "list" })).await?;
//!     println!("Rooms: {:?}", response.data());
//!
//!     session.destroy().await?;
//!     client.disconnect();
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | Connection root: [`Client`], [`ClientBuilder`], [`ClientOptions`] |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`handle`] | Plugin handles: [`PluginHandle`] |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`listener`] | Ordered multi-subscriber callback sets |
//! | [`plugins`] | Plugin facades: [`VideoRoomPlugin`] |
//! | [`protocol`] | Signaling frame types |
//! | [`session`] | Gateway sessions: [`Session`] |
//! | [`transaction`] | Request/response correlation |
//! | [`transport`] | WebSocket and in-memory transports |

// ============================================================================
// Modules
// ============================================================================

/// Connection root and configuration.
///
/// Use [`Client::builder()`] to create a configured client instance.
pub mod client;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Plugin handles.
///
/// A [`PluginHandle`] is one attachment to a gateway plugin.
pub mod handle;

/// Type-safe identifiers for gateway entities.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// Listener registries.
pub mod listener;

/// Plugin-specific facades.
pub mod plugins;

/// Signaling message types.
///
/// Outbound requests, inbound frames and their typed views.
pub mod protocol;

/// Gateway sessions and keepalive.
pub mod session;

/// Request/response correlation.
///
/// Tracks every in-flight request by transaction ID.
pub mod transaction;

/// Transport layer.
///
/// The [`Transport`] trait plus WebSocket and in-memory implementations.
pub mod transport;

#[cfg(test)]
mod testing;

// ============================================================================
// Re-exports
// ============================================================================

// Client types
pub use client::{Client, ClientBuilder, ClientOptions, ConnectionState, ReconnectPolicy};

// Error types
pub use error::{Error, Result};

// Handle types
pub use handle::PluginHandle;

// Identifier types
pub use identifiers::{HandleId, ListenerId, SessionId, TransactionId};

// Plugin facades
pub use plugins::{
    FeedId, RoomId, VideoRoomHandle, VideoRoomListener, VideoRoomPlugin, VideoRoomPublisher,
};

// Protocol types
pub use protocol::{
    ClientResponse, Frame, FrameKind, HandleEvent, HandleEventKind, Jsep, JsepType,
    PluginResponse, Request, RequestOptions,
};

// Session types
pub use session::{Session, SessionState};

// Transaction types
pub use transaction::{Transaction, TransactionState};

// Transport types
pub use transport::{Transport, TransportOptions, WebSocketTransport};
