//! Error types for the Janus client.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use janus_client::{Result, Error};
//!
//! async fn example(client: &Client) -> Result<()> {
//!     let session = client.create_session().await?;
//!     session.destroy().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Transport | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`], [`Error::WebSocket`] |
//! | Protocol | [`Error::Server`], [`Error::Plugin`], [`Error::Protocol`] |
//! | Timeout | [`Error::RequestTimeout`] |
//! | State | [`Error::NotConnected`], [`Error::SessionNotFound`], [`Error::SessionNotAlive`], [`Error::HandleDisposed`] |
//! | External | [`Error::Json`], [`Error::ChannelClosed`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::client::ConnectionState;
use crate::identifiers::{HandleId, SessionId, TransactionId};
use crate::session::SessionState;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when client configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// Transport connection failed.
    ///
    /// Returned when the transport cannot be opened or reports a failure.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Connection timeout.
    ///
    /// Returned when the transport does not open within the configured window.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Connection closed while a request was in flight.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// The gateway answered a request with an `error` frame.
    #[error("Server error {code}: {reason}")]
    Server {
        /// Janus error code.
        code: i64,
        /// Human-readable reason supplied by the gateway.
        reason: String,
    },

    /// A plugin reported an error inside its `plugindata` payload.
    #[error("Plugin error {code}: {reason}")]
    Plugin {
        /// Plugin-specific error code.
        code: i64,
        /// Human-readable reason supplied by the plugin.
        reason: String,
    },

    /// Protocol violation or unexpected response shape.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // Timeout Errors
    // ========================================================================
    /// No response arrived for a transaction before its deadline.
    #[error("Transaction {transaction} timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// The transaction that timed out.
        transaction: TransactionId,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // State Errors
    // ========================================================================
    /// Request issued while the client is not connected.
    #[error("Not connected (state: {state})")]
    NotConnected {
        /// Connection state at the time of the request.
        state: ConnectionState,
    },

    /// Session is not registered with this client.
    #[error("Session not found: {session_id}")]
    SessionNotFound {
        /// The missing session ID.
        session_id: SessionId,
    },

    /// Request issued through a session that is no longer alive.
    #[error("Session {session_id} is {state}")]
    SessionNotAlive {
        /// The session ID.
        session_id: SessionId,
        /// Current session state.
        state: SessionState,
    },

    /// Request issued through a disposed plugin handle.
    #[error("Handle disposed: {handle_id}")]
    HandleDisposed {
        /// The disposed handle ID.
        handle_id: HandleId,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// Channel receive error.
    #[error("Channel closed")]
    ChannelClosed(#[from] RecvError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a server error from a Janus `error` frame.
    #[inline]
    pub fn server(code: i64, reason: impl Into<String>) -> Self {
        Self::Server {
            code,
            reason: reason.into(),
        }
    }

    /// Creates a plugin error.
    #[inline]
    pub fn plugin(code: i64, reason: impl Into<String>) -> Self {
        Self::Plugin {
            code,
            reason: reason.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(transaction: TransactionId, timeout_ms: u64) -> Self {
        Self::RequestTimeout {
            transaction,
            timeout_ms,
        }
    }

    /// Creates a not connected error.
    #[inline]
    pub fn not_connected(state: ConnectionState) -> Self {
        Self::NotConnected { state }
    }

    /// Creates a session not found error.
    #[inline]
    pub fn session_not_found(session_id: SessionId) -> Self {
        Self::SessionNotFound { session_id }
    }

    /// Creates a session not alive error.
    #[inline]
    pub fn session_not_alive(session_id: SessionId, state: SessionState) -> Self {
        Self::SessionNotAlive { session_id, state }
    }

    /// Creates a handle disposed error.
    #[inline]
    pub fn handle_disposed(handle_id: HandleId) -> Self {
        Self::HandleDisposed { handle_id }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. } | Self::RequestTimeout { .. }
        )
    }

    /// Returns `true` if this is a transport-level error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::NotConnected { .. }
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if the gateway or a plugin rejected the request.
    #[inline]
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::Server { .. } | Self::Plugin { .. })
    }

    /// Returns `true` if the request failed a local state check
    /// without touching the network.
    #[inline]
    #[must_use]
    pub fn is_state_error(&self) -> bool {
        matches!(
            self,
            Self::NotConnected { .. }
                | Self::SessionNotFound { .. }
                | Self::SessionNotAlive { .. }
                | Self::HandleDisposed { .. }
        )
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed on retry.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. }
                | Self::RequestTimeout { .. }
                | Self::ConnectionClosed
                | Self::NotConnected { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
