//! Message transport layer.
//!
//! The client core never touches sockets. It talks to a [`Transport`], which
//! opens a [`TransportLink`]: an outbound [`FrameSender`] plus an inbound
//! stream of [`TransportEvent`]s. Each link delivers whole JSON messages in
//! order; reassembly and framing are the transport's concern.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐   FrameSender    ┌─────────────────┐              ┌─────────┐
//! │     Client      │─────────────────►│  Transport task │◄────────────►│  Janus  │
//! │  (dispatch)     │◄─────────────────│  (event loop)   │   WebSocket  │ gateway │
//! └─────────────────┘  TransportEvent  └─────────────────┘              └─────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `memory` | In-process transport for tests and embedding |
//! | `websocket` | WebSocket transport (`janus-protocol`) |

// ============================================================================
// Submodules
// ============================================================================

/// In-process transport.
pub mod memory;

/// WebSocket transport.
pub mod websocket;

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{Error, Result};

// ============================================================================
// Re-exports
// ============================================================================

pub use memory::{MemoryPeer, MemoryServer, MemoryTransport};
pub use websocket::WebSocketTransport;

// ============================================================================
// Transport
// ============================================================================

/// Opens links to a gateway.
///
/// Implementations spawn whatever I/O task they need and return a
/// [`TransportLink`]. A link reports exactly one [`TransportEvent::Closed`]
/// when it ends, whoever closed it.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Opens a new link to `url`.
    ///
    /// # Errors
    ///
    /// Returns a connection error if the link cannot be established.
    async fn open(&self, url: &str, options: &TransportOptions) -> Result<TransportLink>;
}

/// Settings passed to [`Transport::open`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportOptions {
    /// Upper bound for the protocol handshake. `None` waits forever.
    pub handshake_timeout: Option<Duration>,
}

// ============================================================================
// TransportLink
// ============================================================================

/// An open link: outbound sender plus inbound events.
#[derive(Debug)]
pub struct TransportLink {
    /// Sends frames to the gateway.
    pub sender: FrameSender,
    /// Messages and lifecycle notifications from the gateway.
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Inbound notification from a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A complete text message.
    Message(String),
    /// A non-fatal or fatal transport error. `Closed` follows if fatal.
    Error(String),
    /// The link is gone.
    Closed,
}

/// Outbound instruction to a link's I/O task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Send a serialized frame.
    Frame(String),
    /// Close the link.
    Close,
}

// ============================================================================
// FrameSender
// ============================================================================

/// Cloneable sending half of a link.
#[derive(Debug, Clone)]
pub struct FrameSender {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl FrameSender {
    /// Creates a sender and the receiver its I/O task should drain.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queues a serialized frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the I/O task has stopped.
    pub fn send(&self, frame: String) -> Result<()> {
        self.tx
            .send(Outbound::Frame(frame))
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Asks the I/O task to close the link.
    pub fn close(&self) {
        let _ = self.tx.send(Outbound::Close);
    }

    /// Returns `true` if the I/O task has stopped.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_sender_queues() {
        let (sender, mut rx) = FrameSender::channel();
        sender.send("{}".into()).expect("queued");
        sender.close();

        assert_eq!(rx.try_recv().ok(), Some(Outbound::Frame("{}".into())));
        assert_eq!(rx.try_recv().ok(), Some(Outbound::Close));
    }

    #[test]
    fn test_frame_sender_after_drop() {
        let (sender, rx) = FrameSender::channel();
        drop(rx);

        assert!(sender.is_closed());
        assert!(matches!(sender.send("{}".into()), Err(Error::ConnectionClosed)));
    }
}
