//! In-process transport.
//!
//! [`MemoryTransport`] hands every opened link to a [`MemoryServer`] as a
//! [`MemoryPeer`], which plays the gateway side: it reads the client's
//! requests as JSON and pushes frames back.
//!
//! ```ignore
//! let (transport, mut server) = MemoryTransport::pair();
//! let client = Client::builder().transport(transport).build()?;
//!
//! let connecting = tokio::spawn(async move { client.connect().await });
//! let mut peer = server.accept().await.expect("link");
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{Error, Result};

use super::{FrameSender, Outbound, Transport, TransportEvent, TransportLink, TransportOptions};

// ============================================================================
// MemoryTransport
// ============================================================================

/// Transport that connects to a [`MemoryServer`] in the same process.
#[derive(Debug)]
pub struct MemoryTransport {
    peers: mpsc::UnboundedSender<MemoryPeer>,
    refuse: AtomicBool,
    opened: AtomicUsize,
}

impl MemoryTransport {
    /// Creates a connected transport/server pair.
    #[must_use]
    pub fn pair() -> (Arc<Self>, MemoryServer) {
        let (peers_tx, peers_rx) = mpsc::unbounded_channel();
        let transport = Self {
            peers: peers_tx,
            refuse: AtomicBool::new(false),
            opened: AtomicUsize::new(0),
        };
        (Arc::new(transport), MemoryServer { peers: peers_rx })
    }

    /// Makes subsequent `open` calls fail (or succeed again).
    pub fn set_refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Returns the number of links opened so far.
    #[inline]
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn open(&self, url: &str, _options: &TransportOptions) -> Result<TransportLink> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(Error::connection(format!("{url}: connection refused")));
        }

        let (sender, mut outbound_rx) = FrameSender::channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();

        let peer = MemoryPeer {
            frames: frames_rx,
            events: events_tx.clone(),
        };
        self.peers
            .send(peer)
            .map_err(|_| Error::connection(format!("{url}: memory server dropped")))?;
        self.opened.fetch_add(1, Ordering::SeqCst);

        // Bridge: client frames go to the peer, a close ends the link
        tokio::spawn(async move {
            while let Some(outbound) = outbound_rx.recv().await {
                match outbound {
                    Outbound::Frame(text) => {
                        if frames_tx.send(text).is_err() {
                            debug!("Memory peer dropped");
                            break;
                        }
                    }
                    Outbound::Close => break,
                }
            }
            let _ = events_tx.send(TransportEvent::Closed);
        });

        debug!(url, "Memory link opened");

        Ok(TransportLink {
            sender,
            events: events_rx,
        })
    }
}

// ============================================================================
// MemoryServer
// ============================================================================

/// Accepting side of a [`MemoryTransport`].
#[derive(Debug)]
pub struct MemoryServer {
    peers: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryServer {
    /// Waits for the next link. Returns `None` once the transport is dropped.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.peers.recv().await
    }
}

// ============================================================================
// MemoryPeer
// ============================================================================

/// Gateway side of one memory link.
#[derive(Debug)]
pub struct MemoryPeer {
    frames: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl MemoryPeer {
    /// Receives the next request from the client.
    ///
    /// Returns `None` once the client closed the link.
    pub async fn recv(&mut self) -> Option<Value> {
        loop {
            let text = self.frames.recv().await?;
            match serde_json::from_str(&text) {
                Ok(value) => return Some(value),
                Err(e) => warn!(error = %e, "Client sent invalid JSON"),
            }
        }
    }

    /// Returns a queued request without waiting.
    pub fn try_recv(&mut self) -> Option<Value> {
        let text = self.frames.try_recv().ok()?;
        serde_json::from_str(&text).ok()
    }

    /// Pushes a frame to the client. Returns `false` if the link is gone.
    pub fn send(&self, frame: Value) -> bool {
        self.send_text(frame.to_string())
    }

    /// Pushes raw text to the client, valid JSON or not.
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.events
            .send(TransportEvent::Message(text.into()))
            .is_ok()
    }

    /// Reports a transport error to the client.
    pub fn fail(&self, message: impl Into<String>) {
        let _ = self.events.send(TransportEvent::Error(message.into()));
    }

    /// Closes the link from the gateway side.
    pub fn close(&self) {
        let _ = self.events.send(TransportEvent::Closed);
    }
}

// ============================================================================
// Tests
// ============================================================================
