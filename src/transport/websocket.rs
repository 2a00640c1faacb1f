//! WebSocket transport.
//!
//! Connects to the gateway's WebSocket endpoint using the `janus-protocol`
//! sub-protocol and runs one event loop task per link.
//!
//! # Event Loop
//!
//! The spawned task handles:
//!
//! - Incoming text messages, forwarded as [`TransportEvent::Message`]
//! - Outgoing frames queued through the [`FrameSender`]
//! - Close from either side, reported once as [`TransportEvent::Closed`]

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, trace, warn};

use crate::error::{Error, Result};

use super::{FrameSender, Outbound, Transport, TransportEvent, TransportLink, TransportOptions};

// ============================================================================
// Constants
// ============================================================================

/// WebSocket sub-protocol spoken by the gateway.
pub const JANUS_PROTOCOL: &str = "janus-protocol";

// ============================================================================
// Types
// ============================================================================

/// Client-side WebSocket stream.
type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ============================================================================
// WebSocketTransport
// ============================================================================

/// Transport over a WebSocket connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    /// Creates a WebSocket transport.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self, url: &str, options: &TransportOptions) -> Result<TransportLink> {
        let mut request = url.into_client_request()?;
        request
            .headers_mut()
            .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(JANUS_PROTOCOL));

        let handshake = connect_async(request);
        let (ws_stream, _response) = match options.handshake_timeout.filter(|limit| !limit.is_zero()) {
            Some(limit) => timeout(limit, handshake)
                .await
                .map_err(|_| Error::connection_timeout(limit.as_millis() as u64))?
                .map_err(|e| Error::connection(format!("WebSocket handshake failed: {e}")))?,
            None => handshake
                .await
                .map_err(|e| Error::connection(format!("WebSocket handshake failed: {e}")))?,
        };

        info!(url, "WebSocket connection established");

        let (sender, outbound_rx) = FrameSender::channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        tokio::spawn(run_event_loop(ws_stream, outbound_rx, events_tx));

        Ok(TransportLink {
            sender,
            events: events_rx,
        })
    }
}

// ============================================================================
// Event Loop
// ============================================================================

/// Event loop that handles WebSocket I/O for one link.
async fn run_event_loop(
    ws_stream: WsStream,
    mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
) {
    let (mut ws_write, mut ws_read) = ws_stream.split();

    loop {
        tokio::select! {
            // Incoming messages from the gateway
            message = ws_read.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        if events_tx.send(TransportEvent::Message(text.as_str().to_owned())).is_err() {
                            debug!("Event receiver dropped");
                            break;
                        }
                    }

                    Some(Ok(Message::Close(_))) => {
                        debug!("WebSocket closed by remote");
                        break;
                    }

                    Some(Err(e)) => {
                        error!(error = %e, "WebSocket error");
                        let _ = events_tx.send(TransportEvent::Error(e.to_string()));
                        break;
                    }

                    None => {
                        debug!("WebSocket stream ended");
                        break;
                    }

                    // Ignore Binary, Ping, Pong, Frame
                    _ => {}
                }
            }

            // Frames from the client
            outbound = outbound_rx.recv() => {
                match outbound {
                    Some(Outbound::Frame(json)) => {
                        if let Err(e) = ws_write.send(Message::Text(json.into())).await {
                            warn!(error = %e, "Failed to send frame");
                            let _ = events_tx.send(TransportEvent::Error(e.to_string()));
                            break;
                        }
                        trace!("Frame sent");
                    }

                    Some(Outbound::Close) | None => {
                        debug!("Closing WebSocket");
                        let _ = ws_write.close().await;
                        break;
                    }
                }
            }
        }
    }

    let _ = events_tx.send(TransportEvent::Closed);
    debug!("Event loop terminated");
}

// ============================================================================
// Tests
// ============================================================================
