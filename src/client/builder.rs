//! Builder pattern for client configuration.
//!
//! Provides a fluent API for configuring and creating [`Client`] instances.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use janus_client::Client;
//!
//! # fn example() -> janus_client::Result<()> {
//! let client = Client::builder()
//!     .url("ws://127.0.0.1:8188")
//!     .request_timeout(Duration::from_secs(5))
//!     .reconnect(true)
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};
use crate::transport::{Transport, WebSocketTransport};

use super::core::Client;
use super::options::ClientOptions;
use super::reconnect::ReconnectPolicy;

// ============================================================================
// ClientBuilder
// ============================================================================

/// Builder for configuring a [`Client`] instance.
///
/// Use [`Client::builder()`] to create a new builder.
#[derive(Default, Clone)]
pub struct ClientBuilder {
    /// Client configuration.
    options: ClientOptions,
    /// Custom transport. Defaults to [`WebSocketTransport`].
    transport: Option<Arc<dyn Transport>>,
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("options", &self.options)
            .field("custom_transport", &self.transport.is_some())
            .finish()
    }
}

// ============================================================================
// ClientBuilder Implementation
// ============================================================================

impl ClientBuilder {
    /// Creates a builder with default options.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces every option at once.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the gateway URL.
    #[inline]
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.options.url = url.into();
        self
    }

    /// Sets the default request deadline. `None` never expires.
    #[inline]
    #[must_use]
    pub fn request_timeout(mut self, timeout: impl Into<Option<Duration>>) -> Self {
        self.options.request_timeout = timeout.into();
        self
    }

    /// Sets the transport open deadline. `None` never expires.
    #[inline]
    #[must_use]
    pub fn connection_timeout(mut self, timeout: impl Into<Option<Duration>>) -> Self {
        self.options.connection_timeout = timeout.into();
        self
    }

    /// Sets the handshake deadline. `None` never expires.
    #[inline]
    #[must_use]
    pub fn handshake_timeout(mut self, timeout: impl Into<Option<Duration>>) -> Self {
        self.options.handshake_timeout = timeout.into();
        self
    }

    /// Enables or disables automatic reconnect.
    #[inline]
    #[must_use]
    pub fn reconnect(mut self, reconnect: bool) -> Self {
        self.options.reconnect = reconnect;
        self
    }

    /// Sets the reconnect policy.
    #[inline]
    #[must_use]
    pub fn reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.options.reconnect_policy = policy;
        self
    }

    /// Sets the token stamped on every request.
    #[inline]
    #[must_use]
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.options.token = Some(token.into());
        self
    }

    /// Sets the API secret stamped on every request.
    #[inline]
    #[must_use]
    pub fn api_secret(mut self, secret: impl Into<String>) -> Self {
        self.options.api_secret = Some(secret.into());
        self
    }

    /// Sets the keepalive period.
    #[inline]
    #[must_use]
    pub fn keepalive_interval(mut self, interval: Duration) -> Self {
        self.options.keepalive_interval = interval;
        self
    }

    /// Sets how many consecutive keepalive failures time a session out.
    #[inline]
    #[must_use]
    pub fn keepalive_max_failures(mut self, failures: u32) -> Self {
        self.options.keepalive_max_failures = failures;
        self
    }

    /// Uses a custom transport instead of WebSocket.
    #[inline]
    #[must_use]
    pub fn transport<T: Transport>(mut self, transport: Arc<T>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Builds the client with validation. The client starts disconnected.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the URL does not parse
    /// - [`Error::Config`] if the WebSocket transport gets a non `ws`/`wss` URL
    /// - [`Error::Config`] if the keepalive settings are zero
    pub fn build(self) -> Result<Client> {
        self.validate_url()?;
        self.validate_keepalive()?;

        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(WebSocketTransport::new()));

        Ok(Client::new(self.options, transport))
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ClientBuilder {
    /// Validates the gateway URL.
    fn validate_url(&self) -> Result<()> {
        let url = Url::parse(&self.options.url).map_err(|e| {
            Error::config(format!(
                "Invalid gateway URL '{}': {e}\n\
                 Example: Client::builder().url(\"ws://127.0.0.1:8188\")",
                self.options.url
            ))
        })?;

        // Custom transports may use any scheme
        if self.transport.is_none() && !matches!(url.scheme(), "ws" | "wss") {
            return Err(Error::config(format!(
                "WebSocket transport requires a ws:// or wss:// URL, got '{}'",
                self.options.url
            )));
        }

        Ok(())
    }

    /// Validates the keepalive configuration.
    fn validate_keepalive(&self) -> Result<()> {
        if self.options.keepalive_interval.is_zero() {
            return Err(Error::config("Keepalive interval must be greater than zero"));
        }
        if self.options.keepalive_max_failures == 0 {
            return Err(Error::config("Keepalive max failures must be at least 1"));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::transport::MemoryTransport;

    #[test]
    fn test_new_uses_defaults() {
        let builder = ClientBuilder::new();
        assert_eq!(builder.options, ClientOptions::default());
        assert!(builder.transport.is_none());
    }

    #[test]
    fn test_setters() {
        let builder = ClientBuilder::new()
            .url("wss://janus.example.com")
            .request_timeout(Duration::from_secs(3))
            .connection_timeout(None)
            .token("tok")
            .keepalive_max_failures(4);

        assert_eq!(builder.options.url, "wss://janus.example.com");
        assert_eq!(builder.options.request_timeout, Some(Duration::from_secs(3)));
        assert_eq!(builder.options.connection_timeout, None);
        assert_eq!(builder.options.token.as_deref(), Some("tok"));
        assert_eq!(builder.options.keepalive_max_failures, 4);
    }

    #[tokio::test]
    async fn test_build_default_is_disconnected() {
        let client = ClientBuilder::new().build().expect("client");
        assert!(!client.is_connected());
        assert_eq!(client.session_count(), 0);
    }

    #[test]
    fn test_invalid_url_rejected() {
        let result = ClientBuilder::new().url("not a url").build();
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_http_scheme_rejected_for_websocket() {
        let result = ClientBuilder::new().url("http://127.0.0.1:8088/janus").build();
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_custom_transport_accepts_any_scheme() {
        let (transport, _server) = MemoryTransport::pair();
        let result = ClientBuilder::new()
            .url("memory://gateway")
            .transport(transport)
            .build();
        assert!(result.is_ok());
    }

    #[test]
    fn test_zero_keepalive_rejected() {
        let result = ClientBuilder::new()
            .keepalive_interval(Duration::ZERO)
            .build();
        assert!(matches!(result, Err(Error::Config { .. })));

        let result = ClientBuilder::new().keepalive_max_failures(0).build();
        assert!(matches!(result, Err(Error::Config { .. })));
    }
}
