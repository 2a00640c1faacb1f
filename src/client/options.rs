//! Client configuration.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use janus_client::ClientOptions;
//!
//! let options = ClientOptions::new("ws://127.0.0.1:8188")
//!     .with_request_timeout(Duration::from_secs(5))
//!     .with_reconnect(true)
//!     .with_token("secret-token");
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use super::reconnect::ReconnectPolicy;

// ============================================================================
// Constants
// ============================================================================

/// Default gateway URL.
pub const DEFAULT_URL: &str = "ws://127.0.0.1:8188";

/// Default deadline for a request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default deadline for opening the transport.
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Default deadline for the WebSocket handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default keepalive period. Janus expires idle sessions after 60 seconds.
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(25);

/// Consecutive keepalive failures before a session times out.
pub const DEFAULT_KEEPALIVE_MAX_FAILURES: u32 = 3;

// ============================================================================
// ClientOptions
// ============================================================================

/// Client configuration.
///
/// Every timeout is optional; `None` means never expire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// Gateway URL.
    pub url: String,

    /// Default deadline for requests.
    pub request_timeout: Option<Duration>,

    /// Deadline for opening the transport.
    pub connection_timeout: Option<Duration>,

    /// Deadline for the protocol handshake, passed to the transport.
    pub handshake_timeout: Option<Duration>,

    /// Reconnect automatically after the connection drops.
    pub reconnect: bool,

    /// Attempt bound and backoff schedule for reconnects.
    pub reconnect_policy: ReconnectPolicy,

    /// Token stamped on every request.
    pub token: Option<String>,

    /// API secret stamped on every request.
    pub api_secret: Option<String>,

    /// Period between session keepalive pings.
    pub keepalive_interval: Duration,

    /// Consecutive keepalive failures before a session times out.
    pub keepalive_max_failures: u32,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::new(DEFAULT_URL)
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl ClientOptions {
    /// Creates options for `url` with default settings.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            request_timeout: Some(DEFAULT_REQUEST_TIMEOUT),
            connection_timeout: Some(DEFAULT_CONNECTION_TIMEOUT),
            handshake_timeout: Some(DEFAULT_HANDSHAKE_TIMEOUT),
            reconnect: false,
            reconnect_policy: ReconnectPolicy::default(),
            token: None,
            api_secret: None,
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
            keepalive_max_failures: DEFAULT_KEEPALIVE_MAX_FAILURES,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ClientOptions {
    /// Sets the gateway URL.
    #[inline]
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Sets the default request deadline.
    #[inline]
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Sets the transport open deadline.
    #[inline]
    #[must_use]
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = Some(timeout);
        self
    }

    /// Sets the handshake deadline.
    #[inline]
    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = Some(timeout);
        self
    }

    /// Disables every deadline.
    #[inline]
    #[must_use]
    pub fn without_timeouts(mut self) -> Self {
        self.request_timeout = None;
        self.connection_timeout = None;
        self.handshake_timeout = None;
        self
    }

    /// Enables or disables automatic reconnect.
    #[inline]
    #[must_use]
    pub fn with_reconnect(mut self, reconnect: bool) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Sets the reconnect policy.
    #[inline]
    #[must_use]
    pub fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect_policy = policy;
        self
    }

    /// Sets the token stamped on every request.
    #[inline]
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Sets the API secret stamped on every request.
    #[inline]
    #[must_use]
    pub fn with_api_secret(mut self, secret: impl Into<String>) -> Self {
        self.api_secret = Some(secret.into());
        self
    }

    /// Sets the keepalive period.
    #[inline]
    #[must_use]
    pub fn with_keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }

    /// Sets how many consecutive keepalive failures time a session out.
    #[inline]
    #[must_use]
    pub fn with_keepalive_max_failures(mut self, failures: u32) -> Self {
        self.keepalive_max_failures = failures;
        self
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ClientOptions::default();

        assert_eq!(options.url, DEFAULT_URL);
        assert_eq!(options.request_timeout, Some(DEFAULT_REQUEST_TIMEOUT));
        assert_eq!(options.keepalive_interval, Duration::from_secs(25));
        assert_eq!(options.keepalive_max_failures, 3);
        assert!(!options.reconnect);
        assert!(options.token.is_none());
    }

    #[test]
    fn test_builder_chain() {
        let options = ClientOptions::new("wss://janus.example.com/ws")
            .with_request_timeout(Duration::from_millis(500))
            .with_reconnect(true)
            .with_token("t")
            .with_api_secret("s")
            .with_keepalive_max_failures(5);

        assert_eq!(options.url, "wss://janus.example.com/ws");
        assert_eq!(options.request_timeout, Some(Duration::from_millis(500)));
        assert!(options.reconnect);
        assert_eq!(options.token.as_deref(), Some("t"));
        assert_eq!(options.api_secret.as_deref(), Some("s"));
        assert_eq!(options.keepalive_max_failures, 5);
    }

    #[test]
    fn test_without_timeouts() {
        let options = ClientOptions::default().without_timeouts();

        assert!(options.request_timeout.is_none());
        assert!(options.connection_timeout.is_none());
        assert!(options.handshake_timeout.is_none());
    }
}
