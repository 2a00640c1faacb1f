//! Outgoing request message types.
//!
//! Every request is a JSON object carrying the `janus` verb, the
//! client-generated `transaction`, and optional session/handle scoping.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::identifiers::{HandleId, SessionId, TransactionId};

// ============================================================================
// Request
// ============================================================================

/// A request from the client to the gateway.
///
/// # Format
///
/// ```json
/// {
///   "janus": "message",
///   "transaction": "6f1c...",
///   "session_id": 123,
///   "handle_id": 456,
///   "body": { ... }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Request {
    /// Request verb (`create`, `attach`, `message`, ...).
    pub janus: String,

    /// Correlation ID, stamped when the transaction starts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<TransactionId>,

    /// Target session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,

    /// Target plugin handle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle_id: Option<HandleId>,

    /// Stored-token authentication.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Shared API secret authentication.
    #[serde(rename = "apisecret", skip_serializing_if = "Option::is_none")]
    pub api_secret: Option<String>,

    /// Verb-specific fields.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Request {
    /// Creates a request with the given verb and no fields.
    #[inline]
    #[must_use]
    pub fn new(verb: impl Into<String>) -> Self {
        Self {
            janus: verb.into(),
            transaction: None,
            session_id: None,
            handle_id: None,
            token: None,
            api_secret: None,
            fields: Map::new(),
        }
    }

    /// `create` - allocate a new session.
    #[inline]
    #[must_use]
    pub fn create() -> Self {
        Self::new("create")
    }

    /// `claim` - bind an existing session to this transport.
    #[inline]
    #[must_use]
    pub fn claim() -> Self {
        Self::new("claim")
    }

    /// `keepalive` - reset the session expiry clock.
    #[inline]
    #[must_use]
    pub fn keepalive() -> Self {
        Self::new("keepalive")
    }

    /// `destroy` - tear down a session.
    #[inline]
    #[must_use]
    pub fn destroy() -> Self {
        Self::new("destroy")
    }

    /// `info` - query gateway information.
    #[inline]
    #[must_use]
    pub fn info() -> Self {
        Self::new("info")
    }

    /// `attach` - attach a plugin to the session.
    #[must_use]
    pub fn attach(plugin: &str, opaque_id: Option<&str>) -> Self {
        let mut request = Self::new("attach").with_field("plugin", plugin);
        if let Some(opaque_id) = opaque_id {
            request = request.with_field("opaque_id", opaque_id);
        }
        request
    }

    /// `detach` - detach the plugin handle.
    #[inline]
    #[must_use]
    pub fn detach() -> Self {
        Self::new("detach")
    }

    /// `hangup` - tear down the handle's PeerConnection.
    #[inline]
    #[must_use]
    pub fn hangup() -> Self {
        Self::new("hangup")
    }

    /// `message` - plugin-specific body.
    #[inline]
    #[must_use]
    pub fn message(body: Value) -> Self {
        Self::new("message").with_field("body", body)
    }

    /// `message` - plugin-specific body carrying a session description.
    #[must_use]
    pub fn message_with_jsep(body: Value, jsep: &Jsep) -> Self {
        Self::message(body).with_field("jsep", json!(jsep))
    }

    /// `trickle` - a single ICE candidate.
    #[inline]
    #[must_use]
    pub fn trickle(candidate: Value) -> Self {
        Self::new("trickle").with_field("candidate", candidate)
    }

    /// `trickle` - a batch of ICE candidates.
    #[inline]
    #[must_use]
    pub fn trickles(candidates: Vec<Value>) -> Self {
        Self::new("trickle").with_field("candidates", Value::Array(candidates))
    }

    /// `trickle` - end-of-candidates marker.
    #[inline]
    #[must_use]
    pub fn trickle_completed() -> Self {
        Self::trickle(json!({ "completed": true }))
    }

    /// Adds a verb-specific field.
    #[inline]
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Scopes the request to a session.
    #[inline]
    #[must_use]
    pub fn with_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    /// Scopes the request to a plugin handle.
    #[inline]
    #[must_use]
    pub fn with_handle(mut self, handle_id: HandleId) -> Self {
        self.handle_id = Some(handle_id);
        self
    }

    /// Returns the request verb.
    #[inline]
    #[must_use]
    pub fn verb(&self) -> &str {
        &self.janus
    }

    /// Returns a verb-specific field.
    #[inline]
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

// ============================================================================
// RequestOptions
// ============================================================================

/// Per-request behavior.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Complete the request on the gateway's `ack` instead of waiting for a
    /// final response.
    pub ack: bool,

    /// Overrides the client's default request timeout. `None` keeps the
    /// default; a zero duration never expires.
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    /// Default options: wait for the final response, client timeout.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ack: false,
            timeout: None,
        }
    }

    /// Options for requests the gateway only acknowledges.
    #[inline]
    #[must_use]
    pub const fn ack_only() -> Self {
        Self {
            ack: true,
            timeout: None,
        }
    }

    /// Sets a per-request timeout.
    #[inline]
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Disables the timeout for this request, whatever the client default.
    #[inline]
    #[must_use]
    pub const fn without_timeout(mut self) -> Self {
        self.timeout = Some(Duration::ZERO);
        self
    }
}

// ============================================================================
// Jsep
// ============================================================================

/// Session description carried alongside plugin messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jsep {
    /// Offer or answer.
    #[serde(rename = "type")]
    pub kind: JsepType,

    /// Raw SDP text.
    pub sdp: String,
}

impl Jsep {
    /// Wraps an SDP offer.
    #[inline]
    #[must_use]
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: JsepType::Offer,
            sdp: sdp.into(),
        }
    }

    /// Wraps an SDP answer.
    #[inline]
    #[must_use]
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: JsepType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Session description type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JsepType {
    /// SDP offer.
    Offer,
    /// SDP answer.
    Answer,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let request = Request::message(json!({ "request": "list" }))
            .with_session(SessionId::new(1))
            .with_handle(HandleId::new(2));

        let value = serde_json::to_value(&request).expect("serialize");
        assert_eq!(
            value,
            json!({
                "janus": "message",
                "session_id": 1,
                "handle_id": 2,
                "body": { "request": "list" }
            })
        );
    }

    #[test]
    fn test_credentials_serialized() {
        let mut request = Request::info();
        request.token = Some("tok".into());
        request.api_secret = Some("secret".into());
        request.transaction = Some(TransactionId::from("t1"));

        let value = serde_json::to_value(&request).expect("serialize");
        assert_eq!(value["token"], "tok");
        assert_eq!(value["apisecret"], "secret");
        assert_eq!(value["transaction"], "t1");
    }

    #[test]
    fn test_attach_with_opaque_id() {
        let request = Request::attach("janus.plugin.videoroom", Some("room-ui"));
        assert_eq!(request.verb(), "attach");
        assert_eq!(request.field("plugin"), Some(&json!("janus.plugin.videoroom")));
        assert_eq!(request.field("opaque_id"), Some(&json!("room-ui")));

        let plain = Request::attach("janus.plugin.echotest", None);
        assert!(plain.field("opaque_id").is_none());
    }

    #[test]
    fn test_trickle_variants() {
        let completed = Request::trickle_completed();
        assert_eq!(completed.field("candidate"), Some(&json!({ "completed": true })));

        let batch = Request::trickles(vec![json!({ "candidate": "a" }), json!({ "candidate": "b" })]);
        assert_eq!(batch.field("candidates").and_then(Value::as_array).map(Vec::len), Some(2));
    }

    #[test]
    fn test_message_with_jsep() {
        let request = Request::message_with_jsep(json!({}), &Jsep::offer("v=0"));
        assert_eq!(request.field("jsep"), Some(&json!({ "type": "offer", "sdp": "v=0" })));
    }

    #[test]
    fn test_request_options() {
        assert!(!RequestOptions::new().ack);
        assert!(RequestOptions::ack_only().ack);

        let options = RequestOptions::new().with_timeout(Duration::from_secs(2));
        assert_eq!(options.timeout, Some(Duration::from_secs(2)));

        let unbounded = RequestOptions::ack_only().without_timeout();
        assert!(unbounded.ack);
        assert_eq!(unbounded.timeout, Some(Duration::ZERO));
    }
}
