//! Inbound frames and response envelopes.
//!
//! Every gateway message is a [`Frame`]. Frames that settle a transaction
//! are surfaced to callers as [`ClientResponse`] (or [`PluginResponse`] for
//! plugin messages).

// ============================================================================
// Imports
// ============================================================================

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::{HandleId, SessionId, TransactionId};

use super::{Jsep, Request};

// ============================================================================
// FrameKind
// ============================================================================

/// Frame discriminant (the `janus` field).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameKind {
    /// Early acknowledgment of a request.
    Ack,
    /// Synchronous success.
    Success,
    /// Request failed.
    Error,
    /// Plugin or session event.
    Event,
    /// PeerConnection is up.
    WebrtcUp,
    /// Media started or stopped flowing.
    Media,
    /// Lossy link reported by the gateway.
    SlowLink,
    /// PeerConnection closed.
    Hangup,
    /// Handle detached by the gateway.
    Detached,
    /// Trickled ICE candidate from the gateway.
    Trickle,
    /// Session expired on the gateway.
    Timeout,
    /// Reply to `info`.
    #[serde(rename = "server_info")]
    ServerInfo,
    /// Anything this client does not know about.
    #[serde(other)]
    Other,
}

impl FrameKind {
    /// Returns `true` for frames that answer a request rather than announce
    /// something. Unmatched frames of these kinds are strays.
    #[inline]
    #[must_use]
    pub fn is_response(self) -> bool {
        matches!(
            self,
            Self::Ack | Self::Success | Self::Error | Self::ServerInfo
        )
    }
}

// ============================================================================
// Frame
// ============================================================================

/// A parsed inbound message.
///
/// The routing header is decoded eagerly; everything else stays available
/// through [`Frame::raw`].
#[derive(Debug, Clone, Deserialize)]
pub struct Frame {
    /// Discriminant.
    pub janus: FrameKind,

    /// Correlation ID of the request this frame answers.
    #[serde(default)]
    pub transaction: Option<TransactionId>,

    /// Session the frame is scoped to.
    #[serde(default)]
    pub session_id: Option<SessionId>,

    /// Handle that emitted the frame.
    #[serde(default)]
    pub sender: Option<HandleId>,

    /// The complete message.
    #[serde(skip)]
    raw: Value,
}

impl Frame {
    /// Decodes a frame from a JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the routing header is malformed.
    pub fn parse(raw: Value) -> Result<Self> {
        let mut frame: Self = serde_json::from_value(raw.clone())?;
        frame.raw = raw;
        Ok(frame)
    }

    /// Returns the complete message.
    #[inline]
    #[must_use]
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Returns a top-level field.
    #[inline]
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.raw.get(key)
    }

    /// Returns the `janus` field as sent, including unknown kinds.
    #[inline]
    #[must_use]
    pub fn kind_name(&self) -> &str {
        self.get_str("janus").unwrap_or_default()
    }

    /// Returns the `data` field (`create`/`attach` results).
    #[inline]
    #[must_use]
    pub fn data(&self) -> Option<&Value> {
        self.get("data")
    }

    /// Returns the `plugindata` envelope.
    #[inline]
    #[must_use]
    pub fn plugin_data(&self) -> Option<&Value> {
        self.get("plugindata")
    }

    /// Returns the session description attached to the frame.
    #[must_use]
    pub fn jsep(&self) -> Option<Jsep> {
        self.get("jsep")
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    /// Returns `(code, reason)` from an `error` frame.
    #[must_use]
    pub fn server_error(&self) -> Option<(i64, String)> {
        let error = self.get("error")?;
        let code = error.get("code").and_then(Value::as_i64).unwrap_or_default();
        let reason = error
            .get("reason")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        Some((code, reason))
    }

    /// Converts an `error` frame into a typed error.
    #[must_use]
    pub fn to_error(&self) -> Error {
        match self.server_error() {
            Some((code, reason)) => Error::server(code, reason),
            None => Error::protocol(format!("error frame without details: {}", self.raw)),
        }
    }

    /// Gets a string field.
    #[inline]
    pub(crate) fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Gets a boolean field.
    #[inline]
    pub(crate) fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    /// Gets an unsigned integer field.
    #[inline]
    pub(crate) fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(Value::as_u64)
    }
}

// ============================================================================
// ClientResponse
// ============================================================================

/// The frame that settled a transaction, paired with the request.
#[derive(Debug, Clone)]
pub struct ClientResponse {
    request: Request,
    response: Frame,
}

impl ClientResponse {
    /// Pairs a request with the frame that answered it.
    #[inline]
    #[must_use]
    pub fn new(request: Request, response: Frame) -> Self {
        Self { request, response }
    }

    /// Returns the original request.
    #[inline]
    #[must_use]
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Returns the response frame.
    #[inline]
    #[must_use]
    pub fn response(&self) -> &Frame {
        &self.response
    }

    /// Returns the response kind.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> FrameKind {
        self.response.janus
    }

    /// Returns the session description in the response.
    #[inline]
    #[must_use]
    pub fn jsep(&self) -> Option<Jsep> {
        self.response.jsep()
    }

    /// Returns the `data` field of the response.
    #[inline]
    #[must_use]
    pub fn data(&self) -> Option<&Value> {
        self.response.data()
    }

    /// Returns `true` if the gateway answered with `error`.
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.response.janus == FrameKind::Error
    }

    /// Returns `true` if the request settled on its `ack`.
    #[inline]
    #[must_use]
    pub fn is_ack(&self) -> bool {
        self.response.janus == FrameKind::Ack
    }

    /// Returns `true` for a final, non-error answer.
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        !self.is_error() && !self.is_ack()
    }

    /// Extracts the numeric `data.id` returned by `create` and `attach`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the field is missing.
    pub fn data_id(&self) -> Result<u64> {
        self.data()
            .and_then(|data| data.get("id"))
            .and_then(|id| match id {
                Value::Number(number) => number.as_u64(),
                Value::String(text) => text.parse().ok(),
                _ => None,
            })
            .ok_or_else(|| {
                Error::protocol(format!(
                    "'{}' response without data.id",
                    self.request.verb()
                ))
            })
    }
}

// ============================================================================
// PluginResponse
// ============================================================================

/// A response to a plugin `message`, with the `plugindata` envelope
/// unwrapped.
///
/// # Format
///
/// ```json
/// {
///   "janus": "success",
///   "sender": 456,
///   "plugindata": {
///     "plugin": "janus.plugin.videoroom",
///     "data": { "videoroom": "created", "room": 1234 }
///   }
/// }
/// ```
#[derive(Debug, Clone)]
pub struct PluginResponse {
    inner: ClientResponse,
}

impl PluginResponse {
    /// Wraps a client response.
    #[inline]
    #[must_use]
    pub fn new(inner: ClientResponse) -> Self {
        Self { inner }
    }

    /// Returns the plugin package name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.inner
            .response()
            .plugin_data()
            .and_then(|plugindata| plugindata.get("plugin"))
            .and_then(Value::as_str)
    }

    /// Returns the plugin's own payload (`plugindata.data`).
    #[inline]
    #[must_use]
    pub fn data(&self) -> Option<&Value> {
        self.inner
            .response()
            .plugin_data()
            .and_then(|plugindata| plugindata.get("data"))
    }

    /// Returns `(error_code, error)` if the plugin reported a failure.
    #[must_use]
    pub fn plugin_error(&self) -> Option<(i64, String)> {
        let data = self.data()?;
        let code = data.get("error_code").and_then(Value::as_i64);
        let reason = data.get("error").and_then(Value::as_str);
        match (code, reason) {
            (None, None) => None,
            (code, reason) => Some((
                code.unwrap_or_default(),
                reason.unwrap_or("unknown plugin error").to_string(),
            )),
        }
    }

    /// Returns `true` if the gateway or the plugin reported an error.
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.inner.is_error() || self.plugin_error().is_some()
    }

    /// Returns `true` if the message settled on its `ack`.
    #[inline]
    #[must_use]
    pub fn is_ack(&self) -> bool {
        self.inner.is_ack()
    }

    /// Returns `true` for a final, non-error answer.
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        !self.is_error() && !self.is_ack()
    }

    /// Returns the session description in the response.
    #[inline]
    #[must_use]
    pub fn jsep(&self) -> Option<Jsep> {
        self.inner.jsep()
    }

    /// Returns the underlying client response.
    #[inline]
    #[must_use]
    pub fn response(&self) -> &ClientResponse {
        &self.inner
    }

    /// Converts a plugin-level failure into [`Error::Plugin`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Plugin`] if `plugindata.data` carries an error.
    pub fn into_result(self) -> Result<Self> {
        match self.plugin_error() {
            Some((code, reason)) => Err(Error::plugin(code, reason)),
            None => Ok(self),
        }
    }
}

impl From<ClientResponse> for PluginResponse {
    #[inline]
    fn from(inner: ClientResponse) -> Self {
        Self::new(inner)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    fn frame(value: Value) -> Frame {
        Frame::parse(value).expect("parse frame")
    }

    #[test]
    fn test_frame_header() {
        let frame = frame(json!({
            "janus": "event",
            "session_id": 123,
            "sender": 456,
            "transaction": "abc",
            "plugindata": { "plugin": "janus.plugin.echotest", "data": {} }
        }));

        assert_eq!(frame.janus, FrameKind::Event);
        assert_eq!(frame.session_id, Some(SessionId::new(123)));
        assert_eq!(frame.sender, Some(HandleId::new(456)));
        assert_eq!(frame.transaction, Some(TransactionId::from("abc")));
        assert_eq!(frame.kind_name(), "event");
    }

    #[test]
    fn test_unknown_kind_parses() {
        let frame = frame(json!({ "janus": "brand_new_thing" }));
        assert_eq!(frame.janus, FrameKind::Other);
        assert_eq!(frame.kind_name(), "brand_new_thing");
        assert!(!frame.janus.is_response());
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(frame(json!({ "janus": "webrtcup" })).janus, FrameKind::WebrtcUp);
        assert_eq!(frame(json!({ "janus": "slowlink" })).janus, FrameKind::SlowLink);
        assert_eq!(frame(json!({ "janus": "server_info" })).janus, FrameKind::ServerInfo);
    }

    #[test]
    fn test_missing_discriminant_rejected() {
        assert!(Frame::parse(json!({ "transaction": "abc" })).is_err());
    }

    #[test]
    fn test_server_error() {
        let frame = frame(json!({
            "janus": "error",
            "transaction": "abc",
            "error": { "code": 458, "reason": "No such session 1" }
        }));

        assert_eq!(frame.server_error(), Some((458, "No such session 1".to_string())));
        assert!(matches!(frame.to_error(), Error::Server { code: 458, .. }));
    }

    #[test]
    fn test_client_response_data_id() {
        let response = ClientResponse::new(
            Request::create(),
            frame(json!({ "janus": "success", "data": { "id": 99 } })),
        );

        assert!(response.is_success());
        assert_eq!(response.data_id().expect("id"), 99);
    }

    #[test]
    fn test_client_response_missing_id() {
        let response = ClientResponse::new(Request::create(), frame(json!({ "janus": "success" })));
        assert!(matches!(response.data_id(), Err(Error::Protocol { .. })));
    }

    #[test]
    fn test_plugin_response_unwraps_data() {
        let response = PluginResponse::new(ClientResponse::new(
            Request::message(json!({ "request": "exists", "room": 1 })),
            frame(json!({
                "janus": "success",
                "plugindata": {
                    "plugin": "janus.plugin.videoroom",
                    "data": { "videoroom": "success", "exists": true }
                }
            })),
        ));

        assert_eq!(response.name(), Some("janus.plugin.videoroom"));
        assert_eq!(response.data(), Some(&json!({ "videoroom": "success", "exists": true })));
        assert!(response.is_success());
    }

    #[test]
    fn test_plugin_error_classification() {
        let response = PluginResponse::new(ClientResponse::new(
            Request::message(json!({ "request": "join" })),
            frame(json!({
                "janus": "event",
                "plugindata": {
                    "plugin": "janus.plugin.videoroom",
                    "data": { "videoroom": "event", "error_code": 426, "error": "No such room" }
                }
            })),
        ));

        assert!(response.is_error());
        assert!(!response.is_success());
        assert!(matches!(
            response.into_result(),
            Err(Error::Plugin { code: 426, .. })
        ));
    }

    #[test]
    fn test_jsep_extraction() {
        let frame = frame(json!({
            "janus": "event",
            "jsep": { "type": "answer", "sdp": "v=0" }
        }));
        assert_eq!(frame.jsep(), Some(Jsep::answer("v=0")));
    }
}
