//! Plugin handles.
//!
//! A [`PluginHandle`] is one attachment to a gateway plugin inside a
//! [`Session`]. Requests go out through the session; events addressed to
//! the handle (`sender` equal to its ID) are classified and fanned out to
//! typed listener sets.
//!
//! # Events
//!
//! | Listener | Fired on | Side effect |
//! |----------|----------|-------------|
//! | `on_webrtc_up` | `webrtcup` | connected |
//! | `on_media` | `media` | |
//! | `on_slow_link` | `slowlink` | |
//! | `on_hangup` | `hangup` | disconnected |
//! | `on_detached` | `detached` | disposed after listeners run |
//! | `on_trickle` | `trickle` | |
//! | `on_event` | `event` and unknown kinds | |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::{HandleId, ListenerId};
use crate::listener::Listeners;
use crate::protocol::{
    ClientResponse, Frame, HandleEvent, HandleEventKind, Jsep, PluginResponse, Request,
    RequestOptions,
};
use crate::session::{Session, SessionInner};

// ============================================================================
// PluginHandle
// ============================================================================

/// An attachment to a gateway plugin.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct PluginHandle {
    pub(crate) inner: Arc<HandleInner>,
}

/// Shared handle state.
pub(crate) struct HandleInner {
    id: HandleId,
    plugin: String,
    opaque_id: Option<String>,
    session: Weak<SessionInner>,
    connected: AtomicBool,
    disposed: AtomicBool,

    on_webrtc_up: Listeners<HandleEvent>,
    on_media: Listeners<HandleEvent>,
    on_slow_link: Listeners<HandleEvent>,
    on_hangup: Listeners<HandleEvent>,
    on_detached: Listeners<HandleEvent>,
    on_trickle: Listeners<HandleEvent>,
    on_event: Listeners<HandleEvent>,
}

impl fmt::Debug for PluginHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginHandle")
            .field("id", &self.inner.id)
            .field("plugin", &self.inner.plugin)
            .field("connected", &self.is_connected())
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// PluginHandle - Construction
// ============================================================================

impl PluginHandle {
    /// Creates a handle owned by `session`.
    pub(crate) fn new(
        id: HandleId,
        plugin: &str,
        opaque_id: Option<String>,
        session: Weak<SessionInner>,
    ) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                id,
                plugin: plugin.to_string(),
                opaque_id,
                session,
                connected: AtomicBool::new(false),
                disposed: AtomicBool::new(false),
                on_webrtc_up: Listeners::new(),
                on_media: Listeners::new(),
                on_slow_link: Listeners::new(),
                on_hangup: Listeners::new(),
                on_detached: Listeners::new(),
                on_trickle: Listeners::new(),
                on_event: Listeners::new(),
            }),
        }
    }
}

// ============================================================================
// PluginHandle - Accessors
// ============================================================================

impl PluginHandle {
    /// Returns the server-assigned handle ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> HandleId {
        self.inner.id
    }

    /// Returns the plugin package name.
    #[inline]
    #[must_use]
    pub fn plugin(&self) -> &str {
        &self.inner.plugin
    }

    /// Returns the opaque ID supplied at attach time.
    #[inline]
    #[must_use]
    pub fn opaque_id(&self) -> Option<&str> {
        self.inner.opaque_id.as_deref()
    }

    /// Returns `true` while the PeerConnection is up.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// Returns `true` once the handle has been disposed.
    #[inline]
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Returns the owning session, if it still exists.
    #[must_use]
    pub fn session(&self) -> Option<Session> {
        self.inner.session.upgrade().map(Session::from_inner)
    }
}

// ============================================================================
// PluginHandle - Listeners
// ============================================================================

impl PluginHandle {
    /// Called on `webrtcup`.
    pub fn on_webrtc_up<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&HandleEvent) + Send + Sync + 'static,
    {
        self.inner.on_webrtc_up.add(listener)
    }

    /// Called on `media`.
    pub fn on_media<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&HandleEvent) + Send + Sync + 'static,
    {
        self.inner.on_media.add(listener)
    }

    /// Called on `slowlink`.
    pub fn on_slow_link<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&HandleEvent) + Send + Sync + 'static,
    {
        self.inner.on_slow_link.add(listener)
    }

    /// Called on `hangup`.
    pub fn on_hangup<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&HandleEvent) + Send + Sync + 'static,
    {
        self.inner.on_hangup.add(listener)
    }

    /// Called on `detached`, before the handle is disposed.
    pub fn on_detached<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&HandleEvent) + Send + Sync + 'static,
    {
        self.inner.on_detached.add(listener)
    }

    /// Called on `trickle`.
    pub fn on_trickle<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&HandleEvent) + Send + Sync + 'static,
    {
        self.inner.on_trickle.add(listener)
    }

    /// Called on plugin events and unrecognised kinds.
    pub fn on_event<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&HandleEvent) + Send + Sync + 'static,
    {
        self.inner.on_event.add(listener)
    }

    /// Unregisters a listener from whichever set holds it.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listener_sets().iter().any(|set| set.remove(id))
    }

    fn listener_sets(&self) -> [&Listeners<HandleEvent>; 7] {
        [
            &self.inner.on_webrtc_up,
            &self.inner.on_media,
            &self.inner.on_slow_link,
            &self.inner.on_hangup,
            &self.inner.on_detached,
            &self.inner.on_trickle,
            &self.inner.on_event,
        ]
    }
}

// ============================================================================
// PluginHandle - Requests
// ============================================================================

impl PluginHandle {
    /// Sends a request scoped to this handle.
    ///
    /// # Errors
    ///
    /// Fails fast with [`Error::HandleDisposed`] after disposal, or with the
    /// session's state error; otherwise returns whatever the transaction
    /// settles with.
    pub async fn request(&self, request: Request, options: RequestOptions) -> Result<ClientResponse> {
        if self.is_disposed() {
            return Err(Error::handle_disposed(self.inner.id));
        }
        let session = self
            .session()
            .ok_or_else(|| Error::handle_disposed(self.inner.id))?;

        session
            .request(request.with_handle(self.inner.id), options)
            .await
    }

    /// Sends a plugin `message` and unwraps the plugin's reply.
    ///
    /// # Errors
    ///
    /// Returns an error if the message fails at the gateway level. Plugin
    /// level errors are left in the [`PluginResponse`].
    pub async fn request_message(&self, body: Value) -> Result<PluginResponse> {
        self.request_message_with_options(body, RequestOptions::new())
            .await
    }

    /// Sends a plugin `message` with explicit request options.
    ///
    /// With [`RequestOptions::ack_only`] the response is the gateway's `ack`
    /// and carries no plugin data.
    ///
    /// # Errors
    ///
    /// Same as [`PluginHandle::request_message`].
    pub async fn request_message_with_options(
        &self,
        body: Value,
        options: RequestOptions,
    ) -> Result<PluginResponse> {
        self.request(Request::message(body), options)
            .await
            .map(PluginResponse::from)
    }

    /// Sends a plugin `message` carrying a session description.
    ///
    /// # Errors
    ///
    /// Same as [`PluginHandle::request_message`].
    pub async fn request_message_with_jsep(&self, body: Value, jsep: &Jsep) -> Result<PluginResponse> {
        self.request(Request::message_with_jsep(body, jsep), RequestOptions::new())
            .await
            .map(PluginResponse::from)
    }

    /// Trickles one ICE candidate.
    ///
    /// # Errors
    ///
    /// Returns an error if the gateway does not acknowledge.
    pub async fn trickle(&self, candidate: Value) -> Result<ClientResponse> {
        self.request(Request::trickle(candidate), RequestOptions::ack_only())
            .await
    }

    /// Trickles a batch of ICE candidates.
    ///
    /// # Errors
    ///
    /// Returns an error if the gateway does not acknowledge.
    pub async fn trickles(&self, candidates: Vec<Value>) -> Result<ClientResponse> {
        self.request(Request::trickles(candidates), RequestOptions::ack_only())
            .await
    }

    /// Signals end of candidates.
    ///
    /// # Errors
    ///
    /// Returns an error if the gateway does not acknowledge.
    pub async fn trickle_completed(&self) -> Result<ClientResponse> {
        self.request(Request::trickle_completed(), RequestOptions::ack_only())
            .await
    }

    /// Asks the gateway to close the PeerConnection.
    ///
    /// # Errors
    ///
    /// Returns an error if the `hangup` request fails.
    pub async fn hangup(&self) -> Result<ClientResponse> {
        self.request(Request::hangup(), RequestOptions::new()).await
    }

    /// Detaches from the plugin. The handle is disposed whatever the
    /// gateway answers.
    ///
    /// # Errors
    ///
    /// Returns an error if the `detach` request fails.
    pub async fn detach(&self) -> Result<ClientResponse> {
        let result = self.request(Request::detach(), RequestOptions::new()).await;
        self.dispose();
        result
    }

    /// Releases the handle locally: disposed, listeners cleared, removed
    /// from the session. No request is sent.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.connected.store(false, Ordering::SeqCst);

        for set in self.listener_sets() {
            set.clear();
        }

        if let Some(session) = self.session() {
            session.remove_handle(self.inner.id);
        }
        debug!(handle_id = %self.inner.id, plugin = %self.inner.plugin, "Handle disposed");
    }
}

// ============================================================================
// PluginHandle - Dispatch
// ============================================================================

impl PluginHandle {
    /// Classifies a frame addressed to this handle and notifies listeners.
    ///
    /// Frames reaching a disposed handle are dropped.
    pub fn event(&self, frame: Frame) {
        if self.is_disposed() {
            warn!(handle_id = %self.inner.id, kind = frame.kind_name(), "Stray frame for disposed handle");
            return;
        }

        let event = HandleEvent::classify(frame);
        trace!(handle_id = %self.inner.id, kind = event.frame.kind_name(), "Handle event");

        match &event.kind {
            HandleEventKind::WebrtcUp => {
                self.inner.connected.store(true, Ordering::SeqCst);
                self.inner.on_webrtc_up.emit(&event);
            }
            HandleEventKind::Media { .. } => {
                self.inner.on_media.emit(&event);
            }
            HandleEventKind::SlowLink { .. } => {
                self.inner.on_slow_link.emit(&event);
            }
            HandleEventKind::Hangup { .. } => {
                self.inner.connected.store(false, Ordering::SeqCst);
                self.inner.on_hangup.emit(&event);
            }
            HandleEventKind::Detached => {
                self.inner.on_detached.emit(&event);
                self.dispose();
            }
            HandleEventKind::Trickle { .. } => {
                self.inner.on_trickle.emit(&event);
            }
            HandleEventKind::Generic => {
                self.inner.on_event.emit(&event);
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use parking_lot::Mutex;
    use serde_json::json;

    use crate::identifiers::SessionId;

    fn session_with_handle() -> (Session, PluginHandle) {
        let session = Session::new(SessionId::new(123), Weak::new(), Duration::from_secs(25), 3);
        let handle = session.attach_plugin_handle(HandleId::new(456), "janus.plugin.echotest", Some("opaque"));
        (session, handle)
    }

    fn event(value: serde_json::Value) -> Frame {
        Frame::parse(value).expect("parse frame")
    }

    #[test]
    fn test_accessors() {
        let (session, handle) = session_with_handle();

        assert_eq!(handle.id(), HandleId::new(456));
        assert_eq!(handle.plugin(), "janus.plugin.echotest");
        assert_eq!(handle.opaque_id(), Some("opaque"));
        assert_eq!(handle.session().map(|s| s.id()), Some(session.id()));
        assert!(!handle.is_connected());
    }

    #[test]
    fn test_connectivity_follows_events() {
        let (_session, handle) = session_with_handle();

        handle.event(event(json!({ "janus": "webrtcup", "session_id": 123, "sender": 456 })));
        assert!(handle.is_connected());

        handle.event(event(json!({ "janus": "hangup", "session_id": 123, "sender": 456 })));
        assert!(!handle.is_connected());
    }

    #[test]
    fn test_listeners_by_kind() {
        let (_session, handle) = session_with_handle();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let log = Arc::clone(&seen);
        handle.on_media(move |_| log.lock().push("media"));
        let log = Arc::clone(&seen);
        handle.on_slow_link(move |_| log.lock().push("slowlink"));
        let log = Arc::clone(&seen);
        handle.on_trickle(move |_| log.lock().push("trickle"));
        let log = Arc::clone(&seen);
        handle.on_event(move |_| log.lock().push("event"));

        for kind in ["media", "slowlink", "trickle", "event", "mystery"] {
            handle.event(event(json!({ "janus": kind, "sender": 456 })));
        }

        assert_eq!(*seen.lock(), vec!["media", "slowlink", "trickle", "event", "event"]);
    }

    #[test]
    fn test_detached_fires_then_disposes() {
        let (session, handle) = session_with_handle();
        let fired = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&fired);
        handle.on_detached(move |_| *flag.lock() = true);

        handle.event(event(json!({ "janus": "detached", "sender": 456 })));

        assert!(*fired.lock());
        assert!(handle.is_disposed());
        assert!(session.plugin_handle(HandleId::new(456)).is_none());
    }

    #[test]
    fn test_disposed_handle_drops_events() {
        let (_session, handle) = session_with_handle();
        let count = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&count);
        handle.on_event(move |_| *counter.lock() += 1);

        handle.dispose();
        handle.event(event(json!({ "janus": "event", "sender": 456 })));

        assert_eq!(*count.lock(), 0);
    }

    #[tokio::test]
    async fn test_request_after_dispose_fails_fast() {
        let (_session, handle) = session_with_handle();
        handle.dispose();

        let result = handle.request_message(json!({ "request": "list" })).await;
        assert!(matches!(result, Err(Error::HandleDisposed { .. })));

        let result = handle.trickle_completed().await;
        assert!(matches!(result, Err(Error::HandleDisposed { .. })));
    }

    #[test]
    fn test_remove_listener() {
        let (_session, handle) = session_with_handle();
        let id = handle.on_hangup(|_| {});

        assert!(handle.remove_listener(id));
        assert!(!handle.remove_listener(id));
    }
}
