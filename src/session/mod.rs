//! Gateway sessions.
//!
//! A [`Session`] is created on the gateway with `create` (or re-attached
//! with `claim`), kept alive with periodic `keepalive` pings, and owns the
//! plugin handles attached through it.
//!
//! # Lifecycle
//!
//! ```text
//! Alive ──── connection lost ────► Dying ──── claimed ────► Alive
//!   │                                │
//!   ├── destroy / timeout ───────────┴── destroy / timeout / no reconnect ──► Dead
//! ```
//!
//! A dead session never sends again. Its handles are disposed before the
//! state becomes `Dead`.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `keepalive` | Periodic ping task |

// ============================================================================
// Submodules
// ============================================================================

/// Keepalive task.
mod keepalive;

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::client::{Client, ClientInner};
use crate::error::{Error, Result};
use crate::handle::PluginHandle;
use crate::identifiers::{HandleId, ListenerId, SessionId};
use crate::listener::Listeners;
use crate::plugins::videoroom::VideoRoomPlugin;
use crate::protocol::{ClientResponse, Frame, FrameKind, Request, RequestOptions};

// ============================================================================
// SessionState
// ============================================================================

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Usable.
    Alive,
    /// Teardown or reconnect in progress; requests fail fast.
    Dying,
    /// Released. Terminal.
    Dead,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Alive => "alive",
            Self::Dying => "dying",
            Self::Dead => "dead",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Session
// ============================================================================

/// A gateway session.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Session {
    pub(crate) inner: Arc<SessionInner>,
}

/// Shared session state.
pub(crate) struct SessionInner {
    id: SessionId,
    client: Weak<ClientInner>,
    state: Mutex<SessionState>,
    handles: Mutex<FxHashMap<HandleId, PluginHandle>>,
    keepalive: Mutex<Option<AbortHandle>>,
    keepalive_interval: Duration,
    keepalive_max_failures: u32,

    on_timeout: Listeners<()>,
    on_keep_alive: Listeners<bool>,
    on_error: Listeners<Error>,
    on_event: Listeners<Frame>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("handles", &self.handle_count())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Session - Construction
// ============================================================================

impl Session {
    /// Creates an alive session bound to `client`. Keepalive is not started.
    pub(crate) fn new(
        id: SessionId,
        client: Weak<ClientInner>,
        keepalive_interval: Duration,
        keepalive_max_failures: u32,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                id,
                client,
                state: Mutex::new(SessionState::Alive),
                handles: Mutex::new(FxHashMap::default()),
                keepalive: Mutex::new(None),
                keepalive_interval,
                keepalive_max_failures,
                on_timeout: Listeners::new(),
                on_keep_alive: Listeners::new(),
                on_error: Listeners::new(),
                on_event: Listeners::new(),
            }),
        }
    }

    /// Rebuilds a session from its shared state.
    #[inline]
    pub(crate) fn from_inner(inner: Arc<SessionInner>) -> Self {
        Self { inner }
    }
}

// ============================================================================
// Session - Accessors
// ============================================================================

impl Session {
    /// Returns the server-assigned session ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.inner.id
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.inner.state.lock()
    }

    /// Returns `true` if the session accepts requests.
    #[inline]
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.state() == SessionState::Alive
    }

    /// Returns the number of registered handles.
    #[inline]
    #[must_use]
    pub fn handle_count(&self) -> usize {
        self.inner.handles.lock().len()
    }

    /// Returns a registered handle.
    #[must_use]
    pub fn plugin_handle(&self, handle_id: HandleId) -> Option<PluginHandle> {
        self.inner.handles.lock().get(&handle_id).cloned()
    }

    /// Returns the owning client, if it still exists.
    #[must_use]
    pub fn client(&self) -> Option<Client> {
        self.inner.client.upgrade().map(Client::from_inner)
    }

    /// Returns the VideoRoom facade bound to this session.
    #[must_use]
    pub fn video_room(&self) -> VideoRoomPlugin {
        VideoRoomPlugin::new(self.clone())
    }
}

// ============================================================================
// Session - Listeners
// ============================================================================

impl Session {
    /// Called when the session times out.
    pub fn on_timeout<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&()) + Send + Sync + 'static,
    {
        self.inner.on_timeout.add(listener)
    }

    /// Called after every keepalive ping with its outcome.
    pub fn on_keep_alive<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&bool) + Send + Sync + 'static,
    {
        self.inner.on_keep_alive.add(listener)
    }

    /// Called when a background operation of the session fails.
    pub fn on_error<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        self.inner.on_error.add(listener)
    }

    /// Called for session-scoped frames not addressed to a handle.
    pub fn on_event<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Frame) + Send + Sync + 'static,
    {
        self.inner.on_event.add(listener)
    }

    /// Unregisters a listener from whichever set holds it.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.on_timeout.remove(id)
            || self.inner.on_keep_alive.remove(id)
            || self.inner.on_error.remove(id)
            || self.inner.on_event.remove(id)
    }
}

// ============================================================================
// Session - Requests
// ============================================================================

impl Session {
    /// Sends a request scoped to this session.
    ///
    /// # Errors
    ///
    /// Fails fast with [`Error::SessionNotAlive`] unless the session is
    /// alive; otherwise returns whatever the transaction settles with.
    pub async fn request(&self, request: Request, options: RequestOptions) -> Result<ClientResponse> {
        let state = self.state();
        if state != SessionState::Alive {
            return Err(Error::session_not_alive(self.inner.id, state));
        }
        self.send(request, options).await
    }

    /// Sends one `keepalive` ping.
    ///
    /// # Errors
    ///
    /// Returns an error if the ping is not acknowledged.
    pub async fn keep_alive(&self) -> Result<()> {
        self.request(Request::keepalive(), RequestOptions::ack_only())
            .await
            .map(|_| ())
    }

    /// Attaches a plugin and registers the new handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the `attach` request fails or the response
    /// carries no handle ID.
    pub async fn create_plugin_handle(
        &self,
        plugin: &str,
        opaque_id: Option<&str>,
    ) -> Result<PluginHandle> {
        let response = self
            .request(Request::attach(plugin, opaque_id), RequestOptions::new())
            .await?;
        let handle_id = HandleId::new(response.data_id()?);

        debug!(session_id = %self.inner.id, handle_id = %handle_id, plugin, "Plugin attached");
        Ok(self.attach_plugin_handle(handle_id, plugin, opaque_id))
    }

    /// Registers a handle that is already attached on the gateway.
    ///
    /// Replaces any handle registered under the same ID.
    pub fn attach_plugin_handle(
        &self,
        handle_id: HandleId,
        plugin: &str,
        opaque_id: Option<&str>,
    ) -> PluginHandle {
        let handle = PluginHandle::new(
            handle_id,
            plugin,
            opaque_id.map(str::to_string),
            Arc::downgrade(&self.inner),
        );
        self.inner.handles.lock().insert(handle_id, handle.clone());
        handle
    }

    /// Destroys the session on the gateway and releases it locally.
    ///
    /// Local teardown happens whatever the gateway answers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionNotAlive`] if the session is already dead,
    /// or the `destroy` request's error.
    pub async fn destroy(&self) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            if *state == SessionState::Dead {
                return Err(Error::session_not_alive(self.inner.id, SessionState::Dead));
            }
            *state = SessionState::Dying;
        }
        self.stop_keep_alive();

        let result = self
            .send(Request::destroy(), RequestOptions::new())
            .await
            .map(|_| ());

        self.terminate();
        info!(session_id = %self.inner.id, "Session destroyed");
        result
    }

    /// Stamps the session ID and sends without a state check.
    async fn send(&self, request: Request, options: RequestOptions) -> Result<ClientResponse> {
        let client = self.client().ok_or(Error::ConnectionClosed)?;
        client
            .request(request.with_session(self.inner.id), options)
            .await
    }
}

// ============================================================================
// Session - Keepalive
// ============================================================================

impl Session {
    /// Starts the periodic keepalive task, replacing a running one.
    pub fn start_keep_alive(&self) {
        let task = keepalive::spawn(
            Arc::downgrade(&self.inner),
            self.inner.keepalive_interval,
            self.inner.keepalive_max_failures,
        );

        if let Some(previous) = self.inner.keepalive.lock().replace(task) {
            previous.abort();
        }
    }

    /// Stops the keepalive task.
    pub fn stop_keep_alive(&self) {
        if let Some(task) = self.inner.keepalive.lock().take() {
            task.abort();
        }
    }

    /// Returns `true` while the keepalive task is scheduled.
    #[inline]
    #[must_use]
    pub fn is_keeping_alive(&self) -> bool {
        self.inner.keepalive.lock().is_some()
    }

    /// Reports one keepalive outcome.
    fn keep_alive_result(&self, outcome: &Result<()>) {
        match outcome {
            Ok(()) => {
                self.inner.on_keep_alive.emit(&true);
            }
            Err(e) => {
                self.inner.on_keep_alive.emit(&false);
                self.inner.on_error.emit(e);
            }
        }
    }
}

// ============================================================================
// Session - Lifecycle
// ============================================================================

impl Session {
    /// Expires the session: dead, handles disposed, `on_timeout` fired,
    /// unregistered from the client.
    ///
    /// Does nothing if the session is already dead.
    pub fn timeout(&self) {
        if !self.release() {
            return;
        }
        warn!(session_id = %self.inner.id, "Session timed out");
        self.inner.on_timeout.emit(&());
    }

    /// Releases the session without firing `on_timeout`.
    pub(crate) fn terminate(&self) {
        if self.release() {
            debug!(session_id = %self.inner.id, "Session terminated");
        }
    }

    /// Moves an alive session to `Dying` and pauses keepalive.
    pub(crate) fn mark_dying(&self) {
        {
            let mut state = self.inner.state.lock();
            if *state != SessionState::Alive {
                return;
            }
            *state = SessionState::Dying;
        }
        self.stop_keep_alive();
        debug!(session_id = %self.inner.id, "Session dying");
    }

    /// Moves a dying session back to `Alive` and resumes keepalive.
    pub(crate) fn revive(&self) -> bool {
        {
            let mut state = self.inner.state.lock();
            if *state != SessionState::Dying {
                return false;
            }
            *state = SessionState::Alive;
        }
        self.start_keep_alive();
        info!(session_id = %self.inner.id, "Session revived");
        true
    }

    /// Common teardown. Returns `false` if the session was already dead.
    fn release(&self) -> bool {
        if *self.inner.state.lock() == SessionState::Dead {
            return false;
        }

        self.stop_keep_alive();

        let handles: Vec<PluginHandle> = self
            .inner
            .handles
            .lock()
            .drain()
            .map(|(_, handle)| handle)
            .collect();
        for handle in &handles {
            handle.dispose();
        }

        {
            let mut state = self.inner.state.lock();
            if *state == SessionState::Dead {
                return false;
            }
            *state = SessionState::Dead;
        }

        if let Some(client) = self.client() {
            client.unregister_session(self.inner.id);
        }
        true
    }

    /// Removes a handle from the registry.
    pub(crate) fn remove_handle(&self, handle_id: HandleId) -> Option<PluginHandle> {
        self.inner.handles.lock().remove(&handle_id)
    }
}

// ============================================================================
// Session - Dispatch
// ============================================================================

impl Session {
    /// Routes a frame scoped to this session.
    ///
    /// `timeout` frames expire the session. Frames with a `sender` go to
    /// that handle; unknown senders are strays. Everything else reaches
    /// `on_event`.
    pub fn event(&self, frame: Frame) {
        if frame.janus == FrameKind::Timeout {
            self.timeout();
            return;
        }

        match frame.sender {
            Some(handle_id) => match self.plugin_handle(handle_id) {
                Some(handle) => handle.event(frame),
                None => {
                    warn!(
                        session_id = %self.inner.id,
                        handle_id = %handle_id,
                        kind = frame.kind_name(),
                        "Stray frame for unknown handle"
                    );
                }
            },
            None => {
                self.inner.on_event.emit(&frame);
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

    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    fn detached_session(id: u64) -> Session {
        Session::new(SessionId::new(id), Weak::new(), Duration::from_secs(25), 3)
    }

    fn frame(value: serde_json::Value) -> Frame {
        Frame::parse(value).expect("parse frame")
    }

    #[test]
    fn test_state_display() {
        assert_eq!(SessionState::Alive.to_string(), "alive");
        assert_eq!(SessionState::Dying.to_string(), "dying");
        assert_eq!(SessionState::Dead.to_string(), "dead");
    }

    #[tokio::test]
    async fn test_request_fails_fast_when_dead() {
        let session = detached_session(1);
        session.terminate();

        let result = session.request(Request::info(), RequestOptions::new()).await;
        assert!(matches!(
            result,
            Err(Error::SessionNotAlive {
                state: SessionState::Dead,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_request_fails_fast_when_dying() {
        let session = detached_session(1);
        session.mark_dying();

        assert_eq!(session.state(), SessionState::Dying);
        assert!(session.keep_alive().await.is_err());
    }

    #[test]
    fn test_timeout_frame_kills_session() {
        let session = detached_session(1);
        let handle = session.attach_plugin_handle(HandleId::new(2), "janus.plugin.echotest", None);
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        session.on_timeout(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        session.event(frame(json!({ "janus": "timeout", "session_id": 1 })));
        session.timeout();

        assert_eq!(session.state(), SessionState::Dead);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(handle.is_disposed());
        assert_eq!(session.handle_count(), 0);
    }

    #[test]
    fn test_event_without_sender_reaches_listeners() {
        let session = detached_session(1);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        session.on_event(move |frame| log.lock().push(frame.kind_name().to_string()));

        session.event(frame(json!({ "janus": "event", "session_id": 1 })));

        assert_eq!(*seen.lock(), vec!["event".to_string()]);
    }

    #[test]
    fn test_unknown_sender_is_stray() {
        let session = detached_session(1);
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        session.on_event(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        session.event(frame(json!({ "janus": "event", "session_id": 1, "sender": 99 })));

        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_remove_listener() {
        let session = detached_session(1);
        let id = session.on_keep_alive(|_| {});

        assert!(session.remove_listener(id));
        assert!(!session.remove_listener(id));
    }

    #[tokio::test]
    async fn test_revive_only_from_dying() {
        let session = detached_session(1);
        assert!(!session.revive());

        session.mark_dying();
        assert!(session.revive());
        assert!(session.is_alive());
        assert!(session.is_keeping_alive());

        session.terminate();
        assert!(!session.revive());
        assert!(!session.is_keeping_alive());
    }
}
