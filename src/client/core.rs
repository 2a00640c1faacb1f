//! Client connection root.
//!
//! The [`Client`] owns the transport link, the transaction registry and the
//! session map. One reader task per link dispatches inbound frames in
//! transport order.
//!
//! # State Machine
//!
//! ```text
//! Disconnected ──connect──► Connecting ──open──► Connected
//!      ▲                        │                    │
//!      │◄──── open failed / close ─┘                 │ close / link lost
//!      │                                             ▼
//!      └────────────── transport closed ────────── Closing
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::{Notify, mpsc};
use tokio::task::AbortHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::{ListenerId, SessionId};
use crate::listener::Listeners;
use crate::protocol::{ClientResponse, Frame, Request, RequestOptions};
use crate::session::{Session, SessionState};
use crate::transaction::{FrameSink, Transaction, TransactionRegistry};
use crate::transport::{FrameSender, Transport, TransportEvent, TransportOptions};

use super::builder::ClientBuilder;
use super::options::ClientOptions;
use super::reconnect::Backoff;

// ============================================================================
// ConnectionState
// ============================================================================

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No link.
    Disconnected,
    /// Opening a link.
    Connecting,
    /// Link open; requests allowed.
    Connected,
    /// Close requested; waiting for the transport to confirm.
    Closing,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Closing => "closing",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Client
// ============================================================================

/// Janus gateway client.
///
/// Cheap to clone; clones share the connection. Multiple independent
/// clients can coexist.
///
/// # Example
///
/// ```ignore
/// let client = Client::builder().url("ws://127.0.0.1:8188").build()?;
/// client.connect().await?;
///
/// let session = client.create_session().await?;
/// let handle = session.create_plugin_handle("janus.plugin.echotest", None).await?;
/// let reply = handle.request_message(json!({ "audio": true })).await?;
/// ```
#[derive(Clone)]
pub struct Client {
    pub(crate) inner: Arc<ClientInner>,
}

/// Shared client state.
pub(crate) struct ClientInner {
    options: ClientOptions,
    transport: Arc<dyn Transport>,
    state: Mutex<ConnectionState>,
    link: Mutex<Option<FrameSender>>,
    /// Bumped for every opened link; stale close reports are ignored.
    epoch: AtomicU64,
    /// Bumped for every connect attempt and when a close abandons one.
    attempt: AtomicU64,
    /// Wakes a connect attempt abandoned by `close`.
    abandon: Notify,
    registry: TransactionRegistry,
    sessions: Mutex<FxHashMap<SessionId, Session>>,

    backoff: Mutex<Backoff>,
    reconnect_task: Mutex<Option<AbortHandle>>,
    /// Set by `close(false)`; suppresses reconnects until the next `connect`.
    shutdown: AtomicBool,
    /// Set by `close(true)`; reconnect even if the options disable it.
    reconnect_requested: AtomicBool,

    on_connected: Listeners<()>,
    on_disconnected: Listeners<()>,
    on_error: Listeners<Error>,
    on_event: Listeners<Frame>,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        if let Some(task) = self.reconnect_task.get_mut().take() {
            task.abort();
        }
        if let Some(link) = self.link.get_mut().take() {
            link.close();
        }
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("url", &self.inner.options.url)
            .field("state", &self.state())
            .field("sessions", &self.session_count())
            .field("pending", &self.inner.registry.len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Client - Construction
// ============================================================================

impl Client {
    /// Creates a builder.
    #[inline]
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Creates a disconnected client.
    pub(crate) fn new(options: ClientOptions, transport: Arc<dyn Transport>) -> Self {
        let backoff = Backoff::new(options.reconnect_policy.clone());

        let inner = Arc::new_cyclic(|weak: &Weak<ClientInner>| {
            let weak = weak.clone();
            let sink: FrameSink = Arc::new(move |request: &Request| {
                let inner = weak.upgrade().ok_or(Error::ConnectionClosed)?;
                inner.send_request(request)
            });

            ClientInner {
                options,
                transport,
                state: Mutex::new(ConnectionState::Disconnected),
                link: Mutex::new(None),
                epoch: AtomicU64::new(0),
                attempt: AtomicU64::new(0),
                abandon: Notify::new(),
                registry: TransactionRegistry::new(sink),
                sessions: Mutex::new(FxHashMap::default()),
                backoff: Mutex::new(backoff),
                reconnect_task: Mutex::new(None),
                shutdown: AtomicBool::new(false),
                reconnect_requested: AtomicBool::new(false),
                on_connected: Listeners::new(),
                on_disconnected: Listeners::new(),
                on_error: Listeners::new(),
                on_event: Listeners::new(),
            }
        });

        Self { inner }
    }

    /// Rebuilds a client from its shared state.
    #[inline]
    pub(crate) fn from_inner(inner: Arc<ClientInner>) -> Self {
        Self { inner }
    }
}

// ============================================================================
// Client - Accessors
// ============================================================================

impl Client {
    /// Returns the crate version.
    #[inline]
    #[must_use]
    pub fn version() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    /// Returns the configuration.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &ClientOptions {
        &self.inner.options
    }

    /// Returns the connection state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.lock()
    }

    /// Returns `true` if requests can be sent.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Returns `true` while a link is being opened.
    #[inline]
    #[must_use]
    pub fn is_connecting(&self) -> bool {
        self.state() == ConnectionState::Connecting
    }

    /// Returns `true` while a close is in progress.
    #[inline]
    #[must_use]
    pub fn is_closing(&self) -> bool {
        self.state() == ConnectionState::Closing
    }

    /// Returns `true` if `session_id` is registered.
    #[inline]
    #[must_use]
    pub fn has_session(&self, session_id: SessionId) -> bool {
        self.inner.sessions.lock().contains_key(&session_id)
    }

    /// Returns a registered session.
    #[must_use]
    pub fn session(&self, session_id: SessionId) -> Option<Session> {
        self.inner.sessions.lock().get(&session_id).cloned()
    }

    /// Returns every registered session.
    #[must_use]
    pub fn sessions(&self) -> Vec<Session> {
        self.inner.sessions.lock().values().cloned().collect()
    }

    /// Returns the number of registered sessions.
    #[inline]
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.inner.sessions.lock().len()
    }

    /// Returns the number of in-flight transactions.
    #[inline]
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.inner.registry.len()
    }
}

// ============================================================================
// Client - Listeners
// ============================================================================

impl Client {
    /// Called whenever a link opens.
    pub fn on_connected<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&()) + Send + Sync + 'static,
    {
        self.inner.on_connected.add(listener)
    }

    /// Called whenever a link closes.
    pub fn on_disconnected<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&()) + Send + Sync + 'static,
    {
        self.inner.on_disconnected.add(listener)
    }

    /// Called on connection failures and transport errors.
    pub fn on_error<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        self.inner.on_error.add(listener)
    }

    /// Called for frames not scoped to any session.
    pub fn on_event<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Frame) + Send + Sync + 'static,
    {
        self.inner.on_event.add(listener)
    }

    /// Unregisters a listener from whichever set holds it.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.on_connected.remove(id)
            || self.inner.on_disconnected.remove(id)
            || self.inner.on_error.remove(id)
            || self.inner.on_event.remove(id)
    }
}

// ============================================================================
// Client - Connection
// ============================================================================

impl Client {
    /// Opens the connection.
    ///
    /// Returns immediately if already connected or connecting. Cancels any
    /// scheduled reconnect and re-enables automatic reconnects.
    ///
    /// # Errors
    ///
    /// Returns the transport error, [`Error::ConnectionTimeout`], or
    /// [`Error::NotConnected`] while a close is in progress.
    pub async fn connect(&self) -> Result<()> {
        self.inner.shutdown.store(false, Ordering::SeqCst);
        self.cancel_reconnect();
        self.connect_inner().await
    }

    /// Closes the connection without reconnecting.
    pub fn disconnect(&self) {
        self.close(false);
    }

    /// Closes the connection.
    ///
    /// Pending transactions fail with [`Error::ConnectionClosed`] and
    /// sessions become `Dying` before this returns. With `reconnect`, a new
    /// link is opened once the transport confirms the close; otherwise
    /// scheduled reconnects are cancelled. A connect still in progress is
    /// abandoned and the client is `Disconnected` on return.
    pub fn close(&self, reconnect: bool) {
        if reconnect {
            self.inner.shutdown.store(false, Ordering::SeqCst);
            self.inner.reconnect_requested.store(true, Ordering::SeqCst);
        } else {
            self.inner.shutdown.store(true, Ordering::SeqCst);
            self.inner.reconnect_requested.store(false, Ordering::SeqCst);
            self.cancel_reconnect();
        }

        let (previous, link) = {
            let mut state = self.inner.state.lock();
            let previous = *state;
            match previous {
                ConnectionState::Connected => *state = ConnectionState::Closing,
                // No link yet, so no close report will follow
                ConnectionState::Connecting => {
                    *state = ConnectionState::Disconnected;
                    self.inner.attempt.fetch_add(1, Ordering::SeqCst);
                }
                ConnectionState::Closing | ConnectionState::Disconnected => {}
            }
            (previous, self.inner.link.lock().clone())
        };

        match previous {
            ConnectionState::Connected => {
                debug!(reconnect, "Closing connection");
                if let Some(link) = link {
                    link.close();
                }
                self.inner.registry.cancel_all();
                self.mark_sessions_dying();
            }
            ConnectionState::Connecting => {
                debug!(reconnect, "Abandoning connect attempt");
                self.inner.abandon.notify_waiters();
                self.inner.registry.cancel_all();
                self.mark_sessions_dying();

                if self.reconnect_wanted() {
                    self.schedule_reconnect();
                } else {
                    self.terminate_sessions();
                }
            }
            ConnectionState::Disconnected => {
                if reconnect {
                    self.schedule_reconnect();
                } else {
                    self.terminate_sessions();
                }
            }
            ConnectionState::Closing => {}
        }
    }

    async fn connect_inner(&self) -> Result<()> {
        let attempt = {
            let mut state = self.inner.state.lock();
            match *state {
                ConnectionState::Connected | ConnectionState::Connecting => return Ok(()),
                ConnectionState::Closing => return Err(Error::not_connected(ConnectionState::Closing)),
                ConnectionState::Disconnected => *state = ConnectionState::Connecting,
            }
            self.inner.attempt.fetch_add(1, Ordering::SeqCst) + 1
        };

        debug!(url = %self.inner.options.url, attempt, "Connecting");

        match self.open_link(attempt).await {
            Ok(()) => Ok(()),
            Err(e) => {
                {
                    let mut state = self.inner.state.lock();
                    if self.inner.attempt.load(Ordering::SeqCst) != attempt {
                        // Abandoned by `close`, which already settled the state
                        return Err(e);
                    }
                    *state = ConnectionState::Disconnected;
                }
                warn!(url = %self.inner.options.url, error = %e, "Connection failed");
                self.inner.on_error.emit(&e);

                if self.reconnect_wanted() {
                    self.schedule_reconnect();
                } else {
                    self.terminate_sessions();
                }
                Err(e)
            }
        }
    }

    async fn open_link(&self, attempt: u64) -> Result<()> {
        let transport_options = TransportOptions {
            handshake_timeout: self.inner.options.handshake_timeout,
        };
        let abandoned = self.inner.abandon.notified();
        tokio::pin!(abandoned);
        abandoned.as_mut().enable();
        if self.inner.attempt.load(Ordering::SeqCst) != attempt {
            return Err(Error::ConnectionClosed);
        }

        let opening = self
            .inner
            .transport
            .open(&self.inner.options.url, &transport_options);

        let limit = self.inner.options.connection_timeout.filter(|limit| !limit.is_zero());
        let opening = async {
            match limit {
                Some(limit) => timeout(limit, opening)
                    .await
                    .map_err(|_| Error::connection_timeout(limit.as_millis() as u64))?,
                None => opening.await,
            }
        };

        let link = tokio::select! {
            link = opening => link?,
            () = &mut abandoned => return Err(Error::ConnectionClosed),
        };

        let epoch = {
            let mut state = self.inner.state.lock();
            if *state != ConnectionState::Connecting || self.inner.attempt.load(Ordering::SeqCst) != attempt {
                link.sender.close();
                return Err(Error::ConnectionClosed);
            }
            *state = ConnectionState::Connected;
            *self.inner.link.lock() = Some(link.sender);
            self.inner.epoch.fetch_add(1, Ordering::SeqCst) + 1
        };

        tokio::spawn(reader_loop(Arc::downgrade(&self.inner), epoch, link.events));

        self.inner.backoff.lock().reset();
        self.inner.reconnect_requested.store(false, Ordering::SeqCst);

        info!(url = %self.inner.options.url, "Connected");
        self.inner.on_connected.emit(&());
        self.revalidate_sessions();
        Ok(())
    }

    /// Applies a close reported by the transport.
    fn handle_transport_closed(&self, epoch: u64) {
        if self.inner.epoch.load(Ordering::SeqCst) != epoch {
            trace!(epoch, "Ignoring close of stale link");
            return;
        }

        {
            let mut state = self.inner.state.lock();
            if *state == ConnectionState::Disconnected {
                return;
            }
            *state = ConnectionState::Disconnected;
            *self.inner.link.lock() = None;
        }

        self.inner.registry.cancel_all();
        self.mark_sessions_dying();

        info!(url = %self.inner.options.url, "Disconnected");
        self.inner.on_disconnected.emit(&());

        if self.reconnect_wanted() {
            self.schedule_reconnect();
        } else {
            self.terminate_sessions();
        }
    }

    fn reconnect_wanted(&self) -> bool {
        !self.inner.shutdown.load(Ordering::SeqCst)
            && (self.inner.options.reconnect || self.inner.reconnect_requested.load(Ordering::SeqCst))
    }

    fn schedule_reconnect(&self) {
        let next = self.inner.backoff.lock().next_delay();
        let Some(delay) = next else {
            let attempts = self.inner.backoff.lock().attempts();
            error!(attempts, "Giving up reconnecting");
            self.inner.on_error.emit(&Error::connection(format!(
                "gave up reconnecting after {attempts} attempts"
            )));
            self.terminate_sessions();
            return;
        };

        debug!(delay_ms = delay.as_millis() as u64, "Reconnect scheduled");

        let weak = Arc::downgrade(&self.inner);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let client = Client::from_inner(inner);
            if client.inner.shutdown.load(Ordering::SeqCst) {
                return;
            }
            let _ = client.connect_inner().await;
        });

        // The previous task is finished or is the caller itself
        *self.inner.reconnect_task.lock() = Some(task.abort_handle());
    }

    fn cancel_reconnect(&self) {
        if let Some(task) = self.inner.reconnect_task.lock().take() {
            task.abort();
        }
    }
}

// ============================================================================
// Client - Requests
// ============================================================================

impl Client {
    /// Sends a request and waits for its outcome.
    ///
    /// # Errors
    ///
    /// Fails fast with [`Error::NotConnected`] unless connected; otherwise
    /// returns whatever the transaction settles with.
    pub async fn request(&self, request: Request, options: RequestOptions) -> Result<ClientResponse> {
        let state = self.state();
        if state != ConnectionState::Connected {
            return Err(Error::not_connected(state));
        }

        let transaction = self.create_transaction(request, options);
        transaction.start();
        transaction.outcome().await
    }

    /// Registers a transaction without sending it.
    ///
    /// Attach listeners, then call [`Transaction::start`].
    pub fn create_transaction(&self, mut request: Request, options: RequestOptions) -> Transaction {
        if request.token.is_none() {
            request.token.clone_from(&self.inner.options.token);
        }
        if request.api_secret.is_none() {
            request.api_secret.clone_from(&self.inner.options.api_secret);
        }

        let timeout = options.timeout.or(self.inner.options.request_timeout);
        self.inner.registry.create(request, options.ack, timeout)
    }

    /// Requests server information.
    ///
    /// # Errors
    ///
    /// Returns an error if the `info` request fails.
    pub async fn get_info(&self) -> Result<ClientResponse> {
        self.request(Request::info(), RequestOptions::new()).await
    }

    /// Creates a session and starts its keepalive.
    ///
    /// # Errors
    ///
    /// Returns an error if the `create` request fails or the response
    /// carries no session ID.
    pub async fn create_session(&self) -> Result<Session> {
        let response = self.request(Request::create(), RequestOptions::new()).await?;
        let session_id = SessionId::new(response.data_id()?);

        let session = self.register_session(session_id);
        session.start_keep_alive();

        info!(session_id = %session_id, "Session created");
        Ok(session)
    }

    /// Claims an existing session, typically after reconnecting.
    ///
    /// # Errors
    ///
    /// Returns an error if the `claim` request fails.
    pub async fn claim_session(&self, session_id: SessionId) -> Result<Session> {
        self.request(Request::claim().with_session(session_id), RequestOptions::new())
            .await?;

        let session = match self.session(session_id) {
            Some(existing) => {
                existing.revive();
                existing
            }
            None => {
                let session = self.register_session(session_id);
                session.start_keep_alive();
                session
            }
        };

        info!(session_id = %session_id, "Session claimed");
        Ok(session)
    }

    /// Destroys a registered session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionNotFound`] for unknown IDs, or the
    /// session's destroy error.
    pub async fn destroy_session(&self, session_id: SessionId) -> Result<()> {
        let session = self
            .session(session_id)
            .ok_or_else(|| Error::session_not_found(session_id))?;
        session.destroy().await
    }
}

// ============================================================================
// Client - Dispatch
// ============================================================================

impl Client {
    /// Routes one inbound JSON object.
    ///
    /// 1. A live transaction ID settles that transaction.
    /// 2. Any other `ack`/`success`/`error`/`server_info` is a stray.
    /// 3. A registered `session_id` goes to that session.
    /// 4. An unknown `session_id` is a stray.
    /// 5. Everything else reaches `on_event`.
    ///
    /// Malformed frames and strays are logged and dropped.
    pub fn dispatch_object(&self, value: Value) {
        let frame = match Frame::parse(value) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Dropping malformed frame");
                return;
            }
        };

        if self.inner.registry.correlate(&frame) {
            return;
        }

        if frame.janus.is_response() {
            warn!(
                transaction = ?frame.transaction,
                kind = frame.kind_name(),
                "Stray response"
            );
            return;
        }

        match frame.session_id {
            Some(session_id) => match self.session(session_id) {
                Some(session) => session.event(frame),
                None => {
                    warn!(session_id = %session_id, kind = frame.kind_name(), "Stray frame for unknown session");
                }
            },
            None => {
                self.inner.on_event.emit(&frame);
            }
        }
    }

    fn dispatch_text(&self, text: &str) {
        match serde_json::from_str::<Value>(text) {
            Ok(value) => self.dispatch_object(value),
            Err(e) => warn!(error = %e, "Dropping non-JSON message"),
        }
    }
}

// ============================================================================
// Client - Session Registry
// ============================================================================

impl Client {
    /// Registers a session, returning the existing one for a known ID.
    fn register_session(&self, session_id: SessionId) -> Session {
        self.inner
            .sessions
            .lock()
            .entry(session_id)
            .or_insert_with(|| {
                Session::new(
                    session_id,
                    Arc::downgrade(&self.inner),
                    self.inner.options.keepalive_interval,
                    self.inner.options.keepalive_max_failures,
                )
            })
            .clone()
    }

    /// Removes a session from the registry.
    pub(crate) fn unregister_session(&self, session_id: SessionId) {
        if self.inner.sessions.lock().remove(&session_id).is_some() {
            debug!(session_id = %session_id, "Session unregistered");
        }
    }

    fn mark_sessions_dying(&self) {
        for session in self.sessions() {
            session.mark_dying();
        }
    }

    fn terminate_sessions(&self) {
        for session in self.sessions() {
            session.terminate();
        }
    }

    /// Claims every dying session on the new link.
    fn revalidate_sessions(&self) {
        let dying: Vec<Session> = self
            .sessions()
            .into_iter()
            .filter(|session| session.state() == SessionState::Dying)
            .collect();

        for session in dying {
            let client = self.clone();
            tokio::spawn(async move {
                let session_id = session.id();
                let request = Request::claim().with_session(session_id);
                match client.request(request, RequestOptions::new()).await {
                    Ok(_) => {
                        session.revive();
                    }
                    Err(e) => {
                        warn!(session_id = %session_id, error = %e, "Claim failed");
                        session.timeout();
                    }
                }
            });
        }
    }
}

// ============================================================================
// ClientInner
// ============================================================================

impl ClientInner {
    /// Serializes a request onto the current link.
    fn send_request(&self, request: &Request) -> Result<()> {
        let link = self.link.lock().clone();
        let Some(link) = link else {
            return Err(Error::not_connected(*self.state.lock()));
        };

        let text = serde_json::to_string(request)?;
        link.send(text)
    }
}

// ============================================================================
// Reader Task
// ============================================================================

/// Dispatches inbound events for one link.
async fn reader_loop(
    weak: Weak<ClientInner>,
    epoch: u64,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
) {
    while let Some(event) = events.recv().await {
        let Some(inner) = weak.upgrade() else {
            return;
        };
        let client = Client::from_inner(inner);

        match event {
            TransportEvent::Message(text) => client.dispatch_text(&text),

            TransportEvent::Error(message) => {
                warn!(error = %message, "Transport error");
                client.inner.on_error.emit(&Error::connection(message));
            }

            TransportEvent::Closed => {
                client.handle_transport_closed(epoch);
                return;
            }
        }
    }

    // Event channel ended without an explicit close
    if let Some(inner) = weak.upgrade() {
        Client::from_inner(inner).handle_transport_closed(epoch);
    }
}

// ============================================================================
// Tests
// ============================================================================
