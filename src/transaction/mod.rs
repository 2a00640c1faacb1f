//! In-flight request tracking.
//!
//! Every request is a [`Transaction`] registered in a
//! [`TransactionRegistry`] under a fresh [`TransactionId`]. The registry
//! correlates inbound frames with their transaction and settles it exactly
//! once.
//!
//! # Lifecycle
//!
//! ```text
//!            ack (not ack-only)
//! Pending ─────────────────────► Acked
//!    │                             │
//!    ├── ack (ack-only) ───────────┼──► Completed
//!    ├── success / event ──────────┘
//!    ├── error / send failure / close ──► Errored
//!    └── deadline ──────────────────────► TimedOut
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `registry` | Registry and frame correlation |

// ============================================================================
// Submodules
// ============================================================================

/// Transaction registry.
pub mod registry;

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::identifiers::{ListenerId, TransactionId};
use crate::listener::Listeners;
use crate::protocol::{ClientResponse, Request};

use registry::RegistryInner;

// ============================================================================
// Re-exports
// ============================================================================

pub use registry::{FrameSink, TransactionRegistry};

// ============================================================================
// TransactionState
// ============================================================================

/// Transaction lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionState {
    /// Registered, possibly sent, nothing received.
    Pending,
    /// The gateway acknowledged; final response outstanding.
    Acked,
    /// Settled with a response.
    Completed,
    /// Settled with an error.
    Errored,
    /// Deadline passed.
    TimedOut,
}

impl TransactionState {
    /// Returns `true` once the transaction can no longer change.
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Errored | Self::TimedOut)
    }
}

// ============================================================================
// Transaction
// ============================================================================

/// Outcome delivered to the awaiting caller.
type Outcome = Result<ClientResponse>;

/// A tracked request.
///
/// Cheap to clone; clones share state. Listeners can be attached between
/// [`TransactionRegistry::create`] and [`Transaction::start`].
#[derive(Clone)]
pub struct Transaction {
    pub(crate) inner: Arc<TransactionInner>,
}

/// Shared transaction state.
pub(crate) struct TransactionInner {
    id: TransactionId,
    request: Request,
    ack_only: bool,
    timeout: Option<Duration>,
    state: Mutex<TransactionState>,
    started: AtomicBool,

    on_sent: Listeners<Request>,
    on_ack: Listeners<ClientResponse>,
    on_response: Listeners<ClientResponse>,
    on_end: Listeners<()>,
    on_error: Listeners<Error>,

    outcome_tx: Mutex<Option<oneshot::Sender<Outcome>>>,
    outcome_rx: Mutex<Option<oneshot::Receiver<Outcome>>>,
    timer: Mutex<Option<AbortHandle>>,
    registry: Weak<RegistryInner>,
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.inner.id)
            .field("verb", &self.inner.request.verb())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Transaction - Construction
// ============================================================================

impl Transaction {
    /// Creates a pending transaction. The request is stamped with `id`.
    ///
    /// A zero `timeout` never expires.
    pub(crate) fn new(
        id: TransactionId,
        mut request: Request,
        ack_only: bool,
        timeout: Option<Duration>,
        registry: Weak<RegistryInner>,
    ) -> Self {
        request.transaction = Some(id.clone());
        let (outcome_tx, outcome_rx) = oneshot::channel();

        Self {
            inner: Arc::new(TransactionInner {
                id,
                request,
                ack_only,
                timeout: timeout.filter(|limit| !limit.is_zero()),
                state: Mutex::new(TransactionState::Pending),
                started: AtomicBool::new(false),
                on_sent: Listeners::new(),
                on_ack: Listeners::new(),
                on_response: Listeners::new(),
                on_end: Listeners::new(),
                on_error: Listeners::new(),
                outcome_tx: Mutex::new(Some(outcome_tx)),
                outcome_rx: Mutex::new(Some(outcome_rx)),
                timer: Mutex::new(None),
                registry,
            }),
        }
    }
}

// ============================================================================
// Transaction - Accessors
// ============================================================================

impl Transaction {
    /// Returns the transaction ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> &TransactionId {
        &self.inner.id
    }

    /// Returns the stamped request.
    #[inline]
    #[must_use]
    pub fn request(&self) -> &Request {
        &self.inner.request
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> TransactionState {
        *self.inner.state.lock()
    }

    /// Returns `true` if the transaction completes on `ack`.
    #[inline]
    #[must_use]
    pub fn is_ack_only(&self) -> bool {
        self.inner.ack_only
    }

    /// Returns the deadline, if any.
    #[inline]
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.inner.timeout
    }
}

// ============================================================================
// Transaction - Listeners
// ============================================================================

impl Transaction {
    /// Called after the request is handed to the transport.
    pub fn on_sent<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Request) + Send + Sync + 'static,
    {
        self.inner.on_sent.add(listener)
    }

    /// Called when the gateway acknowledges the request.
    pub fn on_ack<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ClientResponse) + Send + Sync + 'static,
    {
        self.inner.on_ack.add(listener)
    }

    /// Called when the transaction completes successfully.
    pub fn on_response<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ClientResponse) + Send + Sync + 'static,
    {
        self.inner.on_response.add(listener)
    }

    /// Called once the transaction settles, whatever the outcome.
    pub fn on_end<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&()) + Send + Sync + 'static,
    {
        self.inner.on_end.add(listener)
    }

    /// Called when the transaction fails.
    pub fn on_error<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        self.inner.on_error.add(listener)
    }
}

// ============================================================================
// Transaction - Execution
// ============================================================================

impl Transaction {
    /// Sends the request and arms the deadline.
    ///
    /// A send failure settles the transaction as [`TransactionState::Errored`].
    /// Calling `start` twice has no effect.
    pub fn start(&self) -> &Self {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return self;
        }

        let Some(registry) = self.inner.registry.upgrade() else {
            self.settle(TransactionState::Errored, Err(Error::ConnectionClosed));
            return self;
        };

        self.arm_timer(&registry);

        if let Err(e) = registry.send(&self.inner.request) {
            debug!(transaction = %self.inner.id, error = %e, "Send failed");
            registry.remove(&self.inner.id);
            self.settle(TransactionState::Errored, Err(e));
            return self;
        }

        trace!(transaction = %self.inner.id, verb = self.inner.request.verb(), "Request sent");
        self.inner.on_sent.emit(&self.inner.request);
        self
    }

    /// Waits for the transaction to settle.
    ///
    /// # Errors
    ///
    /// Returns the error the transaction settled with, or a protocol error
    /// if the outcome was already taken.
    pub async fn outcome(&self) -> Result<ClientResponse> {
        let receiver = self
            .inner
            .outcome_rx
            .lock()
            .take()
            .ok_or_else(|| Error::protocol(format!("outcome of {} already taken", self.inner.id)))?;

        receiver.await?
    }

    fn arm_timer(&self, registry: &Arc<RegistryInner>) {
        let Some(limit) = self.inner.timeout else {
            return;
        };

        let weak = Arc::downgrade(registry);
        let id = self.inner.id.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(limit).await;
            if let Some(registry) = weak.upgrade() {
                registry.expire(&id);
            }
        });

        *self.inner.timer.lock() = Some(handle.abort_handle());
    }
}

// ============================================================================
// Transaction - Settlement
// ============================================================================

impl Transaction {
    /// Marks the transaction acknowledged and notifies `on_ack`.
    pub(crate) fn acknowledge(&self, response: &ClientResponse) {
        {
            let mut state = self.inner.state.lock();
            if *state == TransactionState::Pending {
                *state = TransactionState::Acked;
            }
        }
        self.inner.on_ack.emit(response);
    }

    /// Notifies `on_ack` without changing state. Used before an ack-only
    /// transaction completes.
    pub(crate) fn notify_ack(&self, response: &ClientResponse) {
        self.inner.on_ack.emit(response);
    }

    /// Settles the transaction. Returns `false` if it had already settled.
    pub(crate) fn settle(&self, final_state: TransactionState, outcome: Outcome) -> bool {
        {
            let mut state = self.inner.state.lock();
            if state.is_terminal() {
                return false;
            }
            *state = final_state;
        }

        if let Some(timer) = self.inner.timer.lock().take() {
            timer.abort();
        }

        match &outcome {
            Ok(response) => {
                self.inner.on_response.emit(response);
            }
            Err(e) => {
                self.inner.on_error.emit(e);
            }
        }
        self.inner.on_end.emit(&());

        if let Some(tx) = self.inner.outcome_tx.lock().take() {
            let _ = tx.send(outcome);
        }

        true
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!TransactionState::Pending.is_terminal());
        assert!(!TransactionState::Acked.is_terminal());
        assert!(TransactionState::Completed.is_terminal());
        assert!(TransactionState::Errored.is_terminal());
        assert!(TransactionState::TimedOut.is_terminal());
    }

    #[tokio::test]
    async fn test_start_without_registry_errors() {
        let transaction = Transaction::new(
            TransactionId::from("orphan"),
            Request::info(),
            false,
            None,
            Weak::new(),
        );

        transaction.start();

        assert_eq!(transaction.state(), TransactionState::Errored);
        assert!(matches!(transaction.outcome().await, Err(Error::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_settle_once() {
        let transaction = Transaction::new(
            TransactionId::from("once"),
            Request::info(),
            false,
            None,
            Weak::new(),
        );

        assert!(transaction.settle(TransactionState::Errored, Err(Error::ConnectionClosed)));
        assert!(!transaction.settle(
            TransactionState::TimedOut,
            Err(Error::request_timeout(TransactionId::from("once"), 1))
        ));
        assert_eq!(transaction.state(), TransactionState::Errored);
    }

    #[tokio::test]
    async fn test_outcome_taken_twice() {
        let transaction = Transaction::new(
            TransactionId::from("twice"),
            Request::info(),
            false,
            None,
            Weak::new(),
        );
        transaction.settle(TransactionState::Errored, Err(Error::ConnectionClosed));

        assert!(transaction.outcome().await.is_err());
        assert!(matches!(transaction.outcome().await, Err(Error::Protocol { .. })));
    }

    #[test]
    fn test_request_is_stamped() {
        let transaction = Transaction::new(
            TransactionId::from("stamp"),
            Request::info(),
            false,
            None,
            Weak::new(),
        );
        assert_eq!(
            transaction.request().transaction,
            Some(TransactionId::from("stamp"))
        );
    }
}
