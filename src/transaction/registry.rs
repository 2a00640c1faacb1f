//! Transaction registry and frame correlation.
//!
//! The registry owns every non-terminal [`Transaction`]. Terminal
//! transactions are removed immediately, so a late frame carrying their ID
//! finds nothing and is treated as a stray by the caller.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::TransactionId;
use crate::protocol::{ClientResponse, Frame, FrameKind, Request};

use super::{Transaction, TransactionState};

// ============================================================================
// Types
// ============================================================================

/// Hands a stamped request to the transport.
pub type FrameSink = Arc<dyn Fn(&Request) -> Result<()> + Send + Sync>;

// ============================================================================
// TransactionRegistry
// ============================================================================

/// Registry of in-flight transactions.
#[derive(Clone)]
pub struct TransactionRegistry {
    inner: Arc<RegistryInner>,
}

/// Shared registry state.
pub(crate) struct RegistryInner {
    transactions: Mutex<FxHashMap<TransactionId, Transaction>>,
    sink: FrameSink,
}

impl fmt::Debug for TransactionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionRegistry")
            .field("pending", &self.len())
            .finish_non_exhaustive()
    }
}

impl TransactionRegistry {
    /// Creates an empty registry that sends through `sink`.
    #[must_use]
    pub fn new(sink: FrameSink) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                transactions: Mutex::new(FxHashMap::default()),
                sink,
            }),
        }
    }

    /// Registers a pending transaction without sending it.
    ///
    /// The ID is unique among registered transactions.
    pub fn create(&self, request: Request, ack_only: bool, timeout: Option<Duration>) -> Transaction {
        let mut transactions = self.inner.transactions.lock();

        let mut id = TransactionId::generate();
        while transactions.contains_key(&id) {
            id = TransactionId::generate();
        }

        let transaction = Transaction::new(
            id.clone(),
            request,
            ack_only,
            timeout,
            Arc::downgrade(&self.inner),
        );
        transactions.insert(id, transaction.clone());
        transaction
    }

    /// Routes a frame to its transaction.
    ///
    /// Returns `false` if the frame carries no transaction ID or the ID is
    /// not registered.
    pub fn correlate(&self, frame: &Frame) -> bool {
        self.inner.correlate(frame)
    }

    /// Times out a transaction. Returns `false` if it is not registered.
    pub fn expire(&self, id: &TransactionId) -> bool {
        self.inner.expire(id)
    }

    /// Fails every registered transaction with [`Error::ConnectionClosed`].
    ///
    /// Returns the number of transactions cancelled.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<Transaction> = self
            .inner
            .transactions
            .lock()
            .drain()
            .map(|(_, transaction)| transaction)
            .collect();

        for transaction in &drained {
            transaction.settle(TransactionState::Errored, Err(Error::ConnectionClosed));
        }

        if !drained.is_empty() {
            debug!(count = drained.len(), "Cancelled pending transactions");
        }
        drained.len()
    }

    /// Returns a registered transaction.
    #[must_use]
    pub fn get(&self, id: &TransactionId) -> Option<Transaction> {
        self.inner.transactions.lock().get(id).cloned()
    }

    /// Returns `true` if `id` is registered.
    #[inline]
    #[must_use]
    pub fn contains(&self, id: &TransactionId) -> bool {
        self.inner.transactions.lock().contains_key(id)
    }

    /// Returns the number of registered transactions.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.transactions.lock().len()
    }

    /// Returns `true` if nothing is in flight.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.transactions.lock().is_empty()
    }
}

// ============================================================================
// RegistryInner
// ============================================================================

impl RegistryInner {
    /// Sends a request through the sink.
    pub(crate) fn send(&self, request: &Request) -> Result<()> {
        (self.sink)(request)
    }

    /// Unregisters a transaction.
    pub(crate) fn remove(&self, id: &TransactionId) -> Option<Transaction> {
        self.transactions.lock().remove(id)
    }

    fn get(&self, id: &TransactionId) -> Option<Transaction> {
        self.transactions.lock().get(id).cloned()
    }

    pub(crate) fn expire(&self, id: &TransactionId) -> bool {
        let Some(transaction) = self.remove(id) else {
            return false;
        };

        let timeout_ms = transaction
            .timeout()
            .map(|limit| limit.as_millis() as u64)
            .unwrap_or_default();
        warn!(transaction = %id, verb = transaction.request().verb(), timeout_ms, "Transaction timed out");

        transaction.settle(
            TransactionState::TimedOut,
            Err(Error::request_timeout(id.clone(), timeout_ms)),
        );
        true
    }

    fn correlate(&self, frame: &Frame) -> bool {
        let Some(id) = frame.transaction.as_ref() else {
            return false;
        };
        let Some(transaction) = self.get(id) else {
            return false;
        };

        let response = ClientResponse::new(transaction.request().clone(), frame.clone());

        match frame.janus {
            FrameKind::Ack if !transaction.is_ack_only() => {
                trace!(transaction = %id, "Acknowledged");
                transaction.acknowledge(&response);
            }

            FrameKind::Ack => {
                self.remove(id);
                trace!(transaction = %id, "Completed on ack");
                transaction.notify_ack(&response);
                transaction.settle(TransactionState::Completed, Ok(response));
            }

            FrameKind::Error => {
                self.remove(id);
                let error = frame.to_error();
                debug!(transaction = %id, error = %error, "Request rejected");
                transaction.settle(TransactionState::Errored, Err(error));
            }

            _ => {
                self.remove(id);
                trace!(transaction = %id, kind = frame.kind_name(), "Completed");
                transaction.settle(TransactionState::Completed, Ok(response));
            }
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

    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use proptest::prelude::*;
    use serde_json::{Value, json};
    use tokio_test::{assert_pending, assert_ready, task};

    /// Registry whose sink records every request.
    fn recording_registry() -> (TransactionRegistry, Arc<Mutex<Vec<Request>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&sent);
        let sink: FrameSink = Arc::new(move |request: &Request| {
            log.lock().push(request.clone());
            Ok(())
        });
        (TransactionRegistry::new(sink), sent)
    }

    fn frame(value: Value) -> Frame {
        Frame::parse(value).expect("parse frame")
    }

    fn reply(transaction: &Transaction, kind: &str) -> Frame {
        frame(json!({ "janus": kind, "transaction": transaction.id().as_str() }))
    }

    #[tokio::test]
    async fn test_create_registers_without_sending() {
        let (registry, sent) = recording_registry();

        let transaction = registry.create(Request::info(), false, None);

        assert!(registry.contains(transaction.id()));
        assert_eq!(transaction.state(), TransactionState::Pending);
        assert!(sent.lock().is_empty());

        transaction.start();
        assert_eq!(sent.lock().len(), 1);
        assert_eq!(sent.lock()[0].transaction.as_ref(), Some(transaction.id()));
    }

    #[tokio::test]
    async fn test_success_completes() {
        let (registry, _sent) = recording_registry();
        let transaction = registry.create(Request::info(), false, None);
        transaction.start();

        assert!(registry.correlate(&reply(&transaction, "server_info")));

        let response = transaction.outcome().await.expect("response");
        assert_eq!(response.kind(), FrameKind::ServerInfo);
        assert_eq!(transaction.state(), TransactionState::Completed);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_ack_keeps_non_ack_only_pending() {
        let (registry, _sent) = recording_registry();
        let transaction = registry.create(Request::message(json!({})), false, None);
        let acks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&acks);
        transaction.on_ack(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        transaction.start();

        registry.correlate(&reply(&transaction, "ack"));

        assert_eq!(transaction.state(), TransactionState::Acked);
        assert_eq!(acks.load(Ordering::SeqCst), 1);
        assert!(registry.contains(transaction.id()));

        let mut waiting = task::spawn(transaction.outcome());
        assert_pending!(waiting.poll());

        registry.correlate(&reply(&transaction, "event"));
        assert!(waiting.is_woken());
        let response = assert_ready!(waiting.poll()).expect("event");
        assert!(response.is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ack_only_completes_without_late_timeout() {
        let (registry, _sent) = recording_registry();
        let transaction = registry.create(Request::keepalive(), true, Some(Duration::from_millis(500)));

        let events = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&events);
        transaction.on_ack(move |_| log.lock().push("ack"));
        let log = Arc::clone(&events);
        transaction.on_response(move |_| log.lock().push("response"));
        let log = Arc::clone(&events);
        transaction.on_end(move |_| log.lock().push("end"));
        let log = Arc::clone(&events);
        transaction.on_error(move |_| log.lock().push("error"));
        transaction.start();

        registry.correlate(&reply(&transaction, "ack"));
        assert!(transaction.outcome().await.expect("ack").is_ack());

        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(*events.lock(), vec!["ack", "response", "end"]);
        assert_eq!(transaction.state(), TransactionState::Completed);
    }

    #[tokio::test]
    async fn test_error_frame_rejects() {
        let (registry, _sent) = recording_registry();
        let transaction = registry.create(Request::destroy(), false, None);
        transaction.start();

        registry.correlate(&frame(json!({
            "janus": "error",
            "transaction": transaction.id().as_str(),
            "error": { "code": 458, "reason": "No such session" }
        })));

        assert!(matches!(
            transaction.outcome().await,
            Err(Error::Server { code: 458, .. })
        ));
        assert_eq!(transaction.state(), TransactionState::Errored);
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_then_late_response_is_stray() {
        let (registry, _sent) = recording_registry();
        let limit = Duration::from_millis(500);
        let transaction = registry.create(Request::info(), false, Some(limit));
        let started = tokio::time::Instant::now();
        transaction.start();

        let outcome = transaction.outcome().await;
        let elapsed = started.elapsed();

        assert!(matches!(outcome, Err(Error::RequestTimeout { timeout_ms: 500, .. })));
        assert!(elapsed >= limit);
        assert!(elapsed < limit + Duration::from_millis(50));
        assert_eq!(transaction.state(), TransactionState::TimedOut);

        assert!(!registry.correlate(&reply(&transaction, "server_info")));
        assert_eq!(transaction.state(), TransactionState::TimedOut);
    }

    #[tokio::test]
    async fn test_send_failure_settles_errored() {
        let sink: FrameSink = Arc::new(|_: &Request| Err(Error::ConnectionClosed));
        let registry = TransactionRegistry::new(sink);
        let transaction = registry.create(Request::info(), false, None);

        transaction.start();

        assert_eq!(transaction.state(), TransactionState::Errored);
        assert!(matches!(transaction.outcome().await, Err(Error::ConnectionClosed)));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_all() {
        let (registry, _sent) = recording_registry();
        let transactions: Vec<_> = (0..5)
            .map(|_| {
                let transaction = registry.create(Request::info(), false, None);
                transaction.start();
                transaction
            })
            .collect();

        assert_eq!(registry.cancel_all(), 5);
        assert!(registry.is_empty());

        for transaction in transactions {
            assert!(matches!(transaction.outcome().await, Err(Error::ConnectionClosed)));
        }
    }

    #[test]
    fn test_unknown_id_not_correlated() {
        let (registry, _sent) = recording_registry();
        assert!(!registry.correlate(&frame(json!({ "janus": "success", "transaction": "nope" }))));
        assert!(!registry.correlate(&frame(json!({ "janus": "event" }))));
    }

    #[tokio::test]
    async fn test_ids_unique_under_concurrency() {
        let (registry, _sent) = recording_registry();

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move {
                    (0..100)
                        .map(|_| registry.create(Request::info(), false, None).id().clone())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut ids = HashSet::new();
        for task in tasks {
            for id in task.await.expect("task") {
                assert!(ids.insert(id));
            }
        }
        assert_eq!(ids.len(), 800);
        assert_eq!(registry.len(), 800);
    }

    proptest! {
        #[test]
        fn prop_pending_ids_unique(count in 1usize..200) {
            let (registry, _sent) = recording_registry();
            let ids: HashSet<_> = (0..count)
                .map(|_| registry.create(Request::info(), false, None).id().clone())
                .collect();
            prop_assert_eq!(ids.len(), count);
        }
    }
}
