//! Ordered multi-subscriber listener sets.
//!
//! Every entity exposes one [`Listeners`] per event category. Callbacks run
//! synchronously, in registration order, on the task that dispatches the
//! event. The set is snapshotted before invocation, so a callback may
//! register or remove listeners without deadlocking.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::identifiers::ListenerId;

// ============================================================================
// Types
// ============================================================================

/// Listener callback type.
pub type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

// ============================================================================
// Listeners
// ============================================================================

/// An ordered set of callbacks for a single event category.
pub struct Listeners<T> {
    entries: Mutex<Vec<(ListenerId, Listener<T>)>>,
}

impl<T> Default for Listeners<T> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }
}

impl<T> fmt::Debug for Listeners<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("len", &self.len())
            .finish()
    }
}

impl<T> Listeners<T> {
    /// Creates an empty listener set.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a callback and returns its token.
    pub fn add<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = ListenerId::next();
        self.entries.lock().push((id, Arc::new(listener)));
        id
    }

    /// Unregisters a callback. Returns `false` if the token is not in this set.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    /// Invokes every callback with `value`. Returns the number invoked.
    pub fn emit(&self, value: &T) -> usize {
        let snapshot: Vec<Listener<T>> = self
            .entries
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in &snapshot {
            listener(value);
        }

        snapshot.len()
    }

    /// Removes every callback.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Returns the number of registered callbacks.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` if no callbacks are registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
