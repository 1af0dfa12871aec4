//! Rolling per-(backend, operation) outcome history
//!
//! Each key keeps at most [`DEFAULT_HISTORY_CAPACITY`] outcomes, oldest
//! evicted first. The success rate only looks at the newest
//! [`DEFAULT_SUCCESS_WINDOW`] of them.
//!
//! One mutex guards the whole map. Records and reads for a key are totally
//! ordered by lock acquisition, and no reader ever sees a half-applied
//! append-and-evict.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

use crate::backend::{Backend, OperationKind};

/// Outcomes retained per key
pub const DEFAULT_HISTORY_CAPACITY: usize = 10;

/// Newest outcomes considered by [`HistoryTracker::recent_success_rate`]
pub const DEFAULT_SUCCESS_WINDOW: usize = 5;

/// Key of one rolling window
pub type HistoryKey = (Backend, OperationKind);

/// Thread-safe rolling outcome history
#[derive(Debug)]
pub struct HistoryTracker {
    capacity: usize,
    window: usize,
    entries: Mutex<HashMap<HistoryKey, VecDeque<bool>>>,
}

impl Default for HistoryTracker {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY, DEFAULT_SUCCESS_WINDOW)
    }
}

impl HistoryTracker {
    /// Create a tracker. Zero sizes are raised to one and the window never
    /// exceeds the capacity.
    #[must_use]
    pub fn new(capacity: usize, window: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            window: window.clamp(1, capacity),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Outcomes retained per key
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Outcomes considered by the success rate
    #[must_use]
    pub fn window(&self) -> usize {
        self.window
    }

    /// Append an outcome, evicting the oldest ones beyond capacity
    pub fn record(&self, backend: Backend, operation: OperationKind, success: bool) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let outcomes = entries
            .entry((backend, operation))
            .or_insert_with(|| VecDeque::with_capacity(self.capacity + 1));
        outcomes.push_back(success);
        while outcomes.len() > self.capacity {
            outcomes.pop_front();
        }
    }

    /// Append a success
    pub fn record_success(&self, backend: Backend, operation: OperationKind) {
        self.record(backend, operation, true);
    }

    /// Append a failure
    pub fn record_failure(&self, backend: Backend, operation: OperationKind) {
        self.record(backend, operation, false);
    }

    /// Fraction of successes among the newest `min(window, len)` outcomes,
    /// or `None` when the key has no history
    #[must_use]
    pub fn recent_success_rate(&self, backend: Backend, operation: OperationKind) -> Option<f64> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let outcomes = entries.get(&(backend, operation))?;
        let considered = outcomes.len().min(self.window);
        if considered == 0 {
            return None;
        }
        let successes = outcomes
            .iter()
            .rev()
            .take(considered)
            .filter(|success| **success)
            .count();
        Some(successes as f64 / considered as f64)
    }

    /// Copy of one key's outcomes, oldest first
    #[must_use]
    pub fn outcomes(&self, backend: Backend, operation: OperationKind) -> Vec<bool> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(backend, operation))
            .map(|outcomes| outcomes.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Ordered copy of every window, taken under one lock
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<HistoryKey, Vec<bool>> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(key, outcomes)| (*key, outcomes.iter().copied().collect()))
            .collect()
    }

    /// Number of keys with history
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Check if no outcome has been recorded yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
