//! Capability records and the shared capability table
//!
//! Records are written once per (backend, class) by the probe at startup
//! and may later be revoked by the selector; they are never removed.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::backend::{Backend, CapabilityClass};

/// Default bound on stored error text, in characters
pub const DEFAULT_ERROR_LIMIT: usize = 100;

/// Marker appended to truncated error text
pub const TRUNCATION_MARKER: &str = "...";

/// Composite key `"{backend}_{class}"`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CapabilityKey {
    /// Backend the record describes
    pub backend: Backend,
    /// Capability class
    pub class: CapabilityClass,
}

impl CapabilityKey {
    /// Create a key
    #[must_use]
    pub const fn new(backend: Backend, class: CapabilityClass) -> Self {
        Self { backend, class }
    }
}

impl fmt::Display for CapabilityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.backend, self.class)
    }
}

/// Outcome of probing one backend for one capability class
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilityRecord {
    /// Backend the record describes
    pub backend: Backend,
    /// Whether the backend may be selected for this class
    pub available: bool,
    /// Whether a probe actually ran
    pub tested: bool,
    /// Bounded error text from the last failure
    pub last_error: Option<String>,
    /// 1.0 on success, 0.0 when unavailable
    pub performance_score: f32,
    /// When the record was last written
    pub last_test_time: SystemTime,
}

impl CapabilityRecord {
    /// Record for a probe that succeeded
    #[must_use]
    pub fn passed(backend: Backend) -> Self {
        Self {
            backend,
            available: true,
            tested: true,
            last_error: None,
            performance_score: 1.0,
            last_test_time: SystemTime::now(),
        }
    }

    /// Record for a probe that failed, with the error bounded to `limit` chars
    #[must_use]
    pub fn failed(backend: Backend, error: &str, limit: usize) -> Self {
        Self {
            backend,
            available: false,
            tested: true,
            last_error: Some(truncate_message(error, limit)),
            performance_score: 0.0,
            last_test_time: SystemTime::now(),
        }
    }

    /// Mark the record unavailable after a runtime failure
    pub fn revoke(&mut self, error: &str, limit: usize) {
        self.available = false;
        self.last_error = Some(truncate_message(error, limit));
        self.performance_score = 0.0;
        self.last_test_time = SystemTime::now();
    }

    /// Milliseconds since the Unix epoch of the last write
    #[must_use]
    pub fn last_test_time_ms(&self) -> u64 {
        self.last_test_time
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Bound `message` to `limit` characters, appending [`TRUNCATION_MARKER`] when cut
#[must_use]
pub fn truncate_message(message: &str, limit: usize) -> String {
    match message.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}{TRUNCATION_MARKER}", &message[..cut]),
        None => message.to_string(),
    }
}

/// Thread-safe map of capability records
///
/// Revocations take the write lock, so every later read from any thread
/// observes them.
#[derive(Debug, Default)]
pub struct CapabilityTable {
    records: RwLock<BTreeMap<CapabilityKey, CapabilityRecord>>,
}

impl CapabilityTable {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record
    pub fn insert(&self, key: CapabilityKey, record: CapabilityRecord) {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, record);
    }

    /// Copy of the record under `key`
    #[must_use]
    pub fn get(&self, key: CapabilityKey) -> Option<CapabilityRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
    }

    /// True only when a record exists and is available
    #[must_use]
    pub fn is_available(&self, key: CapabilityKey) -> bool {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .is_some_and(|record| record.available)
    }

    /// Mark an existing record unavailable.
    ///
    /// Returns `true` when the record existed and was available before.
    pub fn revoke(&self, key: CapabilityKey, error: &str, limit: usize) -> bool {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        match records.get_mut(&key) {
            Some(record) => {
                let was_available = record.available;
                record.revoke(error, limit);
                was_available
            }
            None => false,
        }
    }

    /// Ordered copy of every record
    #[must_use]
    pub fn snapshot(&self) -> Vec<(CapabilityKey, CapabilityRecord)> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(key, record)| (*key, record.clone()))
            .collect()
    }

    /// Number of records
    #[must_use]
    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Check if the table is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
