//! Diagnostic snapshot of engine state
//!
//! [`StatusReport`] is a plain owned copy: the preference order, every
//! capability record, every rolling history window and the error counters.
//! It can be rendered as one JSON line for log shipping or as a short
//! human-readable summary.

use std::collections::BTreeMap;
use std::fmt::Write;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::backend::{Backend, DeviceSelector};
use crate::device::{CapabilityRecord, DetectionMethod};
use crate::error::FallbackResult;

/// Serializable view of one capability record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilitySnapshot {
    /// Backend the record describes
    pub backend: Backend,
    /// Whether the backend may be selected
    pub available: bool,
    /// Whether a probe actually ran
    pub tested: bool,
    /// Bounded error text from the last failure
    pub last_error: Option<String>,
    /// 1.0 when capable, 0.0 otherwise
    pub performance_score: f32,
    /// Last write, milliseconds since the Unix epoch
    pub last_test_time_ms: u64,
}

impl From<&CapabilityRecord> for CapabilitySnapshot {
    fn from(record: &CapabilityRecord) -> Self {
        Self {
            backend: record.backend,
            available: record.available,
            tested: record.tested,
            last_error: record.last_error.clone(),
            performance_score: record.performance_score,
            last_test_time_ms: record.last_test_time_ms(),
        }
    }
}

/// Point-in-time engine state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    /// Backends in preference order, CPU last
    pub preference_order: Vec<Backend>,
    /// Backend of last resort
    pub fallback_backend: Backend,
    /// How the preference order was produced
    pub detection: String,
    /// Capability records keyed `"{backend}_{class}"`
    pub capabilities: BTreeMap<String, CapabilitySnapshot>,
    /// Rolling outcome windows keyed `"{backend}_{operation}"`, oldest first
    pub history: BTreeMap<String, Vec<bool>>,
    /// Categorization counters keyed by category name
    pub error_statistics: BTreeMap<String, u64>,
    /// Capture time, milliseconds since the Unix epoch
    pub generated_at_ms: u64,
}

impl StatusReport {
    /// Capture the current state of `selector`
    #[must_use]
    pub fn capture(selector: &DeviceSelector, method: DetectionMethod) -> Self {
        let capabilities = selector
            .capabilities()
            .snapshot()
            .iter()
            .map(|(key, record)| (key.to_string(), CapabilitySnapshot::from(record)))
            .collect();

        let history = selector
            .history()
            .snapshot()
            .into_iter()
            .map(|((backend, operation), outcomes)| (format!("{backend}_{operation}"), outcomes))
            .collect();

        Self {
            preference_order: selector.order().as_slice().to_vec(),
            fallback_backend: Backend::Cpu,
            detection: method.to_string(),
            capabilities,
            history,
            error_statistics: selector.classifier().error_statistics(),
            generated_at_ms: now_ms(),
        }
    }

    /// Backends with at least one available capability
    #[must_use]
    pub fn usable_backends(&self) -> Vec<Backend> {
        self.preference_order
            .iter()
            .copied()
            .filter(|backend| {
                self.capabilities
                    .values()
                    .any(|snapshot| snapshot.backend == *backend && snapshot.available)
            })
            .collect()
    }

    /// Total categorized errors
    #[must_use]
    pub fn total_errors(&self) -> u64 {
        self.error_statistics.values().sum()
    }

    /// Render as a single JSON line
    pub fn to_json_line(&self) -> FallbackResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Render as indented JSON
    pub fn to_json_pretty(&self) -> FallbackResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Human-readable multi-line summary
    #[must_use]
    pub fn summary(&self) -> String {
        let order: Vec<&str> = self.preference_order.iter().map(Backend::name).collect();
        let mut s = format!(
            "Preference order: [{}] ({})\n",
            order.join(", "),
            self.detection
        );
        let _ = writeln!(s, "Fallback backend: {}", self.fallback_backend);

        s.push_str("Capabilities:\n");
        for (key, snapshot) in &self.capabilities {
            let state = if snapshot.available { "available" } else { "unavailable" };
            match &snapshot.last_error {
                Some(error) => {
                    let _ = writeln!(s, "  {key:<24} {state} ({error})");
                }
                None => {
                    let _ = writeln!(s, "  {key:<24} {state}");
                }
            }
        }

        if !self.history.is_empty() {
            s.push_str("History:\n");
            for (key, outcomes) in &self.history {
                let marks: String = outcomes
                    .iter()
                    .map(|success| if *success { '+' } else { '-' })
                    .collect();
                let _ = writeln!(s, "  {key:<24} {marks}");
            }
        }

        let _ = write!(s, "Errors: {}", self.total_errors());
        for (name, count) in self.error_statistics.iter().filter(|(_, count)| **count > 0) {
            let _ = write!(s, " {name}={count}");
        }
        s
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
