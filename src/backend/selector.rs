//! Backend selection and failure fallback
//!
//! The selector walks the preference order and picks the first backend
//! that both passed its capability probe and has a healthy recent history.
//! Backends without history get an optimistic first try. When a caller
//! reports a failure the selector classifies it, records it, revokes the
//! capability for backend-fatal categories and names the next backend.
//!
//! Neither path can fail: CPU terminates every walk.

use super::traits::{Backend, OperationKind};
use crate::classifier::{ErrorCategory, ErrorClassifier};
use crate::device::{
    CapabilityKey, CapabilityTable, PreferenceOrder, DEFAULT_ERROR_LIMIT,
};
use crate::history::{HistoryTracker, DEFAULT_HISTORY_CAPACITY, DEFAULT_SUCCESS_WINDOW};

/// Success rate a backend must strictly exceed to be reselected
pub const DEFAULT_SUCCESS_THRESHOLD: f64 = 0.8;

/// Selector configuration
#[derive(Debug, Clone)]
pub struct SelectorConfig {
    /// Recent success rate a backend must strictly exceed
    pub success_threshold: f64,
    /// Outcomes retained per (backend, operation)
    pub history_capacity: usize,
    /// Newest outcomes used for the success rate
    pub success_window: usize,
    /// Bound on stored error text, in characters
    pub error_limit: usize,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            success_threshold: DEFAULT_SUCCESS_THRESHOLD,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            success_window: DEFAULT_SUCCESS_WINDOW,
            error_limit: DEFAULT_ERROR_LIMIT,
        }
    }
}

impl SelectorConfig {
    /// Set the success threshold
    #[must_use]
    pub fn with_success_threshold(mut self, threshold: f64) -> Self {
        self.success_threshold = threshold;
        self
    }

    /// Set history capacity and success window
    #[must_use]
    pub fn with_history(mut self, capacity: usize, window: usize) -> Self {
        self.history_capacity = capacity;
        self.success_window = window;
        self
    }

    /// Set the stored error bound
    #[must_use]
    pub fn with_error_limit(mut self, limit: usize) -> Self {
        self.error_limit = limit;
        self
    }
}

/// Why a backend was selected
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SelectionReason {
    /// Capable and never tried for this operation
    NoHistory,
    /// Capable with a recent success rate above the threshold
    Healthy {
        /// Recent success rate
        success_rate: f64,
    },
    /// Nothing else qualified; CPU is the backend of last resort
    TerminalFallback,
}

impl std::fmt::Display for SelectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoHistory => write!(f, "no history, trying"),
            Self::Healthy { success_rate } => write!(f, "success rate {success_rate:.2}"),
            Self::TerminalFallback => write!(f, "terminal fallback"),
        }
    }
}

/// Backend selection result
#[derive(Debug, Clone, PartialEq)]
pub struct BackendSelection {
    /// Selected backend
    pub backend: Backend,
    /// Operation it was selected for
    pub operation: OperationKind,
    /// Reason for selection
    pub reason: SelectionReason,
}

impl BackendSelection {
    /// Check if a GPU was selected
    #[must_use]
    pub fn is_gpu(&self) -> bool {
        self.backend.is_gpu()
    }

    /// Check if CPU was selected
    #[must_use]
    pub fn is_cpu(&self) -> bool {
        self.backend.is_cpu()
    }
}

impl std::fmt::Display for BackendSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} for {}: {}", self.backend, self.operation, self.reason)
    }
}

/// Outcome of reporting a failure
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackDecision {
    /// Backend to use next
    pub next_backend: Backend,
    /// Category of the reported error
    pub category: ErrorCategory,
    /// Explanation to show the user
    pub user_message: &'static str,
    /// The failing backend lost this capability just now
    pub capability_revoked: bool,
}

impl FallbackDecision {
    /// `(next_backend, user_message)` pair
    #[must_use]
    pub fn into_parts(self) -> (Backend, String) {
        (self.next_backend, self.user_message.to_string())
    }
}

/// Backend selector
#[derive(Debug)]
pub struct DeviceSelector {
    config: SelectorConfig,
    order: PreferenceOrder,
    capabilities: CapabilityTable,
    history: HistoryTracker,
    classifier: ErrorClassifier,
}

impl DeviceSelector {
    /// Create a selector with an empty capability table
    #[must_use]
    pub fn new(config: SelectorConfig, order: PreferenceOrder, classifier: ErrorClassifier) -> Self {
        let history = HistoryTracker::new(config.history_capacity, config.success_window);
        Self {
            config,
            order,
            capabilities: CapabilityTable::new(),
            history,
            classifier,
        }
    }

    /// Get selector configuration
    #[must_use]
    pub fn config(&self) -> &SelectorConfig {
        &self.config
    }

    /// Preference order
    #[must_use]
    pub fn order(&self) -> &PreferenceOrder {
        &self.order
    }

    /// Capability table
    #[must_use]
    pub fn capabilities(&self) -> &CapabilityTable {
        &self.capabilities
    }

    /// Outcome history
    #[must_use]
    pub fn history(&self) -> &HistoryTracker {
        &self.history
    }

    /// Error classifier
    #[must_use]
    pub fn classifier(&self) -> &ErrorClassifier {
        &self.classifier
    }

    fn is_capable(&self, backend: Backend, operation: OperationKind) -> bool {
        self.capabilities
            .is_available(CapabilityKey::new(backend, operation.capability_class()))
    }

    /// Select a backend for `operation`
    pub fn select(&self, operation: OperationKind) -> BackendSelection {
        for backend in self.order.iter() {
            if !self.is_capable(backend, operation) {
                continue;
            }

            let reason = match self.history.recent_success_rate(backend, operation) {
                None => SelectionReason::NoHistory,
                Some(rate) if rate > self.config.success_threshold => {
                    SelectionReason::Healthy { success_rate: rate }
                }
                Some(rate) => {
                    tracing::debug!(%backend, %operation, success_rate = rate, "skipping unhealthy backend");
                    continue;
                }
            };

            tracing::debug!(%backend, %operation, %reason, "selected backend");
            return BackendSelection {
                backend,
                operation,
                reason,
            };
        }

        tracing::info!(%operation, "falling back to cpu");
        BackendSelection {
            backend: Backend::Cpu,
            operation,
            reason: SelectionReason::TerminalFallback,
        }
    }

    /// Record a successful run
    pub fn report_success(&self, backend: Backend, operation: OperationKind) {
        self.history.record_success(backend, operation);
    }

    /// Record a failed run and pick the backend to retry on
    pub fn report_failure(
        &self,
        error: &str,
        operation: OperationKind,
        current: Backend,
    ) -> FallbackDecision {
        let category = self.classifier.categorize(error);
        tracing::warn!(
            backend = %current,
            %operation,
            %category,
            error = %crate::device::truncate_message(error, self.config.error_limit),
            "backend error"
        );

        self.history.record_failure(current, operation);

        let mut capability_revoked = false;
        if category.is_backend_fatal() {
            let key = CapabilityKey::new(current, operation.capability_class());
            capability_revoked = self.capabilities.revoke(key, error, self.config.error_limit);
            if capability_revoked {
                tracing::error!(
                    backend = %current,
                    %operation,
                    %category,
                    "known backend incompatibility, disabling backend for operation"
                );
            }
        }

        let next_backend = if self.classifier.should_trigger_fallback(category) {
            self.next_candidate(operation, current)
        } else {
            tracing::info!(backend = %current, %category, "retaining backend");
            current
        };

        FallbackDecision {
            next_backend,
            category,
            user_message: self.classifier.user_message(category),
            capability_revoked,
        }
    }

    fn next_candidate(&self, operation: OperationKind, current: Backend) -> Backend {
        match self
            .order
            .without(current)
            .find(|backend| self.is_capable(*backend, operation))
        {
            Some(backend) => {
                tracing::info!(from = %current, to = %backend, %operation, "falling back");
                backend
            }
            None => {
                tracing::info!(from = %current, %operation, "ultimate fallback to cpu");
                Backend::Cpu
            }
        }
    }

    /// Get a summary of backends and their capabilities
    #[must_use]
    pub fn summary(&self) -> String {
        use std::fmt::Write;
        let mut s = format!("Device Selector {}\n", self.order);
        for (key, record) in self.capabilities.snapshot() {
            let _ = writeln!(
                s,
                "  {key}: available={}, score={:.1}",
                record.available, record.performance_score
            );
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CapabilityClass;
    use crate::device::CapabilityRecord;

    const OP: OperationKind = OperationKind::Transcription;

    fn selector(order: &[Backend]) -> DeviceSelector {
        DeviceSelector::new(
            SelectorConfig::default(),
            PreferenceOrder::new(order.iter().copied()),
            ErrorClassifier::new(),
        )
    }

    /// Mark every class of `backend` as passed or failed
    fn set_capable(selector: &DeviceSelector, backend: Backend, available: bool) {
        for class in CapabilityClass::ALL {
            let record = if available {
                CapabilityRecord::passed(backend)
            } else {
                CapabilityRecord::failed(backend, "probe failed", DEFAULT_ERROR_LIMIT)
            };
            selector
                .capabilities()
                .insert(CapabilityKey::new(backend, class), record);
        }
    }

    fn record_history(selector: &DeviceSelector, backend: Backend, outcomes: &[bool]) {
        for &success in outcomes {
            selector.history().record(backend, OP, success);
        }
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    #[test]
    fn test_selector_config_default() {
        let config = SelectorConfig::default();
        assert_eq!(config.success_threshold, 0.8);
        assert_eq!(config.history_capacity, 10);
        assert_eq!(config.success_window, 5);
        assert_eq!(config.error_limit, 100);
    }

    #[test]
    fn test_selector_config_builders() {
        let config = SelectorConfig::default()
            .with_success_threshold(0.5)
            .with_history(20, 8)
            .with_error_limit(40);
        assert_eq!(config.success_threshold, 0.5);
        assert_eq!(config.history_capacity, 20);
        assert_eq!(config.success_window, 8);
        assert_eq!(config.error_limit, 40);
    }

    // =========================================================================
    // Selection
    // =========================================================================

    #[test]
    fn test_select_prefers_first_capable_without_history() {
        let selector = selector(&[Backend::Metal, Backend::Cuda]);
        set_capable(&selector, Backend::Metal, true);
        set_capable(&selector, Backend::Cuda, true);
        set_capable(&selector, Backend::Cpu, true);

        let selection = selector.select(OP);
        assert_eq!(selection.backend, Backend::Metal);
        assert_eq!(selection.reason, SelectionReason::NoHistory);
        assert!(selection.is_gpu());
    }

    #[test]
    fn test_select_skips_missing_records() {
        let selector = selector(&[Backend::Metal]);
        let selection = selector.select(OP);
        assert!(selection.is_cpu());
        assert_eq!(selection.reason, SelectionReason::TerminalFallback);
    }

    #[test]
    fn test_select_skips_incapable() {
        let selector = selector(&[Backend::Metal, Backend::Cuda]);
        set_capable(&selector, Backend::Metal, false);
        set_capable(&selector, Backend::Cuda, true);
        assert_eq!(selector.select(OP).backend, Backend::Cuda);
    }

    #[test]
    fn test_select_cpu_when_all_gpus_unavailable() {
        let selector = selector(&[Backend::Metal, Backend::Cuda]);
        set_capable(&selector, Backend::Metal, false);
        set_capable(&selector, Backend::Cuda, false);
        set_capable(&selector, Backend::Cpu, true);
        let selection = selector.select(OP);
        assert_eq!(selection.backend, Backend::Cpu);
    }

    #[test]
    fn test_select_cpu_even_when_cpu_probe_failed() {
        let selector = selector(&[Backend::Metal]);
        set_capable(&selector, Backend::Metal, false);
        set_capable(&selector, Backend::Cpu, false);
        let selection = selector.select(OP);
        assert_eq!(selection.backend, Backend::Cpu);
        assert_eq!(selection.reason, SelectionReason::TerminalFallback);
    }

    #[test]
    fn test_threshold_is_strict() {
        // 4 of 5 = 0.8 exactly, not above the threshold
        let selector = selector(&[Backend::Metal]);
        set_capable(&selector, Backend::Metal, true);
        record_history(&selector, Backend::Metal, &[true, true, true, true, false]);
        let selection = selector.select(OP);
        assert_eq!(selection.backend, Backend::Cpu);
        assert_eq!(selection.reason, SelectionReason::TerminalFallback);
    }

    #[test]
    fn test_wider_window_recovers() {
        // 9 of 10 = 0.9
        let selector = DeviceSelector::new(
            SelectorConfig::default().with_history(10, 10),
            PreferenceOrder::new([Backend::Metal]),
            ErrorClassifier::new(),
        );
        set_capable(&selector, Backend::Metal, true);
        record_history(&selector, Backend::Metal, &[true, true, true, true, false]);
        record_history(&selector, Backend::Metal, &[true; 5]);
        let selection = selector.select(OP);
        assert_eq!(selection.backend, Backend::Metal);
        assert!(matches!(selection.reason, SelectionReason::Healthy { .. }));
    }

    #[test]
    fn test_threshold_just_above_selects() {
        let selector = DeviceSelector::new(
            SelectorConfig::default().with_success_threshold(0.79),
            PreferenceOrder::new([Backend::Metal]),
            ErrorClassifier::new(),
        );
        set_capable(&selector, Backend::Metal, true);
        record_history(&selector, Backend::Metal, &[true, true, true, true, false]);
        assert_eq!(selector.select(OP).backend, Backend::Metal);
    }

    #[test]
    fn test_select_healthy_history() {
        let selector = selector(&[Backend::Cuda]);
        set_capable(&selector, Backend::Cuda, true);
        record_history(&selector, Backend::Cuda, &[true; 5]);
        let selection = selector.select(OP);
        assert_eq!(selection.backend, Backend::Cuda);
        assert_eq!(
            selection.reason,
            SelectionReason::Healthy { success_rate: 1.0 }
        );
    }

    #[test]
    fn test_select_basic_uses_basic_key() {
        let selector = selector(&[Backend::Metal]);
        selector.capabilities().insert(
            CapabilityKey::new(Backend::Metal, CapabilityClass::Basic),
            CapabilityRecord::passed(Backend::Metal),
        );
        assert_eq!(
            selector.select(OperationKind::BasicTensorOp).backend,
            Backend::Metal
        );
        assert_eq!(selector.select(OP).backend, Backend::Cpu);
    }

    // =========================================================================
    // Failure reporting
    // =========================================================================

    #[test]
    fn test_report_failure_excludes_current() {
        let selector = selector(&[Backend::Metal, Backend::Cuda]);
        set_capable(&selector, Backend::Metal, true);
        set_capable(&selector, Backend::Cuda, true);
        set_capable(&selector, Backend::Cpu, true);

        let decision = selector.report_failure("kernel crashed", OP, Backend::Metal);
        assert_eq!(decision.next_backend, Backend::Cuda);
        assert_eq!(decision.category, ErrorCategory::Unknown);
        assert!(!decision.capability_revoked);
        // Unknown errors leave the capability intact
        assert!(selector
            .capabilities()
            .is_available(CapabilityKey::new(Backend::Metal, CapabilityClass::Transcription)));
    }

    #[test]
    fn test_report_failure_only_cpu_available() {
        let selector = selector(&[Backend::Metal, Backend::Cuda]);
        set_capable(&selector, Backend::Metal, true);
        set_capable(&selector, Backend::Cuda, false);
        set_capable(&selector, Backend::Cpu, true);

        let decision = selector.report_failure("out of memory", OP, Backend::Metal);
        assert_eq!(decision.next_backend, Backend::Cpu);
        assert_eq!(decision.category, ErrorCategory::OutOfMemory);
    }

    #[test]
    fn test_report_failure_ultimate_cpu() {
        let selector = selector(&[Backend::Metal]);
        set_capable(&selector, Backend::Metal, true);
        set_capable(&selector, Backend::Cpu, false);
        let decision = selector.report_failure("???", OP, Backend::Metal);
        assert_eq!(decision.next_backend, Backend::Cpu);
    }

    #[test]
    fn test_report_failure_on_cpu_returns_cpu() {
        let selector = selector(&[Backend::Metal]);
        set_capable(&selector, Backend::Metal, false);
        set_capable(&selector, Backend::Cpu, true);
        let decision = selector.report_failure("???", OP, Backend::Cpu);
        assert_eq!(decision.next_backend, Backend::Cpu);
    }

    #[test]
    fn test_report_failure_fatal_revokes() {
        let selector = selector(&[Backend::Metal]);
        set_capable(&selector, Backend::Metal, true);
        set_capable(&selector, Backend::Cpu, true);

        let decision =
            selector.report_failure("aten::empty.memory_format not supported", OP, Backend::Metal);
        assert_eq!(decision.category, ErrorCategory::MemoryFormatMismatch);
        assert!(decision.capability_revoked);
        assert_eq!(decision.next_backend, Backend::Cpu);

        let key = CapabilityKey::new(Backend::Metal, CapabilityClass::Transcription);
        let record = selector.capabilities().get(key).expect("record kept");
        assert!(!record.available);
        assert!(record.last_error.is_some());
        // Other operation kinds keep their capability
        assert!(selector
            .capabilities()
            .is_available(CapabilityKey::new(Backend::Metal, CapabilityClass::ModelLoading)));
    }

    #[test]
    fn test_report_failure_records_history() {
        let selector = selector(&[Backend::Metal]);
        selector.report_failure("x", OP, Backend::Metal);
        selector.report_success(Backend::Metal, OP);
        assert_eq!(selector.history().outcomes(Backend::Metal, OP), vec![false, true]);
        assert_eq!(selector.classifier().count(ErrorCategory::Unknown), 1);
    }

    #[test]
    fn test_report_failure_retained_category_stays() {
        let selector = DeviceSelector::new(
            SelectorConfig::default(),
            PreferenceOrder::new([Backend::Cuda]),
            ErrorClassifier::new().with_retained(ErrorCategory::OutOfMemory),
        );
        set_capable(&selector, Backend::Cuda, true);
        set_capable(&selector, Backend::Cpu, true);
        let decision = selector.report_failure("CUDA out of memory", OP, Backend::Cuda);
        assert_eq!(decision.next_backend, Backend::Cuda);
        assert_eq!(decision.user_message, "GPU is out of memory. Switching backend.");
    }

    #[test]
    fn test_fallback_decision_into_parts() {
        let selector = selector(&[Backend::Metal]);
        let (backend, message) = selector.report_failure("SparseMPS backend", OP, Backend::Metal).into_parts();
        assert_eq!(backend, Backend::Cpu);
        assert!(!message.is_empty());
    }

    // =========================================================================
    // Display
    // =========================================================================

    #[test]
    fn test_selection_display() {
        let selection = BackendSelection {
            backend: Backend::Metal,
            operation: OP,
            reason: SelectionReason::Healthy { success_rate: 0.9 },
        };
        let s = selection.to_string();
        assert!(s.contains("metal"));
        assert!(s.contains("transcription"));
        assert!(s.contains("0.90"));
    }

    #[test]
    fn test_selector_summary() {
        let selector = selector(&[Backend::Metal]);
        set_capable(&selector, Backend::Metal, true);
        let summary = selector.summary();
        assert!(summary.contains("metal_basic"));
        assert!(summary.contains("[metal, cpu]"));
    }
}
