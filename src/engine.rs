//! Engine facade
//!
//! [`EngineHandle`] is built once at startup and shared by reference (or
//! behind an `Arc`) with every worker. Construction detects the host's
//! backends and probes each of them; after that every call is bounded-time
//! and infallible.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use whisper_fallback::backend::{Backend, OperationKind};
//! use whisper_fallback::device::{ScriptedExecutor, SimulatedHost};
//! use whisper_fallback::engine::{EngineConfig, EngineHandle};
//!
//! let engine = EngineHandle::simulated(
//!     EngineConfig::quick(),
//!     &SimulatedHost::apple_silicon(),
//!     Arc::new(ScriptedExecutor::all_pass()),
//! );
//!
//! let selection = engine.select(OperationKind::Transcription, None);
//! assert_eq!(selection.backend, Backend::Metal);
//!
//! let (next, message) = engine.report_failure(
//!     "Could not run 'aten::empty.memory_format' with arguments from the 'SparseMPS' backend",
//!     OperationKind::Transcription,
//!     Backend::Metal,
//! );
//! assert_eq!(next, Backend::Cpu);
//! assert!(!message.is_empty());
//! ```

use std::sync::Arc;

use crate::backend::{
    Backend, BackendSelection, DeviceSelector, FallbackDecision, OperationKind, SelectionReason,
    SelectorConfig,
};
use crate::classifier::{ErrorCategory, ErrorClassifier, MessageLocale};
use crate::device::{
    detect_preference_order, detect_simulated, BackendExecutor, CapabilityProbe,
    CpuReferenceExecutor, DetectionOptions, HostDetection, ModelProbeShape, PreferenceOrder,
    SimulatedHost,
};
use crate::settings::{ConfigurationBundle, SettingsProvider, WorkloadSize};
use crate::status::StatusReport;

/// Engine configuration
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Host detection options
    pub detection: DetectionOptions,
    /// Selection thresholds and history sizes
    pub selector: SelectorConfig,
    /// Dimensions of the model-shaped probe
    pub model_shape: ModelProbeShape,
    /// Language of user-facing messages
    pub locale: MessageLocale,
    /// Categories that keep the failing backend
    pub retained_categories: Vec<ErrorCategory>,
}

impl EngineConfig {
    /// Production defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults with a reduced model probe, for fast startup
    #[must_use]
    pub fn quick() -> Self {
        Self::default().with_model_shape(ModelProbeShape::reduced())
    }

    /// Never consider a GPU
    #[must_use]
    pub fn cpu_only() -> Self {
        Self::default().with_detection(DetectionOptions::cpu_only())
    }

    /// Set detection options
    #[must_use]
    pub fn with_detection(mut self, detection: DetectionOptions) -> Self {
        self.detection = detection;
        self
    }

    /// Set the selector configuration
    #[must_use]
    pub fn with_selector(mut self, selector: SelectorConfig) -> Self {
        self.selector = selector;
        self
    }

    /// Set history capacity and success window
    #[must_use]
    pub fn with_history(mut self, capacity: usize, window: usize) -> Self {
        self.selector = self.selector.with_history(capacity, window);
        self
    }

    /// Set the success threshold
    #[must_use]
    pub fn with_success_threshold(mut self, threshold: f64) -> Self {
        self.selector = self.selector.with_success_threshold(threshold);
        self
    }

    /// Set the stored error bound
    #[must_use]
    pub fn with_error_limit(mut self, limit: usize) -> Self {
        self.selector = self.selector.with_error_limit(limit);
        self
    }

    /// Set the model probe dimensions
    #[must_use]
    pub fn with_model_shape(mut self, shape: ModelProbeShape) -> Self {
        self.model_shape = shape;
        self
    }

    /// Set the message locale
    #[must_use]
    pub fn with_locale(mut self, locale: MessageLocale) -> Self {
        self.locale = locale;
        self
    }

    /// Keep the failing backend for `category`
    #[must_use]
    pub fn with_retained_category(mut self, category: ErrorCategory) -> Self {
        if !self.retained_categories.contains(&category) {
            self.retained_categories.push(category);
        }
        self
    }

    fn classifier(&self) -> ErrorClassifier {
        self.retained_categories
            .iter()
            .fold(ErrorClassifier::new().with_locale(self.locale), |c, category| {
                c.with_retained(*category)
            })
    }
}

/// Backend plus the decode settings to run it with
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSelection {
    /// Selected backend
    pub backend: Backend,
    /// Why it was selected
    pub reason: SelectionReason,
    /// Settings for the decode call
    pub settings: ConfigurationBundle,
}

impl EngineSelection {
    /// `(backend, settings)` pair
    #[must_use]
    pub fn into_parts(self) -> (Backend, ConfigurationBundle) {
        (self.backend, self.settings)
    }
}

/// Shared engine state
#[derive(Debug)]
pub struct EngineHandle {
    detection: HostDetection,
    selector: DeviceSelector,
    settings: SettingsProvider,
}

impl EngineHandle {
    /// Detect the host, probe with the CPU reference executor, default config
    #[must_use]
    pub fn initialize() -> Self {
        Self::initialize_with(EngineConfig::default(), Arc::new(CpuReferenceExecutor))
    }

    /// Detect the host and probe every backend through `executor`
    #[must_use]
    pub fn initialize_with(config: EngineConfig, executor: Arc<dyn BackendExecutor>) -> Self {
        let detection = detect_preference_order(&config.detection);
        Self::from_detection(config, detection, executor)
    }

    /// Build on a simulated host
    #[must_use]
    pub fn simulated(
        config: EngineConfig,
        host: &SimulatedHost,
        executor: Arc<dyn BackendExecutor>,
    ) -> Self {
        Self::from_detection(config, detect_simulated(host), executor)
    }

    /// Build on an existing detection result
    #[must_use]
    pub fn from_detection(
        config: EngineConfig,
        detection: HostDetection,
        executor: Arc<dyn BackendExecutor>,
    ) -> Self {
        tracing::info!("{}", detection.summary());

        let classifier = config.classifier();
        let selector = DeviceSelector::new(config.selector.clone(), detection.order.clone(), classifier);

        CapabilityProbe::new(executor)
            .with_model_shape(config.model_shape)
            .with_error_limit(config.selector.error_limit)
            .probe_all(selector.order(), selector.capabilities());

        Self {
            detection,
            selector,
            settings: SettingsProvider::new(),
        }
    }

    /// Backends in preference order
    #[must_use]
    pub fn preference_order(&self) -> &PreferenceOrder {
        self.selector.order()
    }

    /// Host detection result
    #[must_use]
    pub fn detection(&self) -> &HostDetection {
        &self.detection
    }

    /// Underlying selector
    #[must_use]
    pub fn selector(&self) -> &DeviceSelector {
        &self.selector
    }

    /// Pick a backend and its settings for `operation`
    pub fn select(&self, operation: OperationKind, size: Option<WorkloadSize>) -> EngineSelection {
        let BackendSelection { backend, reason, .. } = self.selector.select(operation);
        EngineSelection {
            backend,
            reason,
            settings: self.settings.settings_for(backend, size),
        }
    }

    /// Record a successful run
    pub fn report_success(&self, backend: Backend, operation: OperationKind) {
        self.selector.report_success(backend, operation);
    }

    /// Record a failed run; returns the backend to retry on and a user message
    pub fn report_failure(
        &self,
        error: &str,
        operation: OperationKind,
        backend: Backend,
    ) -> (Backend, String) {
        self.report_failure_detailed(error, operation, backend).into_parts()
    }

    /// [`Self::report_failure`] with the category and revocation flag
    pub fn report_failure_detailed(
        &self,
        error: &str,
        operation: OperationKind,
        backend: Backend,
    ) -> FallbackDecision {
        self.selector.report_failure(error, operation, backend)
    }

    /// Snapshot of the engine state
    #[must_use]
    pub fn status_report(&self) -> StatusReport {
        StatusReport::capture(&self.selector, self.detection.method)
    }
}
