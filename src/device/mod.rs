//! Compute device discovery and capability probing
//!
//! Finds which accelerator runtimes the host exposes, probes each one with
//! small synthetic workloads and caches the outcome per capability class.
//!
//! # Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use whisper_fallback::device::{
//!     detect_simulated, CapabilityProbe, CapabilityTable, CpuReferenceExecutor,
//!     ModelProbeShape, SimulatedHost,
//! };
//!
//! let detection = detect_simulated(&SimulatedHost::apple_silicon());
//! let table = CapabilityTable::new();
//! CapabilityProbe::new(Arc::new(CpuReferenceExecutor))
//!     .with_model_shape(ModelProbeShape::reduced())
//!     .probe_all(&detection.order, &table);
//!
//! // No Metal runtime behind the reference executor
//! assert_eq!(table.len(), 6);
//! ```

mod capabilities;
mod detect;
mod error;
mod probe;

pub use capabilities::{
    truncate_message, CapabilityKey, CapabilityRecord, CapabilityTable, DEFAULT_ERROR_LIMIT,
    TRUNCATION_MARKER,
};
pub use detect::{
    detect_preference_order, detect_simulated, DetectionMethod, DetectionOptions, HostDetection,
    PreferenceOrder, SimulatedHost,
};
pub use error::{ProbeFault, ProbeResult};
pub use probe::{
    BackendExecutor, CapabilityProbe, CpuReferenceExecutor, ModelProbeShape, ProbeKind,
    ProbeOutput, ProbeWorkload, ScriptedExecutor, ScriptedOutcome, BASIC_PROBE_DIM,
};
