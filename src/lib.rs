//! # whisper-fallback
//!
//! Adaptive compute-backend selection and fallback for Whisper inference.
//!
//! ## Overview
//!
//! The engine decides which hardware backend (Metal, CUDA or CPU) runs each
//! unit of work. At startup it detects the host's accelerators and probes
//! each one with small synthetic workloads. At call time it picks the first
//! capable backend with a healthy recent track record. When work fails it
//! classifies the error, revokes capabilities that are known to be broken
//! and names the next backend to retry on. CPU is always the last resort,
//! so selection never fails.
//!
//! The engine never runs the model itself. Callers own the compute runtime
//! and report outcomes back.
//!
//! ## Quick Start
//!
//! ```rust
//! use whisper_fallback::{EngineConfig, EngineHandle, OperationKind, WorkloadSize};
//!
//! let engine = EngineHandle::initialize_with(
//!     EngineConfig::quick(),
//!     std::sync::Arc::new(whisper_fallback::device::CpuReferenceExecutor),
//! );
//!
//! let (backend, settings) = engine
//!     .select(OperationKind::Transcription, Some(WorkloadSize::Base))
//!     .into_parts();
//! // ... run the model on `backend` with `settings` ...
//! engine.report_success(backend, OperationKind::Transcription);
//! # let _ = settings;
//! ```
//!
//! ## Features
//!
//! - `cli` (default): the `whisper-fallback` diagnostic binary

#![warn(missing_docs)]
#![deny(clippy::unwrap_used)]

pub mod backend;
pub mod classifier;
pub mod device;
pub mod engine;
pub mod error;
pub mod history;
pub mod settings;
pub mod status;

/// CLI module for the diagnostic command-line interface
#[cfg(feature = "cli")]
pub mod cli;

pub use backend::{Backend, BackendSelection, DeviceSelector, FallbackDecision, OperationKind};
pub use classifier::{categorize_text, ErrorCategory, ErrorClassifier, MessageLocale};
pub use device::{PreferenceOrder, SimulatedHost};
pub use engine::{EngineConfig, EngineHandle, EngineSelection};
pub use error::{FallbackError, FallbackResult};
pub use history::HistoryTracker;
pub use settings::{settings_for, ConfigurationBundle, SettingsProvider, WorkloadSize};
pub use status::StatusReport;
