//! Backends, operation kinds and backend selection
//!
//! # Usage
//!
//! ```rust
//! use whisper_fallback::backend::{Backend, DeviceSelector, OperationKind, SelectorConfig};
//! use whisper_fallback::classifier::ErrorClassifier;
//! use whisper_fallback::device::PreferenceOrder;
//!
//! let selector = DeviceSelector::new(
//!     SelectorConfig::default(),
//!     PreferenceOrder::new([Backend::Metal]),
//!     ErrorClassifier::new(),
//! );
//!
//! // Nothing probed yet, so only CPU qualifies
//! let selection = selector.select(OperationKind::Transcription);
//! assert_eq!(selection.backend, Backend::Cpu);
//! ```

mod selector;
mod traits;

pub use selector::{
    BackendSelection, DeviceSelector, FallbackDecision, SelectionReason, SelectorConfig,
    DEFAULT_SUCCESS_THRESHOLD,
};
pub use traits::{Backend, CapabilityClass, OperationKind};
