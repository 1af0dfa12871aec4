//! Error types for whisper-fallback
//!
//! The engine entry points never fail; these errors only surface from
//! name parsing, report serialization and the diagnostic CLI.

use thiserror::Error;

/// Result type alias for fallback-engine helpers
pub type FallbackResult<T> = Result<T, FallbackError>;

/// Errors that can occur outside the engine's infallible hot path
#[derive(Debug, Error)]
pub enum FallbackError {
    /// Backend name did not match any known backend
    #[error("unknown backend: {0}")]
    UnknownBackend(String),

    /// Operation name did not match any known operation kind
    #[error("unknown operation kind: {0}")]
    UnknownOperation(String),

    /// Workload size name did not match any known model size
    #[error("unknown workload size: {0}")]
    UnknownWorkloadSize(String),

    /// Message locale name was not recognized
    #[error("unknown locale: {0}")]
    UnknownLocale(String),

    /// Status report could not be serialized
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
