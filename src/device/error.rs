//! Probe fault types

use std::fmt;

use crate::backend::Backend;

/// Result type for probe executions
pub type ProbeResult<T> = Result<T, ProbeFault>;

/// Faults a backend can report while running a synthetic workload
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeFault {
    /// No runtime for this backend is linked into the executor
    NoRuntime(Backend),
    /// The backend raised an error while executing
    Execution(String),
    /// The workload produced NaN or infinity
    NonFinite {
        /// Stage that produced the bad value
        stage: &'static str,
    },
    /// Operand shapes did not line up
    ShapeMismatch {
        /// Expected inner dimension
        expected: usize,
        /// Actual inner dimension
        actual: usize,
    },
    /// The executor panicked
    Panicked(String),
}

impl fmt::Display for ProbeFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoRuntime(backend) => write!(f, "no {backend} runtime available in executor"),
            Self::Execution(msg) => write!(f, "{msg}"),
            Self::NonFinite { stage } => write!(f, "non-finite output in {stage}"),
            Self::ShapeMismatch { expected, actual } => {
                write!(
                    f,
                    "shape mismatch: expected inner dimension {expected}, got {actual}"
                )
            }
            Self::Panicked(msg) => write!(f, "executor panicked: {msg}"),
        }
    }
}

impl std::error::Error for ProbeFault {}

impl ProbeFault {
    /// Create an execution fault from backend error text
    #[must_use]
    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }

    /// Check if the fault means the backend is absent rather than broken
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::NoRuntime(_))
    }
}
