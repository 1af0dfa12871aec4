//! Backend and workload vocabulary
//!
//! Closed enumerations shared by every component: the hardware targets
//! a unit of work can run on, the kinds of work whose suitability is
//! tracked independently, and the capability classes probed at startup.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::FallbackError;

/// Compute backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Host CPU, the backend of last resort
    Cpu,
    /// Apple GPU via Metal Performance Shaders
    Metal,
    /// NVIDIA GPU via CUDA
    Cuda,
}

impl Backend {
    /// All known backends, GPU first
    pub const ALL: [Backend; 3] = [Backend::Metal, Backend::Cuda, Backend::Cpu];

    /// Check if this is a GPU backend
    #[must_use]
    pub const fn is_gpu(&self) -> bool {
        matches!(self, Self::Metal | Self::Cuda)
    }

    /// Check if this is the CPU backend
    #[must_use]
    pub const fn is_cpu(&self) -> bool {
        matches!(self, Self::Cpu)
    }

    /// Stable lowercase name, used in composite keys
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Metal => "metal",
            Self::Cuda => "cuda",
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Backend {
    type Err = FallbackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(Self::Cpu),
            // torch spells the Metal device "mps"
            "metal" | "mps" | "gpu_metal" => Ok(Self::Metal),
            "cuda" | "gpu_cuda" => Ok(Self::Cuda),
            other => Err(FallbackError::UnknownBackend(other.to_string())),
        }
    }
}

/// Kind of workload whose backend suitability is tracked separately
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Loading model weights onto the backend
    ModelLoading,
    /// Running a transcription pass
    Transcription,
    /// Plain tensor arithmetic
    BasicTensorOp,
}

impl OperationKind {
    /// All known operation kinds
    pub const ALL: [OperationKind; 3] = [
        OperationKind::ModelLoading,
        OperationKind::Transcription,
        OperationKind::BasicTensorOp,
    ];

    /// Stable snake_case name
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ModelLoading => "model_loading",
            Self::Transcription => "transcription",
            Self::BasicTensorOp => "basic_tensor",
        }
    }

    /// Capability class consulted when selecting a backend for this kind
    #[must_use]
    pub const fn capability_class(&self) -> CapabilityClass {
        match self {
            Self::ModelLoading => CapabilityClass::ModelLoading,
            Self::Transcription => CapabilityClass::Transcription,
            Self::BasicTensorOp => CapabilityClass::Basic,
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OperationKind {
    type Err = FallbackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "model_loading" | "load" => Ok(Self::ModelLoading),
            "transcription" | "transcribe" => Ok(Self::Transcription),
            "basic_tensor" | "basic_tensor_op" | "basic" => Ok(Self::BasicTensorOp),
            other => Err(FallbackError::UnknownOperation(other.to_string())),
        }
    }
}

/// Capability class under which probe results are cached
///
/// `Basic` comes from the elementwise check; the operation-specific
/// classes both come from the model-shaped check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CapabilityClass {
    /// Minimal tensor arithmetic
    Basic,
    /// Model-shaped workload, consulted for model loading
    ModelLoading,
    /// Model-shaped workload, consulted for transcription
    Transcription,
}

impl CapabilityClass {
    /// All capability classes in probe order
    pub const ALL: [CapabilityClass; 3] = [
        CapabilityClass::Basic,
        CapabilityClass::ModelLoading,
        CapabilityClass::Transcription,
    ];

    /// Stable name, the suffix of the composite key
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::ModelLoading => "model_loading",
            Self::Transcription => "transcription",
        }
    }

    /// Whether the model-shaped probe decides this class
    #[must_use]
    pub const fn is_model_shaped(&self) -> bool {
        !matches!(self, Self::Basic)
    }
}

impl std::fmt::Display for CapabilityClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
