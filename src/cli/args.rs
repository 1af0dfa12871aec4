//! Command-line argument parsing for the whisper-fallback CLI
//!
//! Uses clap derive macros for type-safe argument parsing.
//! All argument structures are unit-testable.

use clap::{Parser, Subcommand, ValueEnum};

use crate::backend::{Backend, OperationKind};
use crate::classifier::MessageLocale;
use crate::device::{DetectionOptions, ModelProbeShape, SimulatedHost};
use crate::engine::EngineConfig;

/// whisper-fallback: backend selection diagnostics
///
/// Probes the host's compute backends, shows which one the engine would pick
/// and replays failure scenarios on simulated hardware.
#[derive(Parser, Debug, Clone)]
#[command(name = "whisper-fallback")]
#[command(version)]
#[command(about = "Compute backend selection and fallback diagnostics", long_about = None)]
#[command(propagate_version = true)]
#[allow(clippy::struct_excessive_bools)] // CLI flags are naturally boolean
pub struct Args {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,

    /// Verbose output (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet mode (suppress output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output as JSON (machine-readable)
    #[arg(long, global = true)]
    pub json: bool,

    /// Backends to consider, in order (skips host detection)
    #[arg(long, global = true, value_delimiter = ',')]
    pub backends: Option<Vec<BackendArg>>,

    /// Never consider a GPU
    #[arg(long, global = true)]
    pub cpu_only: bool,

    /// Probe with reduced tensor shapes
    #[arg(long, global = true)]
    pub quick_probe: bool,

    /// Language of user-facing messages
    #[arg(long, global = true, default_value = "en")]
    pub locale: LocaleArg,
}

impl Args {
    /// Engine configuration described by the global flags
    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        let mut detection = if self.cpu_only {
            DetectionOptions::cpu_only()
        } else {
            DetectionOptions::for_inference()
        };
        if let Some(backends) = &self.backends {
            detection = detection.with_forced_order(backends.iter().map(|b| (*b).into()).collect());
        }

        let mut config = EngineConfig::new()
            .with_detection(detection)
            .with_locale(self.locale.into());
        if self.quick_probe {
            config = config.with_model_shape(ModelProbeShape::reduced());
        }
        config
    }
}

/// Available commands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Probe the host and print the engine status
    Status,

    /// Show the backend and settings selected for an operation
    Select(SelectArgs),

    /// Categorize an error message
    Classify(ClassifyArgs),

    /// Replay repeated failures on a simulated GPU host
    Simulate(SimulateArgs),
}

/// Arguments for select command
#[derive(Parser, Debug, Clone)]
pub struct SelectArgs {
    /// Operation kind
    #[arg(short, long, default_value = "transcription")]
    pub op: OperationArg,

    /// Model name used to size the settings (e.g. base.en, large-v3)
    #[arg(short, long)]
    pub size: Option<String>,
}

/// Arguments for classify command
#[derive(Parser, Debug, Clone)]
pub struct ClassifyArgs {
    /// Raw error text
    pub text: String,
}

/// Arguments for simulate command
#[derive(Parser, Debug, Clone)]
pub struct SimulateArgs {
    /// GPU present on the simulated host
    #[arg(short, long, default_value = "metal")]
    pub gpu: GpuArg,

    /// Operation kind
    #[arg(short, long, default_value = "transcription")]
    pub op: OperationArg,

    /// Error text reported whenever the GPU runs the operation
    #[arg(short, long)]
    pub error: String,

    /// Number of operations to run
    #[arg(short, long, default_value = "5")]
    pub count: usize,
}

/// Backend options
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendArg {
    /// CPU
    Cpu,
    /// Apple Metal
    Metal,
    /// NVIDIA CUDA
    Cuda,
}

impl From<BackendArg> for Backend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Cpu => Self::Cpu,
            BackendArg::Metal => Self::Metal,
            BackendArg::Cuda => Self::Cuda,
        }
    }
}

/// Simulated GPU options
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuArg {
    /// Apple Silicon with Metal
    Metal,
    /// NVIDIA desktop with CUDA
    Cuda,
}

impl GpuArg {
    /// Simulated host exposing this GPU
    #[must_use]
    pub fn host(self) -> SimulatedHost {
        match self {
            Self::Metal => SimulatedHost::apple_silicon(),
            Self::Cuda => SimulatedHost::nvidia_desktop(),
        }
    }

    /// Backend of this GPU
    #[must_use]
    pub fn backend(self) -> Backend {
        match self {
            Self::Metal => Backend::Metal,
            Self::Cuda => Backend::Cuda,
        }
    }
}

/// Operation kind options
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationArg {
    /// Model loading
    ModelLoading,
    /// Transcription
    Transcription,
    /// Basic tensor math
    BasicTensorOp,
}

impl From<OperationArg> for OperationKind {
    fn from(arg: OperationArg) -> Self {
        match arg {
            OperationArg::ModelLoading => Self::ModelLoading,
            OperationArg::Transcription => Self::Transcription,
            OperationArg::BasicTensorOp => Self::BasicTensorOp,
        }
    }
}

/// Message locale options
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LocaleArg {
    /// English
    #[default]
    En,
    /// Polish
    Pl,
}

impl From<LocaleArg> for MessageLocale {
    fn from(arg: LocaleArg) -> Self {
        match arg {
            LocaleArg::En => Self::English,
            LocaleArg::Pl => Self::Polish,
        }
    }
}
