//! Per-backend decoding settings
//!
//! A pure mapping from (backend, workload size) to the option bundle handed
//! to the Whisper decode call. Temperature is pinned to zero so repeated
//! runs are reproducible; half precision is only requested on GPUs.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::backend::Backend;
use crate::error::FallbackError;

/// Whisper model size, the workload size class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkloadSize {
    /// Tiny model (~39M parameters)
    Tiny,
    /// Base model (~74M parameters)
    Base,
    /// Small model (~244M parameters)
    Small,
    /// Medium model (~769M parameters)
    Medium,
    /// Large model family (~1.5B parameters)
    Large,
}

impl WorkloadSize {
    /// Parse a model name such as `base.en` or `large-v3`
    #[must_use]
    pub fn from_model_name(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        let family = name
            .split(|c: char| c == '.' || c == '-' || c == '_')
            .next()
            .unwrap_or_default();
        match family {
            "tiny" => Some(Self::Tiny),
            "base" => Some(Self::Base),
            "small" => Some(Self::Small),
            "medium" => Some(Self::Medium),
            "large" => Some(Self::Large),
            _ => None,
        }
    }

    /// Large enough to warrant conservative thresholds
    #[must_use]
    pub const fn is_large(&self) -> bool {
        matches!(self, Self::Medium | Self::Large)
    }

    /// Lowercase name
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Tiny => "tiny",
            Self::Base => "base",
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
        }
    }
}

impl std::fmt::Display for WorkloadSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for WorkloadSize {
    type Err = FallbackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_model_name(s).ok_or_else(|| FallbackError::UnknownWorkloadSize(s.to_string()))
    }
}

/// Decode task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Task {
    /// Transcribe in the spoken language
    #[default]
    Transcribe,
}

/// Options for the downstream decode call
///
/// `None` fields are left to the decoder's own defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationBundle {
    /// Decode task
    pub task: Task,
    /// Sampling temperature, always 0.0
    pub temperature: f32,
    /// Run in half precision
    pub fp16: bool,
    /// Feed the previous window's text as a prompt
    pub condition_on_previous_text: Option<bool>,
    /// Beam width
    pub beam_size: Option<u32>,
    /// Candidates sampled per window
    pub best_of: Option<u32>,
    /// Beam search patience
    pub patience: Option<f32>,
    /// Silence probability above which a window is skipped
    pub no_speech_threshold: f32,
    /// Average log-probability below which decoding is retried
    pub logprob_threshold: f32,
    /// gzip compression ratio above which output is treated as a loop
    pub compression_ratio_threshold: f32,
}

impl ConfigurationBundle {
    /// Baseline bundle: deterministic, default thresholds, fp16 only on GPUs
    #[must_use]
    pub fn baseline(backend: Backend) -> Self {
        Self {
            task: Task::Transcribe,
            temperature: 0.0,
            fp16: backend.is_gpu(),
            condition_on_previous_text: None,
            beam_size: None,
            best_of: None,
            patience: None,
            no_speech_threshold: 0.6,
            logprob_threshold: -1.0,
            compression_ratio_threshold: 2.4,
        }
    }
}

/// Maps (backend, size) to a configuration bundle
#[derive(Debug, Clone, Copy, Default)]
pub struct SettingsProvider;

impl SettingsProvider {
    /// Create a provider
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Bundle for `backend` running a model of `size`.
    ///
    /// Without a size class the [`ConfigurationBundle::baseline`] is returned.
    #[must_use]
    pub fn settings_for(&self, backend: Backend, size: Option<WorkloadSize>) -> ConfigurationBundle {
        settings_for(backend, size)
    }
}

/// Free-function form of [`SettingsProvider::settings_for`]
#[must_use]
pub fn settings_for(backend: Backend, size: Option<WorkloadSize>) -> ConfigurationBundle {
    let mut bundle = ConfigurationBundle::baseline(backend);
    let Some(size) = size else {
        return bundle;
    };

    match backend {
        Backend::Metal => {
            bundle.fp16 = true;
            bundle.condition_on_previous_text = Some(false);
            bundle.beam_size = Some(1);
            bundle.best_of = Some(1);
            bundle.patience = Some(1.0);
        }
        Backend::Cuda => {
            bundle.fp16 = true;
            bundle.condition_on_previous_text = Some(true);
        }
        Backend::Cpu => {
            bundle.fp16 = false;
            bundle.condition_on_previous_text = Some(true);
            bundle.beam_size = Some(if matches!(size, WorkloadSize::Tiny | WorkloadSize::Base) {
                5
            } else {
                1
            });
            bundle.best_of = Some(if size == WorkloadSize::Tiny { 5 } else { 1 });
        }
    }

    if backend.is_gpu() && size.is_large() {
        bundle.no_speech_threshold = 0.7;
        bundle.compression_ratio_threshold = 2.0;
    }

    bundle
}
