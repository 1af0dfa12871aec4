//! Output formatters for the whisper-fallback CLI
//!
//! Every command renders either human-readable text or JSON.

use std::fmt::Write;

use serde::Serialize;

use crate::backend::{Backend, OperationKind};
use crate::classifier::ErrorCategory;
use crate::engine::EngineSelection;
use crate::error::FallbackResult;

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON
    Json,
}

impl OutputFormat {
    /// Pick the format from the `--json` flag
    #[must_use]
    pub const fn from_json_flag(json: bool) -> Self {
        if json {
            Self::Json
        } else {
            Self::Text
        }
    }
}

/// Result of classifying one error message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    /// Category the text falls in
    pub category: ErrorCategory,
    /// Whether the engine moves work elsewhere
    pub triggers_fallback: bool,
    /// Whether the failing backend loses the capability
    pub backend_fatal: bool,
    /// User-facing explanation
    pub message: String,
}

/// One step of a simulated failure scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimulationStep {
    /// 1-based step number
    pub step: usize,
    /// Backend chosen by the engine
    pub selected: Backend,
    /// Whether the simulated run succeeded
    pub succeeded: bool,
    /// Category of the reported error
    pub category: Option<ErrorCategory>,
    /// Backend the engine falls back to
    pub next: Option<Backend>,
    /// Whether the step revoked a capability
    pub revoked: bool,
    /// User-facing explanation
    pub message: Option<String>,
}

/// Render a selection
pub fn format_selection(
    selection: &EngineSelection,
    operation: OperationKind,
    format: OutputFormat,
) -> FallbackResult<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&serde_json::json!({
            "operation": operation,
            "backend": selection.backend,
            "reason": selection.reason.to_string(),
            "settings": selection.settings,
        }))?),
        OutputFormat::Text => {
            let settings = &selection.settings;
            let mut s = format!(
                "{operation}: {} ({})\n",
                selection.backend, selection.reason
            );
            let _ = writeln!(s, "  fp16:                        {}", settings.fp16);
            let _ = writeln!(s, "  temperature:                 {:.1}", settings.temperature);
            let _ = writeln!(
                s,
                "  condition_on_previous_text:  {}",
                display_option(settings.condition_on_previous_text)
            );
            let _ = writeln!(s, "  beam_size:                   {}", display_option(settings.beam_size));
            let _ = writeln!(s, "  best_of:                     {}", display_option(settings.best_of));
            let _ = writeln!(s, "  patience:                    {}", display_option(settings.patience));
            let _ = writeln!(s, "  no_speech_threshold:         {:.1}", settings.no_speech_threshold);
            let _ = writeln!(s, "  logprob_threshold:           {:.1}", settings.logprob_threshold);
            let _ = write!(
                s,
                "  compression_ratio_threshold: {:.1}",
                settings.compression_ratio_threshold
            );
            Ok(s)
        }
    }
}

/// Render a classification
pub fn format_classification(
    classification: &Classification,
    format: OutputFormat,
) -> FallbackResult<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(classification)?),
        OutputFormat::Text => Ok(format!(
            "category: {}\nfallback: {}\nfatal:    {}\nmessage:  {}",
            classification.category,
            yes_no(classification.triggers_fallback),
            yes_no(classification.backend_fatal),
            classification.message
        )),
    }
}

/// Render a simulated scenario
pub fn format_simulation(steps: &[SimulationStep], format: OutputFormat) -> FallbackResult<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(steps)?),
        OutputFormat::Text => {
            let mut s = String::new();
            for step in steps {
                let _ = write!(s, "#{:<3} {:<6}", step.step, step.selected.name());
                if step.succeeded {
                    s.push_str(" ok");
                } else {
                    let category = step.category.map_or("unknown", |c| c.name());
                    let next = step.next.map_or("-", |b| b.name());
                    let _ = write!(s, " failed [{category}] -> {next}");
                    if step.revoked {
                        s.push_str(" (capability revoked)");
                    }
                    if let Some(message) = &step.message {
                        let _ = write!(s, ": {message}");
                    }
                }
                s.push('\n');
            }
            Ok(s.trim_end().to_string())
        }
    }
}

fn display_option<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "default".to_string(), |v| v.to_string())
}

const fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}
