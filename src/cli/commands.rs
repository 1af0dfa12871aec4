//! Command implementations for the whisper-fallback CLI
//!
//! Each command renders its output to a string, prints it unless quiet,
//! and returns it inside the [`CommandResult`] so tests can inspect it.

use std::sync::Arc;

use crate::backend::OperationKind;
use crate::classifier::ErrorClassifier;
use crate::device::{CpuReferenceExecutor, ScriptedExecutor};
use crate::engine::EngineHandle;
use crate::error::FallbackError;
use crate::settings::WorkloadSize;

use super::args::{Args, ClassifyArgs, Command, SelectArgs, SimulateArgs};
use super::output::{
    format_classification, format_selection, format_simulation, Classification, OutputFormat,
    SimulationStep,
};

/// CLI error type
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Engine error
    #[error("Engine error: {0}")]
    Fallback(#[from] FallbackError),

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;

/// Command execution result
#[derive(Debug)]
pub struct CommandResult {
    /// Whether the command succeeded
    pub success: bool,
    /// Rendered output
    pub message: String,
}

impl CommandResult {
    /// Create a success result
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    /// Create a failure result
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Run CLI with parsed arguments
///
/// This is the main entry point called by the binary.
pub fn run(args: Args) -> CliResult<CommandResult> {
    let result = match &args.command {
        Command::Status => run_status(&args),
        Command::Select(s) => run_select(s, &args),
        Command::Classify(c) => run_classify(c, &args),
        Command::Simulate(s) => run_simulate(s, &args),
    }?;

    if !args.quiet {
        println!("{}", result.message);
    }
    Ok(result)
}

fn output_format(global: &Args) -> OutputFormat {
    OutputFormat::from_json_flag(global.json)
}

fn host_engine(global: &Args) -> EngineHandle {
    EngineHandle::initialize_with(global.engine_config(), Arc::new(CpuReferenceExecutor))
}

/// Run status command
pub fn run_status(global: &Args) -> CliResult<CommandResult> {
    let report = host_engine(global).status_report();
    let rendered = match output_format(global) {
        OutputFormat::Json => report.to_json_pretty()?,
        OutputFormat::Text => report.summary(),
    };
    Ok(CommandResult::success(rendered))
}

/// Run select command
pub fn run_select(args: &SelectArgs, global: &Args) -> CliResult<CommandResult> {
    let operation = OperationKind::from(args.op);
    let size = args.size.as_deref().and_then(|name| {
        let size = WorkloadSize::from_model_name(name);
        if size.is_none() {
            tracing::warn!(model = name, "unknown model size, using baseline settings");
        }
        size
    });

    let selection = host_engine(global).select(operation, size);
    let rendered = format_selection(&selection, operation, output_format(global))?;
    Ok(CommandResult::success(rendered))
}

/// Run classify command
pub fn run_classify(args: &ClassifyArgs, global: &Args) -> CliResult<CommandResult> {
    let classifier = ErrorClassifier::new().with_locale(global.locale.into());
    let category = classifier.categorize(&args.text);
    let classification = Classification {
        category,
        triggers_fallback: classifier.should_trigger_fallback(category),
        backend_fatal: category.is_backend_fatal(),
        message: classifier.user_message(category).to_string(),
    };
    let rendered = format_classification(&classification, output_format(global))?;
    Ok(CommandResult::success(rendered))
}

/// Run simulate command
///
/// Every GPU run fails with the given error; CPU runs succeed.
pub fn run_simulate(args: &SimulateArgs, global: &Args) -> CliResult<CommandResult> {
    if args.count == 0 {
        return Err(CliError::InvalidArgument(
            "--count must be at least 1".to_string(),
        ));
    }

    let engine = EngineHandle::simulated(
        global.engine_config(),
        &args.gpu.host(),
        Arc::new(ScriptedExecutor::all_pass()),
    );
    let operation = OperationKind::from(args.op);
    let failing = args.gpu.backend();

    let steps: Vec<SimulationStep> = (1..=args.count)
        .map(|step| {
            let selected = engine.select(operation, None).backend;
            if selected == failing {
                let decision = engine.report_failure_detailed(&args.error, operation, selected);
                SimulationStep {
                    step,
                    selected,
                    succeeded: false,
                    category: Some(decision.category),
                    next: Some(decision.next_backend),
                    revoked: decision.capability_revoked,
                    message: Some(decision.user_message.to_string()),
                }
            } else {
                engine.report_success(selected, operation);
                SimulationStep {
                    step,
                    selected,
                    succeeded: true,
                    category: None,
                    next: None,
                    revoked: false,
                    message: None,
                }
            }
        })
        .collect();

    let rendered = format_simulation(&steps, output_format(global))?;
    Ok(CommandResult::success(rendered))
}
