//! CLI module for whisper-fallback
//!
//! All logic lives in this module for testability. The binary
//! (`src/bin/whisper-fallback.rs`) is a thin shell that only sets up
//! logging and calls `cli::run()`.
//!
//! ```text
//! src/cli/
//! ├── mod.rs       # This file - module exports
//! ├── args.rs      # Argument parsing with clap
//! ├── commands.rs  # Command implementations
//! └── output.rs    # Text and JSON rendering
//! ```

pub mod args;
pub mod commands;
pub mod output;

pub use args::{Args, Command};
pub use commands::{run, CliError, CliResult, CommandResult};
pub use output::OutputFormat;
