//! whisper-fallback CLI: backend selection diagnostics
//!
//! This is a thin shell that delegates to library functions.
//! All logic lives in `whisper_fallback::cli` for testability.

use clap::Parser;
use whisper_fallback::cli::{run, Args};

fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);

    match run(args) {
        Ok(result) => {
            if !result.success {
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::prelude::*;
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}
