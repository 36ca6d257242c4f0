//! Stepwarden: declarative release workflows with lock coordination.
//!
//! This is the main entry point for the `stepwarden` CLI. It parses
//! arguments, loads the config, sets up logging, dispatches to the
//! appropriate command handler, and handles errors with proper exit codes.

use stepwarden::cli::Cli;
use stepwarden::config::{Config, LogLevel};
use stepwarden::{commands, exit_codes};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Log to stderr. `RUST_LOG` takes precedence over the configured level.
fn init_tracing(level: LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("stepwarden={}", level.as_str())));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse_args();

    let result = Config::load_or_default(&cli.config).and_then(|config| {
        init_tracing(config.log_level);
        commands::dispatch(cli.command, config)
    });

    match result {
        Ok(()) => ExitCode::from(exit_codes::SUCCESS as u8),
        Err(err) => {
            // Print user-actionable error message to stderr
            eprintln!("Error: {}", err);

            // Return appropriate exit code
            ExitCode::from(err.exit_code() as u8)
        }
    }
}
