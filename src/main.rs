//! pvkg command-line entry point.

use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use pvkg::cli::{Cli, execute};
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("pvkg=debug,warn")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    // Logs go to stderr; stdout carries command output and MCP traffic.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match execute(&cli) {
        Ok(output) => {
            let mut stdout = std::io::stdout().lock();
            if stdout.write_all(output.as_bytes()).is_err() || stdout.flush().is_err() {
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            let _ = writeln!(std::io::stderr(), "Error: {e}");
            ExitCode::FAILURE
        }
    }
}
