mod catalog;
mod cli;
mod config;
mod cp;
mod endpoint;
mod error;
mod filter;
mod reader;
mod staging;
mod task;
mod time;
mod warning;

use std::io;
use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

use error::ErrorKind;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    match cli::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!(error = ?e, "command failed");
            eprintln!("Error: {e}");
            if e.kind() == ErrorKind::Usage {
                eprintln!("Run 'cplog --help' for usage.");
            }
            ExitCode::from(e.exit_code())
        }
    }
}
