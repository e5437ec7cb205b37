//! Command line interface for rpm_release.
//!
//! Parses arguments, runs the selected command and maps the outcome to a
//! process exit code.

mod args;
pub mod commands;
mod output;

pub use args::{Args, Command, RuntimeConfig};
pub use commands::{execute_command, failure_line};
pub use output::OutputManager;

use crate::error::Result;

/// Main CLI entry point
pub async fn run() -> Result<i32> {
    let args = Args::parse_args();
    execute_command(args).await
}
