//! Command execution.

mod build;
mod render_spec;
mod validate;

use crate::cli::{Args, Command, RuntimeConfig};
use crate::config::PipelineConfig;
use crate::error::{ReleaseError, Result};
use crate::pipeline::Stage;

use build::execute_build;
use render_spec::execute_render_spec;
use validate::execute_validate;

/// Execute the selected command and return the process exit code
pub async fn execute_command(args: Args) -> Result<i32> {
    let config = RuntimeConfig::from(&args);
    let command = args.selected_command();
    config.verbose_println(&format!(
        "Running `{}` with {}",
        command.name(),
        args.config.display()
    ));

    match command {
        Command::Build => execute_build(&args, &config).await,
        Command::Validate => execute_validate(&args, &config).await,
        Command::RenderSpec => execute_render_spec(&args).await,
    }
}

/// Load the configuration file and apply the run-time overrides
fn load_config(args: &Args) -> Result<PipelineConfig> {
    Ok(PipelineConfig::load(&args.config)?
        .with_signing_key(args.signing_key.clone())
        .with_target_version(args.target_version.clone()))
}

/// Report a failed stage: one diagnostic line, then suggestions in verbose mode
fn report_failure(config: &RuntimeConfig, stage: Stage, error: &ReleaseError) {
    config.error_println(&failure_line(stage, error));

    if config.is_verbose() {
        let suggestions = error.recovery_suggestions();
        if !suggestions.is_empty() {
            config.println("\n💡 Recovery suggestions:");
            for suggestion in suggestions {
                config.indent(&suggestion);
            }
        }
    }
}

/// `[stage] Kind: message`, with multi-line tool output folded onto one line
pub fn failure_line(stage: Stage, error: &ReleaseError) -> String {
    let message = error.to_string();
    let mut lines = message.lines().map(str::trim).filter(|l| !l.is_empty());
    let first = lines.next().unwrap_or_default();
    let summary = match lines.last() {
        Some(last) => format!("{first} ... {last}"),
        None => first.to_string(),
    };
    format!("[{stage}] {}: {summary}", error.kind())
}
