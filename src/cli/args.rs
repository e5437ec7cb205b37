//! Command line argument parsing.
//!
//! Running without a subcommand performs a full release build. The target
//! version and signing key may come from the command line or from the
//! environment; both are read once here and handed to the pipeline.

use crate::config::{DEFAULT_CONFIG_FILE, SIGNING_KEY_ENV, TARGET_VERSION_ENV};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Build, sign and publish RPM packages for a frozen desktop application
#[derive(Parser, Debug)]
#[command(
    name = "rpm_release",
    version,
    about = "Build, sign and publish RPM packages for a frozen desktop application",
    long_about = "Bump the package version, validate desktop metadata, stage the frozen
application, build binary and source RPMs, sign them and copy them to the
output directory.

Usage:
  rpm_release                        # full release with the current version
  rpm_release --target-version 1.2.0
  rpm_release validate               # metadata gate only
  rpm_release render-spec            # print the generated spec file"
)]
pub struct Args {
    /// Pipeline configuration file
    #[arg(
        short,
        long,
        global = true,
        value_name = "PATH",
        default_value = DEFAULT_CONFIG_FILE
    )]
    pub config: PathBuf,

    /// Version to release; must not be older than the current one
    #[arg(long, global = true, value_name = "VERSION", env = TARGET_VERSION_ENV)]
    pub target_version: Option<semver::Version>,

    /// Key used to sign the packages; signing is skipped without one
    #[arg(
        long,
        global = true,
        value_name = "KEY_ID",
        env = SIGNING_KEY_ENV,
        hide_env_values = true
    )]
    pub signing_key: Option<String>,

    /// Show per-stage details
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Command to run (defaults to `build`)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Run the full release pipeline
    Build,
    /// Check the desktop entry and AppStream metadata without building
    Validate,
    /// Print the spec file that would be handed to rpmbuild
    RenderSpec,
}

impl Command {
    /// Command name as typed on the command line
    pub fn name(&self) -> &'static str {
        match self {
            Command::Build => "build",
            Command::Validate => "validate",
            Command::RenderSpec => "render-spec",
        }
    }
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Command to run, `build` when none was given
    pub fn selected_command(&self) -> Command {
        self.command.unwrap_or(Command::Build)
    }
}

/// Configuration derived from command line arguments
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    output: super::OutputManager,
}

impl RuntimeConfig {
    /// Create runtime configuration
    pub fn new(verbose: bool, quiet: bool) -> Self {
        Self {
            output: super::OutputManager::new(verbose, quiet),
        }
    }

    /// Get a reference to the output manager
    pub fn output(&self) -> &super::OutputManager {
        &self.output
    }

    /// Print message
    pub fn println(&self, message: &str) {
        let _ = self.output.println(message);
    }

    /// Print message only in verbose mode
    pub fn verbose_println(&self, message: &str) {
        let _ = self.output.verbose(message);
    }

    /// Print error message (always shown)
    pub fn error_println(&self, message: &str) {
        self.output.error(message);
    }

    /// Print warning message
    pub fn warning_println(&self, message: &str) {
        let _ = self.output.warn(message);
    }

    /// Print success message
    pub fn success_println(&self, message: &str) {
        let _ = self.output.success(message);
    }

    /// Print a section header
    pub fn section(&self, title: &str) {
        let _ = self.output.section(title);
    }

    /// Print indented text
    pub fn indent(&self, message: &str) {
        let _ = self.output.indent(message);
    }

    /// Check if verbose output is enabled
    pub fn is_verbose(&self) -> bool {
        self.output.is_verbose()
    }
}

impl From<&Args> for RuntimeConfig {
    fn from(args: &Args) -> Self {
        Self::new(args.verbose, args.quiet)
    }
}
