//! External tool invocation.
//!
//! All OS tooling (validators, rpmbuild, rpmsign) is launched through
//! [`ToolRunner`], which resolves the program on `PATH`, captures its output
//! and enforces a tool-level timeout.

use crate::error::{ReleaseError, Result};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

/// Captured result of an external tool run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code (`None` when terminated by a signal)
    pub code: Option<i32>,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
}

impl ToolOutput {
    /// Whether the tool exited with status 0
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Stdout and stderr joined, trimmed, for diagnostics
    pub fn combined(&self) -> String {
        let stdout = self.stdout.trim();
        let stderr = self.stderr.trim();
        match (stdout.is_empty(), stderr.is_empty()) {
            (true, true) => String::new(),
            (false, true) => stdout.to_string(),
            (true, false) => stderr.to_string(),
            (false, false) => format!("{stdout}\n{stderr}"),
        }
    }

    /// Last line of the combined output, used for single-line diagnostics
    pub fn last_line(&self) -> String {
        self.combined()
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .unwrap_or("")
            .trim()
            .to_string()
    }
}

/// Launches external tools with a shared timeout
#[derive(Debug, Clone)]
pub struct ToolRunner {
    timeout: Duration,
}

impl ToolRunner {
    /// Create a runner whose tools are killed after `timeout`
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Resolve `program` on `PATH` (or accept it as-is when it is a path)
    pub fn resolve(&self, program: &str) -> Result<PathBuf> {
        which::which(program).map_err(|e| {
            log::debug!("{program} not found in PATH: {e}");
            ReleaseError::ToolUnavailable {
                tool: program.to_string(),
                reason: format!("not found in PATH: {e}"),
            }
        })
    }

    /// Run `program` with `args`, capturing output.
    ///
    /// A non-zero exit is not an error here; callers decide what it means.
    /// A program missing from `PATH` is [`ReleaseError::ToolUnavailable`]; one
    /// that fails to start or times out is [`ReleaseError::ToolInterrupted`].
    pub async fn run<I, S>(&self, program: &str, args: I, cwd: Option<&Path>) -> Result<ToolOutput>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let path = self.resolve(program)?;
        let args: Vec<_> = args.into_iter().map(|a| a.as_ref().to_os_string()).collect();

        log::debug!(
            "Running {} {}",
            path.display(),
            args.iter()
                .map(|a| a.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ")
        );

        let mut cmd = tokio::process::Command::new(&path);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        let child = cmd.spawn().map_err(|e| ReleaseError::ToolInterrupted {
            tool: program.to_string(),
            reason: format!("failed to execute: {e}"),
        })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| ReleaseError::ToolInterrupted {
                tool: program.to_string(),
                reason: format!("timed out after {}s", self.timeout.as_secs()),
            })?
            .map_err(|e| ReleaseError::ToolInterrupted {
                tool: program.to_string(),
                reason: format!("failed waiting for process: {e}"),
            })?;

        Ok(ToolOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

impl Default for ToolRunner {
    fn default() -> Self {
        Self::new(Duration::from_secs(crate::config::DEFAULT_TOOL_TIMEOUT_SECS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combined_output_joins_streams() {
        let out = ToolOutput {
            code: Some(1),
            stdout: "warning: something\n".to_string(),
            stderr: "error: broken\n".to_string(),
        };
        assert!(!out.success());
        assert_eq!(out.combined(), "warning: something\nerror: broken");
        assert_eq!(out.last_line(), "error: broken");
    }

    #[tokio::test]
    async fn test_missing_tool_is_unavailable() {
        let runner = ToolRunner::default();
        let err = runner
            .run("definitely-not-a-real-tool-7f3a", ["--version"], None)
            .await
            .unwrap_err();
        assert!(matches!(err, ReleaseError::ToolUnavailable { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_captures_exit_code() {
        let runner = ToolRunner::default();
        let out = runner.run("sh", ["-c", "echo out; echo err >&2; exit 3"], None).await.unwrap();
        assert_eq!(out.code, Some(3));
        assert_eq!(out.stdout.trim(), "out");
        assert_eq!(out.stderr.trim(), "err");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_times_out() {
        let runner = ToolRunner::new(Duration::from_millis(100));
        let err = runner.run("sleep", ["5"], None).await.unwrap_err();
        assert!(matches!(err, ReleaseError::ToolInterrupted { .. }));
        assert!(err.to_string().contains("timed out"));
    }
}
