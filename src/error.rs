//! Error types for rpm_release operations.
//!
//! Every pipeline stage returns a typed [`ReleaseError`]. The orchestrator
//! maps it to an [`ErrorKind`] and records the `(kind, stage)` pair.

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for rpm_release operations
pub type Result<T> = std::result::Result<T, ReleaseError>;

/// Main error type for all rpm_release operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ReleaseError {
    /// Requested version is older than the one recorded in the package spec
    #[error("requested version {requested} is older than current version {current}")]
    VersionConflict {
        /// Version currently recorded in the package spec
        current: semver::Version,
        /// Version requested for this run
        requested: semver::Version,
    },

    /// A metadata field does not match its counterpart
    #[error("{file}: field `{field}` mismatch: expected `{expected}`, found `{found}`")]
    MetadataMismatch {
        /// File containing the offending field
        file: PathBuf,
        /// Name of the mismatched field
        field: String,
        /// Value the field should have
        expected: String,
        /// Value actually found
        found: String,
    },

    /// An external validator rejected a metadata file
    #[error("{tool} rejected {file}: {output}")]
    MetadataInvalid {
        /// Validator that reported the problem
        tool: String,
        /// File that was validated
        file: PathBuf,
        /// Validator output
        output: String,
    },

    /// A declared or referenced artifact does not exist
    #[error("missing artifact {path} ({role})")]
    MissingArtifact {
        /// Path that could not be resolved
        path: PathBuf,
        /// What declared or referenced the path
        role: String,
    },

    /// The binary is older than the source it was built from
    #[error("binary {binary} is older than its declared source {declared_source}; rebuild it first")]
    StaleArtifact {
        /// Binary artifact
        binary: PathBuf,
        /// Newest file of the declared source
        declared_source: PathBuf,
    },

    /// Icon size is not a freedesktop size or does not match the image
    #[error("icon {path}: {reason}")]
    InvalidIcon {
        /// Icon file
        path: PathBuf,
        /// Why the icon was rejected
        reason: String,
    },

    /// The package-build tool failed
    #[error("{tool} failed (exit code {}): {output}", display_code(.code))]
    BuildToolError {
        /// Tool that failed
        tool: String,
        /// Exit code, if the process exited normally
        code: Option<i32>,
        /// Captured stdout and stderr
        output: String,
    },

    /// Signing a package failed
    #[error("signing {package} failed: {reason}")]
    SigningFailed {
        /// Package that could not be signed
        package: PathBuf,
        /// Signer output or reason
        reason: String,
    },

    /// Signing succeeded but the signature does not verify
    #[error("signature of {package} does not verify: {output}")]
    SignatureVerificationFailed {
        /// Package whose signature failed verification
        package: PathBuf,
        /// Verifier output
        output: String,
    },

    /// An external tool is not installed
    #[error("tool `{tool}` unavailable: {reason}")]
    ToolUnavailable {
        /// Tool name
        tool: String,
        /// Reason the tool could not be used
        reason: String,
    },

    /// An external tool was found but could not be started, or did not finish in time
    #[error("tool `{tool}` {reason}")]
    ToolInterrupted {
        /// Tool name
        tool: String,
        /// What went wrong
        reason: String,
    },

    /// Pipeline configuration is invalid
    #[error("invalid configuration {path}: {reason}")]
    InvalidConfig {
        /// Configuration file
        path: PathBuf,
        /// Reason for the error
        reason: String,
    },

    /// Package spec is invalid
    #[error("invalid package spec {path}: {reason}")]
    InvalidSpec {
        /// Package spec file
        path: PathBuf,
        /// Reason for the error
        reason: String,
    },

    /// The pipeline state machine was asked to move backwards or out of a terminal state
    #[error("invalid pipeline transition from {from} to {to}")]
    InvalidTransition {
        /// Current state
        from: String,
        /// Requested state
        to: String,
    },

    /// File system error with path context
    #[error("{context} {path}: {error}")]
    Fs {
        /// Operation being performed (e.g. "reading desktop entry")
        context: &'static str,
        /// Path that was being accessed
        path: PathBuf,
        /// The underlying I/O error
        error: io::Error,
    },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Template rendering errors
    #[error("template error: {0}")]
    Template(#[from] handlebars::RenderError),

    /// Template registration errors
    #[error("template error: {0}")]
    TemplateSyntax(#[from] handlebars::TemplateError),

    /// RPM header errors
    #[error("RPM error: {0}")]
    Rpm(#[from] rpm::Error),

    /// Directory traversal errors
    #[error("{0}")]
    Walkdir(#[from] walkdir::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Background task failed to complete
    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

fn display_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "none".to_string(), |c| c.to_string())
}

/// Failure classification recorded by the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    /// Requested version is older than the current one
    VersionConflict,
    /// Metadata fields disagree
    MetadataMismatch,
    /// External metadata validator rejected a file
    MetadataInvalid,
    /// Declared or referenced input missing
    MissingArtifact,
    /// Binary older than its source
    StaleArtifact,
    /// Icon size or dimensions wrong
    InvalidIcon,
    /// Package-build tool failed
    BuildToolError,
    /// Signing failed
    SigningFailed,
    /// Signature did not verify
    SignatureVerificationFailed,
    /// External tool missing, or interrupted outside of a stage
    ToolUnavailable,
    /// Configuration invalid
    InvalidConfig,
    /// Package spec invalid
    InvalidSpec,
    /// State machine misuse
    InvalidTransition,
    /// Filesystem or other I/O failure
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl ReleaseError {
    /// Classify this error for the run report and CLI diagnostics
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReleaseError::VersionConflict { .. } => ErrorKind::VersionConflict,
            ReleaseError::MetadataMismatch { .. } => ErrorKind::MetadataMismatch,
            ReleaseError::MetadataInvalid { .. } => ErrorKind::MetadataInvalid,
            ReleaseError::MissingArtifact { .. } => ErrorKind::MissingArtifact,
            ReleaseError::StaleArtifact { .. } => ErrorKind::StaleArtifact,
            ReleaseError::InvalidIcon { .. } => ErrorKind::InvalidIcon,
            ReleaseError::BuildToolError { .. } | ReleaseError::Rpm(_) => {
                ErrorKind::BuildToolError
            }
            ReleaseError::SigningFailed { .. } => ErrorKind::SigningFailed,
            ReleaseError::SignatureVerificationFailed { .. } => {
                ErrorKind::SignatureVerificationFailed
            }
            ReleaseError::ToolUnavailable { .. } | ReleaseError::ToolInterrupted { .. } => {
                ErrorKind::ToolUnavailable
            }
            ReleaseError::InvalidConfig { .. } => ErrorKind::InvalidConfig,
            ReleaseError::InvalidSpec { .. }
            | ReleaseError::Template(_)
            | ReleaseError::TemplateSyntax(_) => ErrorKind::InvalidSpec,
            ReleaseError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            ReleaseError::Fs { .. }
            | ReleaseError::Io(_)
            | ReleaseError::Walkdir(_)
            | ReleaseError::Json(_)
            | ReleaseError::Join(_) => ErrorKind::Io,
        }
    }

    /// Attribute an interrupted tool run to the stage that started it.
    ///
    /// `attribute` receives the diagnostic; every other error, including a
    /// tool missing from `PATH`, is returned unchanged.
    pub fn attribute_interrupted(self, attribute: impl FnOnce(String) -> ReleaseError) -> ReleaseError {
        match self {
            ReleaseError::ToolInterrupted { tool, reason } => attribute(format!("{tool} {reason}")),
            other => other,
        }
    }

    /// Get actionable recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            ReleaseError::VersionConflict { current, .. } => vec![
                format!("Request a version >= {current}, or omit RELEASE_VERSION to rebuild"),
            ],
            ReleaseError::MetadataMismatch { field, .. } if field == "id" => vec![
                "The AppStream <id> must be the desktop file name including `.desktop`".to_string(),
            ],
            ReleaseError::MetadataMismatch { field, .. } if field == "Icon" => vec![
                "Set Icon= to the AppStream <id> without the `.desktop` suffix".to_string(),
            ],
            ReleaseError::StaleArtifact { .. } => vec![
                "Re-run the freezer so the binary is newer than its sources".to_string(),
            ],
            ReleaseError::ToolUnavailable { tool, .. } => vec![
                format!("Install `{tool}` or point the [tools] section of release.toml at it"),
            ],
            ReleaseError::SignatureVerificationFailed { .. } => vec![
                "Import the public key into the rpm keyring: rpm --import <key.asc>".to_string(),
            ],
            ReleaseError::BuildToolError { .. } => vec![
                "Inspect the build root; partial outputs are left in place".to_string(),
            ],
            _ => vec!["Check the error message above for specific details".to_string()],
        }
    }
}

/// Extension trait for filesystem operations with automatic path context.
pub trait ErrorExt<T> {
    /// Add filesystem context to an I/O error.
    ///
    /// The `context` should be a present-tense verb phrase describing the operation,
    /// e.g., "reading file", "creating directory", "copying binary".
    fn fs_context(self, context: &'static str, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> ErrorExt<T> for std::result::Result<T, io::Error> {
    fn fs_context(self, context: &'static str, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|error| ReleaseError::Fs {
            context,
            path: path.into(),
            error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_match_diagnostics() {
        let err = ReleaseError::MetadataMismatch {
            file: PathBuf::from("app.metainfo.xml"),
            field: "id".to_string(),
            expected: "com.example.app.desktop".to_string(),
            found: "com.example.app".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::MetadataMismatch);
        assert_eq!(err.kind().to_string(), "MetadataMismatch");
        assert!(err.to_string().contains("field `id`"));
    }

    #[test]
    fn test_build_tool_error_includes_output() {
        let err = ReleaseError::BuildToolError {
            tool: "rpmbuild".to_string(),
            code: Some(1),
            output: "error: Bad exit status".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("exit code 1"));
        assert!(msg.contains("Bad exit status"));
    }

    #[test]
    fn test_interrupted_tool_takes_the_stage_kind() {
        let interrupted = ReleaseError::ToolInterrupted {
            tool: "rpmsign".to_string(),
            reason: "timed out after 900s".to_string(),
        };
        let err = interrupted.attribute_interrupted(|reason| ReleaseError::SigningFailed {
            package: PathBuf::from("a.rpm"),
            reason,
        });
        assert_eq!(err.kind(), ErrorKind::SigningFailed);
        assert!(err.to_string().contains("rpmsign timed out after 900s"));

        let missing = ReleaseError::ToolUnavailable {
            tool: "rpmsign".to_string(),
            reason: "not found in PATH".to_string(),
        };
        let err = missing.attribute_interrupted(|reason| ReleaseError::SigningFailed {
            package: PathBuf::from("a.rpm"),
            reason,
        });
        assert_eq!(err.kind(), ErrorKind::ToolUnavailable);
    }

    #[test]
    fn test_fs_context_wraps_path() {
        let result: std::result::Result<(), io::Error> =
            Err(io::Error::new(io::ErrorKind::NotFound, "gone"));
        let err = result.fs_context("reading spec", "/tmp/package.toml").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(err.to_string().starts_with("reading spec /tmp/package.toml"));
    }
}
