//! Pipeline state machine.

use crate::error::{ErrorKind, ReleaseError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Version and release bump
    Version,
    /// Desktop entry and AppStream gate
    Validate,
    /// Staging and source tarball
    Bundle,
    /// rpmbuild
    Build,
    /// Package signing
    Sign,
    /// Copy to the output directory
    Publish,
}

impl Stage {
    /// All stages in order
    pub const ALL: [Stage; 6] = [
        Stage::Version,
        Stage::Validate,
        Stage::Bundle,
        Stage::Build,
        Stage::Sign,
        Stage::Publish,
    ];

    /// State reached when this stage completes
    pub fn completes_to(self) -> PipelineState {
        match self {
            Stage::Version => PipelineState::Versioned,
            Stage::Validate => PipelineState::Validated,
            Stage::Bundle => PipelineState::Bundled,
            Stage::Build => PipelineState::Built,
            Stage::Sign => PipelineState::Signed,
            Stage::Publish => PipelineState::Published,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Version => "version",
            Stage::Validate => "validate",
            Stage::Bundle => "bundle",
            Stage::Build => "build",
            Stage::Sign => "sign",
            Stage::Publish => "publish",
        };
        f.pad(name)
    }
}

/// State of a release run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum PipelineState {
    /// Nothing done yet
    Init,
    /// Spec bumped and rewritten
    Versioned,
    /// Metadata passed the gate
    Validated,
    /// Tree staged and tarball written
    Bundled,
    /// Packages built and inspected
    Built,
    /// Packages signed, or signing skipped
    Signed,
    /// Packages copied to the output directory
    Published,
    /// A stage failed
    Failed {
        /// Failure classification
        kind: ErrorKind,
        /// Stage that failed
        stage: Stage,
    },
}

impl PipelineState {
    fn rank(self) -> Option<u8> {
        match self {
            PipelineState::Init => Some(0),
            PipelineState::Versioned => Some(1),
            PipelineState::Validated => Some(2),
            PipelineState::Bundled => Some(3),
            PipelineState::Built => Some(4),
            PipelineState::Signed => Some(5),
            PipelineState::Published => Some(6),
            PipelineState::Failed { .. } => None,
        }
    }

    /// `Published` or `Failed`
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Published | PipelineState::Failed { .. })
    }

    /// Stage that runs from this state, if any
    pub fn next_stage(self) -> Option<Stage> {
        match self {
            PipelineState::Init => Some(Stage::Version),
            PipelineState::Versioned => Some(Stage::Validate),
            PipelineState::Validated => Some(Stage::Bundle),
            PipelineState::Bundled => Some(Stage::Build),
            PipelineState::Built => Some(Stage::Sign),
            PipelineState::Signed => Some(Stage::Publish),
            PipelineState::Published | PipelineState::Failed { .. } => None,
        }
    }

    /// Move to `next`.
    ///
    /// Only the state reached by completing [`Self::next_stage`] is allowed;
    /// `Failed` is reachable from every non-terminal state.
    pub fn transition(&mut self, next: PipelineState) -> Result<()> {
        let allowed = !self.is_terminal()
            && match (self.rank(), next.rank()) {
                (_, None) => true,
                (Some(from), Some(to)) => to == from + 1,
                (None, Some(_)) => false,
            };
        if !allowed {
            return Err(ReleaseError::InvalidTransition {
                from: self.to_string(),
                to: next.to_string(),
            });
        }
        log::debug!("Pipeline state {self} -> {next}");
        *self = next;
        Ok(())
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Failed { kind, stage } => write!(f, "Failed({kind} at {stage})"),
            other => fmt::Debug::fmt(other, f),
        }
    }
}
