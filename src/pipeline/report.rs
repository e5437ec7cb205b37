//! JSON run report.

use super::state::{PipelineState, Stage};
use crate::error::{ErrorExt, ErrorKind, ReleaseError, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Current version of the report format
pub const REPORT_FORMAT_VERSION: u32 = 1;

/// Outcome of a single stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageOutcome {
    /// Stage ran to completion
    Completed,
    /// Stage had nothing to do
    Skipped,
    /// Stage failed
    Failed,
}

/// Record of one stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    /// Stage name
    pub stage: Stage,
    /// What happened
    pub outcome: StageOutcome,
    /// When the stage finished
    pub finished_at: chrono::DateTime<chrono::Utc>,
    /// Short human-readable detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Failure details
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Failure classification
    pub kind: ErrorKind,
    /// Stage that failed
    pub stage: Stage,
    /// Error message
    pub message: String,
}

/// Report of a single pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Version of the report format
    pub format_version: u32,
    /// Unique ID of this run
    pub run_id: String,
    /// Package name, known once the spec has been read
    #[serde(default)]
    pub package: Option<String>,
    /// When the run started
    pub started_at: chrono::DateTime<chrono::Utc>,
    /// When the run finished
    #[serde(default)]
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Per-stage outcomes, in execution order
    pub stages: Vec<StageRecord>,
    /// State the run ended in
    pub final_state: PipelineState,
    /// Set when the run failed
    #[serde(default)]
    pub failure: Option<FailureRecord>,
    /// Files copied to the output directory
    #[serde(default)]
    pub published: Vec<PathBuf>,
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}

impl RunReport {
    /// Start a report
    pub fn new() -> Self {
        let now = chrono::Utc::now();
        Self {
            format_version: REPORT_FORMAT_VERSION,
            run_id: format!("run-{}", now.format("%Y%m%dT%H%M%S%.3fZ")),
            package: None,
            started_at: now,
            finished_at: None,
            stages: Vec::new(),
            final_state: PipelineState::Init,
            failure: None,
            published: Vec::new(),
        }
    }

    /// Record the outcome of `stage`
    pub fn record(&mut self, stage: Stage, outcome: StageOutcome, detail: Option<String>) {
        self.stages.push(StageRecord {
            stage,
            outcome,
            finished_at: chrono::Utc::now(),
            detail,
        });
    }

    /// Record a failure of `stage`
    pub fn record_failure(&mut self, stage: Stage, error: &ReleaseError) {
        self.record(stage, StageOutcome::Failed, None);
        self.failure = Some(FailureRecord {
            kind: error.kind(),
            stage,
            message: error.to_string(),
        });
    }

    /// Outcome recorded for `stage`
    pub fn outcome_of(&self, stage: Stage) -> Option<StageOutcome> {
        self.stages.iter().find(|r| r.stage == stage).map(|r| r.outcome)
    }

    /// Close the report in `state`
    pub fn finish(&mut self, state: PipelineState) {
        self.final_state = state;
        self.finished_at = Some(chrono::Utc::now());
    }

    /// Save the report atomically: temp file, fsync, rename.
    pub fn save(&self, path: &Path) -> Result<()> {
        let serialized = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).fs_context("creating report directory", parent)?;
        }

        let temp_file_path = path.with_extension("json.tmp");
        {
            let mut file = std::fs::File::create(&temp_file_path)
                .fs_context("creating temp report file", &temp_file_path)?;
            file.write_all(serialized.as_bytes())
                .fs_context("writing temp report file", &temp_file_path)?;
            file.sync_all().fs_context("syncing temp report file", &temp_file_path)?;
        }

        std::fs::rename(&temp_file_path, path).fs_context("replacing run report", path)?;
        Ok(())
    }

    /// Load a saved report
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).fs_context("reading run report", path)?;
        Ok(serde_json::from_str(&content)?)
    }
}
