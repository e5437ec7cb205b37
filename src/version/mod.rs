//! Version and release bookkeeping.
//!
//! The version stage is the only writer of the package spec. It decides the
//! next `(version, release)` pair, appends a changelog entry and rewrites the
//! spec file atomically.

mod editor;

pub use editor::SpecEditor;

use crate::error::{ReleaseError, Result};
use crate::spec::{ChangelogEntry, PackageSpec, check_rpm_version};
use semver::Version;
use std::path::{Path, PathBuf};

/// Compute the release number for `target` given the current pair.
///
/// Same version → `release + 1`; newer version → `1`; older version →
/// [`ReleaseError::VersionConflict`]. Build metadata takes no part in the
/// comparison.
pub fn next_release(current: &Version, release: u32, target: &Version) -> Result<u32> {
    let precedence = |v: &Version| (v.major, v.minor, v.patch, v.pre.clone());
    match precedence(target).cmp(&precedence(current)) {
        std::cmp::Ordering::Less => Err(ReleaseError::VersionConflict {
            current: current.clone(),
            requested: target.clone(),
        }),
        std::cmp::Ordering::Equal => release.checked_add(1).ok_or_else(|| ReleaseError::InvalidSpec {
            path: PathBuf::new(),
            reason: format!("release {release} cannot be incremented"),
        }),
        std::cmp::Ordering::Greater => Ok(1),
    }
}

/// Changelog details for the entry appended by a bump
#[derive(Debug, Clone)]
pub struct ChangelogDraft {
    /// `Name <email>`
    pub author: String,
    /// Explicit message; derived from the version when `None`
    pub message: Option<String>,
    /// Entry date
    pub date: chrono::NaiveDate,
}

impl ChangelogDraft {
    /// Draft dated today (local time)
    pub fn today(author: impl Into<String>, message: Option<String>) -> Self {
        Self {
            author: author.into(),
            message,
            date: chrono::Local::now().date_naive(),
        }
    }
}

/// Result of a version bump
#[derive(Debug, Clone)]
pub struct VersionUpdate {
    /// Version before the bump
    pub previous_version: Version,
    /// Release before the bump
    pub previous_release: u32,
    /// Spec as written to disk
    pub spec: PackageSpec,
}

/// Owns the version/release counters of a package spec file
#[derive(Debug, Clone)]
pub struct VersionManager {
    spec_path: PathBuf,
}

impl VersionManager {
    /// Manage the spec stored at `spec_path`
    pub fn new(spec_path: impl Into<PathBuf>) -> Self {
        Self {
            spec_path: spec_path.into(),
        }
    }

    /// Path of the managed spec file
    pub fn spec_path(&self) -> &Path {
        &self.spec_path
    }

    /// Bump the spec to `target` (or rebuild the current version when `None`).
    pub fn bump(&self, target: Option<&Version>, draft: &ChangelogDraft) -> Result<VersionUpdate> {
        let current = PackageSpec::load(&self.spec_path)?;
        let target = target.cloned().unwrap_or_else(|| current.version.clone());
        check_rpm_version(&target).map_err(|reason| ReleaseError::InvalidSpec {
            path: self.spec_path.clone(),
            reason,
        })?;
        let release = next_release(&current.version, current.release, &target)?;

        let message = draft.message.clone().unwrap_or_else(|| {
            if release == 1 {
                format!("Release {target}")
            } else {
                format!("Rebuild {target}-{release}")
            }
        });
        let entry = ChangelogEntry {
            date: draft.date,
            author: draft.author.clone(),
            version_release: format!("{target}-{release}"),
            message,
        };

        let mut editor = SpecEditor::open(&self.spec_path)?;
        editor.set_version_release(&target, release);
        editor.append_changelog(&entry)?;
        let written = editor.save()?;

        log::info!(
            "Version {}-{} -> {}-{}",
            current.version,
            current.release,
            target,
            release
        );

        Ok(VersionUpdate {
            previous_version: current.version,
            previous_release: current.release,
            spec: PackageSpec::from_toml_str(&written, &self.spec_path)?,
        })
    }
}
