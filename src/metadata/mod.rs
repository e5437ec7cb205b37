//! Desktop entry and AppStream metadata gate.
//!
//! [`MetadataValidator`] has no side effects. It fails the pipeline when the
//! desktop entry, the AppStream `<id>` and the icon name disagree, or when an
//! external validator rejects either file. The internal cross-checks run
//! before any external process is started.

mod appstream;
mod desktop;

pub use appstream::{AppStreamMetadata, TypedValue};
pub use desktop::{DesktopEntry, MAIN_GROUP, REQUIRED_KEYS};

use crate::error::{ErrorExt, ReleaseError, Result};
use crate::tools::ToolRunner;
use std::ffi::OsStr;
use std::future::Future;
use std::path::{Path, PathBuf};

/// Suffix carried by desktop file names and AppStream ids
pub const DESKTOP_SUFFIX: &str = ".desktop";

/// External metadata validation capability
pub trait MetadataTool {
    /// Check desktop entry well-formedness
    fn validate_desktop_entry(&self, path: &Path) -> impl Future<Output = Result<()>>;

    /// Check AppStream metadata well-formedness
    fn validate_appstream(&self, path: &Path) -> impl Future<Output = Result<()>>;
}

impl<T: MetadataTool> MetadataTool for &T {
    fn validate_desktop_entry(&self, path: &Path) -> impl Future<Output = Result<()>> {
        (**self).validate_desktop_entry(path)
    }

    fn validate_appstream(&self, path: &Path) -> impl Future<Output = Result<()>> {
        (**self).validate_appstream(path)
    }
}

/// [`MetadataTool`] backed by `desktop-file-validate` and `appstreamcli`
#[derive(Debug, Clone)]
pub struct SystemMetadataTool {
    runner: ToolRunner,
    desktop_file_validate: String,
    appstreamcli: String,
}

impl SystemMetadataTool {
    /// Create a tool using the given program names
    pub fn new(
        runner: ToolRunner,
        desktop_file_validate: impl Into<String>,
        appstreamcli: impl Into<String>,
    ) -> Self {
        Self {
            runner,
            desktop_file_validate: desktop_file_validate.into(),
            appstreamcli: appstreamcli.into(),
        }
    }
}

impl MetadataTool for SystemMetadataTool {
    async fn validate_desktop_entry(&self, path: &Path) -> Result<()> {
        let output = self
            .runner
            .run(&self.desktop_file_validate, [path.as_os_str()], None)
            .await
            .map_err(|e| {
                e.attribute_interrupted(|output| ReleaseError::MetadataInvalid {
                    tool: self.desktop_file_validate.clone(),
                    file: path.to_path_buf(),
                    output,
                })
            })?;
        if !output.success() {
            return Err(ReleaseError::MetadataInvalid {
                tool: self.desktop_file_validate.clone(),
                file: path.to_path_buf(),
                output: output.last_line(),
            });
        }
        Ok(())
    }

    async fn validate_appstream(&self, path: &Path) -> Result<()> {
        let output = self
            .runner
            .run(
                &self.appstreamcli,
                [OsStr::new("validate"), OsStr::new("--no-net"), path.as_os_str()],
                None,
            )
            .await
            .map_err(|e| {
                e.attribute_interrupted(|output| ReleaseError::MetadataInvalid {
                    tool: self.appstreamcli.clone(),
                    file: path.to_path_buf(),
                    output,
                })
            })?;
        if !output.success() {
            return Err(ReleaseError::MetadataInvalid {
                tool: self.appstreamcli.clone(),
                file: path.to_path_buf(),
                output: output.last_line(),
            });
        }
        Ok(())
    }
}

/// Metadata that passed the gate
#[derive(Debug, Clone)]
pub struct ValidatedMetadata {
    /// Desktop entry file
    pub desktop_path: PathBuf,
    /// AppStream file
    pub metainfo_path: PathBuf,
    /// Parsed desktop entry
    pub desktop: DesktopEntry,
    /// Parsed AppStream elements
    pub appstream: AppStreamMetadata,
    /// AppStream id (`<app_id>.desktop`)
    pub id: String,
    /// Icon name (`<app_id>`)
    pub icon: String,
}

/// Pure gate over the desktop entry and AppStream metadata
pub struct MetadataValidator<'a, T: MetadataTool> {
    tool: &'a T,
}

impl<'a, T: MetadataTool> MetadataValidator<'a, T> {
    /// Validate through `tool`
    pub fn new(tool: &'a T) -> Self {
        Self { tool }
    }

    /// Run all checks against `desktop` and `metainfo` for `expected_app_id`
    pub async fn validate(
        &self,
        desktop: &Path,
        metainfo: &Path,
        expected_app_id: &str,
    ) -> Result<ValidatedMetadata> {
        let desktop_text =
            tokio::fs::read_to_string(desktop).await.fs_context("reading desktop entry", desktop)?;
        let metainfo_text = tokio::fs::read_to_string(metainfo)
            .await
            .fs_context("reading AppStream metadata", metainfo)?;

        let checked = check_metadata(desktop, &desktop_text, metainfo, &metainfo_text, expected_app_id)?;
        log::debug!("Metadata cross-checks passed for {}", checked.id);

        self.tool.validate_desktop_entry(desktop).await?;
        self.tool.validate_appstream(metainfo).await?;

        log::info!("Metadata validated: id={} icon={}", checked.id, checked.icon);
        Ok(checked)
    }
}

/// Internal checks: required keys, file name, `<id>` and `Icon=` agreement.
pub fn check_metadata(
    desktop_path: &Path,
    desktop_text: &str,
    metainfo_path: &Path,
    metainfo_text: &str,
    expected_app_id: &str,
) -> Result<ValidatedMetadata> {
    let entry = DesktopEntry::parse(desktop_text).map_err(|reason| ReleaseError::MetadataInvalid {
        tool: "desktop entry parser".to_string(),
        file: desktop_path.to_path_buf(),
        output: reason,
    })?;

    let mismatch = |file: &Path, field: &str, expected: &str, found: &str| ReleaseError::MetadataMismatch {
        file: file.to_path_buf(),
        field: field.to_string(),
        expected: expected.to_string(),
        found: found.to_string(),
    };

    for key in REQUIRED_KEYS {
        match entry.get(key) {
            Some(v) if !v.is_empty() => {}
            _ => return Err(mismatch(desktop_path, key, "a non-empty value", "nothing")),
        }
    }
    let kind = entry.get("Type").unwrap_or_default();
    if kind != "Application" {
        return Err(mismatch(desktop_path, "Type", "Application", kind));
    }

    let desktop_name = desktop_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let expected_name = format!("{expected_app_id}{DESKTOP_SUFFIX}");
    if desktop_name != expected_name {
        return Err(mismatch(desktop_path, "app_id", &expected_name, &desktop_name));
    }

    let appstream = AppStreamMetadata::parse(metainfo_text).map_err(|reason| ReleaseError::MetadataInvalid {
        tool: "AppStream parser".to_string(),
        file: metainfo_path.to_path_buf(),
        output: reason,
    })?;
    let id = appstream
        .id
        .clone()
        .ok_or_else(|| mismatch(metainfo_path, "id", &desktop_name, "no <id> element"))?;
    if id.as_bytes() != desktop_name.as_bytes() {
        return Err(mismatch(metainfo_path, "id", &desktop_name, &id));
    }

    let icon = entry.get("Icon").unwrap_or_default();
    let expected_icon = id.strip_suffix(DESKTOP_SUFFIX).unwrap_or(&id);
    if icon != expected_icon {
        return Err(mismatch(desktop_path, "Icon", expected_icon, icon));
    }

    Ok(ValidatedMetadata {
        desktop_path: desktop_path.to_path_buf(),
        metainfo_path: metainfo_path.to_path_buf(),
        icon: icon.to_string(),
        desktop: entry,
        appstream,
        id,
    })
}
