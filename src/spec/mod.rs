//! Package descriptor.
//!
//! [`PackageSpec`] is the authoritative description of the package. It is
//! stored as a flat TOML document next to the project:
//!
//! ```toml
//! name = "image-inpainter"
//! app_id = "com.example.ImageInpainter"
//! version = "0.1.0"
//! release = 1
//! summary = "Remove objects from photos"
//! license = "MIT"
//! description = "Image inpainting tool."
//! binary_install_dir = "/usr/lib/image-inpainter"
//! launcher_path = "/usr/bin/image-inpainter"
//! requires = ["hicolor-icon-theme"]
//!
//! [[changelog]]
//! date = "2026-10-01"
//! author = "Packager <packager@example.com>"
//! version_release = "0.1.0-1"
//! message = "Initial package"
//! ```
//!
//! Only the version stage writes to this file; every later stage reads it.

mod render;

pub use render::{SpecRenderer, render_changelog_header};
pub(crate) use render::shell_quote;

use crate::error::{ErrorExt, ReleaseError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

/// Directories that are on the default `PATH` of supported distributions
pub const PATH_DIRS: &[&str] = &[
    "/bin",
    "/sbin",
    "/usr/bin",
    "/usr/sbin",
    "/usr/local/bin",
    "/usr/local/sbin",
];

/// The authoritative package descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageSpec {
    /// Package name
    pub name: String,
    /// Reverse-domain application identifier
    pub app_id: String,
    /// Application version
    pub version: semver::Version,
    /// Build iteration of `version`
    pub release: u32,
    /// One-line summary
    pub summary: String,
    /// License expression
    pub license: String,
    /// Project homepage
    #[serde(default)]
    pub url: Option<String>,
    /// Long description
    pub description: String,
    /// Target architecture of the binary package
    #[serde(default = "default_arch")]
    pub arch: String,
    /// Runtime dependencies
    #[serde(default)]
    pub requires: Vec<String>,
    /// Build dependencies
    #[serde(default)]
    pub build_requires: Vec<String>,
    /// Private directory holding the executable
    pub binary_install_dir: PathBuf,
    /// Public launcher location
    pub launcher_path: PathBuf,
    /// Extra manifest entries installed after the standard ones
    #[serde(default)]
    pub files: Vec<ManifestEntry>,
    /// Changelog, oldest first
    #[serde(default)]
    pub changelog: Vec<ChangelogEntry>,
}

fn default_arch() -> String {
    "x86_64".to_string()
}

/// Kind of a manifest entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Single file installed with an explicit mode
    #[default]
    File,
    /// Directory copied recursively
    Directory,
}

/// One `(source, install path, mode)` triple
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestEntry {
    /// Path relative to the staged tree
    pub source: PathBuf,
    /// Absolute install path
    pub dest: PathBuf,
    /// Permission bits
    #[serde(default = "FileMode::regular")]
    pub mode: FileMode,
    /// File or directory
    #[serde(default)]
    pub kind: EntryKind,
}

impl ManifestEntry {
    /// Regular file entry
    pub fn file(source: impl Into<PathBuf>, dest: impl Into<PathBuf>, mode: FileMode) -> Self {
        Self {
            source: source.into(),
            dest: dest.into(),
            mode,
            kind: EntryKind::File,
        }
    }

    /// Directory entry
    pub fn directory(source: impl Into<PathBuf>, dest: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            dest: dest.into(),
            mode: FileMode::DIRECTORY,
            kind: EntryKind::Directory,
        }
    }
}

/// Unix permission bits, written as an octal string (`"0755"`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FileMode(u32);

impl FileMode {
    /// `0644`
    pub const REGULAR: FileMode = FileMode(0o644);
    /// `0755`
    pub const EXECUTABLE: FileMode = FileMode(0o755);
    /// `0755`, used for directories
    pub const DIRECTORY: FileMode = FileMode(0o755);

    fn regular() -> Self {
        Self::REGULAR
    }

    /// Raw permission bits
    pub fn bits(self) -> u32 {
        self.0
    }
}

impl TryFrom<String> for FileMode {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        let bits = u32::from_str_radix(value.trim_start_matches("0o"), 8)
            .map_err(|e| format!("invalid file mode `{value}`: {e}"))?;
        if bits > 0o7777 {
            return Err(format!("file mode `{value}` out of range"));
        }
        Ok(FileMode(bits))
    }
}

impl From<FileMode> for String {
    fn from(mode: FileMode) -> Self {
        mode.to_string()
    }
}

impl fmt::Display for FileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04o}", self.0)
    }
}

/// One changelog record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChangelogEntry {
    /// Entry date (`YYYY-MM-DD`)
    pub date: chrono::NaiveDate,
    /// `Name <email>`
    pub author: String,
    /// `<version>-<release>`
    pub version_release: String,
    /// Change description
    pub message: String,
}

impl PackageSpec {
    /// Load and validate a package spec file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).fs_context("reading package spec", path)?;
        Self::from_toml_str(&content, path)
    }

    /// Parse and validate package spec text; `path` is used for diagnostics
    pub fn from_toml_str(content: &str, path: &Path) -> Result<Self> {
        let spec: PackageSpec = toml::from_str(content).map_err(|e| ReleaseError::InvalidSpec {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        spec.validate()
            .map_err(|reason| ReleaseError::InvalidSpec {
                path: path.to_path_buf(),
                reason,
            })?;
        Ok(spec)
    }

    /// `<version>-<release>`
    pub fn version_release(&self) -> String {
        format!("{}-{}", self.version, self.release)
    }

    /// Directory name at the top of the source tarball
    pub fn source_dir_name(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }

    /// Source tarball file name
    pub fn tarball_name(&self) -> String {
        format!("{}.tar.gz", self.source_dir_name())
    }

    /// Desktop entry file name (`<app_id>.desktop`)
    pub fn desktop_file_name(&self) -> String {
        format!("{}.desktop", self.app_id)
    }

    /// AppStream metadata file name
    pub fn metainfo_file_name(&self) -> String {
        format!("{}.metainfo.xml", self.app_id)
    }

    /// Command name of the public launcher
    pub fn launcher_command(&self) -> String {
        self.launcher_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.name.clone())
    }

    /// Binary package file name
    pub fn binary_package_name(&self) -> String {
        format!("{}-{}.{}.rpm", self.name, self.version_release(), self.arch)
    }

    /// Source package file name
    pub fn source_package_name(&self) -> String {
        format!("{}-{}.src.rpm", self.name, self.version_release())
    }

    fn validate(&self) -> std::result::Result<(), String> {
        let valid_name = !self.name.is_empty()
            && self
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '+'));
        if !valid_name {
            return Err(format!("invalid package name `{}`", self.name));
        }
        if self.app_id.split('.').filter(|s| !s.is_empty()).count() < 2
            || self.app_id.ends_with(".desktop")
        {
            return Err(format!(
                "app_id `{}` must be a reverse-domain identifier without the .desktop suffix",
                self.app_id
            ));
        }
        check_rpm_version(&self.version)?;
        if self.release == 0 {
            return Err("release must be at least 1".to_string());
        }
        if self.arch.is_empty() || self.arch == "src" {
            return Err(format!("invalid arch `{}`", self.arch));
        }

        if !self.binary_install_dir.is_absolute() {
            return Err("binary_install_dir must be absolute".to_string());
        }
        if is_path_dir(&self.binary_install_dir) {
            return Err(format!(
                "binary_install_dir {} is on PATH; the executable must be private",
                self.binary_install_dir.display()
            ));
        }
        if !self.launcher_path.is_absolute() {
            return Err("launcher_path must be absolute".to_string());
        }
        match self.launcher_path.parent() {
            Some(parent) if is_path_dir(parent) => {}
            _ => {
                return Err(format!(
                    "launcher_path {} is not in a PATH directory",
                    self.launcher_path.display()
                ));
            }
        }

        check_unique("requires", &self.requires)?;
        check_unique("build_requires", &self.build_requires)?;

        let mut dests = HashSet::new();
        for entry in &self.files {
            if !entry.dest.is_absolute() {
                return Err(format!("install path {} must be absolute", entry.dest.display()));
            }
            if entry.source.is_absolute()
                || entry
                    .source
                    .components()
                    .any(|c| matches!(c, std::path::Component::ParentDir))
            {
                return Err(format!(
                    "manifest source {} must be relative to the staged tree",
                    entry.source.display()
                ));
            }
            if !dests.insert(&entry.dest) {
                return Err(format!("duplicate install path {}", entry.dest.display()));
            }
        }
        Ok(())
    }
}

/// Check that `version` can be written to the rpm `Version:` tag unchanged.
///
/// rpm forbids `-` in versions and orders versions differently from semver,
/// so pre-release and build metadata are rejected rather than rewritten.
pub fn check_rpm_version(version: &semver::Version) -> std::result::Result<(), String> {
    if !version.pre.is_empty() {
        return Err(format!(
            "version `{version}` has a pre-release part, which rpm versions cannot carry"
        ));
    }
    if !version.build.is_empty() {
        return Err(format!(
            "version `{version}` has build metadata, which rpm versions cannot carry"
        ));
    }
    Ok(())
}

/// Whether `dir` is one of the [`PATH_DIRS`]
pub fn is_path_dir(dir: &Path) -> bool {
    PATH_DIRS.iter().any(|p| Path::new(p) == dir)
}

fn check_unique(field: &str, values: &[String]) -> std::result::Result<(), String> {
    let mut seen = HashSet::new();
    for value in values {
        if value.trim().is_empty() {
            return Err(format!("{field} contains an empty entry"));
        }
        if !seen.insert(value) {
            return Err(format!("{field} lists `{value}` twice"));
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const SAMPLE_SPEC: &str = r#"# Packaging descriptor
name = "image-inpainter"
app_id = "com.example.ImageInpainter"
version = "0.1.0"
release = 1
summary = "Remove objects from photos"
license = "MIT"
url = "https://example.com/image-inpainter"
description = "Image inpainting tool."
requires = ["hicolor-icon-theme"]
binary_install_dir = "/usr/lib/image-inpainter"
launcher_path = "/usr/bin/image-inpainter"

[[changelog]]
date = "2026-10-01"
author = "Packager <packager@example.com>"
version_release = "0.1.0-1"
message = "Initial package"
"#;

    pub(crate) fn sample_spec() -> PackageSpec {
        PackageSpec::from_toml_str(SAMPLE_SPEC, Path::new("package.toml")).unwrap()
    }

    #[test]
    fn test_parse_sample() {
        let spec = sample_spec();
        assert_eq!(spec.name, "image-inpainter");
        assert_eq!(spec.version, semver::Version::new(0, 1, 0));
        assert_eq!(spec.release, 1);
        assert_eq!(spec.arch, "x86_64");
        assert_eq!(spec.changelog.len(), 1);
        assert_eq!(spec.launcher_command(), "image-inpainter");
        assert_eq!(spec.binary_package_name(), "image-inpainter-0.1.0-1.x86_64.rpm");
        assert_eq!(spec.source_package_name(), "image-inpainter-0.1.0-1.src.rpm");
        assert_eq!(spec.tarball_name(), "image-inpainter-0.1.0.tar.gz");
    }

    #[test]
    fn test_binary_on_path_rejected() {
        let text = SAMPLE_SPEC.replace("/usr/lib/image-inpainter", "/usr/bin");
        let err = PackageSpec::from_toml_str(&text, Path::new("package.toml")).unwrap_err();
        assert!(err.to_string().contains("must be private"));
    }

    #[test]
    fn test_launcher_off_path_rejected() {
        let text = SAMPLE_SPEC.replace("/usr/bin/image-inpainter", "/opt/image-inpainter/run");
        let err = PackageSpec::from_toml_str(&text, Path::new("package.toml")).unwrap_err();
        assert!(err.to_string().contains("not in a PATH directory"));
    }

    #[test]
    fn test_duplicate_requires_rejected() {
        let text = SAMPLE_SPEC.replace(
            r#"requires = ["hicolor-icon-theme"]"#,
            r#"requires = ["qt6-qtbase", "qt6-qtbase"]"#,
        );
        let err = PackageSpec::from_toml_str(&text, Path::new("package.toml")).unwrap_err();
        assert!(err.to_string().contains("twice"));
    }

    #[test]
    fn test_app_id_with_suffix_rejected() {
        let text = SAMPLE_SPEC.replace(
            r#"app_id = "com.example.ImageInpainter""#,
            r#"app_id = "com.example.ImageInpainter.desktop""#,
        );
        assert!(PackageSpec::from_toml_str(&text, Path::new("package.toml")).is_err());
    }

    #[test]
    fn test_pre_release_and_build_metadata_rejected() {
        let text = SAMPLE_SPEC.replace(r#"version = "0.1.0""#, r#"version = "0.2.0-rc.1""#);
        let err = PackageSpec::from_toml_str(&text, Path::new("package.toml")).unwrap_err();
        assert!(err.to_string().contains("pre-release"));

        let text = SAMPLE_SPEC.replace(r#"version = "0.1.0""#, r#"version = "1.0.0+b1""#);
        let err = PackageSpec::from_toml_str(&text, Path::new("package.toml")).unwrap_err();
        assert!(err.to_string().contains("build metadata"));
    }

    #[test]
    fn test_file_mode_parsing() {
        let mode = FileMode::try_from("0750".to_string()).unwrap();
        assert_eq!(mode.bits(), 0o750);
        assert_eq!(mode.to_string(), "0750");
        assert!(FileMode::try_from("0999".to_string()).is_err());
        assert!(FileMode::try_from("17777".to_string()).is_err());
    }

    #[test]
    fn test_extra_files_parse() {
        let text = format!(
            "{SAMPLE_SPEC}\n[[files]]\nsource = \"docs\"\ndest = \"/usr/share/doc/image-inpainter\"\nkind = \"directory\"\n"
        );
        let spec = PackageSpec::from_toml_str(&text, Path::new("package.toml")).unwrap();
        assert_eq!(spec.files.len(), 1);
        assert_eq!(spec.files[0].kind, EntryKind::Directory);
        assert_eq!(spec.files[0].mode, FileMode::REGULAR);
    }
}
