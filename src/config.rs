//! Pipeline configuration.
//!
//! Configuration is read from `release.toml`:
//!
//! ```toml
//! spec_file = "packaging/package.toml"
//! output_dir = "dist/rpm"
//!
//! [artifacts]
//! binary = "dist/image-inpainter"
//! binary_source = "image_inpainter.py"
//! assets = "assets"
//! desktop_file = "packaging/com.example.ImageInpainter.desktop"
//! metainfo_file = "packaging/com.example.ImageInpainter.metainfo.xml"
//! license = "LICENSE"
//! icons = [{ size = 256, path = "assets/icons/256x256/icon.png" }]
//!
//! [launcher]
//! env = [{ name = "QT_QPA_PLATFORM", value = "wayland;xcb" }]
//! ```
//!
//! Relative paths are resolved against the directory containing the
//! configuration file. The signing key and target version are not part of
//! the file; they are resolved from the command line or environment once at
//! pipeline start and stored on the same object, which is then passed
//! explicitly to the orchestrator.

use crate::error::{ErrorExt, ReleaseError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default timeout applied to every external tool invocation (seconds)
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 900;

/// Environment variable holding the signing key identifier
pub const SIGNING_KEY_ENV: &str = "RPM_SIGNING_KEY";

/// Environment variable holding the target version
pub const TARGET_VERSION_ENV: &str = "RELEASE_VERSION";

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "release.toml";

/// Identifier of the private key used to sign packages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningKey(String);

impl SigningKey {
    /// Build a key from an optional identifier; blank identifiers mean "no key".
    pub fn from_optional(id: Option<String>) -> Option<Self> {
        id.map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(SigningKey)
    }

    /// Key identifier as passed to `rpmsign`
    pub fn id(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Complete configuration of a pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Package spec source (TOML), rewritten by the version stage
    #[serde(default = "default_spec_file")]
    pub spec_file: PathBuf,
    /// Fixed directory that receives published packages
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// rpmbuild top directory (BuildEnvironment)
    #[serde(default = "default_build_root")]
    pub build_root: PathBuf,
    /// Directory where the artifact tree is staged
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,
    /// JSON run report location
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
    /// Input artifacts
    pub artifacts: ArtifactInputs,
    /// Launcher environment
    #[serde(default)]
    pub launcher: LauncherConfig,
    /// Icon cache hooks
    #[serde(default)]
    pub icon_cache: IconCacheConfig,
    /// Changelog authoring
    #[serde(default)]
    pub changelog: ChangelogConfig,
    /// External tool names and limits
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Signing key resolved at pipeline start
    #[serde(skip)]
    pub signing_key: Option<SigningKey>,
    /// Target version requested for this run
    #[serde(skip)]
    pub target_version: Option<semver::Version>,
}

/// Declared input artifacts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArtifactInputs {
    /// Frozen application binary
    pub binary: PathBuf,
    /// Source the binary was frozen from (file or directory)
    pub binary_source: PathBuf,
    /// Static asset directory
    pub assets: PathBuf,
    /// Desktop entry file (`<app_id>.desktop`)
    pub desktop_file: PathBuf,
    /// AppStream metadata file
    pub metainfo_file: PathBuf,
    /// License file
    pub license: PathBuf,
    /// Icons at fixed resolutions
    pub icons: Vec<IconInput>,
}

/// One icon file at a declared square resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IconInput {
    /// Edge length in pixels
    pub size: u32,
    /// PNG file
    pub path: PathBuf,
}

/// Environment variable exported by the launcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvVar {
    /// Variable name
    pub name: String,
    /// Variable value
    pub value: String,
}

/// Launcher settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LauncherConfig {
    /// Variables exported before delegating to the private binary
    #[serde(default = "default_launcher_env")]
    pub env: Vec<EnvVar>,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            env: default_launcher_env(),
        }
    }
}

/// Icon cache refresh hook settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IconCacheConfig {
    /// Shell command run on first install and on final removal
    #[serde(default = "default_icon_cache_command")]
    pub command: String,
}

impl Default for IconCacheConfig {
    fn default() -> Self {
        Self {
            command: default_icon_cache_command(),
        }
    }
}

/// Changelog authoring settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChangelogConfig {
    /// `Name <email>` recorded on new entries
    #[serde(default = "default_changelog_author")]
    pub author: String,
    /// Message for new entries; a default is derived from the version when absent
    #[serde(default)]
    pub message: Option<String>,
}

impl Default for ChangelogConfig {
    fn default() -> Self {
        Self {
            author: default_changelog_author(),
            message: None,
        }
    }
}

/// External tool names and limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolsConfig {
    /// Native package build tool
    #[serde(default = "default_rpmbuild")]
    pub rpmbuild: String,
    /// Package signing tool
    #[serde(default = "default_rpmsign")]
    pub rpmsign: String,
    /// Signature verification tool
    #[serde(default = "default_rpmkeys")]
    pub rpmkeys: String,
    /// Desktop entry validator
    #[serde(default = "default_desktop_file_validate")]
    pub desktop_file_validate: String,
    /// AppStream validator
    #[serde(default = "default_appstreamcli")]
    pub appstreamcli: String,
    /// Per-invocation timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            rpmbuild: default_rpmbuild(),
            rpmsign: default_rpmsign(),
            rpmkeys: default_rpmkeys(),
            desktop_file_validate: default_desktop_file_validate(),
            appstreamcli: default_appstreamcli(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ToolsConfig {
    /// Timeout as a [`Duration`]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_spec_file() -> PathBuf {
    PathBuf::from("package.toml")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("dist/rpm")
}

fn default_build_root() -> PathBuf {
    PathBuf::from("build/rpmbuild")
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("build/staging")
}

fn default_state_file() -> PathBuf {
    PathBuf::from("build/release-state.json")
}

// Canonical set: the portal variant (QT_QPA_PLATFORMTHEME=xdgdesktopportal)
// is not included.
fn default_launcher_env() -> Vec<EnvVar> {
    vec![EnvVar {
        name: "QT_QPA_PLATFORM".to_string(),
        value: "wayland;xcb".to_string(),
    }]
}

fn default_icon_cache_command() -> String {
    "/usr/bin/gtk-update-icon-cache -f -t -q %{_datadir}/icons/hicolor".to_string()
}

fn default_changelog_author() -> String {
    "Release Pipeline <release@localhost>".to_string()
}

fn default_rpmbuild() -> String {
    "rpmbuild".to_string()
}

fn default_rpmsign() -> String {
    "rpmsign".to_string()
}

fn default_rpmkeys() -> String {
    "rpmkeys".to_string()
}

fn default_desktop_file_validate() -> String {
    "desktop-file-validate".to_string()
}

fn default_appstreamcli() -> String {
    "appstreamcli".to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TOOL_TIMEOUT_SECS
}

impl PipelineConfig {
    /// Load configuration from a TOML file and resolve relative paths.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).fs_context("reading configuration", path)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_toml_str(&content, base).map_err(|e| match e {
            ReleaseError::InvalidConfig { reason, .. } => ReleaseError::InvalidConfig {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })
    }

    /// Parse configuration text; relative paths are resolved against `base`.
    pub fn from_toml_str(content: &str, base: &Path) -> Result<Self> {
        let mut config: PipelineConfig =
            toml::from_str(content).map_err(|e| ReleaseError::InvalidConfig {
                path: PathBuf::new(),
                reason: e.to_string(),
            })?;
        config.resolve_paths(base);
        config.validate()?;
        Ok(config)
    }

    /// Set the signing key (blank means none)
    pub fn with_signing_key(mut self, key: Option<String>) -> Self {
        self.signing_key = SigningKey::from_optional(key);
        self
    }

    /// Set the target version
    pub fn with_target_version(mut self, version: Option<semver::Version>) -> Self {
        self.target_version = version;
        self
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.spec_file);
        resolve(&mut self.output_dir);
        resolve(&mut self.build_root);
        resolve(&mut self.staging_dir);
        resolve(&mut self.state_file);

        let a = &mut self.artifacts;
        resolve(&mut a.binary);
        resolve(&mut a.binary_source);
        resolve(&mut a.assets);
        resolve(&mut a.desktop_file);
        resolve(&mut a.metainfo_file);
        resolve(&mut a.license);
        for icon in &mut a.icons {
            resolve(&mut icon.path);
        }
    }

    fn validate(&self) -> Result<()> {
        let invalid = |reason: String| ReleaseError::InvalidConfig {
            path: PathBuf::new(),
            reason,
        };

        if self.artifacts.icons.is_empty() {
            return Err(invalid("at least one icon must be declared".to_string()));
        }
        for var in &self.launcher.env {
            let valid_name = !var.name.is_empty()
                && !var.name.starts_with(|c: char| c.is_ascii_digit())
                && var.name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
            if !valid_name {
                return Err(invalid(format!("invalid launcher variable name `{}`", var.name)));
            }
        }
        if self.tools.timeout_secs == 0 {
            return Err(invalid("tools.timeout_secs must be positive".to_string()));
        }
        self.check_layout().map_err(invalid)
    }

    /// Build root and staging are wiped on every run and published files are
    /// replaced, so none of the three may contain another or any input.
    fn check_layout(&self) -> std::result::Result<(), String> {
        let managed = [
            ("build_root", &self.build_root),
            ("staging_dir", &self.staging_dir),
            ("output_dir", &self.output_dir),
        ];
        for (i, (name, dir)) in managed.iter().enumerate() {
            for (other_name, other) in &managed[i + 1..] {
                if other.starts_with(dir) || dir.starts_with(other) {
                    return Err(format!(
                        "{name} ({}) and {other_name} ({}) must not overlap",
                        dir.display(),
                        other.display()
                    ));
                }
            }
        }

        let a = &self.artifacts;
        let inputs = [
            ("spec_file", &self.spec_file),
            ("artifacts.binary", &a.binary),
            ("artifacts.binary_source", &a.binary_source),
            ("artifacts.assets", &a.assets),
            ("artifacts.desktop_file", &a.desktop_file),
            ("artifacts.metainfo_file", &a.metainfo_file),
            ("artifacts.license", &a.license),
        ]
        .into_iter()
        .chain(a.icons.iter().map(|icon| ("artifacts.icons", &icon.path)));
        for (input_name, input) in inputs {
            for (name, dir) in &managed {
                if input.starts_with(dir) {
                    return Err(format!(
                        "{input_name} ({}) is inside {name} ({}), which is replaced on every run",
                        input.display(),
                        dir.display()
                    ));
                }
            }
        }
        Ok(())
    }
}
