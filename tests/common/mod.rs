//! Shared fixtures for the integration tests: a project directory with every
//! pipeline input, plus in-process stand-ins for the OS tools.

#![allow(dead_code)]

use rpm_release::builder::{BuildEnvironment, PackageTool};
use rpm_release::config::{PipelineConfig, SigningKey};
use rpm_release::error::{ReleaseError, Result};
use rpm_release::metadata::MetadataTool;
use rpm_release::signing::PackageSigner;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

pub const APP_ID: &str = "com.example.ImageInpainter";

pub const PACKAGE_TOML: &str = r#"name = "image-inpainter"
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

pub const RELEASE_TOML: &str = r#"spec_file = "package.toml"
output_dir = "dist/rpm"
build_root = "build/rpmbuild"
staging_dir = "build/staging"
state_file = "build/release-state.json"

[artifacts]
binary = "frozen/image-inpainter"
binary_source = "src"
assets = "assets"
desktop_file = "packaging/com.example.ImageInpainter.desktop"
metainfo_file = "packaging/com.example.ImageInpainter.metainfo.xml"
license = "LICENSE"
icons = [
    { size = 48, path = "icons/48.png" },
    { size = 256, path = "icons/256.png" },
]

[changelog]
author = "Release Bot <release@example.com>"
"#;

pub const DESKTOP: &str = "[Desktop Entry]
Type=Application
Name=Image Inpainter
Comment=Remove objects from photos
Exec=image-inpainter %F
Icon=com.example.ImageInpainter
Categories=Graphics;
";

pub const METAINFO: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<component type="desktop-application">
  <id>com.example.ImageInpainter.desktop</id>
  <name>Image Inpainter</name>
  <summary>Remove objects from photos</summary>
  <metadata_license>CC0-1.0</metadata_license>
  <project_license>MIT</project_license>
  <launchable type="desktop-id">com.example.ImageInpainter.desktop</launchable>
  <icon type="stock">com.example.ImageInpainter</icon>
</component>
"#;

/// Project directory holding every input the pipeline reads
pub struct Project {
    dir: TempDir,
}

impl Project {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        std::fs::write(root.join("package.toml"), PACKAGE_TOML).unwrap();
        std::fs::write(root.join("release.toml"), RELEASE_TOML).unwrap();

        std::fs::create_dir_all(root.join("src")).unwrap();
        let source = root.join("src/image_inpainter.py");
        std::fs::write(&source, "print('inpaint')\n").unwrap();
        set_mtime(&source, SystemTime::now() - Duration::from_secs(3600));

        std::fs::create_dir_all(root.join("frozen")).unwrap();
        std::fs::write(root.join("frozen/image-inpainter"), "#!/bin/sh\necho frozen\n").unwrap();

        std::fs::create_dir_all(root.join("assets/models")).unwrap();
        std::fs::write(root.join("assets/models/lama.onnx"), "weights").unwrap();
        std::fs::write(root.join("assets/style.qss"), "QWidget {}\n").unwrap();

        std::fs::create_dir_all(root.join("packaging")).unwrap();
        std::fs::write(root.join("packaging").join(format!("{APP_ID}.desktop")), DESKTOP).unwrap();
        std::fs::write(root.join("packaging").join(format!("{APP_ID}.metainfo.xml")), METAINFO).unwrap();
        std::fs::write(root.join("LICENSE"), "MIT License\n").unwrap();

        std::fs::create_dir_all(root.join("icons")).unwrap();
        for size in [48u32, 256] {
            image::RgbaImage::new(size, size)
                .save(root.join(format!("icons/{size}.png")))
                .unwrap();
        }

        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn config_path(&self) -> PathBuf {
        self.path().join("release.toml")
    }

    pub fn config(&self) -> PipelineConfig {
        PipelineConfig::load(&self.config_path()).unwrap()
    }

    pub fn output_dir(&self) -> PathBuf {
        self.path().join("dist/rpm")
    }

    pub fn write(&self, relative: &str, content: &str) {
        std::fs::write(self.path().join(relative), content).unwrap();
    }

    pub fn read(&self, relative: &str) -> String {
        std::fs::read_to_string(self.path().join(relative)).unwrap()
    }

    /// Sorted file names in the output directory (empty if it does not exist)
    pub fn published_names(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(self.output_dir()) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

pub fn set_mtime(path: &Path, time: SystemTime) {
    std::fs::File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(time)
        .unwrap();
}

/// Metadata validator that accepts everything and counts invocations
#[derive(Default)]
pub struct AcceptingMetadataTool {
    pub calls: AtomicUsize,
}

impl MetadataTool for AcceptingMetadataTool {
    async fn validate_desktop_entry(&self, _path: &Path) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn validate_appstream(&self, _path: &Path) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Package tool that executes the rendered spec in-process.
///
/// It unpacks the source tarball into `BUILD/`, replays the `%install`
/// commands into a package written with the `rpm` crate, and lays out the
/// results the way rpmbuild does.
#[derive(Default)]
pub struct SpecReplayBuild {
    pub calls: AtomicUsize,
    pub fail_with: Option<String>,
    pub last_spec: Mutex<Option<String>>,
}

impl SpecReplayBuild {
    pub fn failing(output: &str) -> Self {
        Self {
            fail_with: Some(output.to_string()),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PackageTool for SpecReplayBuild {
    fn name(&self) -> &str {
        "rpmbuild"
    }

    async fn build(&self, env: &BuildEnvironment, spec_file: &Path, arch: &str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let spec = std::fs::read_to_string(spec_file)?;
        *self.last_spec.lock().unwrap() = Some(spec.clone());

        if let Some(output) = &self.fail_with {
            std::fs::write(env.build().join("partial.o"), "partial")?;
            return Err(ReleaseError::BuildToolError {
                tool: "rpmbuild".to_string(),
                code: Some(1),
                output: output.clone(),
            });
        }

        let name = tag(&spec, "Name:");
        let version = tag(&spec, "Version:");
        let release = tag(&spec, "Release:");
        let tarball = env.sources().join(tag(&spec, "Source0:"));

        let decoder = flate2::read::GzDecoder::new(std::fs::File::open(&tarball)?);
        tar::Archive::new(decoder).unpack(env.build())?;
        let tree = env.build().join(format!("{name}-{version}"));

        let mut builder = rpm::PackageBuilder::new(&name, &version, "MIT", arch, "replayed").release(&release);
        for line in spec.lines() {
            if let Some(rest) = line.strip_prefix("install -D -m ") {
                let (mode, operands) = rest.split_once(' ').unwrap();
                let (source, dest) = operands_of(operands);
                let content = std::fs::read(tree.join(&source))?;
                builder = builder.with_file_contents(content, file_options(&dest, mode))?;
            } else if let Some(rest) = line.strip_prefix("cp -a ") {
                let (source, dest) = operands_of(rest);
                let source_dir = tree.join(source.trim_end_matches("/."));
                let dest_dir = dest.trim_end_matches('/').to_string();
                for entry in walkdir::WalkDir::new(&source_dir).sort_by_file_name() {
                    let entry = entry?;
                    if !entry.file_type().is_file() {
                        continue;
                    }
                    let relative = entry.path().strip_prefix(&source_dir).unwrap();
                    let dest = format!("{dest_dir}/{}", relative.to_string_lossy());
                    let content = std::fs::read(entry.path())?;
                    builder = builder.with_file_contents(content, file_options(&dest, "0644"))?;
                }
            }
        }

        let package = builder.build()?;
        let arch_dir = env.rpms().join(arch);
        std::fs::create_dir_all(&arch_dir)?;
        let mut file = std::fs::File::create(arch_dir.join(format!("{name}-{version}-{release}.{arch}.rpm")))?;
        package.write(&mut file)?;

        std::fs::write(env.srpms().join(format!("{name}-{version}-{release}.src.rpm")), &spec)?;
        Ok(())
    }
}

fn tag(spec: &str, tag: &str) -> String {
    spec.lines()
        .find_map(|line| line.strip_prefix(tag))
        .map(|value| value.trim().to_string())
        .unwrap_or_else(|| panic!("spec has no {tag} line"))
}

/// Split `'source'<suffix> "%{buildroot}dest"<suffix>` into its two paths
fn operands_of(operands: &str) -> (String, String) {
    let source = operands
        .strip_prefix('\'')
        .and_then(|s| s.split_once('\''))
        .map(|(s, _)| s.to_string())
        .unwrap();
    let dest = operands
        .split_once("\"%{buildroot}")
        .and_then(|(_, d)| d.split_once('"'))
        .map(|(d, _)| d.to_string())
        .unwrap();
    (source, dest)
}

fn file_options(dest: &str, mode: &str) -> rpm::FileOptionsBuilder {
    let mode = if mode == "0755" { 0o755 } else { 0o644 };
    rpm::FileOptions::new(dest).mode(rpm::FileMode::regular(mode))
}

/// Signer that records calls and accepts every signature
#[derive(Default)]
pub struct RecordingSigner {
    pub calls: Mutex<Vec<String>>,
}

impl PackageSigner for RecordingSigner {
    async fn sign(&self, package: &Path, key: &SigningKey) -> Result<()> {
        let name = package.file_name().unwrap().to_string_lossy().into_owned();
        self.calls.lock().unwrap().push(format!("sign {key} {name}"));
        Ok(())
    }

    async fn verify(&self, package: &Path) -> Result<()> {
        let name = package.file_name().unwrap().to_string_lossy().into_owned();
        self.calls.lock().unwrap().push(format!("verify {name}"));
        Ok(())
    }
}
