//! Artifact staging and source tarball creation.
//!
//! [`ArtifactBundler`] checks the declared inputs, stages them into
//! `<staging>/<name>-<version>/` together with the generated launcher, checks
//! that every reference made by the desktop entry and AppStream metadata
//! resolves inside the install manifest, and archives the tree
//! deterministically.

mod archive;
pub mod fs;
pub mod icons;
mod launcher;

pub use archive::{list_tarball, tar_and_gzip_dir};
pub use launcher::render_launcher;

use crate::config::{ArtifactInputs, EnvVar};
use crate::error::{ErrorExt, ReleaseError, Result};
use crate::metadata::{AppStreamMetadata, DesktopEntry};
use crate::spec::{EntryKind, FileMode, ManifestEntry, PackageSpec, is_path_dir};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Directory receiving the desktop entry
pub const APPLICATIONS_DIR: &str = "/usr/share/applications";

/// Directory receiving AppStream metadata
pub const METAINFO_DIR: &str = "/usr/share/metainfo";

/// Staged file tree plus its ordered install manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSet {
    /// `<staging>/<name>-<version>`
    pub root: PathBuf,
    /// Ordered `(source, dest, mode)` entries; sources are relative to `root`
    pub manifest: Vec<ManifestEntry>,
}

/// Output of the bundle stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    /// Staged tree and manifest
    pub artifacts: ArtifactSet,
    /// `<name>-<version>.tar.gz`
    pub tarball: PathBuf,
}

/// Builds the staged tree and source tarball
#[derive(Debug, Clone)]
pub struct ArtifactBundler {
    staging_dir: PathBuf,
    launcher_env: Vec<EnvVar>,
}

impl ArtifactBundler {
    /// Stage under `staging_dir`; the launcher exports `launcher_env`
    pub fn new(staging_dir: impl Into<PathBuf>, launcher_env: Vec<EnvVar>) -> Self {
        Self {
            staging_dir: staging_dir.into(),
            launcher_env,
        }
    }

    /// Check inputs, stage them and produce the source tarball
    pub async fn bundle(&self, spec: &PackageSpec, inputs: &ArtifactInputs) -> Result<Bundle> {
        check_inputs_exist(inputs).await?;
        check_fresh(&inputs.binary, &inputs.binary_source).await?;
        icons::check_unique_sizes(&inputs.icons)?;
        for icon in &inputs.icons {
            icons::check_icon(icon).await?;
        }

        let binary_name = file_name(&inputs.binary)?;
        let root = self.staging_dir.join(spec.source_dir_name());
        fs::reset_dir(&self.staging_dir).await?;
        self.stage(spec, inputs, &binary_name, &root).await?;

        let manifest = install_manifest(spec, &binary_name, &inputs.icons)?;
        check_sources_staged(&root, &manifest).await?;
        check_references(&root, spec, &manifest).await?;

        let tarball = tar_and_gzip_dir(&root, &self.staging_dir.join(spec.tarball_name())).await?;
        log::info!(
            "Bundled {} ({} manifest entries)",
            tarball.display(),
            manifest.len()
        );

        Ok(Bundle {
            artifacts: ArtifactSet { root, manifest },
            tarball,
        })
    }

    async fn stage(&self, spec: &PackageSpec, inputs: &ArtifactInputs, binary_name: &str, root: &Path) -> Result<()> {
        let staged_binary = root.join("bin").join(binary_name);
        fs::copy_file(&inputs.binary, &staged_binary).await?;
        fs::set_mode(&staged_binary, FileMode::EXECUTABLE.bits()).await?;

        fs::copy_dir(&inputs.assets, &root.join("assets")).await?;

        let regular = [
            (&inputs.desktop_file, root.join(spec.desktop_file_name())),
            (&inputs.metainfo_file, root.join(spec.metainfo_file_name())),
            (&inputs.license, root.join("LICENSE")),
        ];
        for (from, to) in regular {
            fs::copy_file(from, &to).await?;
            fs::set_mode(&to, FileMode::REGULAR.bits()).await?;
        }

        for icon in &inputs.icons {
            let to = root
                .join("icons/hicolor")
                .join(icons::hicolor_rel_path(icon.size, &spec.app_id));
            fs::copy_file(&icon.path, &to).await?;
            fs::set_mode(&to, FileMode::REGULAR.bits()).await?;
        }

        let script = render_launcher(
            &spec.name,
            &spec.binary_install_dir.join(binary_name),
            &self.launcher_env,
        )?;
        let launcher = root.join("launcher").join(spec.launcher_command());
        if let Some(parent) = launcher.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .fs_context("creating launcher directory", parent)?;
        }
        tokio::fs::write(&launcher, script)
            .await
            .fs_context("writing launcher", &launcher)?;
        fs::set_mode(&launcher, FileMode::EXECUTABLE.bits()).await?;

        log::debug!("Staged artifact tree at {}", root.display());
        Ok(())
    }
}

/// The ordered install manifest: standard entries followed by `spec.files`
pub fn install_manifest(
    spec: &PackageSpec,
    binary_name: &str,
    icons: &[crate::config::IconInput],
) -> Result<Vec<ManifestEntry>> {
    let mut manifest = vec![
        ManifestEntry::file(
            Path::new("bin").join(binary_name),
            spec.binary_install_dir.join(binary_name),
            FileMode::EXECUTABLE,
        ),
        ManifestEntry::directory("assets", spec.binary_install_dir.join("assets")),
        ManifestEntry::file(
            Path::new("launcher").join(spec.launcher_command()),
            &spec.launcher_path,
            FileMode::EXECUTABLE,
        ),
        ManifestEntry::file(
            spec.desktop_file_name(),
            Path::new(APPLICATIONS_DIR).join(spec.desktop_file_name()),
            FileMode::REGULAR,
        ),
        ManifestEntry::file(
            spec.metainfo_file_name(),
            Path::new(METAINFO_DIR).join(spec.metainfo_file_name()),
            FileMode::REGULAR,
        ),
    ];

    let mut sorted_icons: Vec<_> = icons.iter().map(|i| i.size).collect();
    sorted_icons.sort_unstable();
    for size in sorted_icons {
        let rel = icons::hicolor_rel_path(size, &spec.app_id);
        manifest.push(ManifestEntry::file(
            Path::new("icons/hicolor").join(&rel),
            icons::install_path(size, &spec.app_id),
            FileMode::REGULAR,
        ));
    }

    let mut dests: HashSet<PathBuf> = manifest.iter().map(|e| e.dest.clone()).collect();
    for extra in &spec.files {
        if !dests.insert(extra.dest.clone()) {
            return Err(ReleaseError::InvalidSpec {
                path: PathBuf::from(&spec.name),
                reason: format!("extra file {} collides with a standard entry", extra.dest.display()),
            });
        }
        manifest.push(extra.clone());
    }
    Ok(manifest)
}

async fn check_inputs_exist(inputs: &ArtifactInputs) -> Result<()> {
    let mut declared = vec![
        (&inputs.binary, "binary".to_string()),
        (&inputs.binary_source, "binary source".to_string()),
        (&inputs.assets, "assets directory".to_string()),
        (&inputs.desktop_file, "desktop entry".to_string()),
        (&inputs.metainfo_file, "AppStream metadata".to_string()),
        (&inputs.license, "license".to_string()),
    ];
    declared.extend(
        inputs
            .icons
            .iter()
            .map(|i| (&i.path, format!("{0}x{0} icon", i.size))),
    );

    for (path, role) in declared {
        if !tokio::fs::try_exists(path).await.fs_context("checking artifact", path)? {
            return Err(ReleaseError::MissingArtifact {
                path: path.clone(),
                role,
            });
        }
    }
    if !tokio::fs::metadata(&inputs.assets)
        .await
        .fs_context("reading metadata", &inputs.assets)?
        .is_dir()
    {
        return Err(ReleaseError::MissingArtifact {
            path: inputs.assets.clone(),
            role: "assets directory (not a directory)".to_string(),
        });
    }
    Ok(())
}

/// Fail with [`ReleaseError::StaleArtifact`] when `binary` is older than
/// `source` (the newest file inside it, for directories).
pub async fn check_fresh(binary: &Path, source: &Path) -> Result<()> {
    let (binary_time, _) = fs::newest_mtime(binary).await?;
    let (source_time, newest) = fs::newest_mtime(source).await?;
    if binary_time < source_time {
        return Err(ReleaseError::StaleArtifact {
            binary: binary.to_path_buf(),
            declared_source: newest,
        });
    }
    Ok(())
}

async fn check_sources_staged(root: &Path, manifest: &[ManifestEntry]) -> Result<()> {
    for entry in manifest {
        let source = root.join(&entry.source);
        let present = match tokio::fs::metadata(&source).await {
            Ok(meta) => match entry.kind {
                EntryKind::File => meta.is_file(),
                EntryKind::Directory => meta.is_dir(),
            },
            Err(_) => false,
        };
        if !present {
            return Err(ReleaseError::MissingArtifact {
                path: source,
                role: format!("source of {}", entry.dest.display()),
            });
        }
    }
    Ok(())
}

/// Resolves references against an install manifest
struct ManifestIndex<'a> {
    root: &'a Path,
    manifest: &'a [ManifestEntry],
}

impl ManifestIndex<'_> {
    fn files(&self) -> impl Iterator<Item = &Path> {
        self.manifest
            .iter()
            .filter(|e| e.kind == EntryKind::File)
            .map(|e| e.dest.as_path())
    }

    fn has_path(&self, path: &Path) -> bool {
        self.manifest.iter().any(|e| match e.kind {
            EntryKind::File => e.dest == path,
            EntryKind::Directory => path
                .strip_prefix(&e.dest)
                .is_ok_and(|rel| self.root.join(&e.source).join(rel).is_file()),
        })
    }

    fn has_command(&self, command: &str) -> bool {
        if command.starts_with('/') {
            return self.has_path(Path::new(command));
        }
        self.files().any(|dest| {
            dest.parent().is_some_and(is_path_dir)
                && dest.file_name().is_some_and(|n| n == command)
        })
    }

    fn has_icon(&self, name: &str) -> bool {
        if name.starts_with('/') {
            return self.has_path(Path::new(name));
        }
        self.files().any(|dest| {
            dest.starts_with(icons::HICOLOR_DIR)
                && dest.file_stem().is_some_and(|s| s == name)
        })
    }

    fn has_desktop_id(&self, id: &str) -> bool {
        self.files().any(|dest| {
            dest.parent() == Some(Path::new(APPLICATIONS_DIR))
                && dest.file_name().is_some_and(|n| n == id)
        })
    }
}

/// Check that every reference made by the staged desktop entry and AppStream
/// metadata resolves to a file in `manifest`.
pub async fn check_references(root: &Path, spec: &PackageSpec, manifest: &[ManifestEntry]) -> Result<()> {
    let desktop_path = root.join(spec.desktop_file_name());
    let metainfo_path = root.join(spec.metainfo_file_name());
    let desktop_text = tokio::fs::read_to_string(&desktop_path)
        .await
        .fs_context("reading staged desktop entry", &desktop_path)?;
    let metainfo_text = tokio::fs::read_to_string(&metainfo_path)
        .await
        .fs_context("reading staged AppStream metadata", &metainfo_path)?;

    let desktop = DesktopEntry::parse(&desktop_text).map_err(|reason| ReleaseError::MetadataInvalid {
        tool: "desktop entry parser".to_string(),
        file: desktop_path.clone(),
        output: reason,
    })?;
    let appstream = AppStreamMetadata::parse(&metainfo_text).map_err(|reason| ReleaseError::MetadataInvalid {
        tool: "AppStream parser".to_string(),
        file: metainfo_path.clone(),
        output: reason,
    })?;

    let index = ManifestIndex { root, manifest };
    let unresolved = |reference: &str, role: String| ReleaseError::MissingArtifact {
        path: PathBuf::from(reference),
        role,
    };
    let desktop_name = spec.desktop_file_name();
    let metainfo_name = spec.metainfo_file_name();

    if let Some(icon) = desktop.get("Icon")
        && !index.has_icon(icon)
    {
        return Err(unresolved(icon, format!("Icon= in {desktop_name}")));
    }
    if let Some(program) = desktop.exec_program()
        && !index.has_command(&program)
    {
        return Err(unresolved(&program, format!("Exec= in {desktop_name}")));
    }
    if let Some(program) = desktop.try_exec()
        && !index.has_command(program)
    {
        return Err(unresolved(program, format!("TryExec= in {desktop_name}")));
    }

    for id in appstream.desktop_launchables() {
        if !index.has_desktop_id(id) {
            return Err(unresolved(id, format!("<launchable type=\"desktop-id\"> in {metainfo_name}")));
        }
    }
    for icon in appstream.icons_of("stock") {
        if !index.has_icon(icon) {
            return Err(unresolved(icon, format!("<icon type=\"stock\"> in {metainfo_name}")));
        }
    }
    for icon in appstream.icons_of("local") {
        if !index.has_path(Path::new(icon)) {
            return Err(unresolved(icon, format!("<icon type=\"local\"> in {metainfo_name}")));
        }
    }

    log::debug!("All desktop and AppStream references resolve");
    Ok(())
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| ReleaseError::MissingArtifact {
            path: path.to_path_buf(),
            role: "binary (no file name)".to_string(),
        })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::IconInput;
    use crate::spec::tests::sample_spec;
    use std::time::{Duration, SystemTime};

    pub(crate) const DESKTOP: &str = "[Desktop Entry]
Type=Application
Name=Image Inpainter
Exec=image-inpainter %F
Icon=com.example.ImageInpainter
Categories=Graphics;
";

    pub(crate) const METAINFO: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
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

    /// Write a complete, fresh set of inputs under `dir`
    pub(crate) fn write_inputs(dir: &Path) -> ArtifactInputs {
        let src = dir.join("src");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("image_inpainter.py"), "print('hi')\n").unwrap();
        std::fs::File::options()
            .write(true)
            .open(src.join("image_inpainter.py"))
            .unwrap()
            .set_modified(SystemTime::now() - Duration::from_secs(3600))
            .unwrap();

        std::fs::create_dir_all(dir.join("dist")).unwrap();
        std::fs::write(dir.join("dist/image-inpainter"), "#!/bin/sh\necho frozen\n").unwrap();
        std::fs::create_dir_all(dir.join("assets/models")).unwrap();
        std::fs::write(dir.join("assets/models/lama.onnx"), "weights").unwrap();

        let desktop = dir.join("com.example.ImageInpainter.desktop");
        let metainfo = dir.join("com.example.ImageInpainter.metainfo.xml");
        std::fs::write(&desktop, DESKTOP).unwrap();
        std::fs::write(&metainfo, METAINFO).unwrap();
        std::fs::write(dir.join("LICENSE"), "MIT License\n").unwrap();

        let mut icons = Vec::new();
        for size in [48u32, 256] {
            let path = dir.join(format!("icon-{size}.png"));
            image::RgbaImage::new(size, size).save(&path).unwrap();
            icons.push(IconInput { size, path });
        }

        ArtifactInputs {
            binary: dir.join("dist/image-inpainter"),
            binary_source: src,
            assets: dir.join("assets"),
            desktop_file: desktop,
            metainfo_file: metainfo,
            license: dir.join("LICENSE"),
            icons,
        }
    }

    fn bundler(dir: &Path) -> ArtifactBundler {
        ArtifactBundler::new(
            dir.join("staging"),
            vec![EnvVar {
                name: "QT_QPA_PLATFORM".to_string(),
                value: "wayland;xcb".to_string(),
            }],
        )
    }

    #[tokio::test]
    async fn test_bundle_stages_tree_and_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let inputs = write_inputs(dir.path());
        let bundle = bundler(dir.path()).bundle(&sample_spec(), &inputs).await.unwrap();

        let root = &bundle.artifacts.root;
        assert!(root.ends_with("image-inpainter-0.1.0"));
        assert!(root.join("bin/image-inpainter").is_file());
        assert!(root.join("assets/models/lama.onnx").is_file());
        assert!(root.join("icons/hicolor/256x256/apps/com.example.ImageInpainter.png").is_file());
        let launcher = std::fs::read_to_string(root.join("launcher/image-inpainter")).unwrap();
        assert!(launcher.contains("exec '/usr/lib/image-inpainter/image-inpainter' \"$@\""));

        let dests: Vec<_> = bundle
            .artifacts
            .manifest
            .iter()
            .map(|e| e.dest.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            dests,
            vec![
                "/usr/lib/image-inpainter/image-inpainter",
                "/usr/lib/image-inpainter/assets",
                "/usr/bin/image-inpainter",
                "/usr/share/applications/com.example.ImageInpainter.desktop",
                "/usr/share/metainfo/com.example.ImageInpainter.metainfo.xml",
                "/usr/share/icons/hicolor/48x48/apps/com.example.ImageInpainter.png",
                "/usr/share/icons/hicolor/256x256/apps/com.example.ImageInpainter.png",
            ]
        );
        assert!(bundle.tarball.ends_with("image-inpainter-0.1.0.tar.gz"));
    }

    #[tokio::test]
    async fn test_tarball_listing_is_stable_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        let inputs = write_inputs(dir.path());
        let bundler = bundler(dir.path());

        let first = bundler.bundle(&sample_spec(), &inputs).await.unwrap();
        let first_listing = list_tarball(&first.tarball).unwrap();
        let second = bundler.bundle(&sample_spec(), &inputs).await.unwrap();
        let second_listing = list_tarball(&second.tarball).unwrap();

        assert_eq!(first_listing, second_listing);
        assert_eq!(first.artifacts.manifest, second.artifacts.manifest);
        assert!(first_listing.iter().all(|(n, _)| n.starts_with("image-inpainter-0.1.0")));
    }

    #[tokio::test]
    async fn test_missing_input_named() {
        let dir = tempfile::tempdir().unwrap();
        let inputs = write_inputs(dir.path());
        std::fs::remove_file(&inputs.license).unwrap();

        let err = bundler(dir.path()).bundle(&sample_spec(), &inputs).await.unwrap_err();
        match err {
            ReleaseError::MissingArtifact { path, role } => {
                assert_eq!(path, inputs.license);
                assert_eq!(role, "license");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stale_binary_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let inputs = write_inputs(dir.path());
        std::fs::File::options()
            .write(true)
            .open(&inputs.binary)
            .unwrap()
            .set_modified(SystemTime::now() - Duration::from_secs(7200))
            .unwrap();

        let err = bundler(dir.path()).bundle(&sample_spec(), &inputs).await.unwrap_err();
        assert!(matches!(err, ReleaseError::StaleArtifact { .. }));
    }

    #[tokio::test]
    async fn test_unresolved_exec_reference() {
        let dir = tempfile::tempdir().unwrap();
        let inputs = write_inputs(dir.path());
        std::fs::write(&inputs.desktop_file, DESKTOP.replace("Exec=image-inpainter", "Exec=inpaint")).unwrap();

        let err = bundler(dir.path()).bundle(&sample_spec(), &inputs).await.unwrap_err();
        match err {
            ReleaseError::MissingArtifact { path, role } => {
                assert_eq!(path, PathBuf::from("inpaint"));
                assert!(role.starts_with("Exec="));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unresolved_local_icon_reference() {
        let dir = tempfile::tempdir().unwrap();
        let inputs = write_inputs(dir.path());
        let text = METAINFO.replace(
            "</component>",
            "  <icon type=\"local\">/usr/share/pixmaps/inpainter.png</icon>\n</component>",
        );
        std::fs::write(&inputs.metainfo_file, text).unwrap();

        let err = bundler(dir.path()).bundle(&sample_spec(), &inputs).await.unwrap_err();
        assert!(matches!(err, ReleaseError::MissingArtifact { .. }));
    }

    #[tokio::test]
    async fn test_reference_into_assets_directory_resolves() {
        let dir = tempfile::tempdir().unwrap();
        let inputs = write_inputs(dir.path());
        std::fs::write(
            &inputs.desktop_file,
            DESKTOP.replace(
                "Icon=com.example.ImageInpainter",
                "Icon=com.example.ImageInpainter\nTryExec=/usr/lib/image-inpainter/assets/models/lama.onnx",
            ),
        )
        .unwrap();
        bundler(dir.path()).bundle(&sample_spec(), &inputs).await.unwrap();
    }

    #[test]
    fn test_extra_file_colliding_with_standard_entry() {
        let mut spec = sample_spec();
        spec.files.push(ManifestEntry::file(
            "LICENSE",
            "/usr/bin/image-inpainter",
            FileMode::REGULAR,
        ));
        let err = install_manifest(&spec, "image-inpainter", &[]).unwrap_err();
        assert!(matches!(err, ReleaseError::InvalidSpec { .. }));
    }
}
