//! Native package build.
//!
//! [`PackageBuilder`] prepares a clean [`BuildEnvironment`], renders the spec
//! file, runs the package-build tool and checks what it produced against the
//! package spec by reading the binary package header.

mod environment;

pub use environment::{BUILD_DIRS, BuildEnvironment};

use crate::bundler::Bundle;
use crate::error::{ErrorExt, ReleaseError, Result};
use crate::spec::{ManifestEntry, PackageSpec, SpecRenderer};
use crate::tools::ToolRunner;
use std::ffi::OsString;
use std::future::Future;
use std::path::{Path, PathBuf};

/// Package-build capability
pub trait PackageTool {
    /// Tool name used in diagnostics
    fn name(&self) -> &str;

    /// Build binary and source packages from `spec_file` inside `env`
    fn build(&self, env: &BuildEnvironment, spec_file: &Path, arch: &str) -> impl Future<Output = Result<()>>;
}

impl<T: PackageTool> PackageTool for &T {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn build(&self, env: &BuildEnvironment, spec_file: &Path, arch: &str) -> impl Future<Output = Result<()>> {
        (**self).build(env, spec_file, arch)
    }
}

/// [`PackageTool`] backed by `rpmbuild -ba`
#[derive(Debug, Clone)]
pub struct RpmBuild {
    runner: ToolRunner,
    program: String,
}

impl RpmBuild {
    /// Use `program` (normally `rpmbuild`)
    pub fn new(runner: ToolRunner, program: impl Into<String>) -> Self {
        Self {
            runner,
            program: program.into(),
        }
    }

    /// Arguments passed to rpmbuild
    pub fn args(env: &BuildEnvironment, spec_file: &Path, arch: &str) -> Vec<OsString> {
        let mut topdir = OsString::from("_topdir ");
        topdir.push(env.root());
        vec![
            "-ba".into(),
            "--define".into(),
            topdir,
            "--target".into(),
            arch.into(),
            spec_file.into(),
        ]
    }
}

impl PackageTool for RpmBuild {
    fn name(&self) -> &str {
        &self.program
    }

    async fn build(&self, env: &BuildEnvironment, spec_file: &Path, arch: &str) -> Result<()> {
        let output = self
            .runner
            .run(&self.program, Self::args(env, spec_file, arch), Some(env.root()))
            .await
            .map_err(|e| {
                e.attribute_interrupted(|output| ReleaseError::BuildToolError {
                    tool: self.program.clone(),
                    code: None,
                    output,
                })
            })?;
        if !output.success() {
            return Err(ReleaseError::BuildToolError {
                tool: self.program.clone(),
                code: output.code,
                output: output.combined(),
            });
        }
        log::debug!("{} finished: {}", self.program, output.last_line());
        Ok(())
    }
}

/// Packages produced by a successful build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltPackages {
    /// `<name>-<version>-<release>.<arch>.rpm`
    pub binary: PathBuf,
    /// `<name>-<version>-<release>.src.rpm`
    pub source: PathBuf,
    /// Sorted file list from the binary package header
    pub manifest: Vec<PathBuf>,
}

/// Renders the spec file and drives a [`PackageTool`]
pub struct PackageBuilder<'a, T: PackageTool> {
    tool: &'a T,
    build_root: PathBuf,
    icon_cache: String,
    renderer: SpecRenderer,
}

impl<'a, T: PackageTool> PackageBuilder<'a, T> {
    /// Build under `build_root`; `icon_cache` is the hook command
    pub fn new(tool: &'a T, build_root: impl Into<PathBuf>, icon_cache: impl Into<String>) -> Result<Self> {
        Ok(Self {
            tool,
            build_root: build_root.into(),
            icon_cache: icon_cache.into(),
            renderer: SpecRenderer::new()?,
        })
    }

    /// Render the spec file for `spec` and its install manifest
    pub fn render_spec(&self, spec: &PackageSpec, manifest: &[ManifestEntry]) -> Result<String> {
        self.renderer.render(spec, manifest, &self.icon_cache)
    }

    /// Build binary and source packages
    pub async fn build(&self, spec: &PackageSpec, bundle: &Bundle) -> Result<BuiltPackages> {
        let env = BuildEnvironment::prepare(&self.build_root).await?;

        let source = env.sources().join(spec.tarball_name());
        tokio::fs::copy(&bundle.tarball, &source)
            .await
            .fs_context("copying source tarball", &bundle.tarball)?;

        let spec_file = env.specs().join(format!("{}.spec", spec.name));
        let text = self.render_spec(spec, &bundle.artifacts.manifest)?;
        tokio::fs::write(&spec_file, text)
            .await
            .fs_context("writing spec file", &spec_file)?;

        log::info!("Building {} {} with {}", spec.name, spec.version_release(), self.tool.name());
        self.tool.build(&env, &spec_file, &spec.arch).await?;

        let packages = self.collect(&env, spec).await?;
        log::info!(
            "Built {} and {} ({} files)",
            packages.binary.display(),
            packages.source.display(),
            packages.manifest.len()
        );
        Ok(packages)
    }

    async fn collect(&self, env: &BuildEnvironment, spec: &PackageSpec) -> Result<BuiltPackages> {
        let (rpms, srpms) = (env.rpms(), env.srpms());
        let (binaries, sources) = tokio::task::spawn_blocking(move || -> Result<_> {
            Ok((find_packages(&rpms, true)?, find_packages(&srpms, false)?))
        })
        .await??;

        let binary = self.exactly_one(binaries, "binary")?;
        let source = self.exactly_one(sources, "source")?;

        for (path, expected) in [
            (&binary, spec.binary_package_name()),
            (&source, spec.source_package_name()),
        ] {
            if path.file_name().is_none_or(|n| *n != *expected) {
                return Err(self.failure(format!(
                    "produced {} but {} was expected",
                    path.display(),
                    expected
                )));
            }
        }

        let manifest = self.inspect(&binary, spec).await?;
        Ok(BuiltPackages {
            binary,
            source,
            manifest,
        })
    }

    fn exactly_one(&self, mut found: Vec<PathBuf>, what: &str) -> Result<PathBuf> {
        if found.len() != 1 {
            return Err(self.failure(format!(
                "expected exactly one {what} package, found {}",
                found.len()
            )));
        }
        Ok(found.remove(0))
    }

    async fn inspect(&self, binary: &Path, spec: &PackageSpec) -> Result<Vec<PathBuf>> {
        let path = binary.to_path_buf();
        let header = tokio::task::spawn_blocking(move || read_header(&path)).await??;

        let expected = [
            ("name", spec.name.clone()),
            ("version", spec.version.to_string()),
            ("release", spec.release.to_string()),
            ("arch", spec.arch.clone()),
        ];
        let found = [
            &header.name,
            &header.version,
            &header.release,
            &header.arch,
        ];
        for ((tag, want), got) in expected.iter().zip(found) {
            if want != got {
                return Err(self.failure(format!(
                    "{} header {tag} is `{got}`, expected `{want}`",
                    binary.display()
                )));
            }
        }
        Ok(header.files)
    }

    fn failure(&self, output: String) -> ReleaseError {
        ReleaseError::BuildToolError {
            tool: self.tool.name().to_string(),
            code: Some(0),
            output,
        }
    }
}

/// Fields of a binary package header checked after a build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageHeader {
    /// `Name`
    pub name: String,
    /// `Version`
    pub version: String,
    /// `Release`
    pub release: String,
    /// `Arch`
    pub arch: String,
    /// Installed paths, sorted
    pub files: Vec<PathBuf>,
}

/// Read the header of an rpm package
pub fn read_header(path: &Path) -> Result<PackageHeader> {
    let package = rpm::Package::open(path)?;
    let metadata = &package.metadata;
    let mut files = metadata.get_file_paths()?;
    files.sort();
    Ok(PackageHeader {
        name: metadata.get_name()?.to_string(),
        version: metadata.get_version()?.to_string(),
        release: metadata.get_release()?.to_string(),
        arch: metadata.get_arch()?.to_string(),
        files,
    })
}

fn find_packages(dir: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    let walker = walkdir::WalkDir::new(dir)
        .max_depth(if recursive { usize::MAX } else { 1 })
        .sort_by_file_name();
    let mut found = Vec::new();
    for entry in walker {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy();
        let wanted = if recursive {
            name.ends_with(".rpm") && !name.ends_with(".src.rpm")
        } else {
            name.ends_with(".src.rpm")
        };
        if entry.file_type().is_file() && wanted {
            found.push(entry.into_path());
        }
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::{ArtifactSet, Bundle};
    use crate::spec::tests::sample_spec;
    use crate::spec::FileMode;
    use std::sync::Mutex;

    /// Writes real packages the way rpmbuild lays them out
    struct FakeRpmBuild {
        version: String,
        header_name: String,
        packages: usize,
        seen_spec: Mutex<Option<String>>,
    }

    impl FakeRpmBuild {
        fn new() -> Self {
            Self {
                version: "0.1.0".to_string(),
                header_name: "image-inpainter".to_string(),
                packages: 1,
                seen_spec: Mutex::new(None),
            }
        }
    }

    impl PackageTool for FakeRpmBuild {
        fn name(&self) -> &str {
            "rpmbuild"
        }

        async fn build(&self, env: &BuildEnvironment, spec_file: &Path, arch: &str) -> Result<()> {
            *self.seen_spec.lock().unwrap() = Some(std::fs::read_to_string(spec_file).unwrap());
            let arch_dir = env.rpms().join(arch);
            std::fs::create_dir_all(&arch_dir).unwrap();
            for i in 0..self.packages {
                let pkg = rpm::PackageBuilder::new(&self.header_name, &self.version, "MIT", arch, "test")
                    .release("1")
                    .with_file_contents(
                        "#!/bin/sh\n",
                        rpm::FileOptions::new("/usr/bin/image-inpainter").mode(rpm::FileMode::regular(0o755)),
                    )?
                    .with_file_contents(
                        "bin",
                        rpm::FileOptions::new("/usr/lib/image-inpainter/image-inpainter")
                            .mode(rpm::FileMode::regular(0o755)),
                    )?
                    .build()?;
                let suffix = if i == 0 { String::new() } else { format!("-extra{i}") };
                let path = arch_dir.join(format!("image-inpainter{suffix}-{}-1.{arch}.rpm", self.version));
                let mut file = std::fs::File::create(&path)?;
                pkg.write(&mut file)?;
            }
            std::fs::write(env.srpms().join("image-inpainter-0.1.0-1.src.rpm"), "srpm")?;
            Ok(())
        }
    }

    struct FailingBuild;

    impl PackageTool for FailingBuild {
        fn name(&self) -> &str {
            "rpmbuild"
        }

        async fn build(&self, env: &BuildEnvironment, _spec_file: &Path, _arch: &str) -> Result<()> {
            std::fs::write(env.build().join("partial.o"), "partial")?;
            Err(ReleaseError::BuildToolError {
                tool: "rpmbuild".to_string(),
                code: Some(1),
                output: "error: Bad exit status from /var/tmp/rpm-tmp (%install)".to_string(),
            })
        }
    }

    fn bundle(dir: &Path) -> Bundle {
        let tarball = dir.join("image-inpainter-0.1.0.tar.gz");
        std::fs::write(&tarball, "tarball").unwrap();
        Bundle {
            artifacts: ArtifactSet {
                root: dir.join("image-inpainter-0.1.0"),
                manifest: vec![ManifestEntry::file(
                    "bin/image-inpainter",
                    "/usr/lib/image-inpainter/image-inpainter",
                    FileMode::EXECUTABLE,
                )],
            },
            tarball,
        }
    }

    #[tokio::test]
    async fn test_build_collects_and_inspects() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FakeRpmBuild::new();
        let builder = PackageBuilder::new(&tool, dir.path().join("rpmbuild"), "true").unwrap();

        let built = builder.build(&sample_spec(), &bundle(dir.path())).await.unwrap();
        assert!(built.binary.ends_with("RPMS/x86_64/image-inpainter-0.1.0-1.x86_64.rpm"));
        assert!(built.source.ends_with("SRPMS/image-inpainter-0.1.0-1.src.rpm"));
        assert_eq!(
            built.manifest,
            vec![
                PathBuf::from("/usr/bin/image-inpainter"),
                PathBuf::from("/usr/lib/image-inpainter/image-inpainter"),
            ]
        );

        let rendered = tool.seen_spec.lock().unwrap().clone().unwrap();
        assert!(rendered.contains("Name:           image-inpainter"));
        assert!(dir.path().join("rpmbuild/SOURCES/image-inpainter-0.1.0.tar.gz").is_file());
    }

    #[tokio::test]
    async fn test_two_binary_packages_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FakeRpmBuild {
            packages: 2,
            ..FakeRpmBuild::new()
        };
        let builder = PackageBuilder::new(&tool, dir.path().join("rpmbuild"), "true").unwrap();

        let err = builder.build(&sample_spec(), &bundle(dir.path())).await.unwrap_err();
        assert!(err.to_string().contains("found 2"));
    }

    #[tokio::test]
    async fn test_unexpected_package_name_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut spec = sample_spec();
        spec.version = semver::Version::new(0, 1, 1);
        let tool = FakeRpmBuild {
            version: "0.1.1".to_string(),
            ..FakeRpmBuild::new()
        };
        let builder = PackageBuilder::new(&tool, dir.path().join("rpmbuild"), "true").unwrap();

        // The fake always names the source package 0.1.0.
        let err = builder.build(&spec, &bundle(dir.path())).await.unwrap_err();
        assert!(err.to_string().contains("image-inpainter-0.1.1-1.src.rpm was expected"));
    }

    #[tokio::test]
    async fn test_header_mismatch_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FakeRpmBuild {
            header_name: "image-painter".to_string(),
            ..FakeRpmBuild::new()
        };
        let builder = PackageBuilder::new(&tool, dir.path().join("rpmbuild"), "true").unwrap();

        let err = builder.build(&sample_spec(), &bundle(dir.path())).await.unwrap_err();
        assert!(matches!(err, ReleaseError::BuildToolError { .. }));
        assert!(err.to_string().contains("header name is `image-painter`"));
    }

    #[tokio::test]
    async fn test_failure_leaves_partial_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let builder = PackageBuilder::new(&FailingBuild, dir.path().join("rpmbuild"), "true").unwrap();

        let err = builder.build(&sample_spec(), &bundle(dir.path())).await.unwrap_err();
        match err {
            ReleaseError::BuildToolError { code, output, .. } => {
                assert_eq!(code, Some(1));
                assert!(output.contains("Bad exit status"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(dir.path().join("rpmbuild/BUILD/partial.o").is_file());
    }

    #[test]
    fn test_rpmbuild_arguments() {
        let env = BuildEnvironment::unprepared("/tmp/topdir");
        let args = RpmBuild::args(&env, Path::new("/tmp/topdir/SPECS/x.spec"), "x86_64");
        let args: Vec<_> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            vec!["-ba", "--define", "_topdir /tmp/topdir", "--target", "x86_64", "/tmp/topdir/SPECS/x.spec"]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_rpmbuild_timeout_is_a_build_failure() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let program = dir.path().join("slow-rpmbuild");
        std::fs::write(&program, "#!/bin/sh\nsleep 5\n").unwrap();
        std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755)).unwrap();

        let tool = RpmBuild::new(
            ToolRunner::new(std::time::Duration::from_millis(100)),
            program.to_string_lossy(),
        );
        let env = BuildEnvironment::prepare(&dir.path().join("rpmbuild")).await.unwrap();
        let err = tool
            .build(&env, &env.specs().join("x.spec"), "x86_64")
            .await
            .unwrap_err();

        assert_eq!(err.kind(), crate::error::ErrorKind::BuildToolError);
        assert!(err.to_string().contains("timed out"));
    }
}
