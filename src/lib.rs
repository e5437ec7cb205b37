//! # rpm_release
//!
//! Release pipeline that turns a frozen desktop application into signed
//! RPM packages.
//!
//! A run moves through a fixed sequence of stages:
//!
//! 1. **Version**: bump the version or release number in the package spec
//!    and prepend a changelog entry.
//! 2. **Validate**: check that the desktop entry and AppStream metadata agree
//!    with each other and with the package spec.
//! 3. **Bundle**: stage the binary, assets, metadata, icons and launcher and
//!    pack them into a deterministic source tarball.
//! 4. **Build**: render an rpmbuild spec file and build the binary and
//!    source packages in a fresh build environment.
//! 5. **Sign**: sign and verify both packages, or skip without a key.
//! 6. **Publish**: copy the packages and their SHA-256 sidecars to the
//!    output directory.
//!
//! ## Usage
//!
//! ```bash
//! rpm_release                            # release the current version
//! rpm_release --target-version 1.2.0     # release a new version
//! RPM_SIGNING_KEY=ABCD1234 rpm_release   # sign the packages
//! rpm_release validate                   # metadata gate only
//! rpm_release render-spec                # print the rpmbuild spec file
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod builder;
pub mod bundler;
pub mod cli;
pub mod config;
pub mod error;
pub mod metadata;
pub mod pipeline;
pub mod signing;
pub mod spec;
pub mod tools;
pub mod version;

pub use builder::{BuildEnvironment, BuiltPackages, PackageBuilder, PackageTool, RpmBuild};
pub use bundler::{ArtifactBundler, ArtifactSet, Bundle};
pub use cli::Args;
pub use config::{PipelineConfig, SigningKey};
pub use error::{ErrorKind, ReleaseError, Result};
pub use metadata::{MetadataTool, MetadataValidator, SystemMetadataTool, ValidatedMetadata};
pub use pipeline::{PipelineState, ReleasePipeline, RunOutcome, RunReport, Stage, SystemPipeline};
pub use signing::{PackageSigner, RpmSign, SigningManager, SigningOutcome};
pub use spec::{ManifestEntry, PackageSpec, SpecRenderer};
pub use tools::{ToolOutput, ToolRunner};
pub use version::{ChangelogDraft, VersionManager, VersionUpdate};
