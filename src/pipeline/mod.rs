//! Release orchestration.
//!
//! [`ReleasePipeline`] runs the stages in order:
//!
//! ```text
//! Init → Versioned → Validated → Bundled → Built → Signed → Published
//! ```
//!
//! Any stage failure moves the run to `Failed { kind, stage }`. Nothing is
//! copied to the output directory unless `Published` is reached, and partial
//! build outputs are left in place for inspection. A JSON [`RunReport`] is
//! written to the configured state file at the end of every run.

mod publish;
mod report;
mod state;

pub use publish::{calculate_sha256, publish};
pub use report::{FailureRecord, REPORT_FORMAT_VERSION, RunReport, StageOutcome, StageRecord};
pub use state::{PipelineState, Stage};

use crate::builder::{PackageBuilder, PackageTool, RpmBuild};
use crate::bundler::{ArtifactBundler, install_manifest};
use crate::config::PipelineConfig;
use crate::error::{ReleaseError, Result};
use crate::metadata::{MetadataTool, MetadataValidator, SystemMetadataTool, ValidatedMetadata};
use crate::signing::{PackageSigner, RpmSign, SigningManager, SigningOutcome};
use crate::spec::{PackageSpec, SpecRenderer};
use crate::tools::ToolRunner;
use crate::version::{ChangelogDraft, VersionManager};
use std::path::{Path, PathBuf};

/// Result of a pipeline run
#[derive(Debug)]
pub struct RunOutcome {
    /// Final state
    pub state: PipelineState,
    /// Report as saved to the state file
    pub report: RunReport,
    /// Error that ended the run, if it failed
    pub error: Option<ReleaseError>,
}

impl RunOutcome {
    /// Whether the run reached `Published`
    pub fn is_published(&self) -> bool {
        self.state == PipelineState::Published
    }

    /// Files copied to the output directory
    pub fn published(&self) -> &[PathBuf] {
        &self.report.published
    }
}

/// Pipeline wired to the real OS tools
pub type SystemPipeline = ReleasePipeline<SystemMetadataTool, RpmBuild, RpmSign>;

/// Orchestrates one release run
pub struct ReleasePipeline<M: MetadataTool, P: PackageTool, S: PackageSigner> {
    config: PipelineConfig,
    metadata_tool: M,
    package_tool: P,
    signer: S,
    state: PipelineState,
    report: RunReport,
}

impl SystemPipeline {
    /// Pipeline using `desktop-file-validate`, `appstreamcli`, `rpmbuild`,
    /// `rpmsign` and `rpmkeys` as configured
    pub fn system(config: PipelineConfig) -> Self {
        let runner = ToolRunner::new(config.tools.timeout());
        let tools = &config.tools;
        let metadata_tool = SystemMetadataTool::new(
            runner.clone(),
            &tools.desktop_file_validate,
            &tools.appstreamcli,
        );
        let package_tool = RpmBuild::new(runner.clone(), &tools.rpmbuild);
        let signer = RpmSign::new(runner, &tools.rpmsign, &tools.rpmkeys);
        Self::new(config, metadata_tool, package_tool, signer)
    }
}

impl<M: MetadataTool, P: PackageTool, S: PackageSigner> ReleasePipeline<M, P, S> {
    /// Assemble a pipeline from explicit capabilities
    pub fn new(config: PipelineConfig, metadata_tool: M, package_tool: P, signer: S) -> Self {
        Self {
            config,
            metadata_tool,
            package_tool,
            signer,
            state: PipelineState::Init,
            report: RunReport::new(),
        }
    }

    /// Current state
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Configuration of this run
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every stage and save the run report.
    pub async fn run(mut self) -> RunOutcome {
        log::info!("Starting release run {}", self.report.run_id);
        let result = self.execute().await;

        let error = match result {
            Ok(()) => None,
            Err(error) => {
                let stage = self.state.next_stage().unwrap_or(Stage::Publish);
                self.report.record_failure(stage, &error);
                let failed = PipelineState::Failed {
                    kind: error.kind(),
                    stage,
                };
                if let Err(e) = self.state.transition(failed) {
                    log::warn!("{e}");
                }
                log::warn!("Stage {stage} failed: {error}");
                Some(error)
            }
        };

        self.report.finish(self.state);
        if let Err(e) = self.report.save(&self.config.state_file) {
            log::warn!("Failed to save run report: {e}");
        }

        RunOutcome {
            state: self.state,
            report: self.report,
            error,
        }
    }

    async fn execute(&mut self) -> Result<()> {
        let spec = self.version()?;
        self.report.package = Some(spec.name.clone());
        self.complete(Stage::Version, Some(spec.version_release()))?;

        let metadata = self.validate(&spec).await?;
        self.complete(Stage::Validate, Some(metadata.id.clone()))?;

        let bundler = ArtifactBundler::new(&self.config.staging_dir, self.config.launcher.env.clone());
        let bundle = bundler.bundle(&spec, &self.config.artifacts).await?;
        self.complete(Stage::Bundle, Some(bundle.tarball.display().to_string()))?;

        let built = {
            let builder = PackageBuilder::new(
                &self.package_tool,
                &self.config.build_root,
                &self.config.icon_cache.command,
            )?;
            builder.build(&spec, &bundle).await?
        };
        self.complete(Stage::Build, Some(format!("{} files", built.manifest.len())))?;

        let packages = [built.binary.as_path(), built.source.as_path()];
        let outcome = SigningManager::new(&self.signer)
            .sign(self.config.signing_key.as_ref(), &packages)
            .await?;
        match outcome {
            SigningOutcome::Skipped => self.skip(Stage::Sign, "no signing key configured")?,
            SigningOutcome::Signed { key, .. } => self.complete(Stage::Sign, Some(format!("key {key}")))?,
        }

        let published = publish(&self.config.output_dir, &packages).await?;
        self.report.published = published;
        self.complete(Stage::Publish, Some(self.config.output_dir.display().to_string()))?;

        log::info!("Released {} {}", spec.name, spec.version_release());
        Ok(())
    }

    fn version(&self) -> Result<PackageSpec> {
        let draft = ChangelogDraft::today(
            self.config.changelog.author.clone(),
            self.config.changelog.message.clone(),
        );
        let update = VersionManager::new(&self.config.spec_file)
            .bump(self.config.target_version.as_ref(), &draft)?;
        Ok(update.spec)
    }

    async fn validate(&self, spec: &PackageSpec) -> Result<ValidatedMetadata> {
        MetadataValidator::new(&self.metadata_tool)
            .validate(
                &self.config.artifacts.desktop_file,
                &self.config.artifacts.metainfo_file,
                &spec.app_id,
            )
            .await
    }

    fn complete(&mut self, stage: Stage, detail: Option<String>) -> Result<()> {
        self.state.transition(stage.completes_to())?;
        self.report.record(stage, StageOutcome::Completed, detail);
        log::info!("Stage {stage} completed");
        Ok(())
    }

    fn skip(&mut self, stage: Stage, reason: &str) -> Result<()> {
        self.state.transition(stage.completes_to())?;
        self.report.record(stage, StageOutcome::Skipped, Some(reason.to_string()));
        log::info!("Stage {stage} skipped: {reason}");
        Ok(())
    }
}

/// Run only the metadata gate against the current package spec
pub async fn validate_only<M: MetadataTool>(config: &PipelineConfig, tool: &M) -> Result<ValidatedMetadata> {
    let spec = PackageSpec::load(&config.spec_file)?;
    MetadataValidator::new(tool)
        .validate(
            &config.artifacts.desktop_file,
            &config.artifacts.metainfo_file,
            &spec.app_id,
        )
        .await
}

/// Render the spec file for the current package spec without modifying it
pub fn render_spec(config: &PipelineConfig) -> Result<String> {
    let spec = PackageSpec::load(&config.spec_file)?;
    let binary_name = file_name_of(&config.artifacts.binary)?;
    let manifest = install_manifest(&spec, &binary_name, &config.artifacts.icons)?;
    SpecRenderer::new()?.render(&spec, &manifest, &config.icon_cache.command)
}

fn file_name_of(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| ReleaseError::InvalidConfig {
            path: path.to_path_buf(),
            reason: "artifacts.binary has no file name".to_string(),
        })
}
