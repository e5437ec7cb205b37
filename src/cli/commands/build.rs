//! Build command: the full release pipeline.

use super::{load_config, report_failure};
use crate::cli::{Args, RuntimeConfig};
use crate::error::Result;
use crate::pipeline::{PipelineState, Stage, SystemPipeline};

/// Execute the release pipeline
pub(super) async fn execute_build(args: &Args, config: &RuntimeConfig) -> Result<i32> {
    let pipeline_config = load_config(args)?;
    if pipeline_config.signing_key.is_none() {
        config.warning_println("No signing key configured; packages will be published unsigned");
    }

    let outcome = SystemPipeline::system(pipeline_config).run().await;

    if config.is_verbose() {
        for record in &outcome.report.stages {
            let _ = config
                .output()
                .stage(record.stage, record.outcome, record.detail.as_deref());
        }
    }

    match (&outcome.error, outcome.state) {
        (None, _) => {
            let package = outcome.report.package.as_deref().unwrap_or("package");
            config.section(&format!("Released {package}"));
            for path in outcome.published() {
                config.indent(&path.display().to_string());
            }
            config.success_println(&format!("Run {} published", outcome.report.run_id));
            Ok(0)
        }
        (Some(error), PipelineState::Failed { stage, .. }) => {
            report_failure(config, stage, error);
            Ok(1)
        }
        (Some(error), _) => {
            report_failure(config, Stage::Publish, error);
            Ok(1)
        }
    }
}
