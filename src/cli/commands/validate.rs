//! Validate command: the metadata gate on its own.

use super::{load_config, report_failure};
use crate::cli::{Args, RuntimeConfig};
use crate::error::Result;
use crate::metadata::SystemMetadataTool;
use crate::pipeline::{Stage, validate_only};
use crate::tools::ToolRunner;

/// Check the desktop entry and AppStream metadata against the package spec
pub(super) async fn execute_validate(args: &Args, config: &RuntimeConfig) -> Result<i32> {
    let pipeline_config = load_config(args)?;
    let tools = &pipeline_config.tools;
    let tool = SystemMetadataTool::new(
        ToolRunner::new(tools.timeout()),
        &tools.desktop_file_validate,
        &tools.appstreamcli,
    );

    match validate_only(&pipeline_config, &tool).await {
        Ok(metadata) => {
            config.verbose_println(&format!("Desktop entry: {}", metadata.desktop_path.display()));
            config.verbose_println(&format!("AppStream metadata: {}", metadata.metainfo_path.display()));
            config.success_println(&format!("Metadata for {} is valid", metadata.id));
            Ok(0)
        }
        Err(error) => {
            report_failure(config, Stage::Validate, &error);
            Ok(1)
        }
    }
}
