//! Render-spec command.

use super::load_config;
use crate::cli::Args;
use crate::error::Result;
use crate::pipeline::render_spec;
use std::io::Write;

/// Print the spec file for the current package spec to stdout
pub(super) async fn execute_render_spec(args: &Args) -> Result<i32> {
    let pipeline_config = load_config(args)?;
    let rendered = render_spec(&pipeline_config)?;

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(rendered.as_bytes())?;
    stdout.flush()?;
    Ok(0)
}
