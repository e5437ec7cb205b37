//! Public launcher script.
//!
//! The frozen executable lives in a private directory. The launcher placed on
//! `PATH` exports the configured environment and hands over to it.

use crate::config::EnvVar;
use crate::error::Result;
use crate::spec::shell_quote;
use handlebars::Handlebars;
use serde::Serialize;
use std::path::Path;

const LAUNCHER_TEMPLATE: &str = r#"#!/bin/sh
# {{name}} launcher
{{#each env}}
export {{this.name}}={{this.value}}
{{/each}}
exec {{binary}} "$@"
"#;

#[derive(Serialize)]
struct LauncherContext {
    name: String,
    env: Vec<EnvVar>,
    binary: String,
}

/// Render the launcher for `binary`, exporting `env` first
pub fn render_launcher(name: &str, binary: &Path, env: &[EnvVar]) -> Result<String> {
    let mut handlebars = Handlebars::new();
    handlebars.register_escape_fn(handlebars::no_escape);
    handlebars.register_template_string("launcher", LAUNCHER_TEMPLATE)?;

    let context = LauncherContext {
        name: name.to_string(),
        env: env
            .iter()
            .map(|var| EnvVar {
                name: var.name.clone(),
                value: shell_quote(&var.value),
            })
            .collect(),
        binary: shell_quote(&binary.to_string_lossy()),
    };
    Ok(handlebars.render("launcher", &context)?)
}
