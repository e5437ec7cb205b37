//! Rendering of [`PackageSpec`](super::PackageSpec) into the rpm spec-file grammar.

use super::{ChangelogEntry, EntryKind, ManifestEntry, PackageSpec};
use crate::error::Result;
use handlebars::Handlebars;
use serde::Serialize;
use std::path::Path;

const SPEC_TEMPLATE: &str = r#"%global debug_package %{nil}
%global __brp_strip %{nil}
%global _build_id_links none

Name:           {{name}}
Version:        {{version}}
Release:        {{release}}
Summary:        {{summary}}
License:        {{license}}
{{#if url}}
URL:            {{url}}
{{/if}}
Source0:        {{tarball}}
{{#each requires}}
Requires:       {{this}}
{{/each}}
{{#each build_requires}}
BuildRequires:  {{this}}
{{/each}}

%description
{{description}}

%prep
%setup -q

%build

%install
{{#each install}}
{{this}}
{{/each}}

%post
if [ $1 -eq 1 ]; then
    {{icon_cache}} >/dev/null 2>&1 || :
fi

%postun
if [ $1 -eq 0 ]; then
    {{icon_cache}} >/dev/null 2>&1 || :
fi

%files
%license LICENSE
%dir {{private_dir}}
{{#each files}}
{{this}}
{{/each}}

%changelog
{{#each changelog}}
{{header}}
- {{message}}

{{/each}}
"#;

#[derive(Serialize)]
struct SpecContext<'a> {
    name: &'a str,
    version: String,
    release: u32,
    summary: String,
    license: String,
    url: Option<String>,
    tarball: String,
    requires: &'a [String],
    build_requires: &'a [String],
    description: String,
    install: Vec<String>,
    icon_cache: &'a str,
    private_dir: String,
    files: Vec<String>,
    changelog: Vec<ChangelogView>,
}

#[derive(Serialize)]
struct ChangelogView {
    header: String,
    message: String,
}

/// Renders package specs with a registered handlebars template
pub struct SpecRenderer {
    handlebars: Handlebars<'static>,
}

impl SpecRenderer {
    /// Create a renderer with the spec template registered
    pub fn new() -> Result<Self> {
        let mut handlebars = Handlebars::new();
        handlebars.register_escape_fn(handlebars::no_escape);
        handlebars.register_template_string("spec", SPEC_TEMPLATE)?;
        Ok(Self { handlebars })
    }

    /// Render the spec file.
    ///
    /// `manifest` is the complete, ordered install manifest (standard entries
    /// followed by the spec's extra files). `icon_cache` is the shell command
    /// run on first install and final removal.
    pub fn render(&self, spec: &PackageSpec, manifest: &[ManifestEntry], icon_cache: &str) -> Result<String> {
        let context = SpecContext {
            name: &spec.name,
            version: spec.version.to_string(),
            release: spec.release,
            summary: escape_macros(spec.summary.trim()),
            license: escape_macros(&spec.license),
            url: spec.url.as_deref().map(escape_macros),
            tarball: spec.tarball_name(),
            requires: &spec.requires,
            build_requires: &spec.build_requires,
            description: escape_macros(spec.description.trim()),
            install: manifest.iter().flat_map(install_lines).collect(),
            icon_cache: icon_cache.trim(),
            private_dir: files_path(&spec.binary_install_dir),
            files: manifest.iter().map(files_line).collect(),
            changelog: spec
                .changelog
                .iter()
                .rev()
                .map(|entry| ChangelogView {
                    header: render_changelog_header(entry),
                    message: escape_macros(entry.message.trim()).replace('\n', "\n  "),
                })
                .collect(),
        };
        Ok(self.handlebars.render("spec", &context)?)
    }
}

/// `* <Www Mmm DD YYYY> <author> - <version>-<release>`
pub fn render_changelog_header(entry: &ChangelogEntry) -> String {
    format!(
        "* {} {} - {}",
        entry.date.format("%a %b %d %Y"),
        escape_macros(entry.author.trim()),
        entry.version_release
    )
}

/// Double every `%` so rpm does not expand user text as a macro
fn escape_macros(text: &str) -> String {
    text.replace('%', "%%")
}

fn install_lines(entry: &ManifestEntry) -> Vec<String> {
    let src = shell_quote(&entry.source.to_string_lossy());
    let dest = buildroot_path(&entry.dest);
    match entry.kind {
        EntryKind::File => vec![format!("install -D -m {} {} {}", entry.mode, src, dest)],
        EntryKind::Directory => vec![
            format!("mkdir -p {dest}"),
            format!("cp -a {src}/. {dest}/"),
        ],
    }
}

fn files_line(entry: &ManifestEntry) -> String {
    let path = files_path(&entry.dest);
    match entry.kind {
        EntryKind::File => format!("%attr({},root,root) {}", entry.mode, path),
        EntryKind::Directory => path,
    }
}

fn buildroot_path(dest: &Path) -> String {
    format!("\"%{{buildroot}}{}\"", dest.to_string_lossy())
}

fn files_path(path: &Path) -> String {
    let path = path.to_string_lossy();
    if path.chars().any(char::is_whitespace) {
        format!("\"{path}\"")
    } else {
        path.into_owned()
    }
}

/// Single-quote `value` for POSIX sh
pub(crate) fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
