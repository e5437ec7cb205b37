//! Format-preserving editing of the package spec file.

use crate::error::{ErrorExt, ReleaseError, Result};
use crate::spec::ChangelogEntry;
use std::io::Write;
use std::path::{Path, PathBuf};
use toml_edit::{ArrayOfTables, DocumentMut, Item, Table, value};

/// Editor for `package.toml` that keeps comments and layout intact
#[derive(Debug)]
pub struct SpecEditor {
    path: PathBuf,
    doc: DocumentMut,
}

impl SpecEditor {
    /// Open the spec file for editing
    pub fn open(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).fs_context("reading package spec", path)?;
        let doc = content
            .parse::<DocumentMut>()
            .map_err(|e| ReleaseError::InvalidSpec {
                path: path.to_path_buf(),
                reason: format!("Failed to parse TOML: {e}"),
            })?;
        Ok(Self {
            path: path.to_path_buf(),
            doc,
        })
    }

    /// Set `version` and `release`
    pub fn set_version_release(&mut self, version: &semver::Version, release: u32) {
        self.doc["version"] = value(version.to_string());
        self.doc["release"] = value(i64::from(release));
    }

    /// Append a `[[changelog]]` table
    pub fn append_changelog(&mut self, entry: &ChangelogEntry) -> Result<()> {
        let needs_table_array = match self.doc.get("changelog") {
            None => true,
            Some(item) => item.as_array().is_some_and(|a| a.is_empty()),
        };
        if needs_table_array {
            self.doc["changelog"] = Item::ArrayOfTables(ArrayOfTables::new());
        }

        let entries = self.doc["changelog"]
            .as_array_of_tables_mut()
            .ok_or_else(|| ReleaseError::InvalidSpec {
                path: self.path.clone(),
                reason: "`changelog` must be an array of tables".to_string(),
            })?;

        let mut table = Table::new();
        table["date"] = value(entry.date.format("%Y-%m-%d").to_string());
        table["author"] = value(entry.author.as_str());
        table["version_release"] = value(entry.version_release.as_str());
        table["message"] = value(entry.message.as_str());
        entries.push(table);
        Ok(())
    }

    /// Rendered document text
    pub fn contents(&self) -> String {
        self.doc.to_string()
    }

    /// Write the document back atomically: temp file, fsync, rename.
    ///
    /// Returns the written text so callers can parse it without re-reading.
    pub fn save(&self) -> Result<String> {
        let contents = self.contents();
        let temp_path = self.path.with_extension("toml.tmp");

        {
            let mut file =
                std::fs::File::create(&temp_path).fs_context("creating temp spec file", &temp_path)?;
            file.write_all(contents.as_bytes())
                .fs_context("writing temp spec file", &temp_path)?;
            file.sync_all().fs_context("syncing temp spec file", &temp_path)?;
        }

        std::fs::rename(&temp_path, &self.path).fs_context("replacing package spec", &self.path)?;
        Ok(contents)
    }
}
