//! Deterministic source tarball.

use crate::error::{ErrorExt, ReleaseError, Result};
use flate2::{Compression, write::GzEncoder};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tar::HeaderMode;
use walkdir::WalkDir;

/// Archive `tree` into `dest` as a gzipped tar.
///
/// Entries are named relative to the parent of `tree`, so the archive has
/// exactly one top-level directory. Entries are sorted by path and headers use
/// [`HeaderMode::Deterministic`] (fixed mtime, uid/gid 0, 0644/0755 modes);
/// the gzip header carries no timestamp.
pub async fn tar_and_gzip_dir(tree: &Path, dest: &Path) -> Result<PathBuf> {
    let tree = tree.to_path_buf();
    let dest = dest.to_path_buf();
    let base = tree
        .parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| ReleaseError::MissingArtifact {
            path: tree.clone(),
            role: "staged tree".to_string(),
        })?;

    let tar_gz = tokio::fs::File::create(&dest)
        .await
        .fs_context("creating tar.gz file", &dest)?;
    let std_file = tar_gz.into_std().await;

    tokio::task::spawn_blocking(move || -> Result<PathBuf> {
        let enc = GzEncoder::new(std_file, Compression::default());
        let mut tar = tar::Builder::new(enc);

        for entry in WalkDir::new(&tree).follow_links(true).sort_by_file_name() {
            let entry = entry?;
            let path = entry.path();
            let rel_path = path.strip_prefix(&base).unwrap_or(path);
            let metadata = std::fs::metadata(path).fs_context("reading metadata", path)?;

            let mut header = tar::Header::new_gnu();
            header.set_metadata_in_mode(&metadata, HeaderMode::Deterministic);

            if metadata.is_dir() {
                tar.append_data(&mut header, rel_path, &mut io::empty())
                    .fs_context("archiving directory", path)?;
            } else {
                let mut file = std::fs::File::open(path).fs_context("opening file", path)?;
                tar.append_data(&mut header, rel_path, &mut file)
                    .fs_context("archiving file", path)?;
            }
        }

        let enc = tar.into_inner().fs_context("finishing tar archive", &dest)?;
        let mut finished = enc.finish().fs_context("finishing gzip stream", &dest)?;
        finished.flush().fs_context("flushing tar.gz file", &dest)?;
        Ok(dest)
    })
    .await?
}

/// `(path, mode)` pairs of every entry in a `.tar.gz`, in archive order
pub fn list_tarball(path: &Path) -> Result<Vec<(String, u32)>> {
    let file = std::fs::File::open(path).fs_context("opening tarball", path)?;
    let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(file));
    let mut listing = Vec::new();
    for entry in archive.entries().fs_context("reading tarball", path)? {
        let entry = entry.fs_context("reading tarball entry", path)?;
        let name = entry
            .path()
            .fs_context("reading tarball entry path", path)?
            .to_string_lossy()
            .trim_end_matches('/')
            .to_string();
        let mode = entry.header().mode().fs_context("reading tarball entry mode", path)?;
        listing.push((name, mode));
    }
    Ok(listing)
}
