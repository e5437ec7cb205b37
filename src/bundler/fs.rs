//! File system helpers for staging.

use crate::error::{ErrorExt, Result};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;

/// Removes the directory and its contents if it exists, then recreates it empty.
pub async fn reset_dir(path: &Path) -> Result<()> {
    if fs::try_exists(path).await.fs_context("checking directory", path)? {
        fs::remove_dir_all(path).await.fs_context("removing directory", path)?;
    }
    fs::create_dir_all(path).await.fs_context("creating directory", path)
}

/// Copies a regular file, creating parent directories of the destination.
pub async fn copy_file(from: &Path, to: &Path) -> Result<()> {
    if let Some(dest_dir) = to.parent() {
        fs::create_dir_all(dest_dir).await.fs_context("creating directory", dest_dir)?;
    }
    fs::copy(from, to).await.fs_context("copying file", from)?;
    Ok(())
}

/// Recursively copies a directory. Symlinks are followed; permissions are kept.
pub async fn copy_dir(from: &Path, to: &Path) -> Result<()> {
    fs::create_dir_all(to).await.fs_context("creating directory", to)?;

    for entry in walkdir::WalkDir::new(from).follow_links(true).sort_by_file_name() {
        let entry = entry?;
        let rel_path = entry.path().strip_prefix(from).unwrap_or(entry.path());
        let dest_path = to.join(rel_path);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest_path).await.fs_context("creating directory", &dest_path)?;
        } else {
            log::debug!("Staging {}", rel_path.display());
            fs::copy(entry.path(), &dest_path).await.fs_context("copying file", entry.path())?;
        }
    }
    Ok(())
}

/// Set Unix permission bits.
#[cfg(unix)]
pub async fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .await
        .fs_context("setting permissions", path)
}

/// Set Unix permission bits.
#[cfg(not(unix))]
pub async fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

/// Modification time of `path`, or of the newest file below it for directories.
///
/// Returns the time together with the file it came from.
pub async fn newest_mtime(path: &Path) -> Result<(SystemTime, PathBuf)> {
    let root = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<(SystemTime, PathBuf)> {
        let meta = std::fs::metadata(&root).fs_context("reading metadata", &root)?;
        if !meta.is_dir() {
            let modified = meta.modified().fs_context("reading mtime", &root)?;
            return Ok((modified, root));
        }

        let mut newest = (SystemTime::UNIX_EPOCH, root.clone());
        for entry in walkdir::WalkDir::new(&root).follow_links(true) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let modified = entry
                .metadata()?
                .modified()
                .fs_context("reading mtime", entry.path())?;
            if modified > newest.0 {
                newest = (modified, entry.into_path());
            }
        }
        Ok(newest)
    })
    .await?
}
