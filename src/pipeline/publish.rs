//! Copy finished packages to the output directory.

use crate::error::{ErrorExt, ReleaseError, Result};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;

/// SHA-256 of a file, hex encoded
pub async fn calculate_sha256(path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(path).await.fs_context("opening file", path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 8192];

    loop {
        let n = file.read(&mut buffer).await.fs_context("reading file", path)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Copy `packages` into `output_dir`, each with a `<file>.sha256` sidecar.
///
/// Files are first copied under temporary names and only renamed into place
/// once every copy succeeded. Existing files of the same name are replaced.
/// On failure the temporary files are removed.
pub async fn publish(output_dir: &Path, packages: &[&Path]) -> Result<Vec<PathBuf>> {
    tokio::fs::create_dir_all(output_dir)
        .await
        .fs_context("creating output directory", output_dir)?;

    let mut pending = Vec::new();
    let result = stage_and_rename(output_dir, packages, &mut pending).await;
    if result.is_err() {
        for temp in &pending {
            if let Err(e) = tokio::fs::remove_file(temp).await
                && e.kind() != std::io::ErrorKind::NotFound
            {
                log::warn!("Failed to remove {}: {e}", temp.display());
            }
        }
    }
    result
}

/// Temporary name of `name` inside the output directory
fn part_name(name: &str) -> String {
    format!(".{name}.part")
}

async fn stage_and_rename(
    output_dir: &Path,
    packages: &[&Path],
    temps: &mut Vec<PathBuf>,
) -> Result<Vec<PathBuf>> {
    let mut renames = Vec::new();
    for package in packages {
        let name = package
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| ReleaseError::MissingArtifact {
                path: package.to_path_buf(),
                role: "built package".to_string(),
            })?;
        let digest = calculate_sha256(package).await?;

        let temp = output_dir.join(part_name(&name));
        temps.push(temp.clone());
        tokio::fs::copy(package, &temp)
            .await
            .fs_context("copying package", package)?;

        let sum_name = format!("{name}.sha256");
        let temp_sum = output_dir.join(part_name(&sum_name));
        temps.push(temp_sum.clone());
        tokio::fs::write(&temp_sum, format!("{digest}  {name}\n"))
            .await
            .fs_context("writing checksum", &temp_sum)?;

        log::debug!("{name}: sha256 {digest}");
        renames.push((temp, output_dir.join(&name), temp_sum, output_dir.join(sum_name)));
    }

    let mut published = Vec::new();
    for (temp, dest, temp_sum, dest_sum) in renames {
        tokio::fs::rename(&temp, &dest).await.fs_context("publishing package", &dest)?;
        tokio::fs::rename(&temp_sum, &dest_sum)
            .await
            .fs_context("publishing checksum", &dest_sum)?;
        log::info!("Published {}", dest.display());
        published.push(dest);
    }
    Ok(published)
}
