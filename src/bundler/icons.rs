//! Icon checks for the hicolor theme.
//!
//! Each declared icon must use one of the freedesktop fixed sizes and the PNG
//! must actually have those dimensions. Icons are installed as
//! `/usr/share/icons/hicolor/<N>x<N>/apps/<app_id>.png`.

use crate::config::IconInput;
use crate::error::{ReleaseError, Result};
use std::path::{Path, PathBuf};

/// Fixed icon sizes of the hicolor theme
pub const FREEDESKTOP_SIZES: &[u32] = &[16, 24, 32, 48, 64, 96, 128, 256, 512];

/// hicolor theme root
pub const HICOLOR_DIR: &str = "/usr/share/icons/hicolor";

/// Relative `<N>x<N>/apps/<name>.png` path inside a hicolor tree
pub fn hicolor_rel_path(size: u32, name: &str) -> PathBuf {
    PathBuf::from(format!("{size}x{size}/apps/{name}.png"))
}

/// Install path of an icon of `size` named `name`
pub fn install_path(size: u32, name: &str) -> PathBuf {
    Path::new(HICOLOR_DIR).join(hicolor_rel_path(size, name))
}

/// Validate size and real dimensions of `icon`
pub async fn check_icon(icon: &IconInput) -> Result<()> {
    if !FREEDESKTOP_SIZES.contains(&icon.size) {
        return Err(ReleaseError::InvalidIcon {
            path: icon.path.clone(),
            reason: format!(
                "size {} is not a freedesktop icon size (expected one of {:?})",
                icon.size, FREEDESKTOP_SIZES
            ),
        });
    }

    let path = icon.path.clone();
    let (width, height) = tokio::task::spawn_blocking(move || image::image_dimensions(&path))
        .await?
        .map_err(|e| ReleaseError::InvalidIcon {
            path: icon.path.clone(),
            reason: format!("cannot decode image: {e}"),
        })?;

    if width != icon.size || height != icon.size {
        return Err(ReleaseError::InvalidIcon {
            path: icon.path.clone(),
            reason: format!(
                "declared {0}x{0} but image is {width}x{height}",
                icon.size
            ),
        });
    }

    log::debug!("Icon {} is {}x{}", icon.path.display(), width, height);
    Ok(())
}

/// Reject two icons declared at the same size
pub fn check_unique_sizes(icons: &[IconInput]) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for icon in icons {
        if !seen.insert(icon.size) {
            return Err(ReleaseError::InvalidIcon {
                path: icon.path.clone(),
                reason: format!("size {0}x{0} declared more than once", icon.size),
            });
        }
    }
    Ok(())
}
