//! rpmbuild top directory.

use crate::error::{ErrorExt, Result};
use std::path::{Path, PathBuf};

/// Subdirectories of an rpmbuild `_topdir`
pub const BUILD_DIRS: [&str; 5] = ["SOURCES", "BUILD", "RPMS", "SRPMS", "SPECS"];

/// A freshly cleared rpmbuild top directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildEnvironment {
    root: PathBuf,
}

impl BuildEnvironment {
    /// Remove anything under `root` and recreate the five build directories
    pub async fn prepare(root: &Path) -> Result<Self> {
        if tokio::fs::try_exists(root).await.fs_context("checking build root", root)? {
            log::debug!("Clearing build root {}", root.display());
            tokio::fs::remove_dir_all(root)
                .await
                .fs_context("clearing build root", root)?;
        }
        for dir in BUILD_DIRS {
            let path = root.join(dir);
            tokio::fs::create_dir_all(&path)
                .await
                .fs_context("creating build directory", &path)?;
        }
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    #[cfg(test)]
    pub(crate) fn unprepared(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `_topdir`
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `SOURCES`
    pub fn sources(&self) -> PathBuf {
        self.root.join("SOURCES")
    }

    /// `BUILD`
    pub fn build(&self) -> PathBuf {
        self.root.join("BUILD")
    }

    /// `RPMS`
    pub fn rpms(&self) -> PathBuf {
        self.root.join("RPMS")
    }

    /// `SRPMS`
    pub fn srpms(&self) -> PathBuf {
        self.root.join("SRPMS")
    }

    /// `SPECS`
    pub fn specs(&self) -> PathBuf {
        self.root.join("SPECS")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_prepare_clears_previous_run() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("rpmbuild");
        std::fs::create_dir_all(root.join("RPMS/x86_64")).unwrap();
        std::fs::write(root.join("RPMS/x86_64/old-1.0-1.x86_64.rpm"), "stale").unwrap();
        std::fs::create_dir_all(root.join("BUILDROOT")).unwrap();

        let env = BuildEnvironment::prepare(&root).await.unwrap();
        for dir in BUILD_DIRS {
            let path = env.root().join(dir);
            assert!(path.is_dir(), "{dir} missing");
            assert_eq!(std::fs::read_dir(&path).unwrap().count(), 0);
        }
        assert!(!root.join("BUILDROOT").exists());
    }
}
