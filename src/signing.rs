//! Package signing.
//!
//! Signing is optional: without a key the stage is skipped. With a key every
//! package is signed and the signature is verified immediately afterwards;
//! a signature that does not verify is fatal.

use crate::config::SigningKey;
use crate::error::{ReleaseError, Result};
use crate::tools::ToolRunner;
use std::ffi::{OsStr, OsString};
use std::future::Future;
use std::path::{Path, PathBuf};

/// Signing capability
pub trait PackageSigner {
    /// Add a signature made with `key` to `package`
    fn sign(&self, package: &Path, key: &SigningKey) -> impl Future<Output = Result<()>>;

    /// Check the signature of `package`
    fn verify(&self, package: &Path) -> impl Future<Output = Result<()>>;
}

impl<T: PackageSigner> PackageSigner for &T {
    fn sign(&self, package: &Path, key: &SigningKey) -> impl Future<Output = Result<()>> {
        (**self).sign(package, key)
    }

    fn verify(&self, package: &Path) -> impl Future<Output = Result<()>> {
        (**self).verify(package)
    }
}

/// [`PackageSigner`] backed by `rpmsign` and `rpmkeys`
#[derive(Debug, Clone)]
pub struct RpmSign {
    runner: ToolRunner,
    rpmsign: String,
    rpmkeys: String,
}

impl RpmSign {
    /// Use the given program names
    pub fn new(runner: ToolRunner, rpmsign: impl Into<String>, rpmkeys: impl Into<String>) -> Self {
        Self {
            runner,
            rpmsign: rpmsign.into(),
            rpmkeys: rpmkeys.into(),
        }
    }

    /// Arguments passed to rpmsign
    pub fn sign_args(package: &Path, key: &SigningKey) -> Vec<OsString> {
        vec![
            "--addsign".into(),
            "--define".into(),
            format!("_gpg_name {}", key.id()).into(),
            package.into(),
        ]
    }
}

/// Whether `rpmkeys --checksig` output reports valid signatures
pub fn signatures_ok(output: &str) -> bool {
    let output = output.to_lowercase();
    output.contains("signatures ok") && !output.contains("not ok")
}

impl PackageSigner for RpmSign {
    async fn sign(&self, package: &Path, key: &SigningKey) -> Result<()> {
        let output = self
            .runner
            .run(&self.rpmsign, Self::sign_args(package, key), None)
            .await
            .map_err(|e| {
                e.attribute_interrupted(|reason| ReleaseError::SigningFailed {
                    package: package.to_path_buf(),
                    reason,
                })
            })?;
        if !output.success() {
            return Err(ReleaseError::SigningFailed {
                package: package.to_path_buf(),
                reason: output.combined(),
            });
        }
        Ok(())
    }

    async fn verify(&self, package: &Path) -> Result<()> {
        let output = self
            .runner
            .run(&self.rpmkeys, [OsStr::new("--checksig"), package.as_os_str()], None)
            .await
            .map_err(|e| {
                e.attribute_interrupted(|output| ReleaseError::SignatureVerificationFailed {
                    package: package.to_path_buf(),
                    output,
                })
            })?;
        if !output.success() || !signatures_ok(&output.stdout) {
            return Err(ReleaseError::SignatureVerificationFailed {
                package: package.to_path_buf(),
                output: output.last_line(),
            });
        }
        Ok(())
    }
}

/// Result of the signing stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SigningOutcome {
    /// No key configured
    Skipped,
    /// Every package was signed and verified
    Signed {
        /// Key used
        key: String,
        /// Signed packages
        packages: Vec<PathBuf>,
    },
}

/// Signs and verifies built packages
pub struct SigningManager<'a, S: PackageSigner> {
    signer: &'a S,
}

impl<'a, S: PackageSigner> SigningManager<'a, S> {
    /// Sign through `signer`
    pub fn new(signer: &'a S) -> Self {
        Self { signer }
    }

    /// Sign `packages` with `key`, or skip when no key is configured
    pub async fn sign(&self, key: Option<&SigningKey>, packages: &[&Path]) -> Result<SigningOutcome> {
        let Some(key) = key else {
            log::info!("No signing key configured, skipping package signing");
            return Ok(SigningOutcome::Skipped);
        };

        for package in packages {
            log::info!("Signing {} with key {}", package.display(), key);
            self.signer.sign(package, key).await?;
            self.signer.verify(package).await?;
            log::debug!("Signature of {} verified", package.display());
        }

        Ok(SigningOutcome::Signed {
            key: key.id().to_string(),
            packages: packages.iter().map(|p| p.to_path_buf()).collect(),
        })
    }
}
