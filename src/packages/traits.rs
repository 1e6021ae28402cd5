use super::registry::BackendKind;
use crate::error::Result;
use serde::Serialize;
use std::path::PathBuf;

/// What an install actually did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstallOutcome {
    /// Resolved package names, sorted and de-duplicated (what was tracked).
    pub packages: Vec<String>,
    pub used_local_repo: bool,
    /// `false` when nothing had to be installed (placeholder already current).
    pub changed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PurgeOutcome {
    /// Packages that were handed to the package manager for removal.
    pub removed: Vec<String>,
}

/// One package-manager family.
///
/// Mutating operations wait for the database lock themselves. Queries are
/// read-only, never wait, and report "not found" as `false`/`None`.
pub trait PackageBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Architecture string the local repository directory is named after.
    fn native_arch(&self) -> Result<String>;

    /// Name of the placeholder package that represents `app`.
    fn package_name_for_app(&self, app: &str) -> String {
        crate::aggregator::placeholder_name(app)
    }

    /// Move local package files into the staging repository.
    fn add_local(&self, files: &[PathBuf]) -> Result<Vec<PathBuf>>;

    /// Regenerate the staging repository index and make it trusted.
    fn refresh_local_index(&self) -> Result<()>;

    /// Delete the staging repository and every reference to it.
    fn remove_local(&self) -> Result<()>;

    fn wait_for_lock(&self) -> Result<()>;

    fn update_indices(&self) -> Result<()>;

    fn install(&self, app: &str, args: &[String]) -> Result<InstallOutcome>;

    fn purge(&self, app: &str, is_update: bool) -> Result<PurgeOutcome>;

    fn is_installed(&self, package: &str) -> Result<bool>;

    fn is_available(&self, package: &str) -> Result<bool>;

    /// `None` when the package is not installed.
    fn dependencies(&self, package: &str) -> Result<Option<Vec<String>>>;

    fn installed_version(&self, package: &str) -> Result<Option<String>>;

    fn latest_version(&self, package: &str) -> Result<Option<String>>;

    fn info(&self, package: &str) -> Result<Option<String>>;
}
