use super::registry::BackendKind;
use super::traits::{InstallOutcome, PackageBackend, PurgeOutcome};
use crate::error::Result;
use crate::utils::platform;
use std::path::PathBuf;

/// Stand-in for hosts without a supported package manager. Nothing is ever
/// run; every mutation succeeds and every query comes back empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullBackend;

impl PackageBackend for NullBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Null
    }

    fn native_arch(&self) -> Result<String> {
        Ok(platform::machine_arch().to_string())
    }

    fn add_local(&self, _files: &[PathBuf]) -> Result<Vec<PathBuf>> {
        Ok(Vec::new())
    }

    fn refresh_local_index(&self) -> Result<()> {
        Ok(())
    }

    fn remove_local(&self) -> Result<()> {
        Ok(())
    }

    fn wait_for_lock(&self) -> Result<()> {
        Ok(())
    }

    fn update_indices(&self) -> Result<()> {
        Ok(())
    }

    fn install(&self, _app: &str, _args: &[String]) -> Result<InstallOutcome> {
        Ok(InstallOutcome::default())
    }

    fn purge(&self, _app: &str, _is_update: bool) -> Result<PurgeOutcome> {
        Ok(PurgeOutcome::default())
    }

    fn is_installed(&self, _package: &str) -> Result<bool> {
        Ok(false)
    }

    fn is_available(&self, _package: &str) -> Result<bool> {
        Ok(false)
    }

    fn dependencies(&self, _package: &str) -> Result<Option<Vec<String>>> {
        Ok(None)
    }

    fn installed_version(&self, _package: &str) -> Result<Option<String>> {
        Ok(None)
    }

    fn latest_version(&self, _package: &str) -> Result<Option<String>> {
        Ok(None)
    }

    fn info(&self, _package: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn everything_succeeds_and_queries_are_empty() {
        let backend = NullBackend;
        assert_eq!(backend.kind(), BackendKind::Null);
        assert!(backend.install("app", &["curl".into()]).unwrap().packages.is_empty());
        assert!(backend.purge("app", false).unwrap().removed.is_empty());
        assert!(!backend.is_installed("curl").unwrap());
        assert!(!backend.is_available("curl").unwrap());
        assert_eq!(backend.latest_version("curl").unwrap(), None);
        assert!(backend.package_name_for_app("Some App").starts_with("appkg-"));
    }
}
