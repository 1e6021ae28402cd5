//! Status of package-apps, the catalog entries that are nothing but a list of
//! system packages.
//!
//! A package-app lives in `<data>/apps/<app>/packages`; its status file is
//! `<data>/data/status/<app>`.

use crate::error::{AppkgError, Result};
use crate::packages::PackageBackend;
use crate::ui;
use crate::utils::paths;
use rayon::prelude::*;
use serde::Serialize;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const PACKAGES_FILE: &str = "packages";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AppStatus {
    Installed,
    Uninstalled,
    /// None of the packages exist for this system.
    Hidden,
}

impl AppStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppStatus::Installed => "installed",
            AppStatus::Uninstalled => "uninstalled",
            AppStatus::Hidden => "hidden",
        }
    }
}

impl fmt::Display for AppStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a sweep, app names sorted within each group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub installed: Vec<String>,
    pub uninstalled: Vec<String>,
    /// Left for the catalog to hide; no status file is written for these.
    pub hidden: Vec<String>,
}

fn status_path(data_dir: &Path, app: &str) -> PathBuf {
    paths::status_dir(data_dir).join(app)
}

/// Names of every app directory that carries a `packages` file.
pub fn package_apps(data_dir: &Path) -> Result<Vec<String>> {
    let dir = paths::apps_dir(data_dir);
    let entries = match fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(AppkgError::io(&dir, e)),
    };

    let mut apps = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| AppkgError::io(&dir, e))?;
        if entry.path().join(PACKAGES_FILE).is_file() {
            apps.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    apps.sort();
    Ok(apps)
}

/// Every package named in an app's packages file. `a | b` alternatives are
/// flattened.
pub fn listed_packages(data_dir: &Path, app: &str) -> Result<Vec<String>> {
    let path = paths::apps_dir(data_dir).join(app).join(PACKAGES_FILE);
    let content = fs::read_to_string(&path).map_err(|e| AppkgError::io(&path, e))?;
    Ok(content
        .split(|c: char| c == '|' || c.is_whitespace())
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect())
}

/// Installed if anything is installed, uninstalled if anything could be.
pub fn classify(backend: &dyn PackageBackend, packages: &[String]) -> Result<AppStatus> {
    for package in packages {
        if backend.is_installed(package)? {
            return Ok(AppStatus::Installed);
        }
    }
    for package in packages {
        if backend.is_available(package)? {
            return Ok(AppStatus::Uninstalled);
        }
    }
    Ok(AppStatus::Hidden)
}

pub fn read_status(data_dir: &Path, app: &str) -> Result<Option<String>> {
    let path = status_path(data_dir, app);
    match fs::read_to_string(&path) {
        Ok(content) => Ok(Some(content.trim().to_string())),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(AppkgError::io(&path, e)),
    }
}

fn write_status(data_dir: &Path, app: &str, status: AppStatus) -> Result<()> {
    if read_status(data_dir, app)?.as_deref() == Some(status.as_str()) {
        return Ok(());
    }
    let path = status_path(data_dir, app);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| AppkgError::io(parent, e))?;
    }
    ui::verbose(&format!("Marking {} as {}", app, status));
    fs::write(&path, status.as_str()).map_err(|e| AppkgError::io(&path, e))
}

fn refresh_one(backend: &dyn PackageBackend, data_dir: &Path, app: &str) -> Result<AppStatus> {
    let packages = listed_packages(data_dir, app)?;
    let status = classify(backend, &packages)?;
    if status != AppStatus::Hidden {
        write_status(data_dir, app, status)?;
    }
    Ok(status)
}

/// Re-derive the status of every package-app from the package manager.
///
/// Apps are checked in parallel. An app whose check fails keeps its old
/// status and is left out of the report.
pub fn refresh_all_package_app_status(
    backend: &dyn PackageBackend,
    data_dir: &Path,
) -> Result<SweepReport> {
    let apps = package_apps(data_dir)?;
    let results: Vec<(String, Result<AppStatus>)> = apps
        .into_par_iter()
        .map(|app| {
            let status = refresh_one(backend, data_dir, &app);
            (app, status)
        })
        .collect();

    let mut report = SweepReport::default();
    for (app, status) in results {
        match status {
            Ok(AppStatus::Installed) => report.installed.push(app),
            Ok(AppStatus::Uninstalled) => report.uninstalled.push(app),
            Ok(AppStatus::Hidden) => report.hidden.push(app),
            Err(e) => ui::verbose(&format!("Could not refresh status of {}: {}", app, e)),
        }
    }
    Ok(report)
}
