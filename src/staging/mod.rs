//! The transient local package repository.
//!
//! Only the directory itself lives here; turning it into something a package
//! manager can read (index, trusted source entry) is backend-specific.

pub mod keys;

use crate::error::{AppkgError, Result};
use crate::process::{CommandRunner, Invocation};
use crate::ui;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// `<root>/<arch>` plus the operations every backend shares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingArea {
    root: PathBuf,
    arch: String,
}

impl StagingArea {
    pub fn new(root: impl Into<PathBuf>, arch: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            arch: arch.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn repo_dir(&self) -> PathBuf {
        self.root.join(&self.arch)
    }

    pub fn exists(&self) -> bool {
        self.repo_dir().is_dir()
    }

    /// Move `files` into the repository. Every source must exist; nothing is
    /// copied if one is missing.
    pub fn add_local(&self, files: &[PathBuf]) -> Result<Vec<PathBuf>> {
        if let Some(missing) = files.iter().find(|f| !f.is_file()) {
            return Err(AppkgError::staging(
                format!("local package does not exist: {}", missing.display()),
                "",
            ));
        }

        let repo = self.repo_dir();
        fs::create_dir_all(&repo).map_err(|e| {
            AppkgError::staging(format!("failed to create {}: {}", repo.display(), e), "")
        })?;

        let mut staged = Vec::with_capacity(files.len());
        for file in files {
            let Some(name) = file.file_name() else {
                return Err(AppkgError::staging(
                    format!("not a file name: {}", file.display()),
                    "",
                ));
            };
            let target = repo.join(name);
            if target != *file {
                fs::copy(file, &target).map_err(|e| {
                    AppkgError::staging(
                        format!("failed to copy {} into {}: {}", file.display(), repo.display(), e),
                        "",
                    )
                })?;
                if let Err(e) = fs::remove_file(file) {
                    ui::warning(&format!("Could not remove {}: {}", file.display(), e));
                }
            }
            ui::verbose(&format!("staged {}", target.display()));
            staged.push(target);
        }
        Ok(staged)
    }

    /// Staged files whose name ends with one of `suffixes`, sorted.
    pub fn staged_files(&self, suffixes: &[&str]) -> Result<Vec<PathBuf>> {
        let repo = self.repo_dir();
        let entries = match fs::read_dir(&repo) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(AppkgError::io(&repo, e)),
        };

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| suffixes.iter().any(|s| n.ends_with(s)))
            })
            .collect();
        files.sort();
        Ok(files)
    }

    /// Delete the whole staging tree. Falls back to `sudo rm -rf` when files
    /// were left behind by a privileged tool.
    pub fn remove_dir(&self, runner: &dyn CommandRunner) -> Result<()> {
        match fs::remove_dir_all(&self.root) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                ui::verbose(&format!(
                    "removing {} needs root: {}",
                    self.root.display(),
                    e
                ));
                let inv = Invocation::new("rm")
                    .arg("-rf")
                    .arg(self.root.to_string_lossy())
                    .elevated();
                runner.run(&inv)?.check("rm").map(|_| ()).map_err(|err| {
                    AppkgError::staging(
                        format!("failed to remove {}", self.root.display()),
                        err.raw_output().unwrap_or_default().to_string(),
                    )
                })
            }
            Err(e) => Err(AppkgError::io(&self.root, e)),
        }
    }
}

/// Replace a root-owned config file with `content` by writing it to
/// `work_dir` first and copying it over with `sudo cp`.
pub fn install_system_file(
    runner: &dyn CommandRunner,
    work_dir: &Path,
    target: &Path,
    content: &str,
) -> Result<()> {
    fs::create_dir_all(work_dir).map_err(|e| AppkgError::io(work_dir, e))?;
    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "config".to_string());
    let tmp = work_dir.join(format!(".{}.{}", file_name, std::process::id()));
    fs::write(&tmp, content).map_err(|e| AppkgError::io(&tmp, e))?;

    let result = runner.run(
        &Invocation::new("cp")
            .arg(tmp.to_string_lossy())
            .arg(target.to_string_lossy())
            .elevated(),
    );
    if let Err(e) = fs::remove_file(&tmp) {
        ui::verbose(&format!("could not remove {}: {}", tmp.display(), e));
    }
    result?.check("cp").map(|_| ())
}

/// Runs a teardown closure when dropped; failures become warnings.
pub struct TeardownGuard<F>
where
    F: FnMut() -> Result<()>,
{
    teardown: Option<F>,
}

impl<F> TeardownGuard<F>
where
    F: FnMut() -> Result<()>,
{
    pub fn new(teardown: F) -> Self {
        Self {
            teardown: Some(teardown),
        }
    }

    /// Skip the teardown.
    pub fn disarm(mut self) {
        self.teardown = None;
    }
}

impl<F> Drop for TeardownGuard<F>
where
    F: FnMut() -> Result<()>,
{
    fn drop(&mut self) {
        if let Some(mut teardown) = self.teardown.take()
            && let Err(e) = teardown()
        {
            ui::warning(&format!("Failed to remove the local package repository: {}", e));
        }
    }
}
