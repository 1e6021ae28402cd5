//! Arch family (pacman).

use super::context::BackendContext;
use super::flow;
use super::registry::BackendKind;
use super::resolve::{SpecResolver, wildcard_regex};
use super::spec::PackageSpec;
use super::traits::{InstallOutcome, PackageBackend, PurgeOutcome};
use crate::constants::{
    EN_LOCALE, PACMAN_CANARY_DBPATH, PACMAN_INIT_PROVIDERS, PACMAN_LOCK_FILES,
    PACMAN_LOCK_MARKERS,
};
use crate::error::{AppkgError, Result};
use crate::lock::{Canary, LockArbiter, LockProfile};
use crate::process::{Invocation, PatternTable};
use crate::project_identity;
use crate::staging::{StagingArea, TeardownGuard};
use crate::ui;
use crate::utils::sanitize::{validate_app_name, validate_package_name};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

const PACKAGE_SUFFIXES: &[&str] = &[".pkg.tar.zst", ".pkg.tar.xz", ".pkg.tar.gz"];

/// `<name>-<pkgver>-<pkgrel>-<arch>` to `<name>`.
fn name_from_file_stem(stem: &str) -> String {
    let parts: Vec<&str> = stem.split('-').collect();
    if parts.len() >= 4 {
        parts[..parts.len() - 3].join("-")
    } else {
        stem.to_string()
    }
}

/// Value of a `Key : value` line in `pacman -Si`/`-Qi` output.
fn info_field<'a>(info: &'a str, key: &str) -> Option<&'a str> {
    info.lines().find_map(|line| {
        let (k, v) = line.split_once(':')?;
        (k.trim() == key).then(|| v.trim())
    })
}

pub struct PacmanBackend {
    ctx: BackendContext,
    patterns: Arc<PatternTable>,
    arch: OnceLock<String>,
}

impl PacmanBackend {
    pub fn new(ctx: BackendContext) -> Self {
        Self {
            ctx,
            patterns: Arc::new(PatternTable::pacman()),
            arch: OnceLock::new(),
        }
    }

    fn pacman(&self) -> Invocation {
        Invocation::new("pacman").envs(EN_LOCALE)
    }

    fn staging(&self) -> Result<StagingArea> {
        Ok(StagingArea::new(&self.ctx.layout.staging_root, self.native_arch()?))
    }

    fn database(&self) -> Result<PathBuf> {
        Ok(self
            .staging()?
            .repo_dir()
            .join(format!("{}.db.tar.gz", project_identity::LOCAL_REPO_NAME)))
    }

    /// System pacman.conf plus the local repository, used via `--config`.
    fn override_conf(&self) -> PathBuf {
        self.ctx
            .layout
            .work_dir
            .join(format!("{}-pacman.conf", project_identity::LOCAL_REPO_NAME))
    }

    fn with_override(&self, invocation: Invocation) -> Invocation {
        let conf = self.override_conf();
        if conf.is_file() {
            invocation.arg("--config").arg(conf.to_string_lossy())
        } else {
            invocation
        }
    }

    fn write_override_conf(&self, repo: &Path) -> Result<()> {
        let system = match fs::read_to_string(&self.ctx.layout.pacman_conf) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
            Err(e) => return Err(AppkgError::io(&self.ctx.layout.pacman_conf, e)),
        };
        let conf = format!(
            "{}\n[{}]\nSigLevel = Optional TrustAll\nServer = file://{}\n",
            system.trim_end(),
            project_identity::LOCAL_REPO_NAME,
            repo.display()
        );
        let path = self.override_conf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| AppkgError::io(parent, e))?;
        }
        fs::write(&path, conf).map_err(|e| AppkgError::io(&path, e))
    }

    fn lock_profile(&self) -> LockProfile {
        LockProfile {
            label: "pacman",
            lock_files: PACMAN_LOCK_FILES
                .iter()
                .map(|p| self.ctx.layout.lock_path(p))
                .collect(),
            canary: Some(Canary {
                invocation: self
                    .pacman()
                    .args(["-Sy", "--noconfirm", "--dbpath", PACMAN_CANARY_DBPATH])
                    .elevated(),
                markers: PACMAN_LOCK_MARKERS,
            }),
        }
    }

    fn install_arg(spec: &PackageSpec) -> String {
        match &spec.min_version {
            Some(version) => format!("{}>={}", spec.name, version),
            None => spec.name.clone(),
        }
    }

    fn in_repositories(&self, package: &str) -> Result<bool> {
        let result = flow::query(
            self.ctx.runner(),
            &self.pacman().args(["-Ss", &format!("^{}$", package)]),
        )?;
        let needle = format!("{} ", package);
        Ok(result.exited_ok()
            && result
                .output_lines()
                .filter_map(|l| l.split_once('/'))
                .any(|(_, rest)| rest.starts_with(&needle)))
    }
}

impl SpecResolver for PacmanBackend {
    fn package_extension(&self) -> &'static str {
        ".pkg.tar.zst"
    }

    fn describe_local(&self, file: &Path) -> Result<PackageSpec> {
        let base = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stem = PACKAGE_SUFFIXES
            .iter()
            .find_map(|s| base.strip_suffix(s))
            .unwrap_or(&base);
        Ok(PackageSpec::bare(name_from_file_stem(stem)))
    }

    fn expand_wildcard(&self, pattern: &str) -> Result<Vec<PackageSpec>> {
        ui::info(&format!("Expanding regex in '{}'...", pattern));
        let matcher = wildcard_regex(pattern)?;
        let result = flow::query(
            self.ctx.runner(),
            &self.pacman().args(["-Ss", matcher.as_str()]),
        )?;
        let mut names: Vec<String> = Vec::new();
        // result lines look like `extra/name 1.0-1 [installed]`, descriptions are indented
        for line in result.output_lines().filter(|l| !l.starts_with(char::is_whitespace)) {
            if let Some((_, rest)) = line.split_once('/')
                && let Some(name) = rest.split_whitespace().next()
                && matcher.is_match(name)
                && !names.iter().any(|n| n == name)
            {
                names.push(name.to_string());
            }
        }
        Ok(names.into_iter().map(PackageSpec::bare).collect())
    }
}

impl PackageBackend for PacmanBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Pacman
    }

    fn native_arch(&self) -> Result<String> {
        flow::cached_arch(&self.arch, || {
            let result = flow::query(self.ctx.runner(), &Invocation::new("uname").arg("-m"))?;
            let arch = result.output.trim().to_string();
            if !result.exited_ok() || arch.is_empty() {
                return Err(AppkgError::QueryFailed {
                    query: "uname -m".to_string(),
                    reason: result.output,
                });
            }
            Ok(arch)
        })
    }

    fn add_local(&self, files: &[PathBuf]) -> Result<Vec<PathBuf>> {
        self.staging()?.add_local(files)
    }

    fn refresh_local_index(&self) -> Result<()> {
        let staging = self.staging()?;
        let repo = staging.repo_dir();
        if !repo.is_dir() {
            return Err(AppkgError::staging(
                format!("cannot index the repository - it's missing! {}", repo.display()),
                "",
            ));
        }
        let packages = staging.staged_files(PACKAGE_SUFFIXES)?;
        if packages.is_empty() {
            return Ok(());
        }

        let database = self.database()?;
        let result = self.ctx.runner().run(
            &Invocation::new("repo-add")
                .arg(database.to_string_lossy())
                .args(
                    packages
                        .iter()
                        .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned())),
                )
                .envs(EN_LOCALE)
                .current_dir(&repo),
        )?;
        if !result.exited_ok() {
            return Err(AppkgError::staging(
                format!("repo-add failed to index the repository: {}", repo.display()),
                result.output,
            ));
        }
        if !database.is_file() {
            return Err(AppkgError::staging(
                format!("repo-add failed to create database file: {}", database.display()),
                result.output,
            ));
        }

        self.write_override_conf(&repo)
    }

    fn remove_local(&self) -> Result<()> {
        self.staging()?.remove_dir(self.ctx.runner())?;
        let conf = self.override_conf();
        match fs::remove_file(&conf) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => {
                ui::warning(&format!("Could not remove {}: {}", conf.display(), e));
                Ok(())
            }
        }
    }

    fn wait_for_lock(&self) -> Result<()> {
        LockArbiter::new(self.lock_profile(), self.ctx.lock_timing).wait_for_lock(self.ctx.runner())
    }

    fn update_indices(&self) -> Result<()> {
        self.wait_for_lock()?;
        let update = self
            .with_override(self.pacman().args(["-Sy", "--noconfirm"]))
            .elevated()
            .mirrored()
            .classify_with(Arc::clone(&self.patterns));
        let result = self.ctx.runner().run(&update)?;
        if result.exited_ok() {
            Ok(())
        } else {
            Err(result.into_error("pacman"))
        }
    }

    fn install(&self, app: &str, args: &[String]) -> Result<InstallOutcome> {
        validate_app_name(app)?;
        ui::info(&format!("Will install these packages: {}", args.join(" ")));
        flow::clear_stale_staging(self);
        let _teardown = TeardownGuard::new(|| self.remove_local());

        let resolution = flow::prepare(
            self,
            self,
            args,
            &self.ctx.layout.work_dir,
            self.ctx.download_retry,
        )?;
        let staged = resolution.uses_local_repo();
        let install_args: Vec<String> = resolution.specs.iter().map(Self::install_arg).collect();
        ui::info(&format!("Installing packages: {}", install_args.join(" ")));

        let database = self.database()?;
        flow::attempt_install(
            self,
            self.ctx.runner(),
            self.ctx.install_retry,
            flow::InstallAttempt {
                tool: "pacman",
                refresh_indices: staged,
                exit_code_only: true,
                invocation: || {
                    self.with_override(self.pacman().args(["-S", "--noconfirm", "--needed"]))
                        .args(install_args.iter().cloned())
                        .elevated()
                        .mirrored()
                        .classify_with(Arc::clone(&self.patterns))
                },
                raced: || staged && !database.exists(),
            },
        )?;

        ui::success("Package installation complete.");
        flow::track(&self.ctx.tracking, app, &resolution.specs, staged, true)
    }

    fn purge(&self, app: &str, is_update: bool) -> Result<PurgeOutcome> {
        ui::info(&format!(
            "Allowing packages required by the {} app to be uninstalled",
            app
        ));
        flow::purge_tracked(self, &self.ctx.tracking, app, |packages| {
            let mut remove = self.pacman().args(["-R", "--noconfirm"]);
            if !is_update {
                remove = remove.arg("--nosave");
            }
            let remove = remove
                .args(packages.iter().cloned())
                .elevated()
                .mirrored()
                .classify_with(Arc::clone(&self.patterns));
            let result = self.ctx.runner().run(&remove)?;
            if result.exited_ok() {
                Ok(())
            } else {
                Err(result.into_error("pacman"))
            }
        })
    }

    fn is_installed(&self, package: &str) -> Result<bool> {
        validate_package_name(package)?;
        let result = flow::query(self.ctx.runner(), &self.pacman().args(["-Q", package]))?;
        Ok(result.exited_ok())
    }

    fn is_available(&self, package: &str) -> Result<bool> {
        validate_package_name(package)?;
        // "init" is virtual; Arch derivatives ship different init systems
        if package == "init" {
            for provider in PACMAN_INIT_PROVIDERS {
                if self.is_installed(provider)? {
                    return Ok(true);
                }
            }
            for provider in PACMAN_INIT_PROVIDERS {
                if self.in_repositories(provider)? {
                    return Ok(true);
                }
            }
            return Ok(false);
        }
        self.in_repositories(package)
    }

    fn dependencies(&self, package: &str) -> Result<Option<Vec<String>>> {
        let Some(info) = self.info(package)? else {
            return Ok(None);
        };
        Ok(Some(match info_field(&info, "Depends On") {
            Some("None") | None => Vec::new(),
            Some(list) => list.split_whitespace().map(String::from).collect(),
        }))
    }

    fn installed_version(&self, package: &str) -> Result<Option<String>> {
        validate_package_name(package)?;
        let result = flow::query(self.ctx.runner(), &self.pacman().args(["-Q", package]))?;
        if !result.exited_ok() {
            return Ok(None);
        }
        Ok(result.output.split_whitespace().nth(1).map(String::from))
    }

    fn latest_version(&self, package: &str) -> Result<Option<String>> {
        validate_package_name(package)?;
        let result = flow::query(self.ctx.runner(), &self.pacman().args(["-Si", package]))?;
        if !result.exited_ok() {
            return Ok(None);
        }
        Ok(info_field(&result.output, "Version").map(String::from))
    }

    fn info(&self, package: &str) -> Result<Option<String>> {
        validate_package_name(package)?;
        for flag in ["-Si", "-Qi"] {
            let result = flow::query(self.ctx.runner(), &self.pacman().args([flag, package]))?;
            if result.exited_ok() && !result.output.trim().is_empty() {
                return Ok(Some(result.output));
            }
        }
        Ok(None)
    }
}
