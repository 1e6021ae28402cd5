//! Debian family (apt-get, dpkg).
//!
//! Unlike the other backends an app is represented by a placeholder package
//! whose `Depends` carries everything the app asked for, so purging the app is
//! one `apt-get purge --autoremove`.

mod query;
mod repo;

use super::context::BackendContext;
use super::flow;
use super::registry::BackendKind;
use super::resolve::{SpecResolver, wildcard_regex};
use super::spec::PackageSpec;
use super::traits::{InstallOutcome, PackageBackend, PurgeOutcome};
use crate::aggregator;
use crate::constants::{APT_CANARY_PACKAGE, APT_LOCK_MARKERS, DPKG_LOCK_FILES, EN_LOCALE};
use crate::error::{AppkgError, Result};
use crate::lock::{Canary, LockArbiter, LockProfile};
use crate::process::{Invocation, PatternTable};
use crate::staging::{StagingArea, TeardownGuard};
use crate::ui;
use crate::utils::sanitize::{validate_app_name, validate_package_name};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, OnceLock};

static UNSATISFIED_DEPENDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Depends: ([^ ]*) but it is not (installable|going to be installed)")
        .expect("Invalid regex pattern")
});

const AUTOREMOVE_HINTS: &[&str] = &["autoremove to remove them", "can be autoremoved"];
const UPGRADE_HINTS: &[&str] = &["can be upgraded", "upgradable"];

pub struct DpkgBackend {
    ctx: BackendContext,
    patterns: Arc<PatternTable>,
    arch: OnceLock<String>,
}

impl DpkgBackend {
    pub fn new(ctx: BackendContext) -> Self {
        Self {
            ctx,
            patterns: Arc::new(PatternTable::apt()),
            arch: OnceLock::new(),
        }
    }

    fn tool(program: &str) -> Invocation {
        Invocation::new(program).envs(EN_LOCALE)
    }

    fn mutating(&self, invocation: Invocation) -> Invocation {
        invocation
            .elevated()
            .mirrored()
            .classify_with(Arc::clone(&self.patterns))
    }

    fn staging(&self) -> Result<StagingArea> {
        Ok(StagingArea::new(&self.ctx.layout.staging_root, self.native_arch()?))
    }

    /// Extra apt options while the local repository is staged, plus `-t`.
    fn apt_flags(&self, repo_pin: Option<&str>) -> Result<Vec<String>> {
        let mut flags = Vec::new();
        let staging = self.staging()?;
        if staging.exists() {
            flags.push("-o".to_string());
            flags.push(format!(
                "Dir::Etc::SourceList={}",
                repo::source_list(&staging.repo_dir()).display()
            ));
        }
        if let Some(repo) = repo_pin {
            flags.push("-t".to_string());
            flags.push(repo.to_string());
        }
        Ok(flags)
    }

    fn lock_profile(&self) -> LockProfile {
        LockProfile {
            label: "APT",
            lock_files: DPKG_LOCK_FILES
                .iter()
                .map(|p| self.ctx.layout.lock_path(p))
                .collect(),
            canary: Some(Canary {
                invocation: Self::tool("apt")
                    .args(["-o", "DPkg::Lock::Timeout=-1", "install", APT_CANARY_PACKAGE])
                    .elevated(),
                markers: APT_LOCK_MARKERS,
            }),
        }
    }

    fn policy(&self, args: &[&str]) -> Result<Option<String>> {
        let result = flow::query(self.ctx.runner(), &Self::tool("apt-cache").arg("policy").args(args.iter().copied()))?;
        if !result.exited_ok() {
            return Ok(None);
        }
        Ok(query::policy_candidate(&result.output))
    }

    fn print_hints(output: &str) {
        if AUTOREMOVE_HINTS.iter().any(|h| output.contains(h)) {
            ui::info("Some packages are unnecessary. Please consider running sudo apt autoremove.");
        }
        if UPGRADE_HINTS.iter().any(|h| output.contains(h)) {
            ui::info("Some packages can be upgraded. Please consider running sudo apt full-upgrade.");
        }
    }

    /// Explain an unsatisfiable dependency on a staged package before failing.
    fn diagnose(&self, err: &AppkgError, flags: &[String]) {
        let Some(output) = err.raw_output() else {
            return;
        };
        let unsatisfied: Vec<String> = UNSATISFIED_DEPENDS
            .captures_iter(output)
            .map(|c| c[1].to_string())
            .collect();
        if unsatisfied.is_empty() {
            return;
        }

        ui::header("Diagnostics");
        if let Ok(staging) = self.staging() {
            let packages = staging.repo_dir().join(repo::PACKAGES_FILE);
            if let Ok(index) = fs::read_to_string(&packages) {
                ui::info(&format!("Contents of {}:", packages.display()));
                ui::raw_output(&index);
            }
        }

        let dry_run = Self::tool("apt-get")
            .args(["install", "-fy", "--no-install-recommends", "--allow-downgrades", "--dry-run"])
            .args(flags.iter().cloned())
            .args(unsatisfied.iter().cloned())
            .elevated();
        match self.ctx.runner().run(&dry_run) {
            Ok(result) => ui::raw_output(&result.output),
            Err(e) => ui::verbose(&format!("dry run failed: {}", e)),
        }

        let policy = Self::tool("apt-cache")
            .arg("policy")
            .args(unsatisfied.iter().cloned());
        match self.ctx.runner().run(&policy) {
            Ok(result) => ui::raw_output(&result.output),
            Err(e) => ui::verbose(&format!("apt-cache policy failed: {}", e)),
        }
    }

    fn purge_placeholder(&self, app: &str, package: &str, record: &str, is_update: bool) -> Result<PurgeOutcome> {
        if let Some(depends) = aggregator::control_field(record, "Depends") {
            ui::info(&format!(
                "These packages may be removed if nothing else needs them: {}",
                depends
            ));
        }
        self.wait_for_lock()?;
        let mut purge = Self::tool("apt-get").args(["purge", "-y", package]);
        if !is_update {
            purge = purge.arg("--autoremove");
        }
        self.ctx
            .runner()
            .run(&self.mutating(purge))?
            .check("apt-get")?;
        self.ctx.tracking.remove(app)?;
        Ok(PurgeOutcome {
            removed: vec![package.to_string()],
        })
    }
}

impl SpecResolver for DpkgBackend {
    fn package_extension(&self) -> &'static str {
        ".deb"
    }

    fn describe_local(&self, file: &Path) -> Result<PackageSpec> {
        let result = flow::query(
            self.ctx.runner(),
            &Self::tool("dpkg-deb").arg("-I").arg(file.to_string_lossy()),
        )?;
        if !result.exited_ok() {
            return Err(AppkgError::staging(
                format!("failed to read package info from {}", file.display()),
                result.output,
            ));
        }
        let header = query::deb_header(&result.output);
        for (field, value) in [
            ("name", &header.package),
            ("version", &header.version),
            ("architecture", &header.architecture),
        ] {
            if value.is_empty() {
                return Err(AppkgError::staging(
                    format!("failed to determine package {} for file: {}", field, file.display()),
                    result.output.clone(),
                ));
            }
        }

        let native = self.native_arch()?;
        let name = if header.architecture != native && header.architecture != "all" {
            format!("{}:{}", header.package, header.architecture)
        } else {
            header.package
        };
        Ok(PackageSpec::at_least(name, header.version))
    }

    fn expand_wildcard(&self, pattern: &str) -> Result<Vec<PackageSpec>> {
        ui::info(&format!("Expanding wildcard in '{}'...", pattern));
        let matcher = wildcard_regex(pattern)?;
        let result = flow::query(self.ctx.runner(), &Self::tool("apt-cache").args(["search", pattern]))?;
        if !result.exited_ok() {
            return Err(AppkgError::QueryFailed {
                query: format!("apt-cache search {}", pattern),
                reason: result.output,
            });
        }
        let mut names: Vec<&str> = query::search_names(&result.output)
            .filter(|name| matcher.is_match(name))
            .collect();
        names.sort_unstable();
        names.dedup();
        Ok(names.into_iter().map(PackageSpec::bare).collect())
    }

    fn accepts_repo_pin(&self) -> bool {
        true
    }

    fn pin(&self, name: &str, repo: &str) -> Result<PackageSpec> {
        let result = flow::query(
            self.ctx.runner(),
            &Self::tool("apt-cache").args(["policy", "-t", repo, name]),
        )?;
        match query::pinned_version(&result.output) {
            Some(version) if result.exited_ok() => {
                Ok(PackageSpec::at_least(name, version).pinned_to(repo))
            }
            _ => Err(AppkgError::QueryFailed {
                query: format!("apt-cache policy -t {} {}", repo, name),
                reason: format!("no version of {} found in {}", name, repo),
            }),
        }
    }
}

impl PackageBackend for DpkgBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Dpkg
    }

    fn native_arch(&self) -> Result<String> {
        flow::cached_arch(&self.arch, || {
            let result = flow::query(self.ctx.runner(), &Self::tool("dpkg").arg("--print-architecture"))?;
            let arch = result.output.trim().to_string();
            if !result.exited_ok() || arch.is_empty() {
                return Err(AppkgError::QueryFailed {
                    query: "dpkg --print-architecture".to_string(),
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
        let repo = self.staging()?.repo_dir();
        repo::write_index(self.ctx.runner(), &self.ctx.layout, &repo)
    }

    fn remove_local(&self) -> Result<()> {
        let staging = self.staging()?;
        staging.remove_dir(self.ctx.runner())?;
        if let Err(e) = repo::forget_lists(self.ctx.runner(), &self.ctx.layout, &staging.repo_dir()) {
            ui::warning(&format!("Failed to remove apt's copy of the local repository index: {}", e));
        }
        Ok(())
    }

    fn wait_for_lock(&self) -> Result<()> {
        LockArbiter::new(self.lock_profile(), self.ctx.lock_timing).wait_for_lock(self.ctx.runner())
    }

    fn update_indices(&self) -> Result<()> {
        self.wait_for_lock()?;
        ui::info("Running apt-get update...");
        let update = Self::tool("apt-get")
            .args(["update", "--allow-releaseinfo-change"])
            .args(self.apt_flags(None)?);
        let result = self
            .ctx
            .runner()
            .run(&self.mutating(update))?
            .check("apt-get")?;
        Self::print_hints(&result.output);
        Ok(())
    }

    fn install(&self, app: &str, args: &[String]) -> Result<InstallOutcome> {
        validate_app_name(app)?;
        ui::info(&format!("Will install these packages: {}", args.join(" ")));
        flow::clear_stale_staging(self);
        let _teardown = TeardownGuard::new(|| self.remove_local());

        let work_dir = &self.ctx.layout.work_dir;
        let resolution = flow::prepare(self, self, args, work_dir, self.ctx.download_retry)?;
        let staged = resolution.uses_local_repo();
        let repo_dir = self.staging()?.repo_dir();
        if staged && !repo_dir.join(repo::PACKAGES_FILE).is_file() {
            return Err(AppkgError::TransientStagingRace { attempts: 1 });
        }
        let flags = self.apt_flags(resolution.repo_pin.as_deref())?;

        let specs: Vec<String> = resolution.specs.iter().map(ToString::to_string).collect();
        let placeholder = aggregator::synthesize(self.ctx.runner(), work_dir, app, &specs)?;
        let Some(deb) = placeholder.deb else {
            return flow::track(&self.ctx.tracking, app, &resolution.specs, staged, false);
        };

        let marker = repo::lists_marker(&self.ctx.layout, &repo_dir);
        let result = flow::attempt_install(
            self,
            self.ctx.runner(),
            self.ctx.install_retry,
            flow::InstallAttempt {
                tool: "apt-get",
                refresh_indices: true,
                exit_code_only: false,
                invocation: || {
                    self.mutating(
                        Self::tool("apt-get")
                            .args([
                                "-o",
                                "DPkg::Lock::Timeout=-1",
                                "install",
                                "-fy",
                                "--no-install-recommends",
                                "--allow-downgrades",
                            ])
                            .args(flags.iter().cloned())
                            .arg(deb.to_string_lossy()),
                    )
                },
                raced: || staged && !marker.exists(),
            },
        );
        if let Err(e) = fs::remove_file(&deb) {
            ui::verbose(&format!("could not remove {}: {}", deb.display(), e));
        }
        match result {
            Ok(done) => Self::print_hints(&done.output),
            Err(e) => {
                if staged {
                    self.diagnose(&e, &flags);
                }
                return Err(e);
            }
        }

        ui::success("Package installation complete.");
        flow::track(&self.ctx.tracking, app, &resolution.specs, staged, true)
    }

    fn purge(&self, app: &str, is_update: bool) -> Result<PurgeOutcome> {
        validate_app_name(app)?;
        let package = self.package_name_for_app(app);
        if let Some(record) = aggregator::installed_record(self.ctx.runner(), &package)? {
            ui::info(&format!(
                "Allowing packages required by the {} app to be uninstalled",
                app
            ));
            return self.purge_placeholder(app, &package, &record, is_update);
        }

        ui::verbose(&format!("{} is not installed; using the tracking file", package));
        flow::purge_tracked(self, &self.ctx.tracking, app, |packages| {
            let purge = Self::tool("apt-get")
                .args(["purge", "-y"])
                .args(packages.iter().cloned());
            self.ctx
                .runner()
                .run(&self.mutating(purge))?
                .check("apt-get")
                .map(|_| ())
        })
    }

    fn is_installed(&self, package: &str) -> Result<bool> {
        validate_package_name(package)?;
        let result = flow::query(self.ctx.runner(), &Self::tool("dpkg").args(["-s", package]))?;
        Ok(result.exited_ok() && result.output.contains("Status: install ok installed"))
    }

    fn is_available(&self, package: &str) -> Result<bool> {
        validate_package_name(package)?;
        let target = format!("{}:{}", package, self.native_arch()?);
        Ok(self.policy(&[&target])?.is_some())
    }

    fn dependencies(&self, package: &str) -> Result<Option<Vec<String>>> {
        let Some(info) = self.info(package)? else {
            return Ok(None);
        };
        Ok(Some(
            aggregator::control_field(&info, "Depends")
                .map(aggregator::split_depends)
                .unwrap_or_default(),
        ))
    }

    fn installed_version(&self, package: &str) -> Result<Option<String>> {
        validate_package_name(package)?;
        let result = flow::query(
            self.ctx.runner(),
            &Self::tool("dpkg-query").args(["-W", "-f=${Version}", package]),
        )?;
        let version = result.output.trim();
        if !result.exited_ok() || version.is_empty() {
            return Ok(None);
        }
        Ok(Some(version.to_string()))
    }

    fn latest_version(&self, package: &str) -> Result<Option<String>> {
        validate_package_name(package)?;
        self.policy(&[package])
    }

    fn info(&self, package: &str) -> Result<Option<String>> {
        validate_package_name(package)?;
        let result = flow::query(self.ctx.runner(), &Self::tool("dpkg").args(["-s", package]))?;
        if result.exited_ok() && !result.output.trim().is_empty() {
            Ok(Some(result.output))
        } else {
            Ok(None)
        }
    }
}
