//! Alpine family (apk-tools).

use super::context::BackendContext;
use super::flow;
use super::registry::BackendKind;
use super::resolve::{SpecResolver, wildcard_regex};
use super::spec::PackageSpec;
use super::traits::{InstallOutcome, PackageBackend, PurgeOutcome};
use crate::constants::{APK_INIT_PROVIDERS, APK_LOCK_FILES, C_LOCALE};
use crate::error::{AppkgError, Result};
use crate::lock::{LockArbiter, LockProfile};
use crate::process::{Invocation, PatternTable};
use crate::project_identity;
use crate::staging::keys::{DEFAULT_KEY_BITS, ensure_signing_keys};
use crate::staging::{StagingArea, TeardownGuard, install_system_file};
use crate::ui;
use crate::utils::sanitize::{validate_app_name, validate_package_name};
use regex::Regex;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, OnceLock};

const INDEX_FILE: &str = "APKINDEX.tar.gz";

/// apk file names are `<name>-<version>-r<release>.apk`; the version starts at
/// the first dash followed by a digit.
static VERSION_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-\d").expect("Invalid regex pattern"));

fn strip_version(name_version: &str) -> &str {
    match VERSION_START.find(name_version) {
        Some(m) => &name_version[..m.start()],
        None => name_version,
    }
}

pub struct ApkBackend {
    ctx: BackendContext,
    patterns: Arc<PatternTable>,
    arch: OnceLock<String>,
    key_bits: usize,
}

impl ApkBackend {
    pub fn new(ctx: BackendContext) -> Self {
        Self {
            ctx,
            patterns: Arc::new(PatternTable::apk()),
            arch: OnceLock::new(),
            key_bits: DEFAULT_KEY_BITS,
        }
    }

    /// Size of the generated repository signing key.
    pub fn with_key_bits(mut self, bits: usize) -> Self {
        self.key_bits = bits;
        self
    }

    fn apk(&self) -> Invocation {
        Invocation::new("apk").envs(C_LOCALE)
    }

    fn staging(&self) -> Result<StagingArea> {
        Ok(StagingArea::new(&self.ctx.layout.staging_root, self.native_arch()?))
    }

    fn index_path(&self) -> Result<PathBuf> {
        Ok(self.staging()?.repo_dir().join(INDEX_FILE))
    }

    /// apk appends the arch itself, so the repository points at the root.
    fn repository_line(&self) -> String {
        format!("file://{}", self.ctx.layout.staging_root.display())
    }

    fn is_repository_line(&self, line: &str) -> bool {
        line.trim() == self.repository_line()
            || line.contains(project_identity::LOCAL_REPO_DIR_NAME)
    }

    fn read_repositories(&self) -> Result<String> {
        let path = &self.ctx.layout.apk_repositories;
        match fs::read_to_string(path) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(AppkgError::io(path, e)),
        }
    }

    fn register_repository(&self) -> Result<()> {
        let current = self.read_repositories()?;
        if current.lines().any(|l| l.trim() == self.repository_line()) {
            return Ok(());
        }
        let updated = format!("{}\n{}", self.repository_line(), current);
        install_system_file(
            self.ctx.runner(),
            &self.ctx.layout.work_dir,
            &self.ctx.layout.apk_repositories,
            &updated,
        )
        .map_err(|e| {
            AppkgError::staging(
                format!("failed to update {}", self.ctx.layout.apk_repositories.display()),
                e.raw_output().unwrap_or_default().to_string(),
            )
        })
    }

    fn unregister_repository(&self) -> Result<()> {
        let current = self.read_repositories()?;
        if !current.lines().any(|l| self.is_repository_line(l)) {
            return Ok(());
        }
        let kept: Vec<&str> = current
            .lines()
            .filter(|l| !self.is_repository_line(l))
            .collect();
        let mut updated = kept.join("\n");
        if !updated.is_empty() {
            updated.push('\n');
        }
        install_system_file(
            self.ctx.runner(),
            &self.ctx.layout.work_dir,
            &self.ctx.layout.apk_repositories,
            &updated,
        )
    }

    fn lock_profile(&self) -> LockProfile {
        LockProfile {
            label: "APK",
            lock_files: APK_LOCK_FILES
                .iter()
                .map(|p| self.ctx.layout.lock_path(p))
                .collect(),
            canary: None,
        }
    }

    fn search_exact(&self, package: &str) -> Result<Option<String>> {
        let result = flow::query(
            self.ctx.runner(),
            &self.apk().args(["search", "-e", package]),
        )?;
        let first = result.output_lines().map(str::trim).find(|l| !l.is_empty());
        Ok(match first {
            Some(line) if result.exited_ok() => Some(line.to_string()),
            _ => None,
        })
    }

    fn install_arg(spec: &PackageSpec) -> String {
        match &spec.min_version {
            Some(version) => format!("{}>={}", spec.name, version),
            None => spec.name.clone(),
        }
    }
}

impl SpecResolver for ApkBackend {
    fn package_extension(&self) -> &'static str {
        ".apk"
    }

    fn describe_local(&self, file: &Path) -> Result<PackageSpec> {
        let base = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stem = base.strip_suffix(".apk").unwrap_or(&base);
        Ok(PackageSpec::bare(strip_version(stem)))
    }

    fn expand_wildcard(&self, pattern: &str) -> Result<Vec<PackageSpec>> {
        ui::info(&format!("Expanding wildcard in '{}'...", pattern));
        let matcher = wildcard_regex(pattern)?;
        let result = flow::query(self.ctx.runner(), &self.apk().args(["search", pattern]))?;
        if !result.exited_ok() {
            return Err(AppkgError::QueryFailed {
                query: format!("apk search {}", pattern),
                reason: result.output,
            });
        }
        let mut names: Vec<String> = result
            .output_lines()
            .map(|l| strip_version(l.trim()).to_string())
            .filter(|n| !n.is_empty() && matcher.is_match(n))
            .collect();
        names.dedup();
        Ok(names.into_iter().map(PackageSpec::bare).collect())
    }
}

impl PackageBackend for ApkBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Apk
    }

    fn native_arch(&self) -> Result<String> {
        flow::cached_arch(&self.arch, || {
            let result = flow::query(self.ctx.runner(), &self.apk().arg("--print-arch"))?;
            let arch = result.output.trim().to_string();
            if !result.exited_ok() || arch.is_empty() {
                return Err(AppkgError::QueryFailed {
                    query: "apk --print-arch".to_string(),
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
        let packages = staging.staged_files(&[".apk"])?;
        if packages.is_empty() {
            return Ok(());
        }
        let repo = staging.repo_dir();

        let keys = ensure_signing_keys(&repo, project_identity::LOCAL_REPO_NAME, self.key_bits)?;

        let index = repo.join(INDEX_FILE);
        match fs::remove_file(&index) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(AppkgError::io(&index, e)),
        }

        let file_names = packages
            .iter()
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()));
        let result = self.ctx.runner().run(
            &self
                .apk()
                .args(["index", "-o", INDEX_FILE])
                .args(file_names)
                .current_dir(&repo),
        )?;
        if !result.exited_ok() {
            return Err(AppkgError::staging(
                format!("apk index failed to index the repository: {}", repo.display()),
                result.output,
            ));
        }

        let signed = self.ctx.runner().run(
            &Invocation::new("abuild-sign")
                .arg("-k")
                .arg(keys.private_key.to_string_lossy())
                .arg(index.to_string_lossy())
                .current_dir(&repo),
        );
        if !matches!(signed, Ok(ref r) if r.exited_ok()) {
            ui::warning(
                "Failed to sign the APK index (abuild-sign not available). The repository requires --allow-untrusted.",
            );
        }

        self.register_repository()
    }

    fn remove_local(&self) -> Result<()> {
        self.staging()?.remove_dir(self.ctx.runner())?;
        if let Err(e) = self.unregister_repository() {
            ui::warning(&format!(
                "Failed to remove the local repository from {}: {}",
                self.ctx.layout.apk_repositories.display(),
                e
            ));
        }
        Ok(())
    }

    fn wait_for_lock(&self) -> Result<()> {
        LockArbiter::new(self.lock_profile(), self.ctx.lock_timing).wait_for_lock(self.ctx.runner())
    }

    fn update_indices(&self) -> Result<()> {
        self.wait_for_lock()?;
        let mut update = self.apk().arg("update");
        if self.staging()?.exists() {
            update = update.arg("--allow-untrusted");
        }
        let update = update
            .elevated()
            .mirrored()
            .classify_with(Arc::clone(&self.patterns));
        self.ctx.runner().run(&update)?.check("apk").map(|_| ())
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

        let index = self.index_path()?;
        flow::attempt_install(
            self,
            self.ctx.runner(),
            self.ctx.install_retry,
            flow::InstallAttempt {
                tool: "apk",
                refresh_indices: staged,
                exit_code_only: false,
                invocation: || {
                    let mut inv = self.apk().args(["add", "--no-cache"]);
                    if staged {
                        inv = inv.arg("--allow-untrusted");
                    }
                    inv.args(install_args.iter().cloned())
                        .elevated()
                        .mirrored()
                        .classify_with(Arc::clone(&self.patterns))
                },
                raced: || staged && !index.exists(),
            },
        )?;

        ui::success("Package installation complete.");
        flow::track(&self.ctx.tracking, app, &resolution.specs, staged, true)
    }

    fn purge(&self, app: &str, _is_update: bool) -> Result<PurgeOutcome> {
        ui::info(&format!(
            "Allowing packages required by the {} app to be uninstalled",
            app
        ));
        flow::purge_tracked(self, &self.ctx.tracking, app, |packages| {
            let del = self
                .apk()
                .arg("del")
                .args(packages.iter().cloned())
                .elevated()
                .mirrored()
                .classify_with(Arc::clone(&self.patterns));
            self.ctx.runner().run(&del)?.check("apk").map(|_| ())
        })
    }

    fn is_installed(&self, package: &str) -> Result<bool> {
        validate_package_name(package)?;
        let result = flow::query(self.ctx.runner(), &self.apk().args(["info", "-e", package]))?;
        Ok(result.exited_ok() && !result.output.trim().is_empty())
    }

    fn is_available(&self, package: &str) -> Result<bool> {
        validate_package_name(package)?;
        // there is no "init" package; any installed or available init system counts
        if package == "init" {
            for provider in APK_INIT_PROVIDERS {
                if self.is_installed(provider)? {
                    return Ok(true);
                }
            }
            for provider in APK_INIT_PROVIDERS {
                if self.search_exact(provider)?.is_some() {
                    return Ok(true);
                }
            }
            return Ok(false);
        }
        Ok(self.search_exact(package)?.is_some())
    }

    fn dependencies(&self, package: &str) -> Result<Option<Vec<String>>> {
        validate_package_name(package)?;
        let result = flow::query(self.ctx.runner(), &self.apk().args(["info", "-R", package]))?;
        if !result.exited_ok() {
            return Ok(None);
        }
        Ok(Some(
            result
                .output_lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && *l != package && !l.ends_with("depends on:"))
                .map(String::from)
                .collect(),
        ))
    }

    fn installed_version(&self, package: &str) -> Result<Option<String>> {
        validate_package_name(package)?;
        let prefix = format!("{}-", package);
        let result = flow::query(self.ctx.runner(), &self.apk().args(["info", "-e", package]))?;
        if !result.exited_ok() || result.output.trim().is_empty() {
            return Ok(None);
        }
        if let Some(version) = result.output.trim().strip_prefix(&prefix) {
            return Ok(Some(version.to_string()));
        }

        // older apk-tools print only the name for -e
        let detail = flow::query(self.ctx.runner(), &self.apk().args(["info", "-a", package]))?;
        Ok(detail
            .output_lines()
            .filter(|l| l.contains(" description:"))
            .filter_map(|l| l.split_whitespace().next())
            .find_map(|first| first.strip_prefix(&prefix))
            .map(String::from))
    }

    fn latest_version(&self, package: &str) -> Result<Option<String>> {
        validate_package_name(package)?;
        let prefix = format!("{}-", package);
        let listed = flow::query(self.ctx.runner(), &self.apk().args(["list", package]))?;
        if listed.exited_ok()
            && let Some(version) = listed
                .output_lines()
                .filter_map(|l| l.split_whitespace().next())
                .find_map(|first| first.strip_prefix(&prefix))
        {
            return Ok(Some(version.to_string()));
        }

        Ok(self
            .search_exact(package)?
            .and_then(|line| line.strip_prefix(&prefix).map(String::from)))
    }

    fn info(&self, package: &str) -> Result<Option<String>> {
        validate_package_name(package)?;
        let result = flow::query(self.ctx.runner(), &self.apk().args(["info", package]))?;
        if result.exited_ok() && !result.output.trim().is_empty() {
            Ok(Some(result.output))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HostLayout;
    use crate::lock::LockTiming;
    use crate::process::RecordingRunner;
    use crate::utils::retry::RetryPolicy;
    use std::time::Duration;

    fn backend(root: &Path, runner: RecordingRunner) -> (ApkBackend, Arc<RecordingRunner>) {
        let runner = Arc::new(runner.reply("apk --print-arch", 0, "x86_64\n"));
        let ctx = BackendContext::new(runner.clone(), HostLayout::rooted_at(root), &root.join("data"))
            .with_lock_timing(LockTiming {
                poll_interval: Duration::from_millis(1),
                notice_delay: Duration::from_secs(60),
                timeout: None,
            })
            .with_install_retry(RetryPolicy::no_delay(3));
        (ApkBackend::new(ctx).with_key_bits(1024), runner)
    }

    #[test]
    fn bad_app_name_is_rejected_before_staging() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("tool-2.0-r1.apk");
        fs::write(&local, "pkg").unwrap();
        let (apk, runner) = backend(dir.path(), RecordingRunner::new());

        let err = apk
            .install("../etc", &[local.to_string_lossy().into_owned()])
            .unwrap_err();
        assert!(matches!(err, AppkgError::ConfigError(_)));
        assert!(local.exists());
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn local_file_names_lose_their_version() {
        assert_eq!(strip_version("py3-foo-bar-1.2.3-r0"), "py3-foo-bar");
        assert_eq!(strip_version("nodigits"), "nodigits");
        let dir = tempfile::tempdir().unwrap();
        let (apk, _) = backend(dir.path(), RecordingRunner::new());
        let spec = apk.describe_local(Path::new("/tmp/tool-2.0-r1.apk")).unwrap();
        assert_eq!(spec.to_string(), "tool");
    }

    #[test]
    fn install_tracks_sorted_names() {
        let dir = tempfile::tempdir().unwrap();
        let (apk, runner) = backend(dir.path(), RecordingRunner::new());
        let outcome = apk
            .install("My App", &["zlib".into(), "curl".into(), "curl".into()])
            .unwrap();
        assert_eq!(outcome.packages, vec!["curl", "zlib"]);
        assert!(!outcome.used_local_repo);

        let add = runner.calls_matching("apk add");
        assert_eq!(add.len(), 1);
        assert!(add[0].elevated);
        assert_eq!(add[0].args, vec!["add", "--no-cache", "zlib", "curl", "curl"]);
        assert!(add[0].env.contains(&("LANG".to_string(), "C".to_string())));
        // no staging, so no index update
        assert!(!runner.was_called("apk update"));
        assert_eq!(
            apk.ctx.tracking.read("My App").unwrap().unwrap(),
            vec!["curl", "zlib"]
        );
    }

    #[test]
    fn error_line_with_exit_zero_fails_install() {
        let dir = tempfile::tempdir().unwrap();
        let runner = RecordingRunner::new().reply(
            "apk add",
            0,
            "fetch https://dl-cdn.alpinelinux.org/x86_64/APKINDEX.tar.gz\nERROR: unable to select packages:\n  nope (no such package)",
        );
        let (apk, _) = backend(dir.path(), runner);
        let err = apk.install("app", &["nope".into()]).unwrap_err();
        match err {
            AppkgError::BackendReportedError { errors, .. } => {
                assert_eq!(errors, vec!["ERROR: unable to select packages:"]);
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert!(!apk.ctx.tracking.exists("app").unwrap());
    }

    #[test]
    fn local_package_goes_through_signed_index() {
        let dir = tempfile::tempdir().unwrap();
        let downloads = dir.path().join("downloads");
        fs::create_dir_all(&downloads).unwrap();
        let pkg = downloads.join("tool-1.0-r0.apk");
        fs::write(&pkg, "apk").unwrap();

        let runner = RecordingRunner::new().respond("apk index", |inv| {
            let dir = inv.cwd.clone().unwrap();
            fs::write(dir.join(INDEX_FILE), "index").unwrap();
            (0, String::new())
        });
        let (apk, runner) = backend(dir.path(), runner);
        let outcome = apk.install("app", &[pkg.to_string_lossy().into_owned()]).unwrap();

        assert!(outcome.used_local_repo);
        assert_eq!(outcome.packages, vec!["tool"]);
        assert!(!pkg.exists());
        assert!(runner.was_called("abuild-sign -k"));
        assert!(runner.was_called("apk update --allow-untrusted"));
        let add = runner.calls_matching("apk add");
        assert_eq!(add[0].args, vec!["add", "--no-cache", "--allow-untrusted", "tool"]);
        // torn down afterwards
        assert!(!apk.ctx.layout.staging_root.exists());
    }

    #[test]
    fn vanished_index_is_a_race() {
        let dir = tempfile::tempdir().unwrap();
        let pkg = dir.path().join("tool-1.0-r0.apk");
        fs::write(&pkg, "apk").unwrap();
        let index = HostLayout::rooted_at(dir.path())
            .staging_root
            .join("x86_64")
            .join(INDEX_FILE);
        let wiped = index.clone();

        let runner = RecordingRunner::new()
            .respond("apk index", |inv| {
                let dir = inv.cwd.clone().unwrap();
                fs::write(dir.join(INDEX_FILE), "index").unwrap();
                (0, String::new())
            })
            // a concurrent install wipes the index every time
            .respond("apk update", move |_| {
                let _ = fs::remove_file(&wiped);
                (0, String::new())
            })
            .reply("apk add", 1, "ERROR: tool (no such package)");
        let (apk, runner) = backend(dir.path(), runner);

        let err = apk.install("app", &[pkg.to_string_lossy().into_owned()]).unwrap_err();
        match err {
            AppkgError::TransientStagingRace { attempts } => assert_eq!(attempts, 3),
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(runner.calls_matching("apk add").len(), 3);
        assert!(!index.exists());
        assert!(!apk.ctx.layout.staging_root.exists());
        assert!(!apk.ctx.tracking.exists("app").unwrap());
    }

    #[test]
    fn purge_skips_packages_that_are_gone() {
        let dir = tempfile::tempdir().unwrap();
        let runner = RecordingRunner::new()
            .reply("apk info -e", 1, "")
            .reply("apk info -e b", 0, "b-1.0-r0");
        let (apk, runner) = backend(dir.path(), runner);
        apk.ctx.tracking.record("app", ["a", "b", "c"]).unwrap();

        let outcome = apk.purge("app", false).unwrap();
        assert_eq!(outcome.removed, vec!["b"]);
        let del = runner.calls_matching("apk del");
        assert_eq!(del.len(), 1);
        assert_eq!(del[0].args, vec!["del", "b"]);
        assert!(!apk.ctx.tracking.exists("app").unwrap());
    }

    #[test]
    fn purge_without_record_runs_nothing_mutating() {
        let dir = tempfile::tempdir().unwrap();
        let (apk, runner) = backend(dir.path(), RecordingRunner::new());
        apk.purge("app", false).unwrap();
        assert!(!runner.was_called("apk del"));
        assert!(!runner.was_called("fuser"));
    }

    #[test]
    fn queries_parse_apk_output() {
        let dir = tempfile::tempdir().unwrap();
        let runner = RecordingRunner::new()
            .reply("apk info -e curl", 0, "curl-8.5.0-r0\n")
            .reply("apk list curl", 0, "curl-8.9.1-r0 x86_64 {curl} (MIT)\n")
            .reply(
                "apk info -R curl",
                0,
                "curl-8.5.0-r0 depends on:\nca-certificates\nso:libc.musl-x86_64.so.1\n\n",
            )
            .reply("apk search -e", 1, "")
            .reply("apk info -e openrc", 0, "openrc-0.54-r1");
        let (apk, _) = backend(dir.path(), runner);

        assert!(apk.is_installed("curl").unwrap());
        assert_eq!(apk.installed_version("curl").unwrap().as_deref(), Some("8.5.0-r0"));
        assert_eq!(apk.latest_version("curl").unwrap().as_deref(), Some("8.9.1-r0"));
        assert_eq!(
            apk.dependencies("curl").unwrap().unwrap(),
            vec!["ca-certificates", "so:libc.musl-x86_64.so.1"]
        );
        assert!(!apk.is_available("nope").unwrap());
        assert!(apk.is_available("init").unwrap());
        assert!(apk.info("two words").is_err());
    }

    #[test]
    fn remove_local_strips_repository_lines() {
        let dir = tempfile::tempdir().unwrap();
        let (apk, runner) = backend(dir.path(), RecordingRunner::new());
        let repos = &apk.ctx.layout.apk_repositories;
        fs::create_dir_all(repos.parent().unwrap()).unwrap();
        fs::write(
            repos,
            format!("{}\nhttps://dl-cdn.alpinelinux.org/alpine/v3.20/main\n", apk.repository_line()),
        )
        .unwrap();

        apk.remove_local().unwrap();
        let cp = runner.calls_matching("cp ");
        assert_eq!(cp.len(), 1);
        assert_eq!(cp[0].args[1], repos.to_string_lossy());
    }
}
