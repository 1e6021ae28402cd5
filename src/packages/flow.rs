//! Install and purge sequencing shared by the real backends.

use super::resolve::{Resolution, SpecResolver, resolve_args};
use super::spec::{self, PackageSpec};
use super::traits::{InstallOutcome, PackageBackend, PurgeOutcome};
use crate::error::{AppkgError, Result};
use crate::process::{CommandRunner, Invocation, ProcessResult};
use crate::tracking::TrackingStore;
use crate::ui;
use crate::utils::retry::{AttemptOutcome, RetryPolicy, retry_on_race};
use crate::utils::sanitize::validate_app_name;
use rayon::prelude::*;
use std::path::Path;
use std::sync::OnceLock;

pub(crate) const RACE_NOTICE: &str =
    "The local package repository disappeared while installing. Another install may have removed it.";

/// Run a read-only query. A tool that cannot be started is a `QueryFailed`;
/// how a non-zero exit is read is up to the caller.
pub(crate) fn query(runner: &dyn CommandRunner, invocation: &Invocation) -> Result<ProcessResult> {
    runner
        .run(invocation)
        .map_err(|e| AppkgError::QueryFailed {
            query: invocation.display(),
            reason: e.to_string(),
        })
}

/// Remove whatever an earlier (possibly concurrent) install left behind.
pub(crate) fn clear_stale_staging(backend: &dyn PackageBackend) {
    if let Err(e) = backend.remove_local() {
        ui::warning(&format!("Could not remove an old local package repository: {}", e));
    }
}

/// Resolve, verify and stage the install arguments.
pub(crate) fn prepare(
    backend: &dyn PackageBackend,
    resolver: &dyn SpecResolver,
    args: &[String],
    work_dir: &Path,
    download_policy: RetryPolicy,
) -> Result<Resolution> {
    std::fs::create_dir_all(work_dir).map_err(|e| AppkgError::io(work_dir, e))?;
    let resolution = resolve_args(resolver, args, work_dir, download_policy)?;
    if resolution.uses_local_repo() {
        backend.add_local(&resolution.local_files)?;
    }
    spec::verify_resolved(&resolution.specs)?;
    if resolution.uses_local_repo() {
        backend.refresh_local_index()?;
    }
    Ok(resolution)
}

/// How to run and judge one install command.
pub(crate) struct InstallAttempt<'a, I, R> {
    pub tool: &'a str,
    /// Refresh package indices before each attempt.
    pub refresh_indices: bool,
    /// Judge success on the exit code alone; error lines only classify.
    pub exit_code_only: bool,
    pub invocation: I,
    /// Whether the staging repository vanished underneath the attempt.
    pub raced: R,
}

/// Run the install command, repeating it while the staging repository keeps
/// disappearing underneath it.
pub(crate) fn attempt_install<I, R>(
    backend: &dyn PackageBackend,
    runner: &dyn CommandRunner,
    policy: RetryPolicy,
    plan: InstallAttempt<'_, I, R>,
) -> Result<ProcessResult>
where
    I: Fn() -> Invocation,
    R: Fn() -> bool,
{
    retry_on_race(policy, RACE_NOTICE, |attempt| {
        ui::verbose(&format!("{} attempt {}", plan.tool, attempt));
        if plan.refresh_indices
            && let Err(e) = backend.update_indices()
        {
            if (plan.raced)() {
                return Ok(AttemptOutcome::Raced);
            }
            return Ok(AttemptOutcome::Settled(Err(e)));
        }

        backend.wait_for_lock()?;
        let result = runner.run(&(plan.invocation)())?;
        let failed = if plan.exit_code_only {
            !result.exited_ok()
        } else {
            result.failed()
        };
        if !failed {
            return Ok(AttemptOutcome::Settled(Ok(result)));
        }
        if (plan.raced)() {
            Ok(AttemptOutcome::Raced)
        } else {
            Ok(AttemptOutcome::Settled(Err(result.into_error(plan.tool))))
        }
    })
}

/// Record the resolved names and build the outcome.
pub(crate) fn track(
    tracking: &TrackingStore,
    app: &str,
    specs: &[PackageSpec],
    used_local_repo: bool,
    changed: bool,
) -> Result<InstallOutcome> {
    let mut packages = spec::names(specs);
    packages.sort();
    packages.dedup();
    tracking.record(app, &packages)?;
    Ok(InstallOutcome {
        packages,
        used_local_repo,
        changed,
    })
}

/// The installed subset of `names`, queried in parallel, input order kept.
pub(crate) fn still_installed(backend: &dyn PackageBackend, names: &[String]) -> Result<Vec<String>> {
    let flags: Vec<bool> = names
        .par_iter()
        .map(|name| backend.is_installed(name))
        .collect::<Result<_>>()?;
    Ok(names
        .iter()
        .zip(flags)
        .filter_map(|(name, installed)| installed.then(|| name.clone()))
        .collect())
}

/// Purge through the tracking file: read, filter to what is still installed,
/// wait for the lock, remove, forget.
pub(crate) fn purge_tracked<F>(
    backend: &dyn PackageBackend,
    tracking: &TrackingStore,
    app: &str,
    remove: F,
) -> Result<PurgeOutcome>
where
    F: FnOnce(&[String]) -> Result<()>,
{
    validate_app_name(app)?;
    let tracked = tracking.read(app)?.unwrap_or_default();
    if tracked.is_empty() {
        ui::verbose(&format!("No packages are tracked for {}", app));
        tracking.remove(app)?;
        return Ok(PurgeOutcome::default());
    }

    let installed = still_installed(backend, &tracked)?;
    if installed.is_empty() {
        ui::info(&format!("None of the packages installed for {} remain", app));
        tracking.remove(app)?;
        return Ok(PurgeOutcome::default());
    }

    backend.wait_for_lock()?;
    ui::info(&format!("Removing packages: {}", installed.join(" ")));
    remove(&installed)?;
    tracking.remove(app)?;
    Ok(PurgeOutcome { removed: installed })
}

/// Memoize the native architecture probe.
pub(crate) fn cached_arch<F>(cell: &OnceLock<String>, probe: F) -> Result<String>
where
    F: FnOnce() -> Result<String>,
{
    if let Some(arch) = cell.get() {
        return Ok(arch.clone());
    }
    let arch = probe()?;
    let _ = cell.set(arch.clone());
    Ok(arch)
}
