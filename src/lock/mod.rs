//! Waiting for a package database to be free before mutating it.
//!
//! The real mutual exclusion is the package manager's own lock; this module
//! only waits for it, in three stages: sudo pre-check, `fuser` polling of the
//! known lock files, and (where lock files lie) a canary command that is
//! expected to fail for reasons other than locking.

use crate::error::{AppkgError, Result};
use crate::process::{CommandRunner, Invocation};
use crate::ui;
use crate::ui::notice::DelayedNotice;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

/// A deliberately failing mutating command plus the output fragments that mean
/// "still locked".
#[derive(Debug, Clone)]
pub struct Canary {
    pub invocation: Invocation,
    pub markers: &'static [&'static str],
}

#[derive(Debug, Clone)]
pub struct LockProfile {
    /// Name used in the wait notice, e.g. "APT".
    pub label: &'static str,
    pub lock_files: Vec<PathBuf>,
    pub canary: Option<Canary>,
}

impl LockProfile {
    /// A profile that never waits (null backend).
    pub fn none() -> Self {
        Self {
            label: "package manager",
            lock_files: Vec::new(),
            canary: None,
        }
    }

    fn is_noop(&self) -> bool {
        self.lock_files.is_empty() && self.canary.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockTiming {
    pub poll_interval: Duration,
    pub notice_delay: Duration,
    /// `None` waits forever.
    pub timeout: Option<Duration>,
}

impl Default for LockTiming {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            notice_delay: Duration::from_secs(5),
            timeout: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LockArbiter {
    profile: LockProfile,
    timing: LockTiming,
}

impl LockArbiter {
    pub fn new(profile: LockProfile, timing: LockTiming) -> Self {
        Self { profile, timing }
    }

    pub fn profile(&self) -> &LockProfile {
        &self.profile
    }

    /// Block until no known lock is held. Only privilege failure (or an
    /// explicitly configured timeout) ends the wait with an error.
    pub fn wait_for_lock(&self, runner: &dyn CommandRunner) -> Result<()> {
        if self.profile.is_noop() {
            return Ok(());
        }

        ensure_privileges(runner)?;

        let notice = DelayedNotice::start(
            format!("Waiting until {} locks are released... ", self.profile.label),
            self.timing.notice_delay,
        );
        let started = Instant::now();

        self.wait_for_lock_files(runner, started)?;
        self.wait_for_canary(runner, started)?;

        notice.finish();
        Ok(())
    }

    fn wait_for_lock_files(&self, runner: &dyn CommandRunner, started: Instant) -> Result<()> {
        while let Some(held) = self.first_held_lock(runner) {
            ui::verbose(&format!("{} is in use", held.display()));
            self.pause_or_time_out(started)?;
        }
        Ok(())
    }

    fn first_held_lock(&self, runner: &dyn CommandRunner) -> Option<PathBuf> {
        self.profile
            .lock_files
            .iter()
            .filter(|path| path.exists())
            .find(|path| {
                let probe = Invocation::new("fuser")
                    .arg(path.to_string_lossy())
                    .elevated();
                // fuser exits 0 only when some process has the file open
                match runner.run(&probe) {
                    Ok(result) => result.exited_ok(),
                    Err(e) => {
                        ui::verbose(&format!("lock probe failed, assuming free: {}", e));
                        false
                    }
                }
            })
            .cloned()
    }

    fn wait_for_canary(&self, runner: &dyn CommandRunner, started: Instant) -> Result<()> {
        let Some(canary) = &self.profile.canary else {
            return Ok(());
        };

        loop {
            let result = runner.run(&canary.invocation)?;
            let locked = canary
                .markers
                .iter()
                .any(|marker| result.output.contains(marker));
            if !locked {
                return Ok(());
            }
            ui::verbose("canary command reported a held lock");
            self.pause_or_time_out(started)?;
        }
    }

    fn pause_or_time_out(&self, started: Instant) -> Result<()> {
        if let Some(limit) = self.timing.timeout
            && started.elapsed() >= limit
        {
            return Err(AppkgError::LockTimeout {
                backend: self.profile.label.to_string(),
                waited_secs: started.elapsed().as_secs(),
            });
        }
        if ui::is_interrupted() {
            return Err(AppkgError::Interrupted);
        }
        thread::sleep(self.timing.poll_interval);
        Ok(())
    }
}

/// Make sure `sudo` works, prompting for a password once if needed.
pub fn ensure_privileges(runner: &dyn CommandRunner) -> Result<()> {
    let probe = Invocation::new("sudo").args(["-n", "true"]);
    match runner.run(&probe) {
        Ok(result) if result.exited_ok() => return Ok(()),
        Ok(_) => {}
        Err(AppkgError::DependencyMissing(_)) => {
            return Err(AppkgError::PrivilegeDenied(
                "sudo is not installed".to_string(),
            ));
        }
        Err(e) => return Err(AppkgError::PrivilegeDenied(e.to_string())),
    }

    let prompt = Invocation::new("sudo").arg("-v").interactive();
    match runner.run(&prompt) {
        Ok(result) if result.exited_ok() => Ok(()),
        Ok(result) => Err(AppkgError::PrivilegeDenied(format!(
            "sudo exited with code {}",
            result.exit_code.unwrap_or(-1)
        ))),
        Err(e) => Err(AppkgError::PrivilegeDenied(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::RecordingRunner;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast() -> LockTiming {
        LockTiming {
            poll_interval: Duration::from_millis(1),
            notice_delay: Duration::from_secs(60),
            timeout: None,
        }
    }

    fn profile_with(lock: PathBuf, canary: Option<Canary>) -> LockProfile {
        LockProfile {
            label: "TEST",
            lock_files: vec![lock],
            canary,
        }
    }

    #[test]
    fn null_profile_runs_nothing() {
        let runner = RecordingRunner::new();
        LockArbiter::new(LockProfile::none(), fast())
            .wait_for_lock(&runner)
            .unwrap();
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn privilege_denied_when_sudo_refuses() {
        let dir = tempfile::tempdir().unwrap();
        let runner = RecordingRunner::new()
            .reply("sudo -n true", 1, "a password is required")
            .reply("sudo -v", 1, "");
        let err = LockArbiter::new(profile_with(dir.path().join("lock"), None), fast())
            .wait_for_lock(&runner)
            .unwrap_err();
        assert!(matches!(err, AppkgError::PrivilegeDenied(_)));
        assert!(!runner.was_called("fuser"));
    }

    #[test]
    fn polls_until_lock_file_released() {
        let dir = tempfile::tempdir().unwrap();
        let lock = dir.path().join("lock");
        std::fs::write(&lock, "").unwrap();

        let probes = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&probes);
        let runner = RecordingRunner::new().respond("fuser", move |_| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            if n < 2 { (0, format!("{}: 1234", n)) } else { (1, String::new()) }
        });

        LockArbiter::new(profile_with(lock, None), fast())
            .wait_for_lock(&runner)
            .unwrap();
        assert_eq!(probes.load(Ordering::SeqCst), 3);
        assert!(runner.calls_matching("fuser").iter().all(|c| c.elevated));
    }

    #[test]
    fn missing_lock_files_are_not_probed() {
        let dir = tempfile::tempdir().unwrap();
        let runner = RecordingRunner::new();
        LockArbiter::new(profile_with(dir.path().join("absent"), None), fast())
            .wait_for_lock(&runner)
            .unwrap();
        assert!(!runner.was_called("fuser"));
    }

    #[test]
    fn canary_retries_while_locked() {
        let dir = tempfile::tempdir().unwrap();
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let runner = RecordingRunner::new().respond("apt", move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                (
                    100,
                    "\x1b[31mE:\x1b[0m Could not get lock /var/lib/dpkg/lock-frontend".to_string(),
                )
            } else {
                (100, "E: Unable to locate package lkqecjhxwqekc".to_string())
            }
        });
        let canary = Canary {
            invocation: Invocation::new("apt").args(["install", "lkqecjhxwqekc"]).elevated(),
            markers: crate::constants::APT_LOCK_MARKERS,
        };
        LockArbiter::new(profile_with(dir.path().join("absent"), Some(canary)), fast())
            .wait_for_lock(&runner)
            .unwrap();
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn configured_timeout_surfaces_lock_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let lock = dir.path().join("lock");
        std::fs::write(&lock, "").unwrap();
        let runner = RecordingRunner::new().reply("fuser", 0, "held");
        let timing = LockTiming {
            timeout: Some(Duration::from_millis(20)),
            ..fast()
        };
        let err = LockArbiter::new(profile_with(lock, None), timing)
            .wait_for_lock(&runner)
            .unwrap_err();
        assert!(matches!(err, AppkgError::LockTimeout { .. }));
    }
}
