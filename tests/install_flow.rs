//! Whole install/purge sequences for the dpkg backend against a recorded host.
#![cfg(unix)]

use appkg::config::HostLayout;
use appkg::error::AppkgError;
use appkg::lock::LockTiming;
use appkg::packages::dpkg::DpkgBackend;
use appkg::packages::{BackendContext, PackageBackend};
use appkg::process::RecordingRunner;
use appkg::tracking::TrackingStore;
use appkg::utils::retry::RetryPolicy;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const PLACEHOLDER_STATUS: &str = "Status: install ok installed\n";

/// Shared view of what the fake tools have seen.
#[derive(Default)]
struct Host {
    /// Control file of the last placeholder built.
    built_control: Mutex<Option<String>>,
    /// Control file of the placeholder apt-get installed.
    installed_control: Mutex<Option<String>>,
    /// Files present in the staged repository when apt-get ran.
    staged_at_install: Mutex<Vec<String>>,
}

fn version_for(stem: &str) -> &'static str {
    match stem {
        "a" => "1.0",
        "b" => "2.5-1",
        _ => "0.1",
    }
}

/// Fake dpkg-deb, apt-ftparchive, apt-get and dpkg for one rooted layout.
fn host_runner(layout: &HostLayout, host: &Arc<Host>, apt_install: (i32, &str)) -> RecordingRunner {
    let repo_dir = layout.staging_root.join("amd64");
    let marker = layout.apt_lists_dir.join(format!(
        "{}_._Packages",
        repo_dir.to_string_lossy().replace('/', "_")
    ));
    let (install_code, install_output) = (apt_install.0, apt_install.1.to_string());

    let built = Arc::clone(host);
    let installed = Arc::clone(host);
    let status = Arc::clone(host);
    let staged = Arc::clone(host);
    let staged_dir = repo_dir.clone();

    RecordingRunner::new()
        .reply("dpkg --print-architecture", 0, "amd64\n")
        .respond("dpkg-deb -I", |inv| {
            let file = PathBuf::from(inv.args.last().cloned().unwrap_or_default());
            let stem = file
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            (
                0,
                format!(
                    " new Debian package, version 2.0.\n Package: {}\n Version: {}\n Architecture: all\n",
                    stem,
                    version_for(&stem)
                ),
            )
        })
        .respond("dpkg-deb --build", move |inv| {
            let dir = inv.args.last().cloned().unwrap_or_default();
            let control = fs::read_to_string(Path::new(&dir).join("DEBIAN/control")).unwrap();
            *built.built_control.lock().unwrap() = Some(control);
            fs::write(format!("{}.deb", dir), "deb").unwrap();
            (0, String::new())
        })
        .reply(
            "apt-ftparchive",
            0,
            "Package: a\nFilename: ./a.deb\n\nPackage: b\nFilename: ./b.deb\n",
        )
        .respond("apt-get update", move |_| {
            fs::create_dir_all(marker.parent().unwrap()).unwrap();
            let _ = fs::remove_file(&marker);
            std::os::unix::fs::symlink(repo_dir.join("Packages"), &marker).unwrap();
            (0, "Reading package lists... Done\n".to_string())
        })
        .respond("apt-get -o DPkg::Lock::Timeout=-1 install", move |_| {
            let mut names: Vec<String> = fs::read_dir(&staged_dir)
                .map(|entries| {
                    entries
                        .filter_map(|e| e.ok())
                        .map(|e| e.file_name().to_string_lossy().into_owned())
                        .collect()
                })
                .unwrap_or_default();
            names.sort();
            *staged.staged_at_install.lock().unwrap() = names;
            if install_code == 0 {
                let control = installed.built_control.lock().unwrap().clone();
                *installed.installed_control.lock().unwrap() = control;
            }
            (install_code, install_output.clone())
        })
        .respond("dpkg -s appkg-", move |_| {
            match status.installed_control.lock().unwrap().clone() {
                Some(control) => (0, format!("{}{}", control, PLACEHOLDER_STATUS)),
                None => (1, "dpkg-query: package is not installed".to_string()),
            }
        })
}

fn backend(root: &Path, runner: RecordingRunner) -> (DpkgBackend, Arc<RecordingRunner>) {
    let runner = Arc::new(runner);
    let ctx = BackendContext::new(runner.clone(), HostLayout::rooted_at(root), &root.join("data"))
        .with_lock_timing(LockTiming {
            poll_interval: Duration::from_millis(1),
            notice_delay: Duration::from_secs(60),
            timeout: None,
        })
        .with_install_retry(RetryPolicy::no_delay(3));
    (DpkgBackend::new(ctx), runner)
}

fn local_debs(root: &Path) -> (PathBuf, PathBuf) {
    let incoming = root.join("downloads");
    fs::create_dir_all(&incoming).unwrap();
    let a = incoming.join("a.deb");
    let b = incoming.join("b.deb");
    fs::write(&a, "deb a").unwrap();
    fs::write(&b, "deb b").unwrap();
    (a, b)
}

fn tracked(root: &Path, app: &str) -> Option<Vec<String>> {
    TrackingStore::for_data_dir(&root.join("data")).read(app).unwrap()
}

fn depends_line(control: &str) -> String {
    control
        .lines()
        .find_map(|l| l.strip_prefix("Depends: "))
        .unwrap_or_default()
        .to_string()
}

#[test]
fn local_debs_become_versioned_dependencies() {
    let dir = tempfile::tempdir().unwrap();
    let layout = HostLayout::rooted_at(dir.path());
    let host = Arc::new(Host::default());
    let (dpkg, runner) = backend(dir.path(), host_runner(&layout, &host, (0, "")));
    let (a, b) = local_debs(dir.path());

    let outcome = dpkg
        .install(
            "foo",
            &[a.to_string_lossy().into_owned(), b.to_string_lossy().into_owned()],
        )
        .unwrap();

    assert!(outcome.used_local_repo);
    assert!(outcome.changed);
    assert_eq!(outcome.packages, vec!["a", "b"]);
    assert!(!a.exists() && !b.exists(), "sources are moved into the repository");
    assert!(runner.was_called("apt-ftparchive packages ."));

    let staged = host.staged_at_install.lock().unwrap().clone();
    assert!(staged.contains(&"a.deb".to_string()));
    assert!(staged.contains(&"b.deb".to_string()));
    assert!(staged.contains(&"Packages".to_string()));

    let control = host.built_control.lock().unwrap().clone().unwrap();
    assert_eq!(depends_line(&control), "a (>= 1.0), b (>= 2.5-1)");
    assert!(control.contains("Name: foo\n"));

    assert!(!layout.staging_root.exists());
    assert_eq!(tracked(dir.path(), "foo"), Some(vec!["a".to_string(), "b".to_string()]));
}

#[test]
fn identical_reinstall_skips_apt() {
    let dir = tempfile::tempdir().unwrap();
    let layout = HostLayout::rooted_at(dir.path());
    let host = Arc::new(Host::default());
    let (dpkg, runner) = backend(dir.path(), host_runner(&layout, &host, (0, "")));
    let packages = vec!["zlib1g".to_string(), "curl".to_string()];

    assert!(dpkg.install("foo", &packages).unwrap().changed);
    let second = dpkg.install("foo", &packages).unwrap();

    assert!(!second.changed);
    assert_eq!(second.packages, vec!["curl", "zlib1g"]);
    assert_eq!(
        runner
            .calls_matching("apt-get -o DPkg::Lock::Timeout=-1 install")
            .len(),
        1
    );
    assert_eq!(runner.calls_matching("dpkg-deb --build").len(), 1);
}

#[test]
fn purge_without_record_touches_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let layout = HostLayout::rooted_at(dir.path());
    let host = Arc::new(Host::default());
    let (dpkg, runner) = backend(dir.path(), host_runner(&layout, &host, (0, "")));

    let outcome = dpkg.purge("never-installed", false).unwrap();

    assert!(outcome.removed.is_empty());
    assert!(!runner.was_called("apt-get"));
    assert!(!runner.was_called("fuser"));
    assert!(!runner.calls().iter().any(|c| c.elevated));
}

const DPKG_FAILURE: &str = "E: Sub-process /usr/bin/dpkg returned an error code (1)\n";

const UNSATISFIABLE: &str = "\
Some packages could not be installed.
The following packages have unmet dependencies:
 appkg-acbd18db : Depends: b but it is not installable
E: Unable to correct problems, you have held broken packages.
";

fn failed_local_install(apt_output: &str) -> (tempfile::TempDir, AppkgError, Arc<RecordingRunner>) {
    let dir = tempfile::tempdir().unwrap();
    let layout = HostLayout::rooted_at(dir.path());
    let host = Arc::new(Host::default());
    let (dpkg, runner) = backend(dir.path(), host_runner(&layout, &host, (100, apt_output)));
    let (a, b) = local_debs(dir.path());

    let err = dpkg
        .install(
            "foo",
            &[a.to_string_lossy().into_owned(), b.to_string_lossy().into_owned()],
        )
        .unwrap_err();
    (dir, err, runner)
}

#[test]
fn failed_install_still_removes_staging() {
    let (dir, err, runner) = failed_local_install(DPKG_FAILURE);

    assert!(
        matches!(err, AppkgError::BackendReportedError { ref tool, .. } if tool == "apt-get"),
        "unexpected: {:?}",
        err
    );
    assert!(!HostLayout::rooted_at(dir.path()).staging_root.exists());
    assert_eq!(tracked(dir.path(), "foo"), None);
    // nothing unsatisfiable was reported, so no diagnostics
    assert!(!runner.calls().iter().any(|c| c.command_line().contains("--dry-run")));
}

#[test]
fn unsatisfiable_dependency_is_diagnosed() {
    let (dir, err, runner) = failed_local_install(UNSATISFIABLE);

    assert!(matches!(err, AppkgError::BackendReportedError { .. }));
    let dry_run: Vec<_> = runner
        .calls()
        .into_iter()
        .filter(|c| c.command_line().contains("--dry-run"))
        .collect();
    assert_eq!(dry_run.len(), 1);
    assert!(dry_run[0].elevated);
    assert_eq!(dry_run[0].args.last().map(String::as_str), Some("b"));
    assert!(
        dry_run[0]
            .args
            .iter()
            .any(|a| a.starts_with("Dir::Etc::SourceList="))
    );
    assert!(runner.was_called("apt-cache policy b"));
    assert!(!HostLayout::rooted_at(dir.path()).staging_root.exists());
}
