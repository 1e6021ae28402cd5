//! The flat apt repository inside the staging directory.

use crate::config::HostLayout;
use crate::constants::EN_LOCALE;
use crate::error::{AppkgError, Result};
use crate::process::{CommandRunner, Invocation};
use crate::project_identity;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub(super) const PACKAGES_FILE: &str = "Packages";
const SOURCE_LIST: &str = "source.list";
const FTPARCHIVE_CONF: &str = "aptftp.conf";

pub(super) fn source_list(repo: &Path) -> PathBuf {
    repo.join(SOURCE_LIST)
}

/// File apt writes into its lists dir once it has read the local repository.
/// Its absence after a failed install means someone else wiped the repo.
pub(super) fn lists_marker(layout: &HostLayout, repo: &Path) -> PathBuf {
    let mangled = repo.to_string_lossy().replace('/', "_");
    layout.apt_lists_dir.join(format!("{}_._Packages", mangled))
}

/// Regenerate `Packages` and the trusted source list for `repo`.
pub(super) fn write_index(runner: &dyn CommandRunner, layout: &HostLayout, repo: &Path) -> Result<()> {
    if !repo.is_dir() {
        return Err(AppkgError::staging(
            format!("local repository does not exist: {}", repo.display()),
            "",
        ));
    }

    let result = runner.run(
        &Invocation::new("apt-ftparchive")
            .args(["packages", "."])
            .envs(EN_LOCALE)
            .current_dir(repo),
    )?;
    if !result.exited_ok() {
        return Err(AppkgError::staging(
            format!("apt-ftparchive failed to index the repository: {}", repo.display()),
            result.output,
        ));
    }

    let packages = repo.join(PACKAGES_FILE);
    let index = result.output.replace("Filename: ./", "Filename: ");
    fs::write(&packages, index).map_err(|e| AppkgError::io(&packages, e))?;

    let conf = repo.join(FTPARCHIVE_CONF);
    let origin = project_identity::LOCAL_REPO_DIR_NAME;
    fs::write(
        &conf,
        format!(
            "APT::FTPArchive::Release {{\nOrigin \"{origin}\";\nLabel \"{origin}\";\n}};\n"
        ),
    )
    .map_err(|e| AppkgError::io(&conf, e))?;

    let system_sources = match fs::read_to_string(&layout.apt_sources_list) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
        Err(e) => return Err(AppkgError::io(&layout.apt_sources_list, e)),
    };
    let list = source_list(repo);
    fs::write(
        &list,
        format!(
            "deb [trusted=yes] file:{}/ ./\n{}",
            repo.display(),
            system_sources
        ),
    )
    .map_err(|e| AppkgError::io(&list, e))
}

/// Drop apt's cached copy of the local repository index.
pub(super) fn forget_lists(runner: &dyn CommandRunner, layout: &HostLayout, repo: &Path) -> Result<()> {
    let marker = lists_marker(layout, repo);
    // apt links the entry into the repo, which may already be gone
    if fs::symlink_metadata(&marker).is_err() {
        return Ok(());
    }
    runner
        .run(
            &Invocation::new("rm")
                .arg("-f")
                .arg(marker.to_string_lossy())
                .elevated(),
        )?
        .check("rm")
        .map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::RecordingRunner;

    #[test]
    fn marker_name_mangles_slashes() {
        let layout = HostLayout::system(PathBuf::from("/tmp/appkg-local-packages"));
        assert_eq!(
            lists_marker(&layout, Path::new("/tmp/appkg-local-packages/amd64")),
            PathBuf::from("/var/lib/apt/lists/_tmp_appkg-local-packages_amd64_._Packages")
        );
    }

    #[test]
    fn index_rewrites_filenames_and_trusts_repo() {
        let dir = tempfile::tempdir().unwrap();
        let layout = HostLayout::rooted_at(dir.path());
        fs::create_dir_all(layout.apt_sources_list.parent().unwrap()).unwrap();
        fs::write(&layout.apt_sources_list, "deb http://deb.debian.org/debian bookworm main\n").unwrap();
        let repo = layout.staging_root.join("amd64");
        fs::create_dir_all(&repo).unwrap();

        let runner = RecordingRunner::new().reply(
            "apt-ftparchive packages .",
            0,
            "Package: a\nVersion: 1.0\nFilename: ./a.deb\n",
        );
        write_index(&runner, &layout, &repo).unwrap();

        let packages = fs::read_to_string(repo.join(PACKAGES_FILE)).unwrap();
        assert!(packages.contains("Filename: a.deb"));
        let list = fs::read_to_string(source_list(&repo)).unwrap();
        assert!(list.starts_with(&format!("deb [trusted=yes] file:{}/ ./\n", repo.display())));
        assert!(list.ends_with("bookworm main\n"));
        let conf = fs::read_to_string(repo.join(FTPARCHIVE_CONF)).unwrap();
        assert!(conf.contains("Origin \"appkg-local-packages\";"));
        assert_eq!(runner.calls()[0].cwd.as_deref(), Some(repo.as_path()));
    }

    #[test]
    fn ftparchive_failure_is_staging_failure_with_output() {
        let dir = tempfile::tempdir().unwrap();
        let layout = HostLayout::rooted_at(dir.path());
        let repo = layout.staging_root.join("amd64");
        fs::create_dir_all(&repo).unwrap();
        let runner = RecordingRunner::new().reply("apt-ftparchive", 100, "E: broken deb");
        let err = write_index(&runner, &layout, &repo).unwrap_err();
        assert!(matches!(err, AppkgError::StagingFailure { .. }));
        assert_eq!(err.raw_output(), Some("E: broken deb"));
    }

    #[test]
    fn missing_marker_needs_no_sudo() {
        let dir = tempfile::tempdir().unwrap();
        let layout = HostLayout::rooted_at(dir.path());
        let runner = RecordingRunner::new();
        forget_lists(&runner, &layout, &layout.staging_root.join("amd64")).unwrap();
        assert!(runner.calls().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn dangling_lists_link_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let layout = HostLayout::rooted_at(dir.path());
        let repo = layout.staging_root.join("amd64");
        fs::create_dir_all(&repo).unwrap();
        fs::write(repo.join(PACKAGES_FILE), "Package: a\n").unwrap();
        let marker = lists_marker(&layout, &repo);
        fs::create_dir_all(&layout.apt_lists_dir).unwrap();
        std::os::unix::fs::symlink(repo.join(PACKAGES_FILE), &marker).unwrap();
        fs::remove_dir_all(&layout.staging_root).unwrap();
        assert!(!marker.exists());

        let runner = RecordingRunner::new();
        forget_lists(&runner, &layout, &repo).unwrap();
        let rm = runner.calls_matching("rm -f");
        assert_eq!(rm.len(), 1);
        assert!(rm[0].elevated);
        assert_eq!(rm[0].args.last().map(String::as_str), marker.to_str());
    }
}
