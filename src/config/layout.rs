//! Every host path the backends read or edit, in one redirectable value.

use crate::project_identity;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostLayout {
    /// Root of the transient local repository; backends add an arch subdir.
    pub staging_root: PathBuf,
    /// Scratch space for downloads and placeholder packages.
    pub work_dir: PathBuf,
    pub apt_sources_list: PathBuf,
    pub apt_lists_dir: PathBuf,
    pub apk_repositories: PathBuf,
    pub pacman_conf: PathBuf,
    pub os_release: PathBuf,
    /// Prefix applied to the fixed lock-file paths (normally `/`).
    pub lock_root: PathBuf,
}

impl Default for HostLayout {
    fn default() -> Self {
        Self::system(std::env::temp_dir().join(project_identity::LOCAL_REPO_DIR_NAME))
    }
}

impl HostLayout {
    /// Real system paths with a custom staging root.
    pub fn system(staging_root: PathBuf) -> Self {
        Self {
            staging_root,
            work_dir: std::env::temp_dir(),
            apt_sources_list: PathBuf::from("/etc/apt/sources.list"),
            apt_lists_dir: PathBuf::from("/var/lib/apt/lists"),
            apk_repositories: PathBuf::from("/etc/apk/repositories"),
            pacman_conf: PathBuf::from("/etc/pacman.conf"),
            os_release: PathBuf::from("/etc/os-release"),
            lock_root: PathBuf::from("/"),
        }
    }

    /// Everything rooted below `root`, for tests and sandboxes.
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            staging_root: root.join("tmp").join(project_identity::LOCAL_REPO_DIR_NAME),
            work_dir: root.join("tmp"),
            apt_sources_list: root.join("etc/apt/sources.list"),
            apt_lists_dir: root.join("var/lib/apt/lists"),
            apk_repositories: root.join("etc/apk/repositories"),
            pacman_conf: root.join("etc/pacman.conf"),
            os_release: root.join("etc/os-release"),
            lock_root: root.to_path_buf(),
        }
    }

    /// Resolve a fixed absolute lock path (e.g. `/var/lib/dpkg/lock`) under `lock_root`.
    pub fn lock_path(&self, absolute: &str) -> PathBuf {
        self.lock_root.join(absolute.trim_start_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_paths_follow_root() {
        let layout = HostLayout::rooted_at(Path::new("/sandbox"));
        assert_eq!(
            layout.lock_path("/var/lib/dpkg/lock"),
            PathBuf::from("/sandbox/var/lib/dpkg/lock")
        );
        assert_eq!(
            HostLayout::default().lock_path("/lib/apk/db/lock"),
            PathBuf::from("/lib/apk/db/lock")
        );
    }
}
