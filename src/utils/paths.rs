use crate::error::{AppkgError, Result};
use crate::project_identity;
use directories::{ProjectDirs, UserDirs};
use std::path::{Path, PathBuf};

pub fn expand_home(path: &Path) -> Result<PathBuf> {
    let path_str = path.to_string_lossy();

    if !path_str.starts_with('~') {
        return Ok(path.to_path_buf());
    }

    let user_dirs = UserDirs::new()
        .ok_or_else(|| AppkgError::PathError("Could not determine user home directory".to_string()))?;

    let home = user_dirs.home_dir();

    if path_str == "~" {
        return Ok(home.to_path_buf());
    }

    let stripped = path_str
        .strip_prefix("~/")
        .ok_or_else(|| AppkgError::PathError(format!("Invalid path format: {}", path_str)))?;

    Ok(home.join(stripped))
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("com", project_identity::CONFIG_DIR_NAME, project_identity::CONFIG_DIR_NAME)
        .ok_or_else(|| AppkgError::PathError("Could not determine project directories".to_string()))
}

/// Config directory, overridable with `APPKG_CONFIG_DIR`.
pub fn config_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(project_identity::env_key("CONFIG_DIR")) {
        return Ok(PathBuf::from(dir));
    }
    Ok(project_dirs()?.config_dir().to_path_buf())
}

pub fn settings_file() -> Result<PathBuf> {
    Ok(config_dir()?.join("settings.kdl"))
}

/// Platform data directory used when no `data-dir` is configured.
pub fn default_data_dir() -> Result<PathBuf> {
    Ok(project_dirs()?.data_dir().to_path_buf())
}

/// `<data>/data/installed-packages`
pub fn tracking_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("data").join("installed-packages")
}

/// `<data>/data/status`
pub fn status_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("data").join("status")
}

/// `<data>/apps`
pub fn apps_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("apps")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_under_data_dir() {
        let data = Path::new("/srv/appkg");
        assert_eq!(
            tracking_dir(data),
            PathBuf::from("/srv/appkg/data/installed-packages")
        );
        assert_eq!(status_dir(data), PathBuf::from("/srv/appkg/data/status"));
        assert_eq!(apps_dir(data), PathBuf::from("/srv/appkg/apps"));
    }

    #[test]
    fn absolute_paths_are_not_expanded() {
        let p = Path::new("/opt/data");
        assert_eq!(expand_home(p).unwrap(), PathBuf::from("/opt/data"));
    }
}
