//! Which packages were installed on behalf of which app.
//!
//! One flat file per app under `<data>/data/installed-packages`, one package
//! name per line. Writers serialize on an fs2 lock and replace files atomically.

use crate::error::{AppkgError, Result};
use crate::utils::paths;
use crate::utils::sanitize::validate_app_name;
use fs2::FileExt;
use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

const LOCK_FILE_NAME: &str = ".lock";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingStore {
    dir: PathBuf,
}

/// Held while a writer owns the tracking directory.
struct StoreLock {
    _file: fs::File,
}

impl TrackingStore {
    /// Store rooted at `<data_dir>/data/installed-packages`.
    pub fn for_data_dir(data_dir: &Path) -> Self {
        Self::new(paths::tracking_dir(data_dir))
    }

    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, app: &str) -> Result<PathBuf> {
        validate_app_name(app)?;
        Ok(self.dir.join(app))
    }

    pub fn exists(&self, app: &str) -> Result<bool> {
        Ok(self.path_for(app)?.is_file())
    }

    /// Tracked names, or `None` when the app has no record.
    pub fn read(&self, app: &str) -> Result<Option<Vec<String>>> {
        let path = self.path_for(app)?;
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(
                content.split_whitespace().map(String::from).collect(),
            )),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppkgError::io(path, e)),
        }
    }

    /// Replace the record with `names`, sorted and de-duplicated.
    pub fn record<I, S>(&self, app: &str, names: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let path = self.path_for(app)?;
        let unique: BTreeSet<String> = names
            .into_iter()
            .map(|n| n.as_ref().trim().to_string())
            .filter(|n| !n.is_empty())
            .collect();

        let mut content = String::new();
        for name in &unique {
            content.push_str(name);
            content.push('\n');
        }

        let _lock = self.lock()?;
        let tmp = self.dir.join(format!(".{}.tmp", app));
        let mut file = fs::File::create(&tmp).map_err(|e| AppkgError::io(&tmp, e))?;
        file.write_all(content.as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|e| AppkgError::io(&tmp, e))?;
        drop(file);
        fs::rename(&tmp, &path).map_err(|e| AppkgError::io(&path, e))
    }

    /// Delete the record; a missing record is not an error.
    pub fn remove(&self, app: &str) -> Result<()> {
        let path = self.path_for(app)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppkgError::io(path, e)),
        }
    }

    fn lock(&self) -> Result<StoreLock> {
        fs::create_dir_all(&self.dir).map_err(|e| AppkgError::io(&self.dir, e))?;
        let lock_path = self.dir.join(LOCK_FILE_NAME);
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| AppkgError::io(&lock_path, e))?;
        file.lock_exclusive().map_err(|e| {
            AppkgError::LockError(format!("{}: {}", lock_path.display(), e))
        })?;
        Ok(StoreLock { _file: file })
    }
}
