//! # Backend Registry
//!
//! Maps a [`BackendKind`] to a factory producing the matching
//! [`PackageBackend`]. The kind itself is chosen at runtime: an explicit
//! `backend` setting wins, otherwise the host is probed for package-manager
//! binaries, then `/etc/os-release` is consulted, and finally the null
//! backend is used.

use super::apk::ApkBackend;
use super::context::BackendContext;
use super::dpkg::DpkgBackend;
use super::null::NullBackend;
use super::pacman::PacmanBackend;
use super::traits::PackageBackend;
use crate::error::{AppkgError, Result};
use crate::utils::distro::DistroFamily;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Dpkg,
    Apk,
    Pacman,
    Null,
}

impl BackendKind {
    pub const ALL: [BackendKind; 4] = [
        BackendKind::Dpkg,
        BackendKind::Apk,
        BackendKind::Pacman,
        BackendKind::Null,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Dpkg => "dpkg",
            BackendKind::Apk => "apk",
            BackendKind::Pacman => "pacman",
            BackendKind::Null => "null",
        }
    }

    /// Select the backend for this host.
    pub fn detect(preference: &str, os_release: &Path) -> Result<Self> {
        Self::detect_with(preference, os_release, |tool| which::which(tool).is_ok())
    }

    /// [`BackendKind::detect`] with an injectable PATH probe.
    pub fn detect_with<F>(preference: &str, os_release: &Path, on_path: F) -> Result<Self>
    where
        F: Fn(&str) -> bool,
    {
        let preference = preference.trim();
        if !preference.is_empty() && preference != "auto" {
            return preference.parse();
        }

        if on_path("dpkg") && on_path("apt-get") {
            return Ok(BackendKind::Dpkg);
        }
        if on_path("apk") {
            return Ok(BackendKind::Apk);
        }
        if on_path("pacman") {
            return Ok(BackendKind::Pacman);
        }

        Ok(match DistroFamily::detect_from(os_release) {
            DistroFamily::Debian => BackendKind::Dpkg,
            DistroFamily::Alpine => BackendKind::Apk,
            DistroFamily::Arch => BackendKind::Pacman,
            DistroFamily::Unknown => BackendKind::Null,
        })
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = AppkgError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "dpkg" | "apt" | "debian" => Ok(BackendKind::Dpkg),
            "apk" | "alpine" => Ok(BackendKind::Apk),
            "pacman" | "arch" => Ok(BackendKind::Pacman),
            "null" | "none" => Ok(BackendKind::Null),
            other => Err(AppkgError::ConfigError(format!(
                "Unknown backend '{}'. Valid: auto, dpkg, apk, pacman, null",
                other
            ))),
        }
    }
}

/// Factory function for creating backend instances
pub type BackendFactory = Box<dyn Fn(BackendContext) -> Box<dyn PackageBackend> + Send + Sync>;

pub struct BackendRegistry {
    factories: HashMap<BackendKind, BackendFactory>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    pub fn register<F>(&mut self, kind: BackendKind, factory: F)
    where
        F: Fn(BackendContext) -> Box<dyn PackageBackend> + Send + Sync + 'static,
    {
        self.factories.insert(kind, Box::new(factory));
    }

    fn register_defaults(&mut self) {
        self.register(BackendKind::Dpkg, |ctx| Box::new(DpkgBackend::new(ctx)));
        self.register(BackendKind::Apk, |ctx| Box::new(ApkBackend::new(ctx)));
        self.register(BackendKind::Pacman, |ctx| Box::new(PacmanBackend::new(ctx)));
        self.register(BackendKind::Null, |_| Box::new(NullBackend));
    }

    pub fn create(&self, kind: BackendKind, ctx: BackendContext) -> Result<Box<dyn PackageBackend>> {
        self.factories
            .get(&kind)
            .map(|factory| factory(ctx))
            .ok_or_else(|| AppkgError::ConfigError(format!("Backend '{}' is not registered", kind)))
    }

    pub fn registered(&self) -> Vec<BackendKind> {
        let mut kinds: Vec<_> = self.factories.keys().copied().collect();
        kinds.sort_by_key(|k| k.as_str());
        kinds
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        let mut registry = Self::new();
        registry.register_defaults();
        registry
    }
}

/// Build the backend for `kind` with the default registry.
pub fn create_backend(kind: BackendKind, ctx: BackendContext) -> Result<Box<dyn PackageBackend>> {
    BackendRegistry::default().create(kind, ctx)
}
