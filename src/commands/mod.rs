pub mod backend;
pub mod completions;
pub mod install;
pub mod maintenance;
pub mod purge;
pub mod query;
pub mod repo;
pub mod settings;

use crate::config::Settings;
use crate::error::Result;
use crate::packages::{BackendContext, BackendKind, PackageBackend, create_backend};
use std::path::PathBuf;

/// The selected backend and where app data lives.
pub struct Session {
    pub kind: BackendKind,
    pub backend: Box<dyn PackageBackend>,
    pub data_dir: PathBuf,
}

impl Session {
    /// Load settings and select the backend. `backend` overrides the setting.
    pub fn open(backend: Option<&str>) -> Result<Self> {
        let settings = Settings::load()?;
        let ctx = BackendContext::from_settings(&settings)?;
        let preference = backend.unwrap_or(settings.backend()).to_string();
        let kind = BackendKind::detect(&preference, &ctx.layout.os_release)?;
        let data_dir = settings.data_dir()?;
        let backend = create_backend(kind, ctx)?;
        crate::ui::verbose(&format!("using the {} backend", kind));
        Ok(Self {
            kind,
            backend,
            data_dir,
        })
    }
}
