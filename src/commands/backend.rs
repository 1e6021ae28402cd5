//! Backend command
//!
//! Shows which package manager was selected and what it reports about the
//! host.

use super::Session;
use crate::error::Result;
use crate::ui as output;
use crate::utils::machine_output;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct BackendReport {
    pub backend: String,
    pub arch: String,
    pub data_dir: String,
}

pub fn run(session: &Session, format: Option<&str>) -> Result<()> {
    let report = BackendReport {
        backend: session.kind.to_string(),
        arch: session.backend.native_arch()?,
        data_dir: session.data_dir.display().to_string(),
    };

    if let Some(format) = format {
        return machine_output::emit_v1("backend", &report.backend, &report, vec![], format);
    }

    output::keyval("backend", &report.backend);
    output::keyval("arch", &report.arch);
    output::keyval("data dir", &report.data_dir);
    Ok(())
}

/// Print the placeholder package name that stands for `app`.
pub fn package_name(session: &Session, app: &str) -> Result<()> {
    crate::utils::sanitize::validate_app_name(app)?;
    println!("{}", session.backend.package_name_for_app(app));
    Ok(())
}
