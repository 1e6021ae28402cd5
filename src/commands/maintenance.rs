//! Lock waiting, index refresh and the package-app status sweep.

use super::Session;
use crate::error::Result;
use crate::status;
use crate::ui as output;
use crate::utils::machine_output;

pub fn lock_wait(session: &Session) -> Result<()> {
    session.backend.wait_for_lock()?;
    output::success("Package manager is free");
    Ok(())
}

pub fn update(session: &Session) -> Result<()> {
    session.backend.update_indices()?;
    output::success("Package indices are up to date");
    Ok(())
}

pub fn refresh_status(session: &Session, format: Option<&str>) -> Result<()> {
    let report = status::refresh_all_package_app_status(session.backend.as_ref(), &session.data_dir)?;

    if let Some(format) = format {
        return machine_output::emit_v1("status refresh", session.kind.as_str(), &report, vec![], format);
    }

    output::header("Package-app status");
    output::keyval("installed", &report.installed.len().to_string());
    output::keyval("uninstalled", &report.uninstalled.len().to_string());
    if !report.hidden.is_empty() {
        output::keyval("hidden", &report.hidden.join(", "));
    }
    Ok(())
}
