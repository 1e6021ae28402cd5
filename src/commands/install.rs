//! Install command
//!
//! Installs the packages an app needs and remembers them for a later purge.

use super::Session;
use crate::error::Result;
use crate::ui as output;
use crate::utils::machine_output;

pub struct InstallOptions {
    pub app: String,
    pub packages: Vec<String>,
    pub format: Option<String>,
}

pub fn run(session: &Session, options: InstallOptions) -> Result<()> {
    crate::utils::sanitize::validate_app_name(&options.app)?;
    let outcome = session.backend.install(&options.app, &options.packages)?;

    if let Some(format) = options.format.as_deref() {
        return machine_output::emit_v1("install", session.kind.as_str(), &outcome, vec![], format);
    }

    if outcome.changed {
        output::success(&format!(
            "Installed packages for {}: {}",
            options.app,
            outcome.packages.join(" ")
        ));
    } else {
        output::info(&format!(
            "Packages for {} were already installed: {}",
            options.app,
            outcome.packages.join(" ")
        ));
    }
    Ok(())
}
