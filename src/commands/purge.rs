//! Purge command

use super::Session;
use crate::error::Result;
use crate::ui as output;
use crate::utils::machine_output;

pub struct PurgeOptions {
    pub app: String,
    /// The app is being reinstalled; keep its dependencies.
    pub update: bool,
    pub format: Option<String>,
}

pub fn run(session: &Session, options: PurgeOptions) -> Result<()> {
    crate::utils::sanitize::validate_app_name(&options.app)?;
    let outcome = session.backend.purge(&options.app, options.update)?;

    if let Some(format) = options.format.as_deref() {
        return machine_output::emit_v1("purge", session.kind.as_str(), &outcome, vec![], format);
    }

    if outcome.removed.is_empty() {
        output::info(&format!("Nothing to remove for {}", options.app));
    } else {
        output::success(&format!(
            "Removed packages for {}: {}",
            options.app,
            outcome.removed.join(" ")
        ));
    }
    Ok(())
}
