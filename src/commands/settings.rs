//! Settings Command
//!
//! Show and change `settings.kdl`.

use crate::cli::args::SettingsCommand;
use crate::config::settings::Settings;
use crate::error::Result;
use crate::ui as output;

pub fn run(command: &SettingsCommand) -> Result<()> {
    let mut settings = Settings::load()?;
    match command {
        SettingsCommand::Show => show_all_settings(&settings),
        SettingsCommand::Set { key, value } => {
            settings.set(key.clone(), value.clone())?;
            output::success(&format!("Set {} = {}", key, value));
        }
        SettingsCommand::Reset { key } => {
            settings.reset(key)?;
            output::success(&format!("Reset {} to default", key));
        }
    }
    Ok(())
}

fn show_all_settings(settings: &Settings) {
    output::header("Current Settings");
    output::keyval("file", &settings.file().display().to_string());
    for (key, value) in settings.effective() {
        if value.is_empty() {
            println!("  {}: (default)", key);
        } else {
            println!("  {}: {}", key, value);
        }
    }

    println!();
    output::info("Valid values:");
    println!("  backend:      auto, dpkg, apk, pacman, null");
    println!("  color:        auto, always, never");
    println!("  lock-timeout: seconds, 0 waits forever");
    println!("  *-attempts:   1 or more");
}
