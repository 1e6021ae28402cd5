//! Input validation for names that reach the filesystem or a package tool.

use crate::error::{AppkgError, Result};
use regex::Regex;
use std::sync::LazyLock;

/// Characters that would let a package argument smuggle extra shell or tool syntax.
static SHELL_DANGEROUS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[;`$(){}&<>\\'"\n\r\t]"#).expect("Invalid regex pattern"));

/// App names become file names under the tracking and status directories.
pub fn validate_app_name(app: &str) -> Result<()> {
    if app.trim().is_empty() {
        return Err(AppkgError::ConfigError("App name cannot be empty".to_string()));
    }
    if app.contains('/') || app == "." || app == ".." || app.contains('\0') {
        return Err(AppkgError::ConfigError(format!(
            "Invalid app name '{}': must not contain '/' or be '.'/'..'",
            app
        )));
    }
    Ok(())
}

/// Query targets are single package names; whitespace would split them into
/// several tool arguments.
pub fn validate_package_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(AppkgError::ConfigError(
            "Package name cannot be empty".to_string(),
        ));
    }
    if name.chars().any(char::is_whitespace) {
        return Err(AppkgError::ConfigError(format!(
            "Package name '{}' contains whitespace",
            name
        )));
    }
    if SHELL_DANGEROUS.is_match(name) {
        return Err(AppkgError::ConfigError(format!(
            "Package name '{}' contains forbidden characters",
            name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_names() {
        assert!(validate_app_name("Visual Studio Code").is_ok());
        assert!(validate_app_name("").is_err());
        assert!(validate_app_name("../etc").is_err());
        assert!(validate_app_name("..").is_err());
    }

    #[test]
    fn package_names() {
        assert!(validate_package_name("libc6:armhf").is_ok());
        assert!(validate_package_name("g++").is_ok());
        assert!(validate_package_name("two words").is_err());
        assert!(validate_package_name("x;rm").is_err());
    }
}
