//! Settings Module
//!
//! Runtime knobs for backend selection, lock waiting, retries and the
//! on-disk layout, persisted as `settings.kdl` in the config directory.

use crate::error::{AppkgError, Result};
use crate::project_identity;
use crate::utils::paths;
use crate::utils::retry::RetryPolicy;
use kdl::{KdlDocument, KdlValue};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const VALID_KEYS: &[&str] = &[
    "backend",
    "color",
    "lock-timeout",
    "lock-poll-ms",
    "lock-notice-secs",
    "install-attempts",
    "install-retry-delay-ms",
    "download-attempts",
    "download-retry-delay-ms",
    "staging-root",
    "data-dir",
];

/// Keys that may be overridden from the environment (`APPKG_<KEY>`).
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("backend", "BACKEND"),
    ("staging-root", "STAGING_ROOT"),
    ("data-dir", "DATA_DIR"),
];

/// Settings manager
pub struct Settings {
    settings_file: PathBuf,
    values: HashMap<String, String>,
    overrides: HashMap<String, String>,
}

impl Settings {
    /// Load settings from file, or create default
    pub fn load() -> Result<Self> {
        Self::load_from(paths::settings_file()?)
    }

    pub fn load_from(settings_file: PathBuf) -> Result<Self> {
        let values = if settings_file.exists() {
            parse_settings(&settings_file)?
        } else {
            Self::defaults()
        };

        let mut overrides = HashMap::new();
        for (key, suffix) in ENV_OVERRIDES {
            if let Ok(value) = std::env::var(project_identity::env_key(suffix))
                && !value.trim().is_empty()
            {
                overrides.insert((*key).to_string(), value);
            }
        }

        let settings = Self {
            settings_file,
            values,
            overrides,
        };
        for (key, value) in settings.effective() {
            settings.validate_value(&key, &value)?;
        }
        Ok(settings)
    }

    /// Get a setting value; environment overrides win over the file.
    pub fn get(&self, key: &str) -> Option<&String> {
        self.overrides.get(key).or_else(|| self.values.get(key))
    }

    /// Set a setting value
    pub fn set(&mut self, key: String, value: String) -> Result<()> {
        self.validate_key(&key)?;
        self.validate_value(&key, &value)?;
        self.values.insert(key, value);
        self.save()
    }

    /// Reset a setting to default
    pub fn reset(&mut self, key: &str) -> Result<()> {
        if let Some(default) = Self::defaults().get(key) {
            self.values.insert(key.to_string(), default.clone());
            self.save()?;
        } else {
            return Err(AppkgError::ConfigError(format!("Unknown setting: '{}'", key)));
        }

        Ok(())
    }

    /// Effective values, sorted by key.
    pub fn effective(&self) -> BTreeMap<String, String> {
        let mut all: BTreeMap<String, String> = self
            .values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (k, v) in &self.overrides {
            all.insert(k.clone(), v.clone());
        }
        all
    }

    pub fn file(&self) -> &Path {
        &self.settings_file
    }

    fn get_u64(&self, key: &str) -> u64 {
        self.get(key)
            .and_then(|v| v.parse().ok())
            .or_else(|| Self::defaults().get(key).and_then(|v| v.parse().ok()))
            .unwrap_or(0)
    }

    pub fn backend(&self) -> &str {
        self.get("backend").map(String::as_str).unwrap_or("auto")
    }

    pub fn color(&self) -> &str {
        self.get("color").map(String::as_str).unwrap_or("auto")
    }

    /// `None` means wait for package-manager locks indefinitely.
    pub fn lock_timeout(&self) -> Option<Duration> {
        match self.get_u64("lock-timeout") {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn lock_poll_interval(&self) -> Duration {
        Duration::from_millis(self.get_u64("lock-poll-ms"))
    }

    pub fn lock_notice_delay(&self) -> Duration {
        Duration::from_secs(self.get_u64("lock-notice-secs"))
    }

    pub fn install_retry(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.get_u64("install-attempts") as u32,
            Duration::from_millis(self.get_u64("install-retry-delay-ms")),
        )
    }

    pub fn download_retry(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.get_u64("download-attempts") as u32,
            Duration::from_millis(self.get_u64("download-retry-delay-ms")),
        )
    }

    pub fn staging_root(&self) -> PathBuf {
        self.get("staging-root")
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::temp_dir().join(project_identity::LOCAL_REPO_DIR_NAME))
    }

    /// Configured data dir, else the platform data dir.
    pub fn data_dir(&self) -> Result<PathBuf> {
        match self.get("data-dir").filter(|v| !v.trim().is_empty()) {
            Some(dir) => paths::expand_home(Path::new(dir)),
            None => paths::default_data_dir(),
        }
    }

    /// Validate setting key
    fn validate_key(&self, key: &str) -> Result<()> {
        if !VALID_KEYS.contains(&key) {
            return Err(AppkgError::ConfigError(format!(
                "Unknown setting: '{}'. Valid settings: {}",
                key,
                VALID_KEYS.join(", ")
            )));
        }

        Ok(())
    }

    /// Validate setting value
    fn validate_value(&self, key: &str, value: &str) -> Result<()> {
        let one_of = |valid: &[&str]| -> Result<()> {
            if valid.contains(&value) {
                Ok(())
            } else {
                Err(AppkgError::ConfigError(format!(
                    "Invalid value for '{}': '{}'. Valid: {}",
                    key,
                    value,
                    valid.join(", ")
                )))
            }
        };

        match key {
            "backend" => one_of(&["auto", "dpkg", "apk", "pacman", "null"])?,
            "color" => one_of(&["auto", "always", "never"])?,
            "lock-timeout" | "lock-poll-ms" | "lock-notice-secs" | "install-retry-delay-ms"
            | "download-retry-delay-ms" => {
                value.parse::<u64>().map_err(|_| {
                    AppkgError::ConfigError(format!(
                        "Invalid value for '{}': '{}'. Expected a non-negative integer",
                        key, value
                    ))
                })?;
            }
            "install-attempts" | "download-attempts" => match value.parse::<u32>() {
                Ok(n) if n >= 1 => {}
                _ => {
                    return Err(AppkgError::ConfigError(format!(
                        "Invalid value for '{}': '{}'. Expected an integer >= 1",
                        key, value
                    )));
                }
            },
            "staging-root" => {
                let path = Path::new(value);
                if !path.is_absolute() || path.parent().is_none() {
                    return Err(AppkgError::ConfigError(format!(
                        "'staging-root' must be an absolute path below '/', got '{}'",
                        value
                    )));
                }
            }
            "data-dir" => {
                if !value.is_empty() && !value.starts_with('/') && !value.starts_with('~') {
                    return Err(AppkgError::ConfigError(format!(
                        "'data-dir' must be absolute or start with '~', got '{}'",
                        value
                    )));
                }
            }
            _ => {}
        }

        Ok(())
    }

    /// Save settings to file
    fn save(&self) -> Result<()> {
        if let Some(parent) = self.settings_file.parent() {
            fs::create_dir_all(parent).map_err(|e| AppkgError::io(parent, e))?;
        }

        fs::write(&self.settings_file, render_settings(&self.values))
            .map_err(|e| AppkgError::io(&self.settings_file, e))?;

        Ok(())
    }

    /// Get default settings
    fn defaults() -> HashMap<String, String> {
        let staging_root = std::env::temp_dir().join(project_identity::LOCAL_REPO_DIR_NAME);
        [
            ("backend", "auto".to_string()),
            ("color", "auto".to_string()),
            ("lock-timeout", "0".to_string()),
            ("lock-poll-ms", "1000".to_string()),
            ("lock-notice-secs", "5".to_string()),
            ("install-attempts", "5".to_string()),
            ("install-retry-delay-ms", "500".to_string()),
            ("download-attempts", "3".to_string()),
            ("download-retry-delay-ms", "1000".to_string()),
            ("staging-root", staging_root.to_string_lossy().into_owned()),
            ("data-dir", String::new()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }
}

fn render_settings(values: &HashMap<String, String>) -> String {
    let mut content = format!(
        "// {} settings\n// Generated by `{} settings`\n\nsettings {{\n",
        project_identity::DISPLAY_NAME,
        project_identity::BINARY_NAME
    );

    let sorted: BTreeMap<_, _> = values.iter().collect();
    for (key, value) in sorted {
        content.push_str(&format!("    {} {:?}\n", key, value));
    }

    content.push_str("}\n");
    content
}

/// Parse settings from KDL file
fn parse_settings(path: &Path) -> Result<HashMap<String, String>> {
    let content = fs::read_to_string(path).map_err(|e| AppkgError::io(path, e))?;
    parse_settings_str(&content)
}

fn parse_settings_str(content: &str) -> Result<HashMap<String, String>> {
    let doc: KdlDocument = content.parse().map_err(|e: kdl::KdlError| {
        AppkgError::ConfigError(format!("settings.kdl parsing error: {}", e))
    })?;

    // Merge with defaults to ensure all keys exist
    let mut values = Settings::defaults();

    if let Some(children) = doc.get("settings").and_then(|node| node.children()) {
        for child in children.nodes() {
            let key = child.name().value();
            if let Some(entry) = child.entries().first() {
                values.insert(key.to_string(), kdl_value_to_string(entry.value()));
            }
        }
    }

    Ok(values)
}

fn kdl_value_to_string(value: &KdlValue) -> String {
    if let Some(s) = value.as_string() {
        s.to_string()
    } else if let Some(i) = value.as_integer() {
        i.to_string()
    } else if let Some(b) = value.as_bool() {
        b.to_string()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare() -> Settings {
        Settings {
            settings_file: PathBuf::from("/tmp/test.kdl"),
            values: Settings::defaults(),
            overrides: HashMap::new(),
        }
    }

    #[test]
    fn test_defaults() {
        let s = bare();
        assert_eq!(s.backend(), "auto");
        assert_eq!(s.lock_timeout(), None);
        assert_eq!(s.lock_poll_interval(), Duration::from_secs(1));
        assert_eq!(s.lock_notice_delay(), Duration::from_secs(5));
        assert_eq!(s.install_retry().max_attempts, 5);
        assert_eq!(s.download_retry().max_attempts, 3);
    }

    #[test]
    fn test_validate_key() {
        let s = bare();
        assert!(s.validate_key("lock-timeout").is_ok());
        assert!(s.validate_key("invalid").is_err());
    }

    #[test]
    fn test_validate_values() {
        let s = bare();
        assert!(s.validate_value("backend", "apk").is_ok());
        assert!(s.validate_value("backend", "yum").is_err());
        assert!(s.validate_value("install-attempts", "0").is_err());
        assert!(s.validate_value("lock-timeout", "-3").is_err());
        assert!(s.validate_value("staging-root", "relative/dir").is_err());
        assert!(s.validate_value("staging-root", "/").is_err());
        assert!(s.validate_value("data-dir", "~/apps").is_ok());
    }

    #[test]
    fn parses_kdl_with_mixed_value_types() {
        let values = parse_settings_str(
            r#"
settings {
    backend "pacman"
    lock-timeout 120
    install-attempts "7"
}
"#,
        )
        .unwrap();
        assert_eq!(values.get("backend").map(String::as_str), Some("pacman"));
        assert_eq!(values.get("lock-timeout").map(String::as_str), Some("120"));
        assert_eq!(values.get("install-attempts").map(String::as_str), Some("7"));
        assert_eq!(values.get("download-attempts").map(String::as_str), Some("3"));
    }

    #[test]
    fn set_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("settings.kdl");
        let mut s = Settings::load_from(file.clone()).unwrap();
        s.set("lock-timeout".into(), "30".into()).unwrap();

        let reloaded = Settings::load_from(file).unwrap();
        assert_eq!(reloaded.lock_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn reset_unknown_key_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = Settings::load_from(dir.path().join("settings.kdl")).unwrap();
        assert!(s.reset("nope").is_err());
        assert!(s.reset("backend").is_ok());
    }
}
