//! Central project identity contract.
//!
//! Names that end up on disk (staging dirs, placeholder packages, signing keys)
//! are derived from here so a rename only touches one file.

pub const DISPLAY_NAME: &str = "appkg";
pub const BINARY_NAME: &str = "appkg";
pub const CONFIG_DIR_NAME: &str = "appkg";
pub const ENV_PREFIX: &str = "APPKG";

/// Prefix of synthesized placeholder packages (`appkg-<md5[..8]>`).
pub const PLACEHOLDER_PREFIX: &str = "appkg-";

/// Directory name under the temp dir that holds the local repository.
pub const LOCAL_REPO_DIR_NAME: &str = "appkg-local-packages";

/// Name used for generated repository databases, keys and config sections.
pub const LOCAL_REPO_NAME: &str = "appkg-local";

pub const PLACEHOLDER_MAINTAINER: &str = "appkg maintainers";

pub fn env_key(suffix: &str) -> String {
    format!("{}_{}", ENV_PREFIX, suffix)
}
