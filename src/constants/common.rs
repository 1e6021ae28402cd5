// Common constants used throughout the codebase

/// Locale forced on apt/dpkg and pacman so output text stays classifiable.
pub const EN_LOCALE: &[(&str, &str)] = &[("LANG", "en_US.UTF-8"), ("LC_ALL", "en_US.UTF-8")];

/// Locale forced on apk.
pub const C_LOCALE: &[(&str, &str)] = &[("LANG", "C")];

/// Name that no repository will ever ship; installing it only probes the lock.
pub const APT_CANARY_PACKAGE: &str = "lkqecjhxwqekc";

/// Throwaway database path for the pacman lock canary.
pub const PACMAN_CANARY_DBPATH: &str = "/tmp/appkg-pacman-db-check";

/// Number of md5 hex characters kept in placeholder package names.
pub const PLACEHOLDER_HASH_LEN: usize = 8;

/// Version stamped on every placeholder package.
pub const PLACEHOLDER_VERSION: &str = "1.0";

/// Package names that stand for "an init system" rather than a real package.
pub const APK_INIT_PROVIDERS: &[&str] = &["openrc", "dinit", "s6", "busybox", "runit"];
pub const PACMAN_INIT_PROVIDERS: &[&str] = &["openrc", "systemd", "dinit", "s6", "runit"];
