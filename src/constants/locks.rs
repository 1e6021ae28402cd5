// Lock files probed with `fuser` before mutating a package database

pub const DPKG_LOCK_FILES: &[&str] = &[
    "/var/lib/dpkg/lock",
    "/var/lib/apt/lists/lock",
    "/var/cache/apt/archives/lock",
    "/var/log/unattended-upgrades/unattended-upgrades.log",
    "/var/lib/dpkg/lock-frontend",
    "/var/cache/debconf/config.dat",
];

pub const APK_LOCK_FILES: &[&str] = &["/lib/apk/db/lock"];

pub const PACMAN_LOCK_FILES: &[&str] = &["/var/lib/pacman/db.lck"];

/// Canary output fragments meaning "someone else holds the apt/dpkg lock".
pub const APT_LOCK_MARKERS: &[&str] = &[
    "Could not get lock",
    "could not get lock",
    "Unable to lock",
    "unable to lock",
    "is locked by another process",
];

pub const PACMAN_LOCK_MARKERS: &[&str] = &[
    "could not lock database",
    "failed to lock database",
    "is locked by another process",
];
