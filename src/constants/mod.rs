pub mod common;
pub mod locks;

pub use common::{
    APK_INIT_PROVIDERS, APT_CANARY_PACKAGE, C_LOCALE, EN_LOCALE, PACMAN_CANARY_DBPATH,
    PACMAN_INIT_PROVIDERS, PLACEHOLDER_HASH_LEN, PLACEHOLDER_VERSION,
};
pub use locks::{
    APK_LOCK_FILES, APT_LOCK_MARKERS, DPKG_LOCK_FILES, PACMAN_LOCK_FILES, PACMAN_LOCK_MARKERS,
};
