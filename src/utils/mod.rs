pub mod distro;
pub mod download;
pub mod machine_output;
pub mod paths;
pub mod platform;
pub mod retry;
pub mod sanitize;
