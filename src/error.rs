use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppkgError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error at '{path}': {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    StdIoError(#[from] std::io::Error),

    #[error("KDL parse error: {0}")]
    KdlError(#[from] kdl::KdlError),

    #[error(transparent)]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    YamlError(#[from] serde_yml::Error),

    /// Elevation through sudo could not be obtained
    #[error("Failed to get sudo permissions: {0}")]
    PrivilegeDenied(String),

    /// Only raised when a lock timeout is configured
    #[error("Gave up waiting for {backend} locks after {waited_secs} seconds")]
    LockTimeout { backend: String, waited_secs: u64 },

    #[error("Local repository staging failed: {message}")]
    StagingFailure { message: String, output: String },

    #[error(
        "The local package repository went missing while installing packages (gave up after {attempts} attempt(s)).\n\
         This usually happens if you try to install several apps at the same time in multiple terminals."
    )]
    TransientStagingRace { attempts: u32 },

    #[error("{tool} reported these errors:\n{}", .errors.join("\n"))]
    BackendReportedError {
        tool: String,
        errors: Vec<String>,
        output: String,
    },

    #[error(
        "{tool} exited with code {code} and no error output.\n\
         This could indicate system corruption (eg: storage corruption or unstable overclocking)."
    )]
    ExitCodeOnly {
        tool: String,
        code: i32,
        output: String,
    },

    #[error("Invalid package list: {reason}\n{packages}")]
    InvalidPackageSpec { reason: String, packages: String },

    #[error("Failed to download '{url}' after {attempts} attempt(s): {reason}")]
    DownloadFailed {
        url: String,
        attempts: u32,
        reason: String,
    },

    #[error("Query '{query}' failed: {reason}")]
    QueryFailed { query: String, reason: String },

    #[error("Package not found: {0}")]
    PackageNotFound(String),

    #[error("System command '{command}' failed: {reason}")]
    SystemCommandFailed { command: String, reason: String },

    #[error("System dependency missing: {0}")]
    DependencyMissing(String),

    /// Lock acquisition failed (tracking store file lock)
    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("Path error: {0}")]
    PathError(String),

    #[error("Operation interrupted by user")]
    Interrupted,

    #[error("{0}")]
    Other(String),
}

impl AppkgError {
    /// Full captured tool output attached to this failure, if any.
    pub fn raw_output(&self) -> Option<&str> {
        match self {
            AppkgError::StagingFailure { output, .. }
            | AppkgError::BackendReportedError { output, .. }
            | AppkgError::ExitCodeOnly { output, .. } => {
                if output.trim().is_empty() {
                    None
                } else {
                    Some(output)
                }
            }
            _ => None,
        }
    }

    pub(crate) fn staging(message: impl Into<String>, output: impl Into<String>) -> Self {
        AppkgError::StagingFailure {
            message: message.into(),
            output: output.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AppkgError::IoError {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, AppkgError>;
