//! Turning raw install arguments into concrete package specs.
//!
//! Arguments may be bare names, absolute paths to package files, URLs or
//! glob patterns. The backend-specific parts (reading a package file,
//! searching for a pattern, pinning to a release) sit behind
//! [`SpecResolver`]; the walk over the argument list is shared.

use super::spec::PackageSpec;
use crate::error::{AppkgError, Result};
use crate::ui;
use crate::utils::download;
use crate::utils::retry::RetryPolicy;
use regex::Regex;
use std::path::{Path, PathBuf};

pub trait SpecResolver {
    /// Extension forced onto downloaded package files, e.g. `.deb`.
    fn package_extension(&self) -> &'static str;

    /// Spec describing the package inside a local file.
    fn describe_local(&self, file: &Path) -> Result<PackageSpec>;

    /// Concrete packages matching a `*` pattern. May be empty.
    fn expand_wildcard(&self, pattern: &str) -> Result<Vec<PackageSpec>>;

    /// Whether `-t <release>` is understood.
    fn accepts_repo_pin(&self) -> bool {
        false
    }

    fn pin(&self, name: &str, _repo: &str) -> Result<PackageSpec> {
        Ok(PackageSpec::bare(name))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub specs: Vec<PackageSpec>,
    /// Package files that must be staged before installing.
    pub local_files: Vec<PathBuf>,
    pub repo_pin: Option<String>,
}

impl Resolution {
    pub fn uses_local_repo(&self) -> bool {
        !self.local_files.is_empty()
    }
}

/// Anchored regex equivalent of a `*` glob.
pub fn wildcard_regex(pattern: &str) -> Result<Regex> {
    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    Regex::new(&format!("^{}$", body)).map_err(|e| AppkgError::InvalidPackageSpec {
        reason: format!("bad pattern: {}", e),
        packages: pattern.to_string(),
    })
}

/// Pull a `-t <release>` pair out of `args`.
fn take_repo_pin(args: &[String]) -> (Vec<String>, Option<String>) {
    let mut rest = Vec::with_capacity(args.len());
    let mut repo = None;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "-t" {
            if let Some(value) = iter.next() {
                repo = Some(value.clone());
            }
        } else {
            rest.push(arg.clone());
        }
    }
    (rest, repo)
}

pub fn resolve_args(
    resolver: &dyn SpecResolver,
    args: &[String],
    download_dir: &Path,
    download_policy: RetryPolicy,
) -> Result<Resolution> {
    let (args, repo_pin) = if resolver.accepts_repo_pin() {
        take_repo_pin(args)
    } else {
        (args.to_vec(), None)
    };

    let mut resolution = Resolution {
        repo_pin: repo_pin.clone(),
        ..Resolution::default()
    };

    for arg in args.iter().map(|a| a.trim()).filter(|a| !a.is_empty()) {
        if arg.contains("://") {
            let file = download::download_package(
                arg,
                download_dir,
                resolver.package_extension(),
                download_policy,
            )?;
            resolution.specs.push(resolver.describe_local(&file)?);
            resolution.local_files.push(file);
        } else if arg.starts_with('/') {
            let file = PathBuf::from(arg);
            if !file.is_file() {
                return Err(AppkgError::staging(
                    format!("local package does not exist: {}", arg),
                    "",
                ));
            }
            resolution.specs.push(resolver.describe_local(&file)?);
            resolution.local_files.push(file);
        } else if arg.contains('*') {
            let matches = resolver.expand_wildcard(arg)?;
            if matches.is_empty() {
                ui::warning(&format!("No packages match '{}'", arg));
                resolution.specs.push(PackageSpec::bare(arg));
            } else {
                ui::verbose(&format!("'{}' expanded to {} package(s)", arg, matches.len()));
                resolution.specs.extend(matches);
            }
        } else if let Some(repo) = &repo_pin {
            resolution.specs.push(resolver.pin(arg, repo)?);
        } else {
            resolution.specs.push(PackageSpec::parse(arg));
        }
    }

    Ok(resolution)
}
