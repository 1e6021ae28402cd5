//! Concrete package specifications produced from raw install arguments.

use crate::error::{AppkgError, Result};
use std::fmt;

/// `name` or `name (>= version)`, optionally remembering the release it was
/// pinned from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageSpec {
    pub name: String,
    pub min_version: Option<String>,
    pub repo: Option<String>,
}

impl PackageSpec {
    pub fn bare(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            min_version: None,
            repo: None,
        }
    }

    pub fn at_least(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            min_version: Some(version.into()),
            repo: None,
        }
    }

    pub fn pinned_to(mut self, repo: impl Into<String>) -> Self {
        self.repo = Some(repo.into());
        self
    }

    /// Parse `name` / `name (>= version)`. Anything else is kept verbatim as
    /// the name so that verification can reject it.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if let Some((name, rest)) = raw.split_once(" (>=")
            && let Some(version) = rest.trim().strip_suffix(')')
        {
            return Self::at_least(name.trim(), version.trim());
        }
        Self::bare(raw)
    }
}

impl fmt::Display for PackageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.min_version {
            Some(version) => write!(f, "{} (>= {})", self.name, version),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Reject specs that still contain wildcards, URLs or file paths.
pub fn verify_resolved(specs: &[PackageSpec]) -> Result<()> {
    let listing = || {
        specs
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    };

    for spec in specs {
        let rendered = spec.to_string();
        let reason = if rendered.contains('*') {
            Some("failed to remove all wildcards from package list")
        } else if rendered.contains("://") {
            Some("failed to remove all URLs from package list")
        } else if spec.name.contains('/') {
            Some("failed to remove all filenames from package list")
        } else {
            None
        };

        if let Some(reason) = reason {
            return Err(AppkgError::InvalidPackageSpec {
                reason: reason.to_string(),
                packages: listing(),
            });
        }
    }
    Ok(())
}

/// Names only, in input order.
pub fn names(specs: &[PackageSpec]) -> Vec<String> {
    specs.iter().map(|s| s.name.clone()).collect()
}
