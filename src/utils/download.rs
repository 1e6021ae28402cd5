use crate::error::{AppkgError, Result};
use crate::project_identity;
use crate::ui;
use crate::utils::retry::{RetryPolicy, execute_with_retry};
use reqwest::blocking::Client;
use std::fs;
use std::path::{Path, PathBuf};

/// Where a package URL is saved: `<dir>/<last path segment>`, ignoring a trailing
/// `/download` (SourceForge style) and forcing the backend's package extension.
pub fn target_path(url: &str, dir: &Path, extension: &str) -> PathBuf {
    let trimmed = url.strip_suffix("/download").unwrap_or(url);
    let base = trimmed
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("package");

    let mut name = base.to_string();
    if !name.ends_with(extension) {
        ui::info(&format!(
            "{} does not end with {}, renaming it to '{}{}'",
            name, extension, name, extension
        ));
        name.push_str(extension);
    }
    dir.join(name)
}

/// Download `url` into `dir`, retrying per `policy`. Partial files are removed
/// after every failed attempt.
pub fn download_package(
    url: &str,
    dir: &Path,
    extension: &str,
    policy: RetryPolicy,
) -> Result<PathBuf> {
    let target = target_path(url, dir, extension);
    let client = Client::builder()
        .user_agent(format!(
            "{}/{}",
            project_identity::BINARY_NAME,
            env!("CARGO_PKG_VERSION")
        ))
        .build()
        .map_err(|e| AppkgError::DownloadFailed {
            url: url.to_string(),
            attempts: 0,
            reason: e.to_string(),
        })?;

    ui::info(&format!("Downloading {}", url));
    let result = execute_with_retry(policy, "Package download", |_| {
        let outcome = fetch_to(&client, url, &target);
        if outcome.is_err() {
            let _ = fs::remove_file(&target);
        }
        outcome
    });

    result.map_err(|e| AppkgError::DownloadFailed {
        url: url.to_string(),
        attempts: policy.max_attempts,
        reason: e.to_string(),
    })?;

    if !target.exists() {
        return Err(AppkgError::DownloadFailed {
            url: url.to_string(),
            attempts: policy.max_attempts,
            reason: format!("downloaded package does not exist: {}", target.display()),
        });
    }
    Ok(target)
}

fn fetch_to(client: &Client, url: &str, target: &Path) -> Result<()> {
    let mut resp = client
        .get(url)
        .send()
        .map_err(|e| AppkgError::Other(format!("Network error: {}", e)))?;

    if !resp.status().is_success() {
        return Err(AppkgError::Other(format!("HTTP {}", resp.status())));
    }

    let mut file = fs::File::create(target).map_err(|e| AppkgError::io(target, e))?;
    resp.copy_to(&mut file)
        .map_err(|e| AppkgError::Other(format!("Network error: {}", e)))?;
    Ok(())
}
