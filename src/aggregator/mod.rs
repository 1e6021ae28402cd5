//! Placeholder packages for the dpkg family.
//!
//! An app's dependencies are declared by one payload-free package whose
//! `Depends` line lists everything the app asked for. Removing that package
//! lets apt autoremove the rest.

use crate::constants::{EN_LOCALE, PLACEHOLDER_HASH_LEN, PLACEHOLDER_VERSION};
use crate::error::{AppkgError, Result};
use crate::process::{CommandRunner, Invocation};
use crate::project_identity;
use crate::ui;
use md5::{Digest, Md5};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// `appkg-` followed by the first 8 hex digits of md5(app).
pub fn placeholder_name(app: &str) -> String {
    let digest = hex::encode(Md5::digest(app.as_bytes()));
    format!(
        "{}{}",
        project_identity::PLACEHOLDER_PREFIX,
        &digest[..PLACEHOLDER_HASH_LEN]
    )
}

/// Sort by package name and keep one entry per name; a later constraint
/// replaces an earlier one. Joined with `", "`.
pub fn sort_and_dedupe<I, S>(specs: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut by_name: BTreeMap<String, String> = BTreeMap::new();
    for spec in specs {
        let spec = spec.as_ref().trim();
        if spec.is_empty() {
            continue;
        }
        let (name, constraint) = match spec.split_once(' ') {
            Some((name, rest)) => (name, rest.trim()),
            None => (spec, ""),
        };
        by_name.insert(name.to_string(), constraint.to_string());
    }

    by_name
        .into_iter()
        .map(|(name, constraint)| {
            if constraint.is_empty() {
                name
            } else {
                format!("{} {}", name, constraint)
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Split a `Depends:` value back into individual entries.
pub fn split_depends(depends: &str) -> Vec<String> {
    depends
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlFile {
    pub app: String,
    pub package: String,
    pub depends: String,
}

impl ControlFile {
    pub fn new(app: &str, depends: String) -> Self {
        Self {
            app: app.to_string(),
            package: placeholder_name(app),
            depends,
        }
    }

    pub fn render(&self) -> String {
        format!(
            "Maintainer: {maintainer}\n\
             Name: {app}\n\
             Description: Dummy package created by {name} to install dependencies for the '{app}' app\n\
             Version: {version}\n\
             Architecture: all\n\
             Priority: optional\n\
             Section: custom\n\
             Depends: {depends}\n\
             Package: {package}\n",
            maintainer = project_identity::PLACEHOLDER_MAINTAINER,
            name = project_identity::DISPLAY_NAME,
            app = self.app,
            version = PLACEHOLDER_VERSION,
            depends = self.depends,
            package = self.package,
        )
    }
}

/// True when `dpkg -s` output describes exactly `control` (ignoring `Status:`).
pub fn is_equivalent(installed_status: &str, control: &str) -> bool {
    fn normalize(text: &str, drop_status: bool) -> Vec<&str> {
        let mut lines: Vec<&str> = text
            .lines()
            .map(str::trim_end)
            .filter(|l| !l.is_empty())
            .filter(|l| !(drop_status && l.starts_with("Status: ")))
            .collect();
        lines.sort_unstable();
        lines
    }
    normalize(installed_status, true) == normalize(control, false)
}

/// Pull one field out of a `dpkg -s` style record.
pub fn control_field<'a>(record: &'a str, field: &str) -> Option<&'a str> {
    let prefix = format!("{}:", field);
    record
        .lines()
        .find_map(|line| line.strip_prefix(prefix.as_str()))
        .map(str::trim)
}

/// A placeholder ready to install, or already installed as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub control: ControlFile,
    /// Built `.deb`; `None` when the installed placeholder already matches.
    pub deb: Option<PathBuf>,
}

impl Placeholder {
    pub fn up_to_date(&self) -> bool {
        self.deb.is_none()
    }
}

/// `dpkg -s <pkg>` output when the package is installed.
pub fn installed_record(runner: &dyn CommandRunner, package: &str) -> Result<Option<String>> {
    let result = runner.run(
        &Invocation::new("dpkg")
            .args(["-s", package])
            .envs(EN_LOCALE),
    )?;
    if result.exited_ok() && result.output.contains("Status: install ok installed") {
        Ok(Some(result.output))
    } else {
        Ok(None)
    }
}

/// Build (or decide not to rebuild) the placeholder for `app` so that it
/// depends on `specs` plus whatever the installed placeholder already had.
pub fn synthesize(
    runner: &dyn CommandRunner,
    work_dir: &Path,
    app: &str,
    specs: &[String],
) -> Result<Placeholder> {
    let package = placeholder_name(app);
    ui::info(&format!(
        "Creating an empty apt-package to install the necessary apt packages...\nIt will be named: {}",
        package
    ));

    let installed = installed_record(runner, &package)?;
    let mut all_specs: Vec<String> = Vec::new();
    if let Some(record) = &installed {
        let inherited = control_field(record, "Depends").map(split_depends).unwrap_or_default();
        if !inherited.is_empty() {
            ui::info(&format!(
                "The {} package is already installed. Inheriting its dependencies: {}",
                package,
                inherited.join(", ")
            ));
        }
        all_specs.extend(inherited);
    }
    all_specs.extend(specs.iter().cloned());

    let control = ControlFile::new(app, sort_and_dedupe(&all_specs));
    let rendered = control.render();
    ui::indent(&format!("Depends: {}", control.depends), 0);

    if let Some(record) = &installed
        && is_equivalent(record, &rendered)
    {
        ui::info(&format!(
            "{} is already installed and no changes would be made. Skipping...",
            package
        ));
        return Ok(Placeholder { control, deb: None });
    }

    let deb = build(runner, work_dir, &package, &rendered)?;
    Ok(Placeholder {
        control,
        deb: Some(deb),
    })
}

fn build(runner: &dyn CommandRunner, work_dir: &Path, package: &str, control: &str) -> Result<PathBuf> {
    let pkg_dir = work_dir.join(package);
    let deb = work_dir.join(format!("{}.deb", package));
    let _ = fs::remove_dir_all(&pkg_dir);
    let _ = fs::remove_file(&deb);

    let debian = pkg_dir.join("DEBIAN");
    fs::create_dir_all(&debian).map_err(|e| AppkgError::io(&debian, e))?;
    let control_path = debian.join("control");
    fs::write(&control_path, control).map_err(|e| AppkgError::io(&control_path, e))?;
    set_package_permissions(&pkg_dir)?;

    let result = runner.run(
        &Invocation::new("dpkg-deb")
            .arg("--build")
            .arg(pkg_dir.to_string_lossy())
            .envs(EN_LOCALE),
    )?;
    let _ = fs::remove_dir_all(&pkg_dir);

    if !result.exited_ok() || !deb.is_file() {
        return Err(AppkgError::staging(
            format!("failed to create dummy deb {}", package),
            result.output,
        ));
    }
    Ok(deb)
}

fn set_package_permissions(pkg_dir: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        for dir in [pkg_dir.to_path_buf(), pkg_dir.join("DEBIAN")] {
            fs::set_permissions(&dir, fs::Permissions::from_mode(0o755))
                .map_err(|e| AppkgError::io(&dir, e))?;
        }
        let control = pkg_dir.join("DEBIAN").join("control");
        fs::set_permissions(&control, fs::Permissions::from_mode(0o644))
            .map_err(|e| AppkgError::io(&control, e))?;
    }
    #[cfg(not(unix))]
    let _ = pkg_dir;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::RecordingRunner;

    #[test]
    fn placeholder_name_is_stable_md5_prefix() {
        let name = placeholder_name("Zoom");
        assert!(name.starts_with("appkg-"));
        assert_eq!(name.len(), "appkg-".len() + 8);
        assert_eq!(name, placeholder_name("Zoom"));
        assert_ne!(name, placeholder_name("zoom"));
        assert!(name["appkg-".len()..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn dedupe_keeps_last_constraint_and_sorts() {
        let joined = sort_and_dedupe([
            "zlib1g",
            "b (>= 1.0)",
            "a",
            "b (>= 2.0)",
            "a (>= 0.5)",
        ]);
        assert_eq!(joined, "a (>= 0.5), b (>= 2.0), zlib1g");
    }

    #[test]
    fn dedupe_of_nothing_is_empty() {
        assert_eq!(sort_and_dedupe(Vec::<String>::new()), "");
    }

    #[test]
    fn control_field_order_is_fixed() {
        let control = ControlFile::new("foo", "a (>= 1.0), b (>= 2.0)".into()).render();
        let keys: Vec<&str> = control
            .lines()
            .filter_map(|l| l.split_once(':').map(|(k, _)| k))
            .collect();
        assert_eq!(
            keys,
            vec![
                "Maintainer",
                "Name",
                "Description",
                "Version",
                "Architecture",
                "Priority",
                "Section",
                "Depends",
                "Package"
            ]
        );
        assert!(control.contains("Depends: a (>= 1.0), b (>= 2.0)\n"));
    }

    #[test]
    fn equivalence_ignores_status_and_order() {
        let control = ControlFile::new("foo", "a".into()).render();
        let mut lines: Vec<&str> = control.lines().collect();
        lines.reverse();
        let installed = format!("Status: install ok installed\n{}\n", lines.join("\n"));
        assert!(is_equivalent(&installed, &control));

        let changed = ControlFile::new("foo", "a, b".into()).render();
        assert!(!is_equivalent(&installed, &changed));
    }

    #[test]
    fn synthesize_skips_build_when_installed_placeholder_matches() {
        let dir = tempfile::tempdir().unwrap();
        let control = ControlFile::new("foo", "a, b".into()).render();
        let record = format!("Status: install ok installed\n{}", control);
        let runner = RecordingRunner::new().reply("dpkg -s", 0, &record);

        let placeholder = synthesize(&runner, dir.path(), "foo", &["b".into()]).unwrap();
        assert!(placeholder.up_to_date());
        assert_eq!(placeholder.control.depends, "a, b");
        assert!(!runner.was_called("dpkg-deb"));
    }

    #[test]
    fn synthesize_merges_inherited_depends_and_builds() {
        let dir = tempfile::tempdir().unwrap();
        let name = placeholder_name("foo");
        let record = format!("Package: {}\nStatus: install ok installed\nDepends: old\n", name);
        let deb = dir.path().join(format!("{}.deb", name));
        let deb_for_reply = deb.clone();
        let runner = RecordingRunner::new()
            .reply("dpkg -s", 0, &record)
            .respond("dpkg-deb --build", move |_| {
                fs::write(&deb_for_reply, "deb").unwrap();
                (0, String::new())
            });

        let placeholder = synthesize(&runner, dir.path(), "foo", &["new (>= 2)".into()]).unwrap();
        assert_eq!(placeholder.control.depends, "new (>= 2), old");
        assert_eq!(placeholder.deb.as_deref(), Some(deb.as_path()));
        assert!(!dir.path().join(&name).exists());
    }

    #[test]
    fn synthesize_reports_build_failure_with_output() {
        let dir = tempfile::tempdir().unwrap();
        let runner = RecordingRunner::new()
            .reply("dpkg -s", 1, "dpkg-query: package 'x' is not installed")
            .reply("dpkg-deb --build", 2, "dpkg-deb: error: bad control");
        let err = synthesize(&runner, dir.path(), "foo", &["a".into()]).unwrap_err();
        assert_eq!(err.raw_output(), Some("dpkg-deb: error: bad control"));
    }
}
