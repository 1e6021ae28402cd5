//! Parsing of dpkg and apt-cache output.

/// `Candidate:` from `apt-cache policy`, `None` when absent or `(none)`.
pub(super) fn policy_candidate(output: &str) -> Option<String> {
    if output.contains("Unable to locate package") {
        return None;
    }
    output
        .lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix("Candidate:"))
        .map(str::trim)
        .filter(|candidate| !candidate.is_empty() && *candidate != "(none)")
        .map(String::from)
}

/// Version apt would pick for a pinned release, without any `+...` suffix.
///
/// Falls back to the first row after the `***` marker of the version table.
pub(super) fn pinned_version(output: &str) -> Option<String> {
    let lines: Vec<&str> = output.lines().collect();
    let mut version = None;
    for (i, line) in lines.iter().enumerate() {
        if let Some(candidate) = line.trim().strip_prefix("Candidate:") {
            version = Some(candidate.trim().to_string());
            break;
        }
        if line.contains("***")
            && let Some(next) = lines.get(i + 1).and_then(|l| l.split_whitespace().next())
        {
            version = Some(next.to_string());
            break;
        }
    }
    version
        .map(|v| v.split('+').next().unwrap_or_default().to_string())
        .filter(|v| !v.is_empty() && v != "(none)")
}

/// Package, Version and Architecture from `dpkg-deb -I`.
#[derive(Debug, Default, PartialEq, Eq)]
pub(super) struct DebHeader {
    pub package: String,
    pub version: String,
    pub architecture: String,
}

pub(super) fn deb_header(output: &str) -> DebHeader {
    let mut header = DebHeader::default();
    for line in output.lines().map(str::trim) {
        if let Some(v) = line.strip_prefix("Package:") {
            header.package = v.trim().to_string();
        } else if let Some(v) = line.strip_prefix("Version:") {
            header.version = v.trim().to_string();
        } else if let Some(v) = line.strip_prefix("Architecture:") {
            header.architecture = v.trim().to_string();
        }
    }
    header
}

/// Package names from `apt-cache search` lines (`name - description`).
pub(super) fn search_names(output: &str) -> impl Iterator<Item = &str> {
    output
        .lines()
        .filter_map(|line| line.split_whitespace().next())
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLICY: &str = "\
curl:
  Installed: 7.88.1-10+deb12u5
  Candidate: 7.88.1-10+deb12u8
  Version table:
     7.88.1-10+deb12u8 500
        500 http://deb.debian.org/debian bookworm/main amd64 Packages
 *** 7.88.1-10+deb12u5 100
        100 /var/lib/dpkg/status
";

    #[test]
    fn candidate_from_policy() {
        assert_eq!(policy_candidate(POLICY).as_deref(), Some("7.88.1-10+deb12u8"));
        assert_eq!(policy_candidate("foo:\n  Installed: (none)\n  Candidate: (none)\n"), None);
        assert_eq!(policy_candidate("N: Unable to locate package nope\n"), None);
        assert_eq!(policy_candidate(""), None);
    }

    #[test]
    fn pinned_version_drops_plus_suffix() {
        assert_eq!(pinned_version(POLICY).as_deref(), Some("7.88.1-10"));
        assert_eq!(
            pinned_version("foo:\n  Version table:\n *** 2.0-1 100\n     3.1-2 500\n").as_deref(),
            Some("3.1-2")
        );
        assert_eq!(pinned_version("foo:\n  Candidate: (none)\n"), None);
    }

    #[test]
    fn header_fields() {
        let out = " new Debian package, version 2.0.\n size 1234 bytes: control archive=512 bytes.\n Package: tool\n Version: 1.2-3\n Architecture: armhf\n Maintainer: someone\n";
        assert_eq!(
            deb_header(out),
            DebHeader {
                package: "tool".into(),
                version: "1.2-3".into(),
                architecture: "armhf".into(),
            }
        );
    }

    #[test]
    fn search_lines_yield_names() {
        let names: Vec<&str> =
            search_names("libfoo-dev - Foo headers\nlibbar-dev - Bar headers\n\n").collect();
        assert_eq!(names, vec!["libfoo-dev", "libbar-dev"]);
    }
}
