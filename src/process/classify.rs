//! Per-backend line classification.
//!
//! Package managers report failure in free text and the wording drifts between
//! releases. Each backend owns a versioned [`PatternTable`]; supporting a new
//! tool release means adding matchers here, not touching install logic.

use regex::Regex;
use std::sync::LazyLock;

static ANSI_ESCAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*[a-zA-Z]").expect("Invalid regex pattern"));

/// Remove terminal color/formatting sequences.
pub fn strip_ansi(text: &str) -> String {
    ANSI_ESCAPE.replace_all(text, "").into_owned()
}

/// One rule, applied to an ANSI-stripped, trimmed line.
#[derive(Debug, Clone)]
pub enum LineMatcher {
    Prefix(&'static str),
    Contains(&'static str),
    /// Every fragment must be present.
    ContainsAll(&'static [&'static str]),
    ContainsIgnoreCase(&'static str),
    Pattern(Regex),
}

impl LineMatcher {
    pub fn matches(&self, line: &str) -> bool {
        match self {
            LineMatcher::Prefix(p) => line.starts_with(p),
            LineMatcher::Contains(s) => line.contains(s),
            LineMatcher::ContainsAll(parts) => parts.iter().all(|p| line.contains(p)),
            LineMatcher::ContainsIgnoreCase(s) => line.to_lowercase().contains(s),
            LineMatcher::Pattern(re) => re.is_match(line),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PatternTable {
    pub name: &'static str,
    pub version: u32,
    /// Always shown, even if a noise rule would match.
    pub keep: Vec<LineMatcher>,
    pub noise: Vec<LineMatcher>,
    pub errors: Vec<LineMatcher>,
}

impl PatternTable {
    pub fn empty(name: &'static str) -> Self {
        Self {
            name,
            version: 1,
            keep: Vec::new(),
            noise: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn with_noise(mut self, matcher: LineMatcher) -> Self {
        self.noise.push(matcher);
        self
    }

    pub fn with_error(mut self, matcher: LineMatcher) -> Self {
        self.errors.push(matcher);
        self
    }

    pub fn with_keep(mut self, matcher: LineMatcher) -> Self {
        self.keep.push(matcher);
        self
    }

    /// True if the line carries no diagnostic value (including blank lines).
    pub fn is_noise(&self, raw_line: &str) -> bool {
        let stripped = strip_ansi(raw_line);
        let line = stripped.trim();
        if line.is_empty() {
            return true;
        }
        if self.keep.iter().any(|m| m.matches(line)) {
            return false;
        }
        self.noise.iter().any(|m| m.matches(line))
    }

    pub fn is_error(&self, raw_line: &str) -> bool {
        let stripped = strip_ansi(raw_line);
        let line = stripped.trim();
        !line.is_empty() && self.errors.iter().any(|m| m.matches(line))
    }

    /// Text with noise lines removed, newline terminated per kept line.
    pub fn filter(&self, text: &str) -> String {
        let mut out = String::new();
        for line in text.lines() {
            if !self.is_noise(line) {
                out.push_str(line);
                out.push('\n');
            }
        }
        out
    }

    /// Trimmed, ANSI-stripped error lines in order of appearance.
    pub fn error_lines(&self, text: &str) -> Vec<String> {
        text.lines()
            .filter(|line| self.is_error(line))
            .map(|line| strip_ansi(line).trim().to_string())
            .collect()
    }

    /// apt / dpkg output as of apt 2.x and 3.0.
    pub fn apt() -> Self {
        use LineMatcher::*;
        let noise = [
            "apt does not have a stable CLI interface.",
            "Reading package lists...",
            "Building dependency tree",
            "Reading state information...",
            "Need to get",
            "Selecting previously unselected package",
            "Preparing to unpack",
            "Setting up ",
            "Processing triggers for ",
            "The following packages were automatically installed",
            "Unpacking",
            "Summary:",
            "Upgrading:",
            "Download size:",
            "Space needed:",
            "Space reclaimed:",
            "After this operation",
            "Fetched",
            "Extracting templates",
            "Removing old",
        ];
        Self {
            name: "apt",
            version: 1,
            keep: vec![Prefix("Hit:"), Prefix("Ign:"), Prefix("Get:")],
            noise: noise.into_iter().map(Contains).collect(),
            errors: vec![Prefix("E:"), Prefix("Err:")],
        }
    }

    /// apk-tools 2.x.
    pub fn apk() -> Self {
        use LineMatcher::*;
        Self {
            name: "apk",
            version: 1,
            keep: Vec::new(),
            noise: vec![
                Prefix("fetch "),
                Prefix("OK: "),
                Prefix("WARNING: "),
                Prefix("Executing "),
                Contains("Need to download"),
                Contains("After this operation"),
                Contains("Do you want to continue"),
                Contains(".trigger: Executing"),
                Contains(".trigger: Regenerating"),
                ContainsAll(&["Installing ", "("]),
                ContainsAll(&["Purging ", "("]),
            ],
            errors: vec![
                Prefix("ERROR:"),
                ContainsAll(&["fetch", "error"]),
                Contains("unable to select packages"),
                ContainsAll(&["World entry", "not found"]),
            ],
        }
    }

    /// pacman 6.x.
    pub fn pacman() -> Self {
        use LineMatcher::*;
        let noise = [
            ":: Synchronizing package databases...",
            ":: Starting full system upgrade...",
            ":: Processing package changes...",
            ":: Loading package files...",
            ":: Checking for file conflicts...",
            ":: Checking available disk space...",
            ":: Installing packages...",
            ":: Removing packages...",
            ":: Upgrading packages...",
            ":: Running pre-transaction hooks...",
            ":: Running post-transaction hooks...",
            ":: Database directory:",
            ":: Retrieving packages...",
            ":: Package (",
            ":: Total",
            ":: Proceed with installation?",
            ":: Proceed with removal?",
            ":: Proceed with upgrade?",
            ":: Downloading",
            ":: Checking",
            ":: Verifying",
        ];
        Self {
            name: "pacman",
            version: 1,
            keep: Vec::new(),
            noise: noise.into_iter().map(Contains).collect(),
            errors: vec![ContainsIgnoreCase("error"), ContainsIgnoreCase("failed")],
        }
    }
}
