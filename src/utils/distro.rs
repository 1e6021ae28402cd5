use std::path::Path;

/// Distro family as far as package management is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistroFamily {
    Debian,
    Alpine,
    Arch,
    Unknown,
}

impl DistroFamily {
    /// Detect from `/etc/os-release`.
    pub fn detect() -> Self {
        Self::detect_from(Path::new("/etc/os-release"))
    }

    pub fn detect_from(os_release: &Path) -> Self {
        match std::fs::read_to_string(os_release) {
            Ok(content) => Self::from_os_release(&content),
            Err(_) => DistroFamily::Unknown,
        }
    }

    /// Classify by `ID` first, then by `ID_LIKE`.
    pub fn from_os_release(content: &str) -> Self {
        let mut id = String::new();
        let mut id_like = String::new();
        for line in content.lines() {
            if let Some(v) = line.strip_prefix("ID=") {
                id = unquote(v).to_lowercase();
            } else if let Some(v) = line.strip_prefix("ID_LIKE=") {
                id_like = unquote(v).to_lowercase();
            }
        }

        let by_id = Self::from_id(&id);
        if by_id != DistroFamily::Unknown {
            return by_id;
        }
        id_like
            .split_whitespace()
            .map(Self::from_id)
            .find(|f| *f != DistroFamily::Unknown)
            .unwrap_or(DistroFamily::Unknown)
    }

    fn from_id(id: &str) -> Self {
        match id {
            "debian" | "ubuntu" | "raspbian" | "linuxmint" | "pop" | "kali" | "devuan" => {
                DistroFamily::Debian
            }
            "alpine" | "postmarketos" => DistroFamily::Alpine,
            "arch" | "archarm" | "manjaro" | "manjaro-arm" | "endeavouros" | "garuda"
            | "artix" => DistroFamily::Arch,
            _ => DistroFamily::Unknown,
        }
    }
}

fn unquote(value: &str) -> &str {
    value.trim().trim_matches('"').trim_matches('\'')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_by_id() {
        let content = "NAME=\"Alpine Linux\"\nID=alpine\nVERSION_ID=3.20.0\n";
        assert_eq!(DistroFamily::from_os_release(content), DistroFamily::Alpine);
    }

    #[test]
    fn falls_back_to_id_like() {
        let content = "ID=neon\nID_LIKE=\"ubuntu debian\"\n";
        assert_eq!(DistroFamily::from_os_release(content), DistroFamily::Debian);
    }

    #[test]
    fn unknown_when_nothing_matches() {
        assert_eq!(
            DistroFamily::from_os_release("ID=fedora\nID_LIKE=\"rhel\"\n"),
            DistroFamily::Unknown
        );
        assert_eq!(
            DistroFamily::detect_from(Path::new("/nonexistent/os-release")),
            DistroFamily::Unknown
        );
    }
}
