use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::SensitivePrefixConfig;

/// How a sensitive-path rule compares against the literal path argument.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    /// The path string starts with the pattern.
    Prefix,
    /// The pattern occurs anywhere in the path string (credential-store markers).
    Segment,
    /// The path string equals the pattern.
    Exact,
}

/// One entry of the immutable classification table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensitivePath {
    pub label: String,
    pub pattern: String,
    pub kind: MatchKind,
}

impl SensitivePath {
    pub fn from_config(config: &SensitivePrefixConfig) -> Self {
        Self {
            label: config.label.clone(),
            pattern: expand_path_template(&config.prefix),
            kind: MatchKind::Prefix,
        }
    }

    pub fn prefix(label: &str, pattern: &str) -> Self {
        Self {
            label: label.to_string(),
            pattern: pattern.to_string(),
            kind: MatchKind::Prefix,
        }
    }

    pub fn segment(label: &str, pattern: &str) -> Self {
        Self {
            label: label.to_string(),
            pattern: pattern.to_string(),
            kind: MatchKind::Segment,
        }
    }

    pub fn exact(label: &str, pattern: &str) -> Self {
        Self {
            label: label.to_string(),
            pattern: expand_path_template(pattern),
            kind: MatchKind::Exact,
        }
    }

    /// Compares against the literal argument. No canonicalization: `..`
    /// components and symlinks are not resolved.
    pub fn matches(&self, candidate: &Path) -> bool {
        let candidate = candidate.to_string_lossy();
        match self.kind {
            MatchKind::Prefix => candidate.starts_with(self.pattern.as_str()),
            MatchKind::Segment => candidate.contains(self.pattern.as_str()),
            MatchKind::Exact => candidate == self.pattern.as_str(),
        }
    }
}

pub fn expand_path_template(template: &str) -> String {
    if !template.contains("${HOME}") {
        return template.to_string();
    }
    let home_dir = std::env::var("HOME").unwrap_or_else(|_| "/".to_string());
    template.replace("${HOME}", home_dir.trim_end_matches('/'))
}

/// Default location of the lightweight socket endpoint.
pub fn default_socket_path() -> PathBuf {
    if let Ok(runtime) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime).join("quorumgate").join("consensus.sock");
    }
    PathBuf::from("/tmp").join("quorumgate-consensus.sock")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_match_is_literal() {
        let rule = SensitivePath::prefix("System configuration", "/etc/");
        assert!(rule.matches(Path::new("/etc/passwd")));
        assert!(rule.matches(Path::new("/etc/../tmp/x")));
        assert!(!rule.matches(Path::new("/etcetera/file")));
        assert!(!rule.matches(Path::new("/tmp/../etc/passwd")));
        assert!(!rule.matches(Path::new("etc/passwd")));
    }

    #[test]
    fn segment_match_anywhere() {
        let rule = SensitivePath::segment("SSH keys", "/.ssh/");
        assert!(rule.matches(Path::new("/home/alice/.ssh/id_ed25519")));
        assert!(!rule.matches(Path::new("/home/alice/ssh/notes")));
    }

    #[test]
    fn exact_match_only_whole_path() {
        let rule = SensitivePath::exact("Shadow database", "/etc/shadow");
        assert!(rule.matches(Path::new("/etc/shadow")));
        assert!(!rule.matches(Path::new("/etc/shadow-")));
    }
}
