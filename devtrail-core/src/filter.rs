//! Exclusion filter for files and commit messages
//!
//! File patterns are glob-like: `*` matches any run of characters (slashes
//! included), `?` matches exactly one character, and everything else matches
//! literally. Each pattern is anchored to the whole path. Commit patterns are
//! case-insensitive substrings.
//!
//! A filter is built from one [`PrivacySettings`] value and never changes;
//! components rebuild it whenever they receive a new configuration.

use crate::config::PrivacySettings;
use crate::types::SessionData;
use regex::Regex;

/// Compiled exclusion rules
#[derive(Debug, Clone)]
pub struct ExclusionFilter {
    file_patterns: Vec<Regex>,
    commit_patterns: Vec<String>,
}

impl ExclusionFilter {
    /// Compile the rules from privacy settings.
    pub fn new(settings: &PrivacySettings) -> Self {
        let file_patterns = settings
            .exclude_file_patterns
            .iter()
            .filter_map(|pattern| match Regex::new(&glob_to_regex(pattern)) {
                Ok(re) => Some(re),
                Err(e) => {
                    tracing::warn!(
                        pattern = %pattern,
                        error = %e,
                        "Skipping unusable exclude pattern"
                    );
                    None
                }
            })
            .collect();

        let commit_patterns = settings
            .exclude_commit_patterns
            .iter()
            .map(|p| p.to_lowercase())
            .collect();

        Self {
            file_patterns,
            commit_patterns,
        }
    }

    /// A filter that excludes nothing
    pub fn allow_all() -> Self {
        Self {
            file_patterns: Vec::new(),
            commit_patterns: Vec::new(),
        }
    }

    /// True if the path matches any file pattern.
    pub fn should_exclude_file(&self, path: &str) -> bool {
        let normalized = path.replace('\\', "/");
        self.file_patterns.iter().any(|re| re.is_match(&normalized))
    }

    /// True if the message contains any commit pattern (case-insensitive).
    pub fn should_exclude_commit(&self, message: &str) -> bool {
        if self.commit_patterns.is_empty() {
            return false;
        }
        let message = message.to_lowercase();
        self.commit_patterns.iter().any(|p| message.contains(p.as_str()))
    }

    /// Copy of a session with excluded files and commits removed.
    pub fn filter_session(&self, session: &SessionData) -> SessionData {
        let mut filtered = session.clone();
        filtered
            .edited_files
            .retain(|e| !self.should_exclude_file(&e.file_path));
        filtered
            .git_commits
            .retain(|c| !self.should_exclude_commit(&c.message));
        for commit in &mut filtered.git_commits {
            commit.files_changed.retain(|f| !self.should_exclude_file(f));
        }
        filtered
    }
}

impl Default for ExclusionFilter {
    fn default() -> Self {
        Self::new(&PrivacySettings::default())
    }
}

/// Translate a glob-like pattern into an anchored regex.
fn glob_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() * 2 + 2);
    out.push('^');

    let mut previous_star = false;
    for ch in pattern.chars() {
        match ch {
            '*' => {
                if !previous_star {
                    out.push_str(".*");
                }
            }
            '?' => out.push('.'),
            _ => {
                let mut buf = [0u8; 4];
                out.push_str(&regex::escape(ch.encode_utf8(&mut buf)));
            }
        }
        previous_star = ch == '*';
    }

    out.push('$');
    out
}
