//! Core domain types for devtrail
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Session** | One continuous tracked interval of editing activity |
//! | **Monitor** | Translates raw host events into one of the three record kinds |
//! | **Snapshot** | A clone of the live [`SessionData`] handed to consumers |
//! | **Opt-in** | Explicit consent before session data leaves the local record |
//!
//! All types serialize with camelCase keys and RFC 3339 timestamps, which is
//! also the persisted session file layout.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================
// Session
// ============================================

/// The aggregate record of one editing session.
///
/// Only the session tracker mutates this; everything else works on clones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionData {
    /// Globally unique identifier, assigned at session start
    pub session_id: String,
    /// When the session started
    pub start_time: DateTime<Utc>,
    /// When the session was saved or closed
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    /// Unique by path, most recently edited last
    #[serde(default)]
    pub edited_files: Vec<FileEdit>,
    /// Unique by hash, ascending commit time
    #[serde(default)]
    pub git_commits: Vec<GitCommit>,
    /// Append-only
    #[serde(default)]
    pub terminal_errors: Vec<TerminalError>,
    /// Natural-language summary
    #[serde(default)]
    pub summary: Option<String>,
}

impl SessionData {
    /// Create an empty session with a fresh ID starting now.
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    /// Create an empty session with a fresh ID and the given start time.
    pub fn starting_at(start_time: DateTime<Utc>) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            start_time,
            end_time: None,
            edited_files: Vec::new(),
            git_commits: Vec::new(),
            terminal_errors: Vec::new(),
            summary: None,
        }
    }

    /// True when nothing has been recorded yet
    pub fn is_empty(&self) -> bool {
        self.edited_files.is_empty()
            && self.git_commits.is_empty()
            && self.terminal_errors.is_empty()
    }

    /// Record a file edit, replacing any earlier entry for the same path.
    ///
    /// The replaced entry moves to the end so the order reflects the most
    /// recent edit of each path.
    pub fn record_file_edit(&mut self, edit: FileEdit) {
        self.edited_files.retain(|e| e.file_path != edit.file_path);
        self.edited_files.push(edit);
    }

    /// Merge commits, skipping hashes already present.
    ///
    /// Returns the number of commits added. Ascending timestamp order is
    /// kept with a stable sort, so equal timestamps keep arrival order.
    pub fn merge_commits(&mut self, commits: impl IntoIterator<Item = GitCommit>) -> usize {
        let mut added = 0;
        for commit in commits {
            if self.git_commits.iter().any(|c| c.hash == commit.hash) {
                continue;
            }
            self.git_commits.push(commit);
            added += 1;
        }
        if added > 0 {
            self.git_commits.sort_by_key(|c| c.timestamp);
        }
        added
    }

    /// Append a terminal error.
    pub fn record_terminal_error(&mut self, error: TerminalError) {
        self.terminal_errors.push(error);
    }

    /// Timestamp of the most recent recorded activity, if any
    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        let files = self.edited_files.iter().map(|e| e.timestamp);
        let commits = self.git_commits.iter().map(|c| c.timestamp);
        let errors = self.terminal_errors.iter().map(|e| e.timestamp);
        files.chain(commits).chain(errors).max()
    }
}

impl Default for SessionData {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================
// File edits
// ============================================

/// Kind of change observed for a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Created,
    Modified,
    Deleted,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Created => "created",
            ChangeType::Modified => "modified",
            ChangeType::Deleted => "deleted",
        }
    }
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Latest recorded change to one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEdit {
    /// Workspace-relative path with `/` separators
    pub file_path: String,
    /// When the change was observed
    pub timestamp: DateTime<Utc>,
    /// What happened to the file
    pub change_type: ChangeType,
    /// Line count at save time, when the host reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_count: Option<usize>,
}

// ============================================
// Commits
// ============================================

/// A commit made during the session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitCommit {
    /// Full commit hash
    pub hash: String,
    /// Commit subject line
    pub message: String,
    /// Author name
    pub author: String,
    /// Author date
    pub timestamp: DateTime<Utc>,
    /// Paths touched by the commit
    #[serde(default)]
    pub files_changed: Vec<String>,
}

// ============================================
// Terminal errors
// ============================================

/// Severity of a classified terminal line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorType {
    Error,
    Warning,
}

/// A terminal output line classified as an error or warning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalError {
    /// The offending line, trimmed
    pub message: String,
    /// When the line was observed
    pub timestamp: DateTime<Utc>,
    /// Name of the terminal that produced it
    pub terminal_name: String,
    /// Error or warning
    pub error_type: ErrorType,
}

// ============================================
// Team aggregation
// ============================================

/// Role of a team member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeamRole {
    #[default]
    Member,
    Lead,
    Admin,
}

/// A person on the team
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamMember {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: TeamRole,
}

/// What the current user may do with team data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPermissions {
    /// Team the permissions apply to
    pub team_id: String,
    /// May read other members' sessions
    pub can_view_team_data: bool,
    /// May publish own sessions
    pub can_share_data: bool,
}

/// One member's entry in an aggregated team view
///
/// `session_data` is only ever `Some` when `has_opted_in` is true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamMemberSession {
    pub member: TeamMember,
    pub session_data: Option<SessionData>,
    pub has_opted_in: bool,
    pub last_updated: DateTime<Utc>,
}

/// Aggregated view of a team's sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamSessionData {
    pub team_id: String,
    pub members: Vec<TeamMemberSession>,
    pub aggregated_at: DateTime<Utc>,
}
