//! Event monitors feeding the session tracker
//!
//! Each monitor translates one kind of host activity into typed records and
//! applies the exclusion filter before anything is admitted.
//!
//! | Monitor | Capability | Records |
//! |---------|------------|---------|
//! | [`FileChangeMonitor`] | [`FileMonitor`] | [`FileEdit`] |
//! | [`GitActivityMonitor`] | [`CommitSource`] | [`GitCommit`] |
//! | [`TerminalErrorMonitor`] | [`ErrorSource`] | [`TerminalError`] |
//!
//! The tracker only depends on the capability traits, so tests and hosts can
//! supply their own implementations.

pub mod file;
pub mod git;
pub mod terminal;

pub use file::{FileChangeMonitor, SavedDocument};
pub use git::{GitActivityMonitor, GitRunner, SystemGit};
pub use terminal::TerminalErrorMonitor;

use crate::config::ExtensionConfig;
use crate::events::Subscription;
use crate::types::{FileEdit, GitCommit, TerminalError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Source of deduplicated file edits.
pub trait FileMonitor: Send + Sync {
    /// Register a listener for admitted edits.
    fn on_file_changed(&self, callback: Box<dyn Fn(&FileEdit) + Send + Sync>) -> Subscription;

    /// Edits recorded since the last reset, one per path.
    fn edited_files(&self) -> Vec<FileEdit>;

    /// Forget all recorded edits.
    fn reset(&self);

    /// Swap in a new configuration.
    fn update_config(&self, config: &ExtensionConfig);
}

/// Source of commits from version control.
///
/// Failures are never reported as errors: an unavailable repository simply
/// yields no commits and no branch.
#[async_trait]
pub trait CommitSource: Send + Sync {
    /// Whether the workspace is inside a repository.
    fn is_git_repository(&self) -> bool;

    /// Commits strictly after `since`, ascending, filtered and truncated.
    async fn commits_since(&self, since: DateTime<Utc>) -> Vec<GitCommit>;

    /// Current branch name, if any.
    async fn current_branch(&self) -> Option<String>;

    /// Swap in a new configuration.
    fn update_config(&self, config: &ExtensionConfig);
}

/// Source of classified terminal errors.
pub trait ErrorSource: Send + Sync {
    /// Register a listener for every classified line.
    fn on_terminal_error(
        &self,
        callback: Box<dyn Fn(&TerminalError) + Send + Sync>,
    ) -> Subscription;

    /// Most recently observed error.
    fn last_error(&self) -> Option<TerminalError>;

    /// Forget the last error.
    fn reset(&self);
}
