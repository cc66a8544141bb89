//! Version-control activity monitor
//!
//! Queries git for commits made since the session started. The subprocess
//! itself sits behind [`GitRunner`]; this module owns the command contract
//! and the parsing.
//!
//! ## Log format
//!
//! The log query asks git for one header per commit:
//!
//! ```text
//! <hash>|<subject>|<author name>|<ISO-8601 author date>|
//! ```
//!
//! followed by the changed paths (`--name-only`). The output is folded into
//! one line per commit, `hash|subject|author|timestamp|file,file`, which is
//! the shape [`parse_log_line`] accepts. Changed files may be joined with
//! `|` or `,`, so a path that itself contains a comma is reported as two
//! entries.
//!
//! Any failure (no repository, git missing, non-zero exit) yields no commits.

use super::CommitSource;
use crate::config::ExtensionConfig;
use crate::error::{Error, Result};
use crate::events::lock;
use crate::filter::ExclusionFilter;
use crate::types::GitCommit;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Runs git commands on behalf of the monitor.
#[async_trait]
pub trait GitRunner: Send + Sync {
    /// Run `git <args>` in `cwd`, returning stdout on success.
    async fn run(&self, cwd: &Path, args: &[String]) -> Result<String>;
}

/// Invokes the `git` binary found on `PATH`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemGit;

#[async_trait]
impl GitRunner for SystemGit {
    async fn run(&self, cwd: &Path, args: &[String]) -> Result<String> {
        let output = tokio::process::Command::new("git")
            .current_dir(cwd)
            .args(args)
            .output()
            .await
            .map_err(|e| Error::Git(format!("failed to run git: {}", e)))?;

        if !output.status.success() {
            return Err(Error::Git(format!(
                "git {} exited with {}: {}",
                args.first().map(String::as_str).unwrap_or_default(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

struct GitSettings {
    filter: ExclusionFilter,
    max_commits: usize,
}

/// Reports commits and the current branch for a workspace
pub struct GitActivityMonitor {
    workspace_root: PathBuf,
    runner: Arc<dyn GitRunner>,
    settings: Mutex<GitSettings>,
}

impl GitActivityMonitor {
    /// Monitor backed by the system `git` binary.
    pub fn new(workspace_root: impl Into<PathBuf>, config: &ExtensionConfig) -> Self {
        Self::with_runner(workspace_root, config, Arc::new(SystemGit))
    }

    /// Monitor backed by a custom runner.
    pub fn with_runner(
        workspace_root: impl Into<PathBuf>,
        config: &ExtensionConfig,
        runner: Arc<dyn GitRunner>,
    ) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            runner,
            settings: Mutex::new(GitSettings {
                filter: ExclusionFilter::new(&config.privacy_settings),
                max_commits: config.max_commits_to_show,
            }),
        }
    }

    /// Arguments for the commit log query.
    pub fn log_args(since: DateTime<Utc>) -> Vec<String> {
        vec![
            "log".to_string(),
            format!("--since={}", since.to_rfc3339()),
            "--pretty=format:%H|%s|%an|%aI|".to_string(),
            "--name-only".to_string(),
        ]
    }

    /// Arguments for the branch query.
    pub fn branch_args() -> Vec<String> {
        vec![
            "rev-parse".to_string(),
            "--abbrev-ref".to_string(),
            "HEAD".to_string(),
        ]
    }

    fn select_commits(&self, raw: &str, since: DateTime<Utc>) -> Vec<GitCommit> {
        let settings = lock(&self.settings);

        let mut commits: Vec<GitCommit> = fold_log_output(raw)
            .iter()
            .filter_map(|line| {
                let parsed = parse_log_line(line);
                if parsed.is_none() {
                    tracing::debug!(line = %line, "Skipping malformed git log line");
                }
                parsed
            })
            .filter(|c| c.timestamp > since)
            .filter(|c| !settings.filter.should_exclude_commit(&c.message))
            .collect();

        // Stable: commits with equal timestamps keep log order
        commits.sort_by_key(|c| c.timestamp);

        if commits.len() > settings.max_commits {
            let excess = commits.len() - settings.max_commits;
            commits.drain(..excess);
        }
        commits
    }
}

#[async_trait]
impl CommitSource for GitActivityMonitor {
    fn is_git_repository(&self) -> bool {
        find_repository_root(&self.workspace_root).is_some()
    }

    async fn commits_since(&self, since: DateTime<Utc>) -> Vec<GitCommit> {
        if !self.is_git_repository() {
            tracing::debug!(
                workspace = %self.workspace_root.display(),
                "Workspace is not a git repository"
            );
            return Vec::new();
        }

        let raw = match self
            .runner
            .run(&self.workspace_root, &Self::log_args(since))
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to query git log");
                return Vec::new();
            }
        };

        let commits = self.select_commits(&raw, since);
        tracing::debug!(count = commits.len(), "Loaded commits since session start");
        commits
    }

    async fn current_branch(&self) -> Option<String> {
        if !self.is_git_repository() {
            return None;
        }

        match self
            .runner
            .run(&self.workspace_root, &Self::branch_args())
            .await
        {
            Ok(out) => {
                let branch = out.trim();
                if branch.is_empty() || branch == "HEAD" {
                    None
                } else {
                    Some(branch.to_string())
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "Failed to resolve current branch");
                None
            }
        }
    }

    fn update_config(&self, config: &ExtensionConfig) {
        let mut settings = lock(&self.settings);
        settings.filter = ExclusionFilter::new(&config.privacy_settings);
        settings.max_commits = config.max_commits_to_show;
    }
}

/// Walk up from `start` looking for a `.git` entry.
pub fn find_repository_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(".git").exists())
        .map(Path::to_path_buf)
}

/// Fold `--name-only` output into one line per commit.
///
/// Header lines start a new record; every following non-empty line is a
/// changed path and gets appended comma-separated.
pub fn fold_log_output(raw: &str) -> Vec<String> {
    let mut records: Vec<String> = Vec::new();
    let mut files_on_current = 0usize;

    for line in raw.lines() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }

        if is_header_line(line) {
            records.push(line.to_string());
            files_on_current = 0;
            continue;
        }

        match records.last_mut() {
            Some(record) => {
                if files_on_current > 0 || !record.ends_with('|') {
                    record.push(',');
                }
                record.push_str(line.trim());
                files_on_current += 1;
            }
            None => records.push(line.to_string()),
        }
    }

    records
}

fn is_header_line(line: &str) -> bool {
    let Some((hash, rest)) = line.split_once('|') else {
        return false;
    };
    looks_like_hash(hash) && rest.split('|').count() >= 3
}

fn looks_like_hash(s: &str) -> bool {
    (7..=64).contains(&s.len()) && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// Parse one `hash|subject|author|timestamp|files` line.
///
/// Returns `None` for lines without a hash, author, or parseable timestamp.
/// A subject containing `|` is tolerated: the timestamp is located as the
/// first parseable field after the author.
pub fn parse_log_line(line: &str) -> Option<GitCommit> {
    let parts: Vec<&str> = line.split('|').collect();
    if parts.len() < 4 {
        return None;
    }

    let hash = parts[0].trim();
    if hash.is_empty() {
        return None;
    }

    let (ts_index, timestamp) = (3..parts.len())
        .find_map(|i| parse_timestamp(parts[i]).map(|ts| (i, ts)))?;

    let message = parts[1..ts_index - 1].join("|").trim().to_string();
    let author = parts[ts_index - 1].trim();
    if author.is_empty() {
        return None;
    }
    let author = author.to_string();

    let files_changed = parts[ts_index + 1..]
        .iter()
        .flat_map(|field| field.split(','))
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .collect();

    Some(GitCommit {
        hash: hash.to_string(),
        message,
        author,
        timestamp,
        files_changed,
    })
}

fn parse_timestamp(field: &str) -> Option<DateTime<Utc>> {
    let field = field.trim();
    DateTime::parse_from_rfc3339(field)
        .or_else(|_| DateTime::parse_from_str(field, "%Y-%m-%d %H:%M:%S %z"))
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}
