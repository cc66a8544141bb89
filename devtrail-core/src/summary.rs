//! Session summaries
//!
//! AI-backed summarization is provided by the host through [`Summarizer`].
//! [`fallback_summary`] is the deterministic description used whenever AI
//! summaries are disabled, unavailable, or fail.

use crate::config::ExtensionConfig;
use crate::error::Result;
use crate::format::{format_duration, pluralize};
use crate::types::{ChangeType, ErrorType, SessionData};
use async_trait::async_trait;

/// Most recent file paths listed in a fallback summary
const MAX_LISTED_FILES: usize = 5;

/// Most recent commit subjects listed in a fallback summary
const MAX_LISTED_COMMITS: usize = 3;

/// Produces natural-language summaries of a session.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, session: &SessionData, config: &ExtensionConfig) -> Result<String>;
}

/// Deterministic, non-AI description of a session's contents.
pub fn fallback_summary(session: &SessionData) -> String {
    if session.is_empty() {
        return "No activity recorded in this session.".to_string();
    }

    let mut lines = Vec::new();

    let end = session
        .end_time
        .or_else(|| session.last_activity())
        .unwrap_or(session.start_time);
    lines.push(format!(
        "Session lasted {}.",
        format_duration(end - session.start_time)
    ));

    if !session.edited_files.is_empty() {
        let count = |kind: ChangeType| {
            session
                .edited_files
                .iter()
                .filter(|e| e.change_type == kind)
                .count()
        };
        let breakdown: Vec<String> = [
            (ChangeType::Created, "created"),
            (ChangeType::Modified, "modified"),
            (ChangeType::Deleted, "deleted"),
        ]
        .into_iter()
        .filter_map(|(kind, label)| {
            let n = count(kind);
            (n > 0).then(|| format!("{} {}", n, label))
        })
        .collect();

        let recent: Vec<&str> = session
            .edited_files
            .iter()
            .rev()
            .take(MAX_LISTED_FILES)
            .map(|e| e.file_path.as_str())
            .collect();

        lines.push(format!(
            "Edited {} ({}): {}.",
            pluralize(session.edited_files.len(), "file", "files"),
            breakdown.join(", "),
            recent.join(", ")
        ));
    }

    if !session.git_commits.is_empty() {
        let recent: Vec<String> = session
            .git_commits
            .iter()
            .rev()
            .take(MAX_LISTED_COMMITS)
            .map(|c| format!("\"{}\"", c.message))
            .collect();
        lines.push(format!(
            "Made {}: {}.",
            pluralize(session.git_commits.len(), "commit", "commits"),
            recent.join(", ")
        ));
    }

    if !session.terminal_errors.is_empty() {
        let errors = session
            .terminal_errors
            .iter()
            .filter(|e| e.error_type == ErrorType::Error)
            .count();
        let warnings = session.terminal_errors.len() - errors;

        let mut line = format!(
            "Saw {} and {} in the terminal",
            pluralize(errors, "error", "errors"),
            pluralize(warnings, "warning", "warnings")
        );
        if let Some(last) = session
            .terminal_errors
            .iter()
            .rev()
            .find(|e| e.error_type == ErrorType::Error)
        {
            line.push_str(&format!("; last error: \"{}\"", last.message));
        }
        line.push('.');
        lines.push(line);
    }

    lines.join("\n")
}
