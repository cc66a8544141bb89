//! End-to-end tests for devtrail session tracking
//!
//! These tests wire real monitors and the JSON store together in temporary
//! directories. Git is replaced by a canned runner so no repository or `git`
//! binary is needed.

use async_trait::async_trait;
use chrono::Utc;
use devtrail_core::config::PrivacySettings;
use devtrail_core::monitor::{
    FileChangeMonitor, GitActivityMonitor, GitRunner, SavedDocument, TerminalErrorMonitor,
};
use devtrail_core::team::{InMemoryTeamBackend, OptInStore};
use devtrail_core::{
    ChangeType, ExtensionConfig, JsonSessionStore, SessionStorage, SessionTracker,
    TeamDataAggregator, TeamMember, TeamRole, TrackerDeps, TrackerState, UserPermissions,
};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// Git runner that answers every log query with the same output
struct CannedGit {
    log: String,
}

#[async_trait]
impl GitRunner for CannedGit {
    async fn run(&self, _cwd: &Path, args: &[String]) -> devtrail_core::Result<String> {
        if args[0] == "log" {
            Ok(self.log.clone())
        } else {
            Ok("main\n".to_string())
        }
    }
}

struct Workspace {
    root: TempDir,
    sessions: TempDir,
    files: Arc<FileChangeMonitor>,
    errors: Arc<TerminalErrorMonitor>,
    tracker: SessionTracker,
}

impl Workspace {
    async fn open(config: ExtensionConfig, git_log: &str) -> Self {
        let root = TempDir::new().unwrap();
        let sessions = TempDir::new().unwrap();
        Self::open_in(root, sessions, config, git_log).await
    }

    async fn open_in(
        root: TempDir,
        sessions: TempDir,
        config: ExtensionConfig,
        git_log: &str,
    ) -> Self {
        std::fs::create_dir_all(root.path().join(".git")).unwrap();
        let config = Arc::new(config);

        let files = Arc::new(FileChangeMonitor::new(root.path(), &config));
        let errors = Arc::new(TerminalErrorMonitor::new());
        let commits = Arc::new(GitActivityMonitor::with_runner(
            root.path(),
            &config,
            Arc::new(CannedGit {
                log: git_log.to_string(),
            }),
        ));
        let deps = TrackerDeps {
            files: files.clone(),
            commits,
            errors: errors.clone(),
            storage: Arc::new(JsonSessionStore::new(sessions.path())),
        };
        let tracker = SessionTracker::open(config, deps).await;

        Self {
            root,
            sessions,
            files,
            errors,
            tracker,
        }
    }

    fn path(&self, relative: &str) -> std::path::PathBuf {
        self.root.path().join(relative)
    }

    fn save(&self, relative: &str) {
        self.files.handle_saved(&SavedDocument::new(self.path(relative)));
    }
}

fn log_line(hash: &str, subject: &str, minutes_from_now: i64, files: &[&str]) -> String {
    let ts = Utc::now() + chrono::Duration::minutes(minutes_from_now);
    format!(
        "{}|{}|Ada Lovelace|{}|\n{}\n",
        hash,
        subject,
        ts.to_rfc3339(),
        files.join("\n")
    )
}

// ============================================
// Tracking
// ============================================

#[tokio::test]
async fn test_excluded_paths_never_recorded() {
    let ws = Workspace::open(ExtensionConfig::default(), "").await;
    ws.tracker.start_tracking();

    ws.save("node_modules/left-pad/index.js");
    ws.save(".env.local");
    ws.save("debug.log");
    let main = SavedDocument::new(ws.path("src/main.rs"));
    ws.files.handle_saved(&main.with_line_count(42));

    let session = ws.tracker.current_session();
    assert_eq!(session.edited_files.len(), 1);
    assert_eq!(session.edited_files[0].file_path, "src/main.rs");
    assert_eq!(session.edited_files[0].line_count, Some(42));
}

#[tokio::test]
async fn test_create_then_save_keeps_one_entry() {
    let ws = Workspace::open(ExtensionConfig::default(), "").await;
    ws.tracker.start_tracking();

    ws.files.handle_created([ws.path("src/new.rs")]);
    ws.files.handle_saved(&SavedDocument::new(ws.path("src/new.rs")));

    let session = ws.tracker.current_session();
    assert_eq!(session.edited_files.len(), 1);
    assert_eq!(session.edited_files[0].change_type, ChangeType::Modified);
}

#[tokio::test]
async fn test_events_ignored_while_not_tracking() {
    let ws = Workspace::open(ExtensionConfig::default(), "").await;
    assert_eq!(ws.tracker.state(), TrackerState::Idle);

    ws.save("a.rs");
    ws.errors.handle_output(Some("zsh"), "error: boom\n");
    assert!(ws.tracker.current_session().is_empty());

    ws.tracker.start_tracking();
    ws.errors.handle_output(Some("zsh"), "error: boom\nall good\n");
    ws.tracker.stop_tracking();
    ws.errors.handle_output(Some("zsh"), "error: again\n");

    let session = ws.tracker.current_session();
    assert_eq!(session.terminal_errors.len(), 1);
    assert_eq!(session.terminal_errors[0].terminal_name, "zsh");
}

#[tokio::test]
async fn test_wip_commits_excluded() {
    let log = [
        log_line("aaaa111", "Add parser", 1, &["src/parser.rs"]),
        log_line("bbbb222", "WIP: half-done lexer", 2, &["src/lexer.rs"]),
        log_line("cccc333", "Fix tests", 3, &["tests/it.rs", ".env"]),
    ]
    .concat();
    let config = ExtensionConfig {
        privacy_settings: PrivacySettings {
            exclude_commit_patterns: vec!["WIP:".to_string()],
            ..Default::default()
        },
        ..Default::default()
    };
    let ws = Workspace::open(config, &log).await;
    ws.tracker.start_tracking();

    assert_eq!(ws.tracker.refresh_commits().await, 2);
    assert_eq!(ws.tracker.refresh_commits().await, 0);

    let session = ws.tracker.current_session();
    let messages: Vec<_> = session
        .git_commits
        .iter()
        .map(|c| c.message.as_str())
        .collect();
    assert_eq!(messages, vec!["Add parser", "Fix tests"]);
}

#[tokio::test]
async fn test_commit_cap_keeps_newest() {
    let log: String = (1..=6)
        .map(|i| {
            let hash = format!("abcde{:02}", i);
            log_line(&hash, &format!("Change {}", i), i, &[])
        })
        .collect();
    let config = ExtensionConfig {
        max_commits_to_show: 4,
        ..Default::default()
    };
    let ws = Workspace::open(config, &log).await;
    ws.tracker.start_tracking();
    ws.tracker.refresh_commits().await;

    let session = ws.tracker.current_session();
    let hashes: Vec<_> = session
        .git_commits
        .iter()
        .map(|c| c.hash.as_str())
        .collect();
    assert_eq!(hashes, vec!["abcde03", "abcde04", "abcde05", "abcde06"]);
}

// ============================================
// Persistence
// ============================================

#[tokio::test]
async fn test_session_round_trip_across_restart() {
    let ws = Workspace::open(ExtensionConfig::default(), "").await;
    assert!(ws.tracker.previous_session().is_none());

    ws.tracker.start_tracking();
    ws.files.handle_created([ws.path("src/lib.rs")]);
    ws.errors.handle_output(None, "warning: unused import\n");
    ws.tracker.save_session().await.unwrap();
    let saved = ws.tracker.current_session();
    assert!(saved.end_time.is_some());

    let Workspace { root, sessions, .. } = ws;
    let reopened = Workspace::open_in(root, sessions, ExtensionConfig::default(), "").await;
    assert_eq!(reopened.tracker.previous_session(), Some(&saved));
}

#[tokio::test]
async fn test_load_last_session_empty_store() {
    let dir = TempDir::new().unwrap();
    let store = JsonSessionStore::new(dir.path().join("sessions"));
    assert!(store.load_last_session().await.is_none());
    assert!(store.all_session_ids().await.is_empty());
}

#[tokio::test]
async fn test_save_failure_then_retry() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("sessions");
    // A regular file where the directory should be
    std::fs::write(&root, b"").unwrap();
    let store = JsonSessionStore::new(&root);

    let session = devtrail_core::SessionData::new();
    assert!(store.save_session(&session).await.is_err());
    assert!(store.load_session(&session.session_id).await.is_none());

    std::fs::remove_file(&root).unwrap();
    store.save_session(&session).await.unwrap();
    assert_eq!(store.load_last_session().await, Some(session));
}

// ============================================
// Team sharing
// ============================================

#[tokio::test]
async fn test_opted_out_user_shares_nothing() {
    let dir = TempDir::new().unwrap();
    let me = TeamMember {
        id: "u1".to_string(),
        name: "Ada".to_string(),
        email: None,
        role: TeamRole::Member,
    };
    let backend = Arc::new(InMemoryTeamBackend::new(
        me,
        Some(UserPermissions {
            team_id: "core".to_string(),
            can_view_team_data: true,
            can_share_data: true,
        }),
    ));
    let config = Arc::new(ExtensionConfig {
        privacy_settings: PrivacySettings {
            share_with_team: true,
            ..Default::default()
        },
        ..Default::default()
    });
    let aggregator =
        TeamDataAggregator::new(config, OptInStore::in_dir(dir.path()), backend.clone());

    aggregator.opt_in_to_team_sharing().await.unwrap();
    aggregator.opt_out_of_team_sharing().await.unwrap();

    let session = devtrail_core::SessionData::new();
    assert!(!aggregator.share_session_data(&session).await);
    assert!(backend.record_for("u1").is_none());

    let view = aggregator.team_session_data().await.unwrap();
    assert!(view.members.iter().all(|m| m.session_data.is_none()));
}
