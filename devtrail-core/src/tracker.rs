//! Session tracker
//!
//! Owns the live [`SessionData`] and its lifecycle:
//!
//! ```text
//!  Idle ──start_tracking──► Tracking ──stop_tracking──► Stopped
//!                             ▲  │                         │
//!                             │  └─reset (new id, same     │
//!                             │    state)                  │
//!                             └───────start_tracking───────┘
//! ```
//!
//! Monitor callbacks mutate the live session synchronously, one complete step
//! per event, and the lock is never held across an `.await`. Asynchronous
//! work (commit refresh, saving, summaries) snapshots what it needs first and
//! re-checks the state before applying its result, so a refresh that
//! completes after `stop_tracking` or `reset` is discarded.

use crate::config::ExtensionConfig;
use crate::error::Result;
use crate::events::{lock, Subscription};
use crate::filter::ExclusionFilter;
use crate::monitor::{CommitSource, ErrorSource, FileMonitor};
use crate::store::SessionStorage;
use crate::summary::{fallback_summary, Summarizer};
use crate::types::SessionData;
use chrono::Utc;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

/// Lifecycle state of the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    Idle,
    Tracking,
    Stopped,
}

/// Collaborators the tracker is built from
pub struct TrackerDeps {
    pub files: Arc<dyn FileMonitor>,
    pub commits: Arc<dyn CommitSource>,
    pub errors: Arc<dyn ErrorSource>,
    pub storage: Arc<dyn SessionStorage>,
}

struct LiveSession {
    state: TrackerState,
    session: SessionData,
}

/// Orchestrates the monitors into one live session
pub struct SessionTracker {
    config: Mutex<Arc<ExtensionConfig>>,
    live: Arc<Mutex<LiveSession>>,
    subscriptions: Mutex<Vec<Subscription>>,
    files: Arc<dyn FileMonitor>,
    commits: Arc<dyn CommitSource>,
    errors: Arc<dyn ErrorSource>,
    storage: Arc<dyn SessionStorage>,
    previous: Option<SessionData>,
}

impl SessionTracker {
    /// Build a tracker and capture the previous session from storage.
    ///
    /// The previous session is loaded once here and cached.
    pub async fn open(config: Arc<ExtensionConfig>, deps: TrackerDeps) -> Self {
        let previous = deps.storage.load_last_session().await;
        match &previous {
            Some(session) => tracing::info!(
                session_id = %session.session_id,
                "Loaded previous session"
            ),
            None => tracing::debug!("No previous session"),
        }

        Self {
            config: Mutex::new(config),
            live: Arc::new(Mutex::new(LiveSession {
                state: TrackerState::Idle,
                session: SessionData::new(),
            })),
            subscriptions: Mutex::new(Vec::new()),
            files: deps.files,
            commits: deps.commits,
            errors: deps.errors,
            storage: deps.storage,
            previous,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> TrackerState {
        lock(&self.live).state
    }

    /// Configuration currently in effect
    pub fn config(&self) -> Arc<ExtensionConfig> {
        Arc::clone(&lock(&self.config))
    }

    /// Begin a new session and subscribe to the monitors.
    ///
    /// Does nothing if already tracking.
    pub fn start_tracking(&self) {
        let session_id = {
            let mut live = lock(&self.live);
            if live.state == TrackerState::Tracking {
                return;
            }
            live.session = SessionData::new();
            live.state = TrackerState::Tracking;
            live.session.session_id.clone()
        };

        self.files.reset();
        self.errors.reset();

        let file_live = Arc::clone(&self.live);
        let file_sub = self.files.on_file_changed(Box::new(move |edit| {
            let mut live = lock(&file_live);
            if live.state == TrackerState::Tracking {
                live.session.record_file_edit(edit.clone());
            }
        }));

        let error_live = Arc::clone(&self.live);
        let error_sub = self.errors.on_terminal_error(Box::new(move |error| {
            let mut live = lock(&error_live);
            if live.state == TrackerState::Tracking {
                live.session.record_terminal_error(error.clone());
            }
        }));

        *lock(&self.subscriptions) = vec![file_sub, error_sub];
        tracing::info!(session_id = %session_id, "Started tracking");
    }

    /// Unsubscribe from the monitors. Does not persist anything.
    pub fn stop_tracking(&self) {
        let subscriptions = std::mem::take(&mut *lock(&self.subscriptions));
        drop(subscriptions);

        let mut live = lock(&self.live);
        if live.state == TrackerState::Tracking {
            live.state = TrackerState::Stopped;
            tracing::info!(session_id = %live.session.session_id, "Stopped tracking");
        }
    }

    /// Pull commits made since the session started and merge them.
    ///
    /// Returns the number of commits added. Results arriving after the
    /// tracker stopped or the session was reset are discarded.
    pub async fn refresh_commits(&self) -> usize {
        let (session_id, since) = {
            let live = lock(&self.live);
            if live.state != TrackerState::Tracking {
                return 0;
            }
            (live.session.session_id.clone(), live.session.start_time)
        };

        let commits = self.commits.commits_since(since).await;

        let mut live = lock(&self.live);
        if live.state != TrackerState::Tracking || live.session.session_id != session_id {
            tracing::debug!(session_id = %session_id, "Discarding stale commit refresh");
            return 0;
        }
        let added = live.session.merge_commits(commits);
        if added > 0 {
            tracing::debug!(session_id = %session_id, added, "Merged commits");
        }
        added
    }

    /// Refresh commits on a fixed interval until tracking stops.
    ///
    /// The task holds only a weak reference and ends when the tracker is
    /// dropped.
    pub fn spawn_commit_polling(self: &Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        let tracker: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                let Some(tracker) = tracker.upgrade() else {
                    break;
                };
                if tracker.state() != TrackerState::Tracking {
                    break;
                }
                tracker.refresh_commits().await;
            }
        })
    }

    /// Persist the live session, setting `end_time` on first save.
    ///
    /// Failures are logged and returned; tracking continues either way and
    /// a later call simply tries again.
    pub async fn save_session(&self) -> Result<()> {
        let snapshot = {
            let mut live = lock(&self.live);
            if live.session.end_time.is_none() {
                live.session.end_time = Some(Utc::now());
            }
            live.session.clone()
        };

        match self.storage.save_session(&snapshot).await {
            Ok(()) => {
                tracing::info!(session_id = %snapshot.session_id, "Session saved");
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    session_id = %snapshot.session_id,
                    error = %e,
                    "Failed to save session"
                );
                Err(e)
            }
        }
    }

    /// Snapshot of the live session
    pub fn current_session(&self) -> SessionData {
        lock(&self.live).session.clone()
    }

    /// Session that was last saved before this tracker was opened
    pub fn previous_session(&self) -> Option<&SessionData> {
        self.previous.as_ref()
    }

    /// Clear the live session and start over with a fresh ID.
    ///
    /// The tracking state is unchanged.
    pub fn reset(&self) {
        let session_id = {
            let mut live = lock(&self.live);
            live.session = SessionData::new();
            live.session.session_id.clone()
        };
        self.files.reset();
        self.errors.reset();
        tracing::info!(session_id = %session_id, "Session reset");
    }

    /// Swap in a new configuration.
    ///
    /// Monitors get the new rules, entries that the new rules exclude are
    /// purged from the live session, and tracking stops if it was disabled.
    pub fn update_config(&self, config: Arc<ExtensionConfig>) {
        self.files.update_config(&config);
        self.commits.update_config(&config);

        let filter = ExclusionFilter::new(&config.privacy_settings);
        {
            let mut live = lock(&self.live);
            let filtered = filter.filter_session(&live.session);
            live.session = filtered;
        }

        let enabled = config.enabled;
        *lock(&self.config) = config;

        if !enabled && self.state() == TrackerState::Tracking {
            tracing::info!("Tracking disabled by configuration");
            self.stop_tracking();
        }
    }

    /// Current branch of the workspace repository
    pub async fn current_branch(&self) -> Option<String> {
        self.commits.current_branch().await
    }

    /// Produce and store a summary for the live session.
    ///
    /// Uses the summarizer when AI summaries are enabled and one is given,
    /// otherwise (or when it fails) the deterministic fallback.
    pub async fn summarize(&self, summarizer: Option<&dyn Summarizer>) -> String {
        let config = self.config();
        let snapshot = self.current_session();

        let summary = match summarizer {
            Some(summarizer) if config.ai_summary_active() => {
                match summarizer.summarize(&snapshot, &config).await {
                    Ok(text) if !text.trim().is_empty() => text,
                    Ok(_) => fallback_summary(&snapshot),
                    Err(e) => {
                        tracing::warn!(error = %e, "Summarizer failed, using fallback");
                        fallback_summary(&snapshot)
                    }
                }
            }
            _ => fallback_summary(&snapshot),
        };

        let mut live = lock(&self.live);
        if live.session.session_id == snapshot.session_id {
            live.session.summary = Some(summary.clone());
        }
        summary
    }
}
