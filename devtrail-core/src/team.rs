//! Team aggregation with a privacy gate
//!
//! Nothing leaves the local record unless the user has explicitly opted in
//! **and** `privacySettings.shareWithTeam` is enabled. Shared sessions are
//! run through the exclusion filter once more before they are handed to the
//! [`TeamBackend`], and aggregated views never carry session data for members
//! who have not opted in.
//!
//! The opt-in flag is persisted on its own, separate from the session store:
//!
//! ```json
//! { "optedIn": true, "updatedAt": "2024-05-01T10:00:00Z" }
//! ```
//!
//! Transport to a real team service is the backend's concern;
//! [`InMemoryTeamBackend`] keeps everything in process.

use crate::config::ExtensionConfig;
use crate::error::{Error, Result};
use crate::events::lock;
use crate::filter::ExclusionFilter;
use crate::types::{
    SessionData, TeamMember, TeamMemberSession, TeamSessionData, UserPermissions,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// File name of the persisted opt-in flag
pub const OPT_IN_FILE: &str = "team-sharing.json";

/// Connection to wherever team data lives.
#[async_trait]
pub trait TeamBackend: Send + Sync {
    /// Permissions of the current user, `None` if not on a team.
    async fn user_permissions(&self) -> Result<Option<UserPermissions>>;

    /// Identity of the current user.
    async fn current_member(&self) -> Result<TeamMember>;

    /// Store or replace the current user's shared session.
    async fn publish(&self, entry: TeamMemberSession) -> Result<()>;

    /// Remove a member's shared session.
    async fn withdraw(&self, member_id: &str) -> Result<()>;

    /// Every member of the team with whatever they last shared.
    async fn member_sessions(&self, team_id: &str) -> Result<Vec<TeamMemberSession>>;
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OptInRecord {
    opted_in: bool,
    updated_at: DateTime<Utc>,
}

/// Persisted opt-in flag
#[derive(Debug, Clone)]
pub struct OptInStore {
    path: PathBuf,
}

impl OptInStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Opt-in store in the given data directory
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(OPT_IN_FILE))
    }

    /// Whether the user opted in. Missing or unreadable state means no.
    pub async fn load(&self) -> bool {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return false,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read team sharing state");
                return false;
            }
        };

        match serde_json::from_str::<OptInRecord>(&content) {
            Ok(record) => record.opted_in,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to parse team sharing state");
                false
            }
        }
    }

    /// Persist the flag.
    pub async fn store(&self, opted_in: bool) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let record = OptInRecord {
            opted_in,
            updated_at: Utc::now(),
        };
        tokio::fs::write(&self.path, serde_json::to_vec_pretty(&record)?).await?;
        Ok(())
    }
}

/// Privacy-gated sharing and aggregation of session data
pub struct TeamDataAggregator {
    config: Mutex<Arc<ExtensionConfig>>,
    opt_in: OptInStore,
    backend: Arc<dyn TeamBackend>,
}

impl TeamDataAggregator {
    pub fn new(
        config: Arc<ExtensionConfig>,
        opt_in: OptInStore,
        backend: Arc<dyn TeamBackend>,
    ) -> Self {
        Self {
            config: Mutex::new(config),
            opt_in,
            backend,
        }
    }

    /// Swap in a new configuration.
    pub fn update_config(&self, config: Arc<ExtensionConfig>) {
        *lock(&self.config) = config;
    }

    fn config(&self) -> Arc<ExtensionConfig> {
        Arc::clone(&lock(&self.config))
    }

    pub async fn has_user_opted_in(&self) -> bool {
        self.opt_in.load().await
    }

    pub async fn opt_in_to_team_sharing(&self) -> Result<()> {
        self.opt_in.store(true).await?;
        tracing::info!("Opted in to team sharing");
        Ok(())
    }

    /// Record the opt-out and ask the backend to drop anything shared.
    pub async fn opt_out_of_team_sharing(&self) -> Result<()> {
        self.opt_in.store(false).await?;
        tracing::info!("Opted out of team sharing");

        match self.backend.current_member().await {
            Ok(member) => {
                if let Err(e) = self.backend.withdraw(&member.id).await {
                    tracing::warn!(error = %e, "Failed to withdraw shared session");
                }
            }
            Err(e) => tracing::warn!(error = %e, "Failed to resolve current team member"),
        }
        Ok(())
    }

    /// Share a session with the team if the user allowed it.
    ///
    /// Returns true only when data was handed to the backend.
    pub async fn share_session_data(&self, data: &SessionData) -> bool {
        let config = self.config();
        if !config.privacy_settings.share_with_team {
            tracing::debug!("Team sharing disabled in privacy settings");
            return false;
        }
        if !self.has_user_opted_in().await {
            tracing::debug!("User has not opted in to team sharing");
            return false;
        }

        let filtered = ExclusionFilter::new(&config.privacy_settings).filter_session(data);

        let result = async {
            let member = self.backend.current_member().await?;
            self.backend
                .publish(TeamMemberSession {
                    member,
                    session_data: Some(filtered),
                    has_opted_in: true,
                    last_updated: Utc::now(),
                })
                .await
        }
        .await;

        match result {
            Ok(()) => {
                tracing::info!(session_id = %data.session_id, "Shared session with team");
                true
            }
            Err(e) => {
                tracing::warn!(
                    session_id = %data.session_id,
                    error = %e,
                    "Failed to share session"
                );
                false
            }
        }
    }

    /// Permissions of the current user, `None` when unavailable.
    pub async fn user_permissions(&self) -> Option<UserPermissions> {
        match self.backend.user_permissions().await {
            Ok(permissions) => permissions,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to fetch team permissions");
                None
            }
        }
    }

    /// Aggregated team view, or `None` without view permission.
    pub async fn team_session_data(&self) -> Option<TeamSessionData> {
        let permissions = self.user_permissions().await?;
        if !permissions.can_view_team_data {
            return None;
        }

        let entries = match self.backend.member_sessions(&permissions.team_id).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(
                    team_id = %permissions.team_id,
                    error = %e,
                    "Failed to fetch team sessions"
                );
                return None;
            }
        };

        // The local flag wins for the current user, even if a withdraw failed
        let current_id = match self.backend.current_member().await {
            Ok(member) => Some(member.id),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to resolve current team member");
                None
            }
        };
        let opted_in = self.has_user_opted_in().await;

        let members = entries
            .into_iter()
            .map(|mut entry| {
                if current_id.as_deref() == Some(entry.member.id.as_str()) {
                    entry.has_opted_in &= opted_in;
                }
                if !entry.has_opted_in {
                    entry.session_data = None;
                }
                entry
            })
            .collect();

        Some(TeamSessionData {
            team_id: permissions.team_id,
            members,
            aggregated_at: Utc::now(),
        })
    }

    pub async fn is_team_dashboard_available(&self) -> bool {
        self.config().enable_team_dashboard && self.user_permissions().await.is_some()
    }
}

/// Team backend held entirely in memory
pub struct InMemoryTeamBackend {
    current: TeamMember,
    permissions: Option<UserPermissions>,
    roster: Mutex<Vec<TeamMember>>,
    shared: Mutex<HashMap<String, TeamMemberSession>>,
}

impl InMemoryTeamBackend {
    /// Backend where `current` is the only member.
    pub fn new(current: TeamMember, permissions: Option<UserPermissions>) -> Self {
        Self {
            roster: Mutex::new(vec![current.clone()]),
            current,
            permissions,
            shared: Mutex::new(HashMap::new()),
        }
    }

    /// Add another member to the roster.
    pub fn add_member(&self, member: TeamMember) {
        let mut roster = lock(&self.roster);
        if !roster.iter().any(|m| m.id == member.id) {
            roster.push(member);
        }
    }

    /// Insert a record as though another member had published it.
    pub fn insert_record(&self, entry: TeamMemberSession) {
        self.add_member(entry.member.clone());
        lock(&self.shared).insert(entry.member.id.clone(), entry);
    }

    /// What a member has currently shared
    pub fn record_for(&self, member_id: &str) -> Option<TeamMemberSession> {
        lock(&self.shared).get(member_id).cloned()
    }

    /// Number of shared records
    pub fn record_count(&self) -> usize {
        lock(&self.shared).len()
    }
}

#[async_trait]
impl TeamBackend for InMemoryTeamBackend {
    async fn user_permissions(&self) -> Result<Option<UserPermissions>> {
        Ok(self.permissions.clone())
    }

    async fn current_member(&self) -> Result<TeamMember> {
        Ok(self.current.clone())
    }

    async fn publish(&self, entry: TeamMemberSession) -> Result<()> {
        if entry.member.id != self.current.id {
            return Err(Error::Team(format!(
                "cannot publish on behalf of {}",
                entry.member.id
            )));
        }
        lock(&self.shared).insert(entry.member.id.clone(), entry);
        Ok(())
    }

    async fn withdraw(&self, member_id: &str) -> Result<()> {
        lock(&self.shared).remove(member_id);
        Ok(())
    }

    async fn member_sessions(&self, team_id: &str) -> Result<Vec<TeamMemberSession>> {
        match &self.permissions {
            Some(p) if p.team_id == team_id => {}
            _ => return Err(Error::Team(format!("unknown team {}", team_id))),
        }

        let roster = lock(&self.roster).clone();
        let shared = lock(&self.shared);
        Ok(roster
            .into_iter()
            .map(|member| match shared.get(&member.id) {
                Some(entry) => entry.clone(),
                None => TeamMemberSession {
                    member,
                    session_data: None,
                    has_opted_in: false,
                    last_updated: Utc::now(),
                },
            })
            .collect())
    }
}
