//! Session persistence
//!
//! Sessions are stored as one pretty-printed JSON document per session ID:
//!
//! ```text
//! <root>/
//!   ├─ 2f6c…e1.json      full SessionData, camelCase keys, RFC 3339 timestamps
//!   ├─ 8a01…9c.json
//!   └─ last-session      ID of the most recently saved session
//! ```
//!
//! Reads never fail: a missing or unparseable file is reported as absence.
//! Writes and deletes return errors so the caller can log them.

use crate::error::{Error, Result};
use crate::types::SessionData;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const LAST_SESSION_FILE: &str = "last-session";
const SESSION_EXTENSION: &str = "json";

/// Durable, keyed storage for session records.
#[async_trait]
pub trait SessionStorage: Send + Sync {
    /// Persist a session, overwriting any earlier copy with the same ID.
    async fn save_session(&self, data: &SessionData) -> Result<()>;

    /// The most recently saved session, if one can be read.
    async fn load_last_session(&self) -> Option<SessionData>;

    /// A session by ID, if one can be read.
    async fn load_session(&self, session_id: &str) -> Option<SessionData>;

    /// IDs of all stored sessions, sorted.
    async fn all_session_ids(&self) -> Vec<String>;

    /// Remove one session. Missing sessions are not an error.
    async fn delete_session(&self, session_id: &str) -> Result<()>;

    /// Remove every stored session.
    async fn clear_all_sessions(&self) -> Result<()>;

    /// Whether the storage root can be written.
    async fn is_available(&self) -> bool;
}

/// Check that a session ID is safe to use as a file name.
pub fn validate_session_id(session_id: &str) -> Result<()> {
    let valid = !session_id.is_empty()
        && session_id.len() <= 128
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidSessionId(session_id.to_string()))
    }
}

/// JSON-file session store rooted at a directory supplied by the host
#[derive(Debug, Clone)]
pub struct JsonSessionStore {
    root: PathBuf,
}

impl JsonSessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Storage root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn session_path(&self, session_id: &str) -> Result<PathBuf> {
        validate_session_id(session_id)?;
        Ok(self
            .root
            .join(format!("{}.{}", session_id, SESSION_EXTENSION)))
    }

    fn last_session_path(&self) -> PathBuf {
        self.root.join(LAST_SESSION_FILE)
    }

    async fn read_last_session_id(&self) -> Option<String> {
        match tokio::fs::read_to_string(self.last_session_path()).await {
            Ok(content) => {
                let id = content.trim();
                (!id.is_empty()).then(|| id.to_string())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read last session pointer");
                None
            }
        }
    }

    async fn remove_if_exists(path: &Path) -> Result<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Write via a sibling temp file so readers never observe a partial document.
///
/// Each call gets its own temp name, so overlapping writes to the same
/// target never share one.
async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(format!(".{}.tmp", uuid::Uuid::new_v4().simple()));
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, contents).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

#[async_trait]
impl SessionStorage for JsonSessionStore {
    async fn save_session(&self, data: &SessionData) -> Result<()> {
        let path = self.session_path(&data.session_id)?;
        tokio::fs::create_dir_all(&self.root).await.map_err(|e| {
            Error::Storage(format!(
                "failed to create session directory {}: {}",
                self.root.display(),
                e
            ))
        })?;

        let json = serde_json::to_vec_pretty(data)?;
        write_atomic(&path, &json).await?;
        write_atomic(&self.last_session_path(), data.session_id.as_bytes()).await?;

        tracing::debug!(
            session_id = %data.session_id,
            path = %path.display(),
            "Saved session"
        );
        Ok(())
    }

    async fn load_last_session(&self) -> Option<SessionData> {
        let session_id = self.read_last_session_id().await?;
        self.load_session(&session_id).await
    }

    async fn load_session(&self, session_id: &str) -> Option<SessionData> {
        let path = match self.session_path(session_id) {
            Ok(path) => path,
            Err(e) => {
                tracing::debug!(error = %e, "Refusing to load session");
                return None;
            }
        };

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(session_id = %session_id, "No stored session");
                return None;
            }
            Err(e) => {
                tracing::warn!(
                    session_id = %session_id,
                    error = %e,
                    "Failed to read session file"
                );
                return None;
            }
        };

        match serde_json::from_str(&content) {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::warn!(
                    session_id = %session_id,
                    error = %e,
                    "Failed to parse session file"
                );
                None
            }
        }
    }

    async fn all_session_ids(&self) -> Vec<String> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) => {
                if e.kind() != ErrorKind::NotFound {
                    tracing::warn!(error = %e, "Failed to list session directory");
                }
                return Vec::new();
            }
        };

        let mut ids = Vec::new();
        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => {
                    let path = entry.path();
                    if path.extension().and_then(|e| e.to_str()) != Some(SESSION_EXTENSION) {
                        continue;
                    }
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        if validate_session_id(stem).is_ok() {
                            ids.push(stem.to_string());
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read session directory entry");
                    break;
                }
            }
        }

        ids.sort();
        ids
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        let path = self.session_path(session_id)?;
        Self::remove_if_exists(&path).await?;

        if self.read_last_session_id().await.as_deref() == Some(session_id) {
            Self::remove_if_exists(&self.last_session_path()).await?;
        }

        tracing::debug!(session_id = %session_id, "Deleted session");
        Ok(())
    }

    async fn clear_all_sessions(&self) -> Result<()> {
        for session_id in self.all_session_ids().await {
            let path = self.session_path(&session_id)?;
            Self::remove_if_exists(&path).await?;
        }
        Self::remove_if_exists(&self.last_session_path()).await?;

        tracing::info!(root = %self.root.display(), "Cleared all sessions");
        Ok(())
    }

    async fn is_available(&self) -> bool {
        if tokio::fs::create_dir_all(&self.root).await.is_err() {
            return false;
        }
        let marker = self.root.join(".write-check");
        let writable = tokio::fs::write(&marker, b"ok").await.is_ok();
        let _ = tokio::fs::remove_file(&marker).await;
        writable
    }
}
