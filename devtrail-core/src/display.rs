//! Display panel protocol
//!
//! Rendering belongs to the host. The tracker pushes snapshots through
//! [`SessionView`] and the panel talks back with small JSON commands:
//!
//! ```json
//! { "command": "openFile", "filePath": "src/lib.rs" }
//! { "command": "refresh" }
//! ```

use crate::tracker::SessionTracker;
use crate::types::SessionData;
use serde::Deserialize;

/// Something that can show a session snapshot.
pub trait SessionView: Send + Sync {
    fn update_content(&self, session: &SessionData);
}

/// Command sent from the panel
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum PanelMessage {
    #[serde(rename_all = "camelCase")]
    OpenFile { file_path: String },
    Refresh,
}

impl PanelMessage {
    /// Parse an inbound message. Unknown or malformed commands give `None`.
    pub fn parse(value: &serde_json::Value) -> Option<Self> {
        match serde_json::from_value(value.clone()) {
            Ok(message) => Some(message),
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring panel message");
                None
            }
        }
    }
}

/// What the host should do after a panel message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelAction {
    /// Open this workspace-relative path in the editor
    OpenFile(String),
    /// The view was refreshed with a new snapshot
    Refreshed,
    Ignored,
}

/// Handle one panel message against the tracker.
///
/// `refresh` pulls new commits and pushes the current session to `view`.
pub async fn handle_panel_message(
    tracker: &SessionTracker,
    view: &dyn SessionView,
    value: &serde_json::Value,
) -> PanelAction {
    match PanelMessage::parse(value) {
        Some(PanelMessage::OpenFile { file_path }) => PanelAction::OpenFile(file_path),
        Some(PanelMessage::Refresh) => {
            tracker.refresh_commits().await;
            view.update_content(&tracker.current_session());
            PanelAction::Refreshed
        }
        None => PanelAction::Ignored,
    }
}
