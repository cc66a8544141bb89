//! File change monitor
//!
//! Receives save/create/delete notifications from the host editor and keeps
//! one [`FileEdit`] per workspace-relative path. A later event for a path
//! replaces the earlier one, so a create followed by a delete leaves a single
//! `deleted` entry, and a delete followed by a re-create leaves `created`.

use super::FileMonitor;
use crate::config::ExtensionConfig;
use crate::events::{lock, EventChannel, Subscription};
use crate::filter::ExclusionFilter;
use crate::types::{ChangeType, FileEdit};
use chrono::Utc;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

/// Document descriptor delivered by the host on save
#[derive(Debug, Clone)]
pub struct SavedDocument {
    /// Absolute or workspace-relative path
    pub path: PathBuf,
    /// Number of lines in the saved buffer, when known
    pub line_count: Option<usize>,
}

impl SavedDocument {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            line_count: None,
        }
    }

    pub fn with_line_count(mut self, line_count: usize) -> Self {
        self.line_count = Some(line_count);
        self
    }
}

struct FileMonitorState {
    filter: ExclusionFilter,
    edits: Vec<FileEdit>,
}

/// Tracks file edits inside one workspace
pub struct FileChangeMonitor {
    workspace_root: PathBuf,
    state: Mutex<FileMonitorState>,
    changes: EventChannel<FileEdit>,
}

impl FileChangeMonitor {
    pub fn new(workspace_root: impl Into<PathBuf>, config: &ExtensionConfig) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            state: Mutex::new(FileMonitorState {
                filter: ExclusionFilter::new(&config.privacy_settings),
                edits: Vec::new(),
            }),
            changes: EventChannel::new(),
        }
    }

    /// Host callback: a document was saved.
    pub fn handle_saved(&self, document: &SavedDocument) {
        self.record(&document.path, ChangeType::Modified, document.line_count);
    }

    /// Host callback: a batch of files was created.
    pub fn handle_created<P: AsRef<Path>>(&self, paths: impl IntoIterator<Item = P>) {
        for path in paths {
            self.record(path.as_ref(), ChangeType::Created, None);
        }
    }

    /// Host callback: a batch of files was deleted.
    pub fn handle_deleted<P: AsRef<Path>>(&self, paths: impl IntoIterator<Item = P>) {
        for path in paths {
            self.record(path.as_ref(), ChangeType::Deleted, None);
        }
    }

    /// Normalize a path to the workspace-relative, `/`-separated form.
    ///
    /// Paths outside the workspace root are kept as given.
    pub fn relative_path(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.workspace_root).unwrap_or(path);

        let mut parts: Vec<String> = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
                Component::ParentDir => parts.push("..".to_string()),
                Component::RootDir => parts.push(String::new()),
                Component::Prefix(prefix) => {
                    parts.push(prefix.as_os_str().to_string_lossy().into_owned())
                }
                Component::CurDir => {}
            }
        }
        parts.join("/")
    }

    fn record(&self, path: &Path, change_type: ChangeType, line_count: Option<usize>) {
        let file_path = self.relative_path(path);
        if file_path.is_empty() {
            return;
        }

        let edit = {
            let mut state = lock(&self.state);
            if state.filter.should_exclude_file(&file_path) {
                tracing::trace!(path = %file_path, "Excluded file change");
                return;
            }

            let edit = FileEdit {
                file_path,
                timestamp: Utc::now(),
                change_type,
                line_count,
            };
            state.edits.retain(|e| e.file_path != edit.file_path);
            state.edits.push(edit.clone());
            edit
        };

        tracing::debug!(
            path = %edit.file_path,
            change = %edit.change_type,
            "Recorded file change"
        );
        self.changes.publish(&edit);
    }
}

impl FileMonitor for FileChangeMonitor {
    fn on_file_changed(&self, callback: Box<dyn Fn(&FileEdit) + Send + Sync>) -> Subscription {
        self.changes.subscribe(callback)
    }

    fn edited_files(&self) -> Vec<FileEdit> {
        lock(&self.state).edits.clone()
    }

    fn reset(&self) {
        lock(&self.state).edits.clear();
    }

    /// Rebuild the filter and drop recorded edits it now excludes.
    fn update_config(&self, config: &ExtensionConfig) {
        let filter = ExclusionFilter::new(&config.privacy_settings);
        let mut state = lock(&self.state);
        state.edits.retain(|e| !filter.should_exclude_file(&e.file_path));
        state.filter = filter;
    }
}
