//! # devtrail-core
//!
//! Core library for devtrail, a development-session tracker embedded in an
//! editor host.
//!
//! This library provides:
//! - Monitors for file edits, git commits, and terminal errors
//! - A session tracker that combines them into one live session record
//! - JSON session storage and configuration management
//! - Privacy filtering and opt-in team aggregation
//! - Logging infrastructure
//!
//! ## Architecture
//!
//! The host editor forwards its callbacks (file saved, terminal output, ...)
//! to the monitors in [`monitor`]. Each monitor filters what it sees through
//! the [`ExclusionFilter`] and publishes events that the [`SessionTracker`]
//! folds into the live [`SessionData`]. Sessions are persisted through
//! [`SessionStorage`] and optionally shared through the
//! [`TeamDataAggregator`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use devtrail_core::{Config, JsonSessionStore, SessionTracker, TrackerDeps};
//! use devtrail_core::monitor::{FileChangeMonitor, GitActivityMonitor, TerminalErrorMonitor};
//! use std::sync::Arc;
//!
//! # async fn run() -> devtrail_core::Result<()> {
//! let config = Config::load()?;
//! let tracker_config = Arc::new(config.tracker.clone());
//! let workspace = std::env::current_dir()?;
//!
//! let deps = TrackerDeps {
//!     files: Arc::new(FileChangeMonitor::new(&workspace, &tracker_config)),
//!     commits: Arc::new(GitActivityMonitor::new(&workspace, &tracker_config)),
//!     errors: Arc::new(TerminalErrorMonitor::new()),
//!     storage: Arc::new(JsonSessionStore::new(config.session_root())),
//! };
//! let tracker = SessionTracker::open(tracker_config, deps).await;
//! tracker.start_tracking();
//! tracker.save_session().await?;
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use config::{Config, ExtensionConfig};
pub use error::{Error, Result};
pub use filter::ExclusionFilter;
pub use store::{JsonSessionStore, SessionStorage};
pub use team::{TeamBackend, TeamDataAggregator};
pub use tracker::{SessionTracker, TrackerDeps, TrackerState};
pub use types::*;

// Public modules
pub mod config;
pub mod display;
pub mod error;
pub mod events;
pub mod filter;
pub mod format;
pub mod logging;
pub mod monitor;
pub mod store;
pub mod summary;
pub mod team;
pub mod tracker;
pub mod types;
