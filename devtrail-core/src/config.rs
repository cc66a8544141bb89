//! Configuration loading and validation
//!
//! Configuration is loaded from `~/.config/devtrail/config.toml`, or handed
//! over by the host editor as a JSON settings object (see
//! [`ExtensionConfig::from_json`]).
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/devtrail/` (~/.config/devtrail/)
//! - Data: `$XDG_DATA_HOME/devtrail/` (~/.local/share/devtrail/)
//! - State/Logs: `$XDG_STATE_HOME/devtrail/` (~/.local/state/devtrail/)
//!
//! A validated [`ExtensionConfig`] is never mutated after construction.
//! Components hold an `Arc<ExtensionConfig>` and receive a fresh one through
//! their `update_config` methods whenever the host settings change.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Upper bound for `maxCommitsToShow`
pub const MAX_COMMITS_LIMIT: usize = 100;

/// Upper bound for `aiMaxTokens`
pub const MAX_AI_TOKENS: u32 = 4000;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Session tracking settings (same shape as the host settings)
    #[serde(default)]
    pub tracker: ExtensionConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Session storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Session tracking settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtensionConfig {
    /// Master switch for tracking
    pub enabled: bool,
    /// Maximum number of commits kept per query
    pub max_commits_to_show: usize,
    /// Ask the configured AI provider for summaries
    #[serde(rename = "enableAISummary")]
    pub enable_ai_summary: bool,
    /// Which AI provider produces summaries
    pub ai_provider: AiProvider,
    /// API key for the OpenAI provider
    pub openai_api_key: String,
    /// Token budget for AI summaries
    pub ai_max_tokens: u32,
    /// Sampling temperature for AI summaries
    pub ai_temperature: f32,
    /// Show the team dashboard when permissions allow
    pub enable_team_dashboard: bool,
    /// Exclusion and sharing rules
    pub privacy_settings: PrivacySettings,
}

impl Default for ExtensionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_commits_to_show: 10,
            enable_ai_summary: false,
            ai_provider: AiProvider::Disabled,
            openai_api_key: String::new(),
            ai_max_tokens: 500,
            ai_temperature: 0.7,
            enable_team_dashboard: false,
            privacy_settings: PrivacySettings::default(),
        }
    }
}

/// Supported summary providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiProvider {
    #[serde(rename = "openai")]
    OpenAi,
    Local,
    #[default]
    Disabled,
}

/// Privacy rules applied before anything is recorded or shared
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PrivacySettings {
    /// Allow opted-in users to publish session data to the team
    pub share_with_team: bool,
    /// Glob-like patterns for files that are never tracked
    pub exclude_file_patterns: Vec<String>,
    /// Case-insensitive substrings for commit messages that are never tracked
    pub exclude_commit_patterns: Vec<String>,
}

impl Default for PrivacySettings {
    fn default() -> Self {
        Self {
            share_with_team: false,
            exclude_file_patterns: vec![
                "node_modules/**".to_string(),
                ".git/**".to_string(),
                "*.log".to_string(),
                ".env*".to_string(),
            ],
            exclude_commit_patterns: vec![],
        }
    }
}

impl ExtensionConfig {
    /// Parse and validate settings handed over by the host as JSON.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        let config: ExtensionConfig = serde_json::from_value(value)
            .map_err(|e| Error::Config(format!("failed to parse settings: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.max_commits_to_show == 0 || self.max_commits_to_show > MAX_COMMITS_LIMIT {
            return Err(Error::Config(format!(
                "maxCommitsToShow must be between 1 and {}",
                MAX_COMMITS_LIMIT
            )));
        }
        if self.ai_max_tokens == 0 || self.ai_max_tokens > MAX_AI_TOKENS {
            return Err(Error::Config(format!(
                "aiMaxTokens must be between 1 and {}",
                MAX_AI_TOKENS
            )));
        }
        if !self.ai_temperature.is_finite() || !(0.0..=2.0).contains(&self.ai_temperature) {
            return Err(Error::Config(
                "aiTemperature must be between 0.0 and 2.0".to_string(),
            ));
        }
        if self.enable_ai_summary
            && self.ai_provider == AiProvider::OpenAi
            && self.openai_api_key.trim().is_empty()
        {
            return Err(Error::Config(
                "openaiApiKey is required when the openai provider is enabled".to_string(),
            ));
        }

        let privacy = &self.privacy_settings;
        if privacy
            .exclude_file_patterns
            .iter()
            .chain(&privacy.exclude_commit_patterns)
            .any(|p| p.trim().is_empty())
        {
            return Err(Error::Config(
                "exclude patterns must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// True when an AI provider should be asked for summaries
    pub fn ai_summary_active(&self) -> bool {
        self.enable_ai_summary && self.ai_provider != AiProvider::Disabled
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

/// Session storage configuration
#[derive(Debug, Deserialize, Default)]
pub struct StorageConfig {
    /// Override for the session storage root
    pub root: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.tracker.validate()?;
        Ok(config)
    }

    /// Session storage root, honouring the `[storage]` override
    pub fn session_root(&self) -> PathBuf {
        self.storage
            .root
            .clone()
            .unwrap_or_else(|| Self::data_dir().join("sessions"))
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/devtrail/config.toml` (~/.config/devtrail/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("devtrail").join("config.toml")
    }

    /// Returns the data directory path (for sessions and team state)
    ///
    /// `$XDG_DATA_HOME/devtrail/` (~/.local/share/devtrail/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("devtrail")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/devtrail/` (~/.local/state/devtrail/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("devtrail")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/devtrail/devtrail.log` (~/.local/state/devtrail/devtrail.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("devtrail.log")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.tracker.enabled);
        assert_eq!(config.tracker.max_commits_to_show, 10);
        assert_eq!(config.tracker.ai_provider, AiProvider::Disabled);
        assert!(config.tracker.validate().is_ok());
        assert!(config
            .tracker
            .privacy_settings
            .exclude_file_patterns
            .contains(&"node_modules/**".to_string()));
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[tracker]
maxCommitsToShow = 25
aiProvider = "local"
enableAISummary = true

[tracker.privacySettings]
shareWithTeam = true
excludeCommitPatterns = ["WIP:"]

[logging]
level = "debug"

[storage]
root = "/tmp/devtrail-sessions"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.tracker.max_commits_to_show, 25);
        assert_eq!(config.tracker.ai_provider, AiProvider::Local);
        assert!(config.tracker.ai_summary_active());
        assert!(config.tracker.privacy_settings.share_with_team);
        assert_eq!(
            config.tracker.privacy_settings.exclude_commit_patterns,
            vec!["WIP:".to_string()]
        );
        // Unset fields in a section keep their defaults
        assert!(config.tracker.enabled);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(
            config.session_root(),
            PathBuf::from("/tmp/devtrail-sessions")
        );
    }

    #[test]
    fn test_from_json_host_settings() {
        let config = ExtensionConfig::from_json(serde_json::json!({
            "enabled": true,
            "maxCommitsToShow": 5,
            "aiProvider": "openai",
            "enableAISummary": true,
            "openaiApiKey": "sk-test",
            "privacySettings": { "excludeFilePatterns": ["dist/*"] }
        }))
        .unwrap();

        assert_eq!(config.max_commits_to_show, 5);
        assert_eq!(config.ai_provider, AiProvider::OpenAi);
        assert_eq!(
            config.privacy_settings.exclude_file_patterns,
            vec!["dist/*".to_string()]
        );
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let config = ExtensionConfig {
            max_commits_to_show: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = ExtensionConfig {
            ai_temperature: 3.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ExtensionConfig {
            enable_ai_summary: true,
            ai_provider: AiProvider::OpenAi,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let mut config = ExtensionConfig::default();
        config.privacy_settings.exclude_commit_patterns = vec!["  ".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_json_rejects_unknown_provider() {
        let result = ExtensionConfig::from_json(serde_json::json!({ "aiProvider": "claude" }));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_load_from_validates() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[tracker]\nmaxCommitsToShow = 500\n").unwrap();
        assert!(Config::load_from(&path).is_err());

        std::fs::write(&path, "[tracker]\nmaxCommitsToShow = 50\n").unwrap();
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.tracker.max_commits_to_show, 50);
    }
}
