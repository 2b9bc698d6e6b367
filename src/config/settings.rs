//! Configuration file support for kubectl-nuke

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub defaults: Defaults,

    #[serde(default)]
    pub behavior: Behavior,

    #[serde(default)]
    pub timeouts: Timeouts,

    #[serde(default)]
    pub providers: Providers,
}

/// Default values for common operations
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Defaults {
    #[serde(default = "default_pod_namespace")]
    pub pod_namespace: String,
}

/// Behavior settings
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Behavior {
    /// Ask before force mode mutates anything
    #[serde(default = "default_true")]
    pub confirm_destructive: bool,

    #[serde(default = "default_true")]
    pub show_progress: bool,

    /// Remove hazardous webhooks without asking
    #[serde(default)]
    pub auto_remove_webhooks: bool,
}

/// Polling and settle intervals.
///
/// None of these are load-bearing; they trade runtime against how long
/// background controllers get to react between phases.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Timeouts {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_standard_wait_polls")]
    pub standard_wait_polls: u32,

    #[serde(default = "default_force_wait_polls")]
    pub force_wait_polls: u32,

    /// Polls after the first namespace delete before deciding it is stuck
    #[serde(default = "default_initial_delete_wait_polls")]
    pub initial_delete_wait_polls: u32,

    #[serde(default = "default_application_settle_secs")]
    pub application_settle_secs: u64,

    #[serde(default = "default_application_delete_timeout_secs")]
    pub application_delete_timeout_secs: u64,

    #[serde(default = "default_application_poll_interval_secs")]
    pub application_poll_interval_secs: u64,

    #[serde(default = "default_pod_settle_secs")]
    pub pod_settle_secs: u64,

    #[serde(default = "default_cleanup_settle_secs")]
    pub cleanup_settle_secs: u64,

    #[serde(default = "default_provider_settle_secs")]
    pub provider_settle_secs: u64,
}

/// Known-provider tuning
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Providers {
    /// Extra name fragments that mark a webhook configuration as storage-provider owned
    #[serde(default)]
    pub extra_webhook_name_patterns: Vec<String>,
}

// Default value functions
fn default_pod_namespace() -> String {
    "default".to_string()
}

fn default_true() -> bool {
    true
}

fn default_poll_interval_secs() -> u64 {
    1
}

fn default_standard_wait_polls() -> u32 {
    15
}

fn default_force_wait_polls() -> u32 {
    30
}

fn default_initial_delete_wait_polls() -> u32 {
    5
}

fn default_application_settle_secs() -> u64 {
    10
}

fn default_application_delete_timeout_secs() -> u64 {
    60
}

fn default_application_poll_interval_secs() -> u64 {
    2
}

fn default_pod_settle_secs() -> u64 {
    2
}

fn default_cleanup_settle_secs() -> u64 {
    5
}

fn default_provider_settle_secs() -> u64 {
    3
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            pod_namespace: default_pod_namespace(),
        }
    }
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            confirm_destructive: default_true(),
            show_progress: default_true(),
            auto_remove_webhooks: false,
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            standard_wait_polls: default_standard_wait_polls(),
            force_wait_polls: default_force_wait_polls(),
            initial_delete_wait_polls: default_initial_delete_wait_polls(),
            application_settle_secs: default_application_settle_secs(),
            application_delete_timeout_secs: default_application_delete_timeout_secs(),
            application_poll_interval_secs: default_application_poll_interval_secs(),
            pod_settle_secs: default_pod_settle_secs(),
            cleanup_settle_secs: default_cleanup_settle_secs(),
            provider_settle_secs: default_provider_settle_secs(),
        }
    }
}

impl Settings {
    /// Load settings from file or return defaults
    pub fn load() -> Self {
        match Self::find_config_file() {
            Some(path) => match Self::load_from_file(&path) {
                Ok(settings) => settings,
                Err(e) => {
                    crate::log_warn!("Ignoring config file: {:#}", e);
                    Self::default()
                }
            },
            None => Self::default(),
        }
    }

    /// Load settings from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let settings: Settings = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(settings)
    }

    /// Find config file in standard locations
    /// Priority:
    /// 1. .kubectl-nuke.toml in current directory
    /// 2. ~/.config/kubectl-nuke/config.toml (XDG config directory)
    fn find_config_file() -> Option<PathBuf> {
        let local_config = PathBuf::from(".kubectl-nuke.toml");
        if local_config.exists() {
            return Some(local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let xdg_config = config_dir.join("kubectl-nuke").join("config.toml");
            if xdg_config.exists() {
                return Some(xdg_config);
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.defaults.pod_namespace, "default");
        assert!(settings.behavior.confirm_destructive);
        assert!(!settings.behavior.auto_remove_webhooks);
        assert_eq!(settings.timeouts.standard_wait_polls, 15);
        assert_eq!(settings.timeouts.force_wait_polls, 30);
        assert_eq!(settings.timeouts.application_delete_timeout_secs, 60);
    }

    #[test]
    fn test_partial_deserialization_keeps_defaults() {
        let toml_str = r#"
[timeouts]
force_wait_polls = 90

[behavior]
confirm_destructive = false

[providers]
extra_webhook_name_patterns = ["trident"]
"#;
        let settings: Settings = toml::from_str(toml_str).unwrap();
        assert_eq!(settings.timeouts.force_wait_polls, 90);
        assert_eq!(settings.timeouts.standard_wait_polls, 15);
        assert!(!settings.behavior.confirm_destructive);
        assert!(settings.behavior.show_progress);
        assert_eq!(settings.providers.extra_webhook_name_patterns, vec!["trident"]);
    }

    #[test]
    fn test_load_file_keeps_defaults_for_missing_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[defaults]\npod_namespace = \"batch\"\n").unwrap();

        let loaded = Settings::load_from_file(&path).unwrap();
        assert_eq!(loaded.defaults.pod_namespace, "batch");
        assert!(loaded.behavior.confirm_destructive);
    }

    #[test]
    fn test_load_invalid_file_errors() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[timeouts\n").unwrap();

        let err = Settings::load_from_file(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }
}
