//! TerraClaw daemon configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, TerraclawError};

/// Root daemon configuration, loaded from ~/.terraclaw/config.toml.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// TerraClaw home directory — state, template cache, and working dirs live here.
    #[serde(default = "default_home_dir")]
    pub home_dir: PathBuf,
    /// Path to the workspace definitions file (JSON), re-read on every tick.
    #[serde(default = "default_workspaces_file")]
    pub workspaces_file: PathBuf,
    /// Poll cadence for the scheduler loop, in seconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Wall-clock bound for one provisioning step (init/plan/apply/destroy).
    #[serde(default = "default_action_timeout")]
    pub action_timeout_secs: u64,
    /// Wall-clock bound for one template fetch/update.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
    /// How many bytes of action output to retain per workspace.
    #[serde(default = "default_keep_logs")]
    pub keep_logs_bytes: usize,
}

fn default_home_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".terraclaw")
}
fn default_workspaces_file() -> PathBuf {
    default_home_dir().join("workspaces.json")
}
fn default_poll_interval() -> u64 {
    30
}
fn default_action_timeout() -> u64 {
    3600
}
fn default_fetch_timeout() -> u64 {
    600
}
fn default_keep_logs() -> usize {
    64 * 1024
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            home_dir: default_home_dir(),
            workspaces_file: default_workspaces_file(),
            poll_interval_secs: default_poll_interval(),
            action_timeout_secs: default_action_timeout(),
            fetch_timeout_secs: default_fetch_timeout(),
            keep_logs_bytes: default_keep_logs(),
        }
    }
}

impl DaemonConfig {
    /// Load config from the default path, falling back to defaults if absent.
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TerraclawError::Config(format!("failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| TerraclawError::Config(format!("failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Default config path (~/.terraclaw/config.toml).
    pub fn default_path() -> PathBuf {
        default_home_dir().join("config.toml")
    }

    /// Directory holding one persisted runtime-state file per workspace.
    pub fn state_dir(&self) -> PathBuf {
        self.home_dir.join("state")
    }

    /// Directory holding the template cache, one subdirectory per template.
    pub fn templates_dir(&self) -> PathBuf {
        self.home_dir.join("templates")
    }

    /// Path of the template registry records database.
    pub fn registry_db(&self) -> PathBuf {
        self.home_dir.join("registry.db")
    }

    /// Directory holding per-workspace materialized working directories.
    pub fn work_dir(&self) -> PathBuf {
        self.home_dir.join("work")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = DaemonConfig::default();
        assert_eq!(cfg.poll_interval_secs, 30);
        assert_eq!(cfg.action_timeout_secs, 3600);
        assert!(cfg.state_dir().ends_with("state"));
    }

    #[test]
    fn test_load_partial_toml() {
        let dir = std::env::temp_dir().join("terraclaw-test-config");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "poll_interval_secs = 10\n").unwrap();

        let cfg = DaemonConfig::load_from(&path).unwrap();
        assert_eq!(cfg.poll_interval_secs, 10);
        // Unset fields fall back to defaults
        assert_eq!(cfg.action_timeout_secs, 3600);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_bad_toml() {
        let dir = std::env::temp_dir().join("terraclaw-test-badconfig");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "poll_interval_secs = \"not a number\"").unwrap();

        assert!(DaemonConfig::load_from(&path).is_err());
        std::fs::remove_dir_all(&dir).ok();
    }
}
