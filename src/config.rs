use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::agents::agent::AgentSettings;
use crate::agents::orchestrator::OrchestratorSettings;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub provider: ProviderConfig,
    pub agents: AgentsConfig,
    pub coordinator: CoordinatorConfig,
    pub ui: UIConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Code generation CLI, looked up on PATH
    pub command: String,
    pub model: Option<String>,
    pub max_turns: u32,
    pub permission_mode: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            command: "claude".to_string(),
            model: None,
            max_turns: 10,
            permission_mode: "acceptEdits".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentsConfig {
    pub poll_interval_ms: u64,
    pub error_backoff_ms: u64,
    pub recent_results: usize,
    pub output_dir: PathBuf,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            error_backoff_ms: 5000,
            recent_results: 10,
            output_dir: PathBuf::from("output"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub monitor_interval_ms: u64,
    pub monitor_backoff_ms: u64,
    pub drain_poll_ms: u64,
    pub drain_timeout_secs: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            monitor_interval_ms: 5000,
            monitor_backoff_ms: 10000,
            drain_poll_ms: 2000,
            drain_timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UIConfig {
    /// Show the live dashboard instead of printing once at the end
    pub dashboard: bool,
    pub refresh_ms: u64,
}

impl Default for UIConfig {
    fn default() -> Self {
        Self {
            dashboard: false,
            refresh_ms: 500,
        }
    }
}

impl FleetConfig {
    /// Load from the user config file, writing the defaults there on first run
    pub fn load() -> Result<Self> {
        Self::load_from(Self::config_file_path()?)
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = Self::default();
            default_config.save_to(path)?;
            Ok(default_config)
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(Self::config_file_path()?)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_file_path() -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Could not find home directory"))?;
        Ok(home.join(".config").join("codefleet").join("config.toml"))
    }

    pub fn agent_settings(&self) -> AgentSettings {
        AgentSettings {
            poll_interval: Duration::from_millis(self.agents.poll_interval_ms),
            error_backoff: Duration::from_millis(self.agents.error_backoff_ms),
            recent_results: self.agents.recent_results,
            max_turns: self.provider.max_turns,
            permission_mode: self.provider.permission_mode.clone(),
        }
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            monitor_interval: Duration::from_millis(self.coordinator.monitor_interval_ms),
            monitor_backoff: Duration::from_millis(self.coordinator.monitor_backoff_ms),
            drain_poll: Duration::from_millis(self.coordinator.drain_poll_ms),
            drain_timeout: Duration::from_secs(self.coordinator.drain_timeout_secs),
            output_dir: self.agents.output_dir.clone(),
            agent: self.agent_settings(),
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.ui.refresh_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_load_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = FleetConfig::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.provider.command, "claude");
        assert_eq!(config.coordinator.drain_timeout_secs, 300);

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("[coordinator]"));
        assert!(written.contains("monitor_interval_ms = 5000"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[provider]\nmodel = \"sonnet\"\n\n[coordinator]\ndrain_poll_ms = 250\n",
        )
        .unwrap();

        let config = FleetConfig::load_from(&path).unwrap();
        assert_eq!(config.provider.model.as_deref(), Some("sonnet"));
        assert_eq!(config.provider.command, "claude");
        assert_eq!(config.agents.poll_interval_ms, 1000);

        let settings = config.orchestrator_settings();
        assert_eq!(settings.drain_poll, Duration::from_millis(250));
        assert_eq!(settings.monitor_backoff, Duration::from_secs(10));
        assert_eq!(settings.agent.error_backoff, Duration::from_secs(5));
        assert_eq!(settings.agent.permission_mode, "acceptEdits");
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[agents\npoll_interval_ms = ").unwrap();

        assert!(FleetConfig::load_from(&path).is_err());
    }
}
