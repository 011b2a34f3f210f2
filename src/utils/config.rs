//! Host Configuration
//!
//! Reads and writes the host configuration file under the user config
//! directory, creating defaults on first run.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::utils::error::{AgentError, AgentResult};

/// Configuration for the host process
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HostConfig {
    /// Command used to launch the agent runtime CLI
    pub runtime_command: String,
    /// Extra arguments prepended to the runtime invocation
    pub runtime_args: Vec<String>,
    /// Model id used when the UI does not pick one at init
    pub default_model: Option<String>,
    /// Seconds before an unanswered question resolves with an empty answer.
    /// None means wait indefinitely.
    pub question_timeout_secs: Option<u64>,
    /// Capacity of the runtime event channel
    pub event_buffer: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            runtime_command: "claude".to_string(),
            runtime_args: Vec::new(),
            default_model: None,
            question_timeout_secs: None,
            event_buffer: 100,
        }
    }
}

impl HostConfig {
    /// Load the configuration, creating a default file on first run
    pub fn load() -> AgentResult<Self> {
        let path = config_path()?;
        Self::load_from(&path)
    }

    /// Load from an explicit path (testing seam)
    pub fn load_from(path: &Path) -> AgentResult<Self> {
        if path.exists() {
            let content = fs::read_to_string(path)?;
            let config: HostConfig = serde_json::from_str(&content)?;
            config.validate().map_err(AgentError::validation)?;
            Ok(config)
        } else {
            let config = Self::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Save to a file with pretty formatting, creating parent directories
    pub fn save_to(&self, path: &Path) -> AgentResult<()> {
        self.validate().map_err(AgentError::validation)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Validate config values
    pub fn validate(&self) -> Result<(), String> {
        if self.runtime_command.trim().is_empty() {
            return Err("runtimeCommand must not be empty".to_string());
        }
        if self.event_buffer == 0 {
            return Err("eventBuffer must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Path of the host config file under the user config directory
pub fn config_path() -> AgentResult<PathBuf> {
    let base = dirs::config_dir()
        .ok_or_else(|| AgentError::unknown("Could not determine config directory"))?;
    Ok(base.join("atelier").join("host.json"))
}

/// Default workspace directory used when the UI does not supply one
pub fn default_workspace_dir() -> AgentResult<PathBuf> {
    let base =
        dirs::home_dir().ok_or_else(|| AgentError::unknown("Could not determine home directory"))?;
    Ok(base.join("AtelierWorkspace"))
}
