use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{AsterError, Result};

/// Top-level configuration for the Aster support assistant.
///
/// Loaded from `~/.aster/config.toml` by default. Every section falls back
/// to its defaults when omitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AsterConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub knowledge: KnowledgeConfig,
}

impl AsterConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AsterConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| AsterError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Conversation engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Whether the engine accepts turns at all.
    pub enabled: bool,
    /// Exchanges kept per session before the oldest is evicted.
    pub history_limit: usize,
    /// Maximum accepted message length in characters.
    pub max_message_length: usize,
    /// Sessions idle for longer than this are purged.
    pub session_max_age_hours: u32,
    /// Seconds between purge cycles in the terminal front end.
    pub purge_interval_secs: u64,
    /// Exchange name used in canned responses.
    pub exchange_name: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            history_limit: 20,
            max_message_length: 2000,
            session_max_age_hours: 24,
            purge_interval_secs: 3600,
            exchange_name: "Aster Exchange".to_string(),
        }
    }
}

/// Knowledge data source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeConfig {
    /// JSON file replacing the bundled knowledge data. `None` uses the bundle.
    pub path: Option<String>,
}
