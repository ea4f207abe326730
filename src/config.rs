//! Configuration module
//!
//! Reads settings from ~/.config/rmcp-batteries/config.toml: tool
//! filtering, the data directory and the vision model. Home Assistant
//! credentials are kept with the inventory data, not here.

use crate::storage::RecordStore;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_VISION_HOST: &str = "http://localhost:11434";
pub const DEFAULT_VISION_MODEL: &str = "llava";

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// List of disabled tool names (all others are enabled)
    #[serde(default)]
    pub disabled: Vec<String>,

    /// Where inventory and credentials are stored (default: platform data dir)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    #[serde(default)]
    pub vision: VisionConfig,
}

/// Ollama vision model used for device scans
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionConfig {
    #[serde(default = "default_vision_host")]
    pub host: String,
    #[serde(default = "default_vision_model")]
    pub model: String,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            host: default_vision_host(),
            model: default_vision_model(),
        }
    }
}

fn default_vision_host() -> String {
    DEFAULT_VISION_HOST.to_string()
}

fn default_vision_model() -> String {
    DEFAULT_VISION_MODEL.to_string()
}

impl Config {
    /// Get the config file path
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("rmcp-batteries").join("config.toml"))
    }

    /// Load config from file, or return default if not found
    pub fn load() -> Self {
        let Some(path) = Self::path() else {
            tracing::warn!("Could not determine config directory, using defaults");
            return Self::default();
        };
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", path);
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded config from {:?}", path);
                    config
                }
                Err(e) => {
                    tracing::error!("Failed to parse config file: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::error!("Failed to read config file: {}", e);
                Self::default()
            }
        }
    }

    /// Record store rooted at the configured or default data directory
    pub fn records(&self) -> anyhow::Result<RecordStore> {
        let dir = match &self.data_dir {
            Some(dir) => dir.clone(),
            None => RecordStore::default_dir()
                .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?,
        };
        Ok(RecordStore::new(dir))
    }

    /// Get set of disabled tools for fast lookup
    pub fn disabled_set(&self) -> HashSet<String> {
        self.disabled.iter().cloned().collect()
    }

    /// Disabled entries that name no tool in this build
    pub fn unknown_disabled(&self) -> Vec<&str> {
        let known = all_tool_names();
        self.disabled
            .iter()
            .map(String::as_str)
            .filter(|name| !known.contains(name))
            .collect()
    }
}

/// Get list of all available tool names (compile-time known)
pub fn all_tool_names() -> Vec<&'static str> {
    let mut tools = vec![
        "list_items",
        "get_item",
        "add_item",
        "update_item",
        "remove_item",
        "get_stats",
        "export_yaml",
    ];

    #[cfg(feature = "home-assistant")]
    tools.extend([
        "connect_home_assistant",
        "test_connection",
        "sync_home_assistant",
    ]);

    #[cfg(feature = "vision")]
    tools.push("scan_device");

    tools
}
