//! Configuration schema definitions

use crate::session::{ModelKind, DEFAULT_STORAGE_KEY};
use crate::utils::expand_tilde;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Root configuration for Veritas
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Chat defaults
    #[serde(default)]
    pub chat: ChatConfig,
    /// Session storage
    #[serde(default)]
    pub storage: StorageConfig,
    /// Response producer settings
    #[serde(default)]
    pub producer: ProducerConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Storage directory with `~/` expanded
    pub fn storage_dir(&self) -> PathBuf {
        expand_tilde(&self.storage.dir)
    }

    /// Log directory with `~/` expanded
    pub fn log_dir(&self) -> PathBuf {
        expand_tilde(&self.logging.dir)
    }
}

/// Chat defaults applied at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Model selected when the app starts
    #[serde(default)]
    pub model: ModelKind,
    /// Whether live web search starts enabled
    #[serde(default = "default_live_search")]
    pub live_search: bool,
}

fn default_live_search() -> bool {
    true
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: ModelKind::default(),
            live_search: default_live_search(),
        }
    }
}

/// Where the session list is persisted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the session document
    #[serde(default = "default_storage_dir")]
    pub dir: String,
    /// Storage key (file stem of the session document)
    #[serde(default = "default_storage_key")]
    pub key: String,
}

fn default_storage_dir() -> String {
    "~/.veritas/data".to_string()
}

fn default_storage_key() -> String {
    DEFAULT_STORAGE_KEY.to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: default_storage_dir(),
            key: default_storage_key(),
        }
    }
}

/// Response producer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProducerConfig {
    /// Delay between streamed tokens, in milliseconds
    #[serde(default = "default_token_delay_ms")]
    pub token_delay_ms: u64,
}

fn default_token_delay_ms() -> u64 {
    30
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            token_delay_ms: default_token_delay_ms(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
    /// Directory for log files
    #[serde(default = "default_log_dir")]
    pub dir: String,
    /// Days to keep rotated log files
    #[serde(default = "default_retention_days")]
    pub retention_days: u64,
    /// Module-specific overrides
    #[serde(default)]
    pub overrides: HashMap<String, String>,
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_log_dir() -> String {
    "~/.veritas/logs".to_string()
}

fn default_retention_days() -> u64 {
    7
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            dir: default_log_dir(),
            retention_days: default_retention_days(),
            overrides: HashMap::new(),
        }
    }
}
