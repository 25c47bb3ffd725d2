//! Configuration management
//!
//! This module handles loading, validation, and management of the Mnemo
//! configuration. Configuration is stored in TOML format at
//! ~/.mnemo/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: log level, data directory
//! - **session**: short-term window size and keying
//! - **preferences**: preference cap and extra stop-words
//! - **persistence**: durable file name, flush cadence, retry and timeout budgets
//!
//! # Examples
//!
//! ```no_run
//! use mnemo_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//!
//! println!("Memory file: {:?}", config.memory_file());
//! println!("Preference cap: {}", config.preferences.max_tokens);
//! # Ok(())
//! # }
//! ```

use sdk::errors::MemoryError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::memory::preference::{MergePolicy, DEFAULT_MAX_TOKENS};
use crate::memory::session::{SessionKey, DEFAULT_MAX_TURNS};
use crate::memory::writer::WriterConfig;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Core settings
    pub core: CoreConfig,

    /// Short-term session memory
    #[serde(default)]
    pub session: SessionConfig,

    /// Long-term preference memory
    #[serde(default)]
    pub preferences: PreferencesConfig,

    /// Durable storage and background writer
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

/// Core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// Session memory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Turns kept per window
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,

    /// File turns under the session id or the user id
    #[serde(default)]
    pub key_by: SessionKey,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            key_by: SessionKey::default(),
        }
    }
}

/// Preference memory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreferencesConfig {
    /// Maximum preference tokens kept per user
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Stop-words added to the built-in list
    #[serde(default)]
    pub extra_stop_words: Vec<String>,
}

impl Default for PreferencesConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            extra_stop_words: Vec::new(),
        }
    }
}

impl PreferencesConfig {
    /// Merge policy built from this section
    pub fn merge_policy(&self) -> MergePolicy {
        MergePolicy::new(self.max_tokens).with_extra_stop_words(self.extra_stop_words.iter().cloned())
    }
}

/// Persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Durable file name inside the data directory
    #[serde(default = "default_file_name")]
    pub file_name: String,

    /// Interval between batched flushes (milliseconds)
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    /// Save attempts per batch before it is dropped
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay between save attempts (milliseconds)
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Budget for a single durable read or write (milliseconds)
    #[serde(default = "default_io_timeout_ms")]
    pub io_timeout_ms: u64,

    /// Snapshots held between writer wake-ups
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            file_name: default_file_name(),
            flush_interval_ms: default_flush_interval_ms(),
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            io_timeout_ms: default_io_timeout_ms(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl PersistenceConfig {
    /// Background writer settings built from this section
    pub fn writer_config(&self) -> WriterConfig {
        WriterConfig {
            flush_interval: Duration::from_millis(self.flush_interval_ms),
            max_attempts: self.max_attempts,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            queue_capacity: self.queue_capacity,
        }
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.mnemo")
}

fn default_max_turns() -> usize {
    DEFAULT_MAX_TURNS
}

fn default_max_tokens() -> usize {
    DEFAULT_MAX_TOKENS
}

fn default_file_name() -> String {
    "long_term_memory.json".to_string()
}

fn default_flush_interval_ms() -> u64 {
    1000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    100
}

fn default_io_timeout_ms() -> u64 {
    5000
}

fn default_queue_capacity() -> usize {
    1
}

impl Config {
    /// Load configuration from the default location (~/.mnemo/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_or_create() -> Result<Self, MemoryError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, MemoryError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| MemoryError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self, MemoryError> {
        let mut config: Config = toml::from_str(contents)
            .map_err(|e| MemoryError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, MemoryError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                MemoryError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let mut config = Self::default_config();

        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| MemoryError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| MemoryError::Config(format!("Failed to write config file: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Get the default configuration file path (~/.mnemo/config.toml)
    fn default_config_path() -> Result<PathBuf, MemoryError> {
        let home = dirs::home_dir()
            .ok_or_else(|| MemoryError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".mnemo").join("config.toml"))
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            core: CoreConfig {
                log_level: default_log_level(),
                data_dir: default_data_dir(),
            },
            session: SessionConfig::default(),
            preferences: PreferencesConfig::default(),
            persistence: PersistenceConfig::default(),
        }
    }

    /// Path of the durable preference file
    pub fn memory_file(&self) -> PathBuf {
        self.core.data_dir.join(&self.persistence.file_name)
    }

    /// Validate and process configuration
    ///
    /// Rejects out-of-range values, expands ~ in the data directory and
    /// creates it when missing.
    fn validate_and_process(&mut self) -> Result<(), MemoryError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(MemoryError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        if self.session.max_turns == 0 {
            return Err(MemoryError::Config(
                "session.max_turns must be at least 1".to_string(),
            ));
        }
        if self.preferences.max_tokens == 0 {
            return Err(MemoryError::Config(
                "preferences.max_tokens must be at least 1".to_string(),
            ));
        }

        let persistence = &self.persistence;
        if persistence.file_name.trim().is_empty() {
            return Err(MemoryError::Config(
                "persistence.file_name must not be empty".to_string(),
            ));
        }
        if persistence.max_attempts == 0 {
            return Err(MemoryError::Config(
                "persistence.max_attempts must be at least 1".to_string(),
            ));
        }
        if persistence.queue_capacity == 0 {
            return Err(MemoryError::Config(
                "persistence.queue_capacity must be at least 1".to_string(),
            ));
        }
        if persistence.flush_interval_ms == 0 || persistence.io_timeout_ms == 0 {
            return Err(MemoryError::Config(
                "persistence.flush_interval_ms and io_timeout_ms must be positive".to_string(),
            ));
        }

        self.core.data_dir = expand_path(&self.core.data_dir)?;

        if !self.core.data_dir.exists() {
            fs::create_dir_all(&self.core.data_dir).map_err(|e| {
                MemoryError::Config(format!("Failed to create data directory: {}", e))
            })?;
        }

        Ok(())
    }
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, MemoryError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| MemoryError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| MemoryError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| MemoryError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_creation() {
        let config = Config::default_config();

        assert_eq!(config.core.log_level, "info");
        assert_eq!(config.session.max_turns, 10);
        assert_eq!(config.session.key_by, SessionKey::Session);
        assert_eq!(config.preferences.max_tokens, 20);
        assert_eq!(config.persistence.flush_interval_ms, 1000);
        assert_eq!(config.persistence.max_attempts, 3);
        assert_eq!(config.persistence.io_timeout_ms, 5000);
        assert_eq!(config.persistence.queue_capacity, 1);
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let path = PathBuf::from("~/test");
        let expanded = expand_path(&path).unwrap();

        let home = dirs::home_dir().unwrap();
        assert_eq!(expanded, home.join("test"));
    }

    #[test]
    fn test_expand_path_without_tilde() {
        let path = PathBuf::from("/absolute/path");
        let expanded = expand_path(&path).unwrap();

        assert_eq!(expanded, path);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default_config();
        let toml_string = toml::to_string(&config).unwrap();

        let deserialized: Config = toml::from_str(&toml_string).unwrap();
        assert_eq!(config.core.log_level, deserialized.core.log_level);
        assert_eq!(
            config.persistence.file_name,
            deserialized.persistence.file_name
        );
    }

    #[test]
    fn test_writer_config_conversion() {
        let writer = PersistenceConfig::default().writer_config();
        assert_eq!(writer.flush_interval, Duration::from_secs(1));
        assert_eq!(writer.retry_delay, Duration::from_millis(100));
        assert_eq!(writer.max_attempts, 3);
    }

    #[test]
    fn test_merge_policy_includes_extra_stop_words() {
        let prefs = PreferencesConfig {
            max_tokens: 5,
            extra_stop_words: vec!["weather".to_string()],
        };
        let policy = prefs.merge_policy();
        assert_eq!(policy.max_tokens(), 5);
        assert!(policy.is_stop_word("weather"));
        assert!(policy.is_stop_word("喜欢"));
    }
}
