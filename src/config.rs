//! Configuration for buddy-lists

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default storage directory
pub fn default_storage_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("buddy-lists")
}

/// Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the SQLite database
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// Maximum pooled database connections
    #[serde(default = "default_pool_size")]
    pub db_pool_size: u32,

    /// NATS server URL
    #[serde(default = "default_nats_url")]
    pub nats_url: String,

    /// Base URL of the character service
    #[serde(default = "default_character_service_url")]
    pub character_service_url: String,

    /// Timeout for character lookups, in seconds
    #[serde(default = "default_directory_timeout")]
    pub directory_timeout_secs: u64,

    /// Capacity given to lists created for new characters
    #[serde(default = "default_capacity")]
    pub default_capacity: u8,

    #[serde(default)]
    pub topics: TopicsConfig,
}

/// Topic names, inbound and outbound
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicsConfig {
    #[serde(default = "default_buddy_list_command")]
    pub buddy_list_command: String,

    #[serde(default = "default_buddy_list_status")]
    pub buddy_list_status: String,

    #[serde(default = "default_character_status")]
    pub character_status: String,

    #[serde(default = "default_invite_command")]
    pub invite_command: String,

    #[serde(default = "default_invite_status")]
    pub invite_status: String,

    #[serde(default = "default_cash_shop_status")]
    pub cash_shop_status: String,
}

fn default_pool_size() -> u32 {
    8
}

fn default_nats_url() -> String {
    "nats://127.0.0.1:4222".to_string()
}

fn default_character_service_url() -> String {
    "http://localhost:8080/api".to_string()
}

fn default_directory_timeout() -> u64 {
    5
}

fn default_capacity() -> u8 {
    30
}

fn default_buddy_list_command() -> String {
    "COMMAND_TOPIC_BUDDY_LIST".to_string()
}

fn default_buddy_list_status() -> String {
    "EVENT_TOPIC_BUDDY_LIST_STATUS".to_string()
}

fn default_character_status() -> String {
    "EVENT_TOPIC_CHARACTER_STATUS".to_string()
}

fn default_invite_command() -> String {
    "COMMAND_TOPIC_INVITE".to_string()
}

fn default_invite_status() -> String {
    "EVENT_TOPIC_INVITE_STATUS".to_string()
}

fn default_cash_shop_status() -> String {
    "EVENT_TOPIC_CASH_SHOP_STATUS".to_string()
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            buddy_list_command: default_buddy_list_command(),
            buddy_list_status: default_buddy_list_status(),
            character_status: default_character_status(),
            invite_command: default_invite_command(),
            invite_status: default_invite_status(),
            cash_shop_status: default_cash_shop_status(),
        }
    }
}

impl TopicsConfig {
    /// Topics this service consumes
    pub fn inbound(&self) -> [&str; 4] {
        [
            &self.buddy_list_command,
            &self.character_status,
            &self.invite_status,
            &self.cash_shop_status,
        ]
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            db_pool_size: default_pool_size(),
            nats_url: default_nats_url(),
            character_service_url: default_character_service_url(),
            directory_timeout_secs: default_directory_timeout(),
            default_capacity: default_capacity(),
            topics: TopicsConfig::default(),
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), std::io::Error> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Get database path
    pub fn db_path(&self) -> PathBuf {
        self.storage_dir.join("buddies.db")
    }

    /// Get config file path
    pub fn config_path(&self) -> PathBuf {
        self.storage_dir.join("config.toml")
    }

    pub fn directory_timeout(&self) -> Duration {
        Duration::from_secs(self.directory_timeout_secs)
    }
}
