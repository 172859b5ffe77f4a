//! # Configuration Management Module
//!
//! This module handles all configuration aspects of the huntshop service,
//! providing a centralized configuration system with validation, defaults,
//! and persistence.
//!
//! ## Configuration Structure
//!
//! The configuration is organized into logical sections:
//!
//! - [`StorageConfig`] - Data and backup directory locations
//! - [`BotConfig`] - The bot's own platform identity
//! - [`DirectoryConfig`] - One entry per bot-listing directory that sends
//!   vote webhooks (defined in the votes module, configured here)
//!
//! ## Usage
//!
//! ```rust,no_run
//! use huntshop::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Load configuration from file
//!     let config = Config::load("config.toml").await?;
//!
//!     // Build the directory table the vote reconciler runs on
//!     let directories = config.directory_table()?;
//!     println!("{} directories configured", directories.len());
//!
//!     // Create a commented starter configuration
//!     Config::create_default("config.toml").await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! huntshop uses TOML format for human-readable configuration:
//!
//! ```toml
//! [storage]
//! data_dir = "data"
//! backup_dir = "backups"
//!
//! [bot]
//! user_id = 1234
//!
//! [[directories]]
//! key = "roost"
//! name = "The Roost"
//! page_url = "https://roost.example/bots/1234"
//! token = "shared-webhook-secret"
//! payload = "full"
//! ```
//!
//! ## Validation
//!
//! [`Config::validate`] is called by [`Config::load`] and rejects configs
//! that would misbehave at runtime rather than at startup: duplicate
//! directory keys, votable directories without a webhook token, and
//! zero-length vote windows.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::votes::{DirectoryConfig, DirectoryTable};

/// Data and backup directory locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for the sled store.
    pub data_dir: String,
    /// Where `BackupManager` writes its archives and index.
    #[serde(default = "default_backup_dir")]
    pub backup_dir: String,
}

fn default_backup_dir() -> String {
    "backups".to_string()
}

/// The bot's own platform identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Platform account id. `full` webhook payloads must name this id or
    /// they are rejected as misdirected.
    pub user_id: u64,
}

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    pub bot: BotConfig,
    /// Bot-listing directories that deliver vote webhooks.
    #[serde(default)]
    pub directories: Vec<DirectoryConfig>,
}

/// Commented starter configuration written by [`Config::create_default`].
const DEFAULT_CONFIG: &str = r#"# huntshop configuration

[storage]
# Root directory for the game store (created on first run).
data_dir = "data"
# Where backup archives and their index are written.
backup_dir = "backups"

[bot]
# The bot's own platform account id. Directories that send full payloads
# name the bot they were voting for; deliveries naming another id are
# rejected.
user_id = 1234

# One block per bot-listing directory that delivers vote webhooks.
#
# [[directories]]
# key = "roost"                # webhook path key, unique
# name = "The Roost"
# page_url = "https://roost.example/bots/1234"
# vote_url = "https://roost.example/bots/1234/vote"
# votable = true
# vote_every_hours = 12        # one credit per user per window
# token = "shared-webhook-secret"
# payload = "full"             # or "id_only"
# check_url = "https://roost.example/api/voted?user={user_id}"
# check_field = "voted"
"#;

impl Config {
    /// Load and validate configuration from a file.
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        config.validate()?;
        Ok(config)
    }

    /// Write a commented starter configuration file.
    pub async fn create_default(path: &str) -> Result<()> {
        fs::write(path, DEFAULT_CONFIG)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    /// Reject configurations that would misbehave at runtime.
    pub fn validate(&self) -> Result<()> {
        if self.storage.data_dir.trim().is_empty() {
            return Err(anyhow!("storage.data_dir must not be empty"));
        }
        if self.storage.backup_dir.trim().is_empty() {
            return Err(anyhow!("storage.backup_dir must not be empty"));
        }

        for directory in &self.directories {
            if directory.key.trim().is_empty() {
                return Err(anyhow!("directory key must not be empty"));
            }
            if directory.vote_every_hours == 0 {
                return Err(anyhow!(
                    "directory {}: vote_every_hours must be at least 1",
                    directory.key
                ));
            }
            if directory.votable && directory.token.trim().is_empty() {
                return Err(anyhow!(
                    "directory {}: votable directories need a webhook token",
                    directory.key
                ));
            }
        }

        // duplicate keys surface here instead of at reconciler startup
        self.directory_table()?;

        Ok(())
    }

    /// Build the directory table the vote reconciler runs on.
    pub fn directory_table(&self) -> Result<DirectoryTable> {
        DirectoryTable::new(self.bot.user_id, self.directories.clone())
            .map_err(|e| anyhow!("Invalid directory configuration: {}", e))
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            storage: StorageConfig {
                data_dir: "data".to_string(),
                backup_dir: default_backup_dir(),
            },
            bot: BotConfig { user_id: 1234 },
            directories: Vec::new(),
        }
    }
}
