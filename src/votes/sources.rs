//! Directory-site definitions and inbound payload adapters.
//!
//! Every directory delivers its own payload shape; the two adapters here
//! normalize them into [`VotePayload`] so the reconciler never looks at raw
//! JSON. Token comparison is constant time.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use subtle::ConstantTimeEq;
use thiserror::Error;

use super::VoteError;

/// How a directory shapes its webhook body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PayloadFormat {
    /// `{"id": <user>}`. Weight 1, never a test delivery.
    #[default]
    IdOnly,
    /// `{"user": <user>, "bot": <bot>, "isWeekend": <bool>, "type": "upvote" | "test"}`.
    /// Weekend votes count double; the bot id must match ours.
    Full,
}

/// One external directory, as configured in TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Webhook path key, unique across the table.
    pub key: String,
    /// Human name for overviews and thank-you messages.
    pub name: String,
    /// Public listing page.
    pub page_url: String,
    /// Direct voting page, when the site has one.
    #[serde(default)]
    pub vote_url: Option<String>,
    /// Whether the site takes votes at all.
    #[serde(default = "default_votable")]
    pub votable: bool,
    /// Vote window length; one credit per user per window.
    #[serde(default = "default_vote_every_hours")]
    pub vote_every_hours: u64,
    /// Shared secret the site presents in its Authorization header.
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub payload: PayloadFormat,
    /// Vote-status endpoint with a `{user_id}` placeholder.
    #[serde(default)]
    pub check_url: Option<String>,
    /// JSON field holding the voted flag; the raw body is used when absent.
    #[serde(default)]
    pub check_field: Option<String>,
}

fn default_votable() -> bool {
    true
}

fn default_vote_every_hours() -> u64 {
    24
}

/// The vote extracted from one webhook delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VotePayload {
    pub user_id: u64,
    pub weight: u64,
    pub is_test: bool,
}

/// Directory-table construction failures. Raised at startup, never while
/// handling a delivery.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("duplicate directory key: {0}")]
    DuplicateKey(String),
}

/// A configured directory bound to the bot identity it accepts votes for.
#[derive(Debug, Clone)]
pub struct Directory {
    pub config: DirectoryConfig,
    bot_user_id: u64,
}

impl Directory {
    fn new(config: DirectoryConfig, bot_user_id: u64) -> Self {
        Self {
            config,
            bot_user_id,
        }
    }

    pub fn key(&self) -> &str {
        &self.config.key
    }

    /// Constant-time comparison of the presented Authorization value against
    /// the shared token. An empty configured token authorizes nothing.
    pub fn authorize(&self, authorization: Option<&str>) -> Result<(), VoteError> {
        let presented = authorization.ok_or(VoteError::UnauthorizedSource)?;
        if self.config.token.is_empty() {
            return Err(VoteError::UnauthorizedSource);
        }
        let token_matches: bool = presented
            .as_bytes()
            .ct_eq(self.config.token.as_bytes())
            .into();
        if token_matches {
            Ok(())
        } else {
            Err(VoteError::UnauthorizedSource)
        }
    }

    /// Adapt the raw webhook body into a [`VotePayload`].
    pub fn extract(&self, body: &[u8]) -> Result<VotePayload, VoteError> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|err| VoteError::MalformedPayload(err.to_string()))?;
        match self.config.payload {
            PayloadFormat::IdOnly => {
                let user_id = field_as_u64(&value, "id")
                    .ok_or_else(|| VoteError::MalformedPayload("missing or invalid id".into()))?;
                Ok(VotePayload {
                    user_id,
                    weight: 1,
                    is_test: false,
                })
            }
            PayloadFormat::Full => {
                let bot = field_as_u64(&value, "bot")
                    .ok_or_else(|| VoteError::MalformedPayload("missing or invalid bot".into()))?;
                if bot != self.bot_user_id {
                    return Err(VoteError::UnauthorizedSource);
                }
                let user_id = field_as_u64(&value, "user")
                    .ok_or_else(|| VoteError::MalformedPayload("missing or invalid user".into()))?;
                let weight = if value.get("isWeekend").and_then(Value::as_bool).unwrap_or(false) {
                    2
                } else {
                    1
                };
                let is_test = value.get("type").and_then(Value::as_str) == Some("test");
                Ok(VotePayload {
                    user_id,
                    weight,
                    is_test,
                })
            }
        }
    }

    /// Which vote window `now` falls into.
    pub fn epoch_for(&self, now: DateTime<Utc>) -> u64 {
        let window_secs = self.config.vote_every_hours.max(1) * 3600;
        (now.timestamp().max(0) as u64) / window_secs
    }

    /// Status URL for one user, when the directory has a check endpoint.
    pub fn check_url_for(&self, user_id: u64) -> Option<String> {
        self.config
            .check_url
            .as_ref()
            .map(|template| template.replace("{user_id}", &user_id.to_string()))
    }

    /// Read the voted flag out of a status response. Accepts `1`/`0` and
    /// `true`/`false`, either as the raw body or under `check_field` in a
    /// JSON body; anything else is `None`.
    pub fn parse_check_response(&self, body: &str) -> Option<bool> {
        let raw = match &self.config.check_field {
            Some(field) => {
                let value: Value = serde_json::from_str(body).ok()?;
                match value.get(field)? {
                    Value::Bool(flag) => return Some(*flag),
                    Value::Number(number) => number.to_string(),
                    Value::String(text) => text.clone(),
                    _ => return None,
                }
            }
            None => body.to_string(),
        };
        match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" => Some(true),
            "0" | "false" => Some(false),
            _ => None,
        }
    }
}

/// Accept the id as a JSON number or a numeric string; directories disagree.
fn field_as_u64(value: &Value, field: &str) -> Option<u64> {
    match value.get(field)? {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.parse().ok(),
        _ => None,
    }
}

/// All configured directories, keyed by webhook key, in configuration order.
#[derive(Debug, Clone)]
pub struct DirectoryTable {
    bot_user_id: u64,
    directories: HashMap<String, Directory>,
    order: Vec<String>,
}

impl DirectoryTable {
    /// Build the table, rejecting duplicate webhook keys outright.
    pub fn new(bot_user_id: u64, configs: Vec<DirectoryConfig>) -> Result<Self, DirectoryError> {
        let mut directories = HashMap::with_capacity(configs.len());
        let mut order = Vec::with_capacity(configs.len());
        for config in configs {
            let key = config.key.clone();
            if directories.contains_key(&key) {
                return Err(DirectoryError::DuplicateKey(key));
            }
            order.push(key.clone());
            directories.insert(key, Directory::new(config, bot_user_id));
        }
        Ok(Self {
            bot_user_id,
            directories,
            order,
        })
    }

    pub fn get(&self, key: &str) -> Option<&Directory> {
        self.directories.get(key)
    }

    /// Directories in configuration order.
    pub fn iter(&self) -> impl Iterator<Item = &Directory> {
        self.order.iter().filter_map(|key| self.directories.get(key))
    }

    pub fn bot_user_id(&self) -> u64 {
        self.bot_user_id
    }

    pub fn len(&self) -> usize {
        self.directories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directories.is_empty()
    }
}
