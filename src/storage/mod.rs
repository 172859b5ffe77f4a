//! Sled-backed persistence for player, channel, and user records plus the
//! vote idempotency ledger.
//!
//! Values are bincode-encoded and carry a schema version byte that is
//! verified on read. Every write path flushes before returning; the paired
//! buyer/target update goes through one atomic batch.

pub mod backup;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use sled::IVec;
use thiserror::Error;

use crate::shop::types::{
    ChannelRecord, PlayerKey, PlayerRecord, UserRecord, CHANNEL_SCHEMA_VERSION,
    PLAYER_SCHEMA_VERSION, USER_SCHEMA_VERSION,
};
use crate::votes::reconciler::VoteCredit;

pub use backup::{BackupInfo, BackupKind, BackupManager, RetentionPolicy};

const TREE_PLAYERS: &str = "hunt_players";
const TREE_USERS: &str = "hunt_users";
const TREE_CHANNELS: &str = "hunt_channels";
const TREE_VOTE_CREDITS: &str = "hunt_vote_credits";

/// Errors that can arise while interacting with the economy storage layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Wrapper around sled's error type.
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    /// Wrapper around bincode serialization and deserialization errors.
    #[error("serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    /// Wrapper around IO errors (directory creation, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Returned when fetching a record that is not present.
    #[error("record not found: {0}")]
    NotFound(String),

    /// Returned when deserializing a record with an unexpected schema version.
    #[error("schema mismatch for {entity}: expected {expected}, got {found}")]
    SchemaMismatch {
        entity: &'static str,
        expected: u8,
        found: u8,
    },
}

/// Helper builder so tests can easily create throwaway stores with custom
/// paths.
pub struct EconomyStoreBuilder {
    path: PathBuf,
    temporary: bool,
}

impl EconomyStoreBuilder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            temporary: false,
        }
    }

    /// Back the store with a throwaway sled instance that is deleted on drop
    /// (useful for targeted tests).
    pub fn temporary(mut self) -> Self {
        self.temporary = true;
        self
    }

    pub fn open(self) -> Result<EconomyStore, StoreError> {
        EconomyStore::open_with_options(self.path, self.temporary)
    }
}

/// Sled-backed store for the hunting-game economy.
pub struct EconomyStore {
    _db: sled::Db,
    players: sled::Tree,
    users: sled::Tree,
    channels: sled::Tree,
    vote_credits: sled::Tree,
}

impl EconomyStore {
    /// Open (or create) the store rooted at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        Self::open_with_options(path.as_ref().to_path_buf(), false)
    }

    fn open_with_options(path: PathBuf, temporary: bool) -> Result<Self, StoreError> {
        std::fs::create_dir_all(&path)?;
        let db = sled::Config::new().path(&path).temporary(temporary).open()?;
        let players = db.open_tree(TREE_PLAYERS)?;
        let users = db.open_tree(TREE_USERS)?;
        let channels = db.open_tree(TREE_CHANNELS)?;
        let vote_credits = db.open_tree(TREE_VOTE_CREDITS)?;
        Ok(Self {
            _db: db,
            players,
            users,
            channels,
            vote_credits,
        })
    }

    fn player_key(key: PlayerKey) -> Vec<u8> {
        format!("players:{}:{}", key.channel_id, key.user_id).into_bytes()
    }

    fn user_key(user_id: u64) -> Vec<u8> {
        format!("users:{}", user_id).into_bytes()
    }

    fn channel_key(channel_id: u64) -> Vec<u8> {
        format!("channels:{}", channel_id).into_bytes()
    }

    fn vote_credit_key(directory: &str, user_id: u64, epoch: u64) -> Vec<u8> {
        format!("votes:{}:{}:{:020}", directory, user_id, epoch).into_bytes()
    }

    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
        Ok(bincode::serialize(value)?)
    }

    fn deserialize<T: serde::de::DeserializeOwned>(bytes: IVec) -> Result<T, StoreError> {
        Ok(bincode::deserialize::<T>(&bytes)?)
    }

    /// Insert or update a player record.
    pub fn put_player(&self, mut player: PlayerRecord) -> Result<(), StoreError> {
        player.schema_version = PLAYER_SCHEMA_VERSION;
        player.touch();
        let key = Self::player_key(player.key());
        let bytes = Self::serialize(&player)?;
        self.players.insert(key, bytes)?;
        self.players.flush()?;
        Ok(())
    }

    /// Persist several player records as one atomic batch. Used for the
    /// buyer/target pair so neither record lands without the other.
    pub fn put_players(&self, players: Vec<PlayerRecord>) -> Result<(), StoreError> {
        let mut batch = sled::Batch::default();
        for mut player in players {
            player.schema_version = PLAYER_SCHEMA_VERSION;
            player.touch();
            let key = Self::player_key(player.key());
            batch.insert(key, Self::serialize(&player)?);
        }
        self.players.apply_batch(batch)?;
        self.players.flush()?;
        Ok(())
    }

    /// Fetch a player record by key.
    pub fn get_player(&self, key: PlayerKey) -> Result<PlayerRecord, StoreError> {
        let Some(bytes) = self.players.get(Self::player_key(key))? else {
            return Err(StoreError::NotFound(format!(
                "player: {}:{}",
                key.channel_id, key.user_id
            )));
        };
        let record: PlayerRecord = Self::deserialize(bytes)?;
        if record.schema_version != PLAYER_SCHEMA_VERSION {
            return Err(StoreError::SchemaMismatch {
                entity: "player",
                expected: PLAYER_SCHEMA_VERSION,
                found: record.schema_version,
            });
        }
        Ok(record)
    }

    /// Fetch a player or build a fresh in-memory record. Nothing is written;
    /// the record only persists when the caller's operation succeeds and puts
    /// it back.
    pub fn load_or_create_player(
        &self,
        key: PlayerKey,
        display_name: &str,
    ) -> Result<PlayerRecord, StoreError> {
        match self.get_player(key) {
            Ok(player) => Ok(player),
            Err(StoreError::NotFound(_)) => {
                Ok(PlayerRecord::new(key.channel_id, key.user_id, display_name))
            }
            Err(err) => Err(err),
        }
    }

    /// Insert or update a cross-channel user record.
    pub fn put_user(&self, mut user: UserRecord) -> Result<(), StoreError> {
        user.schema_version = USER_SCHEMA_VERSION;
        user.touch();
        let key = Self::user_key(user.user_id);
        let bytes = Self::serialize(&user)?;
        self.users.insert(key, bytes)?;
        self.users.flush()?;
        Ok(())
    }

    /// Fetch a user record by platform id.
    pub fn get_user(&self, user_id: u64) -> Result<UserRecord, StoreError> {
        let Some(bytes) = self.users.get(Self::user_key(user_id))? else {
            return Err(StoreError::NotFound(format!("user: {}", user_id)));
        };
        let record: UserRecord = Self::deserialize(bytes)?;
        if record.schema_version != USER_SCHEMA_VERSION {
            return Err(StoreError::SchemaMismatch {
                entity: "user",
                expected: USER_SCHEMA_VERSION,
                found: record.schema_version,
            });
        }
        Ok(record)
    }

    /// Fetch a user or build a fresh in-memory record without writing.
    pub fn load_or_create_user(
        &self,
        user_id: u64,
        display_name: &str,
    ) -> Result<UserRecord, StoreError> {
        match self.get_user(user_id) {
            Ok(user) => Ok(user),
            Err(StoreError::NotFound(_)) => Ok(UserRecord::new(user_id, display_name)),
            Err(err) => Err(err),
        }
    }

    /// Insert or update a channel record.
    pub fn put_channel(&self, mut channel: ChannelRecord) -> Result<(), StoreError> {
        channel.schema_version = CHANNEL_SCHEMA_VERSION;
        channel.touch();
        let key = Self::channel_key(channel.channel_id);
        let bytes = Self::serialize(&channel)?;
        self.channels.insert(key, bytes)?;
        self.channels.flush()?;
        Ok(())
    }

    /// Fetch a channel record by id.
    pub fn get_channel(&self, channel_id: u64) -> Result<ChannelRecord, StoreError> {
        let Some(bytes) = self.channels.get(Self::channel_key(channel_id))? else {
            return Err(StoreError::NotFound(format!("channel: {}", channel_id)));
        };
        let record: ChannelRecord = Self::deserialize(bytes)?;
        if record.schema_version != CHANNEL_SCHEMA_VERSION {
            return Err(StoreError::SchemaMismatch {
                entity: "channel",
                expected: CHANNEL_SCHEMA_VERSION,
                found: record.schema_version,
            });
        }
        Ok(record)
    }

    /// Fetch a channel or build a default in-memory snapshot without writing.
    pub fn load_or_create_channel(&self, channel_id: u64) -> Result<ChannelRecord, StoreError> {
        match self.get_channel(channel_id) {
            Ok(channel) => Ok(channel),
            Err(StoreError::NotFound(_)) => Ok(ChannelRecord::new(channel_id)),
            Err(err) => Err(err),
        }
    }

    /// Record one vote credit if its idempotency key is unseen. Returns true
    /// when this call inserted the credit, false when the key already existed
    /// (a replay). Insert-if-absent runs as a compare-and-swap so two
    /// concurrent deliveries cannot both claim the same window.
    pub fn record_vote_credit(&self, credit: &VoteCredit) -> Result<bool, StoreError> {
        let key = Self::vote_credit_key(&credit.directory, credit.user_id, credit.epoch);
        let bytes = Self::serialize(credit)?;
        let outcome = self
            .vote_credits
            .compare_and_swap(key, None as Option<IVec>, Some(bytes))?;
        self.vote_credits.flush()?;
        Ok(outcome.is_ok())
    }

    /// Whether a credit was already recorded under this idempotency key.
    pub fn vote_credit_exists(
        &self,
        directory: &str,
        user_id: u64,
        epoch: u64,
    ) -> Result<bool, StoreError> {
        let key = Self::vote_credit_key(directory, user_id, epoch);
        Ok(self.vote_credits.get(key)?.is_some())
    }

    /// Remove vote credits recorded before `before`. Returns how many were
    /// pruned. Entries are only needed while their vote window can still be
    /// replayed by the source.
    pub fn prune_vote_credits(&self, before: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut stale = Vec::new();
        for entry in self.vote_credits.scan_prefix(b"votes:") {
            let (key, value) = entry?;
            let credit: VoteCredit = Self::deserialize(value)?;
            if credit.recorded_at < before {
                stale.push(key);
            }
        }
        let mut removed = 0;
        for key in &stale {
            self.vote_credits.remove(key)?;
            removed += 1;
        }
        if removed > 0 {
            self.vote_credits.flush()?;
        }
        Ok(removed)
    }
}
