//! Webhook handling, vote crediting, and availability overviews.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::timeout;
use uuid::Uuid;

use crate::logutil::{escape_log, payload_preview};
use crate::shop::types::PlayerRef;
use crate::storage::EconomyStore;

use super::checker::VoteChecker;
use super::sources::{Directory, DirectoryTable};
use super::VoteError;

/// Deadline for one vote-status request.
const VOTE_CHECK_TIMEOUT_SECS: u64 = 5;

/// Inventory slug added once per credited vote.
pub const VOTER_RIBBON: &str = "voter_ribbon";

/// One credited vote window, as stored in the idempotency ledger. The key it
/// is stored under covers directory, user, and window; the record itself
/// exists for auditing and pruning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoteCredit {
    pub id: Uuid,
    pub directory: String,
    pub user_id: u64,
    pub epoch: u64,
    pub weight: u64,
    pub recorded_at: DateTime<Utc>,
}

impl VoteCredit {
    pub fn new(
        directory: &str,
        user_id: u64,
        epoch: u64,
        weight: u64,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            directory: directory.to_string(),
            user_id,
            epoch,
            weight,
            recorded_at,
        }
    }
}

/// Resolves a directory's external user id to a chat account.
#[async_trait]
pub trait UserResolver: Send + Sync {
    /// `None` when the id does not belong to any reachable account.
    async fn resolve(&self, user_id: u64) -> Option<PlayerRef>;
}

/// Delivers thank-you messages after a vote. Failures are logged at debug
/// and swallowed; a broken DM channel must never fail the credit.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn direct_message(&self, user_id: u64, text: &str) -> anyhow::Result<()>;
}

/// What one delivery did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoteOutcome {
    pub directory: String,
    pub user_id: u64,
    pub weight: u64,
    pub epoch: u64,
    /// Test delivery; nothing was persisted.
    pub test: bool,
    /// This window was already credited; nothing was added.
    pub duplicate: bool,
    /// The user's vote counter after handling.
    pub votes_total: u64,
}

/// Whether a user can vote on a directory right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteStanding {
    /// The status endpoint says not voted yet (or answered something
    /// unrecognizable, which is treated the same).
    Votable,
    /// No status endpoint, or it could not be reached; voting may work.
    Maybe,
    /// The directory takes no votes, or this window is already used.
    Unavailable,
}

/// One row of [`VoteReconciler::vote_overview`].
#[derive(Debug, Clone, Serialize)]
pub struct VoteOverviewEntry {
    pub key: String,
    pub name: String,
    pub page_url: String,
    pub vote_url: Option<String>,
    pub standing: VoteStanding,
}

/// Registry of per-user mutexes. The idempotency ledger claims one
/// (directory, user, window) key at a time, but every directory's credit
/// rewrites the same user record, so record updates serialize per user.
/// Entries are created on first use and kept for the reconciler's lifetime;
/// the mutex guards nothing but ordering, all state lives in the store.
struct UserLocks {
    locks: DashMap<u64, Arc<Mutex<()>>>,
}

impl UserLocks {
    fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    fn handle(&self, user_id: u64) -> Arc<Mutex<()>> {
        // clone out of the shard guard before awaiting
        self.locks.entry(user_id).or_default().clone()
    }

    async fn lock(&self, user_id: u64) -> OwnedMutexGuard<()> {
        self.handle(user_id).lock_owned().await
    }
}

/// Credits directory votes exactly once per vote window.
pub struct VoteReconciler {
    store: Arc<EconomyStore>,
    directories: DirectoryTable,
    resolver: Arc<dyn UserResolver>,
    notifier: Option<Arc<dyn Notifier>>,
    checker: Option<Arc<dyn VoteChecker>>,
    locks: UserLocks,
}

impl VoteReconciler {
    pub fn new(
        store: Arc<EconomyStore>,
        directories: DirectoryTable,
        resolver: Arc<dyn UserResolver>,
    ) -> Self {
        Self {
            store,
            directories,
            resolver,
            notifier: None,
            checker: None,
            locks: UserLocks::new(),
        }
    }

    /// Send thank-you messages through `notifier` after accepted votes.
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Answer vote-status questions through `checker`.
    pub fn with_checker(mut self, checker: Arc<dyn VoteChecker>) -> Self {
        self.checker = Some(checker);
        self
    }

    pub fn directories(&self) -> &DirectoryTable {
        &self.directories
    }

    /// Handle one webhook delivery end to end: authenticate, adapt the
    /// payload, credit.
    ///
    /// Transport mapping for the error: [`VoteError::UnknownDirectory`] and
    /// [`VoteError::UnauthorizedSource`] are 401, [`VoteError::MalformedPayload`]
    /// and [`VoteError::UnknownExternalUser`] are 400, [`VoteError::Store`]
    /// is 500. The check variants do not occur on this path.
    pub async fn handle_webhook(
        &self,
        key: &str,
        authorization: Option<&str>,
        body: &[u8],
    ) -> Result<VoteOutcome, VoteError> {
        let directory = self.directory(key)?;
        directory.authorize(authorization)?;
        debug!("webhook: {} delivered {}", key, payload_preview(body));
        let payload = directory.extract(body)?;
        self.credit(directory, payload.user_id, payload.weight, payload.is_test, Utc::now())
            .await
    }

    /// Credit a vote outside the webhook path (manual fixes, replay tools).
    pub async fn handle_vote(
        &self,
        key: &str,
        user_id: u64,
        weight: u64,
        is_test: bool,
    ) -> Result<VoteOutcome, VoteError> {
        self.handle_vote_at(key, user_id, weight, is_test, Utc::now())
            .await
    }

    /// [`handle_vote`](Self::handle_vote) with an explicit clock, so window
    /// boundaries can be tested deterministically.
    pub async fn handle_vote_at(
        &self,
        key: &str,
        user_id: u64,
        weight: u64,
        is_test: bool,
        now: DateTime<Utc>,
    ) -> Result<VoteOutcome, VoteError> {
        let directory = self.directory(key)?;
        self.credit(directory, user_id, weight, is_test, now).await
    }

    fn directory(&self, key: &str) -> Result<&Directory, VoteError> {
        self.directories
            .get(key)
            .ok_or_else(|| VoteError::UnknownDirectory(key.to_string()))
    }

    async fn credit(
        &self,
        directory: &Directory,
        user_id: u64,
        weight: u64,
        is_test: bool,
        now: DateTime<Utc>,
    ) -> Result<VoteOutcome, VoteError> {
        let voter = self
            .resolver
            .resolve(user_id)
            .await
            .ok_or(VoteError::UnknownExternalUser(user_id))?;
        if voter.is_bot {
            return Err(VoteError::UnknownExternalUser(user_id));
        }

        // the idempotency claim below covers one (directory, window) key;
        // credits from other directories rewrite this same record, so hold
        // the user's lock from load through put
        let _guard = self.locks.lock(user_id).await;
        let mut user = self.store.load_or_create_user(user_id, &voter.display_name)?;
        let key = directory.key().to_string();
        let epoch = directory.epoch_for(now);

        if is_test {
            info!(
                "vote: test delivery from {} for {}, nothing persisted",
                key,
                escape_log(&voter.display_name)
            );
            self.notify(user_id, &directory.config.name).await;
            return Ok(VoteOutcome {
                directory: key,
                user_id,
                weight,
                epoch,
                test: true,
                duplicate: false,
                votes_total: user.votes,
            });
        }

        // claim the window before touching the counter; a crash after the
        // claim loses one credit but can never double it
        let credit = VoteCredit::new(&key, user_id, epoch, weight, now);
        if !self.store.record_vote_credit(&credit)? {
            info!(
                "vote: window {} on {} already credited for {}",
                epoch,
                key,
                escape_log(&voter.display_name)
            );
            return Ok(VoteOutcome {
                directory: key,
                user_id,
                weight,
                epoch,
                test: false,
                duplicate: true,
                votes_total: user.votes,
            });
        }

        user.votes += weight;
        user.add_inventory(VOTER_RIBBON, 1);
        let votes_total = user.votes;
        self.store.put_user(user)?;
        info!(
            "vote: {} credited weight {} on {}, total {}",
            escape_log(&voter.display_name),
            weight,
            key,
            votes_total
        );

        self.notify(user_id, &directory.config.name).await;

        Ok(VoteOutcome {
            directory: key,
            user_id,
            weight,
            epoch,
            test: false,
            duplicate: false,
            votes_total,
        })
    }

    async fn notify(&self, user_id: u64, directory_name: &str) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        let text = format!("Thanks for voting on {}!", directory_name);
        if let Err(err) = notifier.direct_message(user_id, &text).await {
            debug!("vote: thank-you to {} failed: {}", user_id, err);
        }
    }

    /// Ask one directory whether `user_id` already voted this window.
    /// `Ok(None)` means the endpoint answered something unrecognizable.
    pub async fn check_voted(&self, key: &str, user_id: u64) -> Result<Option<bool>, VoteError> {
        let directory = self.directory(key)?;
        let checker = self
            .checker
            .as_ref()
            .ok_or_else(|| VoteError::CheckFailed("no checker configured".to_string()))?;
        let url = directory
            .check_url_for(user_id)
            .ok_or_else(|| VoteError::CheckFailed("directory has no check endpoint".to_string()))?;

        let body = timeout(
            Duration::from_secs(VOTE_CHECK_TIMEOUT_SECS),
            checker.fetch_status(&url),
        )
        .await
        .map_err(|_| VoteError::UpstreamTimeout {
            secs: VOTE_CHECK_TIMEOUT_SECS,
        })??;

        Ok(directory.parse_check_response(&body))
    }

    /// Classify every configured directory for one user.
    pub async fn vote_overview(&self, user_id: u64) -> Vec<VoteOverviewEntry> {
        let mut entries = Vec::with_capacity(self.directories.len());
        for directory in self.directories.iter() {
            let standing = self.standing(directory, user_id).await;
            entries.push(VoteOverviewEntry {
                key: directory.key().to_string(),
                name: directory.config.name.clone(),
                page_url: directory.config.page_url.clone(),
                vote_url: directory.config.vote_url.clone(),
                standing,
            });
        }
        entries
    }

    async fn standing(&self, directory: &Directory, user_id: u64) -> VoteStanding {
        if !directory.config.votable {
            return VoteStanding::Unavailable;
        }
        if self.checker.is_none() || directory.config.check_url.is_none() {
            return VoteStanding::Maybe;
        }
        match self.check_voted(directory.key(), user_id).await {
            Ok(Some(true)) => VoteStanding::Unavailable,
            Ok(Some(false)) => VoteStanding::Votable,
            Ok(None) => {
                warn!(
                    "vote check: {} answered something unrecognizable, assuming not voted",
                    directory.key()
                );
                VoteStanding::Votable
            }
            Err(err) => {
                warn!("vote check: {} unavailable: {}", directory.key(), err);
                VoteStanding::Maybe
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::EconomyStoreBuilder;
    use crate::votes::sources::DirectoryConfig;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct MapResolver(HashMap<u64, PlayerRef>);

    #[async_trait]
    impl UserResolver for MapResolver {
        async fn resolve(&self, user_id: u64) -> Option<PlayerRef> {
            self.0.get(&user_id).cloned()
        }
    }

    struct RecordingNotifier(Mutex<Vec<u64>>);

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn direct_message(&self, user_id: u64, _text: &str) -> anyhow::Result<()> {
            self.0.lock().unwrap().push(user_id);
            Ok(())
        }
    }

    fn directory_config(key: &str) -> DirectoryConfig {
        DirectoryConfig {
            key: key.to_string(),
            name: format!("The {}", key),
            page_url: format!("https://example.com/{}", key),
            vote_url: None,
            votable: true,
            vote_every_hours: 12,
            token: "hunter2".to_string(),
            payload: Default::default(),
            check_url: None,
            check_field: None,
        }
    }

    fn reconciler(dir: &TempDir) -> (VoteReconciler, Arc<RecordingNotifier>) {
        let store = Arc::new(
            EconomyStoreBuilder::new(dir.path())
                .open()
                .expect("open store"),
        );
        let table =
            DirectoryTable::new(9000, vec![directory_config("roost")]).expect("table");
        let mut known = HashMap::new();
        known.insert(42, PlayerRef::new(42, "Calgeka", false));
        known.insert(9000, PlayerRef::new(9000, "the bot", true));
        let notifier = Arc::new(RecordingNotifier(Mutex::new(Vec::new())));
        let reconciler = VoteReconciler::new(store, table, Arc::new(MapResolver(known)))
            .with_notifier(notifier.clone());
        (reconciler, notifier)
    }

    #[tokio::test]
    async fn test_vote_credits_once_per_window() {
        let dir = TempDir::new().expect("tempdir");
        let (reconciler, notifier) = reconciler(&dir);
        let now = Utc::now();

        let first = reconciler
            .handle_vote_at("roost", 42, 2, false, now)
            .await
            .expect("first");
        assert!(!first.duplicate);
        assert_eq!(first.votes_total, 2);

        let replay = reconciler
            .handle_vote_at("roost", 42, 2, false, now)
            .await
            .expect("replay");
        assert!(replay.duplicate);
        assert_eq!(replay.votes_total, 2);

        let user = reconciler.store.get_user(42).expect("user");
        assert_eq!(user.votes, 2);
        assert_eq!(user.inventory_count(VOTER_RIBBON), 1);
        // thanked for the credit, not for the replay
        assert_eq!(notifier.0.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_test_votes_leave_no_trace() {
        let dir = TempDir::new().expect("tempdir");
        let (reconciler, notifier) = reconciler(&dir);

        for _ in 0..3 {
            let outcome = reconciler
                .handle_vote("roost", 42, 1, true)
                .await
                .expect("test vote");
            assert!(outcome.test);
            assert_eq!(outcome.votes_total, 0);
        }

        assert!(reconciler.store.get_user(42).is_err());
        assert!(!reconciler
            .store
            .vote_credit_exists("roost", 42, 0)
            .expect("exists"));
        // test deliveries still get the thank-you
        assert_eq!(notifier.0.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_unknown_and_bot_voters_are_rejected() {
        let dir = TempDir::new().expect("tempdir");
        let (reconciler, _) = reconciler(&dir);

        assert!(matches!(
            reconciler.handle_vote("roost", 31337, 1, false).await,
            Err(VoteError::UnknownExternalUser(31337))
        ));
        assert!(matches!(
            reconciler.handle_vote("roost", 9000, 1, false).await,
            Err(VoteError::UnknownExternalUser(9000))
        ));
        assert!(matches!(
            reconciler.handle_vote("nest", 42, 1, false).await,
            Err(VoteError::UnknownDirectory(_))
        ));
    }
}
