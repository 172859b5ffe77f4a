//! Atomic purchase, transfer, and giveback operations over the economy store.
//!
//! Every entry point serializes on a per-player async mutex so two concurrent
//! spends of the same balance cannot interleave. Targeted items and transfers
//! take both players' locks in key order and commit both records through one
//! sled batch, so the pair lands all-or-nothing and crossed targets cannot
//! deadlock.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use log::{info, warn};
use rand::Rng;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::logutil::escape_log;
use crate::shop::catalog::{Catalog, ItemEntry, ItemKind};
use crate::shop::errors::{EconomyError, PreconditionReason, TargetReason};
use crate::shop::ledger;
use crate::shop::leveling::{LevelCaps, Leveling, StandardLeveling};
use crate::shop::powerup::{PowerupKind, PowerupRegistry, PowerupState, Remaining};
use crate::shop::types::{
    ChannelRecord, PlayerKey, PlayerRecord, PlayerRef, PurchaseDetail, PurchaseReceipt,
    TransferReceipt,
};
use crate::storage::EconomyStore;

/// How many times an operation is re-attempted after a storage error.
const STORE_RETRY_ATTEMPTS: u32 = 3;
/// First retry backoff; doubles per attempt.
const STORE_RETRY_BASE_DELAY_MS: u64 = 25;
/// One magazine giveback per window.
const GIVEBACK_WINDOW_HOURS: i64 = 24;

/// Refill a player's spare magazines up to `magazine_cap` when the previous
/// giveback is at least a full window old. Updates the giveback counters and
/// returns whether the refill ran. Mutates only in memory; callers persist.
pub fn apply_giveback(player: &mut PlayerRecord, magazine_cap: u32, now: DateTime<Utc>) -> bool {
    if now - player.last_giveback < Duration::hours(GIVEBACK_WINDOW_HOURS) {
        return false;
    }
    player.magazines = player.magazines.max(magazine_cap);
    player.givebacks += 1;
    player.last_giveback = now;
    true
}

/// Registry of per-player mutexes. Entries are created on first use and kept
/// for the engine's lifetime; the mutex guards nothing but ordering, all
/// state lives in the store.
struct PlayerLocks {
    locks: DashMap<PlayerKey, Arc<Mutex<()>>>,
}

impl PlayerLocks {
    fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    fn handle(&self, key: PlayerKey) -> Arc<Mutex<()>> {
        // clone out of the shard guard before awaiting
        self.locks.entry(key).or_default().clone()
    }

    async fn lock(&self, key: PlayerKey) -> OwnedMutexGuard<()> {
        self.handle(key).lock_owned().await
    }

    /// Both guards, lower key first. Callers must have rejected self-targets
    /// already; the same key twice would deadlock here.
    async fn lock_pair(
        &self,
        a: PlayerKey,
        b: PlayerKey,
    ) -> (OwnedMutexGuard<()>, OwnedMutexGuard<()>) {
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        let first_guard = self.handle(first).lock_owned().await;
        let second_guard = self.handle(second).lock_owned().await;
        (first_guard, second_guard)
    }
}

/// Shop front end over the economy store.
///
/// Holds the immutable catalog and power-up registry, the capacity policy,
/// and the per-player lock registry. Share it behind an `Arc`; all methods
/// take `&self`.
pub struct ShopEngine {
    store: Arc<EconomyStore>,
    catalog: Catalog,
    registry: PowerupRegistry,
    leveling: Arc<dyn Leveling>,
    locks: PlayerLocks,
}

impl ShopEngine {
    pub fn new(store: Arc<EconomyStore>) -> Self {
        Self {
            store,
            catalog: Catalog::standard(),
            registry: PowerupRegistry::standard(),
            leveling: Arc::new(StandardLeveling),
            locks: PlayerLocks::new(),
        }
    }

    /// Replace the standard catalog (reduced storefronts, tests).
    pub fn with_catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Replace the capacity policy.
    pub fn with_leveling(mut self, leveling: Arc<dyn Leveling>) -> Self {
        self.leveling = leveling;
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn registry(&self) -> &PowerupRegistry {
        &self.registry
    }

    /// Buy `item` for `buyer`, optionally aimed at `target`.
    pub async fn purchase(
        &self,
        channel_id: u64,
        buyer: &PlayerRef,
        item: ItemKind,
        target: Option<&PlayerRef>,
    ) -> Result<PurchaseReceipt, EconomyError> {
        self.purchase_at(channel_id, buyer, item, target, Utc::now())
            .await
    }

    /// [`purchase`](Self::purchase) with an explicit clock, so expiry and
    /// giveback windows can be tested deterministically.
    pub async fn purchase_at(
        &self,
        channel_id: u64,
        buyer: &PlayerRef,
        item: ItemKind,
        target: Option<&PlayerRef>,
        now: DateTime<Utc>,
    ) -> Result<PurchaseReceipt, EconomyError> {
        let entry = self
            .catalog
            .entry(item)
            .ok_or(EconomyError::PreconditionFailed {
                item,
                reason: PreconditionReason::NotStocked,
            })?;

        let buyer_key = PlayerKey::new(channel_id, buyer.user_id);
        if entry.requires_target {
            let target = target.ok_or(EconomyError::InvalidTarget {
                reason: TargetReason::TargetRequired,
            })?;
            if target.user_id == buyer.user_id {
                return Err(EconomyError::InvalidTarget {
                    reason: TargetReason::SelfTarget,
                });
            }
            if target.is_bot {
                return Err(EconomyError::InvalidTarget {
                    reason: TargetReason::AutomatedTarget,
                });
            }
            let target_key = PlayerKey::new(channel_id, target.user_id);
            let _guards = self.locks.lock_pair(buyer_key, target_key).await;
            self.with_store_retry("purchase", || {
                self.attempt_purchase(entry, buyer_key, buyer, Some((target_key, target)), now)
            })
            .await
        } else {
            // a stray target on an untargeted item is ignored
            let _guard = self.locks.lock(buyer_key).await;
            self.with_store_retry("purchase", || {
                self.attempt_purchase(entry, buyer_key, buyer, None, now)
            })
            .await
        }
    }

    /// Move experience between two players of the same channel, withholding
    /// the channel's send tax from what the recipient receives. The sender is
    /// debited the full amount.
    pub async fn transfer(
        &self,
        channel_id: u64,
        sender: &PlayerRef,
        recipient: &PlayerRef,
        amount: u64,
    ) -> Result<TransferReceipt, EconomyError> {
        if amount == 0 {
            return Err(EconomyError::InvalidAmount(amount));
        }
        if recipient.user_id == sender.user_id {
            return Err(EconomyError::InvalidTarget {
                reason: TargetReason::SelfTarget,
            });
        }
        if recipient.is_bot {
            return Err(EconomyError::InvalidTarget {
                reason: TargetReason::AutomatedTarget,
            });
        }
        let sender_key = PlayerKey::new(channel_id, sender.user_id);
        let recipient_key = PlayerKey::new(channel_id, recipient.user_id);
        let _guards = self.locks.lock_pair(sender_key, recipient_key).await;
        self.with_store_retry("transfer", || {
            self.attempt_transfer(sender_key, sender, recipient_key, recipient, amount)
        })
        .await
    }

    /// Run the daily magazine refill for one player if their window elapsed.
    /// Returns whether a refill was persisted. Meant for the game layer's
    /// scheduler; magazine purchases apply it on their own.
    pub async fn giveback(
        &self,
        channel_id: u64,
        player: &PlayerRef,
    ) -> Result<bool, EconomyError> {
        self.giveback_at(channel_id, player, Utc::now()).await
    }

    pub async fn giveback_at(
        &self,
        channel_id: u64,
        player: &PlayerRef,
        now: DateTime<Utc>,
    ) -> Result<bool, EconomyError> {
        let key = PlayerKey::new(channel_id, player.user_id);
        let _guard = self.locks.lock(key).await;
        self.with_store_retry("giveback", || {
            let mut record = self.store.load_or_create_player(key, &player.display_name)?;
            let cap = self.leveling.caps(&record).magazine_cap;
            if !apply_giveback(&mut record, cap, now) {
                return Ok(false);
            }
            let magazines = record.magazines;
            self.store.put_player(record)?;
            info!(
                "giveback: {} refilled to {} magazines in channel {}",
                escape_log(&player.display_name),
                magazines,
                channel_id
            );
            Ok(true)
        })
        .await
    }

    /// Re-run `attempt` across transient storage failures with doubling
    /// backoff. Domain errors pass straight through; only
    /// [`EconomyError::Store`] is retried, and exhaustion degrades to
    /// [`EconomyError::TemporarilyUnavailable`].
    async fn with_store_retry<T>(
        &self,
        op: &str,
        mut attempt: impl FnMut() -> Result<T, EconomyError>,
    ) -> Result<T, EconomyError> {
        let mut delay = StdDuration::from_millis(STORE_RETRY_BASE_DELAY_MS);
        for attempt_no in 1..=STORE_RETRY_ATTEMPTS {
            match attempt() {
                Ok(value) => return Ok(value),
                Err(EconomyError::Store(err)) => {
                    warn!(
                        "{}: storage attempt {}/{} failed: {}",
                        op, attempt_no, STORE_RETRY_ATTEMPTS, err
                    );
                    if attempt_no < STORE_RETRY_ATTEMPTS {
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    }
                }
                Err(other) => return Err(other),
            }
        }
        Err(EconomyError::TemporarilyUnavailable)
    }

    fn attempt_purchase(
        &self,
        entry: &ItemEntry,
        buyer_key: PlayerKey,
        buyer: &PlayerRef,
        target: Option<(PlayerKey, &PlayerRef)>,
        now: DateTime<Utc>,
    ) -> Result<PurchaseReceipt, EconomyError> {
        let mut player = self
            .store
            .load_or_create_player(buyer_key, &buyer.display_name)?;
        let channel = self.store.load_or_create_channel(buyer_key.channel_id)?;
        let mut target_record = match target {
            Some((key, target_ref)) => Some(
                self.store
                    .load_or_create_player(key, &target_ref.display_name)?,
            ),
            None => None,
        };

        // The daily refill rides along with the load and sticks even when
        // the purchase below is refused; the refreshed count feeds the cap
        // gate, so a pending giveback usually means MagazinesAtCap.
        if entry.kind == ItemKind::Magazine {
            let cap = self.leveling.caps(&player).magazine_cap;
            if apply_giveback(&mut player, cap, now) {
                self.store.put_player(player.clone())?;
                info!(
                    "giveback: {} refilled to {} magazines in channel {}",
                    escape_log(&buyer.display_name),
                    player.magazines,
                    buyer_key.channel_id
                );
            }
        }

        ledger::ensure_affordable(&player, entry.cost)?;

        let caps = self.leveling.caps(&player);
        if let Some(reason) = self.purchase_gate(entry.kind, &player, &caps, now) {
            return Err(EconomyError::PreconditionFailed {
                item: entry.kind,
                reason,
            });
        }

        let balance_after = ledger::debit(&mut player, entry.cost)?;
        let detail = self.apply_item(
            entry.kind,
            &mut player,
            target_record.as_mut(),
            &channel,
            &caps,
            now,
        )?;

        let wasted = matches!(
            detail,
            PurchaseDetail::SunglassesInstalled { wasted: true, .. }
                | PurchaseDetail::MirrorWasted { .. }
        );
        if wasted {
            player.record_wasted(entry.kind);
        } else {
            player.record_purchase(entry.kind);
        }

        match target_record {
            Some(record) => self.store.put_players(vec![player, record])?,
            None => self.store.put_player(player)?,
        }

        info!(
            "purchase: {} bought {} for {} xp in channel {} (balance {})",
            escape_log(&buyer.display_name),
            entry.kind,
            entry.cost,
            buyer_key.channel_id,
            balance_after
        );

        Ok(PurchaseReceipt {
            item: entry.kind,
            cost: entry.cost,
            balance_after,
            detail,
        })
    }

    fn attempt_transfer(
        &self,
        sender_key: PlayerKey,
        sender: &PlayerRef,
        recipient_key: PlayerKey,
        recipient: &PlayerRef,
        amount: u64,
    ) -> Result<TransferReceipt, EconomyError> {
        let mut sender_record = self
            .store
            .load_or_create_player(sender_key, &sender.display_name)?;
        let mut recipient_record = self
            .store
            .load_or_create_player(recipient_key, &recipient.display_name)?;
        let channel = self.store.load_or_create_channel(sender_key.channel_id)?;

        let sender_balance = ledger::debit(&mut sender_record, amount)?;
        // percent <= 100, so the wide product / 100 fits back in u64
        let tax = (u128::from(amount) * u128::from(channel.send_tax()) / 100) as u64;
        let received = amount - tax;
        let recipient_balance = ledger::credit(&mut recipient_record, received);

        self.store
            .put_players(vec![sender_record, recipient_record])?;

        info!(
            "transfer: {} sent {} xp to {} in channel {} ({} after tax)",
            escape_log(&sender.display_name),
            amount,
            escape_log(&recipient.display_name),
            sender_key.channel_id,
            received
        );

        Ok(TransferReceipt {
            amount,
            tax,
            received,
            sender_balance,
            recipient_balance,
        })
    }

    /// The item's refusal reason, if any. Order inside one item does not
    /// matter; each item has a single gate.
    fn purchase_gate(
        &self,
        item: ItemKind,
        player: &PlayerRecord,
        caps: &LevelCaps,
        now: DateTime<Utc>,
    ) -> Option<PreconditionReason> {
        match item {
            ItemKind::Round => (player.rounds >= caps.round_cap)
                .then_some(PreconditionReason::RoundsAtCap { cap: caps.round_cap }),
            ItemKind::Magazine => (player.magazines >= caps.magazine_cap).then_some(
                PreconditionReason::MagazinesAtCap {
                    cap: caps.magazine_cap,
                },
            ),
            ItemKind::RifleReclaim => {
                (!player.rifle_confiscated).then_some(PreconditionReason::RifleNotConfiscated)
            }
            ItemKind::PiercingAmmo => self.powerup_gate(PowerupKind::PiercingAmmo, player, now),
            ItemKind::IncendiaryAmmo => self.powerup_gate(PowerupKind::IncendiaryAmmo, player, now),
            ItemKind::GunOil => self.powerup_gate(PowerupKind::GunOil, player, now),
            ItemKind::Scope => self.powerup_gate(PowerupKind::Scope, player, now),
            ItemKind::Detector => self.powerup_gate(PowerupKind::Detector, player, now),
            ItemKind::Suppressor => self.powerup_gate(PowerupKind::Suppressor, player, now),
            ItemKind::LuckyCharm => self.powerup_gate(PowerupKind::LuckyCharm, player, now),
            ItemKind::Sunglasses
            | ItemKind::DryClothes
            | ItemKind::CleaningKit
            | ItemKind::Mirror
            | ItemKind::Sand => None,
        }
    }

    /// First still-active blocker from the registry's `blocked_by` list.
    fn powerup_gate(
        &self,
        kind: PowerupKind,
        player: &PlayerRecord,
        now: DateTime<Utc>,
    ) -> Option<PreconditionReason> {
        self.registry.blocked_by(kind).iter().find_map(|&blocker| {
            match player.powerups.remaining(&self.registry, blocker, now)? {
                Remaining::Time(left) => Some(PreconditionReason::PowerupActive {
                    kind: blocker,
                    until: now + left,
                }),
                Remaining::Charges(remaining) => Some(PreconditionReason::ChargesRemain {
                    kind: blocker,
                    remaining,
                }),
            }
        })
    }

    /// Apply the purchased item to the already-debited records.
    fn apply_item(
        &self,
        kind: ItemKind,
        player: &mut PlayerRecord,
        target: Option<&mut PlayerRecord>,
        channel: &ChannelRecord,
        caps: &LevelCaps,
        now: DateTime<Utc>,
    ) -> Result<PurchaseDetail, EconomyError> {
        let detail = match kind {
            ItemKind::Round => {
                player.rounds += 1;
                PurchaseDetail::RoundAdded {
                    rounds: player.rounds,
                    cap: caps.round_cap,
                }
            }
            ItemKind::Magazine => {
                player.magazines += 1;
                PurchaseDetail::MagazineAdded {
                    magazines: player.magazines,
                    cap: caps.magazine_cap,
                }
            }
            ItemKind::PiercingAmmo => {
                let until = self.install_timed(player, PowerupKind::PiercingAmmo, now);
                PurchaseDetail::PowerupInstalled {
                    kind: PowerupKind::PiercingAmmo,
                    until,
                }
            }
            ItemKind::IncendiaryAmmo => {
                let until = self.install_timed(player, PowerupKind::IncendiaryAmmo, now);
                PurchaseDetail::PowerupInstalled {
                    kind: PowerupKind::IncendiaryAmmo,
                    until,
                }
            }
            ItemKind::RifleReclaim => {
                player.rifle_confiscated = false;
                PurchaseDetail::RifleReclaimed
            }
            ItemKind::GunOil => {
                let until = self.install_timed(player, PowerupKind::GunOil, now);
                PurchaseDetail::PowerupInstalled {
                    kind: PowerupKind::GunOil,
                    until,
                }
            }
            ItemKind::Scope => {
                let charges = self.install_counted(player, PowerupKind::Scope, now);
                PurchaseDetail::ChargesInstalled {
                    kind: PowerupKind::Scope,
                    charges,
                }
            }
            ItemKind::Detector => {
                let charges = self.install_counted(player, PowerupKind::Detector, now);
                PurchaseDetail::ChargesInstalled {
                    kind: PowerupKind::Detector,
                    charges,
                }
            }
            ItemKind::Suppressor => {
                let until = self.install_timed(player, PowerupKind::Suppressor, now);
                PurchaseDetail::PowerupInstalled {
                    kind: PowerupKind::Suppressor,
                    until,
                }
            }
            ItemKind::LuckyCharm => {
                let (min, max) = channel.charm_range();
                let mut rng = rand::thread_rng();
                let bonus = rng.gen_range(min..=max);
                player.charm_bonus = bonus;
                let until = self.install_timed(player, PowerupKind::LuckyCharm, now);
                PurchaseDetail::CharmRolled { bonus, until }
            }
            ItemKind::Sunglasses => {
                // re-purchase while active still sells; the receipt and the
                // wasted counter record that nothing new was gained
                let wasted = player
                    .powerups
                    .is_active(&self.registry, PowerupKind::Sunglasses, now);
                player.powerups.clear(PowerupKind::Dazzled);
                let until = self.install_timed(player, PowerupKind::Sunglasses, now);
                PurchaseDetail::SunglassesInstalled { until, wasted }
            }
            ItemKind::DryClothes => {
                player.powerups.clear(PowerupKind::Soaked);
                PurchaseDetail::ClothesDried
            }
            ItemKind::CleaningKit => {
                player.powerups.clear(PowerupKind::Sand);
                player.rifle_sabotaged_by = None;
                PurchaseDetail::RifleCleaned
            }
            ItemKind::Mirror => {
                let target = target.ok_or(EconomyError::InvalidTarget {
                    reason: TargetReason::TargetRequired,
                })?;
                if target
                    .powerups
                    .is_active(&self.registry, PowerupKind::Sunglasses, now)
                {
                    PurchaseDetail::MirrorWasted {
                        target_id: target.user_id,
                    }
                } else {
                    target
                        .powerups
                        .install_default(&self.registry, PowerupKind::Dazzled, now);
                    PurchaseDetail::MirrorApplied {
                        target_id: target.user_id,
                    }
                }
            }
            ItemKind::Sand => {
                let target = target.ok_or(EconomyError::InvalidTarget {
                    reason: TargetReason::TargetRequired,
                })?;
                target
                    .powerups
                    .install_default(&self.registry, PowerupKind::Sand, now);
                target.powerups.clear(PowerupKind::GunOil);
                PurchaseDetail::SandThrown {
                    target_id: target.user_id,
                }
            }
        };
        Ok(detail)
    }

    fn install_timed(
        &self,
        player: &mut PlayerRecord,
        kind: PowerupKind,
        now: DateTime<Utc>,
    ) -> DateTime<Utc> {
        match player.powerups.install_default(&self.registry, kind, now) {
            PowerupState::Timed { until } => until,
            PowerupState::Counted { .. } => unreachable!("registry shape for {kind} is timed"),
        }
    }

    fn install_counted(
        &self,
        player: &mut PlayerRecord,
        kind: PowerupKind,
        now: DateTime<Utc>,
    ) -> u32 {
        match player.powerups.install_default(&self.registry, kind, now) {
            PowerupState::Counted { remaining } => remaining,
            PowerupState::Timed { .. } => unreachable!("registry shape for {kind} is counted"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::EconomyStoreBuilder;
    use tempfile::TempDir;

    fn engine(dir: &TempDir) -> ShopEngine {
        let store = Arc::new(
            EconomyStoreBuilder::new(dir.path())
                .open()
                .expect("open store"),
        );
        ShopEngine::new(store)
    }

    fn seed_player(engine: &ShopEngine, channel_id: u64, user_id: u64, name: &str, xp: u64) {
        let mut record = PlayerRecord::new(channel_id, user_id, name);
        record.experience = xp;
        engine.store.put_player(record).expect("seed player");
    }

    #[test]
    fn test_unstocked_item_is_refused() {
        tokio_test::block_on(async {
            let dir = TempDir::new().expect("tempdir");
            let catalog = Catalog::with_entries(vec![ItemEntry {
                kind: ItemKind::Round,
                name: "bullet",
                cost: 7,
                requires_target: false,
                aliases: &["1"],
            }])
            .expect("catalog");
            let engine = engine(&dir).with_catalog(catalog);
            let buyer = PlayerRef::new(10, "buyer", false);
            seed_player(&engine, 1, 10, "buyer", 100);

            match engine.purchase(1, &buyer, ItemKind::Magazine, None).await {
                Err(EconomyError::PreconditionFailed {
                    item: ItemKind::Magazine,
                    reason: PreconditionReason::NotStocked,
                }) => {}
                other => panic!("expected NotStocked, got {:?}", other),
            }
            // nothing was debited
            let record = engine
                .store
                .get_player(PlayerKey::new(1, 10))
                .expect("player");
            assert_eq!(record.experience, 100);
        });
    }

    #[test]
    fn test_stray_target_on_untargeted_item_is_ignored() {
        tokio_test::block_on(async {
            let dir = TempDir::new().expect("tempdir");
            let engine = engine(&dir);
            let buyer = PlayerRef::new(10, "buyer", false);
            let bystander = PlayerRef::new(11, "bystander", false);
            seed_player(&engine, 1, 10, "buyer", 50);

            let receipt = engine
                .purchase(1, &buyer, ItemKind::GunOil, Some(&bystander))
                .await
                .expect("purchase");
            assert_eq!(receipt.cost, 8);
            assert!(matches!(
                receipt.detail,
                PurchaseDetail::PowerupInstalled {
                    kind: PowerupKind::GunOil,
                    ..
                }
            ));
            // the bystander was never touched, let alone created
            assert!(engine.store.get_player(PlayerKey::new(1, 11)).is_err());
        });
    }

    #[test]
    fn test_giveback_refill_persists_even_when_purchase_is_refused() {
        tokio_test::block_on(async {
            let dir = TempDir::new().expect("tempdir");
            let engine = engine(&dir);
            let buyer = PlayerRef::new(10, "buyer", false);
            let now = Utc::now();

            let mut record = PlayerRecord::new(1, 10, "buyer");
            record.experience = 100;
            record.magazines = 0;
            record.last_giveback = now - Duration::hours(25);
            engine.store.put_player(record).expect("seed");

            match engine
                .purchase_at(1, &buyer, ItemKind::Magazine, None, now)
                .await
            {
                Err(EconomyError::PreconditionFailed {
                    reason: PreconditionReason::MagazinesAtCap { cap: 2 },
                    ..
                }) => {}
                other => panic!("expected MagazinesAtCap, got {:?}", other),
            }

            let record = engine
                .store
                .get_player(PlayerKey::new(1, 10))
                .expect("player");
            assert_eq!(record.magazines, 2, "refill persisted");
            assert_eq!(record.givebacks, 1);
            assert_eq!(record.experience, 100, "refused purchase did not debit");
        });
    }

    #[test]
    fn test_gate_names_the_blocking_tier() {
        tokio_test::block_on(async {
            let dir = TempDir::new().expect("tempdir");
            let engine = engine(&dir);
            let buyer = PlayerRef::new(10, "buyer", false);
            seed_player(&engine, 1, 10, "buyer", 100);
            let now = Utc::now();

            engine
                .purchase_at(1, &buyer, ItemKind::IncendiaryAmmo, None, now)
                .await
                .expect("incendiary");

            // the better tier blocks the cheaper one and is named in the reason
            match engine
                .purchase_at(1, &buyer, ItemKind::PiercingAmmo, None, now)
                .await
            {
                Err(EconomyError::PreconditionFailed {
                    item: ItemKind::PiercingAmmo,
                    reason:
                        PreconditionReason::PowerupActive {
                            kind: PowerupKind::IncendiaryAmmo,
                            ..
                        },
                }) => {}
                other => panic!("expected incendiary to block piercing, got {:?}", other),
            }
        });
    }

    #[test]
    fn test_transfer_applies_floor_tax() {
        tokio_test::block_on(async {
            let dir = TempDir::new().expect("tempdir");
            let engine = engine(&dir);
            let sender = PlayerRef::new(10, "sender", false);
            let recipient = PlayerRef::new(11, "recipient", false);
            seed_player(&engine, 1, 10, "sender", 100);

            // default channel tax is 5 percent; 50 * 5 / 100 floors to 2
            let receipt = engine
                .transfer(1, &sender, &recipient, 50)
                .await
                .expect("transfer");
            assert_eq!(receipt.tax, 2);
            assert_eq!(receipt.received, 48);
            assert_eq!(receipt.sender_balance, 50);
            assert_eq!(receipt.recipient_balance, 48);

            let sender_record = engine
                .store
                .get_player(PlayerKey::new(1, 10))
                .expect("sender");
            assert_eq!(sender_record.spent_experience, 50);
        });
    }
}
