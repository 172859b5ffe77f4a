//! Core records and receipts for the economy layer.
//!
//! Records carry a `schema_version` byte that the storage layer verifies on
//! read. Mutation helpers here touch only in-memory state; persistence is the
//! store's job and always happens after a whole operation has succeeded.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shop::catalog::ItemKind;
use crate::shop::powerup::{PowerupKind, PowerupSet};

pub const PLAYER_SCHEMA_VERSION: u8 = 1;
pub const CHANNEL_SCHEMA_VERSION: u8 = 1;
pub const USER_SCHEMA_VERSION: u8 = 1;

/// Identity of a player record: one per (channel, user) pair. The derived
/// ordering (channel first, then user) is the lock-acquisition order for
/// operations that touch two players.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct PlayerKey {
    pub channel_id: u64,
    pub user_id: u64,
}

impl PlayerKey {
    pub fn new(channel_id: u64, user_id: u64) -> Self {
        Self { channel_id, user_id }
    }
}

/// A chat-platform account as the command layer resolved it. The engine only
/// validates target constraints against it; resolution itself is external.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerRef {
    pub user_id: u64,
    pub display_name: String,
    pub is_bot: bool,
}

impl PlayerRef {
    pub fn new(user_id: u64, display_name: &str, is_bot: bool) -> Self {
        Self {
            user_id,
            display_name: display_name.to_string(),
            is_bot,
        }
    }
}

/// Per-channel player state: the experience ledger, ammo stock, equipment
/// flags, and active power-ups. Created lazily on first interaction, never
/// deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerRecord {
    pub channel_id: u64,
    pub user_id: u64,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Currency balance. Never negative: debits fail before mutating.
    pub experience: u64,
    /// Lifetime total of successful debits.
    pub spent_experience: u64,
    /// Rounds loaded in the current magazine.
    pub rounds: u32,
    /// Spare magazines on hand.
    pub magazines: u32,
    pub rifle_confiscated: bool,
    /// Set by gameplay (misfires); cleared by gameplay, not by any purchase.
    pub rifle_jammed: bool,
    /// Sabotage attribution, set by gameplay; cleared by the cleaning kit.
    pub rifle_sabotaged_by: Option<u64>,
    /// Bonus rolled at lucky-charm purchase, read by gameplay while the charm
    /// is active.
    pub charm_bonus: u32,
    pub powerups: PowerupSet,
    /// Cumulative successful purchases per item, for statistics.
    pub purchases: HashMap<ItemKind, u64>,
    /// Purchases that debited but had no effect (advisory re-buys, mirrors
    /// bounced off sunglasses).
    pub wasted_purchases: HashMap<ItemKind, u64>,
    /// How many daily magazine refills this player has received.
    pub givebacks: u32,
    pub last_giveback: DateTime<Utc>,
    pub schema_version: u8,
}

impl PlayerRecord {
    pub fn new(channel_id: u64, user_id: u64, display_name: &str) -> Self {
        let now = Utc::now();
        Self {
            channel_id,
            user_id,
            display_name: display_name.to_string(),
            created_at: now,
            updated_at: now,
            experience: 0,
            spent_experience: 0,
            rounds: 6,
            magazines: 2,
            rifle_confiscated: false,
            rifle_jammed: false,
            rifle_sabotaged_by: None,
            charm_bonus: 0,
            powerups: PowerupSet::new(),
            purchases: HashMap::new(),
            wasted_purchases: HashMap::new(),
            givebacks: 0,
            last_giveback: now,
            schema_version: PLAYER_SCHEMA_VERSION,
        }
    }

    pub fn key(&self) -> PlayerKey {
        PlayerKey::new(self.channel_id, self.user_id)
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn record_purchase(&mut self, item: ItemKind) {
        *self.purchases.entry(item).or_insert(0) += 1;
    }

    pub fn record_wasted(&mut self, item: ItemKind) {
        *self.wasted_purchases.entry(item).or_insert(0) += 1;
    }

    pub fn purchase_count(&self, item: ItemKind) -> u64 {
        self.purchases.get(&item).copied().unwrap_or(0)
    }

    pub fn wasted_count(&self, item: ItemKind) -> u64 {
        self.wasted_purchases.get(&item).copied().unwrap_or(0)
    }
}

/// Per-channel tunables, read as an immutable snapshot per operation. Who
/// edits these and when is the owning application's concern.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChannelRecord {
    pub channel_id: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Whether the game runs here at all. Enforced by the command layer.
    pub enabled: bool,
    pub charm_bonus_min: u32,
    pub charm_bonus_max: u32,
    /// Percentage withheld from experience transfers, clamped to 0..=100.
    pub send_tax_percent: u8,
    pub schema_version: u8,
}

impl ChannelRecord {
    pub fn new(channel_id: u64) -> Self {
        let now = Utc::now();
        Self {
            channel_id,
            created_at: now,
            updated_at: now,
            enabled: true,
            charm_bonus_min: 1,
            charm_bonus_max: 10,
            send_tax_percent: 5,
            schema_version: CHANNEL_SCHEMA_VERSION,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Charm roll bounds with an inverted configuration normalized away.
    pub fn charm_range(&self) -> (u32, u32) {
        let min = self.charm_bonus_min;
        (min, self.charm_bonus_max.max(min))
    }

    pub fn send_tax(&self) -> u8 {
        self.send_tax_percent.min(100)
    }
}

/// Cross-channel identity: the vote counter and the reward-item multiset live
/// here, outside any single channel's player record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserRecord {
    pub user_id: u64,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub votes: u64,
    /// Unordered multiset of item slugs.
    pub inventory: HashMap<String, u64>,
    pub schema_version: u8,
}

impl UserRecord {
    pub fn new(user_id: u64, display_name: &str) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            display_name: display_name.to_string(),
            created_at: now,
            updated_at: now,
            votes: 0,
            inventory: HashMap::new(),
            schema_version: USER_SCHEMA_VERSION,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn add_inventory(&mut self, slug: &str, count: u64) {
        *self.inventory.entry(slug.to_string()).or_insert(0) += count;
    }

    pub fn inventory_count(&self, slug: &str) -> u64 {
        self.inventory.get(slug).copied().unwrap_or(0)
    }
}

/// What a successful purchase did, returned to the command layer for
/// rendering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PurchaseReceipt {
    pub item: ItemKind,
    pub cost: u64,
    pub balance_after: u64,
    pub detail: PurchaseDetail,
}

/// Item-specific outcome of a purchase.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseDetail {
    RoundAdded { rounds: u32, cap: u32 },
    MagazineAdded { magazines: u32, cap: u32 },
    PowerupInstalled { kind: PowerupKind, until: DateTime<Utc> },
    ChargesInstalled { kind: PowerupKind, charges: u32 },
    RifleReclaimed,
    CharmRolled { bonus: u32, until: DateTime<Utc> },
    SunglassesInstalled { until: DateTime<Utc>, wasted: bool },
    ClothesDried,
    RifleCleaned,
    MirrorApplied { target_id: u64 },
    /// Target wore sunglasses; the purchase debited but did nothing.
    MirrorWasted { target_id: u64 },
    SandThrown { target_id: u64 },
}

/// Outcome of an experience transfer between two players.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferReceipt {
    /// What the sender paid.
    pub amount: u64,
    /// Withheld by the channel tax.
    pub tax: u64,
    /// What the recipient was credited.
    pub received: u64,
    pub sender_balance: u64,
    pub recipient_balance: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_player_defaults() {
        let player = PlayerRecord::new(77, 42, "Calgeka");
        assert_eq!(player.key(), PlayerKey::new(77, 42));
        assert_eq!(player.experience, 0);
        assert_eq!(player.spent_experience, 0);
        assert_eq!(player.rounds, 6);
        assert_eq!(player.magazines, 2);
        assert!(!player.rifle_confiscated);
        assert_eq!(player.rifle_sabotaged_by, None);
        assert_eq!(player.schema_version, PLAYER_SCHEMA_VERSION);
    }

    #[test]
    fn test_purchase_counters_accumulate() {
        let mut player = PlayerRecord::new(1, 2, "p");
        player.record_purchase(ItemKind::Round);
        player.record_purchase(ItemKind::Round);
        player.record_wasted(ItemKind::Sunglasses);
        assert_eq!(player.purchase_count(ItemKind::Round), 2);
        assert_eq!(player.purchase_count(ItemKind::Mirror), 0);
        assert_eq!(player.wasted_count(ItemKind::Sunglasses), 1);
    }

    #[test]
    fn test_channel_defaults_and_normalization() {
        let mut channel = ChannelRecord::new(9);
        assert!(channel.enabled);
        assert_eq!(channel.charm_range(), (1, 10));
        assert_eq!(channel.send_tax(), 5);

        channel.charm_bonus_min = 8;
        channel.charm_bonus_max = 3;
        assert_eq!(channel.charm_range(), (8, 8));

        channel.send_tax_percent = 150;
        assert_eq!(channel.send_tax(), 100);
    }

    #[test]
    fn test_user_inventory_is_a_multiset() {
        let mut user = UserRecord::new(5, "Globekeeper");
        assert_eq!(user.votes, 0);
        user.add_inventory("voter_ribbon", 1);
        user.add_inventory("voter_ribbon", 1);
        assert_eq!(user.inventory_count("voter_ribbon"), 2);
        assert_eq!(user.inventory_count("sunglasses"), 0);
    }

    #[test]
    fn test_player_key_ordering_is_channel_then_user() {
        let a = PlayerKey::new(1, 900);
        let b = PlayerKey::new(2, 3);
        let c = PlayerKey::new(2, 4);
        assert!(a < b);
        assert!(b < c);
    }
}
