//! Level-derived capacity caps.
//!
//! The purchase engine treats leveling as an external pure function from a
//! player snapshot to caps, behind the [`Leveling`] trait. The host bot can
//! plug in its own progression table; [`StandardLeveling`] ships a reasonable
//! one keyed on the current experience balance.

use crate::shop::types::PlayerRecord;

/// Capacity caps for one player at their current level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelCaps {
    pub level: u32,
    pub title: &'static str,
    /// Maximum rounds in the loaded magazine.
    pub round_cap: u32,
    /// Maximum spare magazines.
    pub magazine_cap: u32,
}

/// Pure mapping from a player snapshot to capacity caps.
pub trait Leveling: Send + Sync {
    fn caps(&self, player: &PlayerRecord) -> LevelCaps;
}

/// Threshold table on the current balance. Spending experience can drop a
/// player back a tier; that is how the game works, not an accounting bug.
/// The bottom tier matches a fresh record (6 rounds, 2 magazines).
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardLeveling;

// (experience threshold, level, title, round cap, magazine cap)
const TIERS: [(u64, u32, &str, u32, u32); 8] = [
    (0, 1, "tourist", 6, 2),
    (50, 2, "greenhorn", 6, 2),
    (150, 3, "field hand", 6, 3),
    (400, 4, "marksman", 8, 3),
    (1000, 5, "sharpshooter", 8, 4),
    (2500, 6, "ranger", 10, 4),
    (6000, 7, "warden", 10, 5),
    (15000, 8, "legend", 12, 6),
];

impl Leveling for StandardLeveling {
    fn caps(&self, player: &PlayerRecord) -> LevelCaps {
        let mut current = TIERS[0];
        for tier in TIERS.iter() {
            if player.experience >= tier.0 {
                current = *tier;
            } else {
                break;
            }
        }
        let (_, level, title, round_cap, magazine_cap) = current;
        LevelCaps { level, title, round_cap, magazine_cap }
    }
}

/// Constant caps regardless of the snapshot. Handy in tests and for
/// deployments without progression.
#[derive(Debug, Clone, Copy)]
pub struct FixedCaps {
    pub round_cap: u32,
    pub magazine_cap: u32,
}

impl Leveling for FixedCaps {
    fn caps(&self, _player: &PlayerRecord) -> LevelCaps {
        LevelCaps {
            level: 1,
            title: "fixed",
            round_cap: self.round_cap,
            magazine_cap: self.magazine_cap,
        }
    }
}
