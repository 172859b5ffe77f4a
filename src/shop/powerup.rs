//! Power-up kinds, the immutable registry of their shapes, and the per-player
//! state tracker. A kind is either *timed* (active until an expiry instant) or
//! *counted* (active while charges remain), never both.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

const HOUR_SECS: u64 = 60 * 60;
const DAY_SECS: u64 = 24 * HOUR_SECS;

/// Every power-up the game knows about, buffs and debuffs alike.
///
/// Debuffs (`Dazzled`, `Sand`, `Soaked`) are installed on *other* players by
/// offensive purchases or by gameplay outside this crate; they share the same
/// state machinery as the buffs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PowerupKind {
    PiercingAmmo,
    IncendiaryAmmo,
    GunOil,
    Suppressor,
    LuckyCharm,
    Sunglasses,
    Scope,
    Detector,
    Dazzled,
    Sand,
    Soaked,
}

impl PowerupKind {
    /// All kinds in declaration order. The registry's spec table is indexed by
    /// this order.
    pub const ALL: [PowerupKind; 11] = [
        PowerupKind::PiercingAmmo,
        PowerupKind::IncendiaryAmmo,
        PowerupKind::GunOil,
        PowerupKind::Suppressor,
        PowerupKind::LuckyCharm,
        PowerupKind::Sunglasses,
        PowerupKind::Scope,
        PowerupKind::Detector,
        PowerupKind::Dazzled,
        PowerupKind::Sand,
        PowerupKind::Soaked,
    ];

    /// Stable slug, matching the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            PowerupKind::PiercingAmmo => "piercing_ammo",
            PowerupKind::IncendiaryAmmo => "incendiary_ammo",
            PowerupKind::GunOil => "gun_oil",
            PowerupKind::Suppressor => "suppressor",
            PowerupKind::LuckyCharm => "lucky_charm",
            PowerupKind::Sunglasses => "sunglasses",
            PowerupKind::Scope => "scope",
            PowerupKind::Detector => "detector",
            PowerupKind::Dazzled => "dazzled",
            PowerupKind::Sand => "sand",
            PowerupKind::Soaked => "soaked",
        }
    }
}

impl fmt::Display for PowerupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Duration semantics of a kind, fixed in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerupShape {
    /// Active from installation until `now + duration_secs`.
    Timed { duration_secs: u64 },
    /// Active while the installed charge counter stays above zero.
    Counted { charges: u32 },
}

/// Registry entry for one kind: its shape plus the kinds whose active state
/// blocks a fresh purchase of it.
#[derive(Debug, Clone)]
pub struct PowerupSpec {
    pub kind: PowerupKind,
    pub shape: PowerupShape,
    /// Purchase gate: buying this kind is refused while any listed kind is
    /// active. An empty set means the purchase is never blocked (advisory
    /// items and debuffs).
    pub blocked_by: &'static [PowerupKind],
}

/// Immutable table of power-up specs, built once and passed by reference into
/// the engine. There is no runtime mutation and no global lookup.
#[derive(Debug, Clone)]
pub struct PowerupRegistry {
    specs: Vec<PowerupSpec>,
}

impl PowerupRegistry {
    /// The standard game registry: 24-hour buffs, the scope/detector charge
    /// counters, single-charge debuffs, and a one-hour soak.
    pub fn standard() -> Self {
        use PowerupKind::*;
        let specs = PowerupKind::ALL
            .iter()
            .map(|&kind| {
                let (shape, blocked_by): (PowerupShape, &'static [PowerupKind]) = match kind {
                    PiercingAmmo => (
                        PowerupShape::Timed { duration_secs: DAY_SECS },
                        // The incendiary tier is strictly better; it blocks the
                        // cheaper tier but not the other way around.
                        &[PiercingAmmo, IncendiaryAmmo],
                    ),
                    IncendiaryAmmo => {
                        (PowerupShape::Timed { duration_secs: DAY_SECS }, &[IncendiaryAmmo])
                    }
                    GunOil => (PowerupShape::Timed { duration_secs: DAY_SECS }, &[GunOil]),
                    Suppressor => {
                        (PowerupShape::Timed { duration_secs: DAY_SECS }, &[Suppressor])
                    }
                    LuckyCharm => {
                        (PowerupShape::Timed { duration_secs: DAY_SECS }, &[LuckyCharm])
                    }
                    Sunglasses => (PowerupShape::Timed { duration_secs: DAY_SECS }, &[]),
                    Scope => (PowerupShape::Counted { charges: 12 }, &[Scope]),
                    Detector => (PowerupShape::Counted { charges: 6 }, &[Detector]),
                    Dazzled => (PowerupShape::Counted { charges: 1 }, &[]),
                    Sand => (PowerupShape::Counted { charges: 1 }, &[]),
                    Soaked => (PowerupShape::Timed { duration_secs: HOUR_SECS }, &[]),
                };
                PowerupSpec { kind, shape, blocked_by }
            })
            .collect();
        Self { specs }
    }

    pub fn spec(&self, kind: PowerupKind) -> &PowerupSpec {
        &self.specs[kind as usize]
    }

    pub fn shape(&self, kind: PowerupKind) -> PowerupShape {
        self.spec(kind).shape
    }

    pub fn blocked_by(&self, kind: PowerupKind) -> &'static [PowerupKind] {
        self.spec(kind).blocked_by
    }

    /// Fresh state for `kind` installed at `now`: full duration for timed
    /// kinds, the full charge count for counted ones.
    pub fn default_state(&self, kind: PowerupKind, now: DateTime<Utc>) -> PowerupState {
        match self.shape(kind) {
            PowerupShape::Timed { duration_secs } => PowerupState::Timed {
                until: now + Duration::seconds(duration_secs as i64),
            },
            PowerupShape::Counted { charges } => PowerupState::Counted { remaining: charges },
        }
    }
}

/// Stored state of one active (or expired) power-up entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PowerupState {
    Timed { until: DateTime<Utc> },
    Counted { remaining: u32 },
}

/// What is left of an active power-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remaining {
    Time(Duration),
    Charges(u32),
}

/// Per-player map of power-up kind to its stored state. Reads are dispatched
/// through the registry so a `Timed` entry stored under a `Counted` kind (or
/// vice versa, e.g. after a registry change) reads as inactive instead of
/// panicking. Writes are plain overwrites; all cross-kind rules live in the
/// catalog and registry.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PowerupSet {
    entries: HashMap<PowerupKind, PowerupState>,
}

impl PowerupSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Timed kinds are active strictly before their expiry; counted kinds
    /// while charges remain.
    pub fn is_active(
        &self,
        registry: &PowerupRegistry,
        kind: PowerupKind,
        now: DateTime<Utc>,
    ) -> bool {
        self.remaining(registry, kind, now).is_some()
    }

    /// Remaining duration or charges, `None` when the kind is not active.
    pub fn remaining(
        &self,
        registry: &PowerupRegistry,
        kind: PowerupKind,
        now: DateTime<Utc>,
    ) -> Option<Remaining> {
        let entry = self.entries.get(&kind)?;
        match (registry.shape(kind), entry) {
            (PowerupShape::Timed { .. }, PowerupState::Timed { until }) if now < *until => {
                Some(Remaining::Time(*until - now))
            }
            (PowerupShape::Counted { .. }, PowerupState::Counted { remaining })
                if *remaining > 0 =>
            {
                Some(Remaining::Charges(*remaining))
            }
            _ => None,
        }
    }

    /// Raw entry, regardless of whether it is still active.
    pub fn get(&self, kind: PowerupKind) -> Option<&PowerupState> {
        self.entries.get(&kind)
    }

    /// Overwrite the entry for `kind`. Replacing never stacks: an exhausted
    /// counter or stale expiry is simply discarded.
    pub fn install(&mut self, kind: PowerupKind, state: PowerupState) {
        self.entries.insert(kind, state);
    }

    /// Install the registry's default state for `kind` and return it.
    pub fn install_default(
        &mut self,
        registry: &PowerupRegistry,
        kind: PowerupKind,
        now: DateTime<Utc>,
    ) -> PowerupState {
        let state = registry.default_state(kind, now);
        self.entries.insert(kind, state);
        state
    }

    /// Remove the entry for `kind`. Returns whether anything was removed.
    pub fn clear(&mut self, kind: PowerupKind) -> bool {
        self.entries.remove(&kind).is_some()
    }

    /// Spend one charge of a counted entry. Returns false when the entry is
    /// missing, exhausted, or timed. Qualifying gameplay actions outside this
    /// crate call this on each use.
    pub fn consume_charge(&mut self, kind: PowerupKind) -> bool {
        match self.entries.get_mut(&kind) {
            Some(PowerupState::Counted { remaining }) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn test_registry_specs_align_with_kind_order() {
        let registry = PowerupRegistry::standard();
        for (idx, kind) in PowerupKind::ALL.iter().enumerate() {
            assert_eq!(registry.specs[idx].kind, *kind);
            assert_eq!(registry.spec(*kind).kind, *kind);
        }
    }

    #[test]
    fn test_timed_entry_expires_at_boundary() {
        let registry = PowerupRegistry::standard();
        let mut set = PowerupSet::new();
        let t0 = now();
        let state = set.install_default(&registry, PowerupKind::GunOil, t0);
        let until = match state {
            PowerupState::Timed { until } => until,
            other => panic!("gun oil should be timed, got {:?}", other),
        };
        assert!(set.is_active(&registry, PowerupKind::GunOil, t0));
        assert!(set.is_active(&registry, PowerupKind::GunOil, until - Duration::seconds(1)));
        // "active" means strictly before expiry
        assert!(!set.is_active(&registry, PowerupKind::GunOil, until));
        assert!(!set.is_active(&registry, PowerupKind::GunOil, until + Duration::hours(1)));
    }

    #[test]
    fn test_counted_entry_drains_to_inactive() {
        let registry = PowerupRegistry::standard();
        let mut set = PowerupSet::new();
        let t0 = now();
        set.install_default(&registry, PowerupKind::Detector, t0);
        assert_eq!(
            set.remaining(&registry, PowerupKind::Detector, t0),
            Some(Remaining::Charges(6))
        );
        for _ in 0..6 {
            assert!(set.consume_charge(PowerupKind::Detector));
        }
        assert!(!set.consume_charge(PowerupKind::Detector));
        assert!(!set.is_active(&registry, PowerupKind::Detector, t0));
        // the exhausted entry is still visible raw
        assert_eq!(
            set.get(PowerupKind::Detector),
            Some(&PowerupState::Counted { remaining: 0 })
        );
    }

    #[test]
    fn test_shape_mismatch_reads_as_inactive() {
        let registry = PowerupRegistry::standard();
        let mut set = PowerupSet::new();
        let t0 = now();
        // a counted value stored under a timed kind
        set.install(PowerupKind::GunOil, PowerupState::Counted { remaining: 5 });
        assert!(!set.is_active(&registry, PowerupKind::GunOil, t0));
        // and the reverse
        set.install(
            PowerupKind::Scope,
            PowerupState::Timed { until: t0 + Duration::days(1) },
        );
        assert!(!set.is_active(&registry, PowerupKind::Scope, t0));
        assert!(!set.consume_charge(PowerupKind::Scope));
    }

    #[test]
    fn test_install_overwrites_instead_of_stacking() {
        let registry = PowerupRegistry::standard();
        let mut set = PowerupSet::new();
        let t0 = now();
        set.install(PowerupKind::Scope, PowerupState::Counted { remaining: 2 });
        set.install_default(&registry, PowerupKind::Scope, t0);
        assert_eq!(
            set.remaining(&registry, PowerupKind::Scope, t0),
            Some(Remaining::Charges(12))
        );
    }

    #[test]
    fn test_clear_removes_entry() {
        let registry = PowerupRegistry::standard();
        let mut set = PowerupSet::new();
        let t0 = now();
        set.install_default(&registry, PowerupKind::Dazzled, t0);
        assert!(set.is_active(&registry, PowerupKind::Dazzled, t0));
        assert!(set.clear(PowerupKind::Dazzled));
        assert!(!set.clear(PowerupKind::Dazzled));
        assert!(!set.is_active(&registry, PowerupKind::Dazzled, t0));
    }
}
