//! The item catalog: what is for sale, at what price, under which aliases.
//!
//! The catalog is immutable once built. Construction validates that no item
//! kind and no alias is bound twice and fails fast on a collision; a
//! shadowed binding would silently make an item unreachable from user input.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::shop::errors::CatalogError;

/// Every purchasable item. Slugs double as the canonical alias.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Round,
    Magazine,
    PiercingAmmo,
    IncendiaryAmmo,
    RifleReclaim,
    GunOil,
    Scope,
    Detector,
    Suppressor,
    LuckyCharm,
    Sunglasses,
    DryClothes,
    CleaningKit,
    Mirror,
    Sand,
}

impl ItemKind {
    /// All kinds in shop-listing order.
    pub const ALL: [ItemKind; 15] = [
        ItemKind::Round,
        ItemKind::Magazine,
        ItemKind::PiercingAmmo,
        ItemKind::IncendiaryAmmo,
        ItemKind::RifleReclaim,
        ItemKind::GunOil,
        ItemKind::Scope,
        ItemKind::Detector,
        ItemKind::Suppressor,
        ItemKind::LuckyCharm,
        ItemKind::Sunglasses,
        ItemKind::DryClothes,
        ItemKind::CleaningKit,
        ItemKind::Mirror,
        ItemKind::Sand,
    ];

    /// Stable slug, matching the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Round => "round",
            ItemKind::Magazine => "magazine",
            ItemKind::PiercingAmmo => "piercing_ammo",
            ItemKind::IncendiaryAmmo => "incendiary_ammo",
            ItemKind::RifleReclaim => "rifle_reclaim",
            ItemKind::GunOil => "gun_oil",
            ItemKind::Scope => "scope",
            ItemKind::Detector => "detector",
            ItemKind::Suppressor => "suppressor",
            ItemKind::LuckyCharm => "lucky_charm",
            ItemKind::Sunglasses => "sunglasses",
            ItemKind::DryClothes => "dry_clothes",
            ItemKind::CleaningKit => "cleaning_kit",
            ItemKind::Mirror => "mirror",
            ItemKind::Sand => "sand",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One catalog entry. Prices are fixed; behavior for each kind lives in the
/// purchase engine.
#[derive(Debug, Clone)]
pub struct ItemEntry {
    pub kind: ItemKind,
    /// Human name for shop listings.
    pub name: &'static str,
    /// Cost in experience.
    pub cost: u64,
    /// Whether the item acts on another player.
    pub requires_target: bool,
    /// Extra aliases beyond the slug: the listing position and word shortcuts.
    pub aliases: &'static [&'static str],
}

/// Immutable lookup table from item kind / alias to entry.
#[derive(Debug, Clone)]
pub struct Catalog {
    entries: HashMap<ItemKind, ItemEntry>,
    aliases: HashMap<String, ItemKind>,
    listing: Vec<ItemKind>,
}

impl Catalog {
    /// The standard fifteen-item shop.
    pub fn standard() -> Self {
        Self::with_entries(standard_entries())
            .expect("standard catalog has unique items and aliases")
    }

    /// Build a catalog from explicit entries, rejecting any duplicate item
    /// kind or alias. Aliases are compared case-insensitively, and every
    /// entry's slug participates in the uniqueness check like any alias.
    pub fn with_entries(entries: Vec<ItemEntry>) -> Result<Self, CatalogError> {
        let mut by_kind: HashMap<ItemKind, ItemEntry> = HashMap::new();
        let mut aliases: HashMap<String, ItemKind> = HashMap::new();
        let mut listing = Vec::with_capacity(entries.len());

        for entry in entries {
            let kind = entry.kind;
            if by_kind.contains_key(&kind) {
                return Err(CatalogError::DuplicateItem(kind));
            }
            let mut names = Vec::with_capacity(entry.aliases.len() + 1);
            names.push(kind.as_str().to_string());
            names.extend(entry.aliases.iter().map(|a| a.to_lowercase()));
            for name in names {
                if aliases.insert(name.clone(), kind).is_some() {
                    return Err(CatalogError::DuplicateAlias(name));
                }
            }
            listing.push(kind);
            by_kind.insert(kind, entry);
        }

        Ok(Self { entries: by_kind, aliases, listing })
    }

    /// Entry for a kind, `None` when this catalog does not stock it.
    pub fn entry(&self, kind: ItemKind) -> Option<&ItemEntry> {
        self.entries.get(&kind)
    }

    /// Map user input (slug, number, or word alias) to an item kind.
    pub fn resolve(&self, input: &str) -> Option<ItemKind> {
        self.aliases.get(&input.trim().to_lowercase()).copied()
    }

    /// Stocked entries in listing order.
    pub fn list(&self) -> Vec<&ItemEntry> {
        self.listing
            .iter()
            .filter_map(|kind| self.entries.get(kind))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn standard_entries() -> Vec<ItemEntry> {
    vec![
        ItemEntry {
            kind: ItemKind::Round,
            name: "bullet",
            cost: 7,
            requires_target: false,
            aliases: &["1", "bullet"],
        },
        ItemEntry {
            kind: ItemKind::Magazine,
            name: "magazine",
            cost: 13,
            requires_target: false,
            aliases: &["2", "charger"],
        },
        ItemEntry {
            kind: ItemKind::PiercingAmmo,
            name: "armor-piercing ammo",
            cost: 15,
            requires_target: false,
            aliases: &["3", "ap", "ap_ammo"],
        },
        ItemEntry {
            kind: ItemKind::IncendiaryAmmo,
            name: "explosive ammo",
            cost: 25,
            requires_target: false,
            aliases: &["4", "explosive", "explo"],
        },
        ItemEntry {
            kind: ItemKind::RifleReclaim,
            name: "rifle reclaim",
            cost: 30,
            requires_target: false,
            aliases: &["5", "rifle", "gun"],
        },
        ItemEntry {
            kind: ItemKind::GunOil,
            name: "gun oil",
            cost: 8,
            requires_target: false,
            aliases: &["6", "grease", "lubricant"],
        },
        ItemEntry {
            kind: ItemKind::Scope,
            name: "scope",
            cost: 6,
            requires_target: false,
            aliases: &["7", "sight"],
        },
        ItemEntry {
            kind: ItemKind::Detector,
            name: "infrared detector",
            cost: 15,
            requires_target: false,
            aliases: &["8", "ir", "infrared"],
        },
        ItemEntry {
            kind: ItemKind::Suppressor,
            name: "suppressor",
            cost: 5,
            requires_target: false,
            aliases: &["9", "silencer", "shhh"],
        },
        ItemEntry {
            kind: ItemKind::LuckyCharm,
            name: "four-leaf clover",
            cost: 13,
            requires_target: false,
            aliases: &["10", "clover", "charm"],
        },
        ItemEntry {
            kind: ItemKind::Sunglasses,
            name: "sunglasses",
            cost: 5,
            requires_target: false,
            aliases: &["11", "glasses"],
        },
        ItemEntry {
            kind: ItemKind::DryClothes,
            name: "dry clothes",
            cost: 7,
            requires_target: false,
            aliases: &["12", "clothes", "dry"],
        },
        ItemEntry {
            kind: ItemKind::CleaningKit,
            name: "cleaning kit",
            cost: 7,
            requires_target: false,
            aliases: &["13", "brush", "clean"],
        },
        ItemEntry {
            kind: ItemKind::Mirror,
            name: "mirror",
            cost: 7,
            requires_target: true,
            aliases: &["14"],
        },
        ItemEntry {
            kind: ItemKind::Sand,
            name: "handful of sand",
            cost: 7,
            requires_target: true,
            aliases: &["15", "handful_of_sand"],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_catalog_stocks_everything() {
        let catalog = Catalog::standard();
        assert_eq!(catalog.len(), ItemKind::ALL.len());
        for kind in ItemKind::ALL {
            let entry = catalog.entry(kind).unwrap();
            assert_eq!(entry.kind, kind);
            assert!(entry.cost > 0);
            // the slug always resolves to its own kind
            assert_eq!(catalog.resolve(kind.as_str()), Some(kind));
        }
        let listing = catalog.list();
        assert_eq!(listing.len(), ItemKind::ALL.len());
        assert_eq!(listing[0].kind, ItemKind::Round);
        assert_eq!(listing[14].kind, ItemKind::Sand);
    }

    #[test]
    fn test_resolve_accepts_numbers_words_and_mixed_case() {
        let catalog = Catalog::standard();
        assert_eq!(catalog.resolve("7"), Some(ItemKind::Scope));
        assert_eq!(catalog.resolve("sight"), Some(ItemKind::Scope));
        assert_eq!(catalog.resolve("SILENCER"), Some(ItemKind::Suppressor));
        assert_eq!(catalog.resolve("  clover "), Some(ItemKind::LuckyCharm));
        assert_eq!(catalog.resolve("15"), Some(ItemKind::Sand));
        assert_eq!(catalog.resolve("ducks"), None);
    }

    #[test]
    fn test_costs_match_the_price_list() {
        let catalog = Catalog::standard();
        assert_eq!(catalog.entry(ItemKind::Round).unwrap().cost, 7);
        assert_eq!(catalog.entry(ItemKind::IncendiaryAmmo).unwrap().cost, 25);
        assert_eq!(catalog.entry(ItemKind::RifleReclaim).unwrap().cost, 30);
        assert_eq!(catalog.entry(ItemKind::Suppressor).unwrap().cost, 5);
    }

    #[test]
    fn test_targeted_items_are_flagged() {
        let catalog = Catalog::standard();
        for kind in ItemKind::ALL {
            let targeted = matches!(kind, ItemKind::Mirror | ItemKind::Sand);
            assert_eq!(catalog.entry(kind).unwrap().requires_target, targeted);
        }
    }

    #[test]
    fn test_duplicate_item_rejected() {
        let mut entries = standard_entries();
        entries.push(ItemEntry {
            kind: ItemKind::Mirror,
            name: "second mirror",
            cost: 9,
            requires_target: true,
            aliases: &["sixteen"],
        });
        match Catalog::with_entries(entries) {
            Err(CatalogError::DuplicateItem(ItemKind::Mirror)) => {}
            other => panic!("expected duplicate item error, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_alias_rejected() {
        let entries = vec![
            ItemEntry {
                kind: ItemKind::Mirror,
                name: "mirror",
                cost: 7,
                requires_target: true,
                aliases: &["shiny"],
            },
            ItemEntry {
                kind: ItemKind::Sand,
                name: "handful of sand",
                cost: 7,
                requires_target: true,
                aliases: &["Shiny"],
            },
        ];
        match Catalog::with_entries(entries) {
            Err(CatalogError::DuplicateAlias(name)) => assert_eq!(name, "shiny"),
            other => panic!("expected duplicate alias error, got {:?}", other),
        }
    }

    #[test]
    fn test_alias_colliding_with_a_slug_rejected() {
        let entries = vec![
            ItemEntry {
                kind: ItemKind::Sand,
                name: "handful of sand",
                cost: 7,
                requires_target: true,
                aliases: &[],
            },
            ItemEntry {
                kind: ItemKind::Mirror,
                name: "mirror",
                cost: 7,
                requires_target: true,
                aliases: &["sand"],
            },
        ];
        match Catalog::with_entries(entries) {
            Err(CatalogError::DuplicateAlias(name)) => assert_eq!(name, "sand"),
            other => panic!("expected duplicate alias error, got {:?}", other),
        }
    }
}
