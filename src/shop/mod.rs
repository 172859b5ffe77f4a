//! Shop and economy core: the item catalog, power-up tracking, leveling
//! caps, and the atomic purchase engine on top of them.
//!
//! The engine owns all mutation; the other modules are pure data and policy
//! so the command layer can render listings and receipts without touching
//! the store.

pub mod catalog;
pub mod engine;
pub mod errors;
pub mod ledger;
pub mod leveling;
pub mod powerup;
pub mod types;

pub use catalog::{Catalog, ItemEntry, ItemKind};
pub use engine::{apply_giveback, ShopEngine};
pub use errors::{CatalogError, EconomyError, PreconditionReason, TargetReason};
pub use leveling::{FixedCaps, LevelCaps, Leveling, StandardLeveling};
pub use powerup::{
    PowerupKind, PowerupRegistry, PowerupSet, PowerupShape, PowerupSpec, PowerupState, Remaining,
};
pub use types::*;
