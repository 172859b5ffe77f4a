//! Typed failures for the shop and ledger layer.

use std::fmt;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::shop::catalog::ItemKind;
use crate::shop::powerup::PowerupKind;
use crate::storage::StoreError;

/// Errors surfaced by purchases, transfers, and ledger operations. Every
/// variant is terminal for the request that produced it; the storage retry
/// loop is the only internal retry, and its exhaustion surfaces as
/// `TemporarilyUnavailable`.
#[derive(Debug, Error)]
pub enum EconomyError {
    /// The buyer cannot cover the cost. Nothing was debited.
    #[error("insufficient experience: need {needed}, have {have}")]
    InsufficientFunds { needed: u64, have: u64 },

    /// The item's own precondition refused the purchase. Nothing was debited.
    #[error("cannot buy {item}: {reason}")]
    PreconditionFailed {
        item: ItemKind,
        reason: PreconditionReason,
    },

    /// A targeted item was aimed at an unacceptable target.
    #[error("invalid target: {reason}")]
    InvalidTarget { reason: TargetReason },

    /// A transfer amount outside the accepted range (currently: zero).
    #[error("invalid amount: {0}")]
    InvalidAmount(u64),

    /// Bounded storage retries were exhausted; the caller may try again.
    #[error("storage busy, try again later")]
    TemporarilyUnavailable,

    /// Wrapper around storage-layer failures.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Why an item refused to sell. Carried inside
/// [`EconomyError::PreconditionFailed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreconditionReason {
    /// A blocking timed power-up is still running.
    PowerupActive {
        kind: PowerupKind,
        until: DateTime<Utc>,
    },
    /// A blocking counted power-up still has charges left.
    ChargesRemain { kind: PowerupKind, remaining: u32 },
    /// The current magazine already holds the level cap of rounds.
    RoundsAtCap { cap: u32 },
    /// The player already carries the level cap of magazines.
    MagazinesAtCap { cap: u32 },
    /// Reclaiming a rifle that was never confiscated.
    RifleNotConfiscated,
    /// The catalog in use does not stock this item.
    NotStocked,
}

impl fmt::Display for PreconditionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreconditionReason::PowerupActive { kind, until } => {
                write!(f, "{} is already active until {}", kind, until)
            }
            PreconditionReason::ChargesRemain { kind, remaining } => {
                write!(f, "{} still has {} charges left", kind, remaining)
            }
            PreconditionReason::RoundsAtCap { cap } => {
                write!(f, "current magazine is full ({} rounds)", cap)
            }
            PreconditionReason::MagazinesAtCap { cap } => {
                write!(f, "already carrying the maximum of {} magazines", cap)
            }
            PreconditionReason::RifleNotConfiscated => {
                write!(f, "the rifle is not confiscated")
            }
            PreconditionReason::NotStocked => write!(f, "not stocked by this shop"),
        }
    }
}

/// Why a target was rejected. Carried inside [`EconomyError::InvalidTarget`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetReason {
    /// The item needs a target and none was given.
    TargetRequired,
    /// The buyer aimed the item at themselves.
    SelfTarget,
    /// The target is an automated account, not a player.
    AutomatedTarget,
}

impl fmt::Display for TargetReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetReason::TargetRequired => write!(f, "a target player is required"),
            TargetReason::SelfTarget => write!(f, "the buyer cannot target themselves"),
            TargetReason::AutomatedTarget => write!(f, "automated accounts cannot be targeted"),
        }
    }
}

/// Catalog construction failures. Both indicate an authoring error and are
/// raised at build time, never during a purchase.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    /// The same item kind was bound to two entries.
    #[error("duplicate catalog entry for item: {0}")]
    DuplicateItem(ItemKind),

    /// The same alias would resolve to two different entries.
    #[error("duplicate catalog alias: {0}")]
    DuplicateAlias(String),
}
