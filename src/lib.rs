//! # Huntshop - Hunting-Game Economy Engine
//!
//! Huntshop is the economy backend for a chat-platform duck hunting game. It
//! keeps per-channel player ledgers, sells and applies hunting gear, and
//! reconciles votes delivered by bot-listing directories, all on an embedded
//! store that survives restarts.
//!
//! ## Features
//!
//! - **Experience Ledger**: Earned and spent experience per player per
//!   channel, with every debit gated on the current balance.
//! - **Item Shop**: A fixed catalog of ammo, reliability gear, tiered
//!   ammunition power-ups, and sabotage items, each with its own
//!   preconditions and receipts.
//! - **Power-Up State Machine**: Timed and charge-counted power-ups with
//!   tier exclusion, lazy expiry, and per-item interactions.
//! - **Vote Reconciliation**: Webhook deliveries from listing directories
//!   credited exactly once per vote window, idempotent across replays.
//! - **Durable Storage**: Sled-backed records with schema versioning,
//!   checksummed backups, and retention management.
//! - **Async Design**: Built with Tokio; concurrent purchases against the
//!   same player serialize on per-player locks rather than a global one.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use huntshop::shop::{ItemKind, PlayerRef, ShopEngine};
//! use huntshop::storage::EconomyStoreBuilder;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Open the game store
//!     let store = Arc::new(EconomyStoreBuilder::new("data").open()?);
//!     let engine = ShopEngine::new(store);
//!
//!     // Sell a bullet
//!     let hunter = PlayerRef::new(42, "Calgeka", false);
//!     let receipt = engine.purchase(77, &hunter, ItemKind::Round, None).await?;
//!     println!("bought {} for {} xp", receipt.item, receipt.cost);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`shop`] - Catalog, purchase engine, ledger, leveling, and power-ups
//! - [`votes`] - Directory definitions, webhook reconciler, vote-status checks
//! - [`storage`] - Player, user, and channel persistence plus backups
//! - [`config`] - Configuration management and validation
//! - [`logutil`] - Log sanitization for chat-sourced strings
//!
//! ## Architecture
//!
//! Huntshop uses a modular architecture with clear separation of concerns:
//!
//! ```text
//! ┌─────────────────┐
//! │   Shop Engine   │ ← Purchases, transfers, givebacks
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │   Vote          │ ← Webhook crediting and
//! │   Reconciler    │   availability overviews
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │   Storage       │ ← Data persistence
//! │   Layer         │
//! └─────────────────┘
//! ```

pub mod config;
pub mod logutil;
pub mod shop;
pub mod storage;
pub mod votes;
