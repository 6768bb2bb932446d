//! # Gacha Engine
//!
//! Probabilistic item-drop engine: banners, rarity tiers, pity
//! guarantees, time-windowed event rate modifiers, and exactly-once
//! currency accounting.
//!
//! ## Design Principles
//!
//! 1. **Zero floating point** - All rates and multipliers are integer basis points (1 bp = 0.01%)
//! 2. **Exactly-once money** - One debit per batch; any later failure refunds it precisely
//! 3. **Per-player serialization** - Concurrent pulls for one player queue behind a mutex
//! 4. **External configuration** - Banners and event schedules live in TOML files
//!
//! ## Thread Safety
//!
//! The engine is designed to run on the authoritative server. Every public
//! handle is `Send + Sync`; distinct players pull fully in parallel.
//!
//! ## Example
//!
//! ```rust,ignore
//! use gacha_engine::{Catalog, EventModifierRegistry, GachaService};
//!
//! let catalog = Catalog::load("data/banners.toml")?;
//! let schedule = EventModifierRegistry::load("data/events.toml")?;
//!
//! let service = GachaService::new(catalog, schedule, economy, inventory, pity, clock);
//! let batch = service.pull(player_id, banner_id, 10)?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod catalog;
pub mod collaborators;
pub mod coordinator;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod modifier;
pub mod pity;
pub mod rates;
pub mod service;

pub use gacha_shared::{
    BannerId, BannerSummary, CurrencyKind, EventModifierId, FeaturedRate, ItemId, PityStatus,
    PlayerId, PullBatch, PullEvent, PullResult, Rarity, TimestampMs, RATE_SCALE_BP,
};

pub use catalog::{Banner, BannerItem, Catalog, ItemPayload, TierRates};
pub use collaborators::{
    Clock, EconomyLedger, InventoryStore, ManualClock, MemoryEconomy, MemoryInventory,
    MemoryPityStore, PityStore, SystemClock,
};
pub use coordinator::TransactionCoordinator;
pub use dispatch::GrantDispatcher;
pub use engine::PullEngine;
pub use error::{GachaError, GachaResult};
pub use modifier::{EventModifier, EventModifierRegistry, TierMultipliers};
pub use pity::{PityLedger, PityState};
pub use rates::RateTable;
pub use service::GachaService;
