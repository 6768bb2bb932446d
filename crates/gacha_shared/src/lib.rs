//! # Gacha Shared
//!
//! Common value types used by both the gacha engine and its host layers.
//!
//! ## CRITICAL RULE
//!
//! This crate must NEVER contain:
//! - engine logic or RNG
//! - locks or any other shared mutable state
//! - collaborator traits
//!
//! If you need behavior, put it in `gacha_engine`.

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod events;
pub mod protocol;

pub use events::PullEvent;
pub use protocol::{
    BannerId, BannerSummary, CurrencyKind, EventModifierId, FeaturedRate, ItemId, PityStatus,
    PlayerId, PullBatch, PullResult, Rarity, TimestampMs, RATE_SCALE_BP,
};
