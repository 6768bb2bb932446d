//! # Event Modifier Registry
//!
//! Time-bounded rate multipliers for banners ("double Legendary weekend").
//! Entries are created at content-load time and are read-only thereafter;
//! events expire by time comparison, never by deletion.
//!
//! Multipliers are basis points: 10000 = x1.0, 20000 = x2.0. Multiple
//! concurrent modifiers for the same tier compose multiplicatively.

use std::path::Path;

use serde::{Deserialize, Serialize};

use gacha_shared::{BannerId, EventModifierId, Rarity, TimestampMs, RATE_SCALE_BP};

use crate::error::{GachaError, GachaResult};

const fn identity_bp() -> u32 {
    RATE_SCALE_BP
}

/// Per-tier rate multipliers in basis points. Unlisted tiers default to x1.0.
///
/// Common carries no multiplier: it is the remainder absorber of the rate
/// table, so a Common multiplier could never take effect.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierMultipliers {
    /// Rare multiplier.
    #[serde(default = "identity_bp")]
    pub rare: u32,
    /// Epic multiplier.
    #[serde(default = "identity_bp")]
    pub epic: u32,
    /// Legendary multiplier.
    #[serde(default = "identity_bp")]
    pub legendary: u32,
}

impl TierMultipliers {
    /// Multiplier for one tier. Common is always x1.0.
    #[inline]
    #[must_use]
    pub const fn get(&self, tier: Rarity) -> u32 {
        match tier {
            Rarity::Common => RATE_SCALE_BP,
            Rarity::Rare => self.rare,
            Rarity::Epic => self.epic,
            Rarity::Legendary => self.legendary,
        }
    }
}

impl Default for TierMultipliers {
    fn default() -> Self {
        Self {
            rare: RATE_SCALE_BP,
            epic: RATE_SCALE_BP,
            legendary: RATE_SCALE_BP,
        }
    }
}

/// A time-bounded rate modifier targeting one or more banners.
///
/// Active over the half-open window `[start_ms, end_ms)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventModifier {
    /// Unique modifier identifier.
    pub id: EventModifierId,
    /// Human-readable name.
    pub name: String,
    /// Window start, inclusive.
    pub start_ms: TimestampMs,
    /// Window end, exclusive.
    pub end_ms: TimestampMs,
    /// Banners this modifier applies to.
    pub banners: Vec<BannerId>,
    /// Per-tier multipliers.
    #[serde(default)]
    pub multipliers: TierMultipliers,
}

impl EventModifier {
    /// Whether the modifier window contains `now`.
    #[inline]
    #[must_use]
    pub const fn is_active_at(&self, now: TimestampMs) -> bool {
        self.start_ms <= now && now < self.end_ms
    }

    /// Whether the modifier targets a banner.
    #[must_use]
    pub fn targets(&self, banner_id: BannerId) -> bool {
        self.banners.contains(&banner_id)
    }

    fn validate(&self) -> GachaResult<()> {
        if self.start_ms >= self.end_ms {
            return Err(GachaError::InvalidConfig(format!(
                "modifier {}: empty window [{}, {})",
                self.id, self.start_ms, self.end_ms
            )));
        }
        if self.banners.is_empty() {
            return Err(GachaError::InvalidConfig(format!(
                "modifier {}: no target banners",
                self.id
            )));
        }
        Ok(())
    }
}

/// On-disk schedule format: a list of `[[modifier]]` tables.
#[derive(Debug, Deserialize)]
struct ScheduleFile {
    #[serde(rename = "modifier")]
    modifiers: Vec<EventModifier>,
}

/// The immutable registry of scheduled event modifiers.
///
/// Read-only after load; safe for unsynchronized concurrent reads.
#[derive(Clone, Debug, Default)]
pub struct EventModifierRegistry {
    modifiers: Vec<EventModifier>,
}

impl EventModifierRegistry {
    /// Builds a registry from modifier definitions, validating each.
    ///
    /// # Errors
    ///
    /// Returns `GachaError::InvalidConfig` on duplicate ids or any
    /// per-modifier violation.
    pub fn from_modifiers(modifiers: Vec<EventModifier>) -> GachaResult<Self> {
        for (i, modifier) in modifiers.iter().enumerate() {
            modifier.validate()?;
            if modifiers[..i].iter().any(|m| m.id == modifier.id) {
                return Err(GachaError::InvalidConfig(format!(
                    "duplicate modifier id {}",
                    modifier.id
                )));
            }
        }
        Ok(Self { modifiers })
    }

    /// Parses a schedule from TOML text.
    ///
    /// # Errors
    ///
    /// Returns `GachaError::InvalidConfig` on parse or validation failure.
    pub fn from_toml_str(text: &str) -> GachaResult<Self> {
        let file: ScheduleFile = toml::from_str(text)
            .map_err(|e| GachaError::InvalidConfig(format!("schedule parse error: {e}")))?;
        Self::from_modifiers(file.modifiers)
    }

    /// Loads a schedule from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `GachaError::InvalidConfig` on read, parse, or validation
    /// failure.
    pub fn load(path: impl AsRef<Path>) -> GachaResult<Self> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            GachaError::InvalidConfig(format!(
                "cannot read schedule {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Self::from_toml_str(&text)
    }

    /// All modifiers active for a banner at a point in time, in load order.
    pub fn active_for(
        &self,
        banner_id: BannerId,
        now: TimestampMs,
    ) -> impl Iterator<Item = &EventModifier> {
        self.modifiers
            .iter()
            .filter(move |m| m.is_active_at(now) && m.targets(banner_id))
    }

    /// Number of scheduled modifiers (active or not).
    #[must_use]
    pub fn len(&self) -> usize {
        self.modifiers.len()
    }

    /// Whether the schedule is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modifiers.is_empty()
    }
}
