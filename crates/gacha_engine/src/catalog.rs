//! # Banner Catalog
//!
//! Immutable definition of banners, their item pools, base rates, and cost.
//! Loaded once from TOML at content-load time; read-only for the lifetime
//! of the process, so it is safe to share across threads without locks.
//!
//! All rates are basis points (10000 = 100%). A banner's four tier rates
//! must sum to exactly 10000 or the catalog refuses to load.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use gacha_shared::{BannerId, CurrencyKind, FeaturedRate, ItemId, Rarity, RATE_SCALE_BP};

use crate::error::{GachaError, GachaResult};

/// What granting an item actually does.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemPayload {
    /// Added to the player's inventory.
    Inventory,
    /// Credited to a currency balance.
    Currency {
        /// The currency kind to credit.
        kind: CurrencyKind,
    },
}

/// One obtainable item in a banner's pool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BannerItem {
    /// Unique item identifier within the catalog.
    pub id: ItemId,
    /// Rarity tier this item drops at.
    pub rarity: Rarity,
    /// What the grant does.
    pub payload: ItemPayload,
    /// Quantity granted per pull.
    pub quantity: u32,
}

/// Base per-tier rates in basis points. Must sum to exactly 10000.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierRates {
    /// Common rate.
    pub common: u32,
    /// Rare rate.
    pub rare: u32,
    /// Epic rate.
    pub epic: u32,
    /// Legendary rate.
    pub legendary: u32,
}

impl TierRates {
    /// Rates as an array indexed by [`Rarity::index`].
    #[inline]
    #[must_use]
    pub const fn as_bp(&self) -> [u32; Rarity::COUNT] {
        [self.common, self.rare, self.epic, self.legendary]
    }

    /// Rate for one tier.
    #[inline]
    #[must_use]
    pub const fn get(&self, tier: Rarity) -> u32 {
        self.as_bp()[tier.index()]
    }

    /// Sum of all four tiers.
    #[inline]
    #[must_use]
    pub const fn sum(&self) -> u32 {
        self.common + self.rare + self.epic + self.legendary
    }
}

/// A themed, priced collection of obtainable items with its own rate table.
///
/// Immutable after load.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Banner {
    /// Unique banner identifier.
    pub id: BannerId,
    /// Human-readable name.
    pub name: String,
    /// Cost of one pull. Zero marks a free banner.
    pub cost: u64,
    /// Currency kind the cost is charged in.
    pub currency: CurrencyKind,
    /// Base per-tier rates.
    pub rates: TierRates,
    /// Hard pity: the pull at this index since the last Legendary is forced.
    pub legendary_pity: u32,
    /// Soft pity period: every `epic_pity`-th pull since the last Legendary
    /// is forced to at least Epic. Zero disables the soft guarantee.
    #[serde(default)]
    pub epic_pity: u32,
    /// Cooldown between pulls, for free banners only.
    #[serde(default)]
    pub cooldown_ms: Option<u64>,
    /// The full item pool.
    #[serde(rename = "items")]
    pub pool: Vec<BannerItem>,
    /// Featured items with explicit rates layered on top of the tier table.
    #[serde(default)]
    pub featured: Vec<FeaturedRate>,
}

impl Banner {
    /// Whether this banner costs nothing per pull.
    #[inline]
    #[must_use]
    pub const fn is_free(&self) -> bool {
        self.cost == 0
    }

    /// Looks up an item in the pool.
    #[must_use]
    pub fn find_item(&self, item_id: ItemId) -> Option<&BannerItem> {
        self.pool.iter().find(|i| i.id == item_id)
    }

    /// Whether an item is featured on this banner.
    #[must_use]
    pub fn is_featured(&self, item_id: ItemId) -> bool {
        self.featured.iter().any(|f| f.item_id == item_id)
    }

    /// All pool items of one tier.
    pub fn items_of_tier(&self, tier: Rarity) -> impl Iterator<Item = &BannerItem> {
        self.pool.iter().filter(move |i| i.rarity == tier)
    }

    /// Pool items of one tier that are not featured.
    ///
    /// The tier table supplies the non-featured remainder of each tier's
    /// pool; featured items are drawn through their explicit rates.
    pub fn non_featured_of_tier(&self, tier: Rarity) -> impl Iterator<Item = &BannerItem> {
        self.items_of_tier(tier).filter(|i| !self.is_featured(i.id))
    }

    /// Featured entries whose item is of one tier.
    pub fn featured_of_tier(&self, tier: Rarity) -> impl Iterator<Item = &FeaturedRate> {
        self.featured.iter().filter(move |f| {
            self.find_item(f.item_id)
                .is_some_and(|item| item.rarity == tier)
        })
    }

    /// Validates the banner definition.
    ///
    /// # Errors
    ///
    /// Returns `GachaError::InvalidConfig` naming the first violation.
    pub fn validate(&self) -> GachaResult<()> {
        if self.rates.sum() != RATE_SCALE_BP {
            return Err(GachaError::InvalidConfig(format!(
                "banner {}: tier rates sum to {} bp, expected {RATE_SCALE_BP}",
                self.id,
                self.rates.sum()
            )));
        }
        if self.pool.is_empty() {
            return Err(GachaError::InvalidConfig(format!(
                "banner {}: empty item pool",
                self.id
            )));
        }
        if self.legendary_pity == 0 {
            return Err(GachaError::InvalidConfig(format!(
                "banner {}: legendary_pity must be positive",
                self.id
            )));
        }
        if self.cooldown_ms.is_some() && !self.is_free() {
            return Err(GachaError::InvalidConfig(format!(
                "banner {}: cooldown is only valid on free banners",
                self.id
            )));
        }

        let mut seen = HashSet::new();
        for item in &self.pool {
            if !seen.insert(item.id) {
                return Err(GachaError::InvalidConfig(format!(
                    "banner {}: duplicate item {}",
                    self.id, item.id
                )));
            }
            if item.quantity == 0 {
                return Err(GachaError::InvalidConfig(format!(
                    "banner {}: item {} has zero quantity",
                    self.id, item.id
                )));
            }
        }

        for featured in &self.featured {
            if self.find_item(featured.item_id).is_none() {
                return Err(GachaError::InvalidConfig(format!(
                    "banner {}: featured item {} is not in the pool",
                    self.id, featured.item_id
                )));
            }
            if featured.rate_bp == 0 {
                return Err(GachaError::InvalidConfig(format!(
                    "banner {}: featured item {} has zero rate",
                    self.id, featured.item_id
                )));
            }
        }

        Ok(())
    }
}

/// On-disk catalog format: a list of `[[banner]]` tables.
#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(rename = "banner")]
    banners: Vec<Banner>,
}

/// The immutable banner catalog.
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    /// Banners indexed by id.
    banners: HashMap<BannerId, Banner>,
}

impl Catalog {
    /// Builds a catalog from banner definitions, validating each.
    ///
    /// # Errors
    ///
    /// Returns `GachaError::InvalidConfig` on duplicate banner ids or any
    /// per-banner violation.
    pub fn from_banners(banners: Vec<Banner>) -> GachaResult<Self> {
        let mut map = HashMap::with_capacity(banners.len());
        for banner in banners {
            banner.validate()?;
            let id = banner.id;
            if map.insert(id, banner).is_some() {
                return Err(GachaError::InvalidConfig(format!(
                    "duplicate banner id {id}"
                )));
            }
        }
        Ok(Self { banners: map })
    }

    /// Parses a catalog from TOML text.
    ///
    /// # Errors
    ///
    /// Returns `GachaError::InvalidConfig` on parse or validation failure.
    pub fn from_toml_str(text: &str) -> GachaResult<Self> {
        let file: CatalogFile = toml::from_str(text)
            .map_err(|e| GachaError::InvalidConfig(format!("catalog parse error: {e}")))?;
        Self::from_banners(file.banners)
    }

    /// Loads a catalog from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `GachaError::InvalidConfig` on read, parse, or validation
    /// failure.
    pub fn load(path: impl AsRef<Path>) -> GachaResult<Self> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            GachaError::InvalidConfig(format!(
                "cannot read catalog {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Self::from_toml_str(&text)
    }

    /// Gets a banner by id.
    #[must_use]
    pub fn banner(&self, id: BannerId) -> Option<&Banner> {
        self.banners.get(&id)
    }

    /// All banners, in arbitrary order.
    pub fn banners(&self) -> impl Iterator<Item = &Banner> {
        self.banners.values()
    }

    /// Number of banners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.banners.len()
    }

    /// Whether the catalog has no banners.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.banners.is_empty()
    }
}
