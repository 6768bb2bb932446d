//! Value types shared between the engine and host layers.
//!
//! These types cross the engine boundary: request handlers serialize them
//! towards clients, analytics consumes them from the event channel.
//! Both sides must agree on these definitions.

use serde::{Deserialize, Serialize};

/// Unique identifier for a player.
pub type PlayerId = u64;

/// Unique identifier for a banner.
pub type BannerId = u32;

/// Unique identifier for an item type.
pub type ItemId = u32;

/// Unique identifier for an event modifier.
pub type EventModifierId = u32;

/// Milliseconds since the Unix epoch.
pub type TimestampMs = u64;

/// Probability scale: all rates and multipliers are basis points.
///
/// `10_000` basis points = 100%. A resolved rate table always sums to
/// exactly this value. No floating point anywhere in probability math.
pub const RATE_SCALE_BP: u32 = 10_000;

/// Rarity tier for banner items.
///
/// Ordering is by tier quality: `Common < Rare < Epic < Legendary`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Rarity {
    /// Common items (gray) - the fallback remainder of every rate table.
    Common = 0,
    /// Rare items (blue).
    Rare = 1,
    /// Epic items (purple) - soft pity floor.
    Epic = 2,
    /// Legendary items (orange) - hard pity target.
    Legendary = 3,
}

impl Rarity {
    /// Number of rarity tiers.
    pub const COUNT: usize = 4;

    /// Tiers in the fixed draw order: Legendary → Epic → Rare → Common.
    pub const DRAW_ORDER: [Self; Self::COUNT] =
        [Self::Legendary, Self::Epic, Self::Rare, Self::Common];

    /// Converts from u8 to Rarity.
    #[inline]
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Rare,
            2 => Self::Epic,
            3 => Self::Legendary,
            _ => Self::Common,
        }
    }

    /// Index into per-tier arrays (`[u32; Rarity::COUNT]`).
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// The next tier below this one, or `None` for Common.
    #[inline]
    #[must_use]
    pub const fn lower(self) -> Option<Self> {
        match self {
            Self::Common => None,
            Self::Rare => Some(Self::Common),
            Self::Epic => Some(Self::Rare),
            Self::Legendary => Some(Self::Epic),
        }
    }
}

/// The currency kinds a banner may be priced in or grant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CurrencyKind {
    /// Premium currency.
    Gems,
    /// Soft currency.
    Coins,
    /// Pull tickets earned from events.
    Tickets,
}

/// An explicit above-base drop rate for a featured item.
///
/// Featured rates are additive on top of the tier table and are tested
/// before it at draw time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeaturedRate {
    /// The featured item.
    pub item_id: ItemId,
    /// Absolute drop rate in basis points.
    pub rate_bp: u32,
}

/// The outcome of a single pull.
///
/// Immutable value; not owned by any component beyond the call that
/// produced it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullResult {
    /// The item that was won.
    pub item_id: ItemId,
    /// Rarity tier of that item.
    pub rarity: Rarity,
    /// Quantity granted.
    pub quantity: u32,
    /// Whether a pity guarantee forced this outcome.
    pub pity_forced: bool,
    /// When the pull was drawn.
    pub timestamp_ms: TimestampMs,
}

/// A completed batch of pulls, as returned to the caller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullBatch {
    /// The banner that was pulled on.
    pub banner_id: BannerId,
    /// One result per slot, in draw order.
    pub results: Vec<PullResult>,
    /// Total currency debited for the batch.
    pub cost: u64,
    /// The currency kind that was debited.
    pub currency: CurrencyKind,
}

/// Display summary of an active banner, with resolved effective rates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BannerSummary {
    /// The banner.
    pub banner_id: BannerId,
    /// Human-readable name.
    pub name: String,
    /// Cost of a single pull.
    pub cost: u64,
    /// Currency kind the cost is charged in.
    pub currency: CurrencyKind,
    /// Effective per-tier rates in basis points, indexed by [`Rarity::index`].
    /// Always sums to [`RATE_SCALE_BP`].
    pub tier_rates_bp: [u32; Rarity::COUNT],
    /// Featured items with their effective explicit rates.
    pub featured: Vec<FeaturedRate>,
}

/// A player's pity position on one banner.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PityStatus {
    /// Completed pulls since the last Legendary (any path).
    pub pulls_since_legendary: u32,
    /// Completed pulls since the epic guarantee last fired.
    pub pulls_since_epic_guarantee: u32,
    /// Further pulls needed before the hard Legendary guarantee fires.
    /// One means the very next pull is guaranteed; the value never
    /// reaches zero because the forced pull resets the counter.
    pub pulls_until_guaranteed_legendary: u32,
}
