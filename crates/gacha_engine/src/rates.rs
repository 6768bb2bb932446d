//! # Rate Resolution
//!
//! Combines a banner's base rates with the active event modifiers into the
//! effective probability table for one pull.
//!
//! Resolution is a pure function of (banner, time, registry): no hidden
//! mutable state, so the same inputs always produce the same table.
//!
//! Common is the remainder absorber. After multipliers are applied to
//! Rare/Epic/Legendary, Common is whatever headroom is left; if the upper
//! tiers overflow the scale they are renormalized proportionally and
//! Common drops to exactly zero.

use gacha_shared::{FeaturedRate, Rarity, TimestampMs, RATE_SCALE_BP};

use crate::catalog::Banner;
use crate::modifier::EventModifierRegistry;

/// The effective probability table for one pull.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RateTable {
    /// Per-tier rates in basis points, indexed by [`Rarity::index`].
    /// Always sums to exactly [`RATE_SCALE_BP`].
    pub tiers_bp: [u32; Rarity::COUNT],
    /// Featured rates, tested before the tier table in declaration order.
    /// Additive on top of (not drawn from within) the tier table.
    pub featured: Vec<FeaturedRate>,
}

impl RateTable {
    /// Rate for one tier.
    #[inline]
    #[must_use]
    pub const fn tier(&self, tier: Rarity) -> u32 {
        self.tiers_bp[tier.index()]
    }

    /// Sum of all featured rates.
    #[must_use]
    pub fn featured_total_bp(&self) -> u32 {
        self.featured.iter().map(|f| f.rate_bp).sum()
    }
}

/// Resolves the effective rate table for a banner at a point in time.
///
/// 1. Start from the banner's base tier rates.
/// 2. Multiply Rare/Epic/Legendary by every active modifier targeting the
///    banner (modifiers compose multiplicatively).
/// 3. If the upper tiers exceed the full scale, renormalize them
///    proportionally to exactly [`RATE_SCALE_BP`]; Common absorbs whatever
///    headroom remains (zero in the overflow case, never negative).
/// 4. Featured rates pass through unmodified.
#[must_use]
pub fn resolve(banner: &Banner, registry: &EventModifierRegistry, now: TimestampMs) -> RateTable {
    let scale = u64::from(RATE_SCALE_BP);

    let base = banner.rates.as_bp();
    let mut upper = [
        u64::from(base[Rarity::Rare.index()]),
        u64::from(base[Rarity::Epic.index()]),
        u64::from(base[Rarity::Legendary.index()]),
    ];
    const UPPER_TIERS: [Rarity; 3] = [Rarity::Rare, Rarity::Epic, Rarity::Legendary];

    for modifier in registry.active_for(banner.id, now) {
        for (slot, tier) in upper.iter_mut().zip(UPPER_TIERS) {
            *slot = *slot * u64::from(modifier.multipliers.get(tier)) / scale;
        }
    }

    let upper_sum: u64 = upper.iter().sum();
    if upper_sum > scale {
        upper = renormalize(upper, upper_sum);
    }

    let mut tiers_bp = [0u32; Rarity::COUNT];
    for (slot, tier) in upper.iter().zip(UPPER_TIERS) {
        // Renormalization keeps every tier within the u32 scale.
        tiers_bp[tier.index()] = u32::try_from(*slot).unwrap_or(RATE_SCALE_BP);
    }
    let taken: u64 = upper.iter().sum();
    tiers_bp[Rarity::Common.index()] = u32::try_from(scale - taken).unwrap_or(0);

    RateTable {
        tiers_bp,
        featured: banner.featured.clone(),
    }
}

/// Scales the upper tiers down proportionally so they sum to exactly the
/// full scale, distributing the floor-division deficit by largest
/// remainder (ties broken toward the lower tier).
fn renormalize(upper: [u64; 3], upper_sum: u64) -> [u64; 3] {
    let scale = u64::from(RATE_SCALE_BP);

    let products = upper.map(|rate| rate * scale);
    let mut scaled = products.map(|p| p / upper_sum);

    let mut deficit = scale - scaled.iter().sum::<u64>();
    // At most 2 bp of deficit across 3 tiers; one ordered pass settles it.
    let mut order = [0usize, 1, 2];
    order.sort_by_key(|&i| (std::cmp::Reverse(products[i] % upper_sum), i));
    for i in order {
        if deficit == 0 {
            break;
        }
        scaled[i] += 1;
        deficit -= 1;
    }

    scaled
}
