//! # Pull Engine
//!
//! Orchestrates one or many pulls: consults the pity ledger, draws
//! outcomes against a resolved rate table, and updates pity sequentially
//! so the state from pull *k* affects pull *k+1* within the same batch.
//!
//! Results are returned without granting anything; the coordinator owns
//! the debit/grant transaction around this engine.
//!
//! The RNG is a seedable ChaCha stream: production seeds from the wall
//! clock at startup, tests pin a seed for reproducible draws.

use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::warn;

use gacha_shared::{PlayerId, PullResult, Rarity, TimestampMs, RATE_SCALE_BP};

use crate::catalog::{Banner, BannerItem};
use crate::error::GachaResult;
use crate::pity::PityLedger;
use crate::rates::RateTable;

/// Tiers that satisfy the multi-pull floor, worst first.
const RARE_OR_BETTER: [Rarity; 3] = [Rarity::Rare, Rarity::Epic, Rarity::Legendary];

/// The pull engine. Stateless apart from its RNG; safe to share.
pub struct PullEngine {
    rng: Mutex<ChaCha8Rng>,
}

impl PullEngine {
    /// Creates an engine seeded from the wall clock.
    #[must_use]
    pub fn new() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_nanos());
        Self::with_seed(u64::try_from(nanos & u128::from(u64::MAX)).unwrap_or(0))
    }

    /// Creates an engine with a pinned seed, for reproducible draws.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
        }
    }

    /// Performs `count` sequential pulls against one banner.
    ///
    /// Pity is checked before and recorded after every slot. If no slot in
    /// a multi-pull produced Rare-or-better, the last slot is replaced by
    /// a forced Rare-or-better draw; the replacement does not touch pity
    /// beyond what the discarded draw already recorded.
    ///
    /// # Errors
    ///
    /// Returns `GachaError::StoreFailure` if persisting pity state fails
    /// mid-batch; the caller is expected to roll back.
    pub fn draw_batch(
        &self,
        player: PlayerId,
        banner: &Banner,
        table: &RateTable,
        pity: &PityLedger,
        count: u32,
        now: TimestampMs,
    ) -> GachaResult<Vec<PullResult>> {
        let mut results = Vec::with_capacity(count as usize);

        for _ in 0..count {
            let guarantee = pity.check_guarantee(player, banner)?;

            let (item, forced, fired) = match guarantee {
                Some(tier) => match self.draw_guaranteed(banner, tier) {
                    Some(item) => (item, true, guarantee),
                    None => {
                        // Content defect: nothing at or below the forced
                        // tier. Degrade to a natural draw instead of
                        // failing the pull.
                        warn!(
                            banner = banner.id,
                            tier = ?tier,
                            "no items at or below guaranteed tier; drawing naturally"
                        );
                        (self.draw_natural(banner, table), false, None)
                    }
                },
                None => (self.draw_natural(banner, table), false, None),
            };

            pity.record_outcome(player, banner.id, item.rarity, fired, now)?;
            results.push(PullResult {
                item_id: item.id,
                rarity: item.rarity,
                quantity: item.quantity,
                pity_forced: forced,
                timestamp_ms: now,
            });
        }

        // Multi-pull floor: at least one Rare-or-better per batch.
        if !results.is_empty() && results.iter().all(|r| r.rarity < Rarity::Rare) {
            if let Some(item) = self.draw_rare_floor(banner) {
                if let Some(last) = results.last_mut() {
                    *last = PullResult {
                        item_id: item.id,
                        rarity: item.rarity,
                        quantity: item.quantity,
                        pity_forced: false,
                        timestamp_ms: now,
                    };
                }
            } else {
                warn!(
                    banner = banner.id,
                    "no Rare-or-better items in pool; multi-pull floor skipped"
                );
            }
        }

        Ok(results)
    }

    /// Selects an item for a guaranteed tier.
    ///
    /// Featured items of the tier are preferred, weighted by their
    /// explicit rates; otherwise the selection is uniform over the tier's
    /// non-featured pool. An empty tier degrades one tier lower until
    /// something has items; `None` if nothing at or below the tier does.
    fn draw_guaranteed<'a>(&self, banner: &'a Banner, tier: Rarity) -> Option<&'a BannerItem> {
        let mut current = Some(tier);
        while let Some(cursor) = current {
            let featured: Vec<_> = banner.featured_of_tier(cursor).collect();
            if !featured.is_empty() {
                let total: u64 = featured.iter().map(|f| u64::from(f.rate_bp)).sum();
                let roll = self.rng.lock().gen_range(0..total);
                let mut cumulative = 0u64;
                for entry in &featured {
                    cumulative += u64::from(entry.rate_bp);
                    if roll < cumulative {
                        return banner.find_item(entry.item_id);
                    }
                }
            }

            let pool: Vec<_> = banner.non_featured_of_tier(cursor).collect();
            if !pool.is_empty() {
                return Some(pool[self.rng.lock().gen_range(0..pool.len())]);
            }

            current = cursor.lower();
        }
        None
    }

    /// Draws naturally against the resolved table.
    ///
    /// One uniform roll in `[0, 10000)` is compared cumulatively against
    /// each featured rate in declaration order, then the tier bands in
    /// fixed order Legendary → Epic → Rare → Common. A tier band with an
    /// empty pool falls through to the next lower tier; as a last resort
    /// the whole pool is sampled uniformly (the pool is never empty, the
    /// catalog rejects that at load).
    fn draw_natural<'a>(&self, banner: &'a Banner, table: &RateTable) -> &'a BannerItem {
        let roll = u64::from(self.rng.lock().gen_range(0..RATE_SCALE_BP));
        let mut cumulative = 0u64;

        for entry in &table.featured {
            cumulative += u64::from(entry.rate_bp);
            if roll < cumulative {
                if let Some(item) = banner.find_item(entry.item_id) {
                    return item;
                }
            }
        }

        for tier in Rarity::DRAW_ORDER {
            cumulative += u64::from(table.tier(tier));
            if roll < cumulative {
                let pool: Vec<_> = banner.non_featured_of_tier(tier).collect();
                if !pool.is_empty() {
                    return pool[self.rng.lock().gen_range(0..pool.len())];
                }
                // Mass with no items: fall through to the next lower band.
            }
        }

        let index = self.rng.lock().gen_range(0..banner.pool.len());
        &banner.pool[index]
    }

    /// Uniform draw over the lowest Rare-or-better tier that has items.
    fn draw_rare_floor<'a>(&self, banner: &'a Banner) -> Option<&'a BannerItem> {
        for tier in RARE_OR_BETTER {
            let pool: Vec<_> = banner.items_of_tier(tier).collect();
            if !pool.is_empty() {
                return Some(pool[self.rng.lock().gen_range(0..pool.len())]);
            }
        }
        None
    }
}

impl Default for PullEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ItemPayload, TierRates};
    use crate::collaborators::MemoryPityStore;
    use crate::modifier::EventModifierRegistry;
    use crate::rates;
    use gacha_shared::{CurrencyKind, FeaturedRate};
    use std::sync::Arc;

    fn item(id: u32, rarity: Rarity) -> BannerItem {
        BannerItem {
            id,
            rarity,
            payload: ItemPayload::Inventory,
            quantity: 1,
        }
    }

    fn banner_with(rates: TierRates, pool: Vec<BannerItem>) -> Banner {
        Banner {
            id: 1,
            name: "Test".to_string(),
            cost: 160,
            currency: CurrencyKind::Gems,
            rates,
            legendary_pity: 200,
            epic_pity: 50,
            cooldown_ms: None,
            pool,
            featured: vec![],
        }
    }

    fn standard_banner() -> Banner {
        banner_with(
            TierRates {
                common: 7000,
                rare: 2500,
                epic: 450,
                legendary: 50,
            },
            vec![
                item(100, Rarity::Common),
                item(101, Rarity::Common),
                item(200, Rarity::Rare),
                item(300, Rarity::Epic),
                item(400, Rarity::Legendary),
            ],
        )
    }

    fn ledger() -> PityLedger {
        PityLedger::new(Arc::new(MemoryPityStore::new()))
    }

    fn resolved(banner: &Banner) -> RateTable {
        rates::resolve(banner, &EventModifierRegistry::default(), 0)
    }

    #[test]
    fn same_seed_same_draws() {
        let banner = standard_banner();
        let table = resolved(&banner);

        let a = PullEngine::with_seed(42)
            .draw_batch(7, &banner, &table, &ledger(), 10, 0)
            .unwrap();
        let b = PullEngine::with_seed(42)
            .draw_batch(7, &banner, &table, &ledger(), 10, 0)
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn draw_frequencies_track_the_table() {
        let mut banner = standard_banner();
        // Keep guarantees out of the sample so only natural draws count.
        banner.legendary_pity = 1_000_000;
        banner.epic_pity = 0;
        let table = resolved(&banner);
        let engine = PullEngine::with_seed(1);
        let pity = ledger();

        let mut commons = 0u32;
        let results = engine
            .draw_batch(7, &banner, &table, &pity, 10_000, 0)
            .unwrap();
        for result in &results {
            if result.rarity == Rarity::Common {
                commons += 1;
            }
        }

        // Common is 70%; a 10k sample should land well within ±5%.
        assert!(
            (6_500..=7_500).contains(&commons),
            "common count {commons} out of expected band"
        );
    }

    #[test]
    fn hard_pity_forces_legendary_at_threshold() {
        let mut banner = standard_banner();
        banner.legendary_pity = 5;
        banner.epic_pity = 0;
        // All natural mass on Common so only pity can produce a Legendary.
        banner.rates = TierRates {
            common: 10_000,
            rare: 0,
            epic: 0,
            legendary: 0,
        };
        let table = resolved(&banner);
        let engine = PullEngine::with_seed(9);
        let pity = ledger();

        let results = engine.draw_batch(7, &banner, &table, &pity, 5, 0).unwrap();

        assert_eq!(results[4].rarity, Rarity::Legendary);
        assert!(results[4].pity_forced);
        for result in &results[..4] {
            assert!(result.rarity < Rarity::Legendary);
        }
        assert_eq!(pity.state(7, 1).unwrap().pulls_since_legendary, 0);
    }

    #[test]
    fn epic_guarantee_fires_within_batch() {
        let mut banner = standard_banner();
        banner.legendary_pity = 1_000;
        banner.epic_pity = 3;
        banner.rates = TierRates {
            common: 10_000,
            rare: 0,
            epic: 0,
            legendary: 0,
        };
        let table = resolved(&banner);
        let engine = PullEngine::with_seed(3);
        let pity = ledger();

        let results = engine.draw_batch(7, &banner, &table, &pity, 6, 0).unwrap();

        // Slots 3 and 6 are the guaranteed ones.
        assert!(results[2].pity_forced);
        assert!(results[2].rarity >= Rarity::Epic);
        assert!(results[5].pity_forced);
        assert!(results[5].rarity >= Rarity::Epic);
        assert!(!results[0].pity_forced);
    }

    #[test]
    fn guaranteed_tier_prefers_featured_by_weight() {
        let mut banner = standard_banner();
        banner.legendary_pity = 1;
        banner.pool.push(item(401, Rarity::Legendary));
        banner.featured = vec![FeaturedRate {
            item_id: 401,
            rate_bp: 100,
        }];
        let table = resolved(&banner);
        let engine = PullEngine::with_seed(5);
        let pity = ledger();

        // Every pull is pity-forced to Legendary; the featured legendary
        // must always win over the plain one.
        for _ in 0..20 {
            let results = engine.draw_batch(7, &banner, &table, &pity, 1, 0).unwrap();
            assert_eq!(results[0].item_id, 401);
            assert!(results[0].pity_forced);
        }
    }

    #[test]
    fn guarantee_degrades_when_tier_pool_is_empty() {
        let mut banner = standard_banner();
        banner.legendary_pity = 1;
        banner.pool.retain(|i| i.rarity != Rarity::Legendary);
        let table = resolved(&banner);
        let engine = PullEngine::with_seed(11);
        let pity = ledger();

        let results = engine.draw_batch(7, &banner, &table, &pity, 1, 0).unwrap();
        // Degraded to Epic, still marked as forced.
        assert_eq!(results[0].rarity, Rarity::Epic);
        assert!(results[0].pity_forced);
        // A non-Legendary outcome does not reset the counter.
        assert_eq!(pity.state(7, 1).unwrap().pulls_since_legendary, 1);
    }

    #[test]
    fn multi_pull_floor_replaces_last_slot() {
        let banner = banner_with(
            TierRates {
                common: 10_000,
                rare: 0,
                epic: 0,
                legendary: 0,
            },
            vec![item(100, Rarity::Common), item(200, Rarity::Rare)],
        );
        let table = resolved(&banner);
        let engine = PullEngine::with_seed(13);
        let pity = ledger();

        let results = engine.draw_batch(7, &banner, &table, &pity, 10, 0).unwrap();

        assert_eq!(results.len(), 10);
        for result in &results[..9] {
            assert_eq!(result.rarity, Rarity::Common);
        }
        assert_eq!(results[9].rarity, Rarity::Rare);
        // The floor replacement is not a pity path.
        assert_eq!(pity.state(7, 1).unwrap().pulls_since_legendary, 10);
    }

    #[test]
    fn single_pull_floor_also_holds() {
        // N = 1 is still a batch: an all-Common single pull gets floored.
        let banner = banner_with(
            TierRates {
                common: 10_000,
                rare: 0,
                epic: 0,
                legendary: 0,
            },
            vec![item(100, Rarity::Common), item(200, Rarity::Rare)],
        );
        let table = resolved(&banner);
        let engine = PullEngine::with_seed(17);
        let pity = ledger();

        let results = engine.draw_batch(7, &banner, &table, &pity, 1, 0).unwrap();
        assert!(results[0].rarity >= Rarity::Rare);
    }

    #[test]
    fn empty_tier_band_falls_through_lower() {
        // Epic has 30% of the mass but no items; those rolls must land in
        // lower tiers, never produce nothing.
        let banner = banner_with(
            TierRates {
                common: 4_000,
                rare: 3_000,
                epic: 3_000,
                legendary: 0,
            },
            vec![item(100, Rarity::Common), item(200, Rarity::Rare)],
        );
        let table = resolved(&banner);
        let engine = PullEngine::with_seed(19);
        let pity = ledger();

        let results = engine
            .draw_batch(7, &banner, &table, &pity, 1_000, 0)
            .unwrap();
        assert_eq!(results.len(), 1_000);
        for result in &results {
            assert!(result.rarity <= Rarity::Rare);
        }
    }

    #[test]
    fn featured_band_is_tested_before_tiers() {
        let mut banner = standard_banner();
        // A huge featured rate on the rare item hijacks most rolls.
        banner.featured = vec![FeaturedRate {
            item_id: 200,
            rate_bp: 9_000,
        }];
        let table = resolved(&banner);
        let engine = PullEngine::with_seed(23);
        let pity = ledger();

        let results = engine
            .draw_batch(7, &banner, &table, &pity, 1_000, 0)
            .unwrap();
        let featured_hits = results.iter().filter(|r| r.item_id == 200).count();
        assert!(
            featured_hits > 800,
            "expected most pulls to hit the featured band, got {featured_hits}"
        );
    }
}
