//! # Transaction Coordinator
//!
//! Owns the exactly-once money path around the pull engine. Every pull
//! for a given player runs under that player's mutex, so concurrent
//! requests for one player serialize while distinct players proceed in
//! parallel.
//!
//! The order of operations is fixed: validate, debit, draw, grant. Any
//! failure after the debit rolls the call back to its pre-call state:
//! the exact debit is refunded and the pity snapshot is restored.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error};

use gacha_shared::{BannerId, PlayerId, PullResult};

use crate::catalog::{Banner, Catalog};
use crate::collaborators::{Clock, EconomyLedger};
use crate::dispatch::GrantDispatcher;
use crate::engine::PullEngine;
use crate::error::{GachaError, GachaResult};
use crate::modifier::EventModifierRegistry;
use crate::pity::{PityLedger, PityState};
use crate::rates;

/// Serializes pulls per player and makes the debit/grant pair atomic.
pub struct TransactionCoordinator {
    catalog: Arc<Catalog>,
    registry: Arc<EventModifierRegistry>,
    engine: Arc<PullEngine>,
    pity: Arc<PityLedger>,
    economy: Arc<dyn EconomyLedger>,
    dispatcher: Arc<GrantDispatcher>,
    clock: Arc<dyn Clock>,
    locks: Mutex<HashMap<PlayerId, Arc<Mutex<()>>>>,
}

impl TransactionCoordinator {
    /// Wires a coordinator over shared handles to its collaborators.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        catalog: Arc<Catalog>,
        registry: Arc<EventModifierRegistry>,
        engine: Arc<PullEngine>,
        pity: Arc<PityLedger>,
        economy: Arc<dyn EconomyLedger>,
        dispatcher: Arc<GrantDispatcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            catalog,
            registry,
            engine,
            pity,
            economy,
            dispatcher,
            clock,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Runs a full pull transaction for one player.
    ///
    /// `count == 0` is a validated no-op: the banner must exist, nothing
    /// is debited, and an empty result list comes back.
    ///
    /// # Errors
    ///
    /// - `BannerNotFound` for an unknown banner id.
    /// - `CooldownActive` when a free banner's window has not elapsed.
    /// - `InsufficientFunds` when the debit fails.
    /// - `GrantFailed` / `StoreFailure` after rollback, when a post-debit
    ///   step failed; no state change is observable in that case.
    pub fn execute_pull(
        &self,
        player: PlayerId,
        banner_id: BannerId,
        count: u32,
    ) -> GachaResult<Vec<PullResult>> {
        let lock = self.player_lock(player);
        let _guard = lock.lock();

        let banner = self
            .catalog
            .banner(banner_id)
            .ok_or(GachaError::BannerNotFound(banner_id))?;

        if count == 0 {
            return Ok(Vec::new());
        }

        let now = self.clock.now_ms();
        let snapshot = self.pity.state(player, banner_id)?;
        self.check_cooldown(banner, &snapshot, now)?;

        let total_cost = banner.cost.saturating_mul(u64::from(count));
        if total_cost > 0 && !self.economy.try_debit(player, banner.currency, total_cost) {
            return Err(GachaError::InsufficientFunds {
                required: total_cost,
                available: self.economy.balance(player, banner.currency),
            });
        }

        let table = rates::resolve(banner, &self.registry, now);
        let results = match self
            .engine
            .draw_batch(player, banner, &table, &self.pity, count, now)
        {
            Ok(results) => results,
            Err(err) => return Err(self.rollback(player, banner, snapshot, total_cost, err)),
        };

        if let Err(err) = self.dispatcher.dispatch(player, banner, &results, now) {
            return Err(self.rollback(player, banner, snapshot, total_cost, err));
        }

        debug!(player, banner = banner_id, count, total_cost, "pull committed");
        Ok(results)
    }

    /// Cooldown gate for free banners.
    fn check_cooldown(
        &self,
        banner: &Banner,
        state: &PityState,
        now: u64,
    ) -> GachaResult<()> {
        let Some(cooldown) = banner.cooldown_ms else {
            return Ok(());
        };
        if state.last_pull_at_ms == 0 {
            return Ok(());
        }
        let ready_at = state.last_pull_at_ms.saturating_add(cooldown);
        if now < ready_at {
            return Err(GachaError::CooldownActive {
                remaining_ms: ready_at - now,
            });
        }
        Ok(())
    }

    /// Unwinds a failed transaction: refund the debit, restore pity.
    fn rollback(
        &self,
        player: PlayerId,
        banner: &Banner,
        snapshot: PityState,
        total_cost: u64,
        cause: GachaError,
    ) -> GachaError {
        if total_cost > 0 {
            if let Err(err) = self.economy.credit(player, banner.currency, total_cost) {
                error!(player, total_cost, %err, "refund failed during rollback");
            }
        }
        if let Err(err) = self.pity.restore(player, banner.id, snapshot) {
            error!(player, banner = banner.id, %err, "pity restore failed during rollback");
        }
        cause
    }

    fn player_lock(&self, player: PlayerId) -> Arc<Mutex<()>> {
        self.locks.lock().entry(player).or_default().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{BannerItem, ItemPayload, TierRates};
    use crate::collaborators::{ManualClock, MemoryEconomy, MemoryInventory, MemoryPityStore};
    use gacha_shared::{CurrencyKind, Rarity};

    struct Fixture {
        coordinator: TransactionCoordinator,
        economy: Arc<MemoryEconomy>,
        inventory: Arc<MemoryInventory>,
        clock: Arc<ManualClock>,
    }

    fn fixture(banner: Banner) -> Fixture {
        let economy = Arc::new(MemoryEconomy::new());
        let inventory = Arc::new(MemoryInventory::new());
        let clock = Arc::new(ManualClock::new(1_000));
        let dispatcher = Arc::new(GrantDispatcher::new(economy.clone(), inventory.clone()));
        let coordinator = TransactionCoordinator::new(
            Arc::new(Catalog::from_banners(vec![banner]).unwrap()),
            Arc::new(EventModifierRegistry::default()),
            Arc::new(PullEngine::with_seed(7)),
            Arc::new(PityLedger::new(Arc::new(MemoryPityStore::new()))),
            economy.clone(),
            dispatcher,
            clock.clone(),
        );
        Fixture {
            coordinator,
            economy,
            inventory,
            clock,
        }
    }

    fn paid_banner() -> Banner {
        Banner {
            id: 1,
            name: "Test".to_string(),
            cost: 160,
            currency: CurrencyKind::Gems,
            rates: TierRates {
                common: 7000,
                rare: 2500,
                epic: 450,
                legendary: 50,
            },
            legendary_pity: 200,
            epic_pity: 0,
            cooldown_ms: None,
            pool: vec![
                BannerItem {
                    id: 100,
                    rarity: Rarity::Common,
                    payload: ItemPayload::Inventory,
                    quantity: 1,
                },
                BannerItem {
                    id: 200,
                    rarity: Rarity::Rare,
                    payload: ItemPayload::Inventory,
                    quantity: 1,
                },
                BannerItem {
                    id: 400,
                    rarity: Rarity::Legendary,
                    payload: ItemPayload::Inventory,
                    quantity: 1,
                },
            ],
            featured: vec![],
        }
    }

    fn free_banner() -> Banner {
        let mut banner = paid_banner();
        banner.id = 2;
        banner.cost = 0;
        banner.cooldown_ms = Some(86_400_000);
        banner
    }

    #[test]
    fn unknown_banner_is_rejected_before_any_debit() {
        let fx = fixture(paid_banner());
        fx.economy.set_balance(7, CurrencyKind::Gems, 1_000);

        let err = fx.coordinator.execute_pull(7, 99, 1).unwrap_err();
        assert!(matches!(err, GachaError::BannerNotFound(99)));
        assert_eq!(fx.economy.balance(7, CurrencyKind::Gems), 1_000);
    }

    #[test]
    fn insufficient_funds_reports_required_and_available() {
        let fx = fixture(paid_banner());
        fx.economy.set_balance(7, CurrencyKind::Gems, 100);

        let err = fx.coordinator.execute_pull(7, 1, 10).unwrap_err();
        assert!(matches!(
            err,
            GachaError::InsufficientFunds {
                required: 1_600,
                available: 100,
            }
        ));
        assert_eq!(fx.economy.balance(7, CurrencyKind::Gems), 100);
    }

    #[test]
    fn successful_pull_debits_once_and_grants() {
        let fx = fixture(paid_banner());
        fx.economy.set_balance(7, CurrencyKind::Gems, 2_000);

        let results = fx.coordinator.execute_pull(7, 1, 10).unwrap();
        assert_eq!(results.len(), 10);
        assert_eq!(fx.economy.balance(7, CurrencyKind::Gems), 400);

        let granted: u64 = results
            .iter()
            .map(|r| fx.inventory.count(7, r.item_id))
            .sum();
        assert!(granted >= 1);
    }

    #[test]
    fn zero_count_is_a_no_op() {
        let fx = fixture(paid_banner());
        fx.economy.set_balance(7, CurrencyKind::Gems, 2_000);

        let results = fx.coordinator.execute_pull(7, 1, 0).unwrap();
        assert!(results.is_empty());
        assert_eq!(fx.economy.balance(7, CurrencyKind::Gems), 2_000);
    }

    #[test]
    fn free_banner_enforces_cooldown() {
        let fx = fixture(free_banner());

        fx.coordinator.execute_pull(7, 2, 1).unwrap();

        // Second pull one hour later is still inside the 24h window.
        fx.clock.advance(3_600_000);
        let err = fx.coordinator.execute_pull(7, 2, 1).unwrap_err();
        let GachaError::CooldownActive { remaining_ms } = err else {
            panic!("expected cooldown, got {err:?}");
        };
        assert_eq!(remaining_ms, 86_400_000 - 3_600_000);

        // Past the window it works again.
        fx.clock.advance(86_400_000);
        fx.coordinator.execute_pull(7, 2, 1).unwrap();
    }

    #[test]
    fn grant_failure_refunds_the_exact_debit() {
        let fx = fixture(paid_banner());
        fx.economy.set_balance(7, CurrencyKind::Gems, 2_000);
        fx.inventory.fail_adds(true);

        let err = fx.coordinator.execute_pull(7, 1, 10).unwrap_err();
        assert!(matches!(err, GachaError::GrantFailed { .. }));
        assert_eq!(fx.economy.balance(7, CurrencyKind::Gems), 2_000);
    }

    #[test]
    fn grant_failure_restores_pity() {
        let fx = fixture(paid_banner());
        fx.economy.set_balance(7, CurrencyKind::Gems, 10_000);

        // Build up some pity, then fail a batch and compare.
        fx.coordinator.execute_pull(7, 1, 5).unwrap();
        let before = fx.coordinator.pity.state(7, 1).unwrap();

        fx.inventory.fail_adds(true);
        fx.coordinator.execute_pull(7, 1, 10).unwrap_err();

        let after = fx.coordinator.pity.state(7, 1).unwrap();
        assert_eq!(before, after);
    }
}
