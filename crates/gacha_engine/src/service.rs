//! # Gacha Service
//!
//! The one-stop facade callers integrate against. Wires the catalog,
//! modifier registry, pull engine, pity ledger, dispatcher, and
//! coordinator into a single handle exposing the four operations a host
//! needs: pull, pity status, banner listing, and the event stream.

use std::sync::Arc;

use crossbeam_channel::Receiver;
use tracing::info;

use gacha_shared::{BannerId, BannerSummary, PityStatus, PlayerId, PullBatch, PullEvent};

use crate::catalog::Catalog;
use crate::collaborators::{Clock, EconomyLedger, InventoryStore, PityStore};
use crate::coordinator::TransactionCoordinator;
use crate::dispatch::GrantDispatcher;
use crate::engine::PullEngine;
use crate::error::{GachaError, GachaResult};
use crate::modifier::EventModifierRegistry;
use crate::pity::PityLedger;
use crate::rates;

/// The assembled engine. Cheap to share behind an `Arc`.
pub struct GachaService {
    catalog: Arc<Catalog>,
    registry: Arc<EventModifierRegistry>,
    pity: Arc<PityLedger>,
    dispatcher: Arc<GrantDispatcher>,
    coordinator: TransactionCoordinator,
    clock: Arc<dyn Clock>,
}

impl GachaService {
    /// Assembles a service over validated content and collaborator handles.
    ///
    /// Content is validated when the [`Catalog`] and
    /// [`EventModifierRegistry`] are built, so assembly itself cannot
    /// fail. The RNG seeds from the wall clock; use
    /// [`GachaService::seeded`] when draws must be reproducible.
    #[must_use]
    pub fn new(
        catalog: Catalog,
        registry: EventModifierRegistry,
        economy: Arc<dyn EconomyLedger>,
        inventory: Arc<dyn InventoryStore>,
        pity_store: Arc<dyn PityStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::assemble(
            catalog,
            registry,
            economy,
            inventory,
            pity_store,
            clock,
            PullEngine::new(),
        )
    }

    /// Same as [`GachaService::new`] with a pinned RNG seed.
    #[must_use]
    pub fn seeded(
        catalog: Catalog,
        registry: EventModifierRegistry,
        economy: Arc<dyn EconomyLedger>,
        inventory: Arc<dyn InventoryStore>,
        pity_store: Arc<dyn PityStore>,
        clock: Arc<dyn Clock>,
        seed: u64,
    ) -> Self {
        Self::assemble(
            catalog,
            registry,
            economy,
            inventory,
            pity_store,
            clock,
            PullEngine::with_seed(seed),
        )
    }

    fn assemble(
        catalog: Catalog,
        registry: EventModifierRegistry,
        economy: Arc<dyn EconomyLedger>,
        inventory: Arc<dyn InventoryStore>,
        pity_store: Arc<dyn PityStore>,
        clock: Arc<dyn Clock>,
        engine: PullEngine,
    ) -> Self {
        let catalog = Arc::new(catalog);
        let registry = Arc::new(registry);
        let pity = Arc::new(PityLedger::new(pity_store));
        let dispatcher = Arc::new(GrantDispatcher::new(economy.clone(), inventory));
        let coordinator = TransactionCoordinator::new(
            catalog.clone(),
            registry.clone(),
            Arc::new(engine),
            pity.clone(),
            economy,
            dispatcher.clone(),
            clock.clone(),
        );

        info!(
            banners = catalog.len(),
            modifiers = registry.len(),
            "gacha service assembled"
        );
        Self {
            catalog,
            registry,
            pity,
            dispatcher,
            coordinator,
            clock,
        }
    }

    /// Executes `count` pulls and returns the granted batch.
    ///
    /// # Errors
    ///
    /// See [`TransactionCoordinator::execute_pull`]; failures leave no
    /// observable state change.
    pub fn pull(
        &self,
        player: PlayerId,
        banner_id: BannerId,
        count: u32,
    ) -> GachaResult<PullBatch> {
        let banner = self
            .catalog
            .banner(banner_id)
            .ok_or(GachaError::BannerNotFound(banner_id))?;
        let results = self.coordinator.execute_pull(player, banner_id, count)?;
        Ok(PullBatch {
            banner_id,
            cost: banner.cost.saturating_mul(u64::from(count)),
            currency: banner.currency,
            results,
        })
    }

    /// Current pity position of a player on a banner.
    ///
    /// # Errors
    ///
    /// `BannerNotFound` for an unknown banner, `StoreFailure` if the pity
    /// store cannot be read.
    pub fn pity_status(&self, player: PlayerId, banner_id: BannerId) -> GachaResult<PityStatus> {
        let banner = self
            .catalog
            .banner(banner_id)
            .ok_or(GachaError::BannerNotFound(banner_id))?;
        let state = self.pity.state(player, banner_id)?;
        Ok(PityStatus {
            pulls_since_legendary: state.pulls_since_legendary,
            pulls_since_epic_guarantee: state.pulls_since_epic_guarantee,
            pulls_until_guaranteed_legendary: banner
                .legendary_pity
                .saturating_sub(state.pulls_since_legendary),
        })
    }

    /// Every banner with its effective rates resolved at the current time.
    #[must_use]
    pub fn active_banners(&self) -> Vec<BannerSummary> {
        let now = self.clock.now_ms();
        let mut summaries: Vec<BannerSummary> = self
            .catalog
            .banners()
            .map(|banner| {
                let table = rates::resolve(banner, &self.registry, now);
                BannerSummary {
                    banner_id: banner.id,
                    name: banner.name.clone(),
                    cost: banner.cost,
                    currency: banner.currency,
                    tier_rates_bp: table.tiers_bp,
                    featured: banner.featured.clone(),
                }
            })
            .collect();
        summaries.sort_by_key(|s| s.banner_id);
        summaries
    }

    /// Subscribes to the batch-completed event stream.
    #[must_use]
    pub fn events(&self) -> Receiver<PullEvent> {
        self.dispatcher.events()
    }
}
