//! # Grant Dispatcher
//!
//! Applies the side effects of a completed draw batch: inventory items go
//! to the inventory store, currency payloads credit the economy ledger.
//!
//! Grants are applied in slot order. If one fails, every currency credit
//! already applied is compensated with a best-effort debit and the error
//! is propagated so the coordinator can refund the pull cost. Inventory
//! grants cannot be un-granted here; those are logged and left to
//! reconciliation.
//!
//! Exactly one [`PullEvent::BatchCompleted`] is published per fully
//! granted batch, over a crossbeam channel consumers subscribe to.

use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{debug, error, warn};

use gacha_shared::{CurrencyKind, PlayerId, PullEvent, PullResult, TimestampMs};

use crate::catalog::{Banner, ItemPayload};
use crate::collaborators::{EconomyLedger, InventoryStore};
use crate::error::{GachaError, GachaResult};

/// Applies grants for drawn results and publishes batch events.
pub struct GrantDispatcher {
    economy: Arc<dyn EconomyLedger>,
    inventory: Arc<dyn InventoryStore>,
    sender: Sender<PullEvent>,
    receiver: Receiver<PullEvent>,
}

impl GrantDispatcher {
    /// Creates a dispatcher over the given collaborator handles.
    #[must_use]
    pub fn new(economy: Arc<dyn EconomyLedger>, inventory: Arc<dyn InventoryStore>) -> Self {
        let (sender, receiver) = unbounded();
        Self {
            economy,
            inventory,
            sender,
            receiver,
        }
    }

    /// Subscribes to batch-completed events.
    ///
    /// Crossbeam receivers are clonable; every clone sees every event.
    #[must_use]
    pub fn events(&self) -> Receiver<PullEvent> {
        self.receiver.clone()
    }

    /// Grants every result in the batch, then publishes one event.
    ///
    /// # Errors
    ///
    /// Returns `GachaError::GrantFailed` (or the underlying store error)
    /// if any grant fails. Currency credits applied before the failure
    /// are compensated before returning; the batch produced no event.
    pub fn dispatch(
        &self,
        player: PlayerId,
        banner: &Banner,
        results: &[PullResult],
        now: TimestampMs,
    ) -> GachaResult<()> {
        let mut credited: Vec<(CurrencyKind, u64)> = Vec::new();
        let mut granted_items = 0u32;

        for result in results {
            let Some(item) = banner.find_item(result.item_id) else {
                self.compensate(player, &credited, granted_items);
                return Err(GachaError::GrantFailed {
                    item_id: result.item_id,
                    reason: "item missing from banner pool".to_string(),
                });
            };

            let outcome = match item.payload {
                ItemPayload::Inventory => self
                    .inventory
                    .add_item(player, item.id, result.quantity)
                    .map(|()| granted_items += 1),
                ItemPayload::Currency { kind } => {
                    let amount = u64::from(result.quantity);
                    self.economy
                        .credit(player, kind, amount)
                        .map(|()| credited.push((kind, amount)))
                }
            };

            if let Err(err) = outcome {
                self.compensate(player, &credited, granted_items);
                return Err(err);
            }
        }

        debug!(player, banner = banner.id, slots = results.len(), "batch granted");
        // Receiver never closes while the dispatcher holds one end.
        let _ = self.sender.send(PullEvent::BatchCompleted {
            player_id: player,
            banner_id: banner.id,
            results: results.to_vec(),
            timestamp_ms: now,
        });
        Ok(())
    }

    /// Best-effort reversal of currency credits after a mid-batch failure.
    fn compensate(&self, player: PlayerId, credited: &[(CurrencyKind, u64)], granted_items: u32) {
        for &(kind, amount) in credited {
            if !self.economy.try_debit(player, kind, amount) {
                // Spent between credit and compensation; nothing safe to do.
                error!(player, ?kind, amount, "compensating debit failed");
            }
        }
        if granted_items > 0 {
            warn!(
                player,
                granted_items, "inventory grants before failure are not reversed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{BannerItem, TierRates};
    use crate::collaborators::{MemoryEconomy, MemoryInventory};
    use gacha_shared::Rarity;

    fn banner() -> Banner {
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
                    id: 101,
                    rarity: Rarity::Common,
                    payload: ItemPayload::Currency {
                        kind: CurrencyKind::Coins,
                    },
                    quantity: 50,
                },
            ],
            featured: vec![],
        }
    }

    fn result(item_id: u32, quantity: u32) -> PullResult {
        PullResult {
            item_id,
            rarity: Rarity::Common,
            quantity,
            pity_forced: false,
            timestamp_ms: 0,
        }
    }

    #[test]
    fn grants_inventory_and_currency_payloads() {
        let economy = Arc::new(MemoryEconomy::new());
        let inventory = Arc::new(MemoryInventory::new());
        let dispatcher = GrantDispatcher::new(economy.clone(), inventory.clone());

        dispatcher
            .dispatch(7, &banner(), &[result(100, 1), result(101, 50)], 0)
            .unwrap();

        assert_eq!(inventory.count(7, 100), 1);
        assert_eq!(economy.balance(7, CurrencyKind::Coins), 50);
    }

    #[test]
    fn one_event_per_successful_batch() {
        let dispatcher = GrantDispatcher::new(
            Arc::new(MemoryEconomy::new()),
            Arc::new(MemoryInventory::new()),
        );
        let events = dispatcher.events();

        dispatcher
            .dispatch(7, &banner(), &[result(100, 1)], 42)
            .unwrap();

        let event = events.try_recv().unwrap();
        let PullEvent::BatchCompleted {
            player_id,
            banner_id,
            results,
            timestamp_ms,
        } = event;
        assert_eq!(player_id, 7);
        assert_eq!(banner_id, 1);
        assert_eq!(results.len(), 1);
        assert_eq!(timestamp_ms, 42);
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn failed_grant_compensates_credits_and_emits_nothing() {
        let economy = Arc::new(MemoryEconomy::new());
        let inventory = Arc::new(MemoryInventory::new());
        inventory.fail_adds(true);
        let dispatcher = GrantDispatcher::new(economy.clone(), inventory);
        let events = dispatcher.events();

        // Currency credit lands first, then the inventory grant fails.
        let err = dispatcher
            .dispatch(7, &banner(), &[result(101, 50), result(100, 1)], 0)
            .unwrap_err();

        assert!(matches!(err, GachaError::GrantFailed { item_id: 100, .. }));
        assert_eq!(economy.balance(7, CurrencyKind::Coins), 0);
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn unknown_item_id_is_a_grant_failure() {
        let dispatcher = GrantDispatcher::new(
            Arc::new(MemoryEconomy::new()),
            Arc::new(MemoryInventory::new()),
        );

        let err = dispatcher
            .dispatch(7, &banner(), &[result(999, 1)], 0)
            .unwrap_err();
        assert!(matches!(err, GachaError::GrantFailed { item_id: 999, .. }));
    }
}
