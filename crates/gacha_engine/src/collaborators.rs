//! # External Collaborators
//!
//! Abstract interfaces for everything the engine does not own: currency
//! balances, inventories, durable pity state, and the clock. All of them
//! are injected explicitly (no globals), which keeps every component
//! testable in isolation.
//!
//! The in-memory implementations in this module are reference adapters:
//! real deployments wire actual economy/inventory/storage backends, tests
//! and local tools use these.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

use gacha_shared::{BannerId, CurrencyKind, ItemId, PlayerId, TimestampMs};

use crate::error::{GachaError, GachaResult};
use crate::pity::PityState;

/// Owns all player currency balances.
///
/// The engine never read-modify-writes a balance locally; it only issues
/// debit and credit requests through this interface.
pub trait EconomyLedger: Send + Sync {
    /// Atomically debits `amount` if the balance covers it.
    ///
    /// Returns `true` on success, `false` if funds were insufficient.
    fn try_debit(&self, player: PlayerId, kind: CurrencyKind, amount: u64) -> bool;

    /// Credits `amount` to a balance.
    ///
    /// # Errors
    ///
    /// Returns a collaborator error if the credit could not be applied.
    fn credit(&self, player: PlayerId, kind: CurrencyKind, amount: u64) -> GachaResult<()>;

    /// Snapshot of a balance.
    fn balance(&self, player: PlayerId, kind: CurrencyKind) -> u64;
}

/// Owns player inventories.
pub trait InventoryStore: Send + Sync {
    /// Adds `quantity` of an item to a player's inventory.
    ///
    /// # Errors
    ///
    /// Returns a collaborator error if the add could not be applied.
    fn add_item(&self, player: PlayerId, item: ItemId, quantity: u32) -> GachaResult<()>;
}

/// Durable key-value persistence for pity state.
///
/// Must be durable and read-your-writes consistent for a single player.
pub trait PityStore: Send + Sync {
    /// Loads the pity state for a pair, if any was ever saved.
    ///
    /// # Errors
    ///
    /// Returns `GachaError::StoreFailure` on backend failure.
    fn load(&self, player: PlayerId, banner: BannerId) -> GachaResult<Option<PityState>>;

    /// Durably saves the pity state for a pair.
    ///
    /// # Errors
    ///
    /// Returns `GachaError::StoreFailure` on backend failure.
    fn save(&self, player: PlayerId, banner: BannerId, state: &PityState) -> GachaResult<()>;
}

/// Time source, injected so event windows and cooldowns are testable.
pub trait Clock: Send + Sync {
    /// Current time in milliseconds since the Unix epoch.
    fn now_ms(&self) -> TimestampMs;
}

// ============================================================================
// In-Memory Reference Implementations
// ============================================================================

/// In-memory currency ledger.
#[derive(Debug, Default)]
pub struct MemoryEconomy {
    balances: Mutex<HashMap<(PlayerId, CurrencyKind), u64>>,
    fail_credits: AtomicBool,
}

impl MemoryEconomy {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a player's balance directly (test setup).
    pub fn set_balance(&self, player: PlayerId, kind: CurrencyKind, amount: u64) {
        self.balances.lock().insert((player, kind), amount);
    }

    /// Makes every subsequent `credit` fail (failure injection).
    pub fn fail_credits(&self, fail: bool) {
        self.fail_credits.store(fail, Ordering::SeqCst);
    }
}

impl EconomyLedger for MemoryEconomy {
    fn try_debit(&self, player: PlayerId, kind: CurrencyKind, amount: u64) -> bool {
        let mut balances = self.balances.lock();
        let balance = balances.entry((player, kind)).or_insert(0);
        if *balance < amount {
            return false;
        }
        *balance -= amount;
        true
    }

    fn credit(&self, player: PlayerId, kind: CurrencyKind, amount: u64) -> GachaResult<()> {
        if self.fail_credits.load(Ordering::SeqCst) {
            return Err(GachaError::StoreFailure(
                "economy ledger unavailable".to_string(),
            ));
        }
        *self.balances.lock().entry((player, kind)).or_insert(0) += amount;
        Ok(())
    }

    fn balance(&self, player: PlayerId, kind: CurrencyKind) -> u64 {
        self.balances
            .lock()
            .get(&(player, kind))
            .copied()
            .unwrap_or(0)
    }
}

/// In-memory inventory store with failure injection for atomicity tests.
#[derive(Debug, Default)]
pub struct MemoryInventory {
    items: Mutex<HashMap<(PlayerId, ItemId), u64>>,
    fail_adds: AtomicBool,
}

impl MemoryInventory {
    /// Creates an empty inventory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total quantity of an item held by a player.
    #[must_use]
    pub fn count(&self, player: PlayerId, item: ItemId) -> u64 {
        self.items
            .lock()
            .get(&(player, item))
            .copied()
            .unwrap_or(0)
    }

    /// Makes every subsequent `add_item` fail (failure injection).
    pub fn fail_adds(&self, fail: bool) {
        self.fail_adds.store(fail, Ordering::SeqCst);
    }
}

impl InventoryStore for MemoryInventory {
    fn add_item(&self, player: PlayerId, item: ItemId, quantity: u32) -> GachaResult<()> {
        if self.fail_adds.load(Ordering::SeqCst) {
            return Err(GachaError::GrantFailed {
                item_id: item,
                reason: "inventory store unavailable".to_string(),
            });
        }
        *self.items.lock().entry((player, item)).or_insert(0) += u64::from(quantity);
        Ok(())
    }
}

/// In-memory pity store.
#[derive(Debug, Default)]
pub struct MemoryPityStore {
    states: Mutex<HashMap<(PlayerId, BannerId), PityState>>,
    fail_saves: AtomicBool,
}

impl MemoryPityStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `save` fail (failure injection).
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

impl PityStore for MemoryPityStore {
    fn load(&self, player: PlayerId, banner: BannerId) -> GachaResult<Option<PityState>> {
        Ok(self.states.lock().get(&(player, banner)).copied())
    }

    fn save(&self, player: PlayerId, banner: BannerId, state: &PityState) -> GachaResult<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(GachaError::StoreFailure(
                "pity store unavailable".to_string(),
            ));
        }
        self.states.lock().insert((player, banner), *state);
        Ok(())
    }
}

/// Wall-clock time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> TimestampMs {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }
}

/// A clock that only moves when told to. For tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    /// Creates a clock frozen at `start_ms`.
    #[must_use]
    pub fn new(start_ms: TimestampMs) -> Self {
        Self {
            now_ms: AtomicU64::new(start_ms),
        }
    }

    /// Jumps the clock to an absolute time.
    pub fn set(&self, now_ms: TimestampMs) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }

    /// Advances the clock by a delta.
    pub fn advance(&self, delta_ms: u64) {
        self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> TimestampMs {
        self.now_ms.load(Ordering::SeqCst)
    }
}
