//! # Pity Ledger
//!
//! Per-(player, banner) counters that force guaranteed outcomes once
//! thresholds are reached.
//!
//! Counting convention: `pulls_since_legendary` is the number of completed
//! non-Legendary pulls since the last Legendary, so the pull currently in
//! flight is the `pulls_since_legendary + 1`-th. The hard guarantee fires
//! when that index reaches the banner's `legendary_pity`; the soft Epic
//! guarantee fires when it is a positive multiple of `epic_pity`.
//! Legendary pity has strict precedence: on a pull where both align the
//! Epic check is suppressed.
//!
//! State is write-through: every mutation is saved to the `PityStore`
//! before the pull's results leave the coordinator's lock. An in-memory
//! cache fronts the store and is read-your-writes per player.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use gacha_shared::{BannerId, PlayerId, Rarity, TimestampMs};

use crate::catalog::Banner;
use crate::collaborators::PityStore;
use crate::error::GachaResult;

/// Durable pity counters for one (player, banner) pair.
///
/// Created lazily on first pull; never deleted during a session; persisted
/// externally between sessions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PityState {
    /// Completed pulls since the last Legendary (any path).
    pub pulls_since_legendary: u32,
    /// Completed pulls since the Epic modulo guarantee last fired.
    pub pulls_since_epic_guarantee: u32,
    /// When this pair last pulled. Zero means never; used for free-banner
    /// cooldowns, which must survive process restarts.
    pub last_pull_at_ms: TimestampMs,
}

/// The pity ledger: counters for every (player, banner) pair seen so far.
///
/// Entries are exclusively owned by the coordinator's per-player critical
/// section while in use; the interior lock only guards the cache map
/// itself.
pub struct PityLedger {
    store: Arc<dyn PityStore>,
    cache: RwLock<HashMap<(PlayerId, BannerId), PityState>>,
}

impl PityLedger {
    /// Creates a ledger backed by the given store.
    #[must_use]
    pub fn new(store: Arc<dyn PityStore>) -> Self {
        Self {
            store,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Current state for a pair, loading from the store on first access.
    ///
    /// # Errors
    ///
    /// Returns `GachaError::StoreFailure` if the store load fails.
    pub fn state(&self, player: PlayerId, banner: BannerId) -> GachaResult<PityState> {
        if let Some(state) = self.cache.read().get(&(player, banner)) {
            return Ok(*state);
        }
        let state = self.store.load(player, banner)?.unwrap_or_default();
        self.cache.write().insert((player, banner), state);
        Ok(state)
    }

    /// Which guarantee, if any, applies to the pull currently in flight.
    ///
    /// # Errors
    ///
    /// Returns `GachaError::StoreFailure` if the store load fails.
    pub fn check_guarantee(
        &self,
        player: PlayerId,
        banner: &Banner,
    ) -> GachaResult<Option<Rarity>> {
        let state = self.state(player, banner.id)?;
        let nth = state.pulls_since_legendary + 1;

        if nth >= banner.legendary_pity {
            return Ok(Some(Rarity::Legendary));
        }
        if banner.epic_pity > 0 && nth % banner.epic_pity == 0 {
            return Ok(Some(Rarity::Epic));
        }
        Ok(None)
    }

    /// Records a finalized pull outcome and persists the new state.
    ///
    /// `guarantee` is whichever guarantee fired for this pull (`None` for a
    /// natural draw). Counters move only here, after the tier is final:
    /// any Legendary resets the legendary counter, every other outcome
    /// increments it by exactly one; the epic counter resets only when the
    /// Epic modulo guarantee fired.
    ///
    /// # Errors
    ///
    /// Returns `GachaError::StoreFailure` if persisting fails; the in-memory
    /// state is not updated in that case.
    pub fn record_outcome(
        &self,
        player: PlayerId,
        banner: BannerId,
        produced: Rarity,
        guarantee: Option<Rarity>,
        now: TimestampMs,
    ) -> GachaResult<PityState> {
        let mut state = self.state(player, banner)?;

        if produced == Rarity::Legendary {
            state.pulls_since_legendary = 0;
        } else {
            state.pulls_since_legendary += 1;
        }
        if guarantee == Some(Rarity::Epic) {
            state.pulls_since_epic_guarantee = 0;
        } else {
            state.pulls_since_epic_guarantee += 1;
        }
        state.last_pull_at_ms = now;

        self.store.save(player, banner, &state)?;
        self.cache.write().insert((player, banner), state);
        Ok(state)
    }

    /// Overwrites a pair's state, persisting it. Used for rollback.
    ///
    /// # Errors
    ///
    /// Returns `GachaError::StoreFailure` if persisting fails.
    pub fn restore(
        &self,
        player: PlayerId,
        banner: BannerId,
        state: PityState,
    ) -> GachaResult<()> {
        self.store.save(player, banner, &state)?;
        self.cache.write().insert((player, banner), state);
        Ok(())
    }
}
