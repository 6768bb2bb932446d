//! Events emitted by the engine after a pull batch completes.
//!
//! The engine pushes these onto a channel instead of invoking callbacks;
//! whatever layer needs to react (UI, analytics) consumes the receiver at
//! its own pace.

use serde::{Deserialize, Serialize};

use crate::protocol::{BannerId, PlayerId, PullResult, TimestampMs};

/// An event emitted by the gacha engine.
///
/// Exactly one event is emitted per successful pull batch, after all
/// grants have been applied. Failed or rolled-back batches emit nothing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PullEvent {
    /// A pull batch completed and all grants were applied.
    BatchCompleted {
        /// The player that pulled.
        player_id: PlayerId,
        /// The banner that was pulled on.
        banner_id: BannerId,
        /// Every result in the batch, in draw order.
        results: Vec<PullResult>,
        /// When the batch completed.
        timestamp_ms: TimestampMs,
    },
}
