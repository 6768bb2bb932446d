//! # Gacha Error Types
//!
//! All errors that can cross the engine boundary.

use gacha_shared::{BannerId, ItemId};
use thiserror::Error;

/// Errors that can occur in the gacha engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GachaError {
    /// Unknown banner or item. Configuration error, non-retryable.
    #[error("banner not found: {0}")]
    BannerNotFound(BannerId),

    /// Not enough currency for the requested batch. Surfaced as-is, no retry.
    #[error("insufficient funds: need {required}, have {available}")]
    InsufficientFunds {
        /// Total cost of the requested batch.
        required: u64,
        /// Balance at the time of the check.
        available: u64,
    },

    /// Free-banner cooldown has not elapsed yet.
    #[error("cooldown active: {remaining_ms} ms remaining")]
    CooldownActive {
        /// Time left until the banner can be pulled again.
        remaining_ms: u64,
    },

    /// A required tier has no items in the banner pool.
    ///
    /// The engine never raises this itself: catalog validation rejects
    /// empty pools up front, and draw-time gaps degrade to lower tiers
    /// with a warning. Reserved for hosts that patch content outside
    /// [`Catalog::load`](crate::catalog::Catalog::load) and need an error
    /// lane for pool defects.
    #[error("banner {banner_id} has no items at or below the required tier")]
    ContentMisconfigured {
        /// The misconfigured banner.
        banner_id: BannerId,
    },

    /// An external collaborator failed while applying grants.
    ///
    /// The debit has been rolled back; the caller may retry.
    #[error("grant failed for item {item_id}: {reason}")]
    GrantFailed {
        /// The item whose grant failed.
        item_id: ItemId,
        /// Collaborator-supplied failure reason.
        reason: String,
    },

    /// The persistence collaborator failed.
    ///
    /// Treated like a grant failure for rollback purposes.
    #[error("pity store failure: {0}")]
    StoreFailure(String),

    /// Invalid configuration file.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for gacha operations.
pub type GachaResult<T> = Result<T, GachaError>;
