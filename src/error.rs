//! Engine Errors - Typed Failure Taxonomy
//!
//! Errors raised inside the decision/execution pipeline. Adapters and
//! wiring code use `anyhow` with context; anything that must be matched
//! on (risk rejections, submit vs cancel network failures) lives here.

use std::fmt;

use thiserror::Error;

use crate::domain::market::{Asset, MarketId};

/// Reason an intent was refused before reaching the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Kill switch is latched.
    KillSwitch,
    /// Daily-loss cooldown in effect.
    Paused,
    /// Open + held notional would exceed the exposure ceiling.
    Exposure,
    /// Daily P&L already below the loss limit.
    DailyLoss,
    /// Per-market position cap exceeded.
    PositionLimit,
    /// Limit price too far from the current midpoint.
    PriceSanity,
    /// Not enough free capital to fund the order.
    Balance,
    /// Arb edge vanished between detection and submission.
    StaleEdge,
    /// Market is in LOCKOUT or already resolved.
    Lockout,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::KillSwitch => "kill_switch",
            Self::Paused => "paused",
            Self::Exposure => "exposure",
            Self::DailyLoss => "daily_loss",
            Self::PositionLimit => "position_limit",
            Self::PriceSanity => "price_sanity",
            Self::Balance => "balance",
            Self::StaleEdge => "stale_edge",
            Self::Lockout => "lockout",
        };
        f.write_str(s)
    }
}

/// Main error type for the engine pipeline.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Malformed intent; dropped and logged.
    #[error("Invalid order intent: {0}")]
    Validation(String),

    /// Local risk refusal; the originating strategy is notified.
    #[error("Risk rejection ({reason}): {detail}")]
    RiskRejection {
        /// Which check failed.
        reason: RejectReason,
        /// Human-readable numbers behind the refusal.
        detail: String,
    },

    /// Submission failed on the wire. Never retried blindly.
    #[error("Order submission failed for market {market}: {source}")]
    NetworkSubmit {
        /// Market the batch targeted.
        market: MarketId,
        /// Underlying transport error.
        #[source]
        source: anyhow::Error,
    },

    /// Cancellation failed after bounded retries.
    #[error("Cancel failed after {attempts} attempts: {source}")]
    NetworkCancel {
        /// Attempts made before giving up.
        attempts: u32,
        /// Last transport error.
        #[source]
        source: anyhow::Error,
    },

    /// New submissions are refused until the kill switch clears.
    #[error("Kill switch active")]
    KillSwitchActive,

    /// Spot feed for the asset went silent beyond the timeout.
    #[error("Stale data for {asset}: silent for {silent_ms}ms")]
    StaleData {
        /// Affected asset.
        asset: Asset,
        /// Milliseconds since the last tick.
        silent_ms: u64,
    },

    /// Market is in LOCKOUT or resolved; no new orders.
    #[error("Market {0} is locked")]
    MarketLocked(MarketId),

    /// Signing collaborator refused or failed.
    #[error("Signing failed: {0}")]
    Signing(#[source] anyhow::Error),
}

impl EngineError {
    /// Shorthand for a risk rejection.
    pub fn reject(reason: RejectReason, detail: impl Into<String>) -> Self {
        Self::RiskRejection {
            reason,
            detail: detail.into(),
        }
    }

    /// The rejection reason, if this is a local refusal.
    pub const fn reject_reason(&self) -> Option<RejectReason> {
        match self {
            Self::RiskRejection { reason, .. } => Some(*reason),
            Self::KillSwitchActive => Some(RejectReason::KillSwitch),
            Self::MarketLocked(_) => Some(RejectReason::Lockout),
            _ => None,
        }
    }
}

/// Convenience alias for engine results.
pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reject_reason_display() {
        let err = EngineError::reject(RejectReason::Exposure, "600 > 500");
        assert_eq!(err.to_string(), "Risk rejection (exposure): 600 > 500");
        assert_eq!(err.reject_reason(), Some(RejectReason::Exposure));
    }

    #[test]
    fn test_kill_switch_maps_to_reason() {
        assert_eq!(
            EngineError::KillSwitchActive.reject_reason(),
            Some(RejectReason::KillSwitch)
        );
        assert!(EngineError::Validation("x".into()).reject_reason().is_none());
    }
}
