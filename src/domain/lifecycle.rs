//! Market lifecycle phases.
//!
//! Phase is derived from `now - open` only. Nothing else can move it.
//! Base boundaries are for a 5-minute window; 15-minute windows scale
//! every boundary by 3.

use serde::{Deserialize, Serialize};

use super::market::{DurationClass, Market};

/// Phase boundaries (seconds from open) for a 5-minute window.
const BASE_BOUNDARIES_SECS: [u64; 6] = [5, 30, 120, 240, 270, 300];

/// Lifecycle phase of a market, in strict time order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    /// [0, 5s): book just opened, maximal straddle/arb sizing.
    Alpha,
    /// [5, 30s): early mispricings.
    Early,
    /// [30, 120s): main trading window.
    Prime,
    /// [120, 240s): directional information accumulates.
    Mature,
    /// [240, 270s): final adjustments.
    PreResolution,
    /// [270, 300s): no new orders, cancellations only.
    Lockout,
    /// [300s, ∞): awaiting settlement.
    Resolved,
}

const ORDERED: [Phase; 6] = [
    Phase::Alpha,
    Phase::Early,
    Phase::Prime,
    Phase::Mature,
    Phase::PreResolution,
    Phase::Lockout,
];

impl Phase {
    /// Whether new order submission is allowed in this phase.
    pub fn permits_new_orders(self) -> bool {
        self < Self::Lockout
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Alpha => "ALPHA",
            Self::Early => "EARLY",
            Self::Prime => "PRIME",
            Self::Mature => "MATURE",
            Self::PreResolution => "PRE_RESOLUTION",
            Self::Lockout => "LOCKOUT",
            Self::Resolved => "RESOLVED",
        };
        f.write_str(s)
    }
}

/// Phase of a window opened at `open_ms`, observed at `now_ms`.
///
/// Times before open count as zero elapsed.
pub fn phase_at(duration: DurationClass, open_ms: u64, now_ms: u64) -> Phase {
    let elapsed_ms = now_ms.saturating_sub(open_ms);
    let scale = duration.phase_scale();
    BASE_BOUNDARIES_SECS
        .iter()
        .zip(ORDERED)
        .find(|(bound, _)| elapsed_ms < *bound * 1000 * scale)
        .map_or(Phase::Resolved, |(_, phase)| phase)
}

/// A phase change observed by a tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTransition {
    /// Phase before the change.
    pub from: Phase,
    /// Phase after the change.
    pub to: Phase,
}

/// Per-market phase tracker that never regresses.
///
/// `phase_at` is already monotone in time; the tracker additionally
/// guards against a caller feeding an earlier clock reading.
#[derive(Debug, Clone)]
pub struct PhaseTracker {
    duration: DurationClass,
    open_ms: u64,
    current: Phase,
}

impl PhaseTracker {
    /// Start tracking a market.
    pub const fn new(market: &Market) -> Self {
        Self {
            duration: market.duration,
            open_ms: market.open_ms,
            current: Phase::Alpha,
        }
    }

    /// Current phase.
    pub const fn current(&self) -> Phase {
        self.current
    }

    /// Advance to the phase for `now_ms`. Returns the transition if the
    /// phase changed.
    pub fn observe(&mut self, now_ms: u64) -> Option<PhaseTransition> {
        let next = phase_at(self.duration, self.open_ms, now_ms);
        if next > self.current {
            let transition = PhaseTransition {
                from: self.current,
                to: next,
            };
            self.current = next;
            Some(transition)
        } else {
            None
        }
    }

    /// Milliseconds until the next boundary, or `None` once resolved.
    pub fn ms_until_next(&self, now_ms: u64) -> Option<u64> {
        let elapsed_ms = now_ms.saturating_sub(self.open_ms);
        let scale = self.duration.phase_scale();
        BASE_BOUNDARIES_SECS
            .iter()
            .map(|b| b * 1000 * scale)
            .find(|b| *b > elapsed_ms)
            .map(|b| b - elapsed_ms)
    }
}
