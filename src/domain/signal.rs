//! Derived signal types.
//!
//! Every value here is recomputed on each evaluation cycle and never
//! persisted as ground truth.

use serde::{Deserialize, Serialize};

use super::market::TokenSide;

/// Discretized volatility bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VolRegime {
    /// Barely moving.
    Dead,
    /// Quiet.
    Low,
    /// Normal.
    Medium,
    /// Fast.
    High,
    /// Disorderly; quoting withdrawn.
    Extreme,
}

impl VolRegime {
    /// Position of this regime in per-regime config tables.
    pub const fn index(self) -> usize {
        match self {
            Self::Dead => 0,
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
            Self::Extreme => 4,
        }
    }

    /// Stable label for logs and metrics.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dead => "DEAD",
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Extreme => "EXTREME",
        }
    }
}

impl std::fmt::Display for VolRegime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a bias or momentum signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    /// Expect close above reference.
    Up,
    /// Expect close below reference.
    Down,
    /// No view.
    Neutral,
}

impl Direction {
    /// Token that pays out if this direction is right.
    pub const fn favored_token(self) -> Option<TokenSide> {
        match self {
            Self::Up => Some(TokenSide::Yes),
            Self::Down => Some(TokenSide::No),
            Self::Neutral => None,
        }
    }
}

/// Directional bias from the weighted spot-market score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BiasSignal {
    /// Declared direction.
    pub direction: Direction,
    /// |score| when directional, 0 when neutral.
    pub confidence: f64,
    /// Raw clamped score in [-1, 1].
    pub score: f64,
}

impl BiasSignal {
    /// No view.
    pub const fn neutral() -> Self {
        Self {
            direction: Direction::Neutral,
            confidence: 0.0,
            score: 0.0,
        }
    }

    /// Whether the bias favors the given token.
    pub fn favors(&self, side: TokenSide) -> bool {
        self.direction.favored_token() == Some(side)
    }
}

impl Default for BiasSignal {
    fn default() -> Self {
        Self::neutral()
    }
}

/// YES+NO below $1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArbSignal {
    /// Best YES ask.
    pub yes_ask: f64,
    /// Best NO ask.
    pub no_ask: f64,
    /// 1 - (yes_ask + no_ask).
    pub edge: f64,
    /// min(depth on both legs), in shares.
    pub executable_size: f64,
    /// executable_size × edge.
    pub expected_profit: f64,
    /// expected_profit discounted by the regime fill probability.
    pub risk_adjusted_profit: f64,
}

impl ArbSignal {
    /// Sum of the two asks.
    pub fn combined(&self) -> f64 {
        self.yes_ask + self.no_ask
    }
}

/// Token-price momentum relative to fair value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MomentumSignal {
    /// 5-second velocity (price/sec).
    pub velocity: f64,
    /// v5 - v15.
    pub acceleration: f64,
    /// Fair probability minus current token price.
    pub divergence: f64,
    /// 0.5·v5 + 0.3·accel + 0.2·(v5 - v30).
    pub composite: f64,
    /// Composite fell below 40% of a significant trailing peak.
    pub exhausted: bool,
}

impl MomentumSignal {
    /// Direction implied when composite and divergence agree in sign.
    pub fn agreed_direction(&self) -> Direction {
        if self.composite > 0.0 && self.divergence > 0.0 {
            Direction::Up
        } else if self.composite < 0.0 && self.divergence < 0.0 {
            Direction::Down
        } else {
            Direction::Neutral
        }
    }
}

/// Bollinger-band-width compression state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompressionSignal {
    /// Percentile rank of the current width in the lookback (0-100).
    pub percentile: f64,
    /// Width is below the compression percentile.
    pub compressed: bool,
    /// Width jumped while still compressed.
    pub breakout: bool,
}

/// Short-window spot tape state used for adverse-selection checks.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TapeSignal {
    /// Fractional spot move over the last second.
    pub move_1s: f64,
    /// Buy minus sell volume over the flow window, in units of average size.
    pub flow_imbalance: f64,
    /// Liquidation notional in the cascade window exceeds the threshold.
    pub liquidation_cascade: bool,
}

/// Everything a strategy reads about one market at one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketSignals {
    /// Volatility regime of the underlying.
    pub regime: VolRegime,
    /// Latest spot price, if any tick arrived yet.
    pub spot_price: Option<f64>,
    /// Fair probability of the YES outcome.
    pub fair_prob_up: f64,
    /// Directional bias.
    pub bias: BiasSignal,
    /// Arbitrage opportunity, if present.
    pub arb: Option<ArbSignal>,
    /// YES-token momentum, once enough history exists.
    pub momentum: Option<MomentumSignal>,
    /// Spot compression state, once enough history exists.
    pub compression: Option<CompressionSignal>,
    /// Adverse-selection inputs.
    pub tape: TapeSignal,
    /// Spot feed silent beyond the staleness timeout.
    pub stale: bool,
    /// When these signals were computed (Unix ms).
    pub computed_ms: u64,
}
