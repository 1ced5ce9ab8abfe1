//! Directional bias detector.
//!
//! Five spot-market inputs, each normalized to [-1, 1], combined with
//! configured weights. A bias is declared only when |score| clears the
//! threshold.

use crate::config::SignalConfig;
use crate::domain::signal::{BiasSignal, Direction};

/// Momentum move mapping to tanh(1).
const MOMENTUM_SCALE: f64 = 0.003;
/// Funding score used once the rate turns extreme.
const FUNDING_CONTRARIAN: f64 = 0.8;

/// Normalized bias inputs, each in [-1, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BiasComponents {
    /// 1-minute momentum.
    pub momentum: f64,
    /// EMA crossover.
    pub trend: f64,
    /// Order-flow delta.
    pub flow: f64,
    /// Funding level.
    pub funding: f64,
    /// Liquidation imbalance.
    pub liquidation: f64,
}

/// Raw inputs before normalization.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RawBiasInputs {
    /// Fractional 1-minute spot change.
    pub momentum_pct: f64,
    /// EMA(5) - EMA(20).
    pub ema_spread: f64,
    /// Latest spot price.
    pub price: f64,
    /// Buy minus sell volume in the flow window.
    pub flow_delta: f64,
    /// Total volume in the flow window.
    pub flow_volume: f64,
    /// Latest perpetual funding rate.
    pub funding_rate: f64,
    /// Long minus short liquidation notional in the window.
    pub net_liquidation: f64,
}

/// Weighted bias scorer.
#[derive(Debug, Clone)]
pub struct BiasDetector {
    weights: [f64; 5],
    threshold: f64,
    funding_extreme: f64,
    liquidation_norm: f64,
}

impl BiasDetector {
    /// Detector from signal config.
    pub fn new(config: &SignalConfig) -> Self {
        let w = &config.bias_weights;
        Self {
            weights: [w.momentum, w.trend, w.flow, w.funding, w.liquidation],
            threshold: config.bias_threshold,
            funding_extreme: config.funding_extreme,
            liquidation_norm: config.liquidation_norm,
        }
    }

    /// Map raw inputs to [-1, 1] components.
    pub fn normalize(&self, raw: &RawBiasInputs) -> BiasComponents {
        let trend = if raw.price > 0.0 {
            (raw.ema_spread / raw.price * 100.0).clamp(-1.0, 1.0)
        } else {
            0.0
        };
        let flow = if raw.flow_volume > 0.0 {
            (raw.flow_delta / raw.flow_volume).clamp(-1.0, 1.0)
        } else {
            0.0
        };
        // Mild funding is continuation, extreme funding is contrarian.
        let f = raw.funding_rate;
        let funding = if f.abs() > self.funding_extreme {
            -f.signum() * FUNDING_CONTRARIAN
        } else if f == 0.0 {
            0.0
        } else {
            f.signum() * (f.abs() / self.funding_extreme).min(1.0)
        };
        // Long liquidations are bearish.
        let liquidation = if self.liquidation_norm > 0.0 {
            (-raw.net_liquidation / self.liquidation_norm).clamp(-1.0, 1.0)
        } else {
            0.0
        };
        BiasComponents {
            momentum: (raw.momentum_pct / MOMENTUM_SCALE).tanh(),
            trend,
            flow,
            funding,
            liquidation,
        }
    }

    /// Score normalized components.
    pub fn detect(&self, c: &BiasComponents) -> BiasSignal {
        let inputs = [c.momentum, c.trend, c.flow, c.funding, c.liquidation];
        let score = inputs
            .iter()
            .zip(self.weights)
            .map(|(x, w)| x * w)
            .sum::<f64>()
            .clamp(-1.0, 1.0);

        if score.abs() > self.threshold {
            BiasSignal {
                direction: if score > 0.0 { Direction::Up } else { Direction::Down },
                confidence: score.abs(),
                score,
            }
        } else {
            BiasSignal {
                direction: Direction::Neutral,
                confidence: 0.0,
                score,
            }
        }
    }
}
