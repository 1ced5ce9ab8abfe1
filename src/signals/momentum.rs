//! Token-price momentum detector.
//!
//! Keeps a short history of YES-token prices, derives 5s/15s/30s
//! velocities and a composite momentum, and flags exhaustion when the
//! composite collapses from a significant recent peak.

use std::collections::VecDeque;

use crate::config::SignalConfig;
use crate::domain::signal::MomentumSignal;

const WINDOWS_SECS: [f64; 3] = [5.0, 15.0, 30.0];
/// Composite samples inspected for the trailing peak.
const PEAK_SAMPLES: usize = 10;

/// Velocity terms computed on the last price sample.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Core {
    price: f64,
    v5: f64,
    acceleration: f64,
    composite: f64,
    exhausted: bool,
}

/// Rolling momentum state for one token.
#[derive(Debug, Clone)]
pub struct MomentumDetector {
    prices: VecDeque<(u64, f64)>,
    composites: VecDeque<f64>,
    capacity: usize,
    exhaustion_ratio: f64,
    exhaustion_min_peak: f64,
    min_peak_samples: usize,
    core: Option<Core>,
}

impl MomentumDetector {
    /// Detector sized from signal config.
    pub fn new(config: &SignalConfig) -> Self {
        let capacity = config.momentum_history.max(2);
        Self {
            prices: VecDeque::with_capacity(capacity),
            composites: VecDeque::with_capacity(PEAK_SAMPLES),
            capacity,
            exhaustion_ratio: config.exhaustion_ratio,
            exhaustion_min_peak: config.exhaustion_min_peak,
            min_peak_samples: config.exhaustion_min_samples.clamp(1, PEAK_SAMPLES),
            core: None,
        }
    }

    /// Record a token price and recompute the velocity terms.
    pub fn push(&mut self, ts_ms: u64, price: f64) {
        if self.prices.back().is_some_and(|(t, p)| *t == ts_ms && *p == price) {
            return;
        }
        if self.prices.len() >= self.capacity {
            self.prices.pop_front();
        }
        self.prices.push_back((ts_ms, price));
        if self.prices.len() < 2 {
            return;
        }

        let [v5, v15, v30] = WINDOWS_SECS.map(|w| self.velocity(ts_ms, price, w));
        let acceleration = v5 - v15;
        let composite = 0.5 * v5 + 0.3 * acceleration + 0.2 * (v5 - v30);

        if self.composites.len() >= PEAK_SAMPLES {
            self.composites.pop_front();
        }
        self.composites.push_back(composite);

        self.core = Some(Core {
            price,
            v5,
            acceleration,
            composite,
            exhausted: self.is_exhausted(composite),
        });
    }

    /// Current momentum with divergence taken against `fair_prob`.
    pub fn detect(&self, fair_prob: f64) -> Option<MomentumSignal> {
        self.core.map(|c| MomentumSignal {
            velocity: c.v5,
            acceleration: c.acceleration,
            divergence: fair_prob - c.price,
            composite: c.composite,
            exhausted: c.exhausted,
        })
    }

    /// Latest recorded price.
    pub fn last_price(&self) -> Option<f64> {
        self.prices.back().map(|(_, p)| *p)
    }

    fn velocity(&self, now_ms: u64, price: f64, window_secs: f64) -> f64 {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let target = now_ms.saturating_sub((window_secs * 1_000.0) as u64);
        self.price_near(target)
            .map_or(0.0, |past| (price - past) / window_secs)
    }

    /// Sample closest in time to `target_ms`.
    fn price_near(&self, target_ms: u64) -> Option<f64> {
        self.prices
            .iter()
            .min_by_key(|(t, _)| t.abs_diff(target_ms))
            .map(|(_, p)| *p)
    }

    fn is_exhausted(&self, current: f64) -> bool {
        if self.composites.len() < self.min_peak_samples {
            return false;
        }
        let peak = self
            .composites
            .iter()
            .map(|m| m.abs())
            .fold(0.0_f64, f64::max);
        peak > self.exhaustion_min_peak && current.abs() < self.exhaustion_ratio * peak
    }
}
