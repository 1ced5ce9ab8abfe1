//! Bollinger-band-width compression and breakout.

use std::collections::VecDeque;

use crate::config::SignalConfig;
use crate::domain::signal::CompressionSignal;

/// Percentile tracker over recent band-width samples.
#[derive(Debug, Clone)]
pub struct CompressionDetector {
    widths: VecDeque<f64>,
    lookback: usize,
    percentile_threshold: f64,
    breakout_ratio: f64,
    last: Option<CompressionSignal>,
}

impl CompressionDetector {
    /// Detector from signal config.
    pub fn new(config: &SignalConfig) -> Self {
        let lookback = config.compression_lookback.max(2);
        Self {
            widths: VecDeque::with_capacity(lookback),
            lookback,
            percentile_threshold: config.compression_percentile,
            breakout_ratio: config.breakout_ratio,
            last: None,
        }
    }

    /// Record a new width sample and recompute the signal.
    #[allow(clippy::cast_precision_loss)]
    pub fn push(&mut self, width: f64) -> CompressionSignal {
        let previous = self.widths.back().copied();
        if self.widths.len() >= self.lookback {
            self.widths.pop_front();
        }
        self.widths.push_back(width);

        let below = self.widths.iter().filter(|w| **w < width).count();
        let percentile = below as f64 / self.widths.len() as f64 * 100.0;
        let compressed = percentile < self.percentile_threshold;
        let breakout = compressed
            && previous.is_some_and(|p| p > 0.0 && width > p * self.breakout_ratio);

        let signal = CompressionSignal {
            percentile,
            compressed,
            breakout,
        };
        self.last = Some(signal);
        signal
    }

    /// Most recent signal, if any sample arrived.
    pub const fn last(&self) -> Option<CompressionSignal> {
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_narrowest_width_is_compressed() {
        let mut d = CompressionDetector::new(&SignalConfig::default());
        for i in 0..50 {
            d.push(0.01 + f64::from(i) * 0.0001);
        }
        let s = d.push(0.001);
        assert_eq!(s.percentile, 0.0);
        assert!(s.compressed);
        assert!(!s.breakout);
    }

    #[test]
    fn test_breakout_requires_jump_while_compressed() {
        let mut d = CompressionDetector::new(&SignalConfig::default());
        for i in 0..50 {
            d.push(0.01 + f64::from(i) * 0.0001);
        }
        d.push(0.001);
        // 2× jump but still the second-lowest width in the lookback.
        let s = d.push(0.002);
        assert!(s.compressed);
        assert!(s.breakout);

        // Wide width is not compressed, so no breakout either.
        let s = d.push(0.05);
        assert!(!s.compressed);
        assert!(!s.breakout);
        assert_eq!(d.last(), Some(s));
    }
}
