//! One-minute spot bars built from ticks and trades.
//!
//! Feeds the ATR regime classifier, the bias trend/momentum inputs and
//! the Bollinger-band-width compression detector. Order flow is taken
//! from the tape at finer resolution.

use std::collections::VecDeque;

use crate::domain::order::Side;

const BAR_MS: u64 = 60_000;

/// One-minute OHLC bar with aggressor volume split.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bar {
    /// Bucket start (Unix ms, minute aligned).
    pub open_ms: u64,
    /// First price.
    pub open: f64,
    /// Highest price.
    pub high: f64,
    /// Lowest price.
    pub low: f64,
    /// Last price.
    pub close: f64,
    /// Buyer-initiated volume.
    pub buy_volume: f64,
    /// Seller-initiated volume.
    pub sell_volume: f64,
}

impl Bar {
    fn new(open_ms: u64, price: f64) -> Self {
        Self {
            open_ms,
            open: price,
            high: price,
            low: price,
            close: price,
            buy_volume: 0.0,
            sell_volume: 0.0,
        }
    }

    fn update(&mut self, price: f64) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
    }

    fn true_range(&self, prev_close: Option<f64>) -> f64 {
        let hl = self.high - self.low;
        prev_close.map_or(hl, |pc| {
            hl.max((self.high - pc).abs()).max((self.low - pc).abs())
        })
    }
}

/// Rolling window of one-minute bars, oldest first. The last bar may
/// still be forming.
#[derive(Debug, Clone)]
pub struct BarSeries {
    bars: VecDeque<Bar>,
    capacity: usize,
}

impl BarSeries {
    /// Empty series holding at most `capacity` bars.
    pub fn new(capacity: usize) -> Self {
        Self {
            bars: VecDeque::with_capacity(capacity),
            capacity: capacity.max(2),
        }
    }

    /// Fold a price observation in. Returns the bar that just closed,
    /// if this observation started a new minute.
    pub fn on_price(&mut self, ts_ms: u64, price: f64) -> Option<Bar> {
        let bucket = ts_ms - ts_ms % BAR_MS;
        match self.bars.back().map(|b| b.open_ms) {
            // Same minute, or a late print for a closed one: fold into current.
            Some(open_ms) if open_ms >= bucket => {
                if let Some(bar) = self.bars.back_mut() {
                    bar.update(price);
                }
                None
            }
            Some(_) => {
                let closed = self.bars.back().copied();
                self.push(Bar::new(bucket, price));
                closed
            }
            None => {
                self.push(Bar::new(bucket, price));
                None
            }
        }
    }

    /// Fold a trade in: price plus aggressor volume.
    pub fn on_trade(&mut self, ts_ms: u64, price: f64, size: f64, aggressor: Side) -> Option<Bar> {
        let closed = self.on_price(ts_ms, price);
        if let Some(bar) = self.bars.back_mut() {
            match aggressor {
                Side::Buy => bar.buy_volume += size,
                Side::Sell => bar.sell_volume += size,
            }
        }
        closed
    }

    fn push(&mut self, bar: Bar) {
        if self.bars.len() >= self.capacity {
            self.bars.pop_front();
        }
        self.bars.push_back(bar);
    }

    /// Latest bar.
    pub fn latest(&self) -> Option<&Bar> {
        self.bars.back()
    }

    /// Number of bars held.
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    /// Whether no bar has started yet.
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Average true range over the last `periods` bars.
    #[allow(clippy::cast_precision_loss)]
    pub fn atr(&self, periods: usize) -> Option<f64> {
        if self.bars.is_empty() || periods == 0 {
            return None;
        }
        let start = self.bars.len().saturating_sub(periods);
        let mut sum = 0.0;
        let mut n = 0usize;
        for i in start..self.bars.len() {
            let prev = i.checked_sub(1).map(|j| self.bars[j].close);
            sum += self.bars[i].true_range(prev);
            n += 1;
        }
        Some(sum / n as f64)
    }

    /// Fractional change of the latest close over the previous close
    /// (or over its own open while only one bar exists).
    pub fn momentum_pct(&self) -> Option<f64> {
        let last = self.bars.back()?;
        let base = if self.bars.len() >= 2 {
            self.bars[self.bars.len() - 2].close
        } else {
            last.open
        };
        (base > 0.0).then(|| (last.close - base) / base)
    }

    /// Exponential moving average of closes.
    #[allow(clippy::cast_precision_loss)]
    pub fn ema(&self, period: usize) -> Option<f64> {
        let first = self.bars.front()?;
        let k = 2.0 / (period as f64 + 1.0);
        Some(
            self.bars
                .iter()
                .skip(1)
                .fold(first.close, |ema, b| b.close.mul_add(k, ema * (1.0 - k))),
        )
    }

    /// Bollinger band width (4σ / mean) over the last `period` closes.
    #[allow(clippy::cast_precision_loss)]
    pub fn band_width(&self, period: usize) -> Option<f64> {
        if period < 2 || self.bars.len() < period {
            return None;
        }
        let closes: Vec<f64> = self.bars.iter().rev().take(period).map(|b| b.close).collect();
        let n = closes.len() as f64;
        let mean = closes.iter().sum::<f64>() / n;
        if mean <= 0.0 {
            return None;
        }
        let var = closes.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / n;
        Some(4.0 * var.sqrt() / mean)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bars_roll_on_minute_boundary() {
        let mut s = BarSeries::new(10);
        assert!(s.on_price(0, 100.0).is_none());
        assert!(s.on_price(30_000, 104.0).is_none());
        let closed = s.on_price(60_000, 101.0).unwrap();
        assert_eq!(closed.high, 104.0);
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn test_atr_uses_previous_close() {
        let mut s = BarSeries::new(10);
        s.on_price(0, 100.0);
        s.on_price(1_000, 110.0);
        s.on_price(60_000, 90.0);
        // bar1 TR = 10; bar2 TR = max(0, |90-110|, |90-110|) = 20
        assert!((s.atr(14).unwrap() - 15.0).abs() < 1e-9);
        assert!((s.atr(1).unwrap() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_momentum_and_trade_volume() {
        let mut s = BarSeries::new(10);
        s.on_trade(0, 100.0, 5.0, Side::Buy);
        s.on_trade(60_000, 101.0, 2.0, Side::Sell);
        assert!((s.momentum_pct().unwrap() - 0.01).abs() < 1e-9);
        let last = s.latest().unwrap();
        assert!((last.sell_volume - 2.0).abs() < 1e-9);
        assert_eq!(last.buy_volume, 0.0);
    }

    #[test]
    fn test_band_width_needs_full_period() {
        let mut s = BarSeries::new(50);
        for i in 0..5u64 {
            s.on_price(i * 60_000, 100.0);
        }
        assert!(s.band_width(20).is_none());
        assert_eq!(s.band_width(5), Some(0.0));
    }
}
