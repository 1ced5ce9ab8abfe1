//! Short-window spot tape: recent ticks, aggressor trades, liquidations
//! and the latest funding rate for one asset.
//!
//! Answers the windowed questions the bias detector and the market
//! maker's adverse-selection check ask: order-flow delta, 1-second
//! move, flow imbalance and liquidation cascades.

use std::collections::VecDeque;

use crate::config::SignalConfig;
use crate::domain::order::Side;
use crate::domain::signal::TapeSignal;
use crate::ports::feed::LiquidatedSide;

/// Tick history kept for the 1-second move.
const TICK_WINDOW_MS: u64 = 5_000;
const MOVE_WINDOW_MS: u64 = 1_000;

#[derive(Debug, Clone, Copy)]
struct TapeTrade {
    ts_ms: u64,
    size: f64,
    aggressor: Side,
}

#[derive(Debug, Clone, Copy)]
struct Liquidation {
    ts_ms: u64,
    side: LiquidatedSide,
    notional: f64,
}

/// Windowed tape for one asset.
#[derive(Debug, Clone)]
pub struct Tape {
    ticks: VecDeque<(u64, f64)>,
    trades: VecDeque<TapeTrade>,
    liquidations: VecDeque<Liquidation>,
    funding_rate: f64,
    flow_window_ms: u64,
    adverse_window_ms: u64,
    liquidation_window_ms: u64,
    cascade_notional: f64,
}

impl Tape {
    /// Empty tape with windows from config.
    pub fn new(config: &SignalConfig) -> Self {
        Self {
            ticks: VecDeque::new(),
            trades: VecDeque::new(),
            liquidations: VecDeque::new(),
            funding_rate: 0.0,
            flow_window_ms: config.flow_window_secs * 1_000,
            adverse_window_ms: config.adverse_flow_window_secs * 1_000,
            liquidation_window_ms: config.liquidation_window_secs * 1_000,
            cascade_notional: config.cascade_notional,
        }
    }

    /// Record a spot price.
    pub fn on_tick(&mut self, ts_ms: u64, price: f64) {
        self.ticks.push_back((ts_ms, price));
        let cutoff = ts_ms.saturating_sub(TICK_WINDOW_MS);
        while self.ticks.front().is_some_and(|(t, _)| *t < cutoff) {
            self.ticks.pop_front();
        }
    }

    /// Record an aggressor trade.
    pub fn on_trade(&mut self, ts_ms: u64, price: f64, size: f64, aggressor: Side) {
        self.on_tick(ts_ms, price);
        self.trades.push_back(TapeTrade {
            ts_ms,
            size,
            aggressor,
        });
        let cutoff = ts_ms.saturating_sub(self.flow_window_ms.max(self.adverse_window_ms));
        while self.trades.front().is_some_and(|t| t.ts_ms < cutoff) {
            self.trades.pop_front();
        }
    }

    /// Record a liquidation.
    pub fn on_liquidation(&mut self, ts_ms: u64, side: LiquidatedSide, notional: f64) {
        self.liquidations.push_back(Liquidation {
            ts_ms,
            side,
            notional,
        });
        let cutoff = ts_ms.saturating_sub(self.liquidation_window_ms);
        while self.liquidations.front().is_some_and(|l| l.ts_ms < cutoff) {
            self.liquidations.pop_front();
        }
    }

    /// Record the latest funding rate.
    pub fn on_funding(&mut self, rate: f64) {
        self.funding_rate = rate;
    }

    /// Latest funding rate.
    pub const fn funding_rate(&self) -> f64 {
        self.funding_rate
    }

    /// Buy minus sell volume and total volume over the flow window.
    pub fn flow(&self, now_ms: u64) -> (f64, f64) {
        self.volumes(now_ms.saturating_sub(self.flow_window_ms))
            .map_or((0.0, 0.0), |(buy, sell, _)| (buy - sell, buy + sell))
    }

    /// Long minus short liquidation notional over the window.
    pub fn net_liquidation(&self, now_ms: u64) -> f64 {
        let cutoff = now_ms.saturating_sub(self.liquidation_window_ms);
        self.liquidations
            .iter()
            .filter(|l| l.ts_ms >= cutoff)
            .map(|l| match l.side {
                LiquidatedSide::Long => l.notional,
                LiquidatedSide::Short => -l.notional,
            })
            .sum()
    }

    /// Adverse-selection inputs at `now_ms`.
    pub fn signal(&self, now_ms: u64) -> TapeSignal {
        let liq_cutoff = now_ms.saturating_sub(self.liquidation_window_ms);
        let liq_total: f64 = self
            .liquidations
            .iter()
            .filter(|l| l.ts_ms >= liq_cutoff)
            .map(|l| l.notional)
            .sum();

        TapeSignal {
            move_1s: self.move_1s(),
            flow_imbalance: self.flow_imbalance(now_ms),
            liquidation_cascade: self.cascade_notional > 0.0 && liq_total >= self.cascade_notional,
        }
    }

    /// Fractional move from the price one second before the latest tick.
    fn move_1s(&self) -> f64 {
        let Some(&(last_ts, last)) = self.ticks.back() else {
            return 0.0;
        };
        let target = last_ts.saturating_sub(MOVE_WINDOW_MS);
        let base = self
            .ticks
            .iter()
            .rev()
            .find(|(t, _)| *t <= target)
            .or_else(|| self.ticks.front())
            .map_or(last, |(_, p)| *p);
        if base > 0.0 { (last - base) / base } else { 0.0 }
    }

    /// Net aggressor volume over the short window in units of the mean
    /// trade size.
    #[allow(clippy::cast_precision_loss)]
    fn flow_imbalance(&self, now_ms: u64) -> f64 {
        self.volumes(now_ms.saturating_sub(self.adverse_window_ms))
            .map_or(0.0, |(buy, sell, count)| {
                let mean = (buy + sell) / count as f64;
                if mean > 0.0 { (buy - sell) / mean } else { 0.0 }
            })
    }

    fn volumes(&self, cutoff: u64) -> Option<(f64, f64, usize)> {
        let mut buy = 0.0;
        let mut sell = 0.0;
        let mut count = 0usize;
        for t in self.trades.iter().filter(|t| t.ts_ms >= cutoff) {
            match t.aggressor {
                Side::Buy => buy += t.size,
                Side::Sell => sell += t.size,
            }
            count += 1;
        }
        (count > 0).then_some((buy, sell, count))
    }
}
