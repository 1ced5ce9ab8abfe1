//! Per-token order book.
//!
//! Levels are kept as sorted `(price, size)` vectors: bids descending,
//! asks ascending. Books are shallow (tens of levels) so linear upserts
//! beat a tree map here.

use serde::{Deserialize, Serialize};

use super::market::TokenId;

/// Slack for float comparisons on cent-grid prices.
const PRICE_EPS: f64 = 1e-9;

/// One price level.
pub type Level = (f64, f64);

/// Order book for a single outcome token.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderBook {
    /// Token this book belongs to.
    pub token_id: TokenId,
    /// Bids, best (highest) first.
    bids: Vec<Level>,
    /// Asks, best (lowest) first.
    asks: Vec<Level>,
    /// Timestamp of the last applied update (Unix ms).
    pub updated_ms: u64,
}

impl OrderBook {
    /// Empty book for a token.
    pub fn new(token_id: impl Into<TokenId>) -> Self {
        Self {
            token_id: token_id.into(),
            ..Self::default()
        }
    }

    /// Replace both sides with a full snapshot.
    pub fn apply_snapshot(&mut self, bids: &[Level], asks: &[Level], ts_ms: u64) {
        self.bids = bids.iter().copied().filter(|l| is_live(*l)).collect();
        self.asks = asks.iter().copied().filter(|l| is_live(*l)).collect();
        self.bids.sort_by(|a, b| b.0.total_cmp(&a.0));
        self.asks.sort_by(|a, b| a.0.total_cmp(&b.0));
        self.updated_ms = ts_ms;
    }

    /// Apply incremental level changes. A size of zero removes the level.
    pub fn apply_delta(&mut self, bids: &[Level], asks: &[Level], ts_ms: u64) {
        for level in bids {
            upsert(&mut self.bids, *level, |a, b| b.total_cmp(&a));
        }
        for level in asks {
            upsert(&mut self.asks, *level, |a, b| a.total_cmp(&b));
        }
        self.updated_ms = ts_ms;
    }

    /// Best bid price.
    pub fn best_bid(&self) -> Option<f64> {
        self.bids.first().map(|l| l.0)
    }

    /// Best ask price.
    pub fn best_ask(&self) -> Option<f64> {
        self.asks.first().map(|l| l.0)
    }

    /// Midpoint of best bid and ask.
    pub fn mid(&self) -> Option<f64> {
        Some((self.best_bid()? + self.best_ask()?) / 2.0)
    }

    /// Best ask minus best bid.
    pub fn spread(&self) -> Option<f64> {
        Some(self.best_ask()? - self.best_bid()?)
    }

    /// Shares offered within `tolerance` price points of the best ask.
    pub fn ask_depth_within(&self, tolerance: f64) -> f64 {
        self.best_ask().map_or(0.0, |best| {
            self.asks
                .iter()
                .take_while(|l| l.0 <= best + tolerance + PRICE_EPS)
                .map(|l| l.1)
                .sum()
        })
    }

    /// Shares bid within `tolerance` price points of the best bid.
    pub fn bid_depth_within(&self, tolerance: f64) -> f64 {
        self.best_bid().map_or(0.0, |best| {
            self.bids
                .iter()
                .take_while(|l| l.0 >= best - tolerance - PRICE_EPS)
                .map(|l| l.1)
                .sum()
        })
    }

    /// Shares offered at or below `limit`.
    pub fn ask_size_at_or_below(&self, limit: f64) -> f64 {
        self.asks
            .iter()
            .take_while(|l| l.0 <= limit + PRICE_EPS)
            .map(|l| l.1)
            .sum()
    }

    /// Shares bid at or above `limit`.
    pub fn bid_size_at_or_above(&self, limit: f64) -> f64 {
        self.bids
            .iter()
            .take_while(|l| l.0 >= limit - PRICE_EPS)
            .map(|l| l.1)
            .sum()
    }

    /// Bid levels, best first.
    pub fn bids(&self) -> &[Level] {
        &self.bids
    }

    /// Ask levels, best first.
    pub fn asks(&self) -> &[Level] {
        &self.asks
    }

    /// Whether either side is empty.
    pub fn is_one_sided(&self) -> bool {
        self.bids.is_empty() || self.asks.is_empty()
    }
}

fn is_live(level: Level) -> bool {
    level.0.is_finite() && level.1.is_finite() && level.1 > 0.0
}

fn upsert(side: &mut Vec<Level>, level: Level, order: impl Fn(f64, f64) -> std::cmp::Ordering) {
    let pos = side.binary_search_by(|probe| order(probe.0, level.0));
    match (pos, is_live(level)) {
        (Ok(i), true) => side[i].1 = level.1,
        (Ok(i), false) => {
            side.remove(i);
        }
        (Err(i), true) => side.insert(i, level),
        (Err(_), false) => {}
    }
}
