//! Signal Engine - Derived signals from ingested feed state.
//!
//! Owns per-asset spot state (bars, tape, compression history) and the
//! outcome-token books, and turns them into a `MarketSignals` snapshot
//! for any active market on demand. Events are applied in arrival order;
//! nothing here performs I/O.

pub mod arb;
pub mod bars;
pub mod bias;
pub mod compression;
pub mod momentum;
pub mod probability;
pub mod tape;
pub mod volatility;

use std::collections::HashMap;

use crate::config::SignalConfig;
use crate::domain::book::OrderBook;
use crate::domain::market::{Asset, Market, MarketId, TokenId, TokenSide};
use crate::domain::signal::{BiasSignal, MarketSignals, VolRegime};
use crate::ports::feed::FeedEvent;

pub use arb::ArbScanner;
pub use bars::{Bar, BarSeries};
pub use bias::{BiasComponents, BiasDetector, RawBiasInputs};
pub use compression::CompressionDetector;
pub use momentum::MomentumDetector;
pub use probability::{fair_prob_up, normal_cdf};
pub use tape::Tape;
pub use volatility::classify_regime;

/// Bars retained per asset.
const BAR_HISTORY: usize = 240;
const EMA_FAST: usize = 5;
const EMA_SLOW: usize = 20;

/// Spot-side state for one asset.
#[derive(Debug, Clone)]
struct AssetState {
    bars: BarSeries,
    tape: Tape,
    compression: CompressionDetector,
    last_price: Option<f64>,
    last_tick_ms: Option<u64>,
}

impl AssetState {
    fn new(config: &SignalConfig) -> Self {
        Self {
            bars: BarSeries::new(BAR_HISTORY),
            tape: Tape::new(config),
            compression: CompressionDetector::new(config),
            last_price: None,
            last_tick_ms: None,
        }
    }

    fn on_price(&mut self, ts_ms: u64, price: f64) {
        self.last_price = Some(price);
        self.last_tick_ms = Some(self.last_tick_ms.map_or(ts_ms, |t| t.max(ts_ms)));
    }
}

/// An active market plus its token momentum tracker.
#[derive(Debug, Clone)]
struct MarketEntry {
    market: Market,
    momentum: MomentumDetector,
}

/// Signals plus the two books they were computed from.
#[derive(Debug, Clone)]
pub struct MarketSnapshot {
    /// Derived signals.
    pub signals: MarketSignals,
    /// YES book at snapshot time.
    pub yes_book: OrderBook,
    /// NO book at snapshot time.
    pub no_book: OrderBook,
}

impl MarketSnapshot {
    /// Book for one side.
    pub const fn book(&self, side: TokenSide) -> &OrderBook {
        match side {
            TokenSide::Yes => &self.yes_book,
            TokenSide::No => &self.no_book,
        }
    }
}

/// Stateful signal computation over the merged feed stream.
#[derive(Debug, Clone)]
pub struct SignalEngine {
    config: SignalConfig,
    bias: BiasDetector,
    arb: ArbScanner,
    assets: HashMap<Asset, AssetState>,
    books: HashMap<TokenId, OrderBook>,
    markets: HashMap<MarketId, MarketEntry>,
    token_index: HashMap<TokenId, MarketId>,
}

impl SignalEngine {
    /// Engine with empty state.
    pub fn new(config: SignalConfig) -> Self {
        let assets = Asset::ALL
            .iter()
            .map(|a| (*a, AssetState::new(&config)))
            .collect();
        Self {
            bias: BiasDetector::new(&config),
            arb: ArbScanner::new(&config),
            config,
            assets,
            books: HashMap::new(),
            markets: HashMap::new(),
            token_index: HashMap::new(),
        }
    }

    /// Start tracking a market. Its books are created empty.
    pub fn add_market(&mut self, market: Market) {
        for token in [&market.yes_token, &market.no_token] {
            self.books
                .entry(token.clone())
                .or_insert_with(|| OrderBook::new(token.clone()));
            self.token_index.insert(token.clone(), market.id.clone());
        }
        self.markets.insert(
            market.id.clone(),
            MarketEntry {
                momentum: MomentumDetector::new(&self.config),
                market,
            },
        );
    }

    /// Stop tracking a market and drop its books.
    pub fn remove_market(&mut self, market_id: &str) -> Option<Market> {
        let entry = self.markets.remove(market_id)?;
        for token in [&entry.market.yes_token, &entry.market.no_token] {
            self.books.remove(token);
            self.token_index.remove(token);
        }
        Some(entry.market)
    }

    /// Tracked market by id.
    pub fn market(&self, market_id: &str) -> Option<&Market> {
        self.markets.get(market_id).map(|e| &e.market)
    }

    /// Number of tracked markets.
    pub fn market_count(&self) -> usize {
        self.markets.len()
    }

    /// Book for a token, if tracked.
    pub fn book(&self, token_id: &str) -> Option<&OrderBook> {
        self.books.get(token_id)
    }

    /// Fold one event into state. Returns the markets whose signals may
    /// have changed.
    pub fn apply(&mut self, event: &FeedEvent) -> Vec<MarketId> {
        match event {
            FeedEvent::SpotTick {
                asset,
                price,
                ts_ms,
            } => {
                if let Some(state) = self.assets.get_mut(asset) {
                    state.on_price(*ts_ms, *price);
                    state.tape.on_tick(*ts_ms, *price);
                    if state.bars.on_price(*ts_ms, *price).is_some() {
                        Self::on_bar_close(state, self.config.bb_period);
                    }
                }
                self.markets_for(*asset)
            }
            FeedEvent::SpotTrade {
                asset,
                price,
                size,
                side,
                ts_ms,
            } => {
                if let Some(state) = self.assets.get_mut(asset) {
                    state.on_price(*ts_ms, *price);
                    state.tape.on_trade(*ts_ms, *price, *size, *side);
                    if state.bars.on_trade(*ts_ms, *price, *size, *side).is_some() {
                        Self::on_bar_close(state, self.config.bb_period);
                    }
                }
                self.markets_for(*asset)
            }
            FeedEvent::Liquidation {
                asset,
                side,
                notional,
                ts_ms,
            } => {
                if let Some(state) = self.assets.get_mut(asset) {
                    state.tape.on_liquidation(*ts_ms, *side, *notional);
                }
                self.markets_for(*asset)
            }
            FeedEvent::FundingRate { asset, rate, .. } => {
                if let Some(state) = self.assets.get_mut(asset) {
                    state.tape.on_funding(*rate);
                }
                self.markets_for(*asset)
            }
            FeedEvent::Book {
                token_id,
                bids,
                asks,
                snapshot,
                ts_ms,
            } => {
                let Some(market_id) = self.token_index.get(token_id).cloned() else {
                    return Vec::new();
                };
                let Some(book) = self.books.get_mut(token_id) else {
                    return Vec::new();
                };
                if *snapshot {
                    book.apply_snapshot(bids, asks, *ts_ms);
                } else {
                    book.apply_delta(bids, asks, *ts_ms);
                }
                let mid = book.mid();
                if let (Some(entry), Some(mid)) = (self.markets.get_mut(&market_id), mid) {
                    if entry.market.side_of(token_id) == Some(TokenSide::Yes) {
                        entry.momentum.push(*ts_ms, mid);
                    }
                }
                vec![market_id]
            }
            FeedEvent::MarketListed { market } => {
                self.add_market(market.clone());
                vec![market.id.clone()]
            }
            FeedEvent::MarketResolved { .. } => Vec::new(),
        }
    }

    fn on_bar_close(state: &mut AssetState, bb_period: usize) {
        if let Some(width) = state.bars.band_width(bb_period) {
            state.compression.push(width);
        }
    }

    fn markets_for(&self, asset: Asset) -> Vec<MarketId> {
        self.markets
            .values()
            .filter(|e| e.market.asset == asset)
            .map(|e| e.market.id.clone())
            .collect()
    }

    /// Whether the spot feed for `asset` has gone silent.
    pub fn is_stale(&self, asset: Asset, now_ms: u64) -> bool {
        self.assets
            .get(&asset)
            .and_then(|s| s.last_tick_ms)
            .is_none_or(|t| now_ms.saturating_sub(t) > self.config.stale_after_ms)
    }

    /// Volatility regime of an asset. Without bar history the regime is
    /// assumed MEDIUM.
    pub fn regime(&self, asset: Asset) -> VolRegime {
        self.assets
            .get(&asset)
            .and_then(|s| s.bars.atr(self.config.atr_periods))
            .map_or(VolRegime::Medium, |atr| {
                classify_regime(atr, self.config.atr_thresholds.for_asset(asset))
            })
    }

    /// Bias for an asset at `now_ms`.
    pub fn bias(&self, asset: Asset, now_ms: u64) -> BiasSignal {
        let Some(state) = self.assets.get(&asset) else {
            return BiasSignal::neutral();
        };
        let (Some(price), Some(momentum_pct)) = (state.last_price, state.bars.momentum_pct())
        else {
            return BiasSignal::neutral();
        };
        let ema_spread = match (state.bars.ema(EMA_FAST), state.bars.ema(EMA_SLOW)) {
            (Some(fast), Some(slow)) => fast - slow,
            _ => 0.0,
        };
        let (flow_delta, flow_volume) = state.tape.flow(now_ms);
        let raw = RawBiasInputs {
            momentum_pct,
            ema_spread,
            price,
            flow_delta,
            flow_volume,
            funding_rate: state.tape.funding_rate(),
            net_liquidation: state.tape.net_liquidation(now_ms),
        };
        self.bias.detect(&self.bias.normalize(&raw))
    }

    /// Compute every signal for one market.
    pub fn snapshot(&self, market_id: &str, now_ms: u64) -> Option<MarketSnapshot> {
        let entry = self.markets.get(market_id)?;
        let market = &entry.market;
        let state = self.assets.get(&market.asset)?;
        let yes_book = self.books.get(&market.yes_token)?;
        let no_book = self.books.get(&market.no_token)?;

        let regime = self.regime(market.asset);
        let fair_prob_up = state.last_price.map_or(0.5, |spot| {
            fair_prob_up(
                spot,
                market.reference_price,
                self.config.annual_vol_for(market.asset),
                market.minutes_remaining(now_ms),
            )
        });

        let signals = MarketSignals {
            regime,
            spot_price: state.last_price,
            fair_prob_up,
            bias: self.bias(market.asset, now_ms),
            arb: self
                .arb
                .scan(yes_book, no_book, self.config.fill_probability_for(regime)),
            momentum: entry.momentum.detect(fair_prob_up),
            compression: state.compression.last(),
            tape: state.tape.signal(now_ms),
            stale: self.is_stale(market.asset, now_ms),
            computed_ms: now_ms,
        };

        Some(MarketSnapshot {
            signals,
            yes_book: yes_book.clone(),
            no_book: no_book.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::DurationClass;

    fn market() -> Market {
        Market {
            id: "btc-5m".into(),
            asset: Asset::BTC,
            duration: DurationClass::FiveMin,
            open_ms: 0,
            expiry_ms: 300_000,
            reference_price: 100_000.0,
            yes_token: "yes".into(),
            no_token: "no".into(),
        }
    }

    fn book(token: &str, bid: f64, ask: f64, size: f64) -> FeedEvent {
        FeedEvent::Book {
            token_id: token.into(),
            bids: vec![(bid, size)],
            asks: vec![(ask, size)],
            snapshot: true,
            ts_ms: 1_000,
        }
    }

    #[test]
    fn test_arb_flows_into_snapshot() {
        let mut engine = SignalEngine::new(SignalConfig::default());
        engine.add_market(market());
        assert_eq!(engine.apply(&book("yes", 0.44, 0.45, 100.0)), vec!["btc-5m".to_string()]);
        engine.apply(&book("no", 0.42, 0.43, 100.0));

        let snap = engine.snapshot("btc-5m", 1_000).unwrap();
        let arb = snap.signals.arb.unwrap();
        assert!((arb.expected_profit - 12.0).abs() < 1e-9);
        // No spot data yet: medium regime, even odds, stale feed.
        assert_eq!(snap.signals.regime, VolRegime::Medium);
        assert!((snap.signals.fair_prob_up - 0.5).abs() < 1e-12);
        assert!(snap.signals.stale);
        assert_eq!(snap.book(TokenSide::No).best_ask(), Some(0.43));
    }

    #[test]
    fn test_spot_tick_updates_fair_probability() {
        let mut engine = SignalEngine::new(SignalConfig::default());
        engine.add_market(market());
        let touched = engine.apply(&FeedEvent::SpotTick {
            asset: Asset::BTC,
            price: 100_100.0,
            ts_ms: 180_000,
        });
        assert_eq!(touched.len(), 1);
        let snap = engine.snapshot("btc-5m", 180_000).unwrap();
        assert!(snap.signals.fair_prob_up > 0.8);
        assert!(!snap.signals.stale);
        assert!(engine.is_stale(Asset::BTC, 186_000));
        assert!(engine.is_stale(Asset::ETH, 180_000));
    }

    #[test]
    fn test_unknown_token_is_ignored() {
        let mut engine = SignalEngine::new(SignalConfig::default());
        assert!(engine.apply(&book("other", 0.4, 0.5, 10.0)).is_empty());
    }

    #[test]
    fn test_remove_market_drops_books() {
        let mut engine = SignalEngine::new(SignalConfig::default());
        engine.apply(&FeedEvent::MarketListed { market: market() });
        assert_eq!(engine.market_count(), 1);
        assert!(engine.remove_market("btc-5m").is_some());
        assert!(engine.book("yes").is_none());
        assert!(engine.snapshot("btc-5m", 0).is_none());
    }
}
