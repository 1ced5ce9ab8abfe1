//! Strategy Engines - Per-market decision units.
//!
//! Every engine implements `Strategy`: given a read-only view of one
//! market (phase, signals, books, position, budget) it returns at most
//! one `Batch`. Engines never submit or mutate capital; the worker hands
//! batches to the execution engine and routes outcomes back through
//! `on_notice`.

pub mod arbitrage;
pub mod imbalance;
pub mod lag_exploit;
pub mod market_maker;
pub mod momentum;
pub mod orchestrator;
pub mod straddle;

use crate::domain::book::OrderBook;
use crate::domain::lifecycle::Phase;
use crate::domain::market::{Market, TokenSide};
use crate::domain::order::{Batch, BatchKind, OrderResult, Side, StrategyId};
use crate::domain::position::Position;
use crate::domain::signal::{MarketSignals, VolRegime};
use crate::error::RejectReason;
use crate::signals::MarketSnapshot;

pub use arbitrage::ArbitrageStrategy;
pub use imbalance::{ImbalanceDecision, ImbalanceHandler};
pub use lag_exploit::LagExploitStrategy;
pub use market_maker::{AdverseAction, MarketMakerStrategy};
pub use momentum::MomentumStrategy;
pub use orchestrator::{Orchestrator, StrategySet};
pub use straddle::{PullbackState, PullbackWatch, StraddleStrategy};

/// Smallest notional worth sending (USD).
pub const MIN_NOTIONAL: f64 = 0.50;

/// Read-only inputs to one strategy evaluation.
#[derive(Debug, Clone, Copy)]
pub struct StrategyContext<'a> {
    /// Market being evaluated.
    pub market: &'a Market,
    /// Lifecycle phase at `now_ms`.
    pub phase: Phase,
    /// Signals and books.
    pub snapshot: &'a MarketSnapshot,
    /// Current position in this market.
    pub position: &'a Position,
    /// Available capital (USD).
    pub capital: f64,
    /// Capital this strategy may commit this cycle (USD).
    pub budget: f64,
    /// Risk-manager size multiplier.
    pub size_multiplier: f64,
    /// Evaluation time (Unix ms).
    pub now_ms: u64,
}

impl<'a> StrategyContext<'a> {
    /// Derived signals.
    pub const fn signals(&self) -> &'a MarketSignals {
        &self.snapshot.signals
    }

    /// Volatility regime.
    pub const fn regime(&self) -> VolRegime {
        self.snapshot.signals.regime
    }

    /// Book for one token.
    pub const fn book(&self, side: TokenSide) -> &'a OrderBook {
        self.snapshot.book(side)
    }

    /// Seconds until expiry.
    pub fn seconds_remaining(&self) -> f64 {
        self.market.seconds_remaining(self.now_ms)
    }

    /// Same context with a different budget.
    #[must_use]
    pub const fn with_budget(mut self, budget: f64) -> Self {
        self.budget = budget;
        self
    }
}

/// Fill outcome of one leg of a paired batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LegFill {
    /// Token traded.
    pub token: TokenSide,
    /// Shares requested.
    pub requested: f64,
    /// Shares filled.
    pub filled: f64,
    /// Average fill price (limit price when nothing filled).
    pub avg_price: f64,
}

/// Both legs of a paired batch once their immediate fills are known.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairReport {
    /// Legs in submission order.
    pub legs: [LegFill; 2],
}

impl PairReport {
    /// Leg for one token.
    pub fn leg(&self, token: TokenSide) -> Option<&LegFill> {
        self.legs.iter().find(|l| l.token == token)
    }

    /// Shares filled on both legs.
    pub fn matched(&self) -> f64 {
        self.legs[0].filled.min(self.legs[1].filled)
    }

    /// Whether either leg filled below `min_ratio` of its request.
    pub fn is_short(&self, min_ratio: f64) -> bool {
        self.legs
            .iter()
            .any(|l| l.requested > 0.0 && l.filled < l.requested * min_ratio)
    }

    /// Profit locked by the matched shares.
    pub fn locked_profit(&self) -> f64 {
        self.matched() * (1.0 - self.legs[0].avg_price - self.legs[1].avg_price)
    }
}

/// Outcome of a batch, routed back to the strategy that produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum StrategyNotice {
    /// Nothing was sent: lost same-cycle conflict resolution, or the
    /// market's resting quotes could not be cancelled first.
    Dropped,
    /// Refused before submission.
    Rejected {
        /// Why.
        reason: RejectReason,
    },
    /// Submission failed on the wire; exchange state unknown.
    SubmitFailed,
    /// Batch reached the exchange.
    Submitted {
        /// Batch semantics.
        kind: BatchKind,
        /// Per-order immediate results, in batch order.
        results: Vec<OrderResult>,
    },
    /// Immediate fills of a paired batch are known.
    PairFilled(PairReport),
    /// A fill on one of this strategy's orders.
    Filled {
        /// Token traded.
        token: TokenSide,
        /// Buy or sell.
        side: Side,
        /// Fill price.
        price: f64,
        /// Shares filled.
        size: f64,
    },
}

/// Common decision contract.
pub trait Strategy: Send {
    /// Which engine this is.
    fn id(&self) -> StrategyId;

    /// Decide on at most one batch for this market.
    fn evaluate(&mut self, ctx: &StrategyContext<'_>) -> Option<Batch>;

    /// Outcome of a batch this engine produced.
    fn on_notice(&mut self, _notice: &StrategyNotice) {}

    /// Called instead of `evaluate` while the engine is not allowed to
    /// run (regime, capital tier, spent budget). Resting orders may be
    /// pulled here.
    fn suspend(&mut self, _ctx: &StrategyContext<'_>) -> Option<Batch> {
        None
    }
}

/// Round a price down to the cent tick, inside (0, 1).
pub fn floor_tick(price: f64) -> f64 {
    ((price * 100.0 + 1e-9).floor() / 100.0).clamp(0.01, 0.99)
}

/// Round a price up to the cent tick, inside (0, 1).
pub fn ceil_tick(price: f64) -> f64 {
    ((price * 100.0 - 1e-9).ceil() / 100.0).clamp(0.01, 0.99)
}
