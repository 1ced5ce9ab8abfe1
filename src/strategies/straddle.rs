//! Straddle+Bias engine.
//!
//! Phase 1 buys both legs when the asks sum below the straddle ceiling,
//! locking in `1 - combined` per matched share. Phase 2, when a bias is
//! declared, waits a bounded window for a pullback on the favored token
//! and adds a directional leg sized off the locked profit.

use tracing::{debug, info};

use crate::config::{PullbackMinMode, StraddleConfig};
use crate::domain::lifecycle::Phase;
use crate::domain::market::TokenSide;
use crate::domain::order::{Batch, BatchKind, OrderIntent, OrderType, Side, StrategyId};

use super::{StrategyContext, Strategy, StrategyNotice};

const PRICE_EPS: f64 = 1e-9;
/// Smallest straddle worth sending (shares per leg).
const MIN_STRADDLE_SHARES: f64 = 1.0;
/// Smallest Phase-2 add (shares).
const MIN_ADD_SHARES: f64 = 0.5;
/// Confidence scaling floor for the Phase-2 add.
const MIN_CONFIDENCE_SCALE: f64 = 0.3;

// ────────────────────────────────────────────
// Pullback watcher
// ────────────────────────────────────────────

/// Result of one pullback observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullbackState {
    /// Still waiting.
    Waiting,
    /// Dip and rebound seen: add now.
    Triggered,
    /// Window elapsed without a qualifying pullback.
    Expired,
}

/// Bounded wait for a dip-then-rebound on one token.
#[derive(Debug, Clone, PartialEq)]
pub struct PullbackWatch {
    /// Token being watched.
    pub token: TokenSide,
    /// Bias confidence when the watch started.
    pub confidence: f64,
    entry: f64,
    min: f64,
    started_ms: u64,
    window_ms: u64,
    drop: f64,
    rebound: f64,
    mode: PullbackMinMode,
}

impl PullbackWatch {
    /// Start watching at `entry` price.
    pub fn new(
        token: TokenSide,
        confidence: f64,
        entry: f64,
        started_ms: u64,
        config: &StraddleConfig,
    ) -> Self {
        Self {
            token,
            confidence,
            entry,
            min: entry,
            started_ms,
            window_ms: config.pullback_window_secs * 1_000,
            drop: config.pullback_drop,
            rebound: config.pullback_rebound,
            mode: config.pullback_min_mode,
        }
    }

    /// Price level at watch start.
    pub const fn entry(&self) -> f64 {
        self.entry
    }

    /// Fold in the current price.
    pub fn observe(&mut self, price: f64, now_ms: u64) -> PullbackState {
        if now_ms.saturating_sub(self.started_ms) > self.window_ms {
            return PullbackState::Expired;
        }
        let running = self.min.min(price);
        let dipped = running <= self.entry - self.drop + PRICE_EPS;
        let rebounded = price >= running + self.rebound - PRICE_EPS;
        self.min = match self.mode {
            PullbackMinMode::Continuous => running,
            PullbackMinMode::PerEvaluation => price,
        };
        if dipped && rebounded {
            PullbackState::Triggered
        } else {
            PullbackState::Waiting
        }
    }
}

// ────────────────────────────────────────────
// Engine
// ────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Stage {
    Scanning,
    PairPending,
    Entered { locked_profit: f64 },
    Watching { locked_profit: f64, watch: PullbackWatch },
    AddPending,
    Done,
}

/// Straddle+Bias engine for one market.
#[derive(Debug, Clone)]
pub struct StraddleStrategy {
    config: StraddleConfig,
    stage: Stage,
}

impl StraddleStrategy {
    /// Fresh engine.
    pub const fn new(config: StraddleConfig) -> Self {
        Self {
            config,
            stage: Stage::Scanning,
        }
    }

    /// Profit locked by the filled straddle, once known.
    pub const fn locked_profit(&self) -> Option<f64> {
        match self.stage {
            Stage::Entered { locked_profit } | Stage::Watching { locked_profit, .. } => {
                Some(locked_profit)
            }
            _ => None,
        }
    }

    /// Whether a Phase-2 pullback watch is active.
    pub const fn is_watching(&self) -> bool {
        matches!(self.stage, Stage::Watching { .. })
    }

    /// Leg size in shares: depth on both legs, capped by the capital
    /// share at the combined price.
    pub fn straddle_size(&self, yes_depth: f64, no_depth: f64, combined: f64, capital: f64) -> f64 {
        if combined <= 0.0 {
            return 0.0;
        }
        let affordable = capital * self.config.max_capital_pct / combined;
        yes_depth.min(no_depth).min(affordable).max(0.0)
    }

    /// Phase-2 add in shares.
    pub fn add_size(&self, ask: f64, depth: f64, capital: f64, locked_profit: f64, confidence: f64) -> f64 {
        if ask <= 0.0 {
            return 0.0;
        }
        let from_capital = capital * self.config.bias_max_capital_pct / ask;
        let from_profit = locked_profit.max(0.0) * self.config.profit_multiple / ask;
        let base = from_capital.min(from_profit).min(depth).max(0.0);
        let min_conf = self.config.bias_min_confidence;
        let scale = if min_conf < 1.0 {
            ((confidence - min_conf) / (1.0 - min_conf)).clamp(MIN_CONFIDENCE_SCALE, 1.0)
        } else {
            1.0
        };
        base * scale
    }

    fn enter(&mut self, ctx: &StrategyContext<'_>) -> Option<Batch> {
        let yes = ctx.book(TokenSide::Yes);
        let no = ctx.book(TokenSide::No);
        let (yes_ask, no_ask) = (yes.best_ask()?, no.best_ask()?);
        let combined = yes_ask + no_ask;
        if combined >= self.config.max_combined {
            return None;
        }

        let size = self.straddle_size(
            yes.ask_depth_within(self.config.depth_tolerance),
            no.ask_depth_within(self.config.depth_tolerance),
            combined,
            ctx.budget,
        ) * ctx.size_multiplier;
        if size < MIN_STRADDLE_SHARES {
            debug!(market = %ctx.market.id, size, combined, "Straddle too small");
            return None;
        }

        let leg = |token, price| {
            OrderIntent::new(
                ctx.market,
                token,
                Side::Buy,
                price,
                size,
                OrderType::Fak,
                StrategyId::Straddle,
                ctx.now_ms,
            )
            .ok()
        };
        let batch = Batch::paired(leg(TokenSide::Yes, yes_ask)?, leg(TokenSide::No, no_ask)?, false);

        info!(
            market = %ctx.market.id,
            yes_ask,
            no_ask,
            combined,
            size,
            "Straddle entry"
        );
        self.stage = Stage::PairPending;
        Some(batch)
    }

    fn start_watch(&mut self, ctx: &StrategyContext<'_>, locked_profit: f64) {
        if !matches!(ctx.phase, Phase::Early | Phase::Prime | Phase::Mature) {
            return;
        }
        let bias = ctx.signals().bias;
        if bias.confidence < self.config.bias_min_confidence {
            return;
        }
        let Some(token) = bias.direction.favored_token() else {
            return;
        };
        let Some(entry) = ctx.book(token).best_ask() else {
            return;
        };
        debug!(market = %ctx.market.id, %token, entry, confidence = bias.confidence, "Pullback watch started");
        self.stage = Stage::Watching {
            locked_profit,
            watch: PullbackWatch::new(token, bias.confidence, entry, ctx.now_ms, &self.config),
        };
    }

    fn watch(&mut self, ctx: &StrategyContext<'_>) -> Option<Batch> {
        let Stage::Watching {
            locked_profit,
            watch,
        } = &mut self.stage
        else {
            return None;
        };
        let locked_profit = *locked_profit;
        let (token, confidence) = (watch.token, watch.confidence);
        let book = ctx.book(token);
        let price = book.best_ask()?;

        match watch.observe(price, ctx.now_ms) {
            PullbackState::Waiting => None,
            PullbackState::Expired => {
                debug!(market = %ctx.market.id, "No pullback in window, Phase 2 skipped");
                self.stage = Stage::Done;
                None
            }
            PullbackState::Triggered => {
                self.stage = Stage::Done;
                let size = self.add_size(
                    price,
                    book.ask_depth_within(self.config.add_depth_tolerance),
                    ctx.budget,
                    locked_profit,
                    confidence,
                ) * ctx.size_multiplier;
                if size < MIN_ADD_SHARES {
                    return None;
                }
                let intent = OrderIntent::new(
                    ctx.market,
                    token,
                    Side::Buy,
                    price,
                    size,
                    OrderType::Fak,
                    StrategyId::Straddle,
                    ctx.now_ms,
                )
                .ok()?;
                info!(market = %ctx.market.id, %token, price, size, confidence, "Bias add on pullback");
                self.stage = Stage::AddPending;
                Some(Batch::single(intent))
            }
        }
    }
}

impl Strategy for StraddleStrategy {
    fn id(&self) -> StrategyId {
        StrategyId::Straddle
    }

    fn evaluate(&mut self, ctx: &StrategyContext<'_>) -> Option<Batch> {
        if !self.config.enabled || !ctx.phase.permits_new_orders() {
            if self.is_watching() {
                self.stage = Stage::Done;
            }
            return None;
        }
        match self.stage {
            Stage::Scanning => self.enter(ctx),
            Stage::Entered { locked_profit } => {
                self.start_watch(ctx, locked_profit);
                None
            }
            Stage::Watching { .. } => self.watch(ctx),
            Stage::PairPending | Stage::AddPending | Stage::Done => None,
        }
    }

    fn on_notice(&mut self, notice: &StrategyNotice) {
        self.stage = match (&self.stage, notice) {
            (Stage::PairPending, StrategyNotice::PairFilled(report)) => {
                if report.legs.iter().all(|l| l.filled <= 0.0) {
                    Stage::Scanning
                } else {
                    Stage::Entered {
                        locked_profit: report.locked_profit().max(0.0),
                    }
                }
            }
            (
                Stage::PairPending,
                StrategyNotice::Dropped | StrategyNotice::Rejected { .. },
            ) => Stage::Scanning,
            // Outcome unknown: do not re-enter on top of a possible fill.
            (Stage::PairPending | Stage::AddPending, StrategyNotice::SubmitFailed) => Stage::Done,
            (Stage::AddPending, StrategyNotice::Submitted { kind: BatchKind::Single, .. })
            | (Stage::AddPending, StrategyNotice::Dropped | StrategyNotice::Rejected { .. }) => {
                Stage::Done
            }
            (stage, _) => stage.clone(),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::position::Position;
    use crate::domain::signal::{BiasSignal, Direction, VolRegime};
    use crate::strategies::fixtures::{book, ctx, market, signals, snapshot};
    use crate::strategies::{LegFill, PairReport};

    fn filled_report() -> PairReport {
        PairReport {
            legs: [
                LegFill {
                    token: TokenSide::Yes,
                    requested: 100.0,
                    filled: 100.0,
                    avg_price: 0.45,
                },
                LegFill {
                    token: TokenSide::No,
                    requested: 100.0,
                    filled: 100.0,
                    avg_price: 0.43,
                },
            ],
        }
    }

    #[test]
    fn test_entry_sized_by_depth_and_capital() {
        let m = market();
        let snap = snapshot(
            signals(VolRegime::Medium),
            book("yes", &[(0.44, 10.0)], &[(0.45, 300.0)]),
            book("no", &[(0.42, 10.0)], &[(0.43, 300.0)]),
        );
        let pos = Position::new("btc-5m");
        let mut s = StraddleStrategy::new(StraddleConfig::default());
        // 25% of $100 at 0.88 combined = 28.4 shares
        let batch = s.evaluate(&ctx(&m, &snap, &pos, Phase::Alpha, 100.0, 1_000)).unwrap();
        assert_eq!(batch.kind, BatchKind::Paired { recheck_edge: false });
        assert!((batch.intents[0].size() - 25.0 / 0.88).abs() < 1e-9);
        assert_eq!(batch.intents[1].order_type(), OrderType::Fak);
        // Pending: no second entry.
        assert!(s.evaluate(&ctx(&m, &snap, &pos, Phase::Alpha, 100.0, 1_500)).is_none());
    }

    #[test]
    fn test_no_entry_at_or_above_ceiling() {
        let m = market();
        let snap = snapshot(
            signals(VolRegime::Medium),
            book("yes", &[], &[(0.50, 300.0)]),
            book("no", &[], &[(0.47, 300.0)]),
        );
        let pos = Position::new("btc-5m");
        let mut s = StraddleStrategy::new(StraddleConfig::default());
        assert!(s.evaluate(&ctx(&m, &snap, &pos, Phase::Alpha, 100.0, 0)).is_none());
    }

    #[test]
    fn test_pullback_continuous_triggers_add() {
        let cfg = StraddleConfig::default();
        let mut w = PullbackWatch::new(TokenSide::Yes, 0.6, 0.55, 0, &cfg);
        assert_eq!(w.observe(0.54, 1_000), PullbackState::Waiting);
        assert_eq!(w.observe(0.53, 2_000), PullbackState::Waiting);
        assert_eq!(w.observe(0.54, 3_000), PullbackState::Triggered);
    }

    #[test]
    fn test_pullback_per_evaluation_needs_consecutive_rebound() {
        let cfg = StraddleConfig {
            pullback_min_mode: PullbackMinMode::PerEvaluation,
            ..StraddleConfig::default()
        };
        let mut w = PullbackWatch::new(TokenSide::Yes, 0.6, 0.55, 0, &cfg);
        assert_eq!(w.observe(0.53, 1_000), PullbackState::Waiting);
        assert_eq!(w.observe(0.535, 2_000), PullbackState::Waiting);
        // Minimum restarted at 0.535: 0.54 is not a full cent above it.
        assert_eq!(w.observe(0.54, 3_000), PullbackState::Waiting);

        let mut c = PullbackWatch::new(TokenSide::Yes, 0.6, 0.55, 0, &StraddleConfig::default());
        c.observe(0.53, 1_000);
        c.observe(0.535, 2_000);
        assert_eq!(c.observe(0.54, 3_000), PullbackState::Triggered);
    }

    #[test]
    fn test_pullback_expires() {
        let mut w = PullbackWatch::new(TokenSide::No, 0.6, 0.40, 0, &StraddleConfig::default());
        assert_eq!(w.observe(0.40, 30_000), PullbackState::Waiting);
        assert_eq!(w.observe(0.38, 30_001), PullbackState::Expired);
    }

    #[test]
    fn test_phase_two_flow() {
        let m = market();
        let mut sig = signals(VolRegime::Medium);
        sig.bias = BiasSignal {
            direction: Direction::Up,
            confidence: 0.70,
            score: 0.70,
        };
        let pos = Position::new("btc-5m");
        let mut s = StraddleStrategy::new(StraddleConfig::default());
        s.stage = Stage::PairPending;
        s.on_notice(&StrategyNotice::PairFilled(filled_report()));
        assert!((s.locked_profit().unwrap() - 12.0).abs() < 1e-9);

        let at = |ask: f64| {
            snapshot(
                sig.clone(),
                book("yes", &[(ask - 0.01, 500.0)], &[(ask, 500.0)]),
                book("no", &[(0.40, 500.0)], &[(0.60, 500.0)]),
            )
        };
        let s0 = at(0.55);
        assert!(s.evaluate(&ctx(&m, &s0, &pos, Phase::Prime, 1_000.0, 40_000)).is_none());
        assert!(s.is_watching());
        let s1 = at(0.53);
        assert!(s.evaluate(&ctx(&m, &s1, &pos, Phase::Prime, 1_000.0, 41_000)).is_none());
        let s2 = at(0.54);
        let batch = s.evaluate(&ctx(&m, &s2, &pos, Phase::Prime, 1_000.0, 42_000)).unwrap();
        let add = &batch.intents[0];
        assert_eq!(add.token_side(), TokenSide::Yes);
        // min(150/0.54, 36/0.54, 500) × ((0.7-0.35)/0.65)
        let expected = 36.0 / 0.54 * (0.35 / 0.65);
        assert!((add.size() - expected).abs() < 1e-6, "{}", add.size());
        assert!(add.notional() <= 3.0 * 12.0 + 1e-9);
    }

    #[test]
    fn test_lockout_cancels_watch() {
        let m = market();
        let pos = Position::new("btc-5m");
        let snap = snapshot(
            signals(VolRegime::Medium),
            book("yes", &[], &[(0.5, 10.0)]),
            book("no", &[], &[(0.5, 10.0)]),
        );
        let mut s = StraddleStrategy::new(StraddleConfig::default());
        s.stage = Stage::Watching {
            locked_profit: 5.0,
            watch: PullbackWatch::new(TokenSide::Yes, 0.6, 0.55, 0, &StraddleConfig::default()),
        };
        assert!(s.evaluate(&ctx(&m, &snap, &pos, Phase::Lockout, 100.0, 275_000)).is_none());
        assert!(!s.is_watching());
    }
}
