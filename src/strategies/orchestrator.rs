//! Orchestrator - Regime gating, capital budgeting and conflict resolution.
//!
//! Each cycle walks the strategies in priority order. A strategy runs
//! only if the volatility regime admits it and the capital tier does not
//! exclude it; it sees the market budget left after everything already
//! committed and accepted this cycle. The market budget is capital times
//! the smaller of the tier fraction and the market's allocation share. A batch that trades a token already
//! claimed by a higher-priority batch is dropped and its strategy told so.

use std::collections::HashSet;

use tracing::debug;

use crate::config::{OrchestratorConfig, StrategyConfig};
use crate::domain::market::Market;
use crate::domain::order::{Batch, BatchKind, Side, StrategyId};
use crate::domain::signal::VolRegime;

use super::{
    ArbitrageStrategy, LagExploitStrategy, MIN_NOTIONAL, MarketMakerStrategy, MomentumStrategy,
    StraddleStrategy, Strategy, StrategyContext, StrategyNotice,
};

// ────────────────────────────────────────────
// Strategy set
// ────────────────────────────────────────────

/// The strategy instances owned by one market worker.
pub struct StrategySet {
    strategies: Vec<Box<dyn Strategy>>,
}

impl StrategySet {
    /// Wrap existing engines.
    pub fn new(strategies: Vec<Box<dyn Strategy>>) -> Self {
        Self { strategies }
    }

    /// One fresh instance of every engine.
    pub fn from_config(strategy: &StrategyConfig, orchestrator: &OrchestratorConfig) -> Self {
        Self::new(vec![
            Box::new(ArbitrageStrategy::new(strategy.arbitrage.clone())),
            Box::new(StraddleStrategy::new(strategy.straddle.clone())),
            Box::new(LagExploitStrategy::new(strategy.lag_exploit.clone())),
            Box::new(MomentumStrategy::new(
                strategy.momentum.clone(),
                orchestrator.regime_position_cap,
            )),
            Box::new(MarketMakerStrategy::new(strategy.market_maker.clone())),
        ])
    }

    /// Engine by id.
    pub fn get_mut(&mut self, id: StrategyId) -> Option<&mut Box<dyn Strategy>> {
        self.strategies.iter_mut().find(|s| s.id() == id)
    }

    /// Route an outcome to the engine that produced it.
    pub fn notify(&mut self, id: StrategyId, notice: &StrategyNotice) {
        if let Some(strategy) = self.get_mut(id) {
            strategy.on_notice(notice);
        }
    }

    /// Number of engines.
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    /// No engines.
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

impl std::fmt::Debug for StrategySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.strategies.iter().map(|s| s.id()))
            .finish()
    }
}

// ────────────────────────────────────────────
// Orchestrator
// ────────────────────────────────────────────

/// Strategies admitted in each regime.
pub const fn eligible_strategies(regime: VolRegime) -> &'static [StrategyId] {
    use StrategyId::{Arbitrage, LagExploit, MarketMaker, Momentum, Straddle};
    match regime {
        VolRegime::Dead => &[MarketMaker, Arbitrage, Straddle],
        VolRegime::Low => &[Straddle, MarketMaker, Arbitrage, LagExploit],
        VolRegime::Medium => &[LagExploit, Straddle, MarketMaker, Momentum, Arbitrage],
        VolRegime::High => &[Arbitrage, LagExploit, Straddle, Momentum],
        VolRegime::Extreme => &[Arbitrage, Straddle],
    }
}

/// Per-market strategy coordinator.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    config: OrchestratorConfig,
}

impl Orchestrator {
    /// New orchestrator.
    pub const fn new(config: OrchestratorConfig) -> Self {
        Self { config }
    }

    /// Capital fraction and exclusions for a capital level.
    pub fn tier(&self, capital: f64) -> (f64, &[StrategyId]) {
        self.config
            .capital_tiers
            .iter()
            .find(|t| capital < t.below)
            .map_or((self.config.top_tier_fraction, &[][..]), |t| {
                (t.fraction, t.excluded.as_slice())
            })
    }

    /// Allocation share for the market's asset and window length.
    pub fn allocation_share(&self, market: &Market) -> f64 {
        self.config
            .allocations
            .iter()
            .find(|a| a.asset == market.asset && a.duration == market.duration)
            .map_or(self.config.default_allocation, |a| a.share)
    }

    /// Capital one market may use.
    pub fn market_budget(&self, market: &Market, capital: f64) -> f64 {
        capital.max(0.0) * self.tier(capital).0.min(self.allocation_share(market))
    }

    /// Whether `id` may run under this regime and capital.
    pub fn admits(&self, id: StrategyId, regime: VolRegime, capital: f64) -> bool {
        eligible_strategies(regime).contains(&id) && !self.tier(capital).1.contains(&id)
    }

    /// One decision cycle. `committed` is capital already tied up in
    /// this market (open orders plus cost basis).
    pub fn run(&self, set: &mut StrategySet, ctx: &StrategyContext<'_>, committed: f64) -> Vec<Batch> {
        let mut accepted: Vec<Batch> = Vec::new();
        if !ctx.phase.permits_new_orders() {
            return accepted;
        }

        let mut remaining = self.market_budget(ctx.market, ctx.capital) - committed;
        let mut claimed: HashSet<String> = HashSet::new();
        let stale = ctx.signals().stale;

        for &id in &self.config.priority {
            let Some(strategy) = set.get_mut(id) else {
                continue;
            };
            let runnable = !stale
                && remaining >= MIN_NOTIONAL
                && self.admits(id, ctx.regime(), ctx.capital);
            let cycle_ctx = ctx.with_budget(remaining.max(0.0));
            let batch = if runnable {
                strategy.evaluate(&cycle_ctx)
            } else {
                strategy.suspend(&cycle_ctx)
            };
            let Some(batch) = batch else {
                continue;
            };

            if batch.kind != BatchKind::Withdraw
                && batch.intents.iter().any(|i| claimed.contains(i.token_id()))
            {
                debug!(market = %ctx.market.id, strategy = %id, "Batch dropped on token conflict");
                strategy.on_notice(&StrategyNotice::Dropped);
                continue;
            }

            for intent in &batch.intents {
                claimed.insert(intent.token_id().clone());
                if intent.side() == Side::Buy {
                    remaining -= intent.notional();
                }
            }
            accepted.push(batch);
        }
        accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::lifecycle::Phase;
    use crate::domain::market::TokenSide;
    use crate::domain::order::{OrderIntent, OrderType};
    use crate::domain::position::Position;
    use crate::signals::MarketSnapshot;
    use crate::strategies::fixtures::{book, ctx, market, signals, snapshot};
    use std::sync::{Arc, Mutex};

    /// Emits a fixed single-leg buy and records notices.
    struct Stub {
        id: StrategyId,
        token: TokenSide,
        size: f64,
        notices: Arc<Mutex<Vec<StrategyNotice>>>,
    }

    impl Strategy for Stub {
        fn id(&self) -> StrategyId {
            self.id
        }

        fn evaluate(&mut self, ctx: &StrategyContext<'_>) -> Option<Batch> {
            let size = self.size.min(ctx.budget / 0.5);
            OrderIntent::new(ctx.market, self.token, Side::Buy, 0.5, size, OrderType::Fak, self.id, ctx.now_ms)
                .ok()
                .map(Batch::single)
        }

        fn on_notice(&mut self, notice: &StrategyNotice) {
            self.notices.lock().unwrap().push(notice.clone());
        }
    }

    fn stub(id: StrategyId, token: TokenSide, size: f64) -> (Box<dyn Strategy>, Arc<Mutex<Vec<StrategyNotice>>>) {
        let notices = Arc::new(Mutex::new(Vec::new()));
        let s = Stub {
            id,
            token,
            size,
            notices: Arc::clone(&notices),
        };
        (Box::new(s), notices)
    }

    fn snap(regime: VolRegime) -> MarketSnapshot {
        snapshot(
            signals(regime),
            book("yes", &[(0.49, 100.0)], &[(0.51, 100.0)]),
            book("no", &[(0.49, 100.0)], &[(0.51, 100.0)]),
        )
    }

    #[test]
    fn test_regime_table() {
        assert!(!eligible_strategies(VolRegime::Dead).contains(&StrategyId::LagExploit));
        assert!(!eligible_strategies(VolRegime::High).contains(&StrategyId::MarketMaker));
        assert_eq!(eligible_strategies(VolRegime::Medium).len(), 5);
        assert_eq!(
            eligible_strategies(VolRegime::Extreme),
            &[StrategyId::Arbitrage, StrategyId::Straddle]
        );
    }

    #[test]
    fn test_capital_tiers() {
        let o = Orchestrator::new(OrchestratorConfig::default());
        assert!((o.tier(40.0).0 - 1.00).abs() < 1e-9);
        assert!((o.tier(100.0).0 - 0.50).abs() < 1e-9);
        assert!((o.tier(1_000.0).0 - 0.25).abs() < 1e-9);
        assert!((o.tier(10_000.0).0 - 0.10).abs() < 1e-9);
        assert!(!o.admits(StrategyId::MarketMaker, VolRegime::Medium, 40.0));
        assert!(o.admits(StrategyId::MarketMaker, VolRegime::Medium, 60.0));
    }

    #[test]
    fn test_budget_takes_smaller_of_tier_and_allocation() {
        use crate::domain::market::{Asset, DurationClass};

        let o = Orchestrator::new(OrchestratorConfig::default());
        let btc_5m = market();
        let eth_15m = Market {
            id: "eth-15m".into(),
            asset: Asset::ETH,
            duration: DurationClass::FifteenMin,
            ..market()
        };
        let sol_5m = Market {
            id: "sol-5m".into(),
            asset: Asset::SOL,
            ..market()
        };
        // Tier 1.00 at $40: the 40% allocation binds.
        assert!((o.market_budget(&btc_5m, 40.0) - 16.0).abs() < 1e-9);
        // Tier 0.25 at $1,000 binds for BTC 5m; ETH 15m is held to 20%.
        assert!((o.market_budget(&btc_5m, 1_000.0) - 250.0).abs() < 1e-9);
        assert!((o.market_budget(&eth_15m, 1_000.0) - 200.0).abs() < 1e-9);
        // Unlisted kinds fall back to the default share.
        assert!((o.allocation_share(&sol_5m) - 0.05).abs() < 1e-9);
        assert!((o.market_budget(&sol_5m, 1_000.0) - 50.0).abs() < 1e-9);
        // Tier 0.10 above $5,000 binds everywhere.
        assert!((o.market_budget(&btc_5m, 10_000.0) - 1_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_higher_priority_wins_token_conflict() {
        let m = market();
        let pos = Position::new("btc-5m");
        let s = snap(VolRegime::Medium);
        let (arb, _) = stub(StrategyId::Arbitrage, TokenSide::Yes, 10.0);
        let (lag, lag_notices) = stub(StrategyId::LagExploit, TokenSide::Yes, 10.0);
        let (mom, _) = stub(StrategyId::Momentum, TokenSide::No, 10.0);
        let mut set = StrategySet::new(vec![lag, mom, arb]);
        let o = Orchestrator::new(OrchestratorConfig::default());

        let batches = o.run(&mut set, &ctx(&m, &s, &pos, Phase::Prime, 1_000.0, 60_000), 0.0);
        let ids: Vec<_> = batches.iter().map(|b| b.strategy).collect();
        assert_eq!(ids, vec![StrategyId::Arbitrage, StrategyId::Momentum]);
        assert_eq!(*lag_notices.lock().unwrap(), vec![StrategyNotice::Dropped]);
    }

    #[test]
    fn test_budget_is_shared_and_exhausts() {
        let m = market();
        let pos = Position::new("btc-5m");
        let s = snap(VolRegime::Medium);
        // $100 capital → $40 budget for BTC 5m; $37 already committed.
        let (arb, _) = stub(StrategyId::Arbitrage, TokenSide::Yes, 6.0);
        let (mom, _) = stub(StrategyId::Momentum, TokenSide::No, 6.0);
        let mut set = StrategySet::new(vec![arb, mom]);
        let o = Orchestrator::new(OrchestratorConfig::default());

        let batches = o.run(&mut set, &ctx(&m, &s, &pos, Phase::Prime, 100.0, 60_000), 37.0);
        assert_eq!(batches.len(), 1);
        assert!((batches[0].notional() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_regime_gates_and_lockout() {
        let m = market();
        let pos = Position::new("btc-5m");
        let (lag, _) = stub(StrategyId::LagExploit, TokenSide::Yes, 10.0);
        let mut set = StrategySet::new(vec![lag]);
        let o = Orchestrator::new(OrchestratorConfig::default());

        let extreme = snap(VolRegime::Extreme);
        assert!(o.run(&mut set, &ctx(&m, &extreme, &pos, Phase::Prime, 1_000.0, 60_000), 0.0).is_empty());
        let medium = snap(VolRegime::Medium);
        assert!(o.run(&mut set, &ctx(&m, &medium, &pos, Phase::Lockout, 1_000.0, 280_000), 0.0).is_empty());
        assert_eq!(o.run(&mut set, &ctx(&m, &medium, &pos, Phase::Prime, 1_000.0, 60_000), 0.0).len(), 1);
    }

    #[test]
    fn test_suspended_market_maker_withdraws() {
        let m = market();
        let pos = Position::new("btc-5m");
        let cfg = StrategyConfig::default();
        let mut set = StrategySet::from_config(&cfg, &OrchestratorConfig::default());
        let o = Orchestrator::new(OrchestratorConfig::default());

        let quiet = snapshot(
            signals(VolRegime::Dead),
            book("yes", &[(0.45, 100.0)], &[(0.55, 100.0)]),
            book("no", &[(0.45, 100.0)], &[(0.55, 100.0)]),
        );
        let batches = o.run(&mut set, &ctx(&m, &quiet, &pos, Phase::Prime, 1_000.0, 60_000), 0.0);
        assert!(batches.iter().any(|b| b.kind == BatchKind::Requote));

        let mut wild = quiet.clone();
        wild.signals.regime = VolRegime::High;
        let batches = o.run(&mut set, &ctx(&m, &wild, &pos, Phase::Prime, 1_000.0, 62_000), 0.0);
        assert!(batches.iter().any(|b| b.kind == BatchKind::Withdraw));
    }

    #[test]
    fn test_stale_feed_suspends_everything() {
        let m = market();
        let pos = Position::new("btc-5m");
        let (arb, _) = stub(StrategyId::Arbitrage, TokenSide::Yes, 10.0);
        let mut set = StrategySet::new(vec![arb]);
        let o = Orchestrator::new(OrchestratorConfig::default());

        let mut s = snap(VolRegime::Medium);
        s.signals.stale = true;
        assert!(o.run(&mut set, &ctx(&m, &s, &pos, Phase::Prime, 1_000.0, 60_000), 0.0).is_empty());
    }
}
