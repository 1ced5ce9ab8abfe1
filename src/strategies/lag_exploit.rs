//! Lag Exploit - Buy token asks that trail the spot-implied fair value.
//!
//! The token books reprice slower than spot. When the fair probability
//! of one side exceeds its ask by at least `min_edge`, buy it with a
//! fractional-Kelly stake at an edge-scaled win probability.

use tracing::debug;

use crate::config::LagExploitConfig;
use crate::domain::kelly::KellySizer;
use crate::domain::market::TokenSide;
use crate::domain::order::{Batch, OrderIntent, OrderType, Side, StrategyId};
use crate::domain::signal::VolRegime;

use super::{MIN_NOTIONAL, StrategyContext, Strategy};

/// Stateless lag exploit engine.
#[derive(Debug, Clone)]
pub struct LagExploitStrategy {
    config: LagExploitConfig,
    kelly: KellySizer,
}

impl LagExploitStrategy {
    /// New engine.
    pub fn new(config: LagExploitConfig) -> Self {
        let kelly = KellySizer::new(config.kelly_fraction);
        Self { config, kelly }
    }

    /// Best (token, ask, edge) above the minimum edge.
    fn best_edge(&self, ctx: &StrategyContext<'_>) -> Option<(TokenSide, f64, f64)> {
        let fair = ctx.signals().fair_prob_up;
        [TokenSide::Yes, TokenSide::No]
            .into_iter()
            .filter_map(|token| {
                let ask = ctx.book(token).best_ask()?;
                let fair_side = match token {
                    TokenSide::Yes => fair,
                    TokenSide::No => 1.0 - fair,
                };
                Some((token, ask, fair_side - ask))
            })
            .filter(|(_, _, edge)| *edge >= self.config.min_edge)
            .max_by(|a, b| a.2.total_cmp(&b.2))
    }

    fn suppressed(&self, ctx: &StrategyContext<'_>, token: TokenSide) -> bool {
        let remaining = ctx.seconds_remaining();
        match ctx.regime() {
            VolRegime::Dead => return true,
            VolRegime::High if remaining < self.config.high_vol_min_secs => return true,
            _ => {}
        }
        let wide = ctx
            .book(token)
            .spread()
            .is_some_and(|s| s > self.config.wide_spread);
        wide && remaining < self.config.wide_spread_min_secs
    }
}

impl Strategy for LagExploitStrategy {
    fn id(&self) -> StrategyId {
        StrategyId::LagExploit
    }

    fn evaluate(&mut self, ctx: &StrategyContext<'_>) -> Option<Batch> {
        if !self.config.enabled || !ctx.phase.permits_new_orders() || ctx.signals().stale {
            return None;
        }
        let (token, ask, edge) = self.best_edge(ctx)?;
        if self.suppressed(ctx, token) {
            debug!(market = %ctx.market.id, %token, edge, "Lag exploit suppressed");
            return None;
        }

        let win_prob = (ask + edge * self.config.edge_scale).min(self.config.max_win_prob);
        let stake = self.kelly.stake(win_prob, ask, ctx.budget) * ctx.size_multiplier;
        if stake < MIN_NOTIONAL {
            return None;
        }

        let intent = OrderIntent::new(
            ctx.market,
            token,
            Side::Buy,
            ask,
            stake / ask,
            OrderType::Fak,
            StrategyId::LagExploit,
            ctx.now_ms,
        )
        .ok()?;
        debug!(market = %ctx.market.id, %token, ask, edge, win_prob, stake, "Lag exploit entry");
        Some(Batch::single(intent))
    }
}
