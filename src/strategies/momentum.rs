//! Momentum capture: ride token-price moves toward fair value, exit on
//! exhaustion.

use tracing::info;

use crate::config::MomentumConfig;
use crate::domain::lifecycle::Phase;
use crate::domain::market::TokenSide;
use crate::domain::order::{Batch, OrderIntent, OrderStatus, OrderType, Side, StrategyId};
use crate::domain::signal::VolRegime;

use super::{StrategyContext, Strategy, StrategyNotice};

const DUST_SHARES: f64 = 1e-6;

/// Momentum engine for one market.
#[derive(Debug, Clone)]
pub struct MomentumStrategy {
    config: MomentumConfig,
    /// Position cap as a share of capital, per regime.
    regime_cap: [f64; 5],
    held: Option<(TokenSide, f64)>,
    pending: bool,
    /// Shares the exchange reported filled that have not streamed yet.
    unconfirmed: f64,
}

impl MomentumStrategy {
    /// New engine.
    pub const fn new(config: MomentumConfig, regime_cap: [f64; 5]) -> Self {
        Self {
            config,
            regime_cap,
            held: None,
            pending: false,
            unconfirmed: 0.0,
        }
    }

    /// Shares held from momentum entries.
    pub const fn held(&self) -> Option<(TokenSide, f64)> {
        self.held
    }

    /// Entry notional for a signal, before the minimum check.
    pub fn entry_notional(&self, capital: f64, regime: VolRegime, divergence: f64, composite: f64) -> f64 {
        let div_mult = (divergence.abs() / self.config.divergence_unit).min(self.config.divergence_cap);
        let mom_mult = (composite.abs() / self.config.momentum_unit).min(self.config.momentum_cap);
        let notional = capital * self.config.base_pct * div_mult * mom_mult;
        notional.min(capital * self.regime_cap[regime.index()])
    }

    fn exit(&mut self, ctx: &StrategyContext<'_>, token: TokenSide, shares: f64) -> Option<Batch> {
        if ctx.seconds_remaining() < self.config.hold_below_secs {
            return None;
        }
        let bid = ctx.book(token).best_bid()?;
        let intent = OrderIntent::new(
            ctx.market,
            token,
            Side::Sell,
            bid,
            shares,
            OrderType::Fak,
            StrategyId::Momentum,
            ctx.now_ms,
        )
        .ok()?;
        info!(market = %ctx.market.id, %token, bid, shares, "Momentum exhausted, exiting");
        self.pending = true;
        Some(Batch::single(intent))
    }

    fn enter(&mut self, ctx: &StrategyContext<'_>) -> Option<Batch> {
        if !matches!(ctx.phase, Phase::Early | Phase::Prime | Phase::Mature)
            || ctx.regime() == VolRegime::Dead
        {
            return None;
        }
        let signal = ctx.signals().momentum?;
        if signal.composite.abs() <= self.config.min_composite
            || signal.divergence.abs() <= self.config.min_divergence
        {
            return None;
        }
        let token = signal.agreed_direction().favored_token()?;
        let ask = ctx.book(token).best_ask()?;

        let notional = self
            .entry_notional(ctx.capital, ctx.regime(), signal.divergence, signal.composite)
            .min(ctx.budget)
            * ctx.size_multiplier;
        if notional < self.config.min_notional {
            return None;
        }
        let intent = OrderIntent::new(
            ctx.market,
            token,
            Side::Buy,
            ask,
            notional / ask,
            OrderType::Fak,
            StrategyId::Momentum,
            ctx.now_ms,
        )
        .ok()?;
        info!(
            market = %ctx.market.id,
            %token,
            ask,
            notional,
            composite = signal.composite,
            divergence = signal.divergence,
            "Momentum entry"
        );
        self.pending = true;
        Some(Batch::single(intent))
    }
}

impl Strategy for MomentumStrategy {
    fn id(&self) -> StrategyId {
        StrategyId::Momentum
    }

    fn evaluate(&mut self, ctx: &StrategyContext<'_>) -> Option<Batch> {
        if !self.config.enabled || self.pending || !ctx.phase.permits_new_orders() {
            return None;
        }
        match self.held {
            Some((token, shares)) => {
                let exhausted = ctx.signals().momentum.is_some_and(|m| m.exhausted);
                if exhausted { self.exit(ctx, token, shares) } else { None }
            }
            None => self.enter(ctx),
        }
    }

    fn on_notice(&mut self, notice: &StrategyNotice) {
        match notice {
            StrategyNotice::Filled { token, side, size, .. } => {
                let current = match self.held {
                    Some((held, shares)) if held == *token => shares,
                    _ => 0.0,
                };
                let next = match side {
                    Side::Buy => current + size,
                    Side::Sell => current - size,
                };
                self.held = (next > DUST_SHARES).then_some((*token, next));
                self.unconfirmed = (self.unconfirmed - size).max(0.0);
                if self.unconfirmed <= DUST_SHARES {
                    self.pending = false;
                }
            }
            StrategyNotice::Submitted { results, .. } => {
                // Stay pending until the reported fills reach `held`.
                self.unconfirmed = results
                    .iter()
                    .filter(|r| r.status != OrderStatus::Rejected)
                    .map(|r| r.filled_size)
                    .sum();
                self.pending = self.unconfirmed > DUST_SHARES;
            }
            StrategyNotice::Dropped
            | StrategyNotice::Rejected { .. }
            | StrategyNotice::SubmitFailed => self.pending = false,
            StrategyNotice::PairFilled(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OrchestratorConfig;
    use crate::domain::position::Position;
    use crate::domain::signal::MomentumSignal;
    use crate::signals::MarketSnapshot;
    use crate::strategies::fixtures::{book, ctx, market, signals, snapshot};

    fn engine() -> MomentumStrategy {
        MomentumStrategy::new(
            MomentumConfig::default(),
            OrchestratorConfig::default().regime_position_cap,
        )
    }

    fn snap(composite: f64, divergence: f64, exhausted: bool) -> MarketSnapshot {
        let mut s = signals(VolRegime::Medium);
        s.momentum = Some(MomentumSignal {
            velocity: composite,
            acceleration: 0.0,
            divergence,
            composite,
            exhausted,
        });
        snapshot(
            s,
            book("yes", &[(0.49, 100.0)], &[(0.51, 100.0)]),
            book("no", &[(0.48, 100.0)], &[(0.50, 100.0)]),
        )
    }

    #[test]
    fn test_entry_sizing() {
        let m = market();
        let pos = Position::new("btc-5m");
        let s = snap(0.004, 0.06, false);
        let mut e = engine();
        let batch = e.evaluate(&ctx(&m, &s, &pos, Phase::Prime, 100.0, 60_000)).unwrap();
        let i = &batch.intents[0];
        assert_eq!((i.token_side(), i.side()), (TokenSide::Yes, Side::Buy));
        // 100 × 0.10 × 1.2 × 0.8
        assert!((i.notional() - 9.6).abs() < 1e-9);
    }

    #[test]
    fn test_regime_cap_and_direction() {
        let e = engine();
        // 100 × 0.1 × 2 × 1.5 = 30, capped at 20% in MEDIUM
        assert!((e.entry_notional(100.0, VolRegime::Medium, -0.2, -0.02) - 20.0).abs() < 1e-9);

        let m = market();
        let pos = Position::new("btc-5m");
        let s = snap(-0.004, -0.06, false);
        let mut e = engine();
        let batch = e.evaluate(&ctx(&m, &s, &pos, Phase::Mature, 100.0, 150_000)).unwrap();
        assert_eq!(batch.intents[0].token_side(), TokenSide::No);
    }

    #[test]
    fn test_disagreement_and_alpha_do_not_enter() {
        let m = market();
        let pos = Position::new("btc-5m");
        let mut e = engine();
        let split = snap(0.004, -0.06, false);
        assert!(e.evaluate(&ctx(&m, &split, &pos, Phase::Prime, 100.0, 60_000)).is_none());
        let ok = snap(0.004, 0.06, false);
        assert!(e.evaluate(&ctx(&m, &ok, &pos, Phase::Alpha, 100.0, 1_000)).is_none());
    }

    #[test]
    fn test_exit_on_exhaustion_unless_near_expiry() {
        let m = market();
        let pos = Position::new("btc-5m");
        let mut e = engine();
        e.on_notice(&StrategyNotice::Filled {
            token: TokenSide::Yes,
            side: Side::Buy,
            price: 0.51,
            size: 18.0,
        });
        assert_eq!(e.held(), Some((TokenSide::Yes, 18.0)));

        let tired = snap(0.001, 0.06, true);
        // 40s left: hold to resolution.
        assert!(e.evaluate(&ctx(&m, &tired, &pos, Phase::PreResolution, 100.0, 260_000)).is_none());

        let batch = e.evaluate(&ctx(&m, &tired, &pos, Phase::Mature, 100.0, 200_000)).unwrap();
        let i = &batch.intents[0];
        assert_eq!(i.side(), Side::Sell);
        assert!((i.price() - 0.49).abs() < 1e-12);
        assert!((i.size() - 18.0).abs() < 1e-12);

        e.on_notice(&StrategyNotice::Filled {
            token: TokenSide::Yes,
            side: Side::Sell,
            price: 0.49,
            size: 18.0,
        });
        assert_eq!(e.held(), None);
    }

    #[test]
    fn test_no_second_entry_until_reported_fill_streams() {
        use crate::domain::order::{BatchKind, OrderResult};

        let m = market();
        let pos = Position::new("btc-5m");
        let s = snap(0.004, 0.06, false);
        let mut e = engine();
        let batch = e.evaluate(&ctx(&m, &s, &pos, Phase::Prime, 100.0, 60_000)).unwrap();
        let shares = batch.intents[0].size();

        e.on_notice(&StrategyNotice::Submitted {
            kind: BatchKind::Single,
            results: vec![OrderResult {
                order_id: "m1".into(),
                status: OrderStatus::Filled,
                filled_size: shares,
                avg_price: 0.51,
            }],
        });
        assert!(e.evaluate(&ctx(&m, &s, &pos, Phase::Prime, 100.0, 61_000)).is_none());

        e.on_notice(&StrategyNotice::Filled {
            token: TokenSide::Yes,
            side: Side::Buy,
            price: 0.51,
            size: shares,
        });
        assert_eq!(e.held(), Some((TokenSide::Yes, shares)));
        // Holding and not exhausted: still nothing new.
        assert!(e.evaluate(&ctx(&m, &s, &pos, Phase::Prime, 100.0, 62_000)).is_none());
    }

    #[test]
    fn test_unfilled_fak_releases_pending() {
        use crate::domain::order::{BatchKind, OrderResult};

        let m = market();
        let pos = Position::new("btc-5m");
        let s = snap(0.004, 0.06, false);
        let mut e = engine();
        assert!(e.evaluate(&ctx(&m, &s, &pos, Phase::Prime, 100.0, 60_000)).is_some());
        e.on_notice(&StrategyNotice::Submitted {
            kind: BatchKind::Single,
            results: vec![OrderResult {
                order_id: "m1".into(),
                status: OrderStatus::Cancelled,
                filled_size: 0.0,
                avg_price: 0.0,
            }],
        });
        assert!(e.evaluate(&ctx(&m, &s, &pos, Phase::Prime, 100.0, 61_000)).is_some());
    }
}
