//! Market Maker - Two-sided post-only quotes around fair value.
//!
//! Quotes the YES token. The ask side sells held YES when there is
//! enough of it, otherwise it is expressed as a NO bid at `1 - ask`.
//! Quotes are replaced wholesale (cancel-all then post) and pulled on
//! adverse selection signals.

use rust_decimal::prelude::ToPrimitive;
use tracing::{debug, warn};

use crate::config::MarketMakerConfig;
use crate::domain::market::TokenSide;
use crate::domain::order::{Batch, OrderIntent, OrderType, Side, StrategyId};
use crate::domain::signal::VolRegime;

use super::{StrategyContext, Strategy, StrategyNotice, ceil_tick, floor_tick};

/// Half-spread multiplier under adverse flow.
const ADVERSE_WIDEN: f64 = 2.0;

/// Response to adverse-selection signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdverseAction {
    /// Quote normally.
    Normal,
    /// Cancel all quotes.
    Pull,
    /// Double the half-spread.
    Widen,
    /// Double the half-spread and lean against the fill run.
    WidenAndSkew,
}

/// Quoting state for one market.
#[derive(Debug, Clone)]
pub struct MarketMakerStrategy {
    config: MarketMakerConfig,
    quotes_live: bool,
    last_quote_ms: Option<u64>,
    last_action: AdverseAction,
    /// +1 while fills add YES exposure, -1 while they remove it.
    run_sign: f64,
    run_len: u32,
}

impl MarketMakerStrategy {
    /// New engine with no live quotes.
    pub const fn new(config: MarketMakerConfig) -> Self {
        Self {
            config,
            quotes_live: false,
            last_quote_ms: None,
            last_action: AdverseAction::Normal,
            run_sign: 0.0,
            run_len: 0,
        }
    }

    /// Whether quotes are believed to be resting.
    pub const fn quotes_live(&self) -> bool {
        self.quotes_live
    }

    /// Classify the current tape.
    pub fn assess(&self, ctx: &StrategyContext<'_>) -> AdverseAction {
        let tape = ctx.signals().tape;
        if tape.liquidation_cascade || tape.move_1s.abs() > self.config.pull_move_1s {
            AdverseAction::Pull
        } else if self.run_len >= self.config.same_side_fill_run {
            AdverseAction::WidenAndSkew
        } else if tape.flow_imbalance.abs() > self.config.widen_flow_imbalance {
            AdverseAction::Widen
        } else {
            AdverseAction::Normal
        }
    }

    /// Inventory skew in price units; positive lowers both quotes.
    pub fn inventory_skew(&self, net_yes: f64, capital: f64) -> f64 {
        let unit = capital * self.config.skew_inventory_pct;
        if unit <= 0.0 {
            return 0.0;
        }
        (net_yes / unit * self.config.skew_per_unit).clamp(-self.config.skew_cap, self.config.skew_cap)
    }

    /// Widening factor from time to expiry.
    pub fn time_widen(&self, seconds_remaining: f64) -> f64 {
        let below = self.config.widen_below_secs;
        if below > 0.0 && seconds_remaining < below {
            1.0 + (below - seconds_remaining) / below * self.config.max_time_widen
        } else {
            1.0
        }
    }

    fn should_quote(&self, ctx: &StrategyContext<'_>) -> bool {
        let regime = ctx.regime();
        ctx.phase.permits_new_orders()
            && !ctx.signals().stale
            && regime != VolRegime::Extreme
            && self.config.half_spread[regime.index()] > 0.0
            && ctx.seconds_remaining() >= self.config.min_secs_remaining
            && ctx
                .book(TokenSide::Yes)
                .spread()
                .is_some_and(|s| s >= self.config.min_book_spread - 1e-9)
    }

    fn withdraw(&mut self, ctx: &StrategyContext<'_>, action: AdverseAction) -> Option<Batch> {
        self.last_action = action;
        if !self.quotes_live {
            return None;
        }
        self.quotes_live = false;
        self.last_quote_ms = None;
        debug!(market = %ctx.market.id, ?action, "Quotes withdrawn");
        Some(Batch::withdraw(ctx.market.id.clone(), StrategyId::MarketMaker))
    }

    fn quotes(&self, ctx: &StrategyContext<'_>, action: AdverseAction) -> Option<Vec<OrderIntent>> {
        let regime = ctx.regime();
        let fair = ctx.signals().fair_prob_up;
        if !(fair > 0.0 && fair < 1.0) {
            return None;
        }

        let adverse = match action {
            AdverseAction::Widen | AdverseAction::WidenAndSkew => ADVERSE_WIDEN,
            AdverseAction::Normal | AdverseAction::Pull => 1.0,
        };
        let half_spread =
            self.config.half_spread[regime.index()] * adverse * self.time_widen(ctx.seconds_remaining());

        let mut skew = self.inventory_skew(ctx.position.net_yes_f64(), ctx.capital);
        if action == AdverseAction::WidenAndSkew {
            skew += self.config.skew_per_unit * self.run_sign;
        }

        let bid = floor_tick(fair - half_spread - skew);
        let ask = ceil_tick(fair + half_spread - skew);
        if bid >= ask {
            return None;
        }

        let notional = (ctx.capital * self.config.base_size_pct * self.config.size_mult[regime.index()])
            .min(ctx.budget)
            * ctx.size_multiplier;
        let size = notional / fair;
        if size <= 0.0 {
            return None;
        }

        let order = |token, side, price| {
            OrderIntent::new(
                ctx.market,
                token,
                side,
                price,
                size,
                OrderType::PostOnly,
                StrategyId::MarketMaker,
                ctx.now_ms,
            )
            .ok()
        };
        let held_yes = ctx.position.yes.to_f64().unwrap_or(0.0);
        let ask_leg = if held_yes >= size {
            order(TokenSide::Yes, Side::Sell, ask)?
        } else {
            order(TokenSide::No, Side::Buy, floor_tick(1.0 - ask))?
        };
        Some(vec![order(TokenSide::Yes, Side::Buy, bid)?, ask_leg])
    }
}

impl Strategy for MarketMakerStrategy {
    fn id(&self) -> StrategyId {
        StrategyId::MarketMaker
    }

    fn evaluate(&mut self, ctx: &StrategyContext<'_>) -> Option<Batch> {
        if !self.config.enabled || !self.should_quote(ctx) {
            return self.withdraw(ctx, AdverseAction::Normal);
        }
        let action = self.assess(ctx);
        if action == AdverseAction::Pull {
            return self.withdraw(ctx, action);
        }

        let due = self
            .last_quote_ms
            .is_none_or(|t| ctx.now_ms.saturating_sub(t) >= self.config.requote_interval_ms);
        if self.quotes_live && !due && action == self.last_action {
            return None;
        }

        let intents = self.quotes(ctx, action)?;
        if action != AdverseAction::Normal {
            warn!(market = %ctx.market.id, ?action, "Adverse flow, quotes adjusted");
        }
        self.quotes_live = true;
        self.last_quote_ms = Some(ctx.now_ms);
        self.last_action = action;
        Some(Batch::requote(ctx.market.id.clone(), StrategyId::MarketMaker, intents))
    }

    fn suspend(&mut self, ctx: &StrategyContext<'_>) -> Option<Batch> {
        self.withdraw(ctx, AdverseAction::Normal)
    }

    fn on_notice(&mut self, notice: &StrategyNotice) {
        match notice {
            StrategyNotice::Filled { token, side, .. } => {
                let sign = match (token, side) {
                    (TokenSide::Yes, Side::Buy) | (TokenSide::No, Side::Sell) => 1.0,
                    (TokenSide::Yes, Side::Sell) | (TokenSide::No, Side::Buy) => -1.0,
                };
                if (sign - self.run_sign).abs() < f64::EPSILON {
                    self.run_len += 1;
                } else {
                    self.run_sign = sign;
                    self.run_len = 1;
                }
            }
            StrategyNotice::Dropped | StrategyNotice::Rejected { .. } => {
                self.last_quote_ms = None;
            }
            _ => {}
        }
    }
}
