//! Pure arbitrage: buy YES and NO together while they cost under $1.

use tracing::info;

use crate::config::ArbitrageConfig;
use crate::domain::market::TokenSide;
use crate::domain::order::{Batch, OrderIntent, OrderType, Side, StrategyId};

use super::{StrategyContext, Strategy, StrategyNotice};

const MIN_ARB_SHARES: f64 = 1.0;

/// Fires on the arb signal with a paired FAK batch.
#[derive(Debug, Clone)]
pub struct ArbitrageStrategy {
    config: ArbitrageConfig,
    in_flight: bool,
}

impl ArbitrageStrategy {
    /// New engine.
    pub const fn new(config: ArbitrageConfig) -> Self {
        Self {
            config,
            in_flight: false,
        }
    }

    /// Whether a pair is awaiting its outcome.
    pub const fn in_flight(&self) -> bool {
        self.in_flight
    }
}

impl Strategy for ArbitrageStrategy {
    fn id(&self) -> StrategyId {
        StrategyId::Arbitrage
    }

    fn evaluate(&mut self, ctx: &StrategyContext<'_>) -> Option<Batch> {
        if !self.config.enabled || self.in_flight || !ctx.phase.permits_new_orders() {
            return None;
        }
        let arb = ctx.signals().arb?;
        let combined = arb.combined();
        if combined <= 0.0 {
            return None;
        }

        let affordable = ctx.budget * self.config.max_capital_pct / combined;
        let size = arb.executable_size.min(affordable) * ctx.size_multiplier;
        if size < MIN_ARB_SHARES {
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
                StrategyId::Arbitrage,
                ctx.now_ms,
            )
            .ok()
        };
        let batch = Batch::paired(
            leg(TokenSide::Yes, arb.yes_ask)?,
            leg(TokenSide::No, arb.no_ask)?,
            true,
        );

        info!(
            market = %ctx.market.id,
            edge = arb.edge,
            size,
            expected = size * arb.edge,
            "Arbitrage pair"
        );
        self.in_flight = true;
        Some(batch)
    }

    fn on_notice(&mut self, notice: &StrategyNotice) {
        if matches!(
            notice,
            StrategyNotice::PairFilled(_)
                | StrategyNotice::Rejected { .. }
                | StrategyNotice::SubmitFailed
                | StrategyNotice::Dropped
        ) {
            self.in_flight = false;
        }
    }
}
