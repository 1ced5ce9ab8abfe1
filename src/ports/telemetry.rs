//! Telemetry Port - Structured Event Boundary
//!
//! The core emits one `TelemetryEvent` per notable decision or outcome.
//! Aggregation, dashboards and alert delivery happen behind the sink.
//! `emit` must not block: sinks buffer or drop, never await.

use serde::Serialize;

use crate::domain::lifecycle::Phase;
use crate::domain::market::{MarketId, OrderId, TokenSide};
use crate::domain::order::{OrderType, Side, StrategyId};
use crate::domain::signal::VolRegime;
use crate::error::RejectReason;

/// Risk check that produced a breach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskCheck {
  /// Total exposure above the configured fraction of capital.
  Exposure,
  /// Daily P&L below the loss limit.
  DailyLoss,
  /// Consecutive losing trades at or above the threshold.
  LossStreak,
  /// Spot feed silent beyond the staleness timeout.
  StaleFeed,
}

impl RiskCheck {
  /// Stable label for logs and metrics.
  pub const fn as_str(self) -> &'static str {
    match self {
      Self::Exposure => "exposure",
      Self::DailyLoss => "daily_loss",
      Self::LossStreak => "loss_streak",
      Self::StaleFeed => "stale_feed",
    }
  }
}

/// One structured telemetry event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TelemetryEvent {
  /// A strategy produced a batch that the orchestrator accepted.
  StrategyFired {
    /// Market evaluated.
    market_id: MarketId,
    /// Strategy that fired.
    strategy: StrategyId,
    /// Regime at evaluation time.
    regime: VolRegime,
    /// Lifecycle phase at evaluation time.
    phase: Phase,
    /// Batch notional (USD).
    notional: f64,
    /// Number of orders in the batch.
    orders: usize,
    /// Expected profit when the strategy reports one (arb: risk adjusted).
    expected_profit: Option<f64>,
  },
  /// An order reached the exchange.
  OrderSubmitted {
    /// Target market.
    market_id: MarketId,
    /// Originating strategy.
    strategy: StrategyId,
    /// Exchange order id.
    order_id: OrderId,
    /// Outcome token.
    token: TokenSide,
    /// Buy or sell.
    side: Side,
    /// Limit price.
    price: f64,
    /// Size in shares.
    size: f64,
    /// Time in force.
    order_type: OrderType,
  },
  /// The execution engine refused an intent before submission.
  OrderRejected {
    /// Target market.
    market_id: MarketId,
    /// Originating strategy.
    strategy: StrategyId,
    /// Rejection reason.
    reason: RejectReason,
  },
  /// A fill was reconciled into the ledger.
  OrderFilled {
    /// Target market.
    market_id: MarketId,
    /// Originating strategy.
    strategy: StrategyId,
    /// Exchange order id.
    order_id: OrderId,
    /// Outcome token.
    token: TokenSide,
    /// Buy or sell.
    side: Side,
    /// Fill price.
    price: f64,
    /// Filled shares.
    size: f64,
  },
  /// A risk check breached its limit.
  RiskBreach {
    /// Which check.
    check: RiskCheck,
    /// Observed value.
    value: f64,
    /// Configured limit.
    limit: f64,
  },
  /// The kill switch fired and open orders were force-cancelled.
  KillSwitchTriggered {
    /// Exposure at trigger time (USD).
    exposure: f64,
    /// Exposure limit (USD).
    limit: f64,
  },
}

impl TelemetryEvent {
  /// Event name as it appears on the wire.
  pub const fn name(&self) -> &'static str {
    match self {
      Self::StrategyFired { .. } => "strategy_fired",
      Self::OrderSubmitted { .. } => "order_submitted",
      Self::OrderRejected { .. } => "order_rejected",
      Self::OrderFilled { .. } => "order_filled",
      Self::RiskBreach { .. } => "risk_breach",
      Self::KillSwitchTriggered { .. } => "kill_switch_triggered",
    }
  }
}

/// Trait for telemetry sinks.
pub trait TelemetrySink: Send + Sync + 'static {
  /// Record one event.
  fn emit(&self, event: &TelemetryEvent);
}
