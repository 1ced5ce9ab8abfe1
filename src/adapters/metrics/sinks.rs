//! Log and fan-out telemetry sinks.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::ports::telemetry::{TelemetryEvent, TelemetrySink};

/// One structured log line per event, under the `telemetry` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn emit(&self, event: &TelemetryEvent) {
        match event {
            TelemetryEvent::StrategyFired {
                market_id,
                strategy,
                regime,
                phase,
                notional,
                orders,
                expected_profit,
            } => info!(
                target: "telemetry",
                event = event.name(),
                market = %market_id,
                strategy = %strategy,
                regime = %regime,
                phase = %phase,
                notional,
                orders,
                expected_profit = expected_profit.unwrap_or_default(),
            ),
            TelemetryEvent::OrderSubmitted {
                market_id,
                strategy,
                order_id,
                token,
                side,
                price,
                size,
                order_type,
            } => info!(
                target: "telemetry",
                event = event.name(),
                market = %market_id,
                strategy = %strategy,
                order = %order_id,
                token = %token,
                side = %side,
                price,
                size,
                order_type = ?order_type,
            ),
            TelemetryEvent::OrderRejected {
                market_id,
                strategy,
                reason,
            } => warn!(
                target: "telemetry",
                event = event.name(),
                market = %market_id,
                strategy = %strategy,
                reason = %reason,
            ),
            TelemetryEvent::OrderFilled {
                market_id,
                strategy,
                order_id,
                token,
                side,
                price,
                size,
            } => info!(
                target: "telemetry",
                event = event.name(),
                market = %market_id,
                strategy = %strategy,
                order = %order_id,
                token = %token,
                side = %side,
                price,
                size,
            ),
            TelemetryEvent::RiskBreach { check, value, limit } => warn!(
                target: "telemetry",
                event = event.name(),
                check = check.as_str(),
                value,
                limit,
            ),
            TelemetryEvent::KillSwitchTriggered { exposure, limit } => error!(
                target: "telemetry",
                event = event.name(),
                exposure,
                limit,
            ),
        }
    }
}

/// Forwards every event to each inner sink in order.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn TelemetrySink>>,
}

impl FanoutSink {
    /// Empty fan-out.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink.
    #[must_use]
    pub fn with(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Number of inner sinks.
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Whether no sinks are attached.
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl TelemetrySink for FanoutSink {
    fn emit(&self, event: &TelemetryEvent) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }
}
