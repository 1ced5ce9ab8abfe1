//! Prometheus Telemetry Sink - Engine Observability
//!
//! Folds every `TelemetryEvent` into Prometheus counters, gauges and
//! histograms and serves them on `/metrics` for Grafana dashboards.
//! All metric names share the `updown_engine_` prefix.

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use prometheus::{
    CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

use crate::ports::telemetry::{TelemetryEvent, TelemetrySink};

/// Prometheus-backed telemetry sink.
pub struct PrometheusSink {
    /// Prometheus registry.
    registry: Registry,
    /// Accepted strategy batches.
    pub strategy_fired: IntCounterVec,
    /// Notional per accepted batch (USD).
    pub batch_notional: HistogramVec,
    /// Risk-adjusted expected profit of arbitrage batches (USD).
    pub arb_expected_profit: HistogramVec,
    /// Orders that reached the exchange.
    pub orders_submitted: IntCounterVec,
    /// Intents refused before submission.
    pub orders_rejected: IntCounterVec,
    /// Reconciled fills.
    pub orders_filled: IntCounterVec,
    /// Shares filled.
    pub filled_shares: CounterVec,
    /// Risk limit breaches.
    pub risk_breaches: IntCounterVec,
    /// 1 once the kill switch has fired.
    pub kill_switch_active: Gauge,
    /// Exposure observed when the kill switch fired (USD).
    pub kill_switch_exposure: Gauge,
}

impl PrometheusSink {
    /// Create and register all metrics.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let strategy_fired = IntCounterVec::new(
            Opts::new("updown_engine_strategy_fired_total", "Strategy batches accepted by the orchestrator"),
            &["strategy", "regime", "phase"],
        )?;

        let batch_notional = HistogramVec::new(
            HistogramOpts::new("updown_engine_batch_notional_usd", "Notional per accepted batch")
                .buckets(vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 1000.0]),
            &["strategy"],
        )?;

        let arb_expected_profit = HistogramVec::new(
            HistogramOpts::new(
                "updown_engine_expected_profit_usd",
                "Risk-adjusted expected profit reported with a batch",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0]),
            &["strategy"],
        )?;

        let orders_submitted = IntCounterVec::new(
            Opts::new("updown_engine_orders_submitted_total", "Orders that reached the exchange"),
            &["strategy", "side", "order_type"],
        )?;

        let orders_rejected = IntCounterVec::new(
            Opts::new("updown_engine_orders_rejected_total", "Intents refused before submission"),
            &["strategy", "reason"],
        )?;

        let orders_filled = IntCounterVec::new(
            Opts::new("updown_engine_orders_filled_total", "Fills reconciled into the ledger"),
            &["strategy", "side"],
        )?;

        let filled_shares = CounterVec::new(
            Opts::new("updown_engine_filled_shares_total", "Outcome shares filled"),
            &["strategy", "token"],
        )?;

        let risk_breaches = IntCounterVec::new(
            Opts::new("updown_engine_risk_breaches_total", "Risk limit breaches"),
            &["check"],
        )?;

        let kill_switch_active = Gauge::new(
            "updown_engine_kill_switch_active",
            "Whether the kill switch has fired (1=yes, 0=no)",
        )?;

        let kill_switch_exposure = Gauge::new(
            "updown_engine_kill_switch_exposure_usd",
            "Exposure when the kill switch fired",
        )?;

        registry.register(Box::new(strategy_fired.clone()))?;
        registry.register(Box::new(batch_notional.clone()))?;
        registry.register(Box::new(arb_expected_profit.clone()))?;
        registry.register(Box::new(orders_submitted.clone()))?;
        registry.register(Box::new(orders_rejected.clone()))?;
        registry.register(Box::new(orders_filled.clone()))?;
        registry.register(Box::new(filled_shares.clone()))?;
        registry.register(Box::new(risk_breaches.clone()))?;
        registry.register(Box::new(kill_switch_active.clone()))?;
        registry.register(Box::new(kill_switch_exposure.clone()))?;

        Ok(Self {
            registry,
            strategy_fired,
            batch_notional,
            arb_expected_profit,
            orders_submitted,
            orders_rejected,
            orders_filled,
            filled_shares,
            risk_breaches,
            kill_switch_active,
            kill_switch_exposure,
        })
    }

    /// Text exposition of every registered metric.
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
            warn!(error = %e, "Failed to encode metrics");
        }
        String::from_utf8(buffer).unwrap_or_default()
    }

    /// Serve `/metrics` on the configured bind address.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn serve(
        self: Arc<Self>,
        bind_address: String,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> anyhow::Result<()> {
        let sink = Arc::clone(&self);
        let app = Router::new().route(
            "/metrics",
            get(move || {
                let sink = Arc::clone(&sink);
                async move { sink.render() }
            }),
        );

        let listener = tokio::net::TcpListener::bind(&bind_address).await?;
        info!(address = %bind_address, "Prometheus metrics server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }
}

impl TelemetrySink for PrometheusSink {
    fn emit(&self, event: &TelemetryEvent) {
        match event {
            TelemetryEvent::StrategyFired {
                strategy,
                regime,
                phase,
                notional,
                expected_profit,
                ..
            } => {
                let phase = phase.to_string();
                self.strategy_fired
                    .with_label_values(&[strategy.as_str(), regime.as_str(), phase.as_str()])
                    .inc();
                self.batch_notional
                    .with_label_values(&[strategy.as_str()])
                    .observe(*notional);
                if let Some(profit) = expected_profit {
                    self.arb_expected_profit
                        .with_label_values(&[strategy.as_str()])
                        .observe(*profit);
                }
            }
            TelemetryEvent::OrderSubmitted {
                strategy,
                side,
                order_type,
                ..
            } => {
                let side = side.to_string();
                let order_type = format!("{order_type:?}");
                self.orders_submitted
                    .with_label_values(&[strategy.as_str(), side.as_str(), order_type.as_str()])
                    .inc();
            }
            TelemetryEvent::OrderRejected {
                strategy, reason, ..
            } => {
                let reason = reason.to_string();
                self.orders_rejected
                    .with_label_values(&[strategy.as_str(), reason.as_str()])
                    .inc();
            }
            TelemetryEvent::OrderFilled {
                strategy,
                token,
                side,
                size,
                ..
            } => {
                let side = side.to_string();
                let token = token.to_string();
                self.orders_filled
                    .with_label_values(&[strategy.as_str(), side.as_str()])
                    .inc();
                self.filled_shares
                    .with_label_values(&[strategy.as_str(), token.as_str()])
                    .inc_by(*size);
            }
            TelemetryEvent::RiskBreach { check, .. } => {
                self.risk_breaches.with_label_values(&[check.as_str()]).inc();
            }
            TelemetryEvent::KillSwitchTriggered { exposure, .. } => {
                self.kill_switch_active.set(1.0);
                self.kill_switch_exposure.set(*exposure);
            }
        }
    }
}
