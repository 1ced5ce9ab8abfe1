//! Health Check Server - Liveness and Readiness Probes
//!
//! Exposes /live and /ready endpoints via axum 0.7. Ready means the
//! feed has delivered at least one event, the execution engine is
//! running and the kill switch is not latched.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use tokio::sync::broadcast;
use tracing::{info, instrument};

use crate::ports::feed::{FeedEvent, FeedObserver};
use crate::usecases::risk_manager::RiskGate;

/// Shared health state polled by readiness probes.
#[derive(Debug)]
pub struct HealthState {
    /// Set on the first feed event.
    pub feed_seen: AtomicBool,
    /// Whether the execution engine task is running.
    pub engine_running: AtomicBool,
    /// Risk flags.
    gate: Arc<RiskGate>,
}

impl HealthState {
    /// Fresh state: nothing seen, engine not yet running.
    pub fn new(gate: Arc<RiskGate>) -> Self {
        Self {
            feed_seen: AtomicBool::new(false),
            engine_running: AtomicBool::new(false),
            gate,
        }
    }

    /// Check if the engine is ready to trade.
    pub fn is_ready(&self) -> bool {
        self.feed_seen.load(Ordering::Relaxed)
            && self.engine_running.load(Ordering::Relaxed)
            && !self.gate.is_killed()
    }
}

impl FeedObserver for HealthState {
    fn observe(&self, _event: &FeedEvent) {
        self.feed_seen.store(true, Ordering::Relaxed);
    }
}

/// Axum-based health check HTTP server.
pub struct HealthServer {
    /// Health state shared with all components.
    state: Arc<HealthState>,
    /// Bind port.
    port: u16,
}

impl HealthServer {
    /// Create a new health server.
    pub const fn new(state: Arc<HealthState>, port: u16) -> Self {
        Self { state, port }
    }

    fn router(&self) -> Router {
        Router::new()
            .route("/live", get(Self::liveness))
            .route("/ready", get(Self::readiness))
            .with_state(Arc::clone(&self.state))
    }

    /// Serve until shutdown.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) -> anyhow::Result<()> {
        let app = self.router();
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        info!(address = %addr, "Health server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }

    /// Liveness probe: always 200 while the process is up.
    async fn liveness() -> impl IntoResponse {
        (StatusCode::OK, "OK")
    }

    async fn readiness(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
        if state.is_ready() {
            (StatusCode::OK, "READY")
        } else {
            (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::Asset;

    #[test]
    fn test_ready_needs_feed_engine_and_no_kill() {
        let gate = Arc::new(RiskGate::new());
        let state = HealthState::new(Arc::clone(&gate));
        assert!(!state.is_ready());

        state.observe(&FeedEvent::SpotTick {
            asset: Asset::BTC,
            price: 1.0,
            ts_ms: 1,
        });
        state.engine_running.store(true, Ordering::Relaxed);
        assert!(state.is_ready());

        gate.trigger_kill(5);
        assert!(!state.is_ready());
    }
}
