//! Signal Task - Feed Events In, Per-market Snapshots Out
//!
//! Single consumer of the merged feed stream. Each event is folded into
//! the `SignalEngine` and every market it touched gets a fresh snapshot
//! on its watch channel. Listing events spawn a `MarketWorker`; resolution
//! events settle through the execution engine and close the worker's
//! channel, which ends the worker.
//!
//! A one-second timer republishes every snapshot so a silent spot feed
//! shows up as stale even when no events arrive.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::config::AppConfig;
use crate::domain::market::{Market, MarketId};
use crate::ports::feed::{FeedEvent, FeedObserver, FeedSource};
use crate::ports::telemetry::TelemetrySink;
use crate::signals::{MarketSnapshot, SignalEngine};

use super::execution::ExecHandle;
use super::ledger::LedgerSnapshot;
use super::market_worker::MarketWorker;
use super::now_ms;
use super::risk_manager::RiskGate;

/// Staleness re-evaluation cadence.
const REFRESH_MS: u64 = 1_000;

/// Everything a market worker needs, cloned per spawn.
#[derive(Clone)]
pub struct WorkerDeps {
  /// Engine configuration.
  pub config: Arc<AppConfig>,
  /// Shared risk flags.
  pub gate: Arc<RiskGate>,
  /// Execution queue.
  pub exec: ExecHandle,
  /// Telemetry sink.
  pub telemetry: Arc<dyn TelemetrySink>,
  /// Ledger view.
  pub ledger: watch::Receiver<LedgerSnapshot>,
  /// Shutdown signal source.
  pub shutdown: broadcast::Sender<()>,
}

struct WorkerSlot {
  snapshots: watch::Sender<Option<MarketSnapshot>>,
  handle: JoinHandle<()>,
}

/// Signal engine driver and worker supervisor.
pub struct SignalTask {
  engine: SignalEngine,
  deps: WorkerDeps,
  observers: Vec<Arc<dyn FeedObserver>>,
  workers: HashMap<MarketId, WorkerSlot>,
}

impl SignalTask {
  /// Task over a fresh signal engine.
  pub fn new(deps: WorkerDeps) -> Self {
    Self {
      engine: SignalEngine::new(deps.config.signals.clone()),
      deps,
      observers: Vec::new(),
      workers: HashMap::new(),
    }
  }

  /// Let another component see every event first.
  #[must_use]
  pub fn with_observer(mut self, observer: Arc<dyn FeedObserver>) -> Self {
    self.observers.push(observer);
    self
  }

  /// Markets with a live worker.
  pub fn active_markets(&self) -> usize {
    self.workers.len()
  }

  /// Consume events until the source ends or shutdown.
  #[instrument(skip_all, name = "signal_task")]
  pub async fn run<F: FeedSource>(mut self, mut source: F) {
    let mut shutdown = self.deps.shutdown.subscribe();
    let mut refresh = tokio::time::interval(Duration::from_millis(REFRESH_MS));
    refresh.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    info!("Signal task started");

    loop {
      tokio::select! {
        biased;
        _ = shutdown.recv() => break,
        event = source.next_event() => {
          let Some(event) = event else {
            info!("Feed source exhausted");
            break;
          };
          self.on_event(event).await;
        }
        _ = refresh.tick() => self.refresh(now_ms()),
      }
    }
    self.stop_workers().await;
  }

  /// Apply one event.
  pub async fn on_event(&mut self, event: FeedEvent) {
    for observer in &self.observers {
      observer.observe(&event);
    }
    match event {
      FeedEvent::MarketListed { market } => self.list(market),
      FeedEvent::MarketResolved {
        market_id,
        winner,
        ts_ms,
      } => {
        info!(market = %market_id, winner = %winner, "Market resolved");
        if let Err(e) = self.deps.exec.resolve(market_id.clone(), winner, ts_ms).await {
          warn!(error = %e, "Settlement not queued");
        }
        self.engine.remove_market(&market_id);
        if let Some(slot) = self.workers.remove(&market_id) {
          // Dropping the sender ends the worker.
          drop(slot.snapshots);
          debug!(market = %market_id, finished = slot.handle.is_finished(), "Worker released");
        }
      },
      other => {
        let now = now_ms();
        for market_id in self.engine.apply(&other) {
          self.publish(&market_id, now);
        }
      },
    }
  }

  fn list(&mut self, market: Market) {
    if self.workers.contains_key(&market.id) {
      debug!(market = %market.id, "Duplicate listing ignored");
      return;
    }
    let now = now_ms();
    if now >= market.expiry_ms {
      warn!(market = %market.id, "Listing already expired, ignored");
      return;
    }
    info!(
      market = %market.id,
      asset = %market.asset,
      duration = %market.duration,
      reference = market.reference_price,
      "Market listed"
    );
    self.engine.add_market(market.clone());
    let (tx, rx) = watch::channel(self.engine.snapshot(&market.id, now));
    let worker = MarketWorker::new(
      market.clone(),
      &self.deps.config,
      Arc::clone(&self.deps.gate),
      self.deps.exec.clone(),
      Arc::clone(&self.deps.telemetry),
      self.deps.ledger.clone(),
    );
    let handle = tokio::spawn(worker.run(rx, self.deps.shutdown.subscribe()));
    self.workers.insert(
      market.id,
      WorkerSlot {
        snapshots: tx,
        handle,
      },
    );
  }

  fn publish(&self, market_id: &str, now: u64) {
    if let Some(slot) = self.workers.get(market_id) {
      slot.snapshots.send_replace(self.engine.snapshot(market_id, now));
    }
  }

  /// Recompute every market's snapshot at `now`.
  pub fn refresh(&mut self, now: u64) {
    self.workers.retain(|id, slot| {
      if slot.handle.is_finished() {
        warn!(market = %id, "Worker exited early");
        return false;
      }
      true
    });
    for market_id in self.workers.keys() {
      self.publish(market_id, now);
    }
  }

  async fn stop_workers(&mut self) {
    for (id, slot) in self.workers.drain() {
      drop(slot.snapshots);
      if tokio::time::timeout(Duration::from_secs(2), slot.handle).await.is_err() {
        warn!(market = %id, "Worker did not stop in time");
      }
    }
  }
}
