//! Market Worker - Lifecycle and Decision Cycle for One Market
//!
//! One worker per active market. It owns the phase tracker and the
//! strategy instances, runs the orchestrator whenever new signals land
//! (and on a short timer so phase boundaries are never missed), and hands
//! accepted batches to the execution engine. Outcomes come back on the
//! worker's notice channel and are routed to the strategy that produced
//! the batch.
//!
//! On LOCKOUT the worker asks the execution engine to cancel every
//! resting order in the market. Paired-batch imbalances are resolved
//! here, after the strategy has seen the report.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, instrument, warn};

use crate::config::AppConfig;
use crate::domain::lifecycle::{Phase, PhaseTracker, phase_at};
use crate::domain::market::Market;
use crate::domain::order::{BatchKind, StrategyId};
use crate::domain::position::Position;
use crate::error::EngineError;
use crate::ports::telemetry::{RiskCheck, TelemetryEvent, TelemetrySink};
use crate::signals::MarketSnapshot;
use crate::strategies::{
  ImbalanceHandler, Orchestrator, PairReport, StrategyContext, StrategyNotice, StrategySet,
};

use super::execution::ExecHandle;
use super::ledger::LedgerSnapshot;
use super::now_ms;
use super::risk_manager::RiskGate;

/// Timer cadence between signal updates.
const TICK_MS: u64 = 250;
/// Notice queue depth per market.
const NOTICE_CAPACITY: usize = 256;

/// Decision loop for one market.
pub struct MarketWorker {
  market: Market,
  tracker: PhaseTracker,
  strategies: StrategySet,
  orchestrator: Orchestrator,
  imbalance: ImbalanceHandler,
  min_fill_ratio: f64,
  stale_after_ms: u64,
  gate: Arc<RiskGate>,
  exec: ExecHandle,
  telemetry: Arc<dyn TelemetrySink>,
  ledger: watch::Receiver<LedgerSnapshot>,
  latest: Option<MarketSnapshot>,
  stale_reported: bool,
}

impl MarketWorker {
  /// Worker with a fresh strategy set built from config.
  pub fn new(
    market: Market,
    config: &AppConfig,
    gate: Arc<RiskGate>,
    exec: ExecHandle,
    telemetry: Arc<dyn TelemetrySink>,
    ledger: watch::Receiver<LedgerSnapshot>,
  ) -> Self {
    Self {
      tracker: PhaseTracker::new(&market),
      strategies: StrategySet::from_config(&config.strategy, &config.orchestrator),
      orchestrator: Orchestrator::new(config.orchestrator.clone()),
      imbalance: ImbalanceHandler::new(&config.strategy.imbalance),
      min_fill_ratio: config.strategy.straddle.min_fill_ratio,
      stale_after_ms: config.signals.stale_after_ms,
      market,
      gate,
      exec,
      telemetry,
      ledger,
      latest: None,
      stale_reported: false,
    }
  }

  /// Replace the strategy set (tests, custom wiring).
  #[must_use]
  pub fn with_strategies(mut self, strategies: StrategySet) -> Self {
    self.strategies = strategies;
    self
  }

  /// Current lifecycle phase.
  pub const fn phase(&self) -> Phase {
    self.tracker.current()
  }

  /// Run until shutdown or until the market's snapshot channel closes.
  #[instrument(skip_all, fields(market = %self.market.id))]
  pub async fn run(
    mut self,
    mut snapshots: watch::Receiver<Option<MarketSnapshot>>,
    mut shutdown: broadcast::Receiver<()>,
  ) {
    let (notice_tx, mut notices) = mpsc::channel(NOTICE_CAPACITY);
    if let Err(e) = self.exec.register(self.market.clone(), notice_tx).await {
      warn!(error = %e, "Could not register with execution engine");
      return;
    }
    let mut tick = tokio::time::interval(Duration::from_millis(TICK_MS));
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    info!(asset = %self.market.asset, duration = %self.market.duration, "Market worker started");

    loop {
      tokio::select! {
        biased;
        _ = shutdown.recv() => break,
        Some((strategy, notice)) = notices.recv() => {
          self.on_notice(strategy, notice, now_ms()).await;
        }
        changed = snapshots.changed() => {
          if changed.is_err() {
            debug!("Snapshot channel closed");
            break;
          }
          self.latest = snapshots.borrow_and_update().clone();
          self.cycle(now_ms()).await;
        }
        _ = tick.tick() => {
          self.cycle(now_ms()).await;
        }
      }
    }
    info!(phase = %self.tracker.current(), "Market worker stopped");
  }

  /// Feed a signal snapshot without going through the channel.
  pub fn set_snapshot(&mut self, snapshot: MarketSnapshot) {
    self.latest = Some(snapshot);
  }

  /// One decision cycle at `now`.
  pub async fn cycle(&mut self, now: u64) {
    if let Some(t) = self.tracker.observe(now) {
      info!(from = %t.from, to = %t.to, "Phase transition");
      if t.from < Phase::Lockout && t.to >= Phase::Lockout {
        if let Err(e) = self.exec.cancel_market(self.market.id.clone()).await {
          warn!(error = %e, "Lockout cancel not queued");
        }
      }
    }
    let phase = self.tracker.current();
    let Some(snapshot) = self.latest.as_ref() else {
      return;
    };

    if snapshot.signals.stale {
      if !self.stale_reported {
        let err = EngineError::StaleData {
          asset: self.market.asset,
          silent_ms: self.stale_after_ms,
        };
        warn!(error = %err, "Strategies suspended");
        self.telemetry.emit(&TelemetryEvent::RiskBreach {
          check: RiskCheck::StaleFeed,
          value: self.stale_after_ms as f64,
          limit: self.stale_after_ms as f64,
        });
        self.stale_reported = true;
      }
    } else if self.stale_reported {
      info!("Spot feed recovered");
      self.stale_reported = false;
    }

    let (position, capital, committed) = {
      let view = self.ledger.borrow();
      (
        view
          .position(&self.market.id)
          .cloned()
          .unwrap_or_else(|| Position::new(self.market.id.clone())),
        view.available,
        view.committed(&self.market.id),
      )
    };
    let ctx = StrategyContext {
      market: &self.market,
      phase,
      snapshot,
      position: &position,
      capital,
      budget: capital,
      size_multiplier: self.gate.size_multiplier(),
      now_ms: now,
    };

    let batches = self.orchestrator.run(&mut self.strategies, &ctx, committed);
    for batch in batches {
      if batch.kind != BatchKind::Withdraw {
        let expected_profit = match batch.strategy {
          StrategyId::Arbitrage => snapshot.signals.arb.map(|a| a.risk_adjusted_profit),
          _ => None,
        };
        self.telemetry.emit(&TelemetryEvent::StrategyFired {
          market_id: self.market.id.clone(),
          strategy: batch.strategy,
          regime: snapshot.signals.regime,
          phase,
          notional: batch.notional(),
          orders: batch.intents.len(),
          expected_profit,
        });
      }
      if let Err(e) = self.exec.submit(batch).await {
        warn!(error = %e, "Batch not queued");
        return;
      }
    }
  }

  /// Route one outcome to its strategy; resolve pair imbalances.
  pub async fn on_notice(&mut self, strategy: StrategyId, notice: StrategyNotice, now: u64) {
    self.strategies.notify(strategy, &notice);
    if let StrategyNotice::PairFilled(report) = notice {
      self.resolve_imbalance(strategy, &report, now).await;
    }
  }

  async fn resolve_imbalance(&mut self, strategy: StrategyId, report: &PairReport, now: u64) {
    let short = report.is_short(self.min_fill_ratio);
    if short {
      warn!(
        strategy = %strategy,
        matched = report.matched(),
        legs = ?report.legs,
        "Paired batch under-filled"
      );
    }
    // Straddle legs filled at or above the ratio are left as they are.
    if strategy == StrategyId::Straddle && !short {
      return;
    }
    if (report.legs[0].filled - report.legs[1].filled).abs() <= f64::EPSILON {
      return;
    }
    if !phase_at(self.market.duration, self.market.open_ms, now).permits_new_orders() {
      debug!("Imbalance left for settlement, market locked");
      return;
    }
    let Some(snapshot) = self.latest.as_ref() else {
      return;
    };
    let (_, batch) = self
      .imbalance
      .resolve(&self.market, strategy, report, snapshot, now);
    if let Some(batch) = batch {
      if let Err(e) = self.exec.submit(batch).await {
        warn!(error = %e, "Imbalance batch not queued");
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::market::{Asset, DurationClass, TokenSide};
  use crate::domain::order::Side;
  use crate::domain::signal::VolRegime;
  use crate::strategies::LegFill;
  use crate::usecases::execution::ExecCommand;
  use std::sync::Mutex;

  #[derive(Default)]
  struct Recorder(Mutex<Vec<TelemetryEvent>>);

  impl TelemetrySink for Recorder {
    fn emit(&self, event: &TelemetryEvent) {
      self.0.lock().unwrap().push(event.clone());
    }
  }

  fn market() -> Market {
    Market {
      id: "btc-5m".into(),
      asset: Asset::BTC,
      duration: DurationClass::FiveMin,
      open_ms: 0,
      expiry_ms: 300_000,
      reference_price: 100_000.0,
      yes_token: "yes".into(),
      no_token: "no".into(),
    }
  }

  fn snapshot(stale: bool) -> MarketSnapshot {
    let mut yes = crate::domain::book::OrderBook::new("yes");
    yes.apply_snapshot(&[(0.44, 500.0)], &[(0.46, 500.0)], 0);
    let mut no = crate::domain::book::OrderBook::new("no");
    no.apply_snapshot(&[(0.42, 500.0)], &[(0.44, 500.0)], 0);
    MarketSnapshot {
      signals: crate::domain::signal::MarketSignals {
        regime: VolRegime::Medium,
        spot_price: Some(100_000.0),
        fair_prob_up: 0.5,
        bias: crate::domain::signal::BiasSignal::neutral(),
        arb: None,
        momentum: None,
        compression: None,
        tape: crate::domain::signal::TapeSignal::default(),
        stale,
        computed_ms: 0,
      },
      yes_book: yes,
      no_book: no,
    }
  }

  fn config() -> AppConfig {
    crate::config::loader::parse_config("[bot]\nname = \"t\"\nstarting_capital = 100.0\n").unwrap()
  }

  fn worker() -> (MarketWorker, mpsc::Receiver<ExecCommand>, Arc<Recorder>) {
    let (exec, rx) = ExecHandle::channel(64);
    let recorder = Arc::new(Recorder::default());
    let (_tx, ledger) = watch::channel(LedgerSnapshot {
      available: 100.0,
      capital: 100.0,
      starting_capital: 100.0,
      ..LedgerSnapshot::default()
    });
    let w = MarketWorker::new(
      market(),
      &config(),
      Arc::new(RiskGate::new()),
      exec,
      recorder.clone(),
      ledger,
    )
    .with_strategies(StrategySet::new(Vec::new()));
    (w, rx, recorder)
  }

  #[tokio::test]
  async fn test_lockout_transition_cancels_market() {
    let (mut w, mut rx, _) = worker();
    w.cycle(100_000).await;
    assert_eq!(w.phase(), Phase::Prime);
    assert!(rx.try_recv().is_err());
    w.cycle(275_000).await;
    assert_eq!(w.phase(), Phase::Lockout);
    assert!(matches!(rx.try_recv(), Ok(ExecCommand::CancelMarket(id)) if id == "btc-5m"));
    w.cycle(276_000).await;
    assert!(rx.try_recv().is_err());
  }

  #[tokio::test]
  async fn test_stale_feed_reported_once() {
    let (mut w, _rx, recorder) = worker();
    w.set_snapshot(snapshot(true));
    w.cycle(60_000).await;
    w.cycle(61_000).await;
    let breaches = recorder
      .0
      .lock()
      .unwrap()
      .iter()
      .filter(|e| matches!(e, TelemetryEvent::RiskBreach { check: RiskCheck::StaleFeed, .. }))
      .count();
    assert_eq!(breaches, 1);
  }

  #[tokio::test]
  async fn test_uneven_pair_gets_completed() {
    let (mut w, mut rx, _) = worker();
    w.set_snapshot(snapshot(false));
    w.cycle(60_000).await;
    let report = PairReport {
      legs: [
        LegFill {
          token: TokenSide::Yes,
          requested: 100.0,
          filled: 100.0,
          avg_price: 0.46,
        },
        LegFill {
          token: TokenSide::No,
          requested: 100.0,
          filled: 40.0,
          avg_price: 0.44,
        },
      ],
    };
    w.on_notice(StrategyId::Straddle, StrategyNotice::PairFilled(report), 61_000)
      .await;
    let Ok(ExecCommand::Submit(batch)) = rx.try_recv() else {
      panic!("expected corrective batch");
    };
    let i = &batch.intents[0];
    assert_eq!((i.token_side(), i.side()), (TokenSide::No, Side::Buy));
    assert!((i.size() - 60.0).abs() < 1e-9);
    assert_eq!(batch.strategy, StrategyId::Straddle);
  }

  fn leg(token: TokenSide, filled: f64, avg_price: f64) -> LegFill {
    LegFill {
      token,
      requested: 100.0,
      filled,
      avg_price,
    }
  }

  #[tokio::test]
  async fn test_straddle_above_fill_ratio_left_alone() {
    let (mut w, mut rx, _) = worker();
    w.set_snapshot(snapshot(false));
    w.cycle(60_000).await;
    let report = PairReport {
      legs: [leg(TokenSide::Yes, 100.0, 0.46), leg(TokenSide::No, 85.0, 0.44)],
    };
    w.on_notice(StrategyId::Straddle, StrategyNotice::PairFilled(report), 61_000)
      .await;
    assert!(rx.try_recv().is_err());
  }

  #[tokio::test]
  async fn test_arb_imbalance_handled_above_fill_ratio() {
    let (mut w, mut rx, _) = worker();
    w.set_snapshot(snapshot(false));
    w.cycle(60_000).await;
    let report = PairReport {
      legs: [leg(TokenSide::Yes, 100.0, 0.46), leg(TokenSide::No, 85.0, 0.44)],
    };
    w.on_notice(StrategyId::Arbitrage, StrategyNotice::PairFilled(report), 61_000)
      .await;
    assert!(matches!(rx.try_recv(), Ok(ExecCommand::Submit(b)) if b.strategy == StrategyId::Arbitrage));
  }
}
