//! Execution Engine - Single Writer for Orders and Capital
//!
//! Every submission for every market passes through this one task. It
//! owns the `Ledger`, so capital and positions are never raced.
//!
//! Pipeline per batch:
//! 1. Risk pre-flight (kill switch, pause, daily loss, exposure, market cap)
//! 2. Lifecycle lockout
//! 3. Price sanity against the exchange midpoint
//! 4. Fresh-book edge recheck for arb pairs
//! 5. Balance
//! 6. Signing
//! 7. Submission (one call per batch; same-market singles queued in the
//!    same cycle are merged into one call)
//! 8. Ledger tracking and fill subscription
//!
//! Submission failures are never retried. Cancels retry with bounded
//! exponential backoff.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, error, info, instrument, warn};

use crate::config::ExecutionConfig;
use crate::domain::lifecycle::phase_at;
use crate::domain::market::{Market, MarketId, OrderId, TokenSide};
use crate::domain::order::{Batch, BatchKind, Fill, OrderIntent, OrderResult, OrderStatus, Side, SignedOrder, StrategyId};
use crate::error::{EngineError, EngineResult, RejectReason};
use crate::ports::exchange::ExchangeClient;
use crate::ports::journal::{JournalEntry, TradeJournal};
use crate::ports::signer::OrderSigner;
use crate::ports::telemetry::{RiskCheck, TelemetryEvent, TelemetrySink};
use crate::signals::ArbScanner;
use crate::strategies::{LegFill, PairReport, StrategyNotice};

use super::ledger::{Ledger, LedgerSnapshot};
use super::now_ms;
use super::risk_manager::{RiskManager, StreakChange};

/// Pending-pair timeout sweep cadence.
const PAIR_SWEEP_MS: u64 = 100;
/// Fills held while their order is not yet tracked.
const MAX_ORPHAN_FILLS: usize = 1_024;
const DUST: f64 = 1e-9;

/// Channel a market worker receives batch outcomes on.
pub type NoticeSender = mpsc::Sender<(StrategyId, StrategyNotice)>;

// ────────────────────────────────────────────
// Commands
// ────────────────────────────────────────────

/// Work accepted by the execution engine.
#[derive(Debug)]
pub enum ExecCommand {
  /// Route outcomes for a market to its worker.
  Register {
    /// Market metadata.
    market: Market,
    /// Worker notice channel.
    notices: NoticeSender,
  },
  /// Submit a batch.
  Submit(Batch),
  /// Cancel every resting order in a market.
  CancelMarket(MarketId),
  /// Settle a resolved market.
  Resolve {
    /// Resolved market.
    market_id: MarketId,
    /// Winning token.
    winner: TokenSide,
    /// Resolution time (Unix ms).
    ts_ms: u64,
  },
  /// Force-cancel everything. Issued by the risk watchdog.
  KillSwitch,
  /// Start a new trading day.
  ResetDaily,
}

/// Cloneable sender side of the execution queue.
#[derive(Debug, Clone)]
pub struct ExecHandle {
  tx: mpsc::Sender<ExecCommand>,
}

impl ExecHandle {
  /// Bounded queue and its handle.
  pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ExecCommand>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (Self { tx }, rx)
  }

  async fn send(&self, cmd: ExecCommand) -> anyhow::Result<()> {
    self
      .tx
      .send(cmd)
      .await
      .map_err(|_| anyhow::anyhow!("execution engine stopped"))
  }

  /// Register a market worker.
  pub async fn register(&self, market: Market, notices: NoticeSender) -> anyhow::Result<()> {
    self.send(ExecCommand::Register { market, notices }).await
  }

  /// Queue a batch for submission.
  pub async fn submit(&self, batch: Batch) -> anyhow::Result<()> {
    self.send(ExecCommand::Submit(batch)).await
  }

  /// Queue a market-wide cancel.
  pub async fn cancel_market(&self, market_id: MarketId) -> anyhow::Result<()> {
    self.send(ExecCommand::CancelMarket(market_id)).await
  }

  /// Queue a settlement.
  pub async fn resolve(&self, market_id: MarketId, winner: TokenSide, ts_ms: u64) -> anyhow::Result<()> {
    self
      .send(ExecCommand::Resolve {
        market_id,
        winner,
        ts_ms,
      })
      .await
  }

  /// Queue a kill-switch cancel.
  pub async fn kill_switch(&self) -> anyhow::Result<()> {
    self.send(ExecCommand::KillSwitch).await
  }

  /// Queue a daily reset.
  pub async fn reset_daily(&self) -> anyhow::Result<()> {
    self.send(ExecCommand::ResetDaily).await
  }
}

// ────────────────────────────────────────────
// Pair tracking
// ────────────────────────────────────────────

#[derive(Debug, Clone)]
struct PairLeg {
  order_id: Option<OrderId>,
  token: TokenSide,
  requested: f64,
  limit: f64,
  reported: f64,
  reported_avg: f64,
  streamed: f64,
  streamed_notional: f64,
}

impl PairLeg {
  fn new(intent: &OrderIntent, result: Option<&OrderResult>) -> Self {
    let accepted = result.filter(|r| r.status != OrderStatus::Rejected && !r.order_id.is_empty());
    Self {
      order_id: accepted.map(|r| r.order_id.clone()),
      token: intent.token_side(),
      requested: intent.size(),
      limit: intent.price(),
      reported: accepted.map_or(0.0, |r| r.filled_size),
      reported_avg: accepted.map_or(0.0, |r| r.avg_price),
      streamed: 0.0,
      streamed_notional: 0.0,
    }
  }

  fn settled(&self) -> bool {
    self.streamed + DUST >= self.reported
  }

  fn fill(&self) -> LegFill {
    let filled = self.reported.max(self.streamed);
    let avg_price = if self.streamed > DUST {
      self.streamed_notional / self.streamed
    } else if self.reported_avg > 0.0 {
      self.reported_avg
    } else {
      self.limit
    };
    LegFill {
      token: self.token,
      requested: self.requested,
      filled,
      avg_price,
    }
  }
}

#[derive(Debug, Clone)]
struct PendingPair {
  market_id: MarketId,
  strategy: StrategyId,
  legs: [PairLeg; 2],
  deadline_ms: u64,
}

impl PendingPair {
  fn settled(&self) -> bool {
    self.legs.iter().all(PairLeg::settled)
  }

  fn report(&self) -> PairReport {
    PairReport {
      legs: [self.legs[0].fill(), self.legs[1].fill()],
    }
  }
}

// ────────────────────────────────────────────
// Engine
// ────────────────────────────────────────────

/// Outbound sinks the engine reports to.
#[derive(Clone)]
pub struct EngineSinks {
  /// Structured events.
  pub telemetry: Arc<dyn TelemetrySink>,
  /// Fill and settlement audit log.
  pub journal: Arc<dyn TradeJournal>,
}

/// Serialized order pipeline.
pub struct ExecutionEngine<E: ExchangeClient, S: OrderSigner> {
  config: ExecutionConfig,
  exchange: Arc<E>,
  signer: Arc<S>,
  risk: RiskManager,
  arb: ArbScanner,
  ledger: Ledger,
  routes: HashMap<MarketId, (Market, NoticeSender)>,
  pairs: Vec<PendingPair>,
  orphans: Vec<Fill>,
  sinks: EngineSinks,
  snapshot_tx: watch::Sender<LedgerSnapshot>,
}

impl<E: ExchangeClient, S: OrderSigner> ExecutionEngine<E, S> {
  /// Engine over a fresh ledger.
  pub fn new(
    config: ExecutionConfig,
    exchange: Arc<E>,
    signer: Arc<S>,
    risk: RiskManager,
    arb: ArbScanner,
    ledger: Ledger,
    sinks: EngineSinks,
  ) -> Self {
    let (snapshot_tx, _) = watch::channel(ledger.snapshot());
    Self {
      config,
      exchange,
      signer,
      risk,
      arb,
      ledger,
      routes: HashMap::new(),
      pairs: Vec::new(),
      orphans: Vec::new(),
      sinks,
      snapshot_tx,
    }
  }

  /// Ledger view updated after every change.
  pub fn subscribe(&self) -> watch::Receiver<LedgerSnapshot> {
    self.snapshot_tx.subscribe()
  }

  /// Ledger owned by the engine.
  pub const fn ledger(&self) -> &Ledger {
    &self.ledger
  }

  /// Run until shutdown. Open orders are cancelled on the way out.
  #[instrument(skip_all, name = "execution_engine")]
  pub async fn run(mut self, mut commands: mpsc::Receiver<ExecCommand>, mut shutdown: broadcast::Receiver<()>) {
    let mut fills = self.exchange.subscribe_fills();
    let mut sweep = tokio::time::interval(Duration::from_millis(PAIR_SWEEP_MS));
    sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    info!("Execution engine started");

    loop {
      tokio::select! {
        biased;
        _ = shutdown.recv() => {
          info!("Execution engine stopping, cancelling open orders");
          self.cancel_everything().await;
          break;
        }
        Some(fill) = fills.next() => {
          self.on_fill(fill).await;
        }
        cmd = commands.recv() => {
          let Some(cmd) = cmd else {
            info!("Command channel closed");
            self.cancel_everything().await;
            break;
          };
          let mut queue = vec![cmd];
          while let Ok(next) = commands.try_recv() {
            queue.push(next);
          }
          self.dispatch(queue).await;
        }
        _ = sweep.tick() => {
          self.sweep_pairs(now_ms());
        }
      }
    }
  }

  /// Handle one drained queue. Consecutive single-order batches are
  /// grouped per market and submitted together.
  pub async fn dispatch(&mut self, queue: Vec<ExecCommand>) {
    let mut singles: Vec<Batch> = Vec::new();
    for cmd in queue {
      match cmd {
        ExecCommand::Submit(batch) if batch.kind == BatchKind::Single => singles.push(batch),
        other => {
          self.flush_singles(std::mem::take(&mut singles)).await;
          self.handle(other).await;
        }
      }
    }
    self.flush_singles(singles).await;
  }

  async fn handle(&mut self, cmd: ExecCommand) {
    match cmd {
      ExecCommand::Register { market, notices } => {
        debug!(market = %market.id, "Market registered");
        self.routes.insert(market.id.clone(), (market, notices));
      },
      ExecCommand::Submit(batch) => self.submit_batch(batch).await,
      ExecCommand::CancelMarket(market_id) => {
        let _ = self.cancel_market(&market_id).await;
        self.publish();
      },
      ExecCommand::Resolve {
        market_id,
        winner,
        ts_ms,
      } => self.resolve(&market_id, winner, ts_ms).await,
      ExecCommand::KillSwitch => {
        warn!("Kill switch: cancelling all open orders");
        self.cancel_everything().await;
      },
      ExecCommand::ResetDaily => {
        self.ledger.reset_daily();
        info!(capital = self.ledger.capital(), "Daily counters reset");
        self.publish();
      },
    }
  }

  // ── Submission ──

  async fn flush_singles(&mut self, singles: Vec<Batch>) {
    if singles.is_empty() {
      return;
    }
    let mut by_market: Vec<(MarketId, Vec<Batch>)> = Vec::new();
    for batch in singles {
      match by_market.iter_mut().find(|(m, _)| *m == batch.market_id) {
        Some((_, group)) => group.push(batch),
        None => by_market.push((batch.market_id.clone(), vec![batch])),
      }
    }

    for (market_id, group) in by_market {
      let now = now_ms();
      let mut ready: Vec<(Batch, Vec<SignedOrder>)> = Vec::with_capacity(group.len());
      for batch in group {
        match self.prepare(&batch, now).await {
          Ok(signed) => ready.push((batch, signed)),
          Err(e) => self.refuse(&batch, &e),
        }
      }
      if ready.is_empty() {
        continue;
      }

      let orders: Vec<SignedOrder> = ready.iter().flat_map(|(_, s)| s.iter().cloned()).collect();
      match self.send_orders(&orders).await {
        Ok(results) => {
          let mut results = results.into_iter();
          for (batch, signed) in ready {
            let batch_results: Vec<OrderResult> = results.by_ref().take(signed.len()).collect();
            self.record(&batch, batch_results, now).await;
          }
        },
        Err(e) => {
          let err = EngineError::NetworkSubmit {
            market: market_id.clone(),
            source: e,
          };
          error!(error = %err, orders = orders.len(), "Submission failed");
          for (batch, _) in ready {
            self.notify(&batch.market_id, batch.strategy, StrategyNotice::SubmitFailed);
          }
        },
      }
      self.publish();
    }
  }

  #[instrument(skip(self, batch), fields(market = %batch.market_id, strategy = %batch.strategy, kind = ?batch.kind))]
  async fn submit_batch(&mut self, batch: Batch) {
    if matches!(batch.kind, BatchKind::Requote | BatchKind::Withdraw) {
      // Stale quotes must be gone before new ones rest.
      if let Err(e) = self.cancel_market(&batch.market_id).await {
        warn!(error = %e, "Stale quotes still resting, batch dropped");
        self.notify(&batch.market_id, batch.strategy, StrategyNotice::Dropped);
        self.publish();
        return;
      }
      if batch.kind == BatchKind::Withdraw {
        self.publish();
        return;
      }
    }
    if batch.intents.is_empty() {
      self.publish();
      return;
    }

    let now = now_ms();
    let signed = match self.prepare(&batch, now).await {
      Ok(signed) => signed,
      Err(e) => {
        self.refuse(&batch, &e);
        self.publish();
        return;
      },
    };

    match self.send_orders(&signed).await {
      Ok(results) => self.record(&batch, results, now).await,
      Err(e) => {
        let err = EngineError::NetworkSubmit {
          market: batch.market_id.clone(),
          source: e,
        };
        error!(error = %err, "Submission failed");
        self.notify(&batch.market_id, batch.strategy, StrategyNotice::SubmitFailed);
      },
    }
    self.publish();
  }

  async fn send_orders(&self, orders: &[SignedOrder]) -> anyhow::Result<Vec<OrderResult>> {
    match orders {
      [one] => Ok(vec![self.exchange.submit_single(one).await?]),
      many => {
        let results = self.exchange.submit_batch(many).await?;
        if results.len() != many.len() {
          warn!(sent = many.len(), returned = results.len(), "Batch result count mismatch");
        }
        Ok(results)
      },
    }
  }

  /// Run every pre-submission check and sign the batch.
  async fn prepare(&self, batch: &Batch, now: u64) -> EngineResult<Vec<SignedOrder>> {
    let buy_notional: f64 = batch
      .intents
      .iter()
      .filter(|i| i.side() == Side::Buy)
      .map(OrderIntent::notional)
      .sum();
    self.risk.preflight(&self.ledger, &batch.market_id, buy_notional, now)?;

    if let Some((market, _)) = self.routes.get(&batch.market_id) {
      if !phase_at(market.duration, market.open_ms, now).permits_new_orders() {
        return Err(EngineError::MarketLocked(batch.market_id.clone()));
      }
    }

    for intent in &batch.intents {
      match self.exchange.get_midpoint(intent.token_id()).await {
        Ok(Some(mid)) => self.risk.check_price(intent.price(), mid)?,
        Ok(None) => {},
        Err(e) => {
          return Err(EngineError::reject(
            RejectReason::PriceSanity,
            format!("midpoint unavailable: {e}"),
          ));
        },
      }
    }

    if let BatchKind::Paired { recheck_edge: true } = batch.kind {
      self.recheck_edge(batch).await?;
    }

    if buy_notional > self.ledger.available() + DUST {
      return Err(EngineError::reject(
        RejectReason::Balance,
        format!("need {buy_notional:.2}, have {:.2}", self.ledger.available()),
      ));
    }

    let mut signed = Vec::with_capacity(batch.intents.len());
    for intent in &batch.intents {
      signed.push(self.signer.sign(intent).await.map_err(EngineError::Signing)?);
    }
    Ok(signed)
  }

  async fn recheck_edge(&self, batch: &Batch) -> EngineResult<()> {
    let stale = |detail: String| EngineError::reject(RejectReason::StaleEdge, detail);
    let (Some(yes), Some(no)) = (
      batch.intents.iter().find(|i| i.token_side() == TokenSide::Yes),
      batch.intents.iter().find(|i| i.token_side() == TokenSide::No),
    ) else {
      return Err(stale("pair is missing a leg".into()));
    };
    let yes_book = self
      .exchange
      .get_book(yes.token_id())
      .await
      .map_err(|e| stale(format!("book fetch failed: {e}")))?;
    let no_book = self
      .exchange
      .get_book(no.token_id())
      .await
      .map_err(|e| stale(format!("book fetch failed: {e}")))?;
    match self.arb.scan(&yes_book, &no_book, 1.0) {
      Some(arb) => {
        debug!(edge = arb.edge, size = arb.executable_size, "Edge confirmed");
        Ok(())
      },
      None => Err(stale(format!(
        "asks {:?} + {:?}",
        yes_book.best_ask(),
        no_book.best_ask()
      ))),
    }
  }

  fn refuse(&self, batch: &Batch, err: &EngineError) {
    match err.reject_reason() {
      Some(reason) => {
        info!(market = %batch.market_id, strategy = %batch.strategy, %reason, detail = %err, "Batch rejected");
        self.sinks.telemetry.emit(&TelemetryEvent::OrderRejected {
          market_id: batch.market_id.clone(),
          strategy: batch.strategy,
          reason,
        });
        self.notify(&batch.market_id, batch.strategy, StrategyNotice::Rejected { reason });
      },
      None => {
        warn!(market = %batch.market_id, strategy = %batch.strategy, error = %err, "Batch not sent");
        self.notify(&batch.market_id, batch.strategy, StrategyNotice::SubmitFailed);
      },
    }
  }

  /// Book accepted orders and start pair tracking.
  async fn record(&mut self, batch: &Batch, results: Vec<OrderResult>, now: u64) {
    for (intent, result) in batch.intents.iter().zip(&results) {
      self.ledger.track_order(intent, result);
      if result.status == OrderStatus::Rejected {
        debug!(order_id = %result.order_id, "Exchange rejected order");
        continue;
      }
      self.sinks.telemetry.emit(&TelemetryEvent::OrderSubmitted {
        market_id: batch.market_id.clone(),
        strategy: batch.strategy,
        order_id: result.order_id.clone(),
        token: intent.token_side(),
        side: intent.side(),
        price: intent.price(),
        size: intent.size(),
        order_type: intent.order_type(),
      });
      info!(
        order_id = %result.order_id,
        market = %batch.market_id,
        strategy = %batch.strategy,
        token = %intent.token_side(),
        price = intent.price(),
        size = intent.size(),
        status = ?result.status,
        "Order submitted"
      );
    }

    self.notify(
      &batch.market_id,
      batch.strategy,
      StrategyNotice::Submitted {
        kind: batch.kind,
        results: results.clone(),
      },
    );

    if let (BatchKind::Paired { .. }, [a, b]) = (batch.kind, batch.intents.as_slice()) {
      let pair = PendingPair {
        market_id: batch.market_id.clone(),
        strategy: batch.strategy,
        legs: [PairLeg::new(a, results.first()), PairLeg::new(b, results.get(1))],
        deadline_ms: now + self.config.pair_fill_timeout_ms,
      };
      self.pairs.push(pair);
    }

    self.retry_orphans().await;
    self.complete_settled_pairs();
  }

  // ── Fills ──

  async fn on_fill(&mut self, fill: Fill) {
    if self.ledger.order(&fill.order_id).is_none() {
      debug!(order_id = %fill.order_id, "Fill ahead of its order, holding");
      if self.orphans.len() >= MAX_ORPHAN_FILLS {
        let dropped = self.orphans.remove(0);
        warn!(order_id = %dropped.order_id, "Orphan fill buffer full, dropping oldest");
      }
      self.orphans.push(fill);
      return;
    }
    self.reconcile(&fill).await;
    self.complete_settled_pairs();
    self.publish();
  }

  async fn reconcile(&mut self, fill: &Fill) {
    let Some(applied) = self.ledger.apply_fill(fill) else {
      return;
    };
    info!(
      order_id = %fill.order_id,
      market = %applied.market_id,
      strategy = %applied.strategy,
      token = %applied.token,
      side = ?applied.side,
      price = applied.price,
      size = applied.size,
      realized_pnl = applied.realized_pnl,
      "Fill reconciled"
    );
    self.sinks.telemetry.emit(&TelemetryEvent::OrderFilled {
      market_id: applied.market_id.clone(),
      strategy: applied.strategy,
      order_id: fill.order_id.clone(),
      token: applied.token,
      side: applied.side,
      price: applied.price,
      size: applied.size,
    });
    let entry = JournalEntry::Fill {
      market_id: applied.market_id.clone(),
      order_id: fill.order_id.clone(),
      strategy: applied.strategy,
      token: applied.token,
      side: applied.side,
      price: applied.price,
      size: applied.size,
      realized_pnl: applied.realized_pnl,
      ts_ms: fill.ts_ms,
    };
    if let Err(e) = self.sinks.journal.append(&entry).await {
      warn!(error = %e, "Journal append failed");
    }
    if applied.side == Side::Sell {
      self.count_trade(applied.realized_pnl);
    }

    for pair in &mut self.pairs {
      for leg in &mut pair.legs {
        if leg.order_id.as_deref() == Some(fill.order_id.as_str()) {
          leg.streamed += fill.size;
          leg.streamed_notional += fill.size * fill.price;
        }
      }
    }

    self.notify(
      &applied.market_id,
      applied.strategy,
      StrategyNotice::Filled {
        token: applied.token,
        side: applied.side,
        price: applied.price,
        size: applied.size,
      },
    );
  }

  async fn retry_orphans(&mut self) {
    if self.orphans.is_empty() {
      return;
    }
    let (known, unknown): (Vec<Fill>, Vec<Fill>) = std::mem::take(&mut self.orphans)
      .into_iter()
      .partition(|f| self.ledger.order(&f.order_id).is_some());
    self.orphans = unknown;
    for fill in known {
      debug!(order_id = %fill.order_id, "Held fill matched");
      self.reconcile(&fill).await;
    }
  }

  fn complete_settled_pairs(&mut self) {
    let (done, open): (Vec<PendingPair>, Vec<PendingPair>) =
      std::mem::take(&mut self.pairs).into_iter().partition(PendingPair::settled);
    self.pairs = open;
    for pair in done {
      self.finish_pair(&pair);
    }
  }

  /// Close out pairs whose fills did not all stream in time.
  pub fn sweep_pairs(&mut self, now: u64) {
    let (expired, open): (Vec<PendingPair>, Vec<PendingPair>) =
      std::mem::take(&mut self.pairs).into_iter().partition(|p| now >= p.deadline_ms);
    self.pairs = open;
    for pair in expired {
      warn!(market = %pair.market_id, strategy = %pair.strategy, "Pair fill confirmation timed out");
      self.finish_pair(&pair);
    }
  }

  fn finish_pair(&self, pair: &PendingPair) {
    let report = pair.report();
    debug!(
      market = %pair.market_id,
      strategy = %pair.strategy,
      matched = report.matched(),
      locked_profit = report.locked_profit(),
      "Pair fills known"
    );
    self.notify(&pair.market_id, pair.strategy, StrategyNotice::PairFilled(report));
  }

  // ── Cancels and settlement ──

  async fn cancel_with_retry(&self, market_id: &MarketId) -> EngineResult<usize> {
    let mut attempts = 0;
    loop {
      match self.exchange.cancel_all(market_id).await {
        Ok(n) => return Ok(n),
        Err(e) => {
          attempts += 1;
          if attempts >= self.config.cancel_max_attempts {
            return Err(EngineError::NetworkCancel { attempts, source: e });
          }
          let delay = self.config.cancel_base_delay_ms << (attempts - 1);
          warn!(market = %market_id, attempts, delay_ms = delay, error = %e, "Cancel failed, retrying");
          tokio::time::sleep(Duration::from_millis(delay)).await;
        },
      }
    }
  }

  async fn cancel_market(&mut self, market_id: &MarketId) -> EngineResult<()> {
    if self.ledger.live_orders(market_id).is_empty() {
      return Ok(());
    }
    match self.cancel_with_retry(market_id).await {
      Ok(n) => {
        let local = self.ledger.cancel_market(market_id);
        info!(market = %market_id, exchange = n, local, "Orders cancelled");
        Ok(())
      },
      Err(e) => {
        error!(market = %market_id, error = %e, "Cancel gave up; orders may still rest");
        Err(e)
      },
    }
  }

  async fn cancel_everything(&mut self) {
    for market_id in self.ledger.active_markets() {
      // Failures are logged; keep going with the other markets.
      let _ = self.cancel_market(&market_id).await;
    }
    self.publish();
  }

  async fn resolve(&mut self, market_id: &MarketId, winner: TokenSide, ts_ms: u64) {
    self.ledger.cancel_market(market_id);
    let outcome = self.ledger.settle(market_id, winner);
    self.pairs.retain(|p| &p.market_id != market_id);
    self.routes.remove(market_id);

    if outcome.had_position {
      info!(
        market = %market_id,
        winner = %winner,
        pnl = outcome.pnl,
        by_strategy = ?outcome.by_strategy,
        "Market settled"
      );
      self.count_trade(outcome.pnl);
      let entry = JournalEntry::Settlement {
        market_id: market_id.clone(),
        winner,
        pnl: outcome.pnl,
        ts_ms,
      };
      if let Err(e) = self.sinks.journal.append(&entry).await {
        warn!(error = %e, "Journal append failed");
      }
    } else {
      debug!(market = %market_id, "Resolved with no position");
    }
    self.publish();
  }

  fn count_trade(&self, pnl: f64) {
    if let StreakChange::Reduced { losses } = self.risk.record_trade(pnl) {
      self.sinks.telemetry.emit(&TelemetryEvent::RiskBreach {
        check: RiskCheck::LossStreak,
        value: f64::from(losses),
        limit: f64::from(self.risk.config().loss_streak_threshold),
      });
    }
  }

  // ── Routing ──

  fn notify(&self, market_id: &str, strategy: StrategyId, notice: StrategyNotice) {
    let Some((_, tx)) = self.routes.get(market_id) else {
      return;
    };
    if let Err(e) = tx.try_send((strategy, notice)) {
      warn!(market = %market_id, strategy = %strategy, error = %e, "Notice not delivered");
    }
  }

  fn publish(&self) {
    self.snapshot_tx.send_replace(self.ledger.snapshot());
  }
}
