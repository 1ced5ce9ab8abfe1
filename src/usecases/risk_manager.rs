//! Risk Manager - Pre-flight Checks, Gate and Watchdog
//!
//! Three pieces:
//! - `RiskGate`: lock-free flags shared by the execution engine and the
//!   watchdog (kill switch, pause, size multiplier, loss streak)
//! - `RiskManager`: pure pre-flight checks run by the execution engine
//!   before every batch, plus loss-streak accounting per completed trade
//! - `RiskWatchdog`: independent task on its own timer; the only place
//!   with force-cancel authority
//!
//! Watchdog checks are cumulative and independent:
//! - exposure strictly above `max_exposure_pct × capital` → kill switch
//! - daily P&L below `-max_daily_loss_pct × starting capital` → pause
//!
//! Pre-flight and watchdog measure exposure against the same current
//! capital. The loss streak latches when the trade that completes it is
//! recorded: `loss_streak_threshold` consecutive losses reduce the size
//! multiplier for the next `recovery_trades` trades.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tracing::{info, instrument, warn};

use crate::config::RiskConfig;
use crate::error::{EngineError, EngineResult, RejectReason};
use crate::ports::telemetry::{RiskCheck, TelemetryEvent, TelemetrySink};

use super::execution::ExecHandle;
use super::ledger::{Ledger, LedgerSnapshot};
use super::now_ms;

// ────────────────────────────────────────────
// Pure checks
// ────────────────────────────────────────────

/// Kill-switch condition: exposure strictly above the ceiling.
pub fn exposure_breached(exposure: f64, capital: f64, max_exposure_pct: f64) -> bool {
  exposure > max_exposure_pct * capital
}

/// Daily-loss condition: P&L below the allowed loss.
pub fn daily_loss_breached(daily_pnl: f64, starting_capital: f64, max_daily_loss_pct: f64) -> bool {
  daily_pnl < -max_daily_loss_pct * starting_capital
}

// ────────────────────────────────────────────
// Gate
// ────────────────────────────────────────────

/// Effect of one completed trade on the size multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreakChange {
  /// Multiplier untouched.
  Unchanged,
  /// Streak reached the threshold; size reduced.
  Reduced {
    /// Consecutive losses that triggered it.
    losses: u32,
  },
  /// Recovery window ended; full size again.
  Restored,
}

/// Shared risk flags.
#[derive(Debug)]
pub struct RiskGate {
  kill_switch: AtomicBool,
  kill_since_ms: AtomicU64,
  paused_until_ms: AtomicU64,
  size_multiplier_bits: AtomicU64,
  consecutive_losses: AtomicU32,
  recovery_remaining: AtomicU32,
}

impl Default for RiskGate {
  fn default() -> Self {
    Self::new()
  }
}

impl RiskGate {
  /// Open gate, full size.
  pub fn new() -> Self {
    Self {
      kill_switch: AtomicBool::new(false),
      kill_since_ms: AtomicU64::new(0),
      paused_until_ms: AtomicU64::new(0),
      size_multiplier_bits: AtomicU64::new(1.0_f64.to_bits()),
      consecutive_losses: AtomicU32::new(0),
      recovery_remaining: AtomicU32::new(0),
    }
  }

  /// Whether the kill switch is latched.
  pub fn is_killed(&self) -> bool {
    self.kill_switch.load(Ordering::Acquire)
  }

  /// Latch the kill switch. Returns false if it was already latched.
  pub fn trigger_kill(&self, now_ms: u64) -> bool {
    let first = !self.kill_switch.swap(true, Ordering::AcqRel);
    if first {
      self.kill_since_ms.store(now_ms, Ordering::Release);
    }
    first
  }

  /// Operator reset of the kill switch.
  pub fn clear_kill(&self) {
    if self.kill_switch.swap(false, Ordering::AcqRel) {
      info!("Kill switch cleared");
    }
  }

  /// When the kill switch latched (Unix ms).
  pub fn kill_since_ms(&self) -> u64 {
    self.kill_since_ms.load(Ordering::Acquire)
  }

  /// Whether new submissions are paused at `now_ms`.
  pub fn is_paused(&self, now_ms: u64) -> bool {
    now_ms < self.paused_until_ms.load(Ordering::Acquire)
  }

  /// Pause new submissions until `until_ms`.
  pub fn pause_until(&self, until_ms: u64) {
    self.paused_until_ms.fetch_max(until_ms, Ordering::AcqRel);
  }

  /// Active size multiplier.
  pub fn size_multiplier(&self) -> f64 {
    f64::from_bits(self.size_multiplier_bits.load(Ordering::Acquire))
  }

  fn set_size_multiplier(&self, value: f64) {
    self.size_multiplier_bits.store(value.to_bits(), Ordering::Release);
  }

  /// Consecutive losing trades so far.
  pub fn consecutive_losses(&self) -> u32 {
    self.consecutive_losses.load(Ordering::Acquire)
  }

  /// Trades left before the multiplier resets.
  pub fn recovery_remaining(&self) -> u32 {
    self.recovery_remaining.load(Ordering::Acquire)
  }

  /// Count a completed trade. Called by the ledger writer only.
  pub fn record_trade(&self, pnl: f64, config: &RiskConfig) -> StreakChange {
    let losses = if pnl < 0.0 {
      self.consecutive_losses.fetch_add(1, Ordering::AcqRel) + 1
    } else {
      self.consecutive_losses.store(0, Ordering::Release);
      0
    };

    let remaining = self.recovery_remaining();
    if remaining > 0 {
      self.recovery_remaining.store(remaining - 1, Ordering::Release);
      if remaining == 1 {
        self.set_size_multiplier(1.0);
        return StreakChange::Restored;
      }
      return StreakChange::Unchanged;
    }

    if config.recovery_trades > 0 && losses >= config.loss_streak_threshold.max(1) {
      self.set_size_multiplier(config.loss_streak_size_mult);
      self.recovery_remaining.store(config.recovery_trades, Ordering::Release);
      self.consecutive_losses.store(0, Ordering::Release);
      return StreakChange::Reduced { losses };
    }
    StreakChange::Unchanged
  }

  /// Reject if the gate is closed.
  pub fn check_open(&self, now_ms: u64) -> EngineResult<()> {
    if self.is_killed() {
      return Err(EngineError::KillSwitchActive);
    }
    if self.is_paused(now_ms) {
      return Err(EngineError::reject(RejectReason::Paused, "daily-loss cooldown"));
    }
    Ok(())
  }
}

// ────────────────────────────────────────────
// Pre-flight
// ────────────────────────────────────────────

/// Pre-flight checks run inside the execution engine.
#[derive(Debug, Clone)]
pub struct RiskManager {
  config: RiskConfig,
  gate: Arc<RiskGate>,
}

impl RiskManager {
  /// Checks bound to a shared gate.
  pub const fn new(config: RiskConfig, gate: Arc<RiskGate>) -> Self {
    Self { config, gate }
  }

  /// Shared gate.
  pub fn gate(&self) -> &Arc<RiskGate> {
    &self.gate
  }

  /// Limits in force.
  pub const fn config(&self) -> &RiskConfig {
    &self.config
  }

  /// Count a completed trade and apply any streak change.
  pub fn record_trade(&self, pnl: f64) -> StreakChange {
    let change = self.gate.record_trade(pnl, &self.config);
    match change {
      StreakChange::Reduced { losses } => warn!(
        consecutive_losses = losses,
        multiplier = self.config.loss_streak_size_mult,
        trades = self.config.recovery_trades,
        "Loss streak, size reduced"
      ),
      StreakChange::Restored => info!("Recovery complete, size multiplier restored"),
      StreakChange::Unchanged => {},
    }
    change
  }

  /// Risk checks for a batch adding `buy_notional` to `market_id`.
  pub fn preflight(&self, ledger: &Ledger, market_id: &str, buy_notional: f64, now_ms: u64) -> EngineResult<()> {
    self.gate.check_open(now_ms)?;

    let starting = ledger.starting_capital();
    if daily_loss_breached(ledger.daily_pnl(), starting, self.config.max_daily_loss_pct) {
      return Err(EngineError::reject(
        RejectReason::DailyLoss,
        format!("daily pnl {:.2}", ledger.daily_pnl()),
      ));
    }

    let capital = ledger.capital();
    let exposure = ledger.exposure() + buy_notional;
    if exposure_breached(exposure, capital, self.config.max_exposure_pct) {
      return Err(EngineError::reject(
        RejectReason::Exposure,
        format!("exposure {exposure:.2} > {:.2}", self.config.max_exposure_pct * capital),
      ));
    }

    let market = ledger.market_exposure(market_id) + buy_notional;
    if buy_notional > 0.0 && market > self.config.max_market_exposure_pct * capital {
      return Err(EngineError::reject(
        RejectReason::PositionLimit,
        format!("market exposure {market:.2}"),
      ));
    }
    Ok(())
  }

  /// Reject a limit too far from the exchange midpoint.
  pub fn check_price(&self, price: f64, mid: f64) -> EngineResult<()> {
    if (price - mid).abs() > self.config.max_price_deviation {
      return Err(EngineError::reject(
        RejectReason::PriceSanity,
        format!("limit {price:.3} vs mid {mid:.3}"),
      ));
    }
    Ok(())
  }
}

// ────────────────────────────────────────────
// Watchdog
// ────────────────────────────────────────────

/// What one watchdog pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchdogReport {
  /// Kill switch latched this pass.
  pub killed: bool,
  /// Pause started this pass.
  pub paused: bool,
  /// Kill switch auto-cleared this pass.
  pub cleared: bool,
}

/// Independent risk monitor.
pub struct RiskWatchdog {
  config: RiskConfig,
  gate: Arc<RiskGate>,
  ledger: watch::Receiver<LedgerSnapshot>,
  exec: ExecHandle,
  telemetry: Arc<dyn TelemetrySink>,
}

impl RiskWatchdog {
  /// Watchdog over a ledger snapshot channel.
  pub fn new(
    config: RiskConfig,
    gate: Arc<RiskGate>,
    ledger: watch::Receiver<LedgerSnapshot>,
    exec: ExecHandle,
    telemetry: Arc<dyn TelemetrySink>,
  ) -> Self {
    Self {
      config,
      gate,
      ledger,
      exec,
      telemetry,
    }
  }

  /// One pass over the latest snapshot.
  pub async fn check(&self, now_ms: u64) -> WatchdogReport {
    let snap = self.ledger.borrow().clone();
    let mut report = WatchdogReport::default();

    // 1. Exposure → kill switch
    let limit = self.config.max_exposure_pct * snap.capital;
    if exposure_breached(snap.exposure, snap.capital, self.config.max_exposure_pct)
      && self.gate.trigger_kill(now_ms)
    {
      warn!(exposure = snap.exposure, limit, "Exposure breach, kill switch triggered");
      self.telemetry.emit(&TelemetryEvent::RiskBreach {
        check: RiskCheck::Exposure,
        value: snap.exposure,
        limit,
      });
      self.telemetry.emit(&TelemetryEvent::KillSwitchTriggered {
        exposure: snap.exposure,
        limit,
      });
      if let Err(e) = self.exec.kill_switch().await {
        warn!(error = %e, "Failed to queue kill-switch cancel");
      }
      report.killed = true;
    }

    // 2. Daily loss → pause
    let floor = -self.config.max_daily_loss_pct * snap.starting_capital;
    if daily_loss_breached(snap.daily_pnl, snap.starting_capital, self.config.max_daily_loss_pct)
      && !self.gate.is_paused(now_ms)
    {
      let until = now_ms + self.config.pause_duration_secs * 1_000;
      self.gate.pause_until(until);
      warn!(daily_pnl = snap.daily_pnl, floor, until, "Daily loss limit hit, pausing");
      self.telemetry.emit(&TelemetryEvent::RiskBreach {
        check: RiskCheck::DailyLoss,
        value: snap.daily_pnl,
        limit: floor,
      });
      report.paused = true;
    }

    // Timed kill-switch clear
    if self.config.kill_switch_clear_secs > 0
      && self.gate.is_killed()
      && !report.killed
      && now_ms.saturating_sub(self.gate.kill_since_ms()) >= self.config.kill_switch_clear_secs * 1_000
    {
      self.gate.clear_kill();
      report.cleared = true;
    }

    report
  }

  /// Run until shutdown on a fixed cadence.
  #[instrument(skip_all, name = "risk_watchdog")]
  pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
    let mut interval = tokio::time::interval(Duration::from_millis(self.config.check_interval_ms));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    info!(interval_ms = self.config.check_interval_ms, "Risk watchdog started");
    loop {
      tokio::select! {
        biased;
        _ = shutdown.recv() => {
          info!("Risk watchdog stopping");
          break;
        }
        _ = interval.tick() => {
          self.check(now_ms()).await;
        }
      }
    }
  }
}
