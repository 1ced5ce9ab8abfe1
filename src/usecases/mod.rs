//! Use Cases Layer - Long-running Engine Tasks
//!
//! Wires domain logic, signals and strategies to the port interfaces.
//! Each use case runs as its own task and talks to the others through
//! channels only.
//!
//! Use cases:
//! - `SignalTask`: folds feed events into signals, spawns market workers
//! - `MarketWorker`: lifecycle + orchestrator cycle for one market
//! - `ExecutionEngine`: single writer for orders, fills and the ledger
//! - `RiskWatchdog`: independent limit monitor with cancel authority
//! - `Ledger`: capital, positions and P&L (owned by the execution engine)

pub mod execution;
pub mod ledger;
pub mod market_worker;
pub mod risk_manager;
pub mod signal_task;

pub use execution::{EngineSinks, ExecCommand, ExecHandle, ExecutionEngine, NoticeSender};
pub use ledger::{Ledger, LedgerSnapshot};
pub use market_worker::MarketWorker;
pub use risk_manager::{RiskGate, RiskManager, RiskWatchdog, StreakChange, WatchdogReport};
pub use signal_task::{SignalTask, WorkerDeps};

/// Wall-clock time as Unix milliseconds.
pub fn now_ms() -> u64 {
  u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default()
}
