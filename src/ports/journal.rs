//! Journal Port - Append-only Trade Record
//!
//! Every reconciled fill and every market settlement is appended as one
//! self-contained JSON line. The journal is an audit trail, not ledger
//! ground truth: the engine never reads it back.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::market::{MarketId, OrderId, TokenSide};
use crate::domain::order::{Side, StrategyId};

/// One journal line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JournalEntry {
  /// A fill reconciled into the ledger.
  Fill {
    /// Market traded.
    market_id: MarketId,
    /// Exchange order id.
    order_id: OrderId,
    /// Originating strategy.
    strategy: StrategyId,
    /// Outcome token.
    token: TokenSide,
    /// Buy or sell.
    side: Side,
    /// Fill price.
    price: f64,
    /// Filled shares.
    size: f64,
    /// Realized P&L booked by this fill (sells only).
    realized_pnl: f64,
    /// Fill timestamp (Unix ms).
    ts_ms: u64,
  },
  /// A market resolved and its position was paid out.
  Settlement {
    /// Market settled.
    market_id: MarketId,
    /// Winning token.
    winner: TokenSide,
    /// Payout minus cost basis (USD).
    pnl: f64,
    /// Resolution timestamp (Unix ms).
    ts_ms: u64,
  },
}

impl JournalEntry {
  /// Timestamp of the entry.
  pub const fn ts_ms(&self) -> u64 {
    match self {
      Self::Fill { ts_ms, .. } | Self::Settlement { ts_ms, .. } => *ts_ms,
    }
  }
}

/// Trait for trade journals.
#[async_trait]
pub trait TradeJournal: Send + Sync + 'static {
  /// Append one entry.
  async fn append(&self, entry: &JournalEntry) -> anyhow::Result<()>;
}
