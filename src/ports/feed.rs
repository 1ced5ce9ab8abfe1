//! Feed Port - Normalized Market Data Events
//!
//! The spot and target-market feed collaborators, plus market discovery
//! and resolution, all deliver into one ordered stream of `FeedEvent`s.
//! Transport (WebSocket, REST polling, replay file) is an adapter concern.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::domain::book::Level;
use crate::domain::market::{Asset, Market, MarketId, TokenId, TokenSide};
use crate::domain::order::Side;

/// Which side of the perpetual book was liquidated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiquidatedSide {
  /// Longs force-sold (bearish pressure).
  Long,
  /// Shorts force-bought (bullish pressure).
  Short,
}

/// One normalized event from an external collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedEvent {
  /// Spot price tick.
  SpotTick {
    /// Underlying asset.
    asset: Asset,
    /// Last price.
    price: f64,
    /// Exchange timestamp (Unix ms).
    ts_ms: u64,
  },
  /// Spot trade with aggressor side.
  SpotTrade {
    /// Underlying asset.
    asset: Asset,
    /// Trade price.
    price: f64,
    /// Trade size in base units.
    size: f64,
    /// Aggressor side.
    side: Side,
    /// Exchange timestamp (Unix ms).
    ts_ms: u64,
  },
  /// Forced liquidation on the perpetual market.
  Liquidation {
    /// Underlying asset.
    asset: Asset,
    /// Liquidated side.
    side: LiquidatedSide,
    /// Liquidated notional (USD).
    notional: f64,
    /// Exchange timestamp (Unix ms).
    ts_ms: u64,
  },
  /// Perpetual funding rate update.
  FundingRate {
    /// Underlying asset.
    asset: Asset,
    /// Current funding rate.
    rate: f64,
    /// Exchange timestamp (Unix ms).
    ts_ms: u64,
  },
  /// Outcome-token book snapshot or delta.
  Book {
    /// Token the levels belong to.
    token_id: TokenId,
    /// Bid levels (price, size).
    bids: Vec<Level>,
    /// Ask levels (price, size).
    asks: Vec<Level>,
    /// Full replacement when true, level delta otherwise.
    #[serde(default)]
    snapshot: bool,
    /// Exchange timestamp (Unix ms).
    ts_ms: u64,
  },
  /// Discovery: a market is about to open.
  MarketListed {
    /// Resolved market metadata.
    market: Market,
  },
  /// Resolution: the winning outcome is known.
  MarketResolved {
    /// Resolved market.
    market_id: MarketId,
    /// Token that pays $1.
    winner: TokenSide,
    /// Resolution timestamp (Unix ms).
    ts_ms: u64,
  },
}

impl FeedEvent {
  /// Event timestamp, when the event carries one.
  pub fn ts_ms(&self) -> Option<u64> {
    match self {
      Self::SpotTick { ts_ms, .. }
      | Self::SpotTrade { ts_ms, .. }
      | Self::Liquidation { ts_ms, .. }
      | Self::FundingRate { ts_ms, .. }
      | Self::Book { ts_ms, .. }
      | Self::MarketResolved { ts_ms, .. } => Some(*ts_ms),
      Self::MarketListed { .. } => None,
    }
  }

  /// Whether this event may be coalesced under back-pressure.
  pub const fn is_coalescable(&self) -> bool {
    matches!(self, Self::Book { .. })
  }
}

/// Ordered source of feed events.
#[async_trait]
pub trait FeedSource: Send + 'static {
  /// Next event, or `None` once the source is exhausted.
  async fn next_event(&mut self) -> Option<FeedEvent>;
}

#[async_trait]
impl FeedSource for mpsc::Receiver<FeedEvent> {
  async fn next_event(&mut self) -> Option<FeedEvent> {
    self.recv().await
  }
}

/// Passive tap on the event stream (book caches, recorders).
pub trait FeedObserver: Send + Sync + 'static {
  /// See one event before it is applied.
  fn observe(&self, event: &FeedEvent);
}
