//! Ledger - Capital, Positions and Open Orders
//!
//! Owned by the execution engine, which is its only writer. Everyone
//! else reads the `LedgerSnapshot` it publishes after each change.
//!
//! Accounting:
//! - `cash` moves only on confirmed fills and settlements
//! - open buy orders reserve `price × remaining` against `cash`
//! - buys reported filled but not yet streamed stay reserved until the
//!   fill stream confirms them
//! - capital is marked at cost: `cash + cost basis of held tokens`
//! - daily P&L is realized P&L (sells against average cost, settlements)

use std::collections::HashMap;

use rust_decimal::Decimal;
use rust_decimal::prelude::*;
use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::market::{MarketId, OrderId, TokenId, TokenSide};
use crate::domain::order::{Fill, OrderIntent, OrderResult, OrderStatus, Side, StrategyId};
use crate::domain::position::Position;

/// Shares below this count as nothing.
const DUST: f64 = 1e-9;

fn dec(value: f64) -> Decimal {
  Decimal::from_f64(value).unwrap_or(Decimal::ZERO)
}

fn float(value: Decimal) -> f64 {
  value.to_f64().unwrap_or(0.0)
}

/// An order the exchange accepted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderRecord {
  /// Market it belongs to.
  pub market_id: MarketId,
  /// Token traded.
  pub token_id: TokenId,
  /// YES or NO.
  pub token: TokenSide,
  /// Buy or sell.
  pub side: Side,
  /// Limit price.
  pub price: f64,
  /// Shares requested.
  pub size: f64,
  /// Shares filled according to the submission result.
  pub reported: f64,
  /// Shares confirmed on the fill stream.
  pub streamed: f64,
  /// Originating strategy.
  pub strategy: StrategyId,
  /// Still resting at the exchange as far as we know.
  pub live: bool,
}

impl OrderRecord {
  /// Shares still working.
  pub fn remaining(&self) -> f64 {
    if self.live {
      (self.size - self.reported.max(self.streamed)).max(0.0)
    } else {
      0.0
    }
  }

  /// Shares reported filled that the fill stream has not confirmed.
  pub fn unconfirmed(&self) -> f64 {
    (self.reported - self.streamed).max(0.0)
  }

  /// Capital this order reserves.
  pub fn reserved(&self) -> f64 {
    match self.side {
      Side::Buy => self.price * (self.remaining() + self.unconfirmed()),
      Side::Sell => 0.0,
    }
  }
}

/// What a fill did to the books.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedFill {
  /// Market of the order.
  pub market_id: MarketId,
  /// Originating strategy.
  pub strategy: StrategyId,
  /// Token traded.
  pub token: TokenSide,
  /// Buy or sell.
  pub side: Side,
  /// Execution price.
  pub price: f64,
  /// Shares applied (sells capped at holdings).
  pub size: f64,
  /// Realized P&L for sells, zero for buys.
  pub realized_pnl: f64,
}

/// Result of settling a resolved market.
#[derive(Debug, Clone, PartialEq)]
pub struct SettlementOutcome {
  /// Resolved market.
  pub market_id: MarketId,
  /// Winning token.
  pub winner: TokenSide,
  /// Payout minus remaining cost basis.
  pub pnl: f64,
  /// Same, per strategy.
  pub by_strategy: Vec<(StrategyId, f64)>,
  /// Whether any position was held.
  pub had_position: bool,
}

/// Read-only view published to workers and the risk watchdog.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LedgerSnapshot {
  /// Capital at start of day.
  pub starting_capital: f64,
  /// Cash plus cost basis of held tokens.
  pub capital: f64,
  /// Cash not reserved by open buy orders.
  pub available: f64,
  /// Open buy notional plus held cost basis.
  pub exposure: f64,
  /// Realized P&L since the daily reset.
  pub daily_pnl: f64,
  /// Positions by market.
  pub positions: HashMap<MarketId, Position>,
  /// Exposure per market.
  pub market_exposure: HashMap<MarketId, f64>,
  /// Realized P&L per strategy since the daily reset.
  pub strategy_pnl: HashMap<StrategyId, f64>,
  /// Orders believed to be resting.
  pub open_orders: usize,
}

impl LedgerSnapshot {
  /// Position in one market.
  pub fn position(&self, market_id: &str) -> Option<&Position> {
    self.positions.get(market_id)
  }

  /// Exposure in one market.
  pub fn committed(&self, market_id: &str) -> f64 {
    self.market_exposure.get(market_id).copied().unwrap_or(0.0)
  }
}

/// Single-writer capital ledger.
#[derive(Debug, Clone)]
pub struct Ledger {
  starting_capital: Decimal,
  cash: Decimal,
  daily_pnl: Decimal,
  positions: HashMap<MarketId, Position>,
  strategy_positions: HashMap<(MarketId, StrategyId), Position>,
  strategy_pnl: HashMap<StrategyId, Decimal>,
  orders: HashMap<OrderId, OrderRecord>,
}

impl Ledger {
  /// Fresh ledger with all capital in cash.
  pub fn new(starting_capital: f64) -> Self {
    let start = dec(starting_capital);
    Self {
      starting_capital: start,
      cash: start,
      daily_pnl: Decimal::ZERO,
      positions: HashMap::new(),
      strategy_positions: HashMap::new(),
      strategy_pnl: HashMap::new(),
      orders: HashMap::new(),
    }
  }

  /// Capital at start of day.
  pub fn starting_capital(&self) -> f64 {
    float(self.starting_capital)
  }

  /// Cash plus cost basis of held tokens.
  pub fn capital(&self) -> f64 {
    float(self.cash + self.positions.values().map(Position::cost_basis).sum::<Decimal>())
  }

  /// Cash not reserved by open buy orders.
  pub fn available(&self) -> f64 {
    float(self.cash) - self.orders.values().map(OrderRecord::reserved).sum::<f64>()
  }

  /// Realized P&L since the daily reset.
  pub fn daily_pnl(&self) -> f64 {
    float(self.daily_pnl)
  }

  /// Open buy notional plus held cost basis, all markets.
  pub fn exposure(&self) -> f64 {
    let held: Decimal = self.positions.values().map(Position::cost_basis).sum();
    float(held) + self.orders.values().map(OrderRecord::reserved).sum::<f64>()
  }

  /// Open buy notional plus held cost basis, one market.
  pub fn market_exposure(&self, market_id: &str) -> f64 {
    let held = self
      .positions
      .get(market_id)
      .map_or(Decimal::ZERO, Position::cost_basis);
    float(held)
      + self
        .orders
        .values()
        .filter(|o| o.market_id == market_id)
        .map(OrderRecord::reserved)
        .sum::<f64>()
  }

  /// Position in one market.
  pub fn position(&self, market_id: &str) -> Option<&Position> {
    self.positions.get(market_id)
  }

  /// An order by id.
  pub fn order(&self, order_id: &str) -> Option<&OrderRecord> {
    self.orders.get(order_id)
  }

  /// Ids of orders still resting in a market.
  pub fn live_orders(&self, market_id: &str) -> Vec<OrderId> {
    self
      .orders
      .iter()
      .filter(|(_, o)| o.live && o.market_id == market_id)
      .map(|(id, _)| id.clone())
      .collect()
  }

  /// Markets with any tracked order or position.
  pub fn active_markets(&self) -> Vec<MarketId> {
    let mut ids: Vec<MarketId> = self.positions.keys().cloned().collect();
    for o in self.orders.values().filter(|o| o.live) {
      if !ids.contains(&o.market_id) {
        ids.push(o.market_id.clone());
      }
    }
    ids
  }

  /// Record an accepted order from its submission result.
  pub fn track_order(&mut self, intent: &OrderIntent, result: &OrderResult) {
    if result.order_id.is_empty() || result.status == OrderStatus::Rejected {
      return;
    }
    let live = intent.order_type().is_resting()
      && matches!(result.status, OrderStatus::Open | OrderStatus::Partial);
    let record = OrderRecord {
      market_id: intent.market_id().clone(),
      token_id: intent.token_id().clone(),
      token: intent.token_side(),
      side: intent.side(),
      price: intent.price(),
      size: intent.size(),
      reported: result.filled_size,
      streamed: 0.0,
      strategy: intent.strategy(),
      live,
    };
    debug!(order_id = %result.order_id, live, "Order tracked");
    self.orders.insert(result.order_id.clone(), record);
  }

  /// Apply a confirmed fill. Unknown order ids are ignored.
  pub fn apply_fill(&mut self, fill: &Fill) -> Option<AppliedFill> {
    let Some(order) = self.orders.get_mut(&fill.order_id) else {
      warn!(order_id = %fill.order_id, "Fill for unknown order");
      return None;
    };
    order.streamed += fill.size;
    if order.live && order.size - order.streamed <= DUST {
      order.live = false;
    }
    let (market_id, strategy, token) = (order.market_id.clone(), order.strategy, order.token);

    let price = dec(fill.price);
    let size = dec(fill.size);
    let (pnl, applied) = self
      .positions
      .entry(market_id.clone())
      .or_insert_with(|| Position::new(market_id.clone()))
      .apply_fill(token, fill.side, price, size);
    self
      .strategy_positions
      .entry((market_id.clone(), strategy))
      .or_insert_with(|| Position::new(market_id.clone()))
      .apply_fill(token, fill.side, price, size);

    match fill.side {
      Side::Buy => self.cash -= price * applied,
      Side::Sell => {
        if applied < size {
          warn!(order_id = %fill.order_id, "Sell fill exceeds holdings, capped");
        }
        self.cash += price * applied;
        self.daily_pnl += pnl;
        *self.strategy_pnl.entry(strategy).or_default() += pnl;
      }
    }

    Some(AppliedFill {
      market_id,
      strategy,
      token,
      side: fill.side,
      price: fill.price,
      size: float(applied),
      realized_pnl: float(pnl),
    })
  }

  /// Mark one order as no longer resting.
  pub fn cancel_order(&mut self, order_id: &str) {
    if let Some(o) = self.orders.get_mut(order_id) {
      o.live = false;
    }
  }

  /// Mark every order in a market as no longer resting. Records are kept
  /// so a late fill still reconciles.
  pub fn cancel_market(&mut self, market_id: &str) -> usize {
    let mut n = 0;
    for o in self.orders.values_mut().filter(|o| o.live && o.market_id == market_id) {
      o.live = false;
      n += 1;
    }
    n
  }

  /// Settle a resolved market: winning tokens pay $1.
  pub fn settle(&mut self, market_id: &str, winner: TokenSide) -> SettlementOutcome {
    let position = self.positions.remove(market_id).unwrap_or_default();
    let had_position = !position.is_flat() || position.cost_basis() != Decimal::ZERO;
    let pnl = position.settle(winner);
    self.cash += position.held(winner);
    self.daily_pnl += pnl;

    let keys: Vec<(MarketId, StrategyId)> = self
      .strategy_positions
      .keys()
      .filter(|(m, _)| m == market_id)
      .cloned()
      .collect();
    let mut by_strategy = Vec::with_capacity(keys.len());
    for key in keys {
      if let Some(p) = self.strategy_positions.remove(&key) {
        let s_pnl = p.settle(winner);
        *self.strategy_pnl.entry(key.1).or_default() += s_pnl;
        by_strategy.push((key.1, float(s_pnl)));
      }
    }
    by_strategy.sort_by_key(|(s, _)| *s);
    self.orders.retain(|_, o| o.market_id != market_id);

    SettlementOutcome {
      market_id: market_id.to_string(),
      winner,
      pnl: float(pnl),
      by_strategy,
      had_position,
    }
  }

  /// Start a new trading day at current capital.
  pub fn reset_daily(&mut self) {
    self.starting_capital = dec(self.capital());
    self.daily_pnl = Decimal::ZERO;
    self.strategy_pnl.clear();
  }

  /// Read-only view for other tasks.
  pub fn snapshot(&self) -> LedgerSnapshot {
    let mut market_exposure: HashMap<MarketId, f64> = HashMap::new();
    for (id, p) in &self.positions {
      *market_exposure.entry(id.clone()).or_default() += float(p.cost_basis());
    }
    for o in self.orders.values() {
      let reserved = o.reserved();
      if reserved > 0.0 {
        *market_exposure.entry(o.market_id.clone()).or_default() += reserved;
      }
    }
    LedgerSnapshot {
      starting_capital: self.starting_capital(),
      capital: self.capital(),
      available: self.available(),
      exposure: self.exposure(),
      daily_pnl: self.daily_pnl(),
      positions: self.positions.clone(),
      market_exposure,
      strategy_pnl: self
        .strategy_pnl
        .iter()
        .map(|(s, v)| (*s, float(*v)))
        .collect(),
      open_orders: self.orders.values().filter(|o| o.live).count(),
    }
  }
}
