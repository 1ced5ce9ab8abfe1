//! CLOB API Request/Response Types
//!
//! Wire shapes for the CLOB REST API and their conversions into domain
//! values. Amounts arrive as decimal strings; they are parsed with
//! `rust_decimal` so cent-grid prices survive intact before the final
//! conversion to `f64`.

use std::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::domain::book::{Level, OrderBook};
use crate::domain::order::{Fill, OrderResult, OrderStatus, OrderType, Side, SignedOrder};

/// Parse a decimal string, zero on garbage.
pub fn parse_amount(raw: &str) -> f64 {
  Decimal::from_str(raw.trim())
    .ok()
    .and_then(|d| d.to_f64())
    .unwrap_or(0.0)
}

// ────────────────────────────────────────────
// Orders
// ────────────────────────────────────────────

/// Signed order body.
#[derive(Debug, Clone, Serialize)]
pub struct OrderPayload {
  /// Token traded.
  #[serde(rename = "tokenId")]
  pub token_id: String,
  /// Limit price as a decimal string.
  pub price: String,
  /// Shares as a decimal string.
  pub size: String,
  /// BUY or SELL.
  pub side: Side,
  /// Replay-protection salt.
  pub salt: u64,
  /// Signing address.
  pub signer: String,
  /// Signature from the signer.
  pub signature: String,
  /// Our intent id, for correlating logs.
  #[serde(rename = "clientId")]
  pub client_id: String,
}

/// One order submission.
#[derive(Debug, Clone, Serialize)]
pub struct PostOrderRequest {
  /// Signed order.
  pub order: OrderPayload,
  /// FAK, GTC or post-only.
  #[serde(rename = "orderType")]
  pub order_type: &'static str,
  /// Reject instead of crossing.
  #[serde(rename = "postOnly")]
  pub post_only: bool,
}

impl From<&SignedOrder> for PostOrderRequest {
  fn from(signed: &SignedOrder) -> Self {
    let intent = &signed.intent;
    let (order_type, post_only) = match intent.order_type() {
      OrderType::Fak => ("FAK", false),
      OrderType::Gtc => ("GTC", false),
      OrderType::PostOnly => ("GTC", true),
    };
    Self {
      order: OrderPayload {
        token_id: intent.token_id().clone(),
        price: format!("{:.2}", intent.price()),
        size: format!("{:.2}", intent.size()),
        side: intent.side(),
        salt: signed.salt,
        signer: signed.signer.clone(),
        signature: signed.signature.clone(),
        client_id: intent.id().to_string(),
      },
      order_type,
      post_only,
    }
  }
}

/// Reply to one order submission.
#[derive(Debug, Clone, Deserialize)]
pub struct PostOrderResponse {
  /// Whether the order was accepted.
  pub success: bool,
  /// Assigned order ID.
  #[serde(rename = "orderID", default)]
  pub order_id: Option<String>,
  /// Error message if rejected.
  #[serde(rename = "errorMsg", default)]
  pub error_msg: Option<String>,
  /// matched, live, delayed or unmatched.
  #[serde(default)]
  pub status: Option<String>,
  /// What we gave up: USDC for buys, shares for sells.
  #[serde(rename = "makingAmount", default)]
  pub making_amount: Option<String>,
  /// What we received: shares for buys, USDC for sells.
  #[serde(rename = "takingAmount", default)]
  pub taking_amount: Option<String>,
}

impl PostOrderResponse {
  /// Domain result for an order with the given side and size.
  pub fn into_result(self, side: Side, size: f64, limit: f64) -> OrderResult {
    let making = self.making_amount.as_deref().map_or(0.0, parse_amount);
    let taking = self.taking_amount.as_deref().map_or(0.0, parse_amount);
    let (shares, usdc) = match side {
      Side::Buy => (taking, making),
      Side::Sell => (making, taking),
    };
    let filled = shares.min(size);
    let avg_price = if filled > 0.0 { usdc / shares } else { limit };

    let status = if !self.success {
      OrderStatus::Rejected
    } else if filled >= size - 1e-9 && filled > 0.0 {
      OrderStatus::Filled
    } else if filled > 0.0 {
      OrderStatus::Partial
    } else {
      match self.status.as_deref() {
        Some("unmatched") => OrderStatus::Cancelled,
        _ => OrderStatus::Open,
      }
    };
    OrderResult {
      order_id: self.order_id.unwrap_or_default(),
      status,
      filled_size: filled,
      avg_price,
    }
  }
}

// ────────────────────────────────────────────
// Cancels
// ────────────────────────────────────────────

/// Cancel by order id.
#[derive(Debug, Clone, Serialize)]
pub struct CancelOrderRequest {
  /// Order ID to cancel.
  #[serde(rename = "orderID")]
  pub order_id: String,
}

/// Cancel every order on a set of tokens.
#[derive(Debug, Clone, Serialize)]
pub struct CancelMarketRequest {
  /// Token whose orders go.
  pub asset_id: String,
}

/// Cancel reply.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CancelResponse {
  /// Ids cancelled.
  #[serde(default)]
  pub canceled: Vec<String>,
  /// Ids that could not be cancelled, with reasons.
  #[serde(default)]
  pub not_canceled: std::collections::HashMap<String, String>,
}

// ────────────────────────────────────────────
// Market data
// ────────────────────────────────────────────

/// Order book level from the API.
#[derive(Debug, Clone, Deserialize)]
pub struct BookLevel {
  /// Price at this level.
  pub price: String,
  /// Total size at this level.
  pub size: String,
}

impl BookLevel {
  fn level(&self) -> Level {
    (parse_amount(&self.price), parse_amount(&self.size))
  }
}

/// Order book response.
#[derive(Debug, Clone, Deserialize)]
pub struct BookResponse {
  /// Token ID.
  pub asset_id: String,
  /// Bid levels.
  #[serde(default)]
  pub bids: Vec<BookLevel>,
  /// Ask levels.
  #[serde(default)]
  pub asks: Vec<BookLevel>,
  /// Snapshot time (Unix ms, as a string).
  #[serde(default)]
  pub timestamp: Option<String>,
}

impl BookResponse {
  /// Domain book; level ordering is normalized by the book itself.
  pub fn into_book(self) -> OrderBook {
    let bids: Vec<Level> = self.bids.iter().map(BookLevel::level).collect();
    let asks: Vec<Level> = self.asks.iter().map(BookLevel::level).collect();
    let ts = self
      .timestamp
      .as_deref()
      .and_then(|t| t.parse::<u64>().ok())
      .unwrap_or_default();
    let mut book = OrderBook::new(self.asset_id);
    book.apply_snapshot(&bids, &asks, ts);
    book
  }
}

/// Midpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct MidpointResponse {
  /// Midpoint, absent when one side is empty.
  #[serde(default)]
  pub mid: Option<String>,
}

// ────────────────────────────────────────────
// Trades (fill polling)
// ────────────────────────────────────────────

/// Maker side of a trade.
#[derive(Debug, Clone, Deserialize)]
pub struct MakerOrder {
  /// Resting order that matched.
  pub order_id: String,
  /// Token of the resting order.
  pub asset_id: String,
  /// Shares matched against it.
  pub matched_amount: String,
  /// Its price.
  pub price: String,
  /// Its side.
  pub side: Side,
}

/// One trade from the trades endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TradeRecord {
  /// Trade id.
  pub id: String,
  /// Taking order.
  pub taker_order_id: String,
  /// Taker's token.
  pub asset_id: String,
  /// Taker's side.
  pub side: Side,
  /// Shares traded by the taker.
  pub size: String,
  /// Taker's average price.
  pub price: String,
  /// Match time (Unix seconds, as a string).
  #[serde(default)]
  pub match_time: String,
  /// Resting orders consumed.
  #[serde(default)]
  pub maker_orders: Vec<MakerOrder>,
}

impl TradeRecord {
  /// Fills this trade produced for orders accepted by `ours`.
  pub fn fills_for(&self, ours: impl Fn(&str) -> bool) -> Vec<Fill> {
    let ts_ms = self.match_time.parse::<u64>().unwrap_or_default() * 1_000;
    let mut fills = Vec::new();
    if ours(&self.taker_order_id) {
      fills.push(Fill {
        order_id: self.taker_order_id.clone(),
        token_id: self.asset_id.clone(),
        side: self.side,
        price: parse_amount(&self.price),
        size: parse_amount(&self.size),
        ts_ms,
      });
    }
    for maker in self.maker_orders.iter().filter(|m| ours(&m.order_id)) {
      fills.push(Fill {
        order_id: maker.order_id.clone(),
        token_id: maker.asset_id.clone(),
        side: maker.side,
        price: parse_amount(&maker.price),
        size: parse_amount(&maker.matched_amount),
        ts_ms,
      });
    }
    fills
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_buy_response_maps_amounts() {
    let json = r#"{"success": true, "orderID": "o1", "status": "matched",
                   "makingAmount": "4.80", "takingAmount": "10"}"#;
    let resp: PostOrderResponse = serde_json::from_str(json).unwrap();
    let result = resp.into_result(Side::Buy, 10.0, 0.50);
    assert_eq!(result.order_id, "o1");
    assert_eq!(result.status, OrderStatus::Filled);
    assert!((result.filled_size - 10.0).abs() < 1e-9);
    assert!((result.avg_price - 0.48).abs() < 1e-9);
  }

  #[test]
  fn test_resting_and_rejected_responses() {
    let live: PostOrderResponse = serde_json::from_str(r#"{"success": true, "orderID": "o2", "status": "live"}"#).unwrap();
    let r = live.into_result(Side::Buy, 5.0, 0.40);
    assert_eq!(r.status, OrderStatus::Open);
    assert_eq!(r.avg_price, 0.40);

    let bad: PostOrderResponse =
      serde_json::from_str(r#"{"success": false, "errorMsg": "not enough balance"}"#).unwrap();
    assert_eq!(bad.into_result(Side::Buy, 5.0, 0.40).status, OrderStatus::Rejected);
  }

  #[test]
  fn test_book_response_normalizes_order() {
    let json = r#"{"asset_id": "t", "timestamp": "1700000000000",
                   "bids": [{"price": "0.40", "size": "10"}, {"price": "0.45", "size": "5"}],
                   "asks": [{"price": "0.52", "size": "7"}, {"price": "0.50", "size": "3"}]}"#;
    let book = serde_json::from_str::<BookResponse>(json).unwrap().into_book();
    assert_eq!(book.best_bid(), Some(0.45));
    assert_eq!(book.best_ask(), Some(0.50));
    assert_eq!(book.updated_ms, 1_700_000_000_000);
  }

  #[test]
  fn test_trade_yields_only_our_fills() {
    let json = r#"{"id": "tr1", "taker_order_id": "theirs", "asset_id": "y", "side": "SELL",
                   "size": "8", "price": "0.47", "match_time": "1700000000",
                   "maker_orders": [
                     {"order_id": "mine", "asset_id": "y", "matched_amount": "3", "price": "0.47", "side": "BUY"},
                     {"order_id": "other", "asset_id": "y", "matched_amount": "5", "price": "0.47", "side": "BUY"}
                   ]}"#;
    let trade: TradeRecord = serde_json::from_str(json).unwrap();
    let fills = trade.fills_for(|id| id == "mine");
    assert_eq!(fills.len(), 1);
    assert_eq!(fills[0].side, Side::Buy);
    assert!((fills[0].size - 3.0).abs() < 1e-9);
    assert_eq!(fills[0].ts_ms, 1_700_000_000_000);
  }

  #[test]
  fn test_parse_amount() {
    assert!((parse_amount("0.55") - 0.55).abs() < 1e-12);
    assert_eq!(parse_amount("junk"), 0.0);
  }
}
