//! Exchange Port - Order Submission and Book Queries
//!
//! The only path by which orders reach the venue. Implemented by the
//! live CLOB REST client and by the in-process paper exchange. Only the
//! execution engine holds an `ExchangeClient`.
//!
//! Submission calls are never retried by callers: a retry after an
//! ambiguous network failure risks a double fill. Cancels are safe to
//! retry.

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::domain::book::OrderBook;
use crate::domain::market::{MarketId, OrderId, TokenId};
use crate::domain::order::{Fill, OrderResult, SignedOrder};

/// Trait for exchange clients.
#[async_trait]
pub trait ExchangeClient: Send + Sync + 'static {
  /// Submit one signed order.
  async fn submit_single(&self, order: &SignedOrder) -> anyhow::Result<OrderResult>;

  /// Submit several signed orders in a single API call.
  ///
  /// Either every order reaches the exchange in this call or none does.
  /// Results are returned in input order.
  async fn submit_batch(&self, orders: &[SignedOrder]) -> anyhow::Result<Vec<OrderResult>>;

  /// Cancel one order.
  async fn cancel(&self, order_id: &OrderId) -> anyhow::Result<()>;

  /// Cancel every open order in a market. Returns the number cancelled.
  async fn cancel_all(&self, market_id: &MarketId) -> anyhow::Result<usize>;

  /// Fetch a fresh book for a token.
  async fn get_book(&self, token_id: &TokenId) -> anyhow::Result<OrderBook>;

  /// Current midpoint for a token, if both sides are quoted.
  async fn get_midpoint(&self, token_id: &TokenId) -> anyhow::Result<Option<f64>>;

  /// Stream of fill confirmations for our orders.
  fn subscribe_fills(&self) -> BoxStream<'static, Fill>;
}
