//! Paper Exchange - In-process Matching Against Observed Books
//!
//! Mirrors every outcome-token book seen on the feed and matches our
//! orders against it:
//! - FAK walks the opposite side up to the limit, the remainder dies
//! - post-only that would cross is rejected, otherwise it rests
//! - GTC takes what crosses and rests the remainder
//!
//! Resting orders fill at their own price when a later book update
//! crosses them. Consumed liquidity is removed from the mirror so two
//! orders cannot take the same shares.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use anyhow::Result;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::adapters::fill_stream;
use crate::domain::book::{Level, OrderBook};
use crate::domain::market::{MarketId, OrderId, TokenId};
use crate::domain::order::{Fill, OrderResult, OrderStatus, OrderType, Side, SignedOrder};
use crate::ports::exchange::ExchangeClient;
use crate::ports::feed::{FeedEvent, FeedObserver};
use crate::usecases::now_ms;

const EPS: f64 = 1e-9;

/// A resting paper order.
#[derive(Debug, Clone)]
struct Resting {
    market_id: MarketId,
    token_id: TokenId,
    side: Side,
    price: f64,
    remaining: f64,
}

#[derive(Default)]
struct PaperState {
    books: HashMap<TokenId, OrderBook>,
    resting: HashMap<OrderId, Resting>,
}

impl PaperState {
    /// Take liquidity up to `limit`, removing it from the mirror.
    /// Returns the `(price, size)` executions.
    fn take(&mut self, token_id: &str, side: Side, limit: f64, size: f64) -> Vec<Level> {
        let Some(book) = self.books.get_mut(token_id) else {
            return Vec::new();
        };
        let levels: Vec<Level> = match side {
            Side::Buy => book.asks().iter().copied().filter(|l| l.0 <= limit + EPS).collect(),
            Side::Sell => book.bids().iter().copied().filter(|l| l.0 >= limit - EPS).collect(),
        };
        let mut remaining = size;
        let mut taken = Vec::new();
        let mut deltas = Vec::new();
        for (price, available) in levels {
            if remaining <= EPS {
                break;
            }
            let qty = available.min(remaining);
            remaining -= qty;
            taken.push((price, qty));
            deltas.push((price, available - qty));
        }
        let ts = book.updated_ms;
        match side {
            Side::Buy => book.apply_delta(&[], &deltas, ts),
            Side::Sell => book.apply_delta(&deltas, &[], ts),
        }
        taken
    }

    fn crosses(&self, token_id: &str, side: Side, price: f64) -> bool {
        self.books.get(token_id).is_some_and(|book| match side {
            Side::Buy => book.best_ask().is_some_and(|ask| price >= ask - EPS),
            Side::Sell => book.best_bid().is_some_and(|bid| price <= bid + EPS),
        })
    }

    /// Fill resting orders on `token_id` that the current book crosses.
    fn sweep(&mut self, token_id: &str, ts_ms: u64) -> Vec<Fill> {
        let ids: Vec<OrderId> = self
            .resting
            .iter()
            .filter(|(_, r)| r.token_id == token_id)
            .map(|(id, _)| id.clone())
            .collect();
        let mut fills = Vec::new();
        for id in ids {
            let Some(order) = self.resting.get(&id).cloned() else {
                continue;
            };
            let taken: f64 = self
                .take(token_id, order.side, order.price, order.remaining)
                .iter()
                .map(|l| l.1)
                .sum();
            if taken <= EPS {
                continue;
            }
            fills.push(Fill {
                order_id: id.clone(),
                token_id: order.token_id.clone(),
                side: order.side,
                price: order.price,
                size: taken,
                ts_ms,
            });
            let left = order.remaining - taken;
            if left <= EPS {
                self.resting.remove(&id);
            } else if let Some(r) = self.resting.get_mut(&id) {
                r.remaining = left;
            }
        }
        fills
    }
}

/// Paper-trading exchange.
pub struct PaperExchange {
    state: Mutex<PaperState>,
    next_id: AtomicU64,
    fills: broadcast::Sender<Fill>,
}

impl Default for PaperExchange {
    fn default() -> Self {
        Self::new()
    }
}

impl PaperExchange {
    /// Empty exchange with no books.
    pub fn new() -> Self {
        let (fills, _) = broadcast::channel(1_024);
        Self {
            state: Mutex::new(PaperState::default()),
            next_id: AtomicU64::new(1),
            fills,
        }
    }

    /// Resting orders, for tests and diagnostics.
    pub fn resting_count(&self) -> usize {
        self.lock().resting.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PaperState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn broadcast(&self, fills: Vec<Fill>) {
        for fill in fills {
            debug!(order = %fill.order_id, price = fill.price, size = fill.size, "Paper fill");
            let _ = self.fills.send(fill);
        }
    }

    fn execute(&self, order: &SignedOrder) -> OrderResult {
        let intent = &order.intent;
        let order_id = format!("paper-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        let ts_ms = now_ms();
        let mut state = self.lock();

        if intent.order_type() == OrderType::PostOnly
            && state.crosses(intent.token_id(), intent.side(), intent.price())
        {
            return OrderResult {
                order_id,
                status: OrderStatus::Rejected,
                filled_size: 0.0,
                avg_price: intent.price(),
            };
        }

        let taken = if intent.order_type() == OrderType::PostOnly {
            Vec::new()
        } else {
            state.take(intent.token_id(), intent.side(), intent.price(), intent.size())
        };
        let filled: f64 = taken.iter().map(|l| l.1).sum();
        let notional: f64 = taken.iter().map(|l| l.0 * l.1).sum();
        let remaining = intent.size() - filled;

        let status = if remaining <= EPS {
            OrderStatus::Filled
        } else if intent.order_type().is_resting() {
            state.resting.insert(
                order_id.clone(),
                Resting {
                    market_id: intent.market_id().clone(),
                    token_id: intent.token_id().clone(),
                    side: intent.side(),
                    price: intent.price(),
                    remaining,
                },
            );
            if filled > EPS { OrderStatus::Partial } else { OrderStatus::Open }
        } else if filled > EPS {
            OrderStatus::Partial
        } else {
            OrderStatus::Cancelled
        };
        drop(state);

        if filled > EPS {
            self.broadcast(vec![Fill {
                order_id: order_id.clone(),
                token_id: intent.token_id().clone(),
                side: intent.side(),
                price: notional / filled,
                size: filled,
                ts_ms,
            }]);
        }
        OrderResult {
            order_id,
            status,
            filled_size: filled,
            avg_price: if filled > EPS { notional / filled } else { intent.price() },
        }
    }
}

impl FeedObserver for PaperExchange {
    fn observe(&self, event: &FeedEvent) {
        let FeedEvent::Book {
            token_id,
            bids,
            asks,
            snapshot,
            ts_ms,
        } = event
        else {
            return;
        };
        let fills = {
            let mut state = self.lock();
            let book = state
                .books
                .entry(token_id.clone())
                .or_insert_with(|| OrderBook::new(token_id.clone()));
            if *snapshot {
                book.apply_snapshot(bids, asks, *ts_ms);
            } else {
                book.apply_delta(bids, asks, *ts_ms);
            }
            state.sweep(token_id, *ts_ms)
        };
        self.broadcast(fills);
    }
}

#[async_trait]
impl ExchangeClient for PaperExchange {
    async fn submit_single(&self, order: &SignedOrder) -> Result<OrderResult> {
        Ok(self.execute(order))
    }

    async fn submit_batch(&self, orders: &[SignedOrder]) -> Result<Vec<OrderResult>> {
        Ok(orders.iter().map(|o| self.execute(o)).collect())
    }

    async fn cancel(&self, order_id: &OrderId) -> Result<()> {
        self.lock().resting.remove(order_id);
        Ok(())
    }

    async fn cancel_all(&self, market_id: &MarketId) -> Result<usize> {
        let mut state = self.lock();
        let before = state.resting.len();
        state.resting.retain(|_, r| &r.market_id != market_id);
        let cancelled = before - state.resting.len();
        if cancelled > 0 {
            info!(market = %market_id, cancelled, "Paper orders cancelled");
        }
        Ok(cancelled)
    }

    async fn get_book(&self, token_id: &TokenId) -> Result<OrderBook> {
        Ok(self
            .lock()
            .books
            .get(token_id)
            .cloned()
            .unwrap_or_else(|| OrderBook::new(token_id.clone())))
    }

    async fn get_midpoint(&self, token_id: &TokenId) -> Result<Option<f64>> {
        Ok(self.lock().books.get(token_id).and_then(OrderBook::mid))
    }

    fn subscribe_fills(&self) -> BoxStream<'static, Fill> {
        fill_stream(self.fills.subscribe())
    }
}
