//! CLOB Exchange - Live `ExchangeClient` over the REST API
//!
//! Order submission, cancels and book reads go through the shared
//! `ClobHttp` (auth, rate limit, read retries). Fills are discovered by
//! polling the trades endpoint and matching against the order ids this
//! process submitted; matches fan out on a broadcast channel.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use super::client::ClobHttp;
use super::types::{
    BookResponse, CancelMarketRequest, CancelOrderRequest, CancelResponse, MidpointResponse,
    PostOrderRequest, PostOrderResponse, TradeRecord, parse_amount,
};
use crate::adapters::fill_stream;
use crate::domain::book::OrderBook;
use crate::domain::market::{MarketId, OrderId, TokenId};
use crate::domain::order::{Fill, OrderResult, SignedOrder};
use crate::ports::exchange::ExchangeClient;

/// Fill broadcast depth.
const FILL_CHANNEL_CAPACITY: usize = 1_024;
/// Trade ids remembered for de-duplication.
const SEEN_TRADES: usize = 4_096;

/// Orders submitted by this process.
#[derive(Default)]
struct OrderIndex {
    /// Order id → market.
    orders: HashMap<OrderId, MarketId>,
    /// Market → tokens we have traded in it.
    tokens: HashMap<MarketId, HashSet<TokenId>>,
}

/// Trades already turned into fills.
#[derive(Default)]
struct SeenTrades {
    ids: HashSet<String>,
    order: VecDeque<String>,
}

impl SeenTrades {
    /// Remember `id`; false when it was already seen.
    fn insert(&mut self, id: &str) -> bool {
        if !self.ids.insert(id.to_string()) {
            return false;
        }
        self.order.push_back(id.to_string());
        if self.order.len() > SEEN_TRADES {
            if let Some(old) = self.order.pop_front() {
                self.ids.remove(&old);
            }
        }
        true
    }
}

/// Live exchange client.
pub struct ClobExchange {
    http: Arc<ClobHttp>,
    index: Mutex<OrderIndex>,
    seen: Mutex<SeenTrades>,
    fills: broadcast::Sender<Fill>,
}

impl ClobExchange {
    /// Exchange over a shared HTTP client.
    pub fn new(http: Arc<ClobHttp>) -> Self {
        let (fills, _) = broadcast::channel(FILL_CHANNEL_CAPACITY);
        Self {
            http,
            index: Mutex::new(OrderIndex::default()),
            seen: Mutex::new(SeenTrades::default()),
            fills,
        }
    }

    fn remember(&self, order: &SignedOrder, result: &OrderResult) {
        if result.order_id.is_empty() {
            return;
        }
        let mut index = self.index.lock().unwrap_or_else(PoisonError::into_inner);
        let market = order.intent.market_id().clone();
        index
            .tokens
            .entry(market.clone())
            .or_default()
            .insert(order.intent.token_id().clone());
        index.orders.insert(result.order_id.clone(), market);
    }

    fn is_ours(&self, order_id: &str) -> bool {
        self.index
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .orders
            .contains_key(order_id)
    }

    /// Fetch recent trades once and broadcast fills for our orders.
    pub async fn poll_fills(&self, after_secs: u64) -> Result<usize> {
        let trades: Vec<TradeRecord> = self
            .http
            .get_json(&format!("/data/trades?after={after_secs}"))
            .await?;
        let mut sent = 0;
        for trade in trades {
            let fresh = self
                .seen
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(&trade.id);
            if !fresh {
                continue;
            }
            for fill in trade.fills_for(|id| self.is_ours(id)) {
                debug!(order = %fill.order_id, size = fill.size, price = fill.price, "Fill observed");
                // No subscribers is fine; fills before startup are not replayed.
                let _ = self.fills.send(fill);
                sent += 1;
            }
        }
        Ok(sent)
    }

    /// Poll fills on a fixed cadence until shutdown.
    pub fn spawn_fill_poller(
        self: &Arc<Self>,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // Look back a little so fills that land between submit and first poll are seen.
            let mut cursor = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default().saturating_sub(60);
            loop {
                tokio::select! {
                    _ = shutdown.recv() => break,
                    _ = tick.tick() => {
                        let now = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default();
                        match this.poll_fills(cursor).await {
                            Ok(_) => cursor = now.saturating_sub(5),
                            Err(e) => warn!(error = %e, "Fill poll failed"),
                        }
                    }
                }
            }
            info!("Fill poller stopped");
        })
    }
}

#[async_trait]
impl ExchangeClient for ClobExchange {
    #[instrument(skip_all, fields(token = %order.intent.token_id(), side = %order.intent.side()))]
    async fn submit_single(&self, order: &SignedOrder) -> Result<OrderResult> {
        let request = PostOrderRequest::from(order);
        let response: PostOrderResponse = self.http.post_json("/order", &request).await?;
        let intent = &order.intent;
        let result = response.into_result(intent.side(), intent.size(), intent.price());
        self.remember(order, &result);
        Ok(result)
    }

    #[instrument(skip_all, fields(orders = orders.len()))]
    async fn submit_batch(&self, orders: &[SignedOrder]) -> Result<Vec<OrderResult>> {
        let requests: Vec<PostOrderRequest> = orders.iter().map(PostOrderRequest::from).collect();
        let responses: Vec<PostOrderResponse> = self.http.post_json("/orders", &requests).await?;
        if responses.len() != orders.len() {
            bail!(
                "Batch reply has {} results for {} orders",
                responses.len(),
                orders.len()
            );
        }
        let results = orders
            .iter()
            .zip(responses)
            .map(|(order, response)| {
                let intent = &order.intent;
                let result = response.into_result(intent.side(), intent.size(), intent.price());
                self.remember(order, &result);
                result
            })
            .collect();
        Ok(results)
    }

    async fn cancel(&self, order_id: &OrderId) -> Result<()> {
        let request = CancelOrderRequest {
            order_id: order_id.clone(),
        };
        let response: CancelResponse = self.http.delete_json("/order", &request).await?;
        if let Some(reason) = response.not_canceled.get(order_id) {
            // Already filled or already gone is terminal, not a failure.
            debug!(order = %order_id, reason, "Order not cancelled");
        }
        Ok(())
    }

    async fn cancel_all(&self, market_id: &MarketId) -> Result<usize> {
        let tokens: Vec<TokenId> = self
            .index
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .tokens
            .get(market_id)
            .map(|t| t.iter().cloned().collect())
            .unwrap_or_default();
        let mut cancelled = 0;
        for token in tokens {
            let request = CancelMarketRequest { asset_id: token };
            let response: CancelResponse = self
                .http
                .delete_json("/cancel-market-orders", &request)
                .await
                .with_context(|| format!("Cancel-all failed for {market_id}"))?;
            cancelled += response.canceled.len();
        }
        Ok(cancelled)
    }

    async fn get_book(&self, token_id: &TokenId) -> Result<OrderBook> {
        let response: BookResponse = self.http.get_json(&format!("/book?token_id={token_id}")).await?;
        Ok(response.into_book())
    }

    async fn get_midpoint(&self, token_id: &TokenId) -> Result<Option<f64>> {
        let response: MidpointResponse = self
            .http
            .get_json(&format!("/midpoint?token_id={token_id}"))
            .await?;
        Ok(response.mid.as_deref().map(parse_amount).filter(|m| *m > 0.0))
    }

    fn subscribe_fills(&self) -> BoxStream<'static, Fill> {
        fill_stream(self.fills.subscribe())
    }
}
