//! Feed Ingress - Bounded Event Queue with Book Coalescing
//!
//! Producers push normalized events; the signal task pulls them through
//! `FeedSource`. Ticks, trades, liquidations, funding and lifecycle
//! events go through a bounded channel whose send is awaited, so they
//! are never dropped: a slow consumer slows the producer instead.
//!
//! Book updates are not queued. Each token has one pending slot and a
//! newer update merges into it (snapshot replaces, delta folds in), so a
//! burst of book traffic costs the consumer one event per token.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::{Notify, mpsc};

use crate::domain::book::{Level, OrderBook};
use crate::domain::market::TokenId;
use crate::ports::feed::{FeedEvent, FeedSource};

/// Pending book update for one token.
#[derive(Debug, Clone)]
struct PendingBook {
    bids: Vec<Level>,
    asks: Vec<Level>,
    snapshot: bool,
    ts_ms: u64,
}

impl PendingBook {
    /// Fold a newer update into this one.
    fn merge(&mut self, bids: Vec<Level>, asks: Vec<Level>, snapshot: bool, ts_ms: u64) {
        if snapshot {
            *self = Self {
                bids,
                asks,
                snapshot,
                ts_ms,
            };
            return;
        }
        if self.snapshot {
            // Snapshot + delta is still a snapshot.
            let mut book = OrderBook::default();
            book.apply_snapshot(&self.bids, &self.asks, self.ts_ms);
            book.apply_delta(&bids, &asks, ts_ms);
            self.bids = book.bids().to_vec();
            self.asks = book.asks().to_vec();
        } else {
            // Delta + delta: later size per price wins, zeros kept as removals.
            fold_levels(&mut self.bids, bids);
            fold_levels(&mut self.asks, asks);
        }
        self.ts_ms = ts_ms;
    }
}

fn fold_levels(into: &mut Vec<Level>, newer: Vec<Level>) {
    for (price, size) in newer {
        match into.iter_mut().find(|l| (l.0 - price).abs() < 1e-9) {
            Some(level) => level.1 = size,
            None => into.push((price, size)),
        }
    }
}

#[derive(Default)]
struct Slots {
    order: VecDeque<TokenId>,
    pending: HashMap<TokenId, PendingBook>,
}

#[derive(Default)]
struct BookSlots {
    slots: Mutex<Slots>,
    notify: Notify,
    coalesced: AtomicU64,
}

impl BookSlots {
    fn push(&self, token_id: TokenId, bids: Vec<Level>, asks: Vec<Level>, snapshot: bool, ts_ms: u64) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(pending) = slots.pending.get_mut(&token_id) {
            pending.merge(bids, asks, snapshot, ts_ms);
            self.coalesced.fetch_add(1, Ordering::Relaxed);
            return;
        }
        slots.order.push_back(token_id.clone());
        slots.pending.insert(
            token_id,
            PendingBook {
                bids,
                asks,
                snapshot,
                ts_ms,
            },
        );
        drop(slots);
        self.notify.notify_one();
    }

    fn pop(&self) -> Option<FeedEvent> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let token_id = slots.order.pop_front()?;
        let book = slots.pending.remove(&token_id)?;
        Some(FeedEvent::Book {
            token_id,
            bids: book.bids,
            asks: book.asks,
            snapshot: book.snapshot,
            ts_ms: book.ts_ms,
        })
    }
}

/// Producer half.
#[derive(Clone)]
pub struct FeedIngress {
    tx: mpsc::Sender<FeedEvent>,
    books: Arc<BookSlots>,
}

/// Consumer half; implements `FeedSource`.
pub struct IngressReceiver {
    rx: mpsc::Receiver<FeedEvent>,
    books: Arc<BookSlots>,
    books_first: bool,
}

/// Create an ingress with room for `capacity` non-book events.
pub fn ingress(capacity: usize) -> (FeedIngress, IngressReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let books = Arc::new(BookSlots::default());
    (
        FeedIngress {
            tx,
            books: Arc::clone(&books),
        },
        IngressReceiver {
            rx,
            books,
            books_first: false,
        },
    )
}

impl FeedIngress {
    /// Enqueue one event. Awaits when the queue is full.
    ///
    /// # Errors
    /// The receiver has been dropped.
    pub async fn send(&self, event: FeedEvent) -> Result<()> {
        match event {
            FeedEvent::Book {
                token_id,
                bids,
                asks,
                snapshot,
                ts_ms,
            } => {
                self.books.push(token_id, bids, asks, snapshot, ts_ms);
                Ok(())
            }
            other => self.tx.send(other).await.context("Feed consumer gone"),
        }
    }

    /// Book updates merged into a pending slot so far.
    pub fn coalesced(&self) -> u64 {
        self.books.coalesced.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl FeedSource for IngressReceiver {
    async fn next_event(&mut self) -> Option<FeedEvent> {
        loop {
            // Alternate so neither class starves the other.
            self.books_first = !self.books_first;
            if self.books_first {
                if let Some(book) = self.books.pop() {
                    return Some(book);
                }
            }
            if let Ok(event) = self.rx.try_recv() {
                return Some(event);
            }
            if let Some(book) = self.books.pop() {
                return Some(book);
            }
            tokio::select! {
                event = self.rx.recv() => {
                    return match event {
                        Some(event) => Some(event),
                        None => self.books.pop(),
                    };
                }
                () = self.books.notify.notified() => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::Asset;

    fn book(token: &str, asks: Vec<Level>, snapshot: bool, ts_ms: u64) -> FeedEvent {
        FeedEvent::Book {
            token_id: token.into(),
            bids: vec![],
            asks,
            snapshot,
            ts_ms,
        }
    }

    #[tokio::test]
    async fn test_book_updates_coalesce_per_token() {
        let (tx, mut rx) = ingress(8);
        tx.send(book("y", vec![(0.50, 10.0), (0.51, 5.0)], true, 1)).await.unwrap();
        tx.send(book("y", vec![(0.50, 0.0)], false, 2)).await.unwrap();
        tx.send(book("y", vec![(0.52, 7.0)], false, 3)).await.unwrap();
        assert_eq!(tx.coalesced(), 2);

        match rx.next_event().await {
            Some(FeedEvent::Book {
                asks, snapshot, ts_ms, ..
            }) => {
                assert!(snapshot);
                assert_eq!(ts_ms, 3);
                assert_eq!(asks, vec![(0.51, 5.0), (0.52, 7.0)]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_ticks_are_never_coalesced() {
        let (tx, mut rx) = ingress(8);
        for i in 0u32..3 {
            tx.send(FeedEvent::SpotTick {
                asset: Asset::BTC,
                price: 100.0 + f64::from(i),
                ts_ms: u64::from(i),
            })
            .await
            .unwrap();
        }
        drop(tx);
        let mut seen = Vec::new();
        while let Some(event) = rx.next_event().await {
            seen.push(event.ts_ms());
        }
        assert_eq!(seen, vec![Some(0), Some(1), Some(2)]);
    }

    #[tokio::test]
    async fn test_delta_merge_keeps_removals() {
        let (tx, mut rx) = ingress(1);
        tx.send(book("n", vec![(0.40, 3.0)], false, 1)).await.unwrap();
        tx.send(book("n", vec![(0.40, 0.0), (0.41, 2.0)], false, 2)).await.unwrap();
        drop(tx);
        match rx.next_event().await {
            Some(FeedEvent::Book { asks, snapshot, .. }) => {
                assert!(!snapshot);
                assert_eq!(asks, vec![(0.40, 0.0), (0.41, 2.0)]);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(rx.next_event().await.is_none());
    }
}
