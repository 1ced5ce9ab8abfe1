//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! external dependencies (HTTP, files, in-process simulation). Each
//! sub-module groups adapters by infrastructure concern.
//!
//! Adapter categories:
//! - `api`: CLOB REST exchange client, auth and remote signer
//! - `paper`: in-process exchange and signer for paper trading
//! - `feeds`: JSONL event ingestion and the coalescing ingress queue
//! - `metrics`: Prometheus sink, tracing sink and health checks
//! - `persistence`: JSONL trade journal

pub mod api;
pub mod feeds;
pub mod metrics;
pub mod paper;
pub mod persistence;

use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};
use tokio::sync::broadcast;
use tracing::warn;

use crate::domain::order::Fill;

/// Turn a fill broadcast into the stream shape the exchange port hands out.
///
/// A lagging subscriber logs how many fills it missed and keeps going;
/// the stream ends when the sender is dropped.
pub fn fill_stream(rx: broadcast::Receiver<Fill>) -> BoxStream<'static, Fill> {
    stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(fill) => return Some((fill, rx)),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "Fill subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .boxed()
}
