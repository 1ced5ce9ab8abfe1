//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Defines the interfaces (traits) that the engine requires from the
//! outside world. Adapters implement these traits.
//!
//! Port categories:
//! - `FeedEvent`: normalized spot, book, discovery and resolution events
//! - `FeedSource` / `FeedObserver`: where events come from, who else sees them
//! - `ExchangeClient`: order submission, cancels, book queries, fills
//! - `OrderSigner`: external signing collaborator
//! - `TelemetrySink`: structured event boundary
//! - `TradeJournal`: append-only fill and settlement log

pub mod exchange;
pub mod feed;
pub mod journal;
pub mod signer;
pub mod telemetry;

pub use exchange::ExchangeClient;
pub use feed::{FeedEvent, FeedObserver, FeedSource, LiquidatedSide};
pub use journal::{JournalEntry, TradeJournal};
pub use signer::OrderSigner;
pub use telemetry::{RiskCheck, TelemetryEvent, TelemetrySink};
