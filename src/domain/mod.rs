//! Domain layer - Core types and pure math.
//!
//! Markets, lifecycle phases, order books, order intents, positions,
//! signal types and Kelly sizing. No I/O happens here.

pub mod book;
pub mod kelly;
pub mod lifecycle;
pub mod market;
pub mod order;
pub mod position;
pub mod signal;

// Re-export core types for convenience
pub use book::OrderBook;
pub use kelly::{KellyCriterion, KellySizer};
pub use lifecycle::{Phase, PhaseTracker, phase_at};
pub use market::{Asset, DurationClass, Market, MarketId, OrderId, TokenId, TokenSide};
pub use order::{
    Batch, BatchKind, Fill, OrderIntent, OrderResult, OrderStatus, OrderType, Side,
    SignedOrder, StrategyId,
};
pub use position::Position;
pub use signal::{
    ArbSignal, BiasSignal, CompressionSignal, Direction, MarketSignals, MomentumSignal,
    TapeSignal, VolRegime,
};
