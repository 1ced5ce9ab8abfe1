//! Order intents, batches, results and fills.
//!
//! An `OrderIntent` is write-once: fields are private and only readable
//! through accessors, so nothing downstream of a strategy can alter a
//! price or size after creation.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::market::{Market, MarketId, OrderId, TokenId, TokenSide};
use crate::error::{EngineError, EngineResult};

// ────────────────────────────────────────────
// Enums
// ────────────────────────────────────────────

/// Strategy that originated an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyId {
    /// Buy both legs below $1, optionally add a directional leg.
    Straddle,
    /// Pure YES+NO < $1 arbitrage.
    Arbitrage,
    /// Trade token asks lagging the spot-implied fair probability.
    LagExploit,
    /// Two-sided maker quotes around fair value.
    MarketMaker,
    /// Ride token-price momentum toward fair value.
    Momentum,
}

impl StrategyId {
    /// Every strategy, in default priority order.
    pub const ALL: [Self; 5] = [
        Self::Arbitrage,
        Self::Straddle,
        Self::LagExploit,
        Self::Momentum,
        Self::MarketMaker,
    ];

    /// Stable label for logs and metrics.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Straddle => "straddle",
            Self::Arbitrage => "arbitrage",
            Self::LagExploit => "lag_exploit",
            Self::MarketMaker => "market_maker",
            Self::Momentum => "momentum",
        }
    }
}

impl std::fmt::Display for StrategyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// Acquire outcome tokens.
    Buy,
    /// Dispose of outcome tokens.
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Time-in-force of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    /// Fill what is available now, cancel the rest.
    Fak,
    /// Rest on the book until cancelled.
    Gtc,
    /// Rest on the book; rejected if it would cross.
    PostOnly,
}

impl OrderType {
    /// Whether the order is expected to rest on the book.
    pub const fn is_resting(self) -> bool {
        matches!(self, Self::Gtc | Self::PostOnly)
    }
}

// ────────────────────────────────────────────
// OrderIntent
// ────────────────────────────────────────────

/// Immutable request to trade, produced by a strategy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderIntent {
    id: Uuid,
    market_id: MarketId,
    token_id: TokenId,
    token_side: TokenSide,
    side: Side,
    price: f64,
    size: f64,
    order_type: OrderType,
    strategy: StrategyId,
    created_ms: u64,
}

impl OrderIntent {
    /// Build a validated intent for one token of `market`.
    ///
    /// # Errors
    /// `EngineError::Validation` if the price is outside (0, 1) or the
    /// size is not a positive finite number.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        market: &Market,
        token_side: TokenSide,
        side: Side,
        price: f64,
        size: f64,
        order_type: OrderType,
        strategy: StrategyId,
        created_ms: u64,
    ) -> EngineResult<Self> {
        if !(price.is_finite() && price > 0.0 && price < 1.0) {
            return Err(EngineError::Validation(format!(
                "price {price} outside (0, 1)"
            )));
        }
        if !(size.is_finite() && size > 0.0) {
            return Err(EngineError::Validation(format!("size {size} not positive")));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            market_id: market.id.clone(),
            token_id: market.token(token_side).clone(),
            token_side,
            side,
            price,
            size,
            order_type,
            strategy,
            created_ms,
        })
    }

    /// Unique intent id.
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Target market.
    pub fn market_id(&self) -> &MarketId {
        &self.market_id
    }

    /// Target token.
    pub fn token_id(&self) -> &TokenId {
        &self.token_id
    }

    /// YES or NO.
    pub const fn token_side(&self) -> TokenSide {
        self.token_side
    }

    /// Buy or sell.
    pub const fn side(&self) -> Side {
        self.side
    }

    /// Limit price.
    pub const fn price(&self) -> f64 {
        self.price
    }

    /// Size in shares.
    pub const fn size(&self) -> f64 {
        self.size
    }

    /// Time-in-force.
    pub const fn order_type(&self) -> OrderType {
        self.order_type
    }

    /// Originating strategy.
    pub const fn strategy(&self) -> StrategyId {
        self.strategy
    }

    /// Creation time (Unix ms).
    pub const fn created_ms(&self) -> u64 {
        self.created_ms
    }

    /// Dollar notional at the limit price.
    pub fn notional(&self) -> f64 {
        self.price * self.size
    }
}

// ────────────────────────────────────────────
// Batch
// ────────────────────────────────────────────

/// How the execution engine must treat a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchKind {
    /// Two legs that must reach the exchange in one call; fills are
    /// reconciled by the imbalance handler.
    Paired {
        /// Arb pair: edge is re-read from the live books before sending.
        recheck_edge: bool,
    },
    /// Independent order(s).
    Single,
    /// Cancel every resting order in the market, then post these.
    Requote,
    /// Cancel every resting order in the market and post nothing.
    Withdraw,
}

/// Unit of submission produced by one strategy evaluation.
#[derive(Debug, Clone, Serialize)]
pub struct Batch {
    /// Target market.
    pub market_id: MarketId,
    /// Originating strategy.
    pub strategy: StrategyId,
    /// Submission semantics.
    pub kind: BatchKind,
    /// Orders, in submission order.
    pub intents: Vec<OrderIntent>,
}

impl Batch {
    /// One standalone order.
    pub fn single(intent: OrderIntent) -> Self {
        Self {
            market_id: intent.market_id.clone(),
            strategy: intent.strategy,
            kind: BatchKind::Single,
            intents: vec![intent],
        }
    }

    /// Two legs submitted together.
    pub fn paired(first: OrderIntent, second: OrderIntent, recheck_edge: bool) -> Self {
        Self {
            market_id: first.market_id.clone(),
            strategy: first.strategy,
            kind: BatchKind::Paired { recheck_edge },
            intents: vec![first, second],
        }
    }

    /// Replace every resting quote in the market.
    pub fn requote(market_id: MarketId, strategy: StrategyId, intents: Vec<OrderIntent>) -> Self {
        Self {
            market_id,
            strategy,
            kind: BatchKind::Requote,
            intents,
        }
    }

    /// Pull every resting quote in the market.
    pub const fn withdraw(market_id: MarketId, strategy: StrategyId) -> Self {
        Self {
            market_id,
            strategy,
            kind: BatchKind::Withdraw,
            intents: Vec::new(),
        }
    }

    /// Sum of intent notionals.
    pub fn notional(&self) -> f64 {
        self.intents.iter().map(OrderIntent::notional).sum()
    }

    /// Whether any intent in this batch trades the given token.
    pub fn touches(&self, token_id: &str) -> bool {
        self.intents.iter().any(|i| i.token_id == token_id)
    }
}

// ────────────────────────────────────────────
// Exchange-side results
// ────────────────────────────────────────────

/// Status of an order at the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Resting, nothing filled.
    Open,
    /// Some size filled, remainder resting or killed.
    Partial,
    /// Fully filled.
    Filled,
    /// Cancelled with no further fills.
    Cancelled,
    /// Refused by the exchange.
    Rejected,
}

/// Immediate result of submitting one order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderResult {
    /// Exchange order id (empty when rejected before assignment).
    pub order_id: OrderId,
    /// Status right after submission.
    pub status: OrderStatus,
    /// Size filled at submission time.
    pub filled_size: f64,
    /// Average fill price (0 when nothing filled).
    pub avg_price: f64,
}

/// Asynchronous fill confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    /// Exchange order id.
    pub order_id: OrderId,
    /// Token traded.
    pub token_id: TokenId,
    /// Side of our order.
    pub side: Side,
    /// Execution price.
    pub price: f64,
    /// Shares filled in this event.
    pub size: f64,
    /// Exchange timestamp (Unix ms).
    pub ts_ms: u64,
}

/// Intent plus signature material from the signing collaborator.
#[derive(Debug, Clone, Serialize)]
pub struct SignedOrder {
    /// The intent that was signed.
    pub intent: OrderIntent,
    /// Signature over the exchange order payload.
    pub signature: String,
    /// Signer address or key id.
    pub signer: String,
    /// Replay-protection salt.
    pub salt: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::{Asset, DurationClass};

    fn market() -> Market {
        Market {
            id: "m".into(),
            asset: Asset::ETH,
            duration: DurationClass::FiveMin,
            open_ms: 0,
            expiry_ms: 300_000,
            reference_price: 3_000.0,
            yes_token: "y".into(),
            no_token: "n".into(),
        }
    }

    #[test]
    fn test_intent_validation() {
        let m = market();
        let bad_price = OrderIntent::new(
            &m, TokenSide::Yes, Side::Buy, 1.2, 10.0, OrderType::Fak, StrategyId::Arbitrage, 0,
        );
        assert!(matches!(bad_price, Err(EngineError::Validation(_))));
        let bad_size = OrderIntent::new(
            &m, TokenSide::Yes, Side::Buy, 0.5, 0.0, OrderType::Fak, StrategyId::Arbitrage, 0,
        );
        assert!(bad_size.is_err());
    }

    #[test]
    fn test_intent_resolves_token() {
        let m = market();
        let i = OrderIntent::new(
            &m, TokenSide::No, Side::Buy, 0.4, 25.0, OrderType::Fak, StrategyId::Straddle, 7,
        )
        .unwrap();
        assert_eq!(i.token_id(), "n");
        assert!((i.notional() - 10.0).abs() < 1e-9);
        assert_eq!(i.created_ms(), 7);
    }

    #[test]
    fn test_paired_batch() {
        let m = market();
        let a = OrderIntent::new(
            &m, TokenSide::Yes, Side::Buy, 0.45, 10.0, OrderType::Fak, StrategyId::Arbitrage, 0,
        )
        .unwrap();
        let b = OrderIntent::new(
            &m, TokenSide::No, Side::Buy, 0.43, 10.0, OrderType::Fak, StrategyId::Arbitrage, 0,
        )
        .unwrap();
        let batch = Batch::paired(a, b, true);
        assert_eq!(batch.kind, BatchKind::Paired { recheck_edge: true });
        assert!(batch.touches("y") && batch.touches("n"));
        assert!((batch.notional() - 8.8).abs() < 1e-9);
    }
}
