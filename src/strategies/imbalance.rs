//! Imbalance Handler - Reconcile uneven fills on paired batches.
//!
//! Shared by the straddle and arbitrage engines. Branch order is fixed:
//! accept dust, complete the short leg while the pair still costs under
//! $1, hold an excess the bias agrees with, otherwise flatten it.

use tracing::info;

use crate::config::ImbalanceConfig;
use crate::domain::market::{Market, TokenSide};
use crate::domain::order::{Batch, OrderIntent, OrderType, Side, StrategyId};
use crate::domain::signal::BiasSignal;
use crate::signals::MarketSnapshot;

use super::PairReport;

/// Lowest limit price accepted by the exchange.
const MIN_PRICE: f64 = 0.01;

/// What to do with a fill imbalance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ImbalanceDecision {
    /// Residual too small to act on.
    Accept,
    /// Buy the missing shares of the short leg.
    Complete {
        /// Short leg.
        token: TokenSide,
        /// Shares to buy.
        size: f64,
        /// Limit (current ask).
        price: f64,
    },
    /// Keep the directional excess; the bias agrees with it.
    Hold {
        /// Over-filled leg.
        token: TokenSide,
    },
    /// Sell the excess at the bid.
    Flatten {
        /// Over-filled leg.
        token: TokenSide,
        /// Shares to sell.
        size: f64,
        /// Limit (current bid).
        price: f64,
    },
}

/// Stateless imbalance resolver.
#[derive(Debug, Clone)]
pub struct ImbalanceHandler {
    min_imbalance_usd: f64,
    hold_min_confidence: f64,
}

impl ImbalanceHandler {
    /// Handler from config.
    pub const fn new(config: &ImbalanceConfig) -> Self {
        Self {
            min_imbalance_usd: config.min_imbalance_usd,
            hold_min_confidence: config.hold_min_confidence,
        }
    }

    /// Decide how to resolve the difference between the two legs.
    pub fn decide(
        &self,
        report: &PairReport,
        snapshot: &MarketSnapshot,
        bias: &BiasSignal,
    ) -> ImbalanceDecision {
        let [a, b] = report.legs;
        let (over, short) = if a.filled >= b.filled { (a, b) } else { (b, a) };
        let excess = over.filled - short.filled;
        let delta_usd = excess * over.avg_price;
        if delta_usd < self.min_imbalance_usd {
            return ImbalanceDecision::Accept;
        }

        // Profitability first: complete while the pair still costs < $1.
        if let Some(ask) = snapshot.book(short.token).best_ask() {
            if over.avg_price + ask < 1.0 {
                return ImbalanceDecision::Complete {
                    token: short.token,
                    size: excess,
                    price: ask,
                };
            }
        }

        if bias.favors(over.token) && bias.confidence > self.hold_min_confidence {
            return ImbalanceDecision::Hold { token: over.token };
        }

        let bid = snapshot
            .book(over.token)
            .best_bid()
            .unwrap_or(MIN_PRICE)
            .max(MIN_PRICE);
        ImbalanceDecision::Flatten {
            token: over.token,
            size: excess,
            price: bid,
        }
    }

    /// Decide and build the corrective batch, if one is needed.
    pub fn resolve(
        &self,
        market: &Market,
        strategy: StrategyId,
        report: &PairReport,
        snapshot: &MarketSnapshot,
        now_ms: u64,
    ) -> (ImbalanceDecision, Option<Batch>) {
        let decision = self.decide(report, snapshot, &snapshot.signals.bias);
        let intent = match decision {
            ImbalanceDecision::Accept | ImbalanceDecision::Hold { .. } => None,
            ImbalanceDecision::Complete { token, size, price } => OrderIntent::new(
                market,
                token,
                Side::Buy,
                price,
                size,
                OrderType::Fak,
                strategy,
                now_ms,
            )
            .ok(),
            ImbalanceDecision::Flatten { token, size, price } => OrderIntent::new(
                market,
                token,
                Side::Sell,
                price,
                size,
                OrderType::Fak,
                strategy,
                now_ms,
            )
            .ok(),
        };
        info!(
            market = %market.id,
            strategy = %strategy,
            decision = ?decision,
            "Imbalance resolved"
        );
        (decision, intent.map(Batch::single))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::signal::{Direction, VolRegime};
    use crate::strategies::LegFill;
    use crate::strategies::fixtures::{book, market, signals, snapshot};

    fn handler() -> ImbalanceHandler {
        ImbalanceHandler::new(&ImbalanceConfig::default())
    }

    fn report(yes_filled: f64, no_filled: f64) -> PairReport {
        PairReport {
            legs: [
                LegFill {
                    token: TokenSide::Yes,
                    requested: 100.0,
                    filled: yes_filled,
                    avg_price: 0.45,
                },
                LegFill {
                    token: TokenSide::No,
                    requested: 100.0,
                    filled: no_filled,
                    avg_price: 0.43,
                },
            ],
        }
    }

    fn snap(no_ask: f64, bias: BiasSignal) -> MarketSnapshot {
        let mut s = signals(VolRegime::Medium);
        s.bias = bias;
        snapshot(
            s,
            book("yes", &[(0.44, 500.0)], &[(0.46, 500.0)]),
            book("no", &[(0.42, 500.0)], &[(no_ask, 500.0)]),
        )
    }

    #[test]
    fn test_dust_is_accepted() {
        // 1 share × 0.45 = 0.45 < 0.50
        let d = handler().decide(&report(100.0, 99.0), &snap(0.44, BiasSignal::neutral()), &BiasSignal::neutral());
        assert_eq!(d, ImbalanceDecision::Accept);
    }

    #[test]
    fn test_complete_when_pair_stays_profitable() {
        let (d, batch) = handler().resolve(
            &market(),
            StrategyId::Straddle,
            &report(100.0, 40.0),
            &snap(0.44, BiasSignal::neutral()),
            1,
        );
        assert_eq!(
            d,
            ImbalanceDecision::Complete {
                token: TokenSide::No,
                size: 60.0,
                price: 0.44
            }
        );
        let batch = batch.unwrap();
        assert_eq!(batch.intents.len(), 1);
        assert_eq!(batch.intents[0].side(), Side::Buy);
    }

    #[test]
    fn test_hold_when_bias_agrees() {
        let bias = BiasSignal {
            direction: Direction::Up,
            confidence: 0.5,
            score: 0.5,
        };
        // NO ask moved to 0.56: 0.45 + 0.56 >= 1
        let (d, batch) =
            handler().resolve(&market(), StrategyId::Arbitrage, &report(100.0, 40.0), &snap(0.56, bias), 1);
        assert_eq!(d, ImbalanceDecision::Hold { token: TokenSide::Yes });
        assert!(batch.is_none());
    }

    #[test]
    fn test_flatten_otherwise() {
        let bias = BiasSignal {
            direction: Direction::Down,
            confidence: 0.9,
            score: -0.9,
        };
        let (d, batch) =
            handler().resolve(&market(), StrategyId::Arbitrage, &report(100.0, 40.0), &snap(0.56, bias), 1);
        assert_eq!(
            d,
            ImbalanceDecision::Flatten {
                token: TokenSide::Yes,
                size: 60.0,
                price: 0.44
            }
        );
        let batch = batch.unwrap();
        assert_eq!(batch.intents[0].side(), Side::Sell);
        assert_eq!(batch.intents[0].token_side(), TokenSide::Yes);
    }
}
