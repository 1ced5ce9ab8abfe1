//! YES+NO arbitrage scanner.
//!
//! Pure function of the two live books. Called by the signal engine on
//! every book update and again by the execution engine right before a
//! paired arb batch is sent, so a stale edge is never traded.

use crate::config::SignalConfig;
use crate::domain::book::OrderBook;
use crate::domain::signal::ArbSignal;

/// Arb gate parameters.
#[derive(Debug, Clone, Copy)]
pub struct ArbScanner {
    min_edge: f64,
    min_profit: f64,
    depth_tolerance: f64,
}

impl ArbScanner {
    /// Scanner from signal config.
    pub const fn new(config: &SignalConfig) -> Self {
        Self {
            min_edge: config.arb_min_edge,
            min_profit: config.arb_min_profit,
            depth_tolerance: config.arb_depth_tolerance,
        }
    }

    /// Evaluate both books. `fill_probability` discounts the reported
    /// risk-adjusted profit but does not gate emission.
    pub fn scan(&self, yes: &OrderBook, no: &OrderBook, fill_probability: f64) -> Option<ArbSignal> {
        let yes_ask = yes.best_ask()?;
        let no_ask = no.best_ask()?;
        let edge = 1.0 - (yes_ask + no_ask);
        if edge < self.min_edge {
            return None;
        }

        let executable_size = yes
            .ask_depth_within(self.depth_tolerance)
            .min(no.ask_depth_within(self.depth_tolerance));
        let expected_profit = executable_size * edge;
        if expected_profit < self.min_profit {
            return None;
        }

        Some(ArbSignal {
            yes_ask,
            no_ask,
            edge,
            executable_size,
            expected_profit,
            risk_adjusted_profit: expected_profit * fill_probability,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(token: &str, asks: &[(f64, f64)]) -> OrderBook {
        let mut b = OrderBook::new(token);
        b.apply_snapshot(&[(0.01, 10.0)], asks, 1);
        b
    }

    fn scanner() -> ArbScanner {
        ArbScanner::new(&SignalConfig::default())
    }

    #[test]
    fn test_twelve_cent_edge_on_hundred_shares() {
        let yes = book("y", &[(0.45, 100.0)]);
        let no = book("n", &[(0.43, 150.0)]);
        let arb = scanner().scan(&yes, &no, 0.8).unwrap();
        assert!((arb.combined() - 0.88).abs() < 1e-9);
        assert!((arb.edge - 0.12).abs() < 1e-9);
        assert!((arb.executable_size - 100.0).abs() < 1e-9);
        assert!((arb.expected_profit - 12.0).abs() < 1e-9);
        assert!((arb.risk_adjusted_profit - 9.6).abs() < 1e-9);
    }

    #[test]
    fn test_depth_counts_levels_within_two_points() {
        let yes = book("y", &[(0.45, 40.0), (0.47, 60.0), (0.48, 500.0)]);
        let no = book("n", &[(0.43, 500.0)]);
        let arb = scanner().scan(&yes, &no, 1.0).unwrap();
        assert!((arb.executable_size - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_thin_edge_rejected() {
        let yes = book("y", &[(0.50, 1_000.0)]);
        let no = book("n", &[(0.49, 1_000.0)]);
        assert!(scanner().scan(&yes, &no, 1.0).is_none());
    }

    #[test]
    fn test_small_profit_rejected() {
        let yes = book("y", &[(0.45, 0.5)]);
        let no = book("n", &[(0.43, 0.5)]);
        // 0.5 × 0.12 = 0.06 < 0.10
        assert!(scanner().scan(&yes, &no, 1.0).is_none());
    }

    #[test]
    fn test_missing_side_yields_nothing() {
        let yes = OrderBook::new("y");
        let no = book("n", &[(0.43, 100.0)]);
        assert!(scanner().scan(&yes, &no, 1.0).is_none());
    }
}
