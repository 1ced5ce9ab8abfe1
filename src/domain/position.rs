//! Per-market position.
//!
//! Holdings change only on confirmed fills; the ledger owns every
//! `Position` and is the only caller of the mutators.

use rust_decimal::Decimal;
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};

use super::market::{MarketId, TokenSide};
use super::order::Side;

/// YES/NO holdings and cost basis for one market.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Market this position belongs to.
    pub market_id: MarketId,
    /// YES shares held.
    pub yes: Decimal,
    /// NO shares held.
    pub no: Decimal,
    /// Dollars paid for YES shares still held.
    pub yes_cost: Decimal,
    /// Dollars paid for NO shares still held.
    pub no_cost: Decimal,
}

impl Position {
    /// Empty position.
    pub fn new(market_id: impl Into<MarketId>) -> Self {
        Self {
            market_id: market_id.into(),
            ..Self::default()
        }
    }

    /// Apply a fill. Returns realized P&L for sells (zero for buys).
    ///
    /// Sells are capped at the held quantity; the cap is returned in the
    /// second element so the caller can log an over-sell.
    pub fn apply_fill(
        &mut self,
        token: TokenSide,
        side: Side,
        price: Decimal,
        size: Decimal,
    ) -> (Decimal, Decimal) {
        let (qty, cost) = match token {
            TokenSide::Yes => (&mut self.yes, &mut self.yes_cost),
            TokenSide::No => (&mut self.no, &mut self.no_cost),
        };
        match side {
            Side::Buy => {
                *qty += size;
                *cost += price * size;
                (Decimal::ZERO, size)
            }
            Side::Sell => {
                let sold = size.min(*qty);
                if sold <= Decimal::ZERO {
                    return (Decimal::ZERO, Decimal::ZERO);
                }
                let avg = *cost / *qty;
                let basis = avg * sold;
                *qty -= sold;
                *cost -= basis;
                (price * sold - basis, sold)
            }
        }
    }

    /// Shares held of one token.
    pub const fn held(&self, token: TokenSide) -> Decimal {
        match token {
            TokenSide::Yes => self.yes,
            TokenSide::No => self.no,
        }
    }

    /// Total cost basis of the position.
    pub fn cost_basis(&self) -> Decimal {
        self.yes_cost + self.no_cost
    }

    /// Shares held as matched YES/NO pairs.
    pub fn paired_shares(&self) -> Decimal {
        self.yes.min(self.no)
    }

    /// Profit locked in by matched pairs: each pair pays $1.
    pub fn guaranteed_pair_profit(&self) -> Decimal {
        let pairs = self.paired_shares();
        if pairs <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let yes_avg = self.yes_cost / self.yes;
        let no_avg = self.no_cost / self.no;
        pairs * (Decimal::ONE - yes_avg - no_avg)
    }

    /// YES minus NO shares.
    pub fn net_yes(&self) -> Decimal {
        self.yes - self.no
    }

    /// Net YES as f64 for the strategy boundary.
    pub fn net_yes_f64(&self) -> f64 {
        self.net_yes().to_f64().unwrap_or(0.0)
    }

    /// Payout at resolution minus remaining cost basis.
    pub fn settle(&self, winner: TokenSide) -> Decimal {
        self.held(winner) - self.cost_basis()
    }

    /// No holdings on either side.
    pub fn is_flat(&self) -> bool {
        self.yes.is_zero() && self.no.is_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_straddle_profit_locked() {
        let mut p = Position::new("m");
        p.apply_fill(TokenSide::Yes, Side::Buy, dec!(0.45), dec!(100));
        p.apply_fill(TokenSide::No, Side::Buy, dec!(0.43), dec!(100));
        assert_eq!(p.guaranteed_pair_profit(), dec!(12));
        assert_eq!(p.settle(TokenSide::Yes), dec!(12));
        assert_eq!(p.settle(TokenSide::No), dec!(12));
    }

    #[test]
    fn test_sell_realizes_against_average_cost() {
        let mut p = Position::new("m");
        p.apply_fill(TokenSide::Yes, Side::Buy, dec!(0.40), dec!(10));
        p.apply_fill(TokenSide::Yes, Side::Buy, dec!(0.60), dec!(10));
        let (pnl, sold) = p.apply_fill(TokenSide::Yes, Side::Sell, dec!(0.55), dec!(10));
        assert_eq!(sold, dec!(10));
        assert_eq!(pnl, dec!(0.5));
        assert_eq!(p.yes, dec!(10));
        assert_eq!(p.yes_cost, dec!(5));
    }

    #[test]
    fn test_oversell_is_capped() {
        let mut p = Position::new("m");
        p.apply_fill(TokenSide::No, Side::Buy, dec!(0.5), dec!(4));
        let (_, sold) = p.apply_fill(TokenSide::No, Side::Sell, dec!(0.5), dec!(10));
        assert_eq!(sold, dec!(4));
        assert!(p.is_flat());
    }
}
