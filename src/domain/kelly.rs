//! Kelly Criterion position sizing.
//!
//! Fractional Kelly for binary tokens bought at `price` that pay $1.
//! Used by the lag exploit with an edge-scaled assumed win probability.
//!
//! Exposes both `KellyCriterion` (Decimal API) and `KellySizer` (f64 API).

use rust_decimal::Decimal;
use rust_decimal::prelude::*;
use rust_decimal_macros::dec;

/// Kelly Criterion calculator (Decimal API).
#[derive(Debug, Clone)]
pub struct KellyCriterion {
    /// Kelly fraction multiplier (0.25 = quarter-Kelly)
    fraction: Decimal,
    /// Ceiling on the sized fraction of bankroll
    max_position_fraction: Decimal,
}

impl KellyCriterion {
    /// Creates a new Kelly calculator with the given fraction and ceiling.
    pub const fn new(fraction: Decimal, max_position_fraction: Decimal) -> Self {
        Self {
            fraction,
            max_position_fraction,
        }
    }

    /// Fraction of bankroll to stake.
    ///
    ///   f* = (p * b - q) / b,  b = (1 - price) / price
    pub fn optimal_fraction(&self, win_prob: Decimal, price: Decimal) -> Decimal {
        if price <= Decimal::ZERO || price >= Decimal::ONE {
            return Decimal::ZERO;
        }
        if win_prob <= Decimal::ZERO || win_prob >= Decimal::ONE {
            return Decimal::ZERO;
        }

        let b = (Decimal::ONE - price) / price;
        let q = Decimal::ONE - win_prob;
        let full_kelly = (win_prob * b - q) / b;

        if full_kelly <= Decimal::ZERO {
            return Decimal::ZERO;
        }

        (full_kelly * self.fraction).min(self.max_position_fraction)
    }

    /// Dollar stake for a bankroll, rounded to cents.
    pub fn stake(&self, bankroll: Decimal, win_prob: Decimal, price: Decimal) -> Decimal {
        (bankroll * self.optimal_fraction(win_prob, price)).round_dp(2)
    }
}

impl Default for KellyCriterion {
    /// Quarter-Kelly, never more than half the bankroll.
    fn default() -> Self {
        Self {
            fraction: dec!(0.25),
            max_position_fraction: dec!(0.5),
        }
    }
}

// ────────────────────────────────────────────
// KellySizer - f64 boundary API for strategies
// ────────────────────────────────────────────

/// f64 wrapper around `KellyCriterion` for the strategy layer.
#[derive(Debug, Clone)]
pub struct KellySizer {
    inner: KellyCriterion,
}

impl KellySizer {
    /// Sizer with the given Kelly fraction and a 0.5 ceiling.
    pub fn new(fraction: f64) -> Self {
        let frac = Decimal::from_f64(fraction).unwrap_or(dec!(0.25));
        Self {
            inner: KellyCriterion::new(frac, dec!(0.5)),
        }
    }

    /// Dollar stake for the given bankroll.
    pub fn stake(&self, win_prob: f64, price: f64, bankroll: f64) -> f64 {
        let prob = Decimal::from_f64(win_prob).unwrap_or(Decimal::ZERO);
        let price = Decimal::from_f64(price).unwrap_or(Decimal::ZERO);
        let bank = Decimal::from_f64(bankroll).unwrap_or(Decimal::ZERO);

        self.inner.stake(bank, prob, price).to_f64().unwrap_or(0.0)
    }

    /// Sized fraction (0.0 – 0.5).
    pub fn fraction(&self, win_prob: f64, price: f64) -> f64 {
        let prob = Decimal::from_f64(win_prob).unwrap_or(Decimal::ZERO);
        let price = Decimal::from_f64(price).unwrap_or(Decimal::ZERO);

        self.inner
            .optimal_fraction(prob, price)
            .to_f64()
            .unwrap_or(0.0)
    }
}
