//! Fair probability of the "up" outcome.
//!
//! Driftless normal model: the spot move from the reference price is
//! scaled by per-minute volatility times the square root of minutes left,
//! then pushed through the standard normal CDF.

use crate::domain::market::MINUTES_PER_YEAR;

/// Lower/upper clamp on the model output.
const PROB_FLOOR: f64 = 0.01;
const PROB_CEIL: f64 = 0.99;

/// Standard normal CDF via the Abramowitz–Stegun erf approximation
/// (max abs error ~1.5e-7).
pub fn normal_cdf(x: f64) -> f64 {
    const A1: f64 = 0.254_829_592;
    const A2: f64 = -0.284_496_736;
    const A3: f64 = 1.421_413_741;
    const A4: f64 = -1.453_152_027;
    const A5: f64 = 1.061_405_429;
    const P: f64 = 0.327_591_1;

    let z = x.abs() / std::f64::consts::SQRT_2;
    let t = 1.0 / P.mul_add(z, 1.0);
    let poly = A5.mul_add(t, A4).mul_add(t, A3).mul_add(t, A2).mul_add(t, A1) * t;
    let erf = 1.0 - poly * (-z * z).exp();
    let half = 0.5 * erf;
    if x >= 0.0 { 0.5 + half } else { 0.5 - half }
}

/// Per-minute volatility from an annualized figure.
pub fn vol_per_minute(annual_vol: f64) -> f64 {
    annual_vol / MINUTES_PER_YEAR.sqrt()
}

/// Probability that the close ends at or above `reference`.
///
/// At or past expiry the outcome is known (1 or 0). With no reference or
/// no volatility the model has no view and returns 0.5. Otherwise the
/// result is clamped to [0.01, 0.99].
pub fn fair_prob_up(spot: f64, reference: f64, annual_vol: f64, minutes_remaining: f64) -> f64 {
    if minutes_remaining <= 0.0 {
        return if spot >= reference { 1.0 } else { 0.0 };
    }
    if reference <= 0.0 || annual_vol <= 0.0 {
        return 0.5;
    }
    let pct_move = (spot - reference) / reference;
    let d = pct_move / (vol_per_minute(annual_vol) * minutes_remaining.sqrt());
    normal_cdf(d).clamp(PROB_FLOOR, PROB_CEIL)
}
