//! Property-Based Tests - Domain Layer Invariants
//!
//! Uses `proptest` to verify that lifecycle, sizing, bias and risk
//! rules hold across random inputs.

use proptest::prelude::*;

use polymarket_updown_engine::config::{SignalConfig, StraddleConfig};
use polymarket_updown_engine::domain::book::OrderBook;
use polymarket_updown_engine::domain::kelly::KellySizer;
use polymarket_updown_engine::domain::lifecycle::{Phase, phase_at};
use polymarket_updown_engine::domain::market::DurationClass;
use polymarket_updown_engine::domain::signal::Direction;
use polymarket_updown_engine::signals::ArbScanner;
use polymarket_updown_engine::signals::bias::{BiasComponents, BiasDetector, RawBiasInputs};
use polymarket_updown_engine::strategies::straddle::StraddleStrategy;
use polymarket_updown_engine::usecases::risk_manager::exposure_breached;

fn duration() -> impl Strategy<Value = DurationClass> {
    prop_oneof![Just(DurationClass::FiveMin), Just(DurationClass::FifteenMin)]
}

// ── Lifecycle Properties ────────────────────────────────────

proptest! {
    /// Phase depends only on elapsed time since open.
    #[test]
    fn phase_depends_only_on_elapsed(
        d in duration(),
        open in 0u64..1_000_000_000,
        shift in 0u64..1_000_000_000,
        elapsed in 0u64..2_000_000,
    ) {
        prop_assert_eq!(
            phase_at(d, open, open + elapsed),
            phase_at(d, open + shift, open + shift + elapsed)
        );
    }

    /// Phases never move backwards as time advances.
    #[test]
    fn phase_is_monotonic(
        d in duration(),
        open in 0u64..1_000_000,
        a in 0u64..2_000_000,
        b in 0u64..2_000_000,
    ) {
        let (early, late) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(phase_at(d, open, open + early) <= phase_at(d, open, open + late));
    }

    /// The last 30 seconds of a 5-minute window never admit new orders.
    #[test]
    fn final_stretch_is_locked(open in 0u64..1_000_000, into in 270_000u64..400_000) {
        let phase = phase_at(DurationClass::FiveMin, open, open + into);
        prop_assert!(!phase.permits_new_orders());
        prop_assert!(phase >= Phase::Lockout);
    }
}

// ── Sizing Properties ───────────────────────────────────────

proptest! {
    /// Straddle legs never exceed either side's depth or the capital share.
    #[test]
    fn straddle_size_bounded(
        yes_depth in 0.0f64..10_000.0,
        no_depth in 0.0f64..10_000.0,
        combined in 0.5f64..0.99,
        capital in 10.0f64..100_000.0,
    ) {
        let config = StraddleConfig::default();
        let cap = config.max_capital_pct;
        let size = StraddleStrategy::new(config).straddle_size(yes_depth, no_depth, combined, capital);
        prop_assert!(size >= 0.0);
        prop_assert!(size <= yes_depth.min(no_depth) + 1e-9);
        prop_assert!(size * combined <= capital * cap + 1e-6);
    }

    /// With a profit multiple of at most one, a losing Phase-2 add can
    /// never cost more than the straddle locked in.
    #[test]
    fn phase_two_loss_bounded_by_locked_profit(
        multiple in 0.1f64..=1.0,
        ask in 0.05f64..0.95,
        depth in 0.0f64..5_000.0,
        capital in 10.0f64..50_000.0,
        locked in 0.0f64..50.0,
        confidence in 0.0f64..1.0,
    ) {
        let config = StraddleConfig { profit_multiple: multiple, ..StraddleConfig::default() };
        let add = StraddleStrategy::new(config).add_size(ask, depth, capital, locked, confidence);
        prop_assert!(add >= 0.0);
        prop_assert!(add * ask <= locked + 1e-9, "add cost {} > locked {}", add * ask, locked);
    }

    /// Kelly stakes stay within half the bankroll.
    #[test]
    fn kelly_stake_bounded(
        fraction in 0.05f64..1.0,
        prob in 0.01f64..0.99,
        price in 0.01f64..0.99,
        bankroll in 1.0f64..10_000.0,
    ) {
        let stake = KellySizer::new(fraction).stake(prob, price, bankroll);
        prop_assert!(stake >= 0.0);
        // Stakes are rounded to cents.
        prop_assert!(stake <= bankroll * 0.5 + 0.01);
    }
}

// ── Signal Properties ───────────────────────────────────────

proptest! {
    /// Bias score stays in [-1, 1] and confidence matches a declared bias.
    #[test]
    fn bias_score_clamped(
        momentum_pct in -0.1f64..0.1,
        ema_spread in -5_000.0f64..5_000.0,
        price in 0.0f64..100_000.0,
        flow_delta in -1e6f64..1e6,
        flow_volume in 0.0f64..1e6,
        funding_rate in -0.01f64..0.01,
        net_liquidation in -1e8f64..1e8,
    ) {
        let detector = BiasDetector::new(&SignalConfig::default());
        let c = detector.normalize(&RawBiasInputs {
            momentum_pct,
            ema_spread,
            price,
            flow_delta,
            flow_volume,
            funding_rate,
            net_liquidation,
        });
        for x in [c.momentum, c.trend, c.flow, c.funding, c.liquidation] {
            prop_assert!((-1.0..=1.0).contains(&x));
        }
        let bias = detector.detect(&c);
        prop_assert!((-1.0..=1.0).contains(&bias.score));
        prop_assert!(bias.confidence == 0.0 || (bias.confidence - bias.score.abs()).abs() < 1e-12);
    }

    /// Unanimous saturated components give a full-confidence signal.
    #[test]
    fn bias_saturates(sign in prop_oneof![Just(1.0f64), Just(-1.0f64)]) {
        let detector = BiasDetector::new(&SignalConfig::default());
        let c = BiasComponents {
            momentum: sign,
            trend: sign,
            flow: sign,
            funding: sign,
            liquidation: sign,
        };
        let bias = detector.detect(&c);
        prop_assert!((bias.score - sign).abs() < 1e-9);
        prop_assert!((bias.confidence - 1.0).abs() < 1e-9);
        let expected = if sign > 0.0 { Direction::Up } else { Direction::Down };
        prop_assert_eq!(bias.direction, expected);
    }

    /// An arb is reported only when the asks sum below one by the edge.
    #[test]
    fn arb_requires_edge(
        yes_ask in 0.01f64..0.99,
        no_ask in 0.01f64..0.99,
        size in 1.0f64..1_000.0,
    ) {
        let config = SignalConfig::default();
        let mut yes = OrderBook::new("y");
        yes.apply_snapshot(&[], &[(yes_ask, size)], 0);
        let mut no = OrderBook::new("n");
        no.apply_snapshot(&[], &[(no_ask, size)], 0);
        if let Some(arb) = ArbScanner::new(&config).scan(&yes, &no, 1.0) {
            prop_assert!(arb.edge >= config.arb_min_edge);
            prop_assert!(yes_ask + no_ask < 1.0);
            prop_assert!(arb.expected_profit >= config.arb_min_profit);
        }
    }
}

// ── Risk Properties ─────────────────────────────────────────

proptest! {
    /// Kill switch fires exactly when exposure exceeds the ceiling.
    #[test]
    fn kill_switch_iff_over_ceiling(
        exposure in 0.0f64..10_000.0,
        capital in 1.0f64..10_000.0,
        pct in 0.05f64..1.0,
    ) {
        prop_assert_eq!(exposure_breached(exposure, capital, pct), exposure > pct * capital);
    }
}
