//! Signal Benchmarks - Hot-Path Performance Validation
//!
//! Benchmarks the work done on every feed event: folding events into
//! the signal engine, computing a market snapshot, and the arb scan.
//!
//! Run with: cargo bench --bench signal_bench

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use polymarket_updown_engine::config::SignalConfig;
use polymarket_updown_engine::domain::book::OrderBook;
use polymarket_updown_engine::domain::kelly::KellySizer;
use polymarket_updown_engine::domain::market::{Asset, DurationClass, Market};
use polymarket_updown_engine::domain::order::Side;
use polymarket_updown_engine::ports::FeedEvent;
use polymarket_updown_engine::signals::{ArbScanner, SignalEngine, fair_prob_up};

const OPEN_MS: u64 = 1_700_000_000_000;

fn market() -> Market {
    Market {
        id: "btc-5m".into(),
        asset: Asset::BTC,
        duration: DurationClass::FiveMin,
        open_ms: OPEN_MS,
        expiry_ms: OPEN_MS + 300_000,
        reference_price: 100_000.0,
        yes_token: "yes".into(),
        no_token: "no".into(),
    }
}

fn book_event(token: &str, ask: f64, ts_ms: u64) -> FeedEvent {
    FeedEvent::Book {
        token_id: token.into(),
        bids: vec![(ask - 0.02, 200.0), (ask - 0.03, 400.0)],
        asks: vec![(ask, 150.0), (ask + 0.01, 300.0), (ask + 0.02, 500.0)],
        snapshot: true,
        ts_ms,
    }
}

/// Engine warmed with ten minutes of one-second spot ticks.
fn warm_engine() -> SignalEngine {
    let mut engine = SignalEngine::new(SignalConfig::default());
    engine.apply(&FeedEvent::MarketListed { market: market() });
    for i in 0..600u32 {
        let ts_ms = OPEN_MS - 600_000 + u64::from(i) * 1_000;
        let price = 100_000.0 + (f64::from(i) * 0.1).sin() * 50.0;
        engine.apply(&FeedEvent::SpotTick {
            asset: Asset::BTC,
            price,
            ts_ms,
        });
        engine.apply(&FeedEvent::SpotTrade {
            asset: Asset::BTC,
            price,
            size: 0.5,
            side: if i % 3 == 0 { Side::Sell } else { Side::Buy },
            ts_ms,
        });
    }
    engine.apply(&book_event("yes", 0.47, OPEN_MS));
    engine.apply(&book_event("no", 0.50, OPEN_MS));
    engine
}

/// Benchmark folding a book snapshot into the engine.
fn bench_apply_book(c: &mut Criterion) {
    let mut engine = warm_engine();
    let event = book_event("yes", 0.46, OPEN_MS + 1_000);

    c.bench_function("signal_apply_book", |b| {
        b.iter(|| engine.apply(black_box(&event)));
    });
}

/// Benchmark folding a spot tick into the engine.
fn bench_apply_tick(c: &mut Criterion) {
    let mut engine = warm_engine();
    let event = FeedEvent::SpotTick {
        asset: Asset::BTC,
        price: 100_020.0,
        ts_ms: OPEN_MS + 1_000,
    };

    c.bench_function("signal_apply_tick", |b| {
        b.iter(|| engine.apply(black_box(&event)));
    });
}

/// Benchmark the full per-market signal snapshot.
fn bench_snapshot(c: &mut Criterion) {
    let engine = warm_engine();

    c.bench_function("signal_market_snapshot", |b| {
        b.iter(|| engine.snapshot(black_box("btc-5m"), black_box(OPEN_MS + 60_000)));
    });
}

/// Benchmark the YES+NO arb scan.
fn bench_arb_scan(c: &mut Criterion) {
    let scanner = ArbScanner::new(&SignalConfig::default());
    let mut yes = OrderBook::new("yes");
    yes.apply_snapshot(&[(0.45, 100.0)], &[(0.47, 100.0), (0.48, 250.0)], OPEN_MS);
    let mut no = OrderBook::new("no");
    no.apply_snapshot(&[(0.48, 100.0)], &[(0.50, 120.0), (0.51, 80.0)], OPEN_MS);

    c.bench_function("arb_scan", |b| {
        b.iter(|| scanner.scan(black_box(&yes), black_box(&no), black_box(0.8)));
    });
}

/// Benchmark fair probability plus Kelly sizing for the lag strategy.
fn bench_fair_prob_kelly(c: &mut Criterion) {
    let sizer = KellySizer::new(0.25);

    c.bench_function("fair_prob_and_kelly", |b| {
        b.iter(|| {
            let p = fair_prob_up(
                black_box(100_150.0),
                black_box(100_000.0),
                black_box(0.55),
                black_box(3.5),
            );
            sizer.stake(p, black_box(0.52), black_box(1_000.0))
        });
    });
}

criterion_group!(
    benches,
    bench_apply_book,
    bench_apply_tick,
    bench_snapshot,
    bench_arb_scan,
    bench_fair_prob_kelly,
);
criterion_main!(benches);
