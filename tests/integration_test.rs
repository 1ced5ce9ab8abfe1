//! Integration Tests - Execution Engine and Risk Watchdog
//!
//! Drives the execution pipeline through mocked exchange, signer and
//! journal ports. Uses mockall for trait mocking and tokio::test for
//! async tests, with paused time where backoff is involved.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use mockall::mock;
use rust_decimal::Decimal;
use tokio::sync::{broadcast, mpsc, watch};

use polymarket_updown_engine::adapters::fill_stream;
use polymarket_updown_engine::config::AppConfig;
use polymarket_updown_engine::domain::book::OrderBook;
use polymarket_updown_engine::domain::market::{Asset, DurationClass, Market, MarketId, OrderId, TokenId, TokenSide};
use polymarket_updown_engine::domain::order::{
    Batch, Fill, OrderIntent, OrderResult, OrderStatus, OrderType, Side, SignedOrder, StrategyId,
};
use polymarket_updown_engine::error::RejectReason;
use polymarket_updown_engine::ports::{
    ExchangeClient, JournalEntry, OrderSigner, TelemetryEvent, TelemetrySink, TradeJournal,
};
use polymarket_updown_engine::signals::ArbScanner;
use polymarket_updown_engine::strategies::StrategyNotice;
use polymarket_updown_engine::usecases::{
    EngineSinks, ExecCommand, ExecHandle, ExecutionEngine, Ledger, LedgerSnapshot, RiskGate, RiskManager,
    RiskWatchdog, now_ms,
};

// ---- Mock Definitions ----

mock! {
    pub Exchange {}

    #[async_trait::async_trait]
    impl ExchangeClient for Exchange {
        async fn submit_single(&self, order: &SignedOrder) -> anyhow::Result<OrderResult>;
        async fn submit_batch(&self, orders: &[SignedOrder]) -> anyhow::Result<Vec<OrderResult>>;
        async fn cancel(&self, order_id: &OrderId) -> anyhow::Result<()>;
        async fn cancel_all(&self, market_id: &MarketId) -> anyhow::Result<usize>;
        async fn get_book(&self, token_id: &TokenId) -> anyhow::Result<OrderBook>;
        async fn get_midpoint(&self, token_id: &TokenId) -> anyhow::Result<Option<f64>>;
        fn subscribe_fills(&self) -> futures_util::stream::BoxStream<'static, Fill>;
    }
}

mock! {
    pub Signer {}

    #[async_trait::async_trait]
    impl OrderSigner for Signer {
        async fn sign(&self, intent: &OrderIntent) -> anyhow::Result<SignedOrder>;
    }
}

mock! {
    pub Journal {}

    #[async_trait::async_trait]
    impl TradeJournal for Journal {
        async fn append(&self, entry: &JournalEntry) -> anyhow::Result<()>;
    }
}

#[derive(Default)]
struct Recorder(Mutex<Vec<TelemetryEvent>>);

impl TelemetrySink for Recorder {
    fn emit(&self, event: &TelemetryEvent) {
        self.0.lock().unwrap().push(event.clone());
    }
}

impl Recorder {
    fn names(&self) -> Vec<&'static str> {
        self.0.lock().unwrap().iter().map(TelemetryEvent::name).collect()
    }
}

// ---- Fixtures ----

fn config(extra: &str) -> AppConfig {
    let text = format!("[bot]\nname = \"it\"\nstarting_capital = 100.0\n{extra}");
    polymarket_updown_engine::config::loader::parse_config(&text).unwrap()
}

fn market() -> Market {
    let open = now_ms() - 60_000;
    Market {
        id: "btc-15m".into(),
        asset: Asset::BTC,
        duration: DurationClass::FifteenMin,
        open_ms: open,
        expiry_ms: open + 900_000,
        reference_price: 100_000.0,
        yes_token: "yes".into(),
        no_token: "no".into(),
    }
}

fn intent(token: TokenSide, side: Side, price: f64, size: f64, order_type: OrderType, strategy: StrategyId) -> OrderIntent {
    OrderIntent::new(&market(), token, side, price, size, order_type, strategy, now_ms()).unwrap()
}

fn signer() -> MockSigner {
    let mut signer = MockSigner::new();
    signer.expect_sign().returning(|intent| {
        Ok(SignedOrder {
            intent: intent.clone(),
            signature: "sig".into(),
            signer: "0xabc".into(),
            salt: 7,
        })
    });
    signer
}

fn quiet_journal() -> MockJournal {
    let mut journal = MockJournal::new();
    journal.expect_append().returning(|_| Ok(()));
    journal
}

fn book(token: &str, ask: f64, size: f64) -> OrderBook {
    let mut b = OrderBook::new(token);
    b.apply_snapshot(&[(ask - 0.02, size)], &[(ask, size)], now_ms());
    b
}

fn engine(
    config: &AppConfig,
    exchange: MockExchange,
    journal: MockJournal,
    telemetry: Arc<Recorder>,
    gate: Arc<RiskGate>,
) -> ExecutionEngine<MockExchange, MockSigner> {
    ExecutionEngine::new(
        config.execution.clone(),
        Arc::new(exchange),
        Arc::new(signer()),
        RiskManager::new(config.risk.clone(), gate),
        ArbScanner::new(&config.signals),
        Ledger::new(config.bot.starting_capital),
        EngineSinks {
            telemetry,
            journal: Arc::new(journal),
        },
    )
}

async fn next_notice(rx: &mut mpsc::Receiver<(StrategyId, StrategyNotice)>) -> StrategyNotice {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("notice timed out")
        .expect("notice channel closed")
        .1
}

// ---- Integration Tests ----

#[tokio::test]
async fn test_arb_pair_submits_once_and_reports_both_legs() {
    let (fill_tx, fill_rx) = broadcast::channel(16);
    let mut exchange = MockExchange::new();
    exchange.expect_subscribe_fills().return_once(move || fill_stream(fill_rx));
    exchange.expect_get_midpoint().returning(|_| Ok(Some(0.49)));
    exchange
        .expect_get_book()
        .returning(|token| Ok(if token == "yes" { book("yes", 0.47, 100.0) } else { book("no", 0.50, 100.0) }));
    exchange.expect_submit_batch().times(1).returning(|orders| {
        Ok(orders
            .iter()
            .enumerate()
            .map(|(i, o)| OrderResult {
                order_id: format!("o{i}"),
                status: OrderStatus::Filled,
                filled_size: o.intent.size(),
                avg_price: o.intent.price(),
            })
            .collect())
    });
    exchange.expect_submit_single().never();
    exchange.expect_cancel_all().returning(|_| Ok(0));

    let mut journal = MockJournal::new();
    journal.expect_append().times(2).returning(|_| Ok(()));

    let cfg = config("");
    let telemetry = Arc::new(Recorder::default());
    let eng = engine(&cfg, exchange, journal, Arc::clone(&telemetry), Arc::new(RiskGate::new()));
    let mut ledger = eng.subscribe();
    let (exec, commands) = ExecHandle::channel(16);
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let task = tokio::spawn(eng.run(commands, shutdown_rx));

    let (notice_tx, mut notices) = mpsc::channel(16);
    exec.register(market(), notice_tx).await.unwrap();
    let batch = Batch::paired(
        intent(TokenSide::Yes, Side::Buy, 0.47, 10.0, OrderType::Fak, StrategyId::Arbitrage),
        intent(TokenSide::No, Side::Buy, 0.50, 10.0, OrderType::Fak, StrategyId::Arbitrage),
        true,
    );
    exec.submit(batch).await.unwrap();

    match next_notice(&mut notices).await {
        StrategyNotice::Submitted { results, .. } => assert_eq!(results.len(), 2),
        other => panic!("unexpected {other:?}"),
    }

    for (id, token, price) in [("o0", "yes", 0.47), ("o1", "no", 0.50)] {
        fill_tx
            .send(Fill {
                order_id: id.into(),
                token_id: token.into(),
                side: Side::Buy,
                price,
                size: 10.0,
                ts_ms: now_ms(),
            })
            .unwrap();
    }

    let mut report = None;
    for _ in 0..4 {
        if let StrategyNotice::PairFilled(r) = next_notice(&mut notices).await {
            report = Some(r);
            break;
        }
    }
    let report = report.expect("pair report");
    assert!((report.matched() - 10.0).abs() < 1e-9);
    assert!((report.locked_profit() - 0.3).abs() < 1e-6);

    let paired = |s: &LedgerSnapshot| {
        s.position("btc-15m")
            .is_some_and(|p| p.paired_shares() == Decimal::from(10))
    };
    tokio::time::timeout(Duration::from_secs(2), ledger.wait_for(paired))
        .await
        .expect("ledger update timed out")
        .unwrap();
    assert!(telemetry.names().contains(&"order_filled"));

    shutdown_tx.send(()).unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn test_vanished_edge_rejects_pair_without_submitting() {
    let mut exchange = MockExchange::new();
    exchange.expect_get_midpoint().returning(|_| Ok(Some(0.50)));
    exchange
        .expect_get_book()
        .returning(|token| Ok(book(token, 0.51, 100.0)));
    exchange.expect_submit_batch().never();

    let cfg = config("");
    let telemetry = Arc::new(Recorder::default());
    let mut eng = engine(&cfg, exchange, quiet_journal(), Arc::clone(&telemetry), Arc::new(RiskGate::new()));
    let (notice_tx, mut notices) = mpsc::channel(4);

    eng.dispatch(vec![
        ExecCommand::Register {
            market: market(),
            notices: notice_tx,
        },
        ExecCommand::Submit(Batch::paired(
            intent(TokenSide::Yes, Side::Buy, 0.47, 10.0, OrderType::Fak, StrategyId::Arbitrage),
            intent(TokenSide::No, Side::Buy, 0.50, 10.0, OrderType::Fak, StrategyId::Arbitrage),
            true,
        )),
    ])
    .await;

    assert_eq!(
        next_notice(&mut notices).await,
        StrategyNotice::Rejected {
            reason: RejectReason::StaleEdge
        }
    );
    assert_eq!(telemetry.names(), vec!["order_rejected"]);
}

#[tokio::test]
async fn test_submit_failure_is_not_retried() {
    let mut exchange = MockExchange::new();
    exchange.expect_get_midpoint().returning(|_| Ok(None));
    exchange
        .expect_submit_single()
        .times(1)
        .returning(|_| Err(anyhow::anyhow!("connection reset")));

    let cfg = config("");
    let mut eng = engine(&cfg, exchange, quiet_journal(), Arc::new(Recorder::default()), Arc::new(RiskGate::new()));
    let (notice_tx, mut notices) = mpsc::channel(4);
    eng.dispatch(vec![
        ExecCommand::Register {
            market: market(),
            notices: notice_tx,
        },
        ExecCommand::Submit(Batch::single(intent(
            TokenSide::Yes,
            Side::Buy,
            0.40,
            5.0,
            OrderType::Fak,
            StrategyId::LagExploit,
        ))),
    ])
    .await;

    assert_eq!(next_notice(&mut notices).await, StrategyNotice::SubmitFailed);
    assert_eq!(eng.ledger().snapshot().open_orders, 0);
}

#[tokio::test]
async fn test_same_market_singles_share_one_call() {
    let mut exchange = MockExchange::new();
    exchange.expect_get_midpoint().returning(|_| Ok(Some(0.45)));
    exchange.expect_submit_single().never();
    exchange.expect_submit_batch().times(1).returning(|orders| {
        assert_eq!(orders.len(), 2);
        Ok(orders
            .iter()
            .enumerate()
            .map(|(i, _)| OrderResult {
                order_id: format!("s{i}"),
                status: OrderStatus::Open,
                filled_size: 0.0,
                avg_price: 0.0,
            })
            .collect())
    });

    let cfg = config("");
    let mut eng = engine(&cfg, exchange, quiet_journal(), Arc::new(Recorder::default()), Arc::new(RiskGate::new()));
    eng.dispatch(vec![
        ExecCommand::Submit(Batch::single(intent(
            TokenSide::Yes,
            Side::Buy,
            0.44,
            5.0,
            OrderType::Gtc,
            StrategyId::Momentum,
        ))),
        ExecCommand::Submit(Batch::single(intent(
            TokenSide::No,
            Side::Buy,
            0.46,
            5.0,
            OrderType::Gtc,
            StrategyId::LagExploit,
        ))),
    ])
    .await;

    assert_eq!(eng.ledger().live_orders("btc-15m").len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_retries_with_backoff_then_gives_up() {
    let mut exchange = MockExchange::new();
    exchange.expect_get_midpoint().returning(|_| Ok(None));
    exchange.expect_submit_single().returning(|_| {
        Ok(OrderResult {
            order_id: "rest".into(),
            status: OrderStatus::Open,
            filled_size: 0.0,
            avg_price: 0.0,
        })
    });
    exchange
        .expect_cancel_all()
        .times(3)
        .returning(|_| Err(anyhow::anyhow!("503")));

    let cfg = config("");
    let mut eng = engine(&cfg, exchange, quiet_journal(), Arc::new(Recorder::default()), Arc::new(RiskGate::new()));
    eng.dispatch(vec![ExecCommand::Submit(Batch::single(intent(
        TokenSide::Yes,
        Side::Buy,
        0.30,
        10.0,
        OrderType::PostOnly,
        StrategyId::MarketMaker,
    )))])
    .await;

    let start = tokio::time::Instant::now();
    eng.dispatch(vec![ExecCommand::CancelMarket("btc-15m".into())]).await;
    // 100ms + 200ms of backoff between the three attempts.
    assert!(start.elapsed() >= Duration::from_millis(300));
    // Gave up: the order is still considered live.
    assert_eq!(eng.ledger().live_orders("btc-15m"), vec!["rest".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_requote_is_dropped_when_stale_quotes_cannot_be_cancelled() {
    let mut exchange = MockExchange::new();
    exchange.expect_get_midpoint().returning(|_| Ok(None));
    // Only the original quote is ever posted.
    exchange.expect_submit_single().times(1).returning(|_| {
        Ok(OrderResult {
            order_id: "old".into(),
            status: OrderStatus::Open,
            filled_size: 0.0,
            avg_price: 0.0,
        })
    });
    exchange.expect_submit_batch().never();
    exchange
        .expect_cancel_all()
        .times(3)
        .returning(|_| Err(anyhow::anyhow!("503")));

    let cfg = config("");
    let mut eng = engine(&cfg, exchange, quiet_journal(), Arc::new(Recorder::default()), Arc::new(RiskGate::new()));
    let (notice_tx, mut notices) = mpsc::channel(8);
    eng.dispatch(vec![
        ExecCommand::Register {
            market: market(),
            notices: notice_tx,
        },
        ExecCommand::Submit(Batch::single(intent(
            TokenSide::Yes,
            Side::Buy,
            0.30,
            10.0,
            OrderType::PostOnly,
            StrategyId::MarketMaker,
        ))),
    ])
    .await;
    assert!(matches!(next_notice(&mut notices).await, StrategyNotice::Submitted { .. }));

    eng.dispatch(vec![ExecCommand::Submit(Batch::requote(
        "btc-15m".into(),
        StrategyId::MarketMaker,
        vec![
            intent(TokenSide::Yes, Side::Buy, 0.32, 10.0, OrderType::PostOnly, StrategyId::MarketMaker),
            intent(TokenSide::No, Side::Buy, 0.60, 10.0, OrderType::PostOnly, StrategyId::MarketMaker),
        ],
    ))])
    .await;

    assert_eq!(next_notice(&mut notices).await, StrategyNotice::Dropped);
    assert_eq!(eng.ledger().live_orders("btc-15m"), vec!["old".to_string()]);
}

#[tokio::test]
async fn test_watchdog_kill_switch_cancels_and_blocks() {
    let cfg = config("[risk]\nmax_exposure_pct = 0.5\n");
    let gate = Arc::new(RiskGate::new());
    let telemetry = Arc::new(Recorder::default());

    let snapshot = LedgerSnapshot {
        starting_capital: 100.0,
        capital: 100.0,
        exposure: 50.5,
        ..LedgerSnapshot::default()
    };
    let (_ledger_tx, ledger_rx) = watch::channel(snapshot);
    let (exec, mut commands) = ExecHandle::channel(4);
    let watchdog = RiskWatchdog::new(
        cfg.risk.clone(),
        Arc::clone(&gate),
        ledger_rx,
        exec,
        Arc::clone(&telemetry) as Arc<dyn TelemetrySink>,
    );

    let report = watchdog.check(now_ms()).await;
    assert!(report.killed);
    assert!(gate.is_killed());
    assert_eq!(telemetry.names(), vec!["risk_breach", "kill_switch_triggered"]);

    // Second pass does not re-fire.
    assert!(!watchdog.check(now_ms()).await.killed);

    let cmd = commands.try_recv().unwrap();
    assert!(matches!(cmd, ExecCommand::KillSwitch));

    // The engine refuses new work while the switch is latched.
    let mut exchange = MockExchange::new();
    exchange.expect_submit_single().never();
    exchange.expect_get_midpoint().never();
    let mut eng = engine(&cfg, exchange, quiet_journal(), Arc::clone(&telemetry), Arc::clone(&gate));
    let (notice_tx, mut notices) = mpsc::channel(4);
    eng.dispatch(vec![
        ExecCommand::Register {
            market: market(),
            notices: notice_tx,
        },
        cmd,
        ExecCommand::Submit(Batch::single(intent(
            TokenSide::Yes,
            Side::Buy,
            0.40,
            5.0,
            OrderType::Fak,
            StrategyId::Momentum,
        ))),
    ])
    .await;
    assert_eq!(
        next_notice(&mut notices).await,
        StrategyNotice::Rejected {
            reason: RejectReason::KillSwitch
        }
    );
}

#[tokio::test]
async fn test_resolution_settles_streamed_position_and_journals() {
    let (fill_tx, fill_rx) = broadcast::channel(16);
    let mut exchange = MockExchange::new();
    exchange.expect_subscribe_fills().return_once(move || fill_stream(fill_rx));
    exchange.expect_get_midpoint().returning(|_| Ok(None));
    exchange.expect_submit_single().times(1).returning(|o| {
        Ok(OrderResult {
            order_id: "b1".into(),
            status: OrderStatus::Filled,
            filled_size: o.intent.size(),
            avg_price: o.intent.price(),
        })
    });
    exchange.expect_cancel_all().returning(|_| Ok(0));

    let entries = Arc::new(Mutex::new(Vec::new()));
    let mut journal = MockJournal::new();
    let seen = Arc::clone(&entries);
    journal.expect_append().returning(move |e| {
        seen.lock().unwrap().push(e.clone());
        Ok(())
    });

    let cfg = config("");
    let gate = Arc::new(RiskGate::new());
    let eng = engine(&cfg, exchange, journal, Arc::new(Recorder::default()), Arc::clone(&gate));
    let mut ledger = eng.subscribe();
    let (exec, commands) = ExecHandle::channel(16);
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let task = tokio::spawn(eng.run(commands, shutdown_rx));

    let (notice_tx, mut notices) = mpsc::channel(16);
    exec.register(market(), notice_tx).await.unwrap();
    exec.submit(Batch::single(intent(
        TokenSide::Yes,
        Side::Buy,
        0.40,
        10.0,
        OrderType::Fak,
        StrategyId::LagExploit,
    )))
    .await
    .unwrap();
    assert!(matches!(next_notice(&mut notices).await, StrategyNotice::Submitted { .. }));

    fill_tx
        .send(Fill {
            order_id: "b1".into(),
            token_id: "yes".into(),
            side: Side::Buy,
            price: 0.40,
            size: 10.0,
            ts_ms: now_ms(),
        })
        .unwrap();
    assert!(matches!(next_notice(&mut notices).await, StrategyNotice::Filled { .. }));

    exec.resolve("btc-15m".into(), TokenSide::Yes, now_ms()).await.unwrap();
    tokio::time::timeout(Duration::from_secs(2), ledger.wait_for(|s| s.daily_pnl > 0.0))
        .await
        .expect("settlement timed out")
        .unwrap();

    let snap = ledger.borrow().clone();
    // 10 shares bought at 0.40 pay out $10.
    assert!((snap.daily_pnl - 6.0).abs() < 1e-9);
    assert!((snap.capital - 106.0).abs() < 1e-9);
    assert_eq!(gate.consecutive_losses(), 0);

    let entries = entries.lock().unwrap().clone();
    assert_eq!(entries.len(), 2);
    assert!(matches!(entries[0], JournalEntry::Fill { .. }));
    assert!(matches!(
        entries[1],
        JournalEntry::Settlement {
            winner: TokenSide::Yes,
            ..
        }
    ));

    shutdown_tx.send(()).unwrap();
    task.await.unwrap();
}

#[test]
fn test_full_queue_applies_back_pressure() {
    use tokio_test::{assert_pending, assert_ready_ok, task};

    let (exec, mut rx) = ExecHandle::channel(1);
    let mut first = task::spawn(exec.reset_daily());
    assert_ready_ok!(first.poll());

    // Queue is full: the next send waits instead of dropping.
    let mut second = task::spawn(exec.reset_daily());
    assert_pending!(second.poll());

    assert!(matches!(rx.try_recv(), Ok(ExecCommand::ResetDaily)));
    assert!(second.is_woken());
    assert_ready_ok!(second.poll());
}
