//! Polymarket Up/Down Engine - Entry Point
//!
//! Initializes configuration and logging, wires the adapters for the
//! selected mode, and runs the engine tasks until SIGINT.
//!
//! Wiring sequence:
//! 1. Load config.toml + validate
//! 2. Init tracing (JSON structured logging)
//! 3. Build telemetry sinks and the trade journal
//! 4. Build exchange + signer (paper: in-process, live: CLOB REST + sidecar)
//! 5. Spawn execution engine, risk watchdog, daily reset
//! 6. Spawn metrics + health servers
//! 7. Spawn the feed reader and the signal task
//! 8. Wait for SIGINT or feed end → shutdown (execution cancels all orders)

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{Days, Utc};
use tokio::signal;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use polymarket_updown_engine::adapters::api::{ClobAuth, ClobExchange, ClobHttp, RemoteSigner};
use polymarket_updown_engine::adapters::feeds::{ingress, pump_source};
use polymarket_updown_engine::adapters::metrics::{
    FanoutSink, HealthServer, HealthState, PrometheusSink, TracingSink,
};
use polymarket_updown_engine::adapters::paper::{PaperExchange, PaperSigner};
use polymarket_updown_engine::adapters::persistence::JsonlJournal;
use polymarket_updown_engine::config::{self, AppConfig, BotMode};
use polymarket_updown_engine::ports::{ExchangeClient, FeedObserver, OrderSigner, TelemetrySink};
use polymarket_updown_engine::signals::ArbScanner;
use polymarket_updown_engine::usecases::{
    EngineSinks, ExecHandle, ExecutionEngine, Ledger, RiskGate, RiskManager, RiskWatchdog,
    SignalTask, WorkerDeps,
};

/// Trade polling cadence in live mode.
const FILL_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Load configuration ───────────────────────────────
    let path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
    let config = config::loader::load_config(&path).context("Failed to load configuration")?;

    // ── 2. Initialize structured JSON logging ───────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.bot.log_level)),
        )
        .json()
        .init();

    info!(
        name = %config.bot.name,
        version = env!("CARGO_PKG_VERSION"),
        mode = ?config.bot.mode,
        capital = config.bot.starting_capital,
        "Starting up/down engine"
    );

    let config = Arc::new(config);
    let (shutdown_tx, _) = broadcast::channel::<()>(4);

    // ── 3. Telemetry + journal ──────────────────────────────
    let mut fanout = FanoutSink::new().with(Arc::new(TracingSink));
    let mut metrics_handle = None;
    if config.metrics.enabled {
        let prometheus = Arc::new(PrometheusSink::new().context("Failed to register metrics")?);
        fanout = fanout.with(Arc::clone(&prometheus) as Arc<dyn TelemetrySink>);
        let bind = config.metrics.bind_address.clone();
        let rx = shutdown_tx.subscribe();
        metrics_handle = Some(tokio::spawn(async move {
            if let Err(e) = prometheus.serve(bind, rx).await {
                error!(error = %e, "Metrics server failed");
            }
        }));
    }
    let telemetry: Arc<dyn TelemetrySink> = Arc::new(fanout);
    let journal = Arc::new(
        JsonlJournal::new(&config.persistence.data_dir)
            .await
            .context("Failed to open trade journal")?,
    );
    let sinks = EngineSinks {
        telemetry: Arc::clone(&telemetry),
        journal,
    };

    let gate = Arc::new(RiskGate::new());
    let health = Arc::new(HealthState::new(Arc::clone(&gate)));
    let health_handle = {
        let server = HealthServer::new(Arc::clone(&health), config.metrics.health_port);
        let rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) = server.run(rx).await {
                error!(error = %e, "Health server failed");
            }
        })
    };

    // ── 4-7. Mode-specific wiring, then the shared engine ───
    let mut feed_done = shutdown_tx.subscribe();
    let handles = match config.bot.mode {
        BotMode::Paper => {
            let exchange = Arc::new(PaperExchange::new());
            let signer = Arc::new(PaperSigner::new(config.bot.name.as_bytes().to_vec()));
            let observer = Arc::clone(&exchange);
            start_engine(&config, exchange, signer, sinks, &gate, &health, &shutdown_tx, |task| {
                task.with_observer(observer)
            })
        }
        BotMode::Live => {
            let auth = Arc::new(ClobAuth::from_env().context("Failed to load CLOB credentials from env")?);
            let http = Arc::new(ClobHttp::new(&config.api, Some(auth)).context("Failed to create CLOB client")?);
            let mut signer_api = config.api.clone();
            signer_api.clob_url.clone_from(&config.api.signer_url);
            let signer_http = Arc::new(ClobHttp::new(&signer_api, None).context("Failed to create signer client")?);

            let exchange = Arc::new(ClobExchange::new(http));
            let poller = exchange.spawn_fill_poller(FILL_POLL_INTERVAL, shutdown_tx.subscribe());
            let signer = Arc::new(RemoteSigner::new(signer_http));
            let mut handles = start_engine(&config, exchange, signer, sinks, &gate, &health, &shutdown_tx, |task| task);
            handles.push(poller);
            handles
        }
    };

    info!("All tasks spawned - engine is running");

    // ── 8. Wait for SIGINT or the end of the feed ───────────
    tokio::select! {
        _ = signal::ctrl_c() => info!("SIGINT received, initiating graceful shutdown"),
        _ = feed_done.recv() => info!("Shutdown requested"),
    }
    let _ = shutdown_tx.send(());
    health.engine_running.store(false, Ordering::Relaxed);

    for handle in handles {
        if tokio::time::timeout(Duration::from_secs(30), handle).await.is_err() {
            warn!("Task did not stop in time");
        }
    }
    if let Some(handle) = metrics_handle {
        handle.abort();
    }
    health_handle.abort();

    info!("Shutdown complete");
    Ok(())
}

/// Spawn execution, risk, daily reset, feed and signal tasks.
#[allow(clippy::too_many_arguments)]
fn start_engine<E: ExchangeClient, S: OrderSigner>(
    config: &Arc<AppConfig>,
    exchange: Arc<E>,
    signer: Arc<S>,
    sinks: EngineSinks,
    gate: &Arc<RiskGate>,
    health: &Arc<HealthState>,
    shutdown: &broadcast::Sender<()>,
    decorate: impl FnOnce(SignalTask) -> SignalTask,
) -> Vec<JoinHandle<()>> {
    let telemetry = Arc::clone(&sinks.telemetry);
    let (exec, commands) = ExecHandle::channel(config.execution.queue_capacity);
    let engine = ExecutionEngine::new(
        config.execution.clone(),
        exchange,
        signer,
        RiskManager::new(config.risk.clone(), Arc::clone(gate)),
        ArbScanner::new(&config.signals),
        Ledger::new(config.bot.starting_capital),
        sinks,
    );
    let ledger = engine.subscribe();

    let mut handles = Vec::new();
    let engine_health = Arc::clone(health);
    let rx = shutdown.subscribe();
    handles.push(tokio::spawn(async move {
        engine_health.engine_running.store(true, Ordering::Relaxed);
        engine.run(commands, rx).await;
        engine_health.engine_running.store(false, Ordering::Relaxed);
    }));

    let watchdog = RiskWatchdog::new(
        config.risk.clone(),
        Arc::clone(gate),
        ledger.clone(),
        exec.clone(),
        Arc::clone(&telemetry),
    );
    handles.push(tokio::spawn(watchdog.run(shutdown.subscribe())));
    handles.push(tokio::spawn(daily_reset(exec.clone(), shutdown.subscribe())));

    // Feed reader → ingress → signal task.
    let (feed_tx, feed_rx) = ingress(config.feeds.channel_capacity);
    let source = config.feeds.source.clone();
    let reader_shutdown = shutdown.subscribe();
    handles.push(tokio::spawn(async move {
        if let Err(e) = pump_source(&source, feed_tx, reader_shutdown).await {
            error!(error = %e, "Feed reader failed");
        }
    }));

    let task = SignalTask::new(WorkerDeps {
        config: Arc::clone(config),
        gate: Arc::clone(gate),
        exec,
        telemetry,
        ledger,
        shutdown: shutdown.clone(),
    })
    .with_observer(Arc::clone(health) as Arc<dyn FeedObserver>);
    let task = decorate(task);
    let stop = shutdown.clone();
    handles.push(tokio::spawn(async move {
        task.run(feed_rx).await;
        // Once the feed is drained the session is over.
        let _ = stop.send(());
    }));
    handles
}

/// Reset daily P&L at every UTC midnight.
async fn daily_reset(exec: ExecHandle, mut shutdown: broadcast::Receiver<()>) {
    loop {
        let now = Utc::now();
        let next = now
            .date_naive()
            .checked_add_days(Days::new(1))
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|d| d.and_utc());
        let wait = next
            .and_then(|n| (n - now).to_std().ok())
            .unwrap_or(Duration::from_secs(3_600));
        tokio::select! {
            _ = shutdown.recv() => break,
            () = tokio::time::sleep(wait) => {
                info!("UTC midnight, resetting daily P&L");
                if let Err(e) = exec.reset_daily().await {
                    warn!(error = %e, "Daily reset not queued");
                    break;
                }
            }
        }
    }
}
