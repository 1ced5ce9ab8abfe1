//! Configuration Module - TOML-based Engine Configuration
//!
//! Loads and validates configuration from `config.toml`.
//! Every threshold, weight and per-regime table used by the signal
//! engine, strategies and risk manager is externalized here so it can
//! be tuned and tested without touching the logic.

pub mod loader;

use serde::Deserialize;

use crate::domain::market::{Asset, DurationClass};
use crate::domain::order::StrategyId;
use crate::domain::signal::VolRegime;

/// Top-level engine configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
  /// Engine identity and run mode.
  pub bot: BotConfig,
  /// Signal engine parameters.
  #[serde(default)]
  pub signals: SignalConfig,
  /// Per-strategy parameters.
  #[serde(default)]
  pub strategy: StrategyConfig,
  /// Orchestrator priority and capital tiers.
  #[serde(default)]
  pub orchestrator: OrchestratorConfig,
  /// Risk limits and watchdog cadence.
  #[serde(default)]
  pub risk: RiskConfig,
  /// Execution engine parameters.
  #[serde(default)]
  pub execution: ExecutionConfig,
  /// Exchange and signer endpoints.
  #[serde(default)]
  pub api: ApiConfig,
  /// Normalized feed input.
  #[serde(default)]
  pub feeds: FeedConfig,
  /// Metrics and health endpoints.
  #[serde(default)]
  pub metrics: MetricsConfig,
  /// Trade journal.
  #[serde(default)]
  pub persistence: PersistenceConfig,
}

/// Run mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BotMode {
  /// In-process simulated exchange.
  Paper,
  /// Real CLOB via HTTP.
  Live,
}

/// Engine identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
  /// Human-readable engine name.
  pub name: String,
  /// Log level (trace, debug, info, warn, error).
  #[serde(default = "default_log_level")]
  pub log_level: String,
  /// Paper or live.
  #[serde(default = "default_mode")]
  pub mode: BotMode,
  /// Capital at start of day (USDC).
  pub starting_capital: f64,
}

// ────────────────────────────────────────────
// Signals
// ────────────────────────────────────────────

/// Weights of the five bias inputs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BiasWeights {
  /// 1-minute spot momentum.
  pub momentum: f64,
  /// EMA(5)/EMA(20) crossover.
  pub trend: f64,
  /// Short-window order-flow delta.
  pub flow: f64,
  /// Funding-rate level.
  pub funding: f64,
  /// Liquidation imbalance.
  pub liquidation: f64,
}

impl Default for BiasWeights {
  fn default() -> Self {
    Self {
      momentum: 0.30,
      trend: 0.25,
      flow: 0.20,
      funding: 0.10,
      liquidation: 0.15,
    }
  }
}

impl BiasWeights {
  /// Sum of all weights.
  pub fn total(&self) -> f64 {
    self.momentum + self.trend + self.flow + self.funding + self.liquidation
  }
}

/// ATR thresholds separating DEAD|LOW|MEDIUM|HIGH|EXTREME, per asset.
///
/// Each entry is the upper bound (exclusive) of DEAD, LOW, MEDIUM, HIGH.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AtrThresholds {
  /// BTC thresholds in USD.
  pub btc: [f64; 4],
  /// ETH thresholds in USD.
  pub eth: [f64; 4],
  /// SOL thresholds in USD.
  pub sol: [f64; 4],
  /// XRP thresholds in USD.
  pub xrp: [f64; 4],
}

impl Default for AtrThresholds {
  fn default() -> Self {
    Self {
      btc: [15.0, 50.0, 150.0, 300.0],
      eth: [1.0, 3.0, 10.0, 20.0],
      sol: [0.05, 0.15, 0.5, 1.0],
      xrp: [0.001, 0.003, 0.008, 0.015],
    }
  }
}

impl AtrThresholds {
  /// Table for one asset.
  pub const fn for_asset(&self, asset: Asset) -> &[f64; 4] {
    match asset {
      Asset::BTC => &self.btc,
      Asset::ETH => &self.eth,
      Asset::SOL => &self.sol,
      Asset::XRP => &self.xrp,
    }
  }
}

/// Signal engine configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
  /// Bias input weights.
  pub bias_weights: BiasWeights,
  /// |score| above which a bias is declared.
  pub bias_threshold: f64,
  /// Annualized volatility per asset, indexed BTC, ETH, SOL, XRP.
  pub annual_vol: [f64; 4],
  /// Per-asset regime thresholds.
  pub atr_thresholds: AtrThresholds,
  /// Number of 1-minute bars averaged into the ATR.
  pub atr_periods: usize,
  /// Minimum arb edge.
  pub arb_min_edge: f64,
  /// Minimum arb expected profit (USD).
  pub arb_min_profit: f64,
  /// Price points above the best ask counted as arb depth.
  pub arb_depth_tolerance: f64,
  /// Fill probability per regime, DEAD..EXTREME.
  pub fill_probability: [f64; 5],
  /// Token-price samples kept for momentum.
  pub momentum_history: usize,
  /// Exhaustion: current below this share of the trailing peak.
  pub exhaustion_ratio: f64,
  /// Exhaustion: peak must have exceeded this.
  pub exhaustion_min_peak: f64,
  /// Exhaustion: composite samples needed before it can be flagged.
  pub exhaustion_min_samples: usize,
  /// Bollinger period in 1-minute closes.
  pub bb_period: usize,
  /// Band-width samples in the percentile lookback.
  pub compression_lookback: usize,
  /// Percentile below which width counts as compressed.
  pub compression_percentile: f64,
  /// Width jump ratio that flags a breakout.
  pub breakout_ratio: f64,
  /// Order-flow window (seconds).
  pub flow_window_secs: u64,
  /// Short window for the adverse-flow imbalance ratio (seconds).
  pub adverse_flow_window_secs: u64,
  /// Liquidation window (seconds).
  pub liquidation_window_secs: u64,
  /// Net liquidation notional mapping to a full-scale bias input.
  pub liquidation_norm: f64,
  /// Liquidation notional in the window that counts as a cascade.
  pub cascade_notional: f64,
  /// Funding rate at which the input turns contrarian.
  pub funding_extreme: f64,
  /// Spot silence after which an asset is stale (ms).
  pub stale_after_ms: u64,
}

impl Default for SignalConfig {
  fn default() -> Self {
    Self {
      bias_weights: BiasWeights::default(),
      bias_threshold: 0.35,
      annual_vol: [0.55, 0.70, 0.95, 0.85],
      atr_thresholds: AtrThresholds::default(),
      atr_periods: 14,
      arb_min_edge: 0.02,
      arb_min_profit: 0.10,
      arb_depth_tolerance: 0.02,
      fill_probability: [0.95, 0.90, 0.80, 0.65, 0.50],
      momentum_history: 120,
      exhaustion_ratio: 0.4,
      exhaustion_min_peak: 0.005,
      exhaustion_min_samples: 5,
      bb_period: 20,
      compression_lookback: 100,
      compression_percentile: 10.0,
      breakout_ratio: 1.5,
      flow_window_secs: 30,
      adverse_flow_window_secs: 5,
      liquidation_window_secs: 60,
      liquidation_norm: 5_000_000.0,
      cascade_notional: 1_000_000.0,
      funding_extreme: 0.0005,
      stale_after_ms: 5_000,
    }
  }
}

impl SignalConfig {
  /// Annualized volatility for an asset.
  pub const fn annual_vol_for(&self, asset: Asset) -> f64 {
    self.annual_vol[asset.index()]
  }

  /// Fill probability for a regime.
  pub const fn fill_probability_for(&self, regime: VolRegime) -> f64 {
    self.fill_probability[regime.index()]
  }
}

// ────────────────────────────────────────────
// Strategies
// ────────────────────────────────────────────

/// How the Phase-2 pullback watcher tracks its minimum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PullbackMinMode {
  /// Running minimum since the wait started.
  Continuous,
  /// Minimum restarts from the current price after each evaluation
  /// that did not rebound.
  PerEvaluation,
}

/// Straddle+Bias parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StraddleConfig {
  /// Strategy enabled.
  pub enabled: bool,
  /// Enter only if YES+NO asks sum below this.
  pub max_combined: f64,
  /// Straddle size ceiling as a share of capital.
  pub max_capital_pct: f64,
  /// Price points above best ask counted as leg depth.
  pub depth_tolerance: f64,
  /// Leg fill ratio below which the imbalance handler runs.
  pub min_fill_ratio: f64,
  /// Minimum bias confidence for Phase 2.
  pub bias_min_confidence: f64,
  /// Phase-2 add ceiling as a share of capital.
  pub bias_max_capital_pct: f64,
  /// Phase-2 add ceiling as a multiple of the locked straddle profit.
  pub profit_multiple: f64,
  /// Price points above best ask counted as Phase-2 depth.
  pub add_depth_tolerance: f64,
  /// Longest wait for a pullback (seconds).
  pub pullback_window_secs: u64,
  /// Required drop below the entry level.
  pub pullback_drop: f64,
  /// Required rebound off the minimum.
  pub pullback_rebound: f64,
  /// Minimum tracking mode.
  pub pullback_min_mode: PullbackMinMode,
}

impl Default for StraddleConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      max_combined: 0.97,
      max_capital_pct: 0.25,
      depth_tolerance: 0.02,
      min_fill_ratio: 0.80,
      bias_min_confidence: 0.35,
      bias_max_capital_pct: 0.15,
      profit_multiple: 3.0,
      add_depth_tolerance: 0.01,
      pullback_window_secs: 30,
      pullback_drop: 0.01,
      pullback_rebound: 0.01,
      pullback_min_mode: PullbackMinMode::Continuous,
    }
  }
}

/// Pure arbitrage parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArbitrageConfig {
  /// Strategy enabled.
  pub enabled: bool,
  /// Ceiling on pair cost as a share of the strategy budget.
  pub max_capital_pct: f64,
}

impl Default for ArbitrageConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      max_capital_pct: 0.50,
    }
  }
}

/// Lag exploit parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LagExploitConfig {
  /// Strategy enabled.
  pub enabled: bool,
  /// Minimum fair-minus-ask mispricing.
  pub min_edge: f64,
  /// Kelly multiplier.
  pub kelly_fraction: f64,
  /// Ceiling on the assumed win probability.
  pub max_win_prob: f64,
  /// Win probability added per unit of edge.
  pub edge_scale: f64,
  /// In HIGH regime, suppressed below this many seconds left.
  pub high_vol_min_secs: f64,
  /// Spread considered too wide near expiry.
  pub wide_spread: f64,
  /// Wide-spread suppression applies below this many seconds left.
  pub wide_spread_min_secs: f64,
}

impl Default for LagExploitConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      min_edge: 0.03,
      kelly_fraction: 0.25,
      max_win_prob: 0.80,
      edge_scale: 2.0,
      high_vol_min_secs: 60.0,
      wide_spread: 0.10,
      wide_spread_min_secs: 120.0,
    }
  }
}

/// Market maker parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MarketMakerConfig {
  /// Strategy enabled.
  pub enabled: bool,
  /// Half-spread per regime, DEAD..EXTREME. Zero withdraws quotes.
  pub half_spread: [f64; 5],
  /// Size multiplier per regime, DEAD..EXTREME.
  pub size_mult: [f64; 5],
  /// Base quote notional as a share of capital.
  pub base_size_pct: f64,
  /// No quoting below this many seconds left.
  pub min_secs_remaining: f64,
  /// Spread widening starts below this many seconds left.
  pub widen_below_secs: f64,
  /// Extra widening at expiry (0.5 means up to 1.5×).
  pub max_time_widen: f64,
  /// Inventory (as share of capital) that maps to one skew unit.
  pub skew_inventory_pct: f64,
  /// Price skew per unit of inventory.
  pub skew_per_unit: f64,
  /// Absolute skew ceiling.
  pub skew_cap: f64,
  /// Do not quote inside books tighter than this.
  pub min_book_spread: f64,
  /// Pull quotes when the 1s spot move exceeds this fraction.
  pub pull_move_1s: f64,
  /// Widen when |flow imbalance| exceeds this.
  pub widen_flow_imbalance: f64,
  /// Same-side fills in a row that force widen-and-skew.
  pub same_side_fill_run: u32,
  /// Minimum interval between re-quotes (ms).
  pub requote_interval_ms: u64,
}

impl Default for MarketMakerConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      half_spread: [0.015, 0.02, 0.03, 0.05, 0.0],
      size_mult: [2.0, 1.5, 1.0, 0.3, 0.0],
      base_size_pct: 0.10,
      min_secs_remaining: 30.0,
      widen_below_secs: 120.0,
      max_time_widen: 0.5,
      skew_inventory_pct: 0.5,
      skew_per_unit: 0.02,
      skew_cap: 0.03,
      min_book_spread: 0.01,
      pull_move_1s: 0.0002,
      widen_flow_imbalance: 3.0,
      same_side_fill_run: 3,
      requote_interval_ms: 1_000,
    }
  }
}

/// Momentum capture parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MomentumConfig {
  /// Strategy enabled.
  pub enabled: bool,
  /// Minimum |composite momentum|.
  pub min_composite: f64,
  /// Minimum |divergence| from fair value.
  pub min_divergence: f64,
  /// Base entry notional as a share of capital.
  pub base_pct: f64,
  /// Divergence giving a 1× multiplier.
  pub divergence_unit: f64,
  /// Divergence multiplier ceiling.
  pub divergence_cap: f64,
  /// Momentum giving a 1× multiplier.
  pub momentum_unit: f64,
  /// Momentum multiplier ceiling.
  pub momentum_cap: f64,
  /// Hold to resolution below this many seconds left.
  pub hold_below_secs: f64,
  /// Smallest entry notional (USD).
  pub min_notional: f64,
}

impl Default for MomentumConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      min_composite: 0.003,
      min_divergence: 0.02,
      base_pct: 0.10,
      divergence_unit: 0.05,
      divergence_cap: 2.0,
      momentum_unit: 0.005,
      momentum_cap: 1.5,
      hold_below_secs: 45.0,
      min_notional: 0.50,
    }
  }
}

/// Imbalance handler parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImbalanceConfig {
  /// Residual notional below which no corrective order is sent.
  pub min_imbalance_usd: f64,
  /// Bias confidence above which an aligned excess is held.
  pub hold_min_confidence: f64,
}

impl Default for ImbalanceConfig {
  fn default() -> Self {
    Self {
      min_imbalance_usd: 0.50,
      hold_min_confidence: 0.40,
    }
  }
}

/// All strategy parameters.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
  /// Straddle+Bias.
  pub straddle: StraddleConfig,
  /// Pure arbitrage.
  pub arbitrage: ArbitrageConfig,
  /// Lag exploit.
  pub lag_exploit: LagExploitConfig,
  /// Market maker.
  pub market_maker: MarketMakerConfig,
  /// Momentum capture.
  pub momentum: MomentumConfig,
  /// Imbalance handler.
  pub imbalance: ImbalanceConfig,
}

// ────────────────────────────────────────────
// Orchestrator
// ────────────────────────────────────────────

/// One row of the capital tier table.
#[derive(Debug, Clone, Deserialize)]
pub struct CapitalTier {
  /// Applies while available capital is below this (USD).
  pub below: f64,
  /// Share of capital one strategy may commit per market.
  pub fraction: f64,
  /// Strategies not run at this tier.
  #[serde(default)]
  pub excluded: Vec<StrategyId>,
}

/// Capital share reserved for one kind of market.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketAllocation {
  /// Underlying asset.
  pub asset: Asset,
  /// Window length.
  pub duration: DurationClass,
  /// Share of capital markets of this kind may use.
  pub share: f64,
}

impl MarketAllocation {
  const fn new(asset: Asset, duration: DurationClass, share: f64) -> Self {
    Self { asset, duration, share }
  }
}

/// Orchestrator configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
  /// Conflict-resolution order, highest first.
  pub priority: Vec<StrategyId>,
  /// Tier rows in ascending `below` order.
  pub capital_tiers: Vec<CapitalTier>,
  /// Fraction used above the last tier.
  pub top_tier_fraction: f64,
  /// Per-regime position cap as a share of capital, DEAD..EXTREME.
  pub regime_position_cap: [f64; 5],
  /// Capital share per asset and window length.
  pub allocations: Vec<MarketAllocation>,
  /// Share for markets missing from `allocations`.
  pub default_allocation: f64,
}

impl Default for OrchestratorConfig {
  fn default() -> Self {
    Self {
      priority: StrategyId::ALL.to_vec(),
      capital_tiers: vec![
        CapitalTier {
          below: 50.0,
          fraction: 1.00,
          excluded: vec![StrategyId::MarketMaker],
        },
        CapitalTier {
          below: 500.0,
          fraction: 0.50,
          excluded: Vec::new(),
        },
        CapitalTier {
          below: 5_000.0,
          fraction: 0.25,
          excluded: Vec::new(),
        },
      ],
      top_tier_fraction: 0.10,
      regime_position_cap: [0.30, 0.25, 0.20, 0.15, 0.10],
      allocations: vec![
        MarketAllocation::new(Asset::BTC, DurationClass::FiveMin, 0.40),
        MarketAllocation::new(Asset::BTC, DurationClass::FifteenMin, 0.20),
        MarketAllocation::new(Asset::ETH, DurationClass::FifteenMin, 0.20),
        MarketAllocation::new(Asset::SOL, DurationClass::FifteenMin, 0.10),
        MarketAllocation::new(Asset::XRP, DurationClass::FifteenMin, 0.10),
      ],
      default_allocation: 0.05,
    }
  }
}

// ────────────────────────────────────────────
// Risk / execution / infrastructure
// ────────────────────────────────────────────

/// Risk management configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
  /// Exposure ceiling as a share of capital.
  pub max_exposure_pct: f64,
  /// Daily loss limit as a share of starting capital.
  pub max_daily_loss_pct: f64,
  /// Per-market exposure ceiling as a share of capital.
  pub max_market_exposure_pct: f64,
  /// Consecutive losses that trigger size reduction.
  pub loss_streak_threshold: u32,
  /// Size multiplier while reduced.
  pub loss_streak_size_mult: f64,
  /// Trades the reduction stays in force.
  pub recovery_trades: u32,
  /// Cooldown after the daily-loss breach (seconds).
  pub pause_duration_secs: u64,
  /// Max |limit - mid| accepted by the price-sanity check.
  pub max_price_deviation: f64,
  /// Watchdog cadence (ms).
  pub check_interval_ms: u64,
  /// Auto-clear the kill switch after this many seconds; 0 = operator only.
  pub kill_switch_clear_secs: u64,
}

impl Default for RiskConfig {
  fn default() -> Self {
    Self {
      max_exposure_pct: 0.50,
      max_daily_loss_pct: 0.10,
      max_market_exposure_pct: 0.25,
      loss_streak_threshold: 5,
      loss_streak_size_mult: 0.5,
      recovery_trades: 10,
      pause_duration_secs: 3_600,
      max_price_deviation: 0.15,
      check_interval_ms: 500,
      kill_switch_clear_secs: 0,
    }
  }
}

/// Execution engine configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
  /// Command queue capacity.
  pub queue_capacity: usize,
  /// Cancel attempts before giving up.
  pub cancel_max_attempts: u32,
  /// Base delay for cancel backoff (ms).
  pub cancel_base_delay_ms: u64,
  /// Time to wait for both legs of a pair to report fills (ms).
  pub pair_fill_timeout_ms: u64,
}

impl Default for ExecutionConfig {
  fn default() -> Self {
    Self {
      queue_capacity: 1_024,
      cancel_max_attempts: 3,
      cancel_base_delay_ms: 100,
      pair_fill_timeout_ms: 2_000,
    }
  }
}

/// Exchange and signer endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
  /// CLOB REST API base URL.
  pub clob_url: String,
  /// Signing sidecar base URL.
  pub signer_url: String,
  /// Request timeout in seconds.
  pub timeout_seconds: u64,
  /// Client-side request rate ceiling.
  pub max_requests_per_second: u32,
  /// Concurrent in-flight requests.
  pub max_concurrent: usize,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      clob_url: "https://clob.polymarket.com".to_string(),
      signer_url: "http://127.0.0.1:8787".to_string(),
      timeout_seconds: 5,
      max_requests_per_second: 10,
      max_concurrent: 8,
    }
  }
}

/// Normalized feed input.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
  /// JSONL event source: a file path, or "-" for stdin.
  pub source: String,
  /// Capacity of the never-drop event channel.
  pub channel_capacity: usize,
}

impl Default for FeedConfig {
  fn default() -> Self {
    Self {
      source: "-".to_string(),
      channel_capacity: 4_096,
    }
  }
}

/// Metrics and monitoring configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
  /// Enable Prometheus metrics export.
  pub enabled: bool,
  /// Metrics server bind address.
  pub bind_address: String,
  /// Health check endpoint port.
  pub health_port: u16,
}

impl Default for MetricsConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      bind_address: "0.0.0.0:9090".to_string(),
      health_port: 8080,
    }
  }
}

/// Persistence configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
  /// Directory for JSONL journals.
  pub data_dir: String,
}

impl Default for PersistenceConfig {
  fn default() -> Self {
    Self {
      data_dir: "data".to_string(),
    }
  }
}

// Default value functions for serde

fn default_log_level() -> String {
  "info".to_string()
}

const fn default_mode() -> BotMode {
  BotMode::Paper
}
