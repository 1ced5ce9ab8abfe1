//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, validating all parameters,
//! and providing clear error messages for misconfiguration.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use super::AppConfig;

/// Load and validate configuration from a TOML file.
///
/// # Errors
/// Returns detailed error if:
/// - File doesn't exist or can't be read
/// - TOML parsing fails
/// - Validation rules are violated
pub fn load_config(path: &str) -> Result<AppConfig> {
  let path = Path::new(path);

  let content = std::fs::read_to_string(path)
    .with_context(|| format!("Failed to read config file: {}", path.display()))?;

  let config = parse_config(&content)?;

  info!(
    mode = ?config.bot.mode,
    capital = config.bot.starting_capital,
    max_exposure = config.risk.max_exposure_pct,
    "Configuration loaded successfully"
  );

  Ok(config)
}

/// Parse and validate configuration from TOML text.
///
/// # Errors
/// Parse failures and validation violations.
pub fn parse_config(content: &str) -> Result<AppConfig> {
  let config: AppConfig =
    toml::from_str(content).with_context(|| "Failed to parse config.toml")?;
  validate_config(&config)?;
  Ok(config)
}

fn in_unit(x: f64) -> bool {
  x > 0.0 && x <= 1.0
}

/// Validate all configuration parameters.
///
/// # Errors
/// The first violated rule, with the offending value.
pub fn validate_config(config: &AppConfig) -> Result<()> {
  anyhow::ensure!(
    config.bot.starting_capital > 0.0,
    "starting_capital must be positive, got {}",
    config.bot.starting_capital
  );

  // Signals
  let s = &config.signals;
  anyhow::ensure!(
    (s.bias_weights.total() - 1.0).abs() < 1e-6,
    "bias weights must sum to 1.0, got {}",
    s.bias_weights.total()
  );
  anyhow::ensure!(
    s.bias_threshold > 0.0 && s.bias_threshold < 1.0,
    "bias_threshold must be in (0, 1), got {}",
    s.bias_threshold
  );
  anyhow::ensure!(
    s.annual_vol.iter().all(|v| *v > 0.0),
    "annual_vol entries must be positive"
  );
  for (name, table) in [
    ("btc", &s.atr_thresholds.btc),
    ("eth", &s.atr_thresholds.eth),
    ("sol", &s.atr_thresholds.sol),
    ("xrp", &s.atr_thresholds.xrp),
  ] {
    anyhow::ensure!(
      table.windows(2).all(|w| w[0] < w[1]),
      "atr_thresholds.{name} must be strictly increasing"
    );
  }
  anyhow::ensure!(s.atr_periods > 0, "atr_periods must be positive");
  anyhow::ensure!(
    s.fill_probability.iter().all(|p| in_unit(*p)),
    "fill_probability entries must be in (0, 1]"
  );
  anyhow::ensure!(
    s.compression_lookback >= s.bb_period && s.bb_period > 1,
    "compression_lookback must be >= bb_period > 1"
  );

  // Strategies
  let st = &config.strategy;
  anyhow::ensure!(
    st.straddle.max_combined > 0.0 && st.straddle.max_combined < 1.0,
    "straddle.max_combined must be in (0, 1), got {}",
    st.straddle.max_combined
  );
  anyhow::ensure!(
    in_unit(st.straddle.max_capital_pct),
    "straddle.max_capital_pct must be in (0, 1]"
  );
  anyhow::ensure!(
    in_unit(st.straddle.min_fill_ratio),
    "straddle.min_fill_ratio must be in (0, 1]"
  );
  anyhow::ensure!(
    in_unit(st.lag_exploit.kelly_fraction),
    "lag_exploit.kelly_fraction must be in (0, 1]"
  );
  anyhow::ensure!(
    st.lag_exploit.max_win_prob > 0.5 && st.lag_exploit.max_win_prob < 1.0,
    "lag_exploit.max_win_prob must be in (0.5, 1)"
  );
  anyhow::ensure!(
    st.market_maker.half_spread.iter().all(|h| *h >= 0.0 && *h < 0.5),
    "market_maker.half_spread entries must be in [0, 0.5)"
  );

  // Orchestrator
  let o = &config.orchestrator;
  anyhow::ensure!(!o.priority.is_empty(), "orchestrator.priority must not be empty");
  anyhow::ensure!(
    o.capital_tiers.windows(2).all(|w| w[0].below < w[1].below
      && w[0].fraction >= w[1].fraction),
    "capital_tiers must ascend in `below` with non-increasing fractions"
  );
  anyhow::ensure!(
    o.capital_tiers.iter().all(|t| in_unit(t.fraction)) && in_unit(o.top_tier_fraction),
    "capital tier fractions must be in (0, 1]"
  );
  anyhow::ensure!(
    o.allocations.iter().all(|a| in_unit(a.share)) && in_unit(o.default_allocation),
    "allocation shares must be in (0, 1]"
  );
  let allocated: f64 = o.allocations.iter().map(|a| a.share).sum();
  anyhow::ensure!(
    o.allocations.is_empty() || (allocated - 1.0).abs() < 0.01,
    "orchestrator.allocations must sum to 1.0, got {allocated}"
  );

  // Risk
  let r = &config.risk;
  anyhow::ensure!(
    in_unit(r.max_exposure_pct),
    "max_exposure_pct must be in (0, 1], got {}",
    r.max_exposure_pct
  );
  anyhow::ensure!(
    in_unit(r.max_daily_loss_pct),
    "max_daily_loss_pct must be in (0, 1], got {}",
    r.max_daily_loss_pct
  );
  anyhow::ensure!(
    in_unit(r.loss_streak_size_mult),
    "loss_streak_size_mult must be in (0, 1]"
  );
  anyhow::ensure!(r.check_interval_ms > 0, "check_interval_ms must be positive");
  anyhow::ensure!(
    r.max_price_deviation > 0.0 && r.max_price_deviation < 1.0,
    "max_price_deviation must be in (0, 1)"
  );

  // Execution / API
  anyhow::ensure!(
    config.execution.queue_capacity > 0 && config.feeds.channel_capacity > 0,
    "queue capacities must be positive"
  );
  anyhow::ensure!(
    config.execution.cancel_max_attempts > 0,
    "cancel_max_attempts must be positive"
  );
  anyhow::ensure!(
    !config.api.clob_url.is_empty(),
    "CLOB API URL must not be empty"
  );
  anyhow::ensure!(
    config.api.max_requests_per_second > 0,
    "max_requests_per_second must be positive"
  );

  Ok(())
}
