//! Volatility regime classifier.
//!
//! Maps the rolling 1-minute ATR of an asset onto five regimes using the
//! per-asset threshold table from config.

use crate::domain::signal::VolRegime;

/// Classify an ATR reading. `thresholds` holds the exclusive upper
/// bounds of DEAD, LOW, MEDIUM and HIGH.
pub fn classify_regime(atr: f64, thresholds: &[f64; 4]) -> VolRegime {
    const REGIMES: [VolRegime; 4] = [
        VolRegime::Dead,
        VolRegime::Low,
        VolRegime::Medium,
        VolRegime::High,
    ];
    thresholds
        .iter()
        .zip(REGIMES)
        .find(|(bound, _)| atr < **bound)
        .map_or(VolRegime::Extreme, |(_, regime)| regime)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AtrThresholds;
    use crate::domain::market::Asset;

    #[test]
    fn test_btc_table() {
        let t = AtrThresholds::default();
        let btc = t.for_asset(Asset::BTC);
        assert_eq!(classify_regime(10.0, btc), VolRegime::Dead);
        assert_eq!(classify_regime(15.0, btc), VolRegime::Low);
        assert_eq!(classify_regime(100.0, btc), VolRegime::Medium);
        assert_eq!(classify_regime(299.9, btc), VolRegime::High);
        assert_eq!(classify_regime(300.0, btc), VolRegime::Extreme);
    }

    #[test]
    fn test_tables_differ_by_asset() {
        let t = AtrThresholds::default();
        assert_eq!(classify_regime(2.0, t.for_asset(Asset::ETH)), VolRegime::Low);
        assert_eq!(classify_regime(2.0, t.for_asset(Asset::SOL)), VolRegime::Extreme);
        assert_eq!(classify_regime(0.0005, t.for_asset(Asset::XRP)), VolRegime::Dead);
    }
}
