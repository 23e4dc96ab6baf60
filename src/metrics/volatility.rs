//! Realized (historical) volatility from close-to-close log returns.

use statrs::statistics::Statistics;

use crate::api::Bar;

/// Trading days used to annualize daily volatility.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Default lookback window in trading days.
pub const DEFAULT_WINDOW: usize = 20;

/// Outcome of a volatility estimate.
///
/// Short histories are an expected result, not an error, and must stay
/// distinguishable from a computed volatility of zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HistoricalVol {
    /// Annualized volatility as a decimal fraction (0.25 = 25%)
    Annualized(f64),
    /// Fewer log returns than the requested window
    InsufficientData,
}

impl HistoricalVol {
    pub fn value(&self) -> Option<f64> {
        match self {
            HistoricalVol::Annualized(v) => Some(*v),
            HistoricalVol::InsufficientData => None,
        }
    }

    pub fn is_insufficient(&self) -> bool {
        matches!(self, HistoricalVol::InsufficientData)
    }
}

/// Estimator for annualized realized volatility.
pub struct VolatilityEstimator;

impl VolatilityEstimator {
    /// Estimate annualized volatility over the most recent `window` log returns.
    ///
    /// Missing points (`None`, NaN, infinite) are dropped before returns are
    /// formed. A zero or negative close has no log return, so it is treated
    /// as missing too. Uses the sample standard deviation (divisor
    /// `window - 1`) scaled by `sqrt(252)`.
    ///
    /// `InsufficientData` means only "too few returns". A numeric fault in
    /// the deviation comes back as a non-finite `Annualized` value, which the
    /// comparator classifies as degenerate.
    pub fn estimate(prices: &[Option<f64>], window: usize) -> HistoricalVol {
        let returns = Self::log_returns(prices);

        // A single return has no sample deviation.
        if window < 2 || returns.len() < window {
            return HistoricalVol::InsufficientData;
        }

        let recent = &returns[returns.len() - window..];
        let daily_std = recent.iter().std_dev();
        HistoricalVol::Annualized(daily_std * TRADING_DAYS_PER_YEAR.sqrt())
    }

    /// Estimate from the close column of a bar series.
    pub fn estimate_from_bars(bars: &[Bar], window: usize) -> HistoricalVol {
        let closes: Vec<Option<f64>> = bars.iter().map(|b| b.close).collect();
        Self::estimate(&closes, window)
    }

    /// `ln(p_i / p_{i-1})` over the usable prices, in order.
    pub fn log_returns(prices: &[Option<f64>]) -> Vec<f64> {
        let usable: Vec<f64> = prices
            .iter()
            .flatten()
            .copied()
            .filter(|p| p.is_finite() && *p > 0.0)
            .collect();

        usable.windows(2).map(|w| (w[1] / w[0]).ln()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(prices: &[f64]) -> Vec<Option<f64>> {
        prices.iter().copied().map(Some).collect()
    }

    #[test]
    fn test_insufficient_when_returns_below_window() {
        // 15 prices give 14 returns
        let prices = series(&(0..15).map(|i| 100.0 + i as f64).collect::<Vec<_>>());
        assert_eq!(
            VolatilityEstimator::estimate(&prices, 20),
            HistoricalVol::InsufficientData
        );

        // 21 prices give exactly 20 returns
        let prices = series(&(0..21).map(|i| 100.0 + (i % 3) as f64).collect::<Vec<_>>());
        assert!(!VolatilityEstimator::estimate(&prices, 20).is_insufficient());
    }

    #[test]
    fn test_constant_prices_have_zero_vol() {
        let prices = series(&[50.0; 30]);
        assert_eq!(
            VolatilityEstimator::estimate(&prices, 20),
            HistoricalVol::Annualized(0.0)
        );
    }

    #[test]
    fn test_matches_hand_computed_sample_std() {
        // Alternating +/- returns of equal size
        let up = 1.01_f64;
        let mut prices = vec![100.0];
        for i in 0..10 {
            let last = *prices.last().unwrap();
            prices.push(if i % 2 == 0 { last * up } else { last / up });
        }
        let hv = VolatilityEstimator::estimate(&series(&prices), 10)
            .value()
            .unwrap();

        let r = up.ln();
        // Mean is zero across 10 alternating returns, so var = 10 r^2 / 9
        let expected = (10.0 * r * r / 9.0).sqrt() * 252.0_f64.sqrt();
        assert!((hv - expected).abs() < 1e-12);
    }

    #[test]
    fn test_uses_most_recent_window_only() {
        // A wild early history followed by a flat tail
        let mut prices = vec![10.0, 40.0, 5.0, 80.0];
        prices.extend(std::iter::repeat(100.0).take(6));
        let hv = VolatilityEstimator::estimate(&series(&prices), 5);
        assert_eq!(hv, HistoricalVol::Annualized(0.0));
    }

    #[test]
    fn test_missing_points_are_dropped() {
        let prices = vec![
            Some(100.0),
            None,
            Some(f64::NAN),
            Some(101.0),
            Some(0.0),
            Some(-3.0),
            Some(f64::INFINITY),
            Some(102.0),
        ];
        let returns = VolatilityEstimator::log_returns(&prices);
        assert_eq!(returns.len(), 2);
        assert!(returns.iter().all(|r| r.is_finite()));
        assert!((returns[0] - (101.0_f64 / 100.0).ln()).abs() < 1e-15);
    }

    #[test]
    fn test_window_below_two_is_insufficient() {
        let prices = series(&[100.0, 101.0, 102.0]);
        assert!(VolatilityEstimator::estimate(&prices, 1).is_insufficient());
        assert!(VolatilityEstimator::estimate(&prices, 0).is_insufficient());
    }
}
