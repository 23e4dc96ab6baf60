//! Implied vs. historical volatility classification.

use std::fmt;

use serde::Serialize;

use super::volatility::HistoricalVol;
use crate::error::{JournalError, JournalResult};

/// Relative IV/HV spread, in percent, beyond which options count as rich or cheap.
pub const FAIR_BAND_PCT: f64 = 20.0;

/// Precision applied to the spread before thresholds are checked, so that
/// binary float noise cannot push an exact boundary value across it.
const DIFF_PRECISION: f64 = 1e9;

/// How implied volatility prices options relative to realized volatility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Pricing {
    InsufficientData,
    Degenerate,
    Expensive,
    Cheap,
    FairlyPriced,
}

impl Pricing {
    pub fn as_str(&self) -> &'static str {
        match self {
            Pricing::InsufficientData => "insufficient-data",
            Pricing::Degenerate => "degenerate",
            Pricing::Expensive => "expensive",
            Pricing::Cheap => "cheap",
            Pricing::FairlyPriced => "fairly-priced",
        }
    }
}

impl fmt::Display for Pricing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification together with the numbers it was derived from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolComparison {
    pub iv: f64,
    pub hv: HistoricalVol,
    /// `(iv - hv) / hv * 100`, when hv is positive
    pub diff_percent: Option<f64>,
    pub pricing: Pricing,
}

/// Comparator for implied vs. realized volatility.
pub struct VolatilityComparator;

impl VolatilityComparator {
    /// Classify `iv` against `hv`. Both are decimal fractions.
    ///
    /// The band is inclusive: a spread of exactly +/-20% is fairly priced.
    /// An HV that is zero, negative or non-finite is `Degenerate`, never a
    /// spread.
    pub fn compare(iv: f64, hv: HistoricalVol) -> VolComparison {
        let hv_value = match hv {
            HistoricalVol::InsufficientData => {
                return VolComparison {
                    iv,
                    hv,
                    diff_percent: None,
                    pricing: Pricing::InsufficientData,
                }
            }
            HistoricalVol::Annualized(v) => v,
        };

        if !hv_value.is_finite() || hv_value <= 0.0 {
            return VolComparison {
                iv,
                hv,
                diff_percent: None,
                pricing: Pricing::Degenerate,
            };
        }

        let raw = (iv - hv_value) / hv_value * 100.0;
        let diff = (raw * DIFF_PRECISION).round() / DIFF_PRECISION;

        let pricing = if diff > FAIR_BAND_PCT {
            Pricing::Expensive
        } else if diff < -FAIR_BAND_PCT {
            Pricing::Cheap
        } else {
            Pricing::FairlyPriced
        };

        VolComparison {
            iv,
            hv,
            diff_percent: Some(diff),
            pricing,
        }
    }
}

impl fmt::Display for VolComparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let iv = self.iv * 100.0;
        let hv = self.hv.value().unwrap_or(0.0) * 100.0;
        let diff = self.diff_percent.unwrap_or(0.0);

        match self.pricing {
            Pricing::InsufficientData => {
                write!(f, "Not enough data to compute realized volatility.")
            }
            Pricing::Degenerate => write!(f, "IV ({:.2}%) vs HV (not a positive number).", iv),
            Pricing::Expensive => write!(
                f,
                "IV ({:.2}%) is {:.1}% higher than HV ({:.2}%). Options look expensive.",
                iv, diff, hv
            ),
            Pricing::Cheap => write!(
                f,
                "IV ({:.2}%) is {:.1}% lower than HV ({:.2}%). Options look cheap.",
                iv,
                diff.abs(),
                hv
            ),
            Pricing::FairlyPriced => write!(
                f,
                "IV ({:.2}%) is close to HV ({:.2}%). Options appear fairly priced.",
                iv, hv
            ),
        }
    }
}

/// Point-in-time IV/HV reading for a symbol. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct VolatilitySnapshot {
    pub symbol: String,
    /// Lookback in trading days
    pub window: usize,
    pub comparison: VolComparison,
}

impl VolatilitySnapshot {
    /// Build a snapshot, rejecting negative or non-finite IV.
    pub fn new(symbol: &str, window: usize, iv: f64, hv: HistoricalVol) -> JournalResult<Self> {
        Self::check_iv(iv)?;

        Ok(Self {
            symbol: symbol.trim().to_uppercase(),
            window,
            comparison: VolatilityComparator::compare(iv, hv),
        })
    }

    /// Reject negative or non-finite IV before any market data is fetched.
    pub fn check_iv(iv: f64) -> JournalResult<()> {
        if !iv.is_finite() || iv < 0.0 {
            return Err(JournalError::validation(format!(
                "implied volatility must be a non-negative decimal, got {}",
                iv
            )));
        }
        Ok(())
    }

    pub fn iv(&self) -> f64 {
        self.comparison.iv
    }

    pub fn hv(&self) -> HistoricalVol {
        self.comparison.hv
    }

    pub fn diff_percent(&self) -> Option<f64> {
        self.comparison.diff_percent
    }

    pub fn pricing(&self) -> Pricing {
        self.comparison.pricing
    }

    /// One-line summary suitable for a journal entry's notes.
    pub fn context_line(&self) -> String {
        format!(
            "[vol {} {}d HV] {}",
            self.symbol, self.window, self.comparison
        )
    }
}
