//! Market data seam: price bars, the source trait, and bounded retry.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::MarketDataError;

/// One OHLCV bar. Any field may be missing in the upstream data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<u64>,
}

/// Lookback periods accepted by the chart endpoint.
pub const PERIODS: &[&str] = &["5d", "1mo", "3mo", "6mo", "1y", "2y", "5y", "max"];

/// Bar intervals accepted by the chart endpoint.
pub const INTERVALS: &[&str] = &["1m", "5m", "15m", "30m", "1h", "1d", "1wk", "1mo"];

/// Price history request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceRequest {
    pub symbol: String,
    pub period: String,
    pub interval: String,
}

impl PriceRequest {
    /// One month of daily bars.
    pub fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.trim().to_uppercase(),
            period: "1mo".to_string(),
            interval: "1d".to_string(),
        }
    }

    pub fn with_period(mut self, period: &str) -> Result<Self, MarketDataError> {
        if !PERIODS.contains(&period) {
            return Err(MarketDataError::Permanent(format!(
                "unsupported period '{}' (expected one of {})",
                period,
                PERIODS.join(", ")
            )));
        }
        self.period = period.to_string();
        Ok(self)
    }

    pub fn with_interval(mut self, interval: &str) -> Result<Self, MarketDataError> {
        if !INTERVALS.contains(&interval) {
            return Err(MarketDataError::Permanent(format!(
                "unsupported interval '{}' (expected one of {})",
                interval,
                INTERVALS.join(", ")
            )));
        }
        self.interval = interval.to_string();
        Ok(self)
    }
}

/// Supplier of chronological price bars.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Bars in ascending time order. Implementations report an empty
    /// history as `MarketDataError::NoData`, never as an empty success.
    async fn fetch(&self, request: &PriceRequest) -> Result<Vec<Bar>, MarketDataError>;
}

/// Attempt budget and exponential delay schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after each failure
    pub initial: Duration,
    /// Upper bound for any single delay
    pub max: Duration,
}

impl RetryPolicy {
    /// Delays between attempts: `initial`, doubling, capped at `max`, no jitter.
    /// The attempt budget is enforced by the caller, not by elapsed time.
    pub fn schedule(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial)
            .with_multiplier(2.0)
            .with_randomization_factor(0.0)
            .with_max_interval(self.max)
            .with_max_elapsed_time(None)
            .build()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial: Duration::from_secs(1),
            max: Duration::from_secs(8),
        }
    }
}

/// Wraps a source with bounded exponential-backoff retry.
///
/// Transient failures and empty results are retried; permanent failures
/// stop immediately. Once the budget is spent the last error is returned.
pub struct RetryingSource<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: MarketDataSource> RetryingSource<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }
}

#[async_trait]
impl<S: MarketDataSource> MarketDataSource for RetryingSource<S> {
    async fn fetch(&self, request: &PriceRequest) -> Result<Vec<Bar>, MarketDataError> {
        let schedule = self.policy.schedule();

        let max_attempts = self.policy.max_attempts.max(1);
        let attempts = AtomicU32::new(0);

        backoff::future::retry(schedule, || {
            let attempts = &attempts;
            let inner = &self.inner;
            async move {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                debug!(symbol = %request.symbol, attempt, "Fetching price history");

                let outcome = match inner.fetch(request).await {
                    Ok(bars) if bars.is_empty() => {
                        Err(MarketDataError::NoData(request.symbol.clone()))
                    }
                    other => other,
                };

                outcome.map_err(|err| {
                    if err.is_retryable() && attempt < max_attempts {
                        warn!(
                            symbol = %request.symbol,
                            attempt,
                            error = %err,
                            "Price history fetch failed, retrying"
                        );
                        backoff::Error::transient(err)
                    } else {
                        backoff::Error::permanent(err)
                    }
                })
            }
        })
        .await
    }
}
