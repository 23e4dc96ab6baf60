//! HTTP client for a public chart endpoint returning daily/intraday OHLCV.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;

use super::market_data::{Bar, MarketDataSource, PriceRequest};
use super::types::ChartEnvelope;
use crate::error::MarketDataError;

pub const CHART_API_BASE: &str = "https://query1.finance.yahoo.com";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("options-journal/", env!("CARGO_PKG_VERSION"));

/// Client for the chart API (read-only).
pub struct ChartClient {
    client: Client,
    base_url: String,
}

impl ChartClient {
    /// Create a client against `base_url` (no trailing slash needed).
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn fetch_once(&self, request: &PriceRequest) -> Result<Vec<Bar>, MarketDataError> {
        let url = format!("{}/v8/finance/chart/{}", self.base_url, request.symbol);
        debug!(url = %url, period = %request.period, interval = %request.interval, "Fetching chart");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("range", request.period.as_str()),
                ("interval", request.interval.as_str()),
            ])
            .send()
            .await
            .map_err(|e| MarketDataError::Transient(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &request.symbol, &body));
        }

        let envelope: ChartEnvelope = response
            .json()
            .await
            .map_err(|e| MarketDataError::Permanent(format!("failed to parse chart: {}", e)))?;

        bars_from_chart(envelope, &request.symbol)
    }
}

#[async_trait]
impl MarketDataSource for ChartClient {
    async fn fetch(&self, request: &PriceRequest) -> Result<Vec<Bar>, MarketDataError> {
        self.fetch_once(request).await
    }
}

fn classify_status(status: StatusCode, symbol: &str, body: &str) -> MarketDataError {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        MarketDataError::Transient(format!("{} - {}", status, body))
    } else if status == StatusCode::NOT_FOUND {
        MarketDataError::NoData(symbol.to_string())
    } else {
        MarketDataError::Permanent(format!("{} - {}", status, body))
    }
}

/// Turn the column-oriented chart payload into ascending bars.
fn bars_from_chart(envelope: ChartEnvelope, symbol: &str) -> Result<Vec<Bar>, MarketDataError> {
    if let Some(err) = envelope.chart.error {
        if err.code.eq_ignore_ascii_case("not found") {
            return Err(MarketDataError::NoData(symbol.to_string()));
        }
        return Err(MarketDataError::Permanent(format!(
            "{}: {}",
            err.code, err.description
        )));
    }

    let Some(result) = envelope.chart.result.and_then(|r| r.into_iter().next()) else {
        return Err(MarketDataError::NoData(symbol.to_string()));
    };

    let quote = result.indicators.quote.into_iter().next().unwrap_or_default();
    let column = |values: &[Option<f64>], i: usize| values.get(i).copied().flatten();

    let mut bars: Vec<Bar> = result
        .timestamp
        .iter()
        .enumerate()
        .filter_map(|(i, ts)| {
            let timestamp = Utc.timestamp_opt(*ts, 0).single()?;
            Some(Bar {
                timestamp,
                open: column(&quote.open, i),
                high: column(&quote.high, i),
                low: column(&quote.low, i),
                close: column(&quote.close, i),
                volume: quote.volume.get(i).copied().flatten(),
            })
        })
        .collect();

    bars.sort_by_key(|b| b.timestamp);

    if bars.iter().all(|b| b.close.is_none()) {
        return Err(MarketDataError::NoData(symbol.to_string()));
    }

    Ok(bars)
}
