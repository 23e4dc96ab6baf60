//! Market data: bar types, the source seam, retry policy, and the chart client.

mod chart_client;
mod market_data;
mod types;

pub use chart_client::{ChartClient, CHART_API_BASE};
pub use market_data::{Bar, MarketDataSource, PriceRequest, RetryPolicy, RetryingSource};
