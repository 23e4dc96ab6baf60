//! Analytics: realized volatility, IV/HV comparison, P&L, journal statistics.

mod calculator;
mod comparator;
mod pnl;
mod volatility;

pub use calculator::{JournalStats, StatsCalculator};
pub use comparator::VolatilitySnapshot;
pub use pnl::PnlCalculator;
pub use volatility::{VolatilityEstimator, DEFAULT_WINDOW};
