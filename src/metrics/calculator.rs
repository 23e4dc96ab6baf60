//! Aggregate statistics over closed journal entries: win rate, total P&L, etc.

use std::fmt;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::models::TradeEntry;

/// Derived journal statistics. Computed on demand, never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JournalStats {
    /// Number of closed entries
    pub closed_trades: u32,

    /// Entries with positive realized P&L
    pub winning_trades: u32,

    /// Entries with zero or negative realized P&L
    pub losing_trades: u32,

    /// Win rate in percent (0.0 to 100.0)
    pub win_rate: f64,

    /// Sum of realized P&L
    pub total_pnl: Decimal,

    /// Average profit on winning trades
    pub avg_win: Decimal,

    /// Average loss on losing trades (absolute value)
    pub avg_loss: Decimal,

    pub best_trade: Option<Decimal>,
    pub worst_trade: Option<Decimal>,

    /// Mean calendar days between entry and exit
    pub avg_holding_days: Option<f64>,
}

impl JournalStats {
    pub fn empty() -> Self {
        Self {
            closed_trades: 0,
            winning_trades: 0,
            losing_trades: 0,
            win_rate: 0.0,
            total_pnl: Decimal::ZERO,
            avg_win: Decimal::ZERO,
            avg_loss: Decimal::ZERO,
            best_trade: None,
            worst_trade: None,
            avg_holding_days: None,
        }
    }
}

impl Default for JournalStats {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Display for JournalStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Journal Statistics ===")?;
        writeln!(f, "Closed Trades:  {}", self.closed_trades)?;
        writeln!(f, "Win Rate:       {:.1}%", self.win_rate)?;
        writeln!(f, "Total P&L:      ${:.2}", self.total_pnl)?;
        writeln!(f, "Winning Trades: {}", self.winning_trades)?;
        writeln!(f, "Losing Trades:  {}", self.losing_trades)?;
        writeln!(f, "Avg Win:        ${:.2}", self.avg_win)?;
        writeln!(f, "Avg Loss:       ${:.2}", self.avg_loss)?;
        if let (Some(best), Some(worst)) = (self.best_trade, self.worst_trade) {
            writeln!(f, "Best Trade:     ${:.2}", best)?;
            writeln!(f, "Worst Trade:    ${:.2}", worst)?;
        }
        if let Some(days) = self.avg_holding_days {
            writeln!(f, "Avg Holding:    {:.1} days", days)?;
        }
        Ok(())
    }
}

/// Calculator for journal statistics.
pub struct StatsCalculator;

impl StatsCalculator {
    /// Reduce over the closed entries in `entries`. Open entries are ignored.
    pub fn calculate(entries: &[TradeEntry]) -> JournalStats {
        let closed: Vec<&TradeEntry> = entries.iter().filter(|e| !e.is_open()).collect();
        let pnls: Vec<Decimal> = closed.iter().filter_map(|e| e.realized_pnl()).collect();

        let mut stats = JournalStats::empty();
        if pnls.is_empty() {
            return stats;
        }

        Self::calculate_pnl_stats(&mut stats, &pnls);

        let holding: Vec<i64> = closed.iter().filter_map(|e| e.holding_days()).collect();
        if !holding.is_empty() {
            stats.avg_holding_days =
                Some(holding.iter().sum::<i64>() as f64 / holding.len() as f64);
        }

        stats
    }

    fn calculate_pnl_stats(stats: &mut JournalStats, pnls: &[Decimal]) {
        let (wins, losses): (Vec<Decimal>, Vec<Decimal>) =
            pnls.iter().partition(|&&p| p > Decimal::ZERO);

        stats.closed_trades = pnls.len() as u32;
        stats.winning_trades = wins.len() as u32;
        stats.losing_trades = losses.len() as u32;
        stats.total_pnl = pnls.iter().copied().sum();
        stats.win_rate = 100.0 * wins.len() as f64 / pnls.len() as f64;

        if !wins.is_empty() {
            stats.avg_win = (wins.iter().copied().sum::<Decimal>()
                / Decimal::from(wins.len() as u32))
            .round_dp(2);
        }
        if !losses.is_empty() {
            stats.avg_loss = (losses.iter().map(|l| l.abs()).sum::<Decimal>()
                / Decimal::from(losses.len() as u32))
            .round_dp(2);
        }

        stats.best_trade = pnls.iter().copied().max();
        stats.worst_trade = pnls.iter().copied().min();
    }
}
