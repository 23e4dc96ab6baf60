//! Journal entry model for options-style trades.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::tags::Tags;
use crate::metrics::PnlCalculator;

/// Identifier assigned by the repository.
pub type EntryId = i64;

/// How a position was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntryAction {
    /// Buy-to-open (debit)
    Bto,
    /// Sell-to-open (credit)
    Sto,
}

impl EntryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryAction::Bto => "BTO",
            EntryAction::Sto => "STO",
        }
    }

    /// Closing action implied by the opening action.
    pub fn expected_exit(&self) -> ExitAction {
        match self {
            EntryAction::Bto => ExitAction::Stc,
            EntryAction::Sto => ExitAction::Btc,
        }
    }
}

impl FromStr for EntryAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "BTO" => Ok(EntryAction::Bto),
            "STO" => Ok(EntryAction::Sto),
            other => Err(format!("unknown entry action '{}' (expected BTO or STO)", other)),
        }
    }
}

impl fmt::Display for EntryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closing counterpart of [`EntryAction`]. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExitAction {
    /// Sell-to-close
    Stc,
    /// Buy-to-close
    Btc,
}

impl ExitAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitAction::Stc => "STC",
            ExitAction::Btc => "BTC",
        }
    }
}

impl fmt::Display for ExitAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Market view of the trade. Metadata only, never used in P&L.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
    #[default]
    Neutral,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "long",
            Direction::Short => "short",
            Direction::Neutral => "neutral",
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "long" => Ok(Direction::Long),
            "short" => Ok(Direction::Short),
            "neutral" => Ok(Direction::Neutral),
            other => Err(format!("unknown direction '{}' (expected long, short or neutral)", other)),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Open,
    Closed,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Open => "open",
            EntryStatus::Closed => "closed",
        }
    }
}

impl FromStr for EntryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "open" => Ok(EntryStatus::Open),
            "closed" => Ok(EntryStatus::Closed),
            other => Err(format!("unknown status '{}' (expected open or closed)", other)),
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exit leg of a closed entry. Price and date always travel together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitFill {
    /// Per-contract premium received or paid on close
    pub price: Decimal,
    pub date: NaiveDate,
}

/// Fields of an entry before the repository assigns its id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryDraft {
    pub symbol: String,
    pub strategy: String,
    pub entry_action: EntryAction,
    pub entry_date: NaiveDate,
    pub entry_price: Decimal,
    pub size: u32,
    pub direction: Direction,
    pub notes: String,
    pub tags: Tags,
    pub stop_price: Option<Decimal>,
    pub target_price: Option<Decimal>,
    pub exit: Option<ExitFill>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EntryDraft {
    pub fn with_id(self, id: EntryId) -> TradeEntry {
        TradeEntry {
            id,
            symbol: self.symbol,
            strategy: self.strategy,
            entry_action: self.entry_action,
            entry_date: self.entry_date,
            entry_price: self.entry_price,
            size: self.size,
            direction: self.direction,
            notes: self.notes,
            tags: self.tags,
            stop_price: self.stop_price,
            target_price: self.target_price,
            exit: self.exit,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// A recorded options trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeEntry {
    pub id: EntryId,

    /// Underlying ticker, uppercase and trimmed
    pub symbol: String,

    /// Free-text strategy label (e.g. "CSP", "iron condor")
    pub strategy: String,

    pub entry_action: EntryAction,

    pub entry_date: NaiveDate,

    /// Per-contract premium paid or received on open
    pub entry_price: Decimal,

    /// Number of contracts
    pub size: u32,

    pub direction: Direction,

    #[serde(default)]
    pub notes: String,

    #[serde(default)]
    pub tags: Tags,

    /// Optional risk levels
    pub stop_price: Option<Decimal>,
    pub target_price: Option<Decimal>,

    /// Present if and only if the entry is closed
    pub exit: Option<ExitFill>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TradeEntry {
    pub fn status(&self) -> EntryStatus {
        if self.exit.is_some() {
            EntryStatus::Closed
        } else {
            EntryStatus::Open
        }
    }

    pub fn is_open(&self) -> bool {
        self.exit.is_none()
    }

    pub fn exit_price(&self) -> Option<Decimal> {
        self.exit.map(|e| e.price)
    }

    pub fn exit_date(&self) -> Option<NaiveDate> {
        self.exit.map(|e| e.date)
    }

    /// Realized P&L with the contract multiplier applied; `None` while open.
    pub fn realized_pnl(&self) -> Option<Decimal> {
        PnlCalculator::for_entry(self)
    }

    pub fn expected_exit_action(&self) -> ExitAction {
        PnlCalculator::expected_exit_action(self.entry_action)
    }

    /// Calendar days held, for closed entries.
    pub fn holding_days(&self) -> Option<i64> {
        self.exit
            .map(|e| (e.date - self.entry_date).num_days())
    }
}
