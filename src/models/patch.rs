//! Inputs to the journal lifecycle: new entries, partial updates, list filters.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

use super::entry::{Direction, EntryAction, EntryStatus};
use super::tags::Tags;
use crate::error::{JournalError, JournalResult};

/// Request to open a new journal entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewEntry {
    pub symbol: String,
    pub strategy: String,
    pub entry_action: EntryAction,
    /// Defaults to today when omitted
    #[serde(default)]
    pub entry_date: Option<NaiveDate>,
    pub entry_price: Decimal,
    pub size: u32,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub tags: Tags,
    #[serde(default)]
    pub stop_price: Option<Decimal>,
    #[serde(default)]
    pub target_price: Option<Decimal>,
}

impl NewEntry {
    pub fn new(
        symbol: impl Into<String>,
        strategy: impl Into<String>,
        entry_action: EntryAction,
        entry_price: Decimal,
        size: u32,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            strategy: strategy.into(),
            entry_action,
            entry_date: None,
            entry_price,
            size,
            direction: Direction::default(),
            notes: String::new(),
            tags: Tags::new(),
            stop_price: None,
            target_price: None,
        }
    }

    pub fn on(mut self, date: NaiveDate) -> Self {
        self.entry_date = Some(date);
        self
    }

    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    pub fn tags<S: AsRef<str>>(mut self, tags: impl IntoIterator<Item = S>) -> Self {
        self.tags = tags.into_iter().collect();
        self
    }

    /// Append a line to the notes, e.g. a volatility context sentence.
    pub fn append_note(&mut self, line: &str) {
        if !self.notes.is_empty() && !self.notes.ends_with('\n') {
            self.notes.push('\n');
        }
        self.notes.push_str(line);
    }
}

/// Explicit set of mutable fields. Anything not listed here cannot be patched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntryPatch {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub strategy: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub tags: Option<Tags>,
    #[serde(default)]
    pub direction: Option<Direction>,
    #[serde(default)]
    pub entry_price: Option<Decimal>,
    #[serde(default)]
    pub size: Option<u32>,
    #[serde(default)]
    pub entry_date: Option<NaiveDate>,
    /// `Some(None)` clears the level; JSON `null` maps to that.
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub stop_price: Option<Option<Decimal>>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub target_price: Option<Option<Decimal>>,
}

/// Keep an explicit `null` distinct from an absent field.
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl EntryPatch {
    /// Parse a JSON patch, rejecting unknown field names.
    pub fn from_json(raw: &str) -> JournalResult<Self> {
        serde_json::from_str(raw)
            .map_err(|e| JournalError::validation(format!("invalid patch: {}", e)))
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Names of touched fields that affect P&L or position identity.
    /// These are frozen once an entry is closed.
    pub fn financial_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.symbol.is_some() {
            fields.push("symbol");
        }
        if self.entry_price.is_some() {
            fields.push("entry_price");
        }
        if self.size.is_some() {
            fields.push("size");
        }
        if self.entry_date.is_some() {
            fields.push("entry_date");
        }
        if self.stop_price.is_some() {
            fields.push("stop_price");
        }
        if self.target_price.is_some() {
            fields.push("target_price");
        }
        fields
    }
}

/// Read-side projection filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryFilter {
    pub tag: Option<String>,
    pub status: Option<EntryStatus>,
}

impl EntryFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_tag(tag: impl Into<String>) -> Self {
        Self {
            tag: Some(tag.into()),
            status: None,
        }
    }

    pub fn by_status(status: EntryStatus) -> Self {
        Self {
            tag: None,
            status: Some(status),
        }
    }
}
