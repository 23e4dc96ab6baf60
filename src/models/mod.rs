//! Data models for journal entries, tags, and lifecycle inputs.

mod entry;
mod patch;
mod tags;

pub use entry::{
    Direction, EntryAction, EntryDraft, EntryId, EntryStatus, ExitAction, ExitFill, TradeEntry,
};
pub use patch::{EntryFilter, EntryPatch, NewEntry};
pub use tags::Tags;
