//! Storage seam for journal entries.

use async_trait::async_trait;

use crate::error::JournalResult;
use crate::models::{EntryDraft, EntryFilter, EntryId, TradeEntry};

/// Durable store for journal entries.
///
/// The repository owns id assignment and storage. Every write must be
/// atomic: a reader sees either the old row or the new one, never a mix.
/// Concurrent writers to the same id are not detected; the last write wins.
#[async_trait]
pub trait JournalRepository: Send + Sync {
    /// Insert a new entry and return it with its assigned id.
    async fn create(&self, draft: EntryDraft) -> JournalResult<TradeEntry>;

    async fn get(&self, id: EntryId) -> JournalResult<Option<TradeEntry>>;

    /// Replace the stored row for `entry.id` with an already validated entry.
    /// Fails with `NotFound` if the id is unknown.
    async fn update(&self, entry: &TradeEntry) -> JournalResult<TradeEntry>;

    /// Hard delete. Returns whether a row was removed.
    async fn delete(&self, id: EntryId) -> JournalResult<bool>;

    /// Entries matching `filter`, newest `created_at` first.
    async fn list(&self, filter: &EntryFilter) -> JournalResult<Vec<TradeEntry>>;
}
