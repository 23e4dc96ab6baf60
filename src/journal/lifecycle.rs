//! Trade lifecycle: validation and open -> closed transitions over a repository.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info};

use super::repository::JournalRepository;
use crate::error::{JournalError, JournalResult};
use crate::metrics::{JournalStats, PnlCalculator, StatsCalculator};
use crate::models::{
    EntryDraft, EntryFilter, EntryId, EntryPatch, EntryStatus, ExitFill, NewEntry, Tags,
    TradeEntry,
};

/// State machine for journal entries.
///
/// `open` is the only initial state and `closed` is terminal. The lifecycle
/// owns validation and transition rules; persistence is delegated to `R`.
pub struct TradeLifecycle<R> {
    repo: R,
}

impl<R: JournalRepository> TradeLifecycle<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Record a new open position.
    pub async fn create(&self, new: NewEntry) -> JournalResult<TradeEntry> {
        let symbol = normalize_symbol(&new.symbol)?;
        check_size(new.size)?;
        check_price("entry_price", new.entry_price)?;
        check_optional_price("stop_price", new.stop_price)?;
        check_optional_price("target_price", new.target_price)?;
        check_tags(&new.tags)?;
        check_notional("entry_price", new.entry_price, new.size)?;
        check_optional_notional("stop_price", new.stop_price, new.size)?;
        check_optional_notional("target_price", new.target_price, new.size)?;

        let now = Utc::now();
        let draft = EntryDraft {
            symbol,
            strategy: new.strategy.trim().to_string(),
            entry_action: new.entry_action,
            entry_date: new.entry_date.unwrap_or_else(|| now.date_naive()),
            entry_price: new.entry_price,
            size: new.size,
            direction: new.direction,
            notes: new.notes,
            tags: new.tags,
            stop_price: new.stop_price,
            target_price: new.target_price,
            exit: None,
            created_at: now,
            updated_at: now,
        };

        let entry = self.repo.create(draft).await?;
        info!(
            id = entry.id,
            symbol = %entry.symbol,
            action = %entry.entry_action,
            price = %entry.entry_price,
            size = entry.size,
            "Journal entry opened"
        );
        Ok(entry)
    }

    pub async fn get(&self, id: EntryId) -> JournalResult<TradeEntry> {
        self.repo.get(id).await?.ok_or(JournalError::NotFound(id))
    }

    /// Apply a partial update.
    ///
    /// Closed entries accept only notes, tags, strategy and direction; any
    /// financial field in the patch rejects the whole patch.
    pub async fn update(&self, id: EntryId, patch: EntryPatch) -> JournalResult<TradeEntry> {
        let mut entry = self.get(id).await?;

        if !entry.is_open() {
            let locked = patch.financial_fields();
            if !locked.is_empty() {
                return Err(JournalError::invalid_transition(
                    id,
                    format!(
                        "closed entries accept only notes, tags, strategy and direction (rejected: {})",
                        locked.join(", ")
                    ),
                ));
            }
        }

        apply_patch(&mut entry, patch)?;
        entry.updated_at = Utc::now();

        let updated = self.repo.update(&entry).await?;
        debug!(id, "Journal entry updated");
        Ok(updated)
    }

    /// Close an open entry. One-way; a second close is rejected.
    pub async fn close(
        &self,
        id: EntryId,
        exit_price: Decimal,
        exit_date: Option<NaiveDate>,
    ) -> JournalResult<TradeEntry> {
        let mut entry = self
            .repo
            .get(id)
            .await?
            .ok_or_else(|| JournalError::invalid_transition(id, "entry does not exist"))?;

        if !entry.is_open() {
            return Err(JournalError::invalid_transition(id, "entry is already closed"));
        }
        check_price("exit_price", exit_price)?;
        check_notional("exit_price", exit_price, entry.size)?;

        let now = Utc::now();
        let exit_date = exit_date.unwrap_or_else(|| now.date_naive());
        if exit_date < entry.entry_date {
            return Err(JournalError::validation(format!(
                "exit_date {} is before entry_date {}",
                exit_date, entry.entry_date
            )));
        }

        entry.exit = Some(ExitFill {
            price: exit_price,
            date: exit_date,
        });
        entry.updated_at = now;

        let closed = self.repo.update(&entry).await?;
        info!(
            id,
            symbol = %closed.symbol,
            exit_action = %closed.expected_exit_action(),
            exit_price = %exit_price,
            pnl = ?closed.realized_pnl(),
            "Journal entry closed"
        );
        Ok(closed)
    }

    /// Hard delete, regardless of status.
    pub async fn delete(&self, id: EntryId) -> JournalResult<()> {
        if !self.repo.delete(id).await? {
            return Err(JournalError::NotFound(id));
        }
        info!(id, "Journal entry deleted");
        Ok(())
    }

    /// Entries carrying `tag`, or every entry when no tag is given.
    pub async fn list_by_tag(&self, tag: Option<&str>) -> JournalResult<Vec<TradeEntry>> {
        let filter = match tag.map(str::trim).filter(|t| !t.is_empty()) {
            Some(tag) => EntryFilter::by_tag(tag),
            None => EntryFilter::all(),
        };
        self.repo.list(&filter).await
    }

    pub async fn list_by_status(&self, status: EntryStatus) -> JournalResult<Vec<TradeEntry>> {
        self.repo.list(&EntryFilter::by_status(status)).await
    }

    pub async fn list(&self, filter: &EntryFilter) -> JournalResult<Vec<TradeEntry>> {
        self.repo.list(filter).await
    }

    /// Win rate and realized P&L over the closed entries.
    pub async fn stats(&self) -> JournalResult<JournalStats> {
        let closed = self.list_by_status(EntryStatus::Closed).await?;
        Ok(StatsCalculator::calculate(&closed))
    }
}

fn apply_patch(entry: &mut TradeEntry, patch: EntryPatch) -> JournalResult<()> {
    if let Some(symbol) = patch.symbol {
        entry.symbol = normalize_symbol(&symbol)?;
    }
    if let Some(price) = patch.entry_price {
        check_price("entry_price", price)?;
        entry.entry_price = price;
    }
    if let Some(size) = patch.size {
        check_size(size)?;
        entry.size = size;
    }
    if let Some(stop) = patch.stop_price {
        check_optional_price("stop_price", stop)?;
        entry.stop_price = stop;
    }
    if let Some(target) = patch.target_price {
        check_optional_price("target_price", target)?;
        entry.target_price = target;
    }
    if let Some(tags) = patch.tags {
        check_tags(&tags)?;
        entry.tags = tags;
    }
    if let Some(date) = patch.entry_date {
        entry.entry_date = date;
    }
    if let Some(strategy) = patch.strategy {
        entry.strategy = strategy.trim().to_string();
    }
    if let Some(notes) = patch.notes {
        entry.notes = notes;
    }
    if let Some(direction) = patch.direction {
        entry.direction = direction;
    }

    // Size and prices may change together, so bounds are checked on the result.
    check_notional("entry_price", entry.entry_price, entry.size)?;
    check_optional_notional("stop_price", entry.stop_price, entry.size)?;
    check_optional_notional("target_price", entry.target_price, entry.size)?;
    Ok(())
}

fn normalize_symbol(raw: &str) -> JournalResult<String> {
    let symbol = raw.trim().to_uppercase();
    if symbol.is_empty() {
        return Err(JournalError::validation("symbol must not be empty"));
    }
    Ok(symbol)
}

fn check_size(size: u32) -> JournalResult<()> {
    if size < 1 {
        return Err(JournalError::validation("size must be at least 1 contract"));
    }
    Ok(())
}

fn check_price(field: &str, price: Decimal) -> JournalResult<()> {
    if price < Decimal::ZERO {
        return Err(JournalError::validation(format!(
            "{} must not be negative, got {}",
            field, price
        )));
    }
    Ok(())
}

fn check_optional_price(field: &str, price: Option<Decimal>) -> JournalResult<()> {
    match price {
        Some(p) => check_price(field, p),
        None => Ok(()),
    }
}

fn check_notional(field: &str, price: Decimal, size: u32) -> JournalResult<()> {
    if PnlCalculator::notional(price, size).is_none() {
        return Err(JournalError::validation(format!(
            "{} {} x {} contracts is too large to account for",
            field, price, size
        )));
    }
    Ok(())
}

fn check_optional_notional(field: &str, price: Option<Decimal>, size: u32) -> JournalResult<()> {
    match price {
        Some(p) => check_notional(field, p, size),
        None => Ok(()),
    }
}

fn check_tags(tags: &Tags) -> JournalResult<()> {
    let bad = tags.unstorable();
    if !bad.is_empty() {
        return Err(JournalError::validation(format!(
            "tags must not contain ',': {}",
            bad.join(" | ")
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tokio_test::{assert_err, assert_ok};

    use crate::db::Database;
    use crate::models::{Direction, EntryAction};

    async fn lifecycle() -> TradeLifecycle<Database> {
        let db = Database::new("sqlite::memory:").await.unwrap();
        TradeLifecycle::new(db)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn test_create_normalizes_and_defaults() {
        let journal = lifecycle().await;
        let entry = journal
            .create(
                NewEntry::new("  spy ", "CSP", EntryAction::Sto, dec!(1.25), 2)
                    .tags(["theta", " earnings "]),
            )
            .await
            .unwrap();

        assert_eq!(entry.symbol, "SPY");
        assert_eq!(entry.status(), EntryStatus::Open);
        assert_eq!(entry.entry_date, entry.created_at.date_naive());
        assert_eq!(entry.direction, Direction::Neutral);
        assert!(entry.tags.contains("earnings"));
        assert_eq!(entry.exit, None);
        assert_eq!(entry.realized_pnl(), None);
    }

    #[tokio::test]
    async fn test_create_validation() {
        let journal = lifecycle().await;

        let err = journal
            .create(NewEntry::new("   ", "x", EntryAction::Bto, dec!(1), 1))
            .await;
        assert!(matches!(err, Err(JournalError::Validation(_))));

        let err = journal
            .create(NewEntry::new("SPY", "x", EntryAction::Bto, dec!(1), 0))
            .await;
        assert!(matches!(err, Err(JournalError::Validation(_))));

        let err = journal
            .create(NewEntry::new("SPY", "x", EntryAction::Bto, dec!(-0.01), 1))
            .await;
        assert!(matches!(err, Err(JournalError::Validation(_))));

        let err = journal
            .create(NewEntry::new("SPY", "x", EntryAction::Bto, dec!(1), 1).tags(["a,b"]))
            .await;
        assert!(matches!(err, Err(JournalError::Validation(_))));

        // Zero premium is allowed
        assert_ok!(
            journal
                .create(NewEntry::new("SPY", "x", EntryAction::Bto, dec!(0), 1))
                .await
        );
        assert!(journal.list_by_tag(None).await.unwrap().len() == 1);
    }

    #[tokio::test]
    async fn test_close_flips_status_once() {
        let journal = lifecycle().await;
        let entry = journal
            .create(NewEntry::new("AAPL", "long call", EntryAction::Bto, dec!(100.0), 10).on(date(2025, 1, 1)))
            .await
            .unwrap();

        let closed = journal
            .close(entry.id, dec!(110.0), Some(date(2025, 1, 2)))
            .await
            .unwrap();
        assert_eq!(closed.status(), EntryStatus::Closed);
        assert_eq!(closed.exit_price(), Some(dec!(110.0)));
        assert_eq!(closed.exit_date(), Some(date(2025, 1, 2)));
        assert_eq!(closed.realized_pnl(), Some(dec!(10000.00)));
        assert!(closed.updated_at >= entry.updated_at);

        let again = journal.close(entry.id, dec!(120.0), None).await;
        assert!(matches!(
            again,
            Err(JournalError::InvalidStateTransition { id, .. }) if id == entry.id
        ));

        // First close is preserved
        let stored = journal.get(entry.id).await.unwrap();
        assert_eq!(stored.exit_price(), Some(dec!(110.0)));

        let closed_list = journal.list_by_status(EntryStatus::Closed).await.unwrap();
        assert!(closed_list.iter().any(|e| e.id == entry.id));
    }

    #[tokio::test]
    async fn test_close_missing_or_negative() {
        let journal = lifecycle().await;
        let missing = journal.close(999, dec!(1), None).await;
        assert!(matches!(missing, Err(JournalError::InvalidStateTransition { .. })));

        let entry = journal
            .create(NewEntry::new("IWM", "put", EntryAction::Bto, dec!(1), 1))
            .await
            .unwrap();
        let negative = journal.close(entry.id, dec!(-1), None).await;
        assert!(matches!(negative, Err(JournalError::Validation(_))));
        assert!(journal.get(entry.id).await.unwrap().is_open());
    }

    #[tokio::test]
    async fn test_close_defaults_exit_date_to_today() {
        let journal = lifecycle().await;
        let entry = journal
            .create(NewEntry::new("TSLA", "CSP", EntryAction::Sto, dec!(4.0), 1))
            .await
            .unwrap();
        let closed = journal.close(entry.id, dec!(1.0), None).await.unwrap();
        assert_eq!(closed.exit_date(), Some(closed.updated_at.date_naive()));
        assert_eq!(closed.realized_pnl(), Some(dec!(300.00)));
    }

    #[tokio::test]
    async fn test_oversized_amounts_are_rejected_before_writing() {
        let journal = lifecycle().await;

        let err = journal
            .create(NewEntry::new(
                "SPY",
                "x",
                EntryAction::Bto,
                dec!(1000000000000000000000000000),
                1,
            ))
            .await;
        assert!(matches!(err, Err(JournalError::Validation(_))));
        assert!(journal.list_by_tag(None).await.unwrap().is_empty());

        let entry = journal
            .create(NewEntry::new("SPY", "x", EntryAction::Bto, dec!(1.00), 1))
            .await
            .unwrap();
        let err = journal
            .close(entry.id, dec!(1000000000000000000000000000), None)
            .await;
        assert!(matches!(err, Err(JournalError::Validation(_))));
        assert!(journal.get(entry.id).await.unwrap().is_open());

        // Size alone can push an accepted price over the bound
        let err = journal
            .update(
                entry.id,
                EntryPatch {
                    entry_price: Some(dec!(10000000000000000)),
                    size: Some(2),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(err, Err(JournalError::Validation(_))));

        // Largest accepted legs still produce a P&L and stats
        let big = journal
            .create(NewEntry::new("QQQ", "x", EntryAction::Sto, dec!(10000000000000000), 1))
            .await
            .unwrap();
        let closed = journal.close(big.id, dec!(0), None).await.unwrap();
        assert_eq!(closed.realized_pnl(), Some(dec!(1000000000000000000)));
        assert_eq!(journal.stats().await.unwrap().total_pnl, dec!(1000000000000000000));
    }

    #[tokio::test]
    async fn test_close_rejects_exit_before_entry() {
        let journal = lifecycle().await;
        let entry = journal
            .create(NewEntry::new("SPY", "CSP", EntryAction::Sto, dec!(1.0), 1).on(date(2025, 3, 10)))
            .await
            .unwrap();

        let err = journal.close(entry.id, dec!(0.5), Some(date(2025, 3, 9))).await;
        assert!(matches!(err, Err(JournalError::Validation(_))));
        assert!(journal.get(entry.id).await.unwrap().is_open());

        // Same-day close is fine
        let closed = journal
            .close(entry.id, dec!(0.5), Some(date(2025, 3, 10)))
            .await
            .unwrap();
        assert_eq!(closed.holding_days(), Some(0));
    }

    #[tokio::test]
    async fn test_update_sets_and_clears_risk_levels() {
        let journal = lifecycle().await;
        let mut new = NewEntry::new("SPY", "long call", EntryAction::Bto, dec!(2.0), 1);
        new.stop_price = Some(dec!(1.0));
        let entry = journal.create(new).await.unwrap();

        let updated = journal
            .update(
                entry.id,
                EntryPatch {
                    stop_price: Some(None),
                    target_price: Some(Some(dec!(4.0))),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.stop_price, None);
        assert_eq!(updated.target_price, Some(dec!(4.0)));

        let stored = journal.get(entry.id).await.unwrap();
        assert_eq!(stored.stop_price, None);
        assert_eq!(stored.target_price, Some(dec!(4.0)));
    }

    #[tokio::test]
    async fn test_update_open_entry() {
        let journal = lifecycle().await;
        let entry = journal
            .create(NewEntry::new("SPY", "CSP", EntryAction::Sto, dec!(1.0), 1).notes("Test"))
            .await
            .unwrap();

        let updated = journal
            .update(
                entry.id,
                EntryPatch {
                    notes: Some("Updated".into()),
                    size: Some(3),
                    symbol: Some("qqq".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.notes, "Updated");
        assert_eq!(updated.size, 3);
        assert_eq!(updated.symbol, "QQQ");
        assert!(updated.updated_at >= entry.updated_at);
        assert_eq!(updated.created_at, entry.created_at);
    }

    #[tokio::test]
    async fn test_invalid_patch_is_not_partially_applied() {
        let journal = lifecycle().await;
        let entry = journal
            .create(NewEntry::new("SPY", "CSP", EntryAction::Sto, dec!(1.0), 1))
            .await
            .unwrap();

        let err = journal
            .update(
                entry.id,
                EntryPatch {
                    notes: Some("should not stick".into()),
                    size: Some(0),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(err, Err(JournalError::Validation(_))));

        let stored = journal.get(entry.id).await.unwrap();
        assert_eq!(stored.notes, "");
        assert_eq!(stored.size, 1);
    }

    #[tokio::test]
    async fn test_update_closed_entry_policy() {
        let journal = lifecycle().await;
        let entry = journal
            .create(NewEntry::new("SPY", "CSP", EntryAction::Sto, dec!(1.0), 1))
            .await
            .unwrap();
        journal.close(entry.id, dec!(0.5), None).await.unwrap();

        let meta = journal
            .update(
                entry.id,
                EntryPatch {
                    notes: Some("lesson: sold too early".into()),
                    tags: Some(Tags::from_csv("review")),
                    direction: Some(Direction::Short),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(meta.notes, "lesson: sold too early");
        assert_eq!(meta.status(), EntryStatus::Closed);

        let err = journal
            .update(
                entry.id,
                EntryPatch {
                    notes: Some("x".into()),
                    entry_price: Some(dec!(2.0)),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(err, Err(JournalError::InvalidStateTransition { .. })));
        assert_eq!(journal.get(entry.id).await.unwrap().entry_price, dec!(1.0));
    }

    #[tokio::test]
    async fn test_update_unknown_id() {
        let journal = lifecycle().await;
        let err = journal.update(42, EntryPatch::default()).await;
        assert!(matches!(err, Err(JournalError::NotFound(42))));
    }

    #[tokio::test]
    async fn test_delete_removes_from_every_projection() {
        let journal = lifecycle().await;
        let open = journal
            .create(NewEntry::new("SPY", "a", EntryAction::Bto, dec!(1), 1))
            .await
            .unwrap();
        let closed = journal
            .create(NewEntry::new("QQQ", "b", EntryAction::Bto, dec!(1), 1))
            .await
            .unwrap();
        journal.close(closed.id, dec!(2), None).await.unwrap();

        assert_ok!(journal.delete(open.id).await);
        assert_ok!(journal.delete(closed.id).await);

        for status in [EntryStatus::Open, EntryStatus::Closed] {
            let ids: Vec<_> = journal
                .list_by_status(status)
                .await
                .unwrap()
                .into_iter()
                .map(|e| e.id)
                .collect();
            assert!(!ids.contains(&open.id));
            assert!(!ids.contains(&closed.id));
        }

        let again = journal.delete(open.id).await;
        assert!(matches!(again, Err(JournalError::NotFound(_))));
        assert_err!(journal.get(closed.id).await);
    }

    #[tokio::test]
    async fn test_list_by_tag_newest_first() {
        let journal = lifecycle().await;
        let first = journal
            .create(NewEntry::new("SPY", "a", EntryAction::Bto, dec!(1), 1).tags(["theta"]))
            .await
            .unwrap();
        let _other = journal
            .create(NewEntry::new("QQQ", "b", EntryAction::Bto, dec!(1), 1).tags(["earnings"]))
            .await
            .unwrap();
        let last = journal
            .create(
                NewEntry::new("IWM", "c", EntryAction::Bto, dec!(1), 1)
                    .tags(["earnings", "theta"]),
            )
            .await
            .unwrap();

        let theta: Vec<_> = journal
            .list_by_tag(Some(" theta "))
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(theta, vec![last.id, first.id]);

        // Substrings do not match
        assert!(journal.list_by_tag(Some("the")).await.unwrap().is_empty());
        assert_eq!(journal.list_by_tag(None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_end_to_end_stats() {
        let journal = lifecycle().await;

        let winner = journal
            .create(NewEntry::new("SPY", "long call", EntryAction::Bto, dec!(2.50), 1))
            .await
            .unwrap();
        let closed = journal.close(winner.id, dec!(3.10), None).await.unwrap();
        assert_eq!(closed.realized_pnl(), Some(dec!(60.00)));

        let loser = journal
            .create(NewEntry::new("QQQ", "short put", EntryAction::Sto, dec!(0.80), 1))
            .await
            .unwrap();
        journal.close(loser.id, dec!(1.00), None).await.unwrap();

        journal
            .create(NewEntry::new("IWM", "still open", EntryAction::Bto, dec!(1.00), 1))
            .await
            .unwrap();

        let stats = journal.stats().await.unwrap();
        assert_eq!(stats.closed_trades, 2);
        assert!((stats.win_rate - 50.0).abs() < 1e-9);
        assert_eq!(stats.total_pnl, dec!(40.00));
    }
}
