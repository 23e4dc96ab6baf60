//! SQLite persistence for journal entries.
//!
//! Decimals are stored as TEXT so prices and P&L survive storage exactly.
//! Tags cross the boundary as a single comma-joined column.

use std::str::FromStr;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

use crate::error::{JournalError, JournalResult};
use crate::journal::JournalRepository;
use crate::metrics::PnlCalculator;
use crate::models::{
    Direction, EntryAction, EntryDraft, EntryFilter, EntryId, EntryStatus, ExitFill, Tags,
    TradeEntry,
};

/// Database connection pool backing the journal.
pub struct Database {
    pool: SqlitePool,
}

/// Stored journal row.
#[derive(Debug, Clone, sqlx::FromRow)]
struct StoredEntry {
    id: i64,
    symbol: String,
    strategy: String,
    entry_action: String,
    direction: String,
    entry_date: NaiveDate,
    entry_price: String,
    size: i64,
    notes: String,
    tags: String,
    stop_price: Option<String>,
    target_price: Option<String>,
    status: String,
    exit_price: Option<String>,
    exit_date: Option<NaiveDate>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Database {
    /// Create a new database connection and ensure the schema exists.
    pub async fn new(database_url: &str) -> Result<Self> {
        let in_memory = database_url.contains(":memory:");

        // Each connection to an in-memory database is a separate database,
        // so pin the pool to a single connection that never expires.
        let options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = options
            .connect(database_url)
            .await
            .context("Failed to connect to database")?;

        let db = Self { pool };
        db.run_migrations()
            .await
            .context("Failed to create journal schema")?;

        Ok(db)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS journal_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT NOT NULL,
                strategy TEXT NOT NULL DEFAULT '',
                entry_action TEXT NOT NULL CHECK (entry_action IN ('BTO', 'STO')),
                direction TEXT NOT NULL DEFAULT 'neutral',
                entry_date TEXT NOT NULL,
                entry_price TEXT NOT NULL,
                size INTEGER NOT NULL CHECK (size >= 1),
                notes TEXT NOT NULL DEFAULT '',
                tags TEXT NOT NULL DEFAULT '',
                stop_price TEXT,
                target_price TEXT,
                status TEXT NOT NULL DEFAULT 'open' CHECK (status IN ('open', 'closed')),
                exit_price TEXT,
                exit_date TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                CHECK ((status = 'closed') = (exit_price IS NOT NULL AND exit_date IS NOT NULL))
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_journal_status ON journal_entries(status)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_journal_created ON journal_entries(created_at)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Count of entries by status, for status output.
    pub async fn count_by_status(&self) -> JournalResult<(i64, i64)> {
        let (open, closed): (i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN status = 'open' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'closed' THEN 1 ELSE 0 END), 0)
            FROM journal_entries
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok((open, closed))
    }
}

#[async_trait]
impl JournalRepository for Database {
    async fn create(&self, draft: EntryDraft) -> JournalResult<TradeEntry> {
        let status = if draft.exit.is_some() {
            EntryStatus::Closed
        } else {
            EntryStatus::Open
        };

        let result = sqlx::query(
            r#"
            INSERT INTO journal_entries (
                symbol, strategy, entry_action, direction, entry_date, entry_price,
                size, notes, tags, stop_price, target_price, status, exit_price,
                exit_date, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&draft.symbol)
        .bind(&draft.strategy)
        .bind(draft.entry_action.as_str())
        .bind(draft.direction.as_str())
        .bind(draft.entry_date)
        .bind(draft.entry_price.to_string())
        .bind(draft.size as i64)
        .bind(&draft.notes)
        .bind(draft.tags.to_csv())
        .bind(draft.stop_price.map(|p| p.to_string()))
        .bind(draft.target_price.map(|p| p.to_string()))
        .bind(status.as_str())
        .bind(draft.exit.map(|e| e.price.to_string()))
        .bind(draft.exit.map(|e| e.date))
        .bind(draft.created_at)
        .bind(draft.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(draft.with_id(result.last_insert_rowid()))
    }

    async fn get(&self, id: EntryId) -> JournalResult<Option<TradeEntry>> {
        let row = sqlx::query_as::<_, StoredEntry>("SELECT * FROM journal_entries WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(TradeEntry::try_from).transpose()
    }

    async fn update(&self, entry: &TradeEntry) -> JournalResult<TradeEntry> {
        let result = sqlx::query(
            r#"
            UPDATE journal_entries SET
                symbol = ?,
                strategy = ?,
                entry_action = ?,
                direction = ?,
                entry_date = ?,
                entry_price = ?,
                size = ?,
                notes = ?,
                tags = ?,
                stop_price = ?,
                target_price = ?,
                status = ?,
                exit_price = ?,
                exit_date = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&entry.symbol)
        .bind(&entry.strategy)
        .bind(entry.entry_action.as_str())
        .bind(entry.direction.as_str())
        .bind(entry.entry_date)
        .bind(entry.entry_price.to_string())
        .bind(entry.size as i64)
        .bind(&entry.notes)
        .bind(entry.tags.to_csv())
        .bind(entry.stop_price.map(|p| p.to_string()))
        .bind(entry.target_price.map(|p| p.to_string()))
        .bind(entry.status().as_str())
        .bind(entry.exit_price().map(|p| p.to_string()))
        .bind(entry.exit_date())
        .bind(entry.updated_at)
        .bind(entry.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(JournalError::NotFound(entry.id));
        }

        Ok(entry.clone())
    }

    async fn delete(&self, id: EntryId) -> JournalResult<bool> {
        let result = sqlx::query("DELETE FROM journal_entries WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, filter: &EntryFilter) -> JournalResult<Vec<TradeEntry>> {
        let rows = match filter.status {
            Some(status) => {
                sqlx::query_as::<_, StoredEntry>(
                    "SELECT * FROM journal_entries WHERE status = ? ORDER BY created_at DESC, id DESC",
                )
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, StoredEntry>(
                    "SELECT * FROM journal_entries ORDER BY created_at DESC, id DESC",
                )
                .fetch_all(&self.pool)
                .await?
            }
        };

        // Tag membership is exact, so it is checked on the decoded set
        // rather than with a LIKE over the joined column.
        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let entry = TradeEntry::try_from(row)?;
            let keep = match &filter.tag {
                Some(tag) => entry.tags.contains(tag),
                None => true,
            };
            if keep {
                entries.push(entry);
            }
        }

        Ok(entries)
    }
}

impl TryFrom<StoredEntry> for TradeEntry {
    type Error = JournalError;

    fn try_from(row: StoredEntry) -> JournalResult<Self> {
        let id = row.id;
        let corrupt = |reason: String| JournalError::CorruptRecord { id, reason };

        let entry_action = EntryAction::from_str(&row.entry_action).map_err(corrupt)?;
        let direction = Direction::from_str(&row.direction).map_err(corrupt)?;
        let status = EntryStatus::from_str(&row.status).map_err(corrupt)?;
        let size = u32::try_from(row.size)
            .ok()
            .filter(|s| *s >= 1)
            .ok_or_else(|| corrupt(format!("invalid size {}", row.size)))?;

        let exit = match (status, decode_opt(id, "exit_price", row.exit_price)?, row.exit_date) {
            (EntryStatus::Open, None, None) => None,
            (EntryStatus::Closed, Some(price), Some(date)) => Some(ExitFill { price, date }),
            _ => {
                return Err(corrupt(
                    "exit fields do not match status".to_string(),
                ))
            }
        };

        // Rows written elsewhere could carry amounts whose P&L overflows.
        let entry_price = decode(id, "entry_price", &row.entry_price)?;
        let legs = std::iter::once(entry_price).chain(exit.map(|e| e.price));
        for price in legs {
            if PnlCalculator::notional(price, size).is_none() {
                return Err(corrupt(format!("price {} x {} is out of range", price, size)));
            }
        }

        Ok(TradeEntry {
            id,
            symbol: row.symbol,
            strategy: row.strategy,
            entry_action,
            entry_date: row.entry_date,
            entry_price,
            size,
            direction,
            notes: row.notes,
            tags: Tags::from_csv(&row.tags),
            stop_price: decode_opt(id, "stop_price", row.stop_price)?,
            target_price: decode_opt(id, "target_price", row.target_price)?,
            exit,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn decode(id: EntryId, field: &str, raw: &str) -> JournalResult<Decimal> {
    Decimal::from_str(raw).map_err(|e| JournalError::CorruptRecord {
        id,
        reason: format!("{} '{}' is not a decimal: {}", field, raw, e),
    })
}

fn decode_opt(id: EntryId, field: &str, raw: Option<String>) -> JournalResult<Option<Decimal>> {
    raw.map(|r| decode(id, field, &r)).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    async fn db() -> Database {
        Database::new("sqlite::memory:").await.unwrap()
    }

    fn draft(symbol: &str, tags: &str) -> EntryDraft {
        let now = Utc::now();
        EntryDraft {
            symbol: symbol.to_string(),
            strategy: "CSP".to_string(),
            entry_action: EntryAction::Sto,
            entry_date: NaiveDate::from_ymd_opt(2025, 2, 3).unwrap(),
            entry_price: dec!(1.2345),
            size: 2,
            direction: Direction::Long,
            notes: "first line\nsecond line".to_string(),
            tags: Tags::from_csv(tags),
            stop_price: Some(dec!(2.50)),
            target_price: None,
            exit: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_create_and_get_round_trip() {
        let db = db().await;
        let created = db.create(draft("SPY", "theta,earnings")).await.unwrap();
        assert!(created.id > 0);

        let loaded = db.get(created.id).await.unwrap().unwrap();
        assert_eq!(loaded.symbol, "SPY");
        assert_eq!(loaded.entry_price, dec!(1.2345));
        assert_eq!(loaded.stop_price, Some(dec!(2.50)));
        assert_eq!(loaded.target_price, None);
        assert_eq!(loaded.tags, Tags::from_csv("earnings, theta"));
        assert_eq!(loaded.notes, "first line\nsecond line");
        assert_eq!(loaded.direction, Direction::Long);
        assert_eq!(loaded.created_at, created.created_at);
        assert!(loaded.is_open());
    }

    #[tokio::test]
    async fn test_ids_are_unique() {
        let db = db().await;
        let a = db.create(draft("SPY", "")).await.unwrap();
        let b = db.create(draft("SPY", "")).await.unwrap();
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn test_update_persists_exit_and_status() {
        let db = db().await;
        let mut entry = db.create(draft("QQQ", "")).await.unwrap();
        entry.exit = Some(ExitFill {
            price: dec!(0.40),
            date: NaiveDate::from_ymd_opt(2025, 2, 20).unwrap(),
        });
        db.update(&entry).await.unwrap();

        let loaded = db.get(entry.id).await.unwrap().unwrap();
        assert_eq!(loaded.status(), EntryStatus::Closed);
        assert_eq!(loaded.exit_price(), Some(dec!(0.40)));

        let open = db.list(&EntryFilter::by_status(EntryStatus::Open)).await.unwrap();
        assert!(open.is_empty());
        let closed = db.list(&EntryFilter::by_status(EntryStatus::Closed)).await.unwrap();
        assert_eq!(closed.len(), 1);
        assert_eq!(db.count_by_status().await.unwrap(), (0, 1));
    }

    #[tokio::test]
    async fn test_update_unknown_id() {
        let db = db().await;
        let ghost = draft("SPY", "").with_id(404);
        assert!(matches!(db.update(&ghost).await, Err(JournalError::NotFound(404))));
    }

    #[tokio::test]
    async fn test_delete() {
        let db = db().await;
        let entry = db.create(draft("SPY", "")).await.unwrap();
        assert!(db.delete(entry.id).await.unwrap());
        assert!(!db.delete(entry.id).await.unwrap());
        assert!(db.get(entry.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_orders_newest_first_and_filters_tags() {
        let db = db().await;
        let mut older = draft("A", "theta");
        older.created_at = Utc::now() - chrono::Duration::days(2);
        let mut newer = draft("B", "theta,earnings");
        newer.created_at = Utc::now() - chrono::Duration::days(1);
        let untagged = draft("C", "");

        // Insertion order differs from creation order on purpose
        let newer = db.create(newer).await.unwrap();
        let untagged = db.create(untagged).await.unwrap();
        let older = db.create(older).await.unwrap();

        let all: Vec<_> = db
            .list(&EntryFilter::all())
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(all, vec![untagged.id, newer.id, older.id]);

        let theta: Vec<_> = db
            .list(&EntryFilter::by_tag("theta"))
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(theta, vec![newer.id, older.id]);
    }

    #[tokio::test]
    async fn test_corrupt_row_is_reported() {
        let db = db().await;
        let entry = db.create(draft("SPY", "")).await.unwrap();
        sqlx::query("UPDATE journal_entries SET entry_price = 'abc' WHERE id = ?")
            .bind(entry.id)
            .execute(&db.pool)
            .await
            .unwrap();

        let err = db.get(entry.id).await.unwrap_err();
        assert!(matches!(err, JournalError::CorruptRecord { .. }));
    }

    #[tokio::test]
    async fn test_out_of_range_amounts_are_corrupt() {
        let db = db().await;
        let entry = db.create(draft("SPY", "")).await.unwrap();
        sqlx::query(
            "UPDATE journal_entries SET status = 'closed', exit_price = '1000000000000000000000000000', exit_date = '2025-02-10' WHERE id = ?",
        )
        .bind(entry.id)
        .execute(&db.pool)
        .await
        .unwrap();

        let err = db.get(entry.id).await.unwrap_err();
        assert!(matches!(err, JournalError::CorruptRecord { id, .. } if id == entry.id));
        assert!(db.list(&EntryFilter::all()).await.is_err());
    }
}
