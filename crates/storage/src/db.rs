use chrono::NaiveDate;
use serde::Serialize;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Executor, Pool, Sqlite, SqliteConnection};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

use teller_core::{
    Account, AccountId, Record, RecordId, RecordSnapshot, RulePayload, SuggestionBatch,
    SuggestionStatus, VendorRule,
};

pub type DbPool = Pool<Sqlite>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("Corrupt rule payload for vendor {vendor_id}: {source}")]
    BadPayload {
        vendor_id: i64,
        source: serde_json::Error,
    },
    #[error("Corrupt record id list for suggestion {suggestion_id}: {source}")]
    BadRecordIds {
        suggestion_id: i64,
        source: serde_json::Error,
    },
    #[error("Unknown suggestion status '{value}' for suggestion {suggestion_id}")]
    BadStatus { suggestion_id: i64, value: String },
    #[error("Failed to encode {what}: {source}")]
    Encode {
        what: &'static str,
        source: serde_json::Error,
    },
}

pub async fn create_db(path: &Path) -> Result<DbPool, StoreError> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(&format!("sqlite:{}?mode=rwc", path.display()))
        .await?;

    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA cache_size = -32000")
        .execute(&pool)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS accounts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS transactions (
            id TEXT PRIMARY KEY,
            account_id INTEGER NOT NULL,
            date TEXT NOT NULL,
            description TEXT NOT NULL,
            amount_cents INTEGER NOT NULL,
            source_file TEXT NOT NULL,
            raw_data TEXT NOT NULL,
            vendor TEXT,
            category TEXT,
            project TEXT,
            auto_categorized INTEGER NOT NULL DEFAULT 0,
            cleaned INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            FOREIGN KEY (account_id) REFERENCES accounts(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS vendors (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            account_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            rule TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE (account_id, name),
            FOREIGN KEY (account_id) REFERENCES accounts(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS suggestions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            account_id INTEGER NOT NULL,
            vendor TEXT NOT NULL,
            category TEXT,
            project TEXT,
            matched_pattern TEXT NOT NULL,
            record_ids TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            FOREIGN KEY (account_id) REFERENCES accounts(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_transactions_account_date ON transactions(account_id, date)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_transactions_account_vendor ON transactions(account_id, vendor)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_suggestions_account_status ON suggestions(account_id, status)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

// ── Accounts ──────────────────────────────────────────────────────────────────

pub async fn create_account(pool: &DbPool, name: &str) -> Result<Account, StoreError> {
    let result = sqlx::query("INSERT INTO accounts (name) VALUES (?)")
        .bind(name)
        .execute(pool)
        .await?;
    let id = result.last_insert_rowid();

    get_account(pool, AccountId(id))
        .await?
        .ok_or(StoreError::Db(sqlx::Error::RowNotFound))
}

pub async fn get_account<'e, E>(ex: E, id: AccountId) -> Result<Option<Account>, StoreError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, (i64, String, String)>(
        "SELECT id, name, created_at FROM accounts WHERE id = ?",
    )
    .bind(id.0)
    .fetch_optional(ex)
    .await?;

    Ok(row.map(|r| Account {
        id: Some(AccountId(r.0)),
        name: r.1,
        created_at: Some(r.2),
    }))
}

/// Case-insensitive: inbox folder names resolve accounts regardless of casing.
pub async fn get_account_by_name(pool: &DbPool, name: &str) -> Result<Option<Account>, StoreError> {
    let row = sqlx::query_as::<_, (i64, String, String)>(
        "SELECT id, name, created_at FROM accounts WHERE name = ? COLLATE NOCASE",
    )
    .bind(name)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| Account {
        id: Some(AccountId(r.0)),
        name: r.1,
        created_at: Some(r.2),
    }))
}

pub async fn get_all_accounts(pool: &DbPool) -> Result<Vec<Account>, StoreError> {
    let rows = sqlx::query_as::<_, (i64, String, String)>(
        "SELECT id, name, created_at FROM accounts ORDER BY name",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| Account {
            id: Some(AccountId(r.0)),
            name: r.1,
            created_at: Some(r.2),
        })
        .collect())
}

// ── Records ───────────────────────────────────────────────────────────────────

/// Insert-side view of a record; raw_data is the JSON of the original CSV row.
#[derive(Debug)]
pub struct NewRecord<'a> {
    pub id: &'a RecordId,
    pub account_id: AccountId,
    pub date: NaiveDate,
    pub description: &'a str,
    pub amount_cents: i64,
    pub source_file: &'a str,
    pub raw_data: &'a str,
}

type RecordRow = (
    String,
    i64,
    NaiveDate,
    String,
    i64,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    i64,
    i64,
    String,
);

const RECORD_COLUMNS: &str = "id, account_id, date, description, amount_cents, source_file, \
     vendor, category, project, auto_categorized, cleaned, created_at";

fn record_from_row(r: RecordRow) -> Record {
    Record {
        id: RecordId(r.0),
        account_id: AccountId(r.1),
        date: r.2,
        description: r.3,
        amount_cents: r.4,
        source_file: r.5,
        vendor: r.6,
        category: r.7,
        project: r.8,
        auto_categorized: r.9 != 0,
        cleaned: r.10 != 0,
        created_at: Some(r.11),
    }
}

pub async fn record_exists(conn: &mut SqliteConnection, id: &RecordId) -> Result<bool, StoreError> {
    let row = sqlx::query_as::<_, (i64,)>("SELECT 1 FROM transactions WHERE id = ?")
        .bind(id.as_str())
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.is_some())
}

pub async fn insert_record(
    conn: &mut SqliteConnection,
    rec: NewRecord<'_>,
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO transactions (id, account_id, date, description, amount_cents, source_file, raw_data) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(rec.id.as_str())
    .bind(rec.account_id.0)
    .bind(rec.date)
    .bind(rec.description)
    .bind(rec.amount_cents)
    .bind(rec.source_file)
    .bind(rec.raw_data)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn get_record(
    conn: &mut SqliteConnection,
    id: &RecordId,
) -> Result<Option<Record>, StoreError> {
    let row = sqlx::query_as::<_, RecordRow>(&format!(
        "SELECT {RECORD_COLUMNS} FROM transactions WHERE id = ?"
    ))
    .bind(id.as_str())
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.map(record_from_row))
}

/// Persist the label/review fields of a record (identity fields never change).
pub async fn update_record(conn: &mut SqliteConnection, rec: &Record) -> Result<(), StoreError> {
    sqlx::query(
        "UPDATE transactions SET vendor = ?, category = ?, project = ?, auto_categorized = ?, cleaned = ? \
         WHERE id = ?",
    )
    .bind(&rec.vendor)
    .bind(&rec.category)
    .bind(&rec.project)
    .bind(rec.auto_categorized)
    .bind(rec.cleaned)
    .bind(rec.id.as_str())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub cleaned: Option<bool>,
    pub vendor: Option<String>,
    pub category: Option<String>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn list_records(
    pool: &DbPool,
    account_id: AccountId,
    filter: &RecordFilter,
) -> Result<Vec<Record>, StoreError> {
    let mut sql = format!("SELECT {RECORD_COLUMNS} FROM transactions WHERE account_id = ?");
    if filter.cleaned.is_some() {
        sql.push_str(" AND cleaned = ?");
    }
    if filter.vendor.is_some() {
        sql.push_str(" AND vendor = ?");
    }
    if filter.category.is_some() {
        sql.push_str(" AND category = ?");
    }
    if filter.date_from.is_some() {
        sql.push_str(" AND date >= ?");
    }
    if filter.date_to.is_some() {
        sql.push_str(" AND date <= ?");
    }
    sql.push_str(" ORDER BY date DESC, id LIMIT ? OFFSET ?");

    let mut q = sqlx::query_as::<_, RecordRow>(&sql).bind(account_id.0);
    if let Some(c) = filter.cleaned {
        q = q.bind(c);
    }
    if let Some(v) = &filter.vendor {
        q = q.bind(v);
    }
    if let Some(c) = &filter.category {
        q = q.bind(c);
    }
    if let Some(d) = filter.date_from {
        q = q.bind(d);
    }
    if let Some(d) = filter.date_to {
        q = q.bind(d);
    }
    q = q.bind(filter.limit.unwrap_or(500)).bind(filter.offset.unwrap_or(0));

    let rows = q.fetch_all(pool).await?;
    Ok(rows.into_iter().map(record_from_row).collect())
}

/// Apply one set of labels to many records, marking them auto-categorized.
/// Ids with no stored row are skipped; returns how many rows were updated.
pub async fn apply_labels(
    conn: &mut SqliteConnection,
    ids: &[RecordId],
    vendor: &str,
    category: Option<&str>,
    project: Option<&str>,
) -> Result<u64, StoreError> {
    let mut updated = 0;
    for id in ids {
        let result = sqlx::query(
            "UPDATE transactions SET vendor = ?, category = ?, project = ?, auto_categorized = 1 \
             WHERE id = ?",
        )
        .bind(vendor)
        .bind(category)
        .bind(project)
        .bind(id.as_str())
        .execute(&mut *conn)
        .await?;
        updated += result.rows_affected();
    }
    Ok(updated)
}

/// Put a record's labels back to a snapshot (undo). Returns false when the
/// record no longer exists.
pub async fn restore_record(
    conn: &mut SqliteConnection,
    snap: &RecordSnapshot,
) -> Result<bool, StoreError> {
    let result = sqlx::query(
        "UPDATE transactions SET vendor = ?, category = ?, project = ?, auto_categorized = ?, cleaned = ? \
         WHERE id = ?",
    )
    .bind(&snap.vendor)
    .bind(&snap.category)
    .bind(&snap.project)
    .bind(snap.auto_categorized)
    .bind(snap.cleaned)
    .bind(snap.id.as_str())
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// One vendor-labeled record, in insertion order. The rule builder's input.
#[derive(Debug, Clone)]
pub struct LabeledRecord {
    pub vendor: String,
    pub description: String,
    pub amount_cents: i64,
    pub category: Option<String>,
    pub project: Option<String>,
}

pub async fn labeled_records(
    conn: &mut SqliteConnection,
    account_id: AccountId,
) -> Result<Vec<LabeledRecord>, StoreError> {
    let rows = sqlx::query_as::<_, (String, String, i64, Option<String>, Option<String>)>(
        "SELECT vendor, description, amount_cents, category, project FROM transactions \
         WHERE account_id = ? AND vendor IS NOT NULL ORDER BY rowid",
    )
    .bind(account_id.0)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| LabeledRecord {
            vendor: r.0,
            description: r.1,
            amount_cents: r.2,
            category: r.3,
            project: r.4,
        })
        .collect())
}

// ── Vendors ───────────────────────────────────────────────────────────────────

type VendorRow = (i64, i64, String, Option<String>);

fn vendor_from_row(r: VendorRow) -> Result<VendorRule, StoreError> {
    let payload = match r.3 {
        Some(json) => Some(serde_json::from_str::<RulePayload>(&json).map_err(|source| {
            StoreError::BadPayload { vendor_id: r.0, source }
        })?),
        None => None,
    };
    Ok(VendorRule {
        id: Some(r.0),
        account_id: AccountId(r.1),
        name: r.2,
        payload,
    })
}

pub async fn vendors_for_account<'e, E>(
    ex: E,
    account_id: AccountId,
) -> Result<Vec<VendorRule>, StoreError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query_as::<_, VendorRow>(
        "SELECT id, account_id, name, rule FROM vendors WHERE account_id = ? ORDER BY name",
    )
    .bind(account_id.0)
    .fetch_all(ex)
    .await?;

    rows.into_iter().map(vendor_from_row).collect()
}

pub async fn get_vendor(
    conn: &mut SqliteConnection,
    account_id: AccountId,
    name: &str,
) -> Result<Option<VendorRule>, StoreError> {
    let row = sqlx::query_as::<_, VendorRow>(
        "SELECT id, account_id, name, rule FROM vendors WHERE account_id = ? AND name = ?",
    )
    .bind(account_id.0)
    .bind(name)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(vendor_from_row).transpose()
}

pub async fn get_vendor_by_id(
    conn: &mut SqliteConnection,
    vendor_id: i64,
) -> Result<Option<VendorRule>, StoreError> {
    let row = sqlx::query_as::<_, VendorRow>(
        "SELECT id, account_id, name, rule FROM vendors WHERE id = ?",
    )
    .bind(vendor_id)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(vendor_from_row).transpose()
}

/// Create the vendor row if it does not exist; returns its id either way.
pub async fn upsert_vendor(
    conn: &mut SqliteConnection,
    account_id: AccountId,
    name: &str,
) -> Result<i64, StoreError> {
    sqlx::query(
        "INSERT INTO vendors (account_id, name) VALUES (?, ?) \
         ON CONFLICT (account_id, name) DO NOTHING",
    )
    .bind(account_id.0)
    .bind(name)
    .execute(&mut *conn)
    .await?;

    let (id,): (i64,) =
        sqlx::query_as("SELECT id FROM vendors WHERE account_id = ? AND name = ?")
            .bind(account_id.0)
            .bind(name)
            .fetch_one(&mut *conn)
            .await?;
    Ok(id)
}

pub async fn set_vendor_payload(
    conn: &mut SqliteConnection,
    vendor_id: i64,
    payload: &RulePayload,
) -> Result<(), StoreError> {
    let json = serde_json::to_string(payload)
        .map_err(|source| StoreError::Encode { what: "rule payload", source })?;
    sqlx::query("UPDATE vendors SET rule = ? WHERE id = ?")
        .bind(json)
        .bind(vendor_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

// ── Suggestions ───────────────────────────────────────────────────────────────

type SuggestionRow = (
    i64,
    i64,
    String,
    Option<String>,
    Option<String>,
    String,
    String,
    String,
    String,
);

const SUGGESTION_COLUMNS: &str =
    "id, account_id, vendor, category, project, matched_pattern, record_ids, status, created_at";

fn suggestion_from_row(r: SuggestionRow) -> Result<SuggestionBatch, StoreError> {
    let record_ids: Vec<RecordId> = serde_json::from_str(&r.6)
        .map_err(|source| StoreError::BadRecordIds { suggestion_id: r.0, source })?;
    let status = SuggestionStatus::from_str(&r.7)
        .map_err(|_| StoreError::BadStatus { suggestion_id: r.0, value: r.7.clone() })?;
    Ok(SuggestionBatch {
        id: Some(r.0),
        account_id: AccountId(r.1),
        vendor: r.2,
        category: r.3,
        project: r.4,
        matched_pattern: r.5,
        record_ids,
        status,
        created_at: Some(r.8),
    })
}

pub async fn insert_suggestion(
    conn: &mut SqliteConnection,
    batch: &SuggestionBatch,
) -> Result<i64, StoreError> {
    let record_ids = serde_json::to_string(&batch.record_ids)
        .map_err(|source| StoreError::Encode { what: "record id list", source })?;
    let result = sqlx::query(
        "INSERT INTO suggestions (account_id, vendor, category, project, matched_pattern, record_ids, status) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(batch.account_id.0)
    .bind(&batch.vendor)
    .bind(&batch.category)
    .bind(&batch.project)
    .bind(&batch.matched_pattern)
    .bind(record_ids)
    .bind(batch.status.to_string())
    .execute(&mut *conn)
    .await?;
    Ok(result.last_insert_rowid())
}

pub async fn get_suggestion(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<Option<SuggestionBatch>, StoreError> {
    let row = sqlx::query_as::<_, SuggestionRow>(&format!(
        "SELECT {SUGGESTION_COLUMNS} FROM suggestions WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    row.map(suggestion_from_row).transpose()
}

pub async fn list_suggestions<'e, E>(
    ex: E,
    account_id: AccountId,
    status: Option<SuggestionStatus>,
) -> Result<Vec<SuggestionBatch>, StoreError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = match status {
        Some(st) => {
            sqlx::query_as::<_, SuggestionRow>(&format!(
                "SELECT {SUGGESTION_COLUMNS} FROM suggestions \
                 WHERE account_id = ? AND status = ? ORDER BY id"
            ))
            .bind(account_id.0)
            .bind(st.to_string())
            .fetch_all(ex)
            .await?
        }
        None => {
            sqlx::query_as::<_, SuggestionRow>(&format!(
                "SELECT {SUGGESTION_COLUMNS} FROM suggestions WHERE account_id = ? ORDER BY id"
            ))
            .bind(account_id.0)
            .fetch_all(ex)
            .await?
        }
    };

    rows.into_iter().map(suggestion_from_row).collect()
}

pub async fn set_suggestion_status(
    conn: &mut SqliteConnection,
    id: i64,
    status: SuggestionStatus,
) -> Result<(), StoreError> {
    sqlx::query("UPDATE suggestions SET status = ? WHERE id = ?")
        .bind(status.to_string())
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

// ── Facets and stats ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct Facets {
    pub vendors: Vec<String>,
    pub categories: Vec<String>,
}

pub async fn facets(pool: &DbPool, account_id: AccountId) -> Result<Facets, StoreError> {
    let vendors = sqlx::query_as::<_, (String,)>(
        "SELECT DISTINCT vendor FROM transactions \
         WHERE account_id = ? AND vendor IS NOT NULL ORDER BY vendor",
    )
    .bind(account_id.0)
    .fetch_all(pool)
    .await?;

    let categories = sqlx::query_as::<_, (String,)>(
        "SELECT DISTINCT category FROM transactions \
         WHERE account_id = ? AND category IS NOT NULL ORDER BY category",
    )
    .bind(account_id.0)
    .fetch_all(pool)
    .await?;

    Ok(Facets {
        vendors: vendors.into_iter().map(|r| r.0).collect(),
        categories: categories.into_iter().map(|r| r.0).collect(),
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub income_cents: i64,
    pub expense_cents: i64,
    pub net_cents: i64,
    pub record_count: i64,
    pub uncleaned_count: i64,
}

pub async fn stats_summary(pool: &DbPool, account_id: AccountId) -> Result<Summary, StoreError> {
    let row: (i64, i64, i64, i64, i64) = sqlx::query_as(
        "SELECT \
            COALESCE(SUM(CASE WHEN amount_cents > 0 THEN amount_cents ELSE 0 END), 0), \
            COALESCE(SUM(CASE WHEN amount_cents < 0 THEN -amount_cents ELSE 0 END), 0), \
            COALESCE(SUM(amount_cents), 0), \
            COUNT(*), \
            COALESCE(SUM(CASE WHEN cleaned = 0 THEN 1 ELSE 0 END), 0) \
         FROM transactions WHERE account_id = ?",
    )
    .bind(account_id.0)
    .fetch_one(pool)
    .await?;

    Ok(Summary {
        income_cents: row.0,
        expense_cents: row.1,
        net_cents: row.2,
        record_count: row.3,
        uncleaned_count: row.4,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> (tempfile::TempDir, DbPool) {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_db(&dir.path().join("test.db")).await.unwrap();
        (dir, pool)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn account_roundtrip_and_nocase_lookup() {
        let (_dir, pool) = test_db().await;
        let account = create_account(&pool, "Business Checking").await.unwrap();
        let id = account.id.unwrap();

        let by_id = get_account(&pool, id).await.unwrap().unwrap();
        assert_eq!(by_id.name, "Business Checking");

        let by_name = get_account_by_name(&pool, "business checking").await.unwrap();
        assert_eq!(by_name.unwrap().id, Some(id));

        assert!(get_account_by_name(&pool, "nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn record_insert_exists_get() {
        let (_dir, pool) = test_db().await;
        let account = create_account(&pool, "A").await.unwrap();
        let account_id = account.id.unwrap();
        let mut conn = pool.acquire().await.unwrap();

        let id = RecordId("abc-0".to_string());
        assert!(!record_exists(&mut conn, &id).await.unwrap());

        insert_record(
            &mut conn,
            NewRecord {
                id: &id,
                account_id,
                date: date(2024, 1, 15),
                description: "STARBUCKS",
                amount_cents: -450,
                source_file: "jan.csv",
                raw_data: "{}",
            },
        )
        .await
        .unwrap();

        assert!(record_exists(&mut conn, &id).await.unwrap());
        let rec = get_record(&mut conn, &id).await.unwrap().unwrap();
        assert_eq!(rec.description, "STARBUCKS");
        assert_eq!(rec.amount_cents, -450);
        assert!(!rec.auto_categorized);
        assert!(!rec.cleaned);
    }

    #[tokio::test]
    async fn list_records_applies_filters() {
        let (_dir, pool) = test_db().await;
        let account = create_account(&pool, "A").await.unwrap();
        let account_id = account.id.unwrap();
        let mut conn = pool.acquire().await.unwrap();

        for (i, (desc, cents)) in [("STARBUCKS", -450), ("PAYROLL", 100_000)].iter().enumerate() {
            let id = RecordId(format!("r{i}-0"));
            insert_record(
                &mut conn,
                NewRecord {
                    id: &id,
                    account_id,
                    date: date(2024, 1, 15 + i as u32),
                    description: desc,
                    amount_cents: *cents,
                    source_file: "jan.csv",
                    raw_data: "{}",
                },
            )
            .await
            .unwrap();
        }

        let mut rec = get_record(&mut conn, &RecordId("r0-0".into())).await.unwrap().unwrap();
        rec.vendor = Some("Starbucks".to_string());
        update_record(&mut conn, &rec).await.unwrap();
        drop(conn);

        let all = list_records(&pool, account_id, &RecordFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);
        // Newest first.
        assert_eq!(all[0].description, "PAYROLL");

        let filter = RecordFilter { vendor: Some("Starbucks".into()), ..Default::default() };
        let starbucks = list_records(&pool, account_id, &filter).await.unwrap();
        assert_eq!(starbucks.len(), 1);

        let filter = RecordFilter { date_to: Some(date(2024, 1, 15)), ..Default::default() };
        let early = list_records(&pool, account_id, &filter).await.unwrap();
        assert_eq!(early.len(), 1);
        assert_eq!(early[0].description, "STARBUCKS");
    }

    #[tokio::test]
    async fn vendor_upsert_is_idempotent() {
        let (_dir, pool) = test_db().await;
        let account = create_account(&pool, "A").await.unwrap();
        let account_id = account.id.unwrap();
        let mut conn = pool.acquire().await.unwrap();

        let a = upsert_vendor(&mut conn, account_id, "Starbucks").await.unwrap();
        let b = upsert_vendor(&mut conn, account_id, "Starbucks").await.unwrap();
        assert_eq!(a, b);

        let payload = RulePayload {
            patterns: vec!["STARBUCKS".to_string()],
            category: Some("Coffee".to_string()),
            project: None,
            by_sign: None,
            enabled: true,
            assigned_count: 4,
            corrected_count: 0,
            confidence: 1.0,
        };
        set_vendor_payload(&mut conn, a, &payload).await.unwrap();

        let vendor = get_vendor(&mut conn, account_id, "Starbucks").await.unwrap().unwrap();
        assert_eq!(vendor.payload.as_ref().unwrap().patterns, vec!["STARBUCKS"]);
        drop(conn);

        let vendors = vendors_for_account(&pool, account_id).await.unwrap();
        assert_eq!(vendors.len(), 1);
        assert_eq!(vendors[0].payload, Some(payload));
    }

    #[tokio::test]
    async fn corrupt_vendor_payload_is_reported() {
        let (_dir, pool) = test_db().await;
        let account = create_account(&pool, "A").await.unwrap();
        let account_id = account.id.unwrap();
        let mut conn = pool.acquire().await.unwrap();

        let id = upsert_vendor(&mut conn, account_id, "Broken").await.unwrap();
        sqlx::query("UPDATE vendors SET rule = 'not json' WHERE id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await
            .unwrap();
        drop(conn);

        let err = vendors_for_account(&pool, account_id).await.unwrap_err();
        assert!(matches!(err, StoreError::BadPayload { vendor_id, .. } if vendor_id == id));
    }

    #[tokio::test]
    async fn suggestion_roundtrip_and_status() {
        let (_dir, pool) = test_db().await;
        let account = create_account(&pool, "A").await.unwrap();
        let account_id = account.id.unwrap();
        let mut conn = pool.acquire().await.unwrap();

        let batch = SuggestionBatch {
            id: None,
            account_id,
            vendor: "Starbucks".to_string(),
            category: Some("Coffee".to_string()),
            project: None,
            matched_pattern: "STARBUCKS".to_string(),
            record_ids: vec![RecordId("a-0".into()), RecordId("b-0".into())],
            status: SuggestionStatus::Pending,
            created_at: None,
        };
        let id = insert_suggestion(&mut conn, &batch).await.unwrap();

        let stored = get_suggestion(&mut conn, id).await.unwrap().unwrap();
        assert_eq!(stored.record_ids.len(), 2);
        assert_eq!(stored.status, SuggestionStatus::Pending);

        set_suggestion_status(&mut conn, id, SuggestionStatus::Approved).await.unwrap();
        let stored = get_suggestion(&mut conn, id).await.unwrap().unwrap();
        assert_eq!(stored.status, SuggestionStatus::Approved);
        drop(conn);

        let pending =
            list_suggestions(&pool, account_id, Some(SuggestionStatus::Pending)).await.unwrap();
        assert!(pending.is_empty());
        let all = list_suggestions(&pool, account_id, None).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn summary_and_facets() {
        let (_dir, pool) = test_db().await;
        let account = create_account(&pool, "A").await.unwrap();
        let account_id = account.id.unwrap();
        let mut conn = pool.acquire().await.unwrap();

        for (i, cents) in [-450i64, -1200, 5000].iter().enumerate() {
            let id = RecordId(format!("s{i}-0"));
            insert_record(
                &mut conn,
                NewRecord {
                    id: &id,
                    account_id,
                    date: date(2024, 2, 1),
                    description: "X",
                    amount_cents: *cents,
                    source_file: "feb.csv",
                    raw_data: "{}",
                },
            )
            .await
            .unwrap();
        }
        let mut rec = get_record(&mut conn, &RecordId("s0-0".into())).await.unwrap().unwrap();
        rec.vendor = Some("Starbucks".to_string());
        rec.category = Some("Coffee".to_string());
        update_record(&mut conn, &rec).await.unwrap();
        drop(conn);

        let summary = stats_summary(&pool, account_id).await.unwrap();
        assert_eq!(summary.income_cents, 5000);
        assert_eq!(summary.expense_cents, 1650);
        assert_eq!(summary.net_cents, 3350);
        assert_eq!(summary.record_count, 3);
        assert_eq!(summary.uncleaned_count, 3);

        let f = facets(&pool, account_id).await.unwrap();
        assert_eq!(f.vendors, vec!["Starbucks"]);
        assert_eq!(f.categories, vec!["Coffee"]);
    }
}
