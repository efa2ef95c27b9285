//! SQLite-backed store.
//!
//! The public API is synchronous. Each store owns a small tokio runtime and blocks on
//! it per statement, so it must not be called from inside another tokio runtime.
//!
//! ## Transactions
//!
//! Writes run under `BEGIN IMMEDIATE`, which takes the database write lock up front;
//! reads run under a deferred `BEGIN` and see one consistent WAL snapshot. Waiting is
//! bounded by `busy_timeout` (database lock) and the pool's `acquire_timeout`.
//!
//! ## Error mapping
//!
//! | Situation | InventoryError |
//! |-----------|----------------|
//! | unique violation on `products.code` | `DuplicateKey` |
//! | unique violation on `ledger_entries.seq` | `Conflict` |
//! | pool timeout, busy database, I/O, anything else | `StoreUnavailable` |
//! | undecodable row | `StoreUnavailable` |

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
    SqliteRow,
};
use sqlx::Row;
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

use stockbook_catalog::{Product, ProductReader, ProductStatus, ProductWriter};
use stockbook_core::{
    InventoryError, InventoryResult, Money, ProductCode, SequenceNumber, TimeRange, UserId,
};
use stockbook_ledger::{
    EntryReader, EntrySource, EntryWriter, LedgerEntry, MovementTotals, Reason,
};

use super::{InventoryStore, StoreRead, StoreWrite, page_in_read};

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_CONNECTIONS: u32 = 4;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS products (
        code        TEXT    PRIMARY KEY NOT NULL,
        name        TEXT    NOT NULL,
        category    TEXT    NULL,
        price_minor INTEGER NOT NULL CHECK (price_minor >= 0),
        quantity    INTEGER NOT NULL,
        status      TEXT    NOT NULL,
        created_at  INTEGER NOT NULL,
        updated_at  INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS ledger_entries (
        seq              INTEGER PRIMARY KEY NOT NULL,
        product_code     TEXT    NOT NULL REFERENCES products (code),
        delta            INTEGER NOT NULL CHECK (delta <> 0),
        reason           TEXT    NOT NULL,
        unit_price_minor INTEGER NOT NULL,
        recorded_at      INTEGER NOT NULL,
        recorded_by      TEXT    NOT NULL,
        note             TEXT    NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS ledger_entries_product_seq ON ledger_entries (product_code, seq)",
    "CREATE INDEX IF NOT EXISTS ledger_entries_recorded_at ON ledger_entries (recorded_at)",
    r#"
    CREATE TRIGGER IF NOT EXISTS ledger_entries_no_update
    BEFORE UPDATE ON ledger_entries
    BEGIN
        SELECT RAISE(ABORT, 'ledger entries are immutable');
    END
    "#,
    r#"
    CREATE TRIGGER IF NOT EXISTS ledger_entries_no_delete
    BEFORE DELETE ON ledger_entries
    BEGIN
        SELECT RAISE(ABORT, 'ledger entries are immutable');
    END
    "#,
];

const ENTRY_COLUMNS: &str =
    "seq, product_code, delta, reason, unit_price_minor, recorded_at, recorded_by, note";

/// SQLite-backed store. `Send + Sync`; share it behind an `Arc`.
#[derive(Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
    rt: Runtime,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `url`, e.g. `sqlite://stock.db`.
    pub fn open(url: &str, lock_timeout: Duration) -> InventoryResult<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| map_sqlx_error("parse database url", e))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(lock_timeout)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(lock_timeout);

        Self::connect(options, pool)
    }

    /// A private in-memory database on a single pinned connection.
    pub fn open_in_memory() -> InventoryResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| map_sqlx_error("parse database url", e))?
            .busy_timeout(DEFAULT_LOCK_TIMEOUT)
            .foreign_keys(true);
        // The database lives as long as its one connection does.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .acquire_timeout(DEFAULT_LOCK_TIMEOUT);

        Self::connect(options, pool)
    }

    fn connect(options: SqliteConnectOptions, pool: SqlitePoolOptions) -> InventoryResult<Self> {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("stockbook-sqlite")
            .enable_all()
            .build()
            .map_err(|e| InventoryError::unavailable(format!("failed to start sqlite runtime: {e}")))?;

        let pool = rt
            .block_on(async {
                let pool = pool.connect_with(options).await?;
                for statement in SCHEMA {
                    sqlx::query(*statement).execute(&pool).await?;
                }
                Ok::<_, sqlx::Error>(pool)
            })
            .map_err(|e| map_sqlx_error("open", e))?;

        info!("sqlite store ready");
        Ok(Self { pool, rt })
    }

    fn acquire(&self) -> InventoryResult<sqlx::pool::PoolConnection<sqlx::Sqlite>> {
        self.rt
            .block_on(self.pool.acquire())
            .map_err(|e| map_sqlx_error("acquire connection", e))
    }

    fn exec(&self, conn: &mut SqliteConnection, sql: &str) -> InventoryResult<()> {
        self.rt
            .block_on(sqlx::query(sql).execute(&mut *conn))
            .map(|_| ())
            .map_err(|e| map_sqlx_error(sql, e))
    }

    /// Run `op` between `begin` and COMMIT, rolling back on any error.
    fn transaction<R>(
        &self,
        begin: &str,
        op: impl FnOnce(&mut SqliteTx<'_>) -> InventoryResult<R>,
    ) -> InventoryResult<R> {
        // Returning a connection to the pool spawns onto the runtime, so the guard
        // has to outlive `conn`.
        let _rt = self.rt.enter();
        let mut conn = self.acquire()?;
        self.exec(&mut conn, begin)?;

        let result = op(&mut SqliteTx {
            rt: &self.rt,
            conn: &mut *conn,
        });

        match result {
            Ok(out) => match self.exec(&mut conn, "COMMIT") {
                Ok(()) => {
                    debug!(begin, "sqlite transaction committed");
                    Ok(out)
                }
                Err(err) => {
                    self.rollback(&mut conn);
                    Err(err)
                }
            },
            Err(err) => {
                self.rollback(&mut conn);
                debug!(begin, error = %err, "sqlite transaction rolled back");
                Err(err)
            }
        }
    }

    fn rollback(&self, conn: &mut sqlx::pool::PoolConnection<sqlx::Sqlite>) {
        if let Err(err) = self.exec(conn, "ROLLBACK") {
            // A connection stuck mid-transaction must not go back to the pool.
            warn!(error = %err, "rollback failed; discarding connection");
            conn.close_on_drop();
        }
    }
}

impl Drop for SqliteStore {
    fn drop(&mut self) {
        self.rt.block_on(self.pool.close());
    }
}

impl InventoryStore for SqliteStore {
    fn read<R, F>(&self, op: F) -> InventoryResult<R>
    where
        F: FnOnce(&mut dyn StoreRead) -> InventoryResult<R>,
    {
        self.transaction("BEGIN", |tx| op(tx))
    }

    fn write<R, F>(&self, op: F) -> InventoryResult<R>
    where
        F: FnOnce(&mut dyn StoreWrite) -> InventoryResult<R>,
    {
        self.transaction("BEGIN IMMEDIATE", |tx| op(tx))
    }
}

impl EntrySource for SqliteStore {
    fn entry_page(
        &self,
        code: &ProductCode,
        range: Option<&TimeRange>,
        after: Option<SequenceNumber>,
        limit: usize,
    ) -> InventoryResult<Vec<LedgerEntry>> {
        page_in_read(self, code, range, after, limit)
    }
}

/// An open transaction on one pooled connection.
struct SqliteTx<'c> {
    rt: &'c Runtime,
    conn: &'c mut SqliteConnection,
}

impl ProductReader for SqliteTx<'_> {
    fn product(&mut self, code: &ProductCode) -> InventoryResult<Option<Product>> {
        let row = self
            .rt
            .block_on(
                sqlx::query(
                    r#"
                    SELECT code, name, category, price_minor, quantity, status, created_at, updated_at
                    FROM products
                    WHERE code = ?1
                    "#,
                )
                .bind(code.as_str())
                .fetch_optional(&mut *self.conn),
            )
            .map_err(|e| map_sqlx_error("load product", e))?;

        row.as_ref().map(product_from_row).transpose()
    }

    fn products(&mut self) -> InventoryResult<Vec<Product>> {
        let rows = self
            .rt
            .block_on(
                sqlx::query(
                    r#"
                    SELECT code, name, category, price_minor, quantity, status, created_at, updated_at
                    FROM products
                    ORDER BY code ASC
                    "#,
                )
                .fetch_all(&mut *self.conn),
            )
            .map_err(|e| map_sqlx_error("list products", e))?;

        rows.iter().map(product_from_row).collect()
    }

    fn ledger_references(&mut self, code: &ProductCode) -> InventoryResult<u64> {
        let count: i64 = self
            .rt
            .block_on(
                sqlx::query_scalar("SELECT COUNT(*) FROM ledger_entries WHERE product_code = ?1")
                    .bind(code.as_str())
                    .fetch_one(&mut *self.conn),
            )
            .map_err(|e| map_sqlx_error("count ledger references", e))?;
        Ok(count.max(0) as u64)
    }
}

impl ProductWriter for SqliteTx<'_> {
    fn insert_product(&mut self, product: &Product) -> InventoryResult<()> {
        let created_at = to_nanos(product.created_at)?;
        let updated_at = to_nanos(product.updated_at)?;
        let result = self.rt.block_on(
            sqlx::query(
                r#"
                INSERT INTO products
                    (code, name, category, price_minor, quantity, status, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )
            .bind(product.code.as_str())
            .bind(&product.name)
            .bind(product.category.as_deref())
            .bind(product.price.minor())
            .bind(product.quantity)
            .bind(product.status.as_str())
            .bind(created_at)
            .bind(updated_at)
            .execute(&mut *self.conn),
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(InventoryError::duplicate_key(product.code.as_str())),
            Err(e) => Err(map_sqlx_error("insert product", e)),
        }
    }

    fn update_product(&mut self, product: &Product) -> InventoryResult<()> {
        let updated_at = to_nanos(product.updated_at)?;
        let done = self
            .rt
            .block_on(
                sqlx::query(
                    r#"
                    UPDATE products
                    SET name = ?2, category = ?3, price_minor = ?4, quantity = ?5,
                        status = ?6, updated_at = ?7
                    WHERE code = ?1
                    "#,
                )
                .bind(product.code.as_str())
                .bind(&product.name)
                .bind(product.category.as_deref())
                .bind(product.price.minor())
                .bind(product.quantity)
                .bind(product.status.as_str())
                .bind(updated_at)
                .execute(&mut *self.conn),
            )
            .map_err(|e| map_sqlx_error("update product", e))?;

        if done.rows_affected() == 0 {
            return Err(InventoryError::not_found(format!("product '{}'", product.code)));
        }
        Ok(())
    }

    fn remove_product(&mut self, code: &ProductCode) -> InventoryResult<()> {
        self.rt
            .block_on(
                sqlx::query("DELETE FROM products WHERE code = ?1")
                    .bind(code.as_str())
                    .execute(&mut *self.conn),
            )
            .map_err(|e| map_sqlx_error("delete product", e))?;
        Ok(())
    }
}

impl EntryReader for SqliteTx<'_> {
    fn entries_for(
        &mut self,
        code: &ProductCode,
        range: Option<&TimeRange>,
        after: Option<SequenceNumber>,
        limit: usize,
    ) -> InventoryResult<Vec<LedgerEntry>> {
        let sql = format!(
            r#"
            SELECT {ENTRY_COLUMNS}
            FROM ledger_entries
            WHERE product_code = ?1
              AND seq > ?2
              AND (?3 IS NULL OR recorded_at >= ?3)
              AND (?4 IS NULL OR recorded_at < ?4)
            ORDER BY seq ASC
            LIMIT ?5
            "#
        );
        let rows = self
            .rt
            .block_on(
                sqlx::query(&sql)
                    .bind(code.as_str())
                    .bind(after.map_or(0, seq_to_sql))
                    .bind(range.map(|r| to_nanos_bound(r.start())))
                    .bind(range.map(|r| to_nanos_bound(r.end())))
                    .bind(i64::try_from(limit).unwrap_or(i64::MAX))
                    .fetch_all(&mut *self.conn),
            )
            .map_err(|e| map_sqlx_error("load ledger page", e))?;

        rows.iter().map(entry_from_row).collect()
    }

    fn entries_between(
        &mut self,
        range: &TimeRange,
        product: Option<&ProductCode>,
    ) -> InventoryResult<Vec<LedgerEntry>> {
        let sql = format!(
            r#"
            SELECT {ENTRY_COLUMNS}
            FROM ledger_entries
            WHERE recorded_at >= ?1
              AND recorded_at < ?2
              AND (?3 IS NULL OR product_code = ?3)
            ORDER BY seq ASC
            "#
        );
        let rows = self
            .rt
            .block_on(
                sqlx::query(&sql)
                    .bind(to_nanos_bound(range.start()))
                    .bind(to_nanos_bound(range.end()))
                    .bind(product.map(ProductCode::as_str))
                    .fetch_all(&mut *self.conn),
            )
            .map_err(|e| map_sqlx_error("load ledger range", e))?;

        rows.iter().map(entry_from_row).collect()
    }

    fn totals_before(
        &mut self,
        at: DateTime<Utc>,
        product: Option<&ProductCode>,
    ) -> InventoryResult<MovementTotals> {
        // Folded here rather than with SUM(), which raises on integer overflow.
        let rows = self
            .rt
            .block_on(
                sqlx::query(
                    r#"
                    SELECT delta, unit_price_minor
                    FROM ledger_entries
                    WHERE recorded_at < ?1
                      AND (?2 IS NULL OR product_code = ?2)
                    "#,
                )
                .bind(to_nanos_bound(at))
                .bind(product.map(ProductCode::as_str))
                .fetch_all(&mut *self.conn),
            )
            .map_err(|e| map_sqlx_error("sum ledger", e))?;

        let mut totals = MovementTotals::default();
        for row in rows {
            let delta: i64 = row.try_get("delta").map_err(|e| map_sqlx_error("decode totals", e))?;
            let price: i64 = row.try_get("unit_price_minor").map_err(|e| map_sqlx_error("decode totals", e))?;
            totals.include(delta, i128::from(delta) * i128::from(price))?;
        }
        Ok(totals)
    }
}

impl EntryWriter for SqliteTx<'_> {
    fn next_sequence(&mut self) -> InventoryResult<SequenceNumber> {
        let last: i64 = self
            .rt
            .block_on(
                sqlx::query_scalar("SELECT COALESCE(MAX(seq), 0) FROM ledger_entries")
                    .fetch_one(&mut *self.conn),
            )
            .map_err(|e| map_sqlx_error("next sequence", e))?;
        Ok(SequenceNumber::new(last.max(0) as u64 + 1))
    }

    fn insert_entry(&mut self, entry: &LedgerEntry) -> InventoryResult<()> {
        let recorded_at = to_nanos(entry.recorded_at)?;
        let result = self.rt.block_on(
            sqlx::query(
                r#"
                INSERT INTO ledger_entries
                    (seq, product_code, delta, reason, unit_price_minor, recorded_at, recorded_by, note)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )
            .bind(seq_to_sql(entry.sequence))
            .bind(entry.product_code.as_str())
            .bind(entry.delta)
            .bind(entry.reason.as_str())
            .bind(entry.unit_price.minor())
            .bind(recorded_at)
            .bind(entry.recorded_by.to_string())
            .bind(entry.note.as_deref())
            .execute(&mut *self.conn),
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(InventoryError::conflict(format!(
                "ledger sequence {} already taken",
                entry.sequence
            ))),
            Err(e) => Err(map_sqlx_error("insert ledger entry", e)),
        }
    }
}

fn seq_to_sql(seq: SequenceNumber) -> i64 {
    i64::try_from(seq.value()).unwrap_or(i64::MAX)
}

fn corrupt(what: &str, detail: impl core::fmt::Display) -> InventoryError {
    InventoryError::unavailable(format!("corrupt {what} row: {detail}"))
}

/// Timestamps are stored as nanoseconds since the epoch, which covers 1677 to 2262.
fn to_nanos(at: DateTime<Utc>) -> InventoryResult<i64> {
    at.timestamp_nanos_opt()
        .ok_or_else(|| InventoryError::invalid_field("timestamp", format!("{at} is outside the storable range")))
}

/// A range bound past the storable range still compares correctly once clamped.
fn to_nanos_bound(at: DateTime<Utc>) -> i64 {
    at.timestamp_nanos_opt()
        .unwrap_or(if at.timestamp() < 0 { i64::MIN } else { i64::MAX })
}

fn from_nanos(nanos: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_nanos(nanos)
}

fn product_from_row(row: &SqliteRow) -> InventoryResult<Product> {
    let decode = |e: sqlx::Error| map_sqlx_error("decode product", e);

    let code: String = row.try_get("code").map_err(decode)?;
    let status: String = row.try_get("status").map_err(decode)?;
    let price: i64 = row.try_get("price_minor").map_err(decode)?;

    Ok(Product {
        code: ProductCode::new(code).map_err(|e| corrupt("product", e))?,
        name: row.try_get("name").map_err(decode)?,
        category: row.try_get("category").map_err(decode)?,
        price: Money::from_minor(price),
        quantity: row.try_get("quantity").map_err(decode)?,
        status: ProductStatus::from_str(&status).map_err(|e| corrupt("product", e))?,
        created_at: from_nanos(row.try_get("created_at").map_err(decode)?),
        updated_at: from_nanos(row.try_get("updated_at").map_err(decode)?),
    })
}

fn entry_from_row(row: &SqliteRow) -> InventoryResult<LedgerEntry> {
    let decode = |e: sqlx::Error| map_sqlx_error("decode ledger entry", e);

    let seq: i64 = row.try_get("seq").map_err(decode)?;
    let code: String = row.try_get("product_code").map_err(decode)?;
    let reason: String = row.try_get("reason").map_err(decode)?;
    let price: i64 = row.try_get("unit_price_minor").map_err(decode)?;
    let recorded_by: String = row.try_get("recorded_by").map_err(decode)?;

    Ok(LedgerEntry {
        sequence: SequenceNumber::new(u64::try_from(seq).map_err(|e| corrupt("ledger entry", e))?),
        product_code: ProductCode::new(code).map_err(|e| corrupt("ledger entry", e))?,
        delta: row.try_get("delta").map_err(decode)?,
        reason: Reason::from_str(&reason).map_err(|e| corrupt("ledger entry", e))?,
        unit_price: Money::from_minor(price),
        recorded_at: from_nanos(row.try_get("recorded_at").map_err(decode)?),
        recorded_by: UserId::from_str(&recorded_by).map_err(|e| corrupt("ledger entry", e))?,
        note: row.try_get("note").map_err(decode)?,
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> InventoryError {
    match err {
        sqlx::Error::PoolTimedOut => {
            warn!(operation, "timed out waiting for a database connection");
            InventoryError::unavailable(format!("{operation}: timed out waiting for a database connection"))
        }
        sqlx::Error::PoolClosed => InventoryError::unavailable(format!("{operation}: connection pool closed")),
        sqlx::Error::Database(db_err) => {
            InventoryError::unavailable(format!("database error in {operation}: {}", db_err.message()))
        }
        other => InventoryError::unavailable(format!("sqlx error in {operation}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration as ChronoDuration, TimeZone};
    use stockbook_catalog::{NewProduct, create_product, delete_product, get_product};
    use stockbook_ledger::{Movement, append, recompute};

    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 8, 30, 0).unwrap()
    }

    fn code(s: &str) -> ProductCode {
        ProductCode::new(s).unwrap()
    }

    fn widget(c: &str, price_minor: i64) -> NewProduct {
        NewProduct {
            code: code(c),
            name: "Widget".to_string(),
            price: Money::from_minor(price_minor),
            category: Some("Tools".to_string()),
        }
    }

    #[test]
    fn products_round_trip_through_sqlite() {
        let store = SqliteStore::open_in_memory().unwrap();
        let created = store.write(|tx| create_product(tx, widget("SKU1", 999), t0())).unwrap();

        let loaded = store.read(|tx| get_product(tx, &code("SKU1"))).unwrap();
        assert_eq!(loaded, created);

        let err = store.write(|tx| create_product(tx, widget("SKU1", 1), t0())).unwrap_err();
        assert!(matches!(err, InventoryError::DuplicateKey(_)));
    }

    #[test]
    fn append_and_replay() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.write(|tx| create_product(tx, widget("SKU1", 250), t0())).unwrap();
        let user = UserId::new();

        store
            .write(|tx| append(tx, Movement::new(code("SKU1"), 10, Reason::Receipt).with_note("first delivery"), user, t0()))
            .unwrap();
        let sale = store
            .write(|tx| append(tx, Movement::new(code("SKU1"), -3, Reason::Sale), user, t0() + ChronoDuration::minutes(5)))
            .unwrap();

        assert_eq!(sale.sequence.value(), 2);
        let page = store.entry_page(&code("SKU1"), None, None, 10).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].note.as_deref(), Some("first delivery"));
        assert_eq!(page[0].recorded_by, user);
        assert_eq!(page[1].recorded_at, t0() + ChronoDuration::minutes(5));

        let qty = store.read(|tx| recompute(tx, &code("SKU1"), 1)).unwrap();
        assert_eq!(qty, 7);

        let totals = store
            .read(|tx| tx.totals_before(t0() + ChronoDuration::hours(1), Some(&code("SKU1"))))
            .unwrap();
        assert_eq!(totals.units, 7);
        assert_eq!(totals.value_minor, 7 * 250);
    }

    #[test]
    fn failed_write_rolls_back_both_tables() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.write(|tx| create_product(tx, widget("SKU1", 100), t0())).unwrap();

        let err = store
            .write(|tx| {
                append(tx, Movement::new(code("SKU1"), 4, Reason::Receipt), UserId::new(), t0())?;
                Err::<(), _>(InventoryError::conflict("abort"))
            })
            .unwrap_err();
        assert!(matches!(err, InventoryError::Conflict(_)));

        let (qty, refs) = store
            .read(|tx| Ok((get_product(tx, &code("SKU1"))?.quantity, tx.ledger_references(&code("SKU1"))?)))
            .unwrap();
        assert_eq!((qty, refs), (0, 0));
    }

    #[test]
    fn referenced_products_cannot_be_deleted() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.write(|tx| create_product(tx, widget("SKU1", 100), t0())).unwrap();
        store
            .write(|tx| append(tx, Movement::new(code("SKU1"), 1, Reason::Receipt), UserId::new(), t0()))
            .unwrap();

        let err = store.write(|tx| delete_product(tx, &code("SKU1"))).unwrap_err();
        assert!(matches!(err, InventoryError::Conflict(_)));
    }

    #[test]
    fn connections_go_back_to_the_pool() {
        // A single pinned connection: each transaction must hand it back.
        let store = SqliteStore::open_in_memory().unwrap();
        for i in 0..5 {
            store.write(|tx| create_product(tx, widget(&format!("SKU{i}"), 100), t0())).unwrap();
            store.read(|tx| get_product(tx, &code(&format!("SKU{i}")))).unwrap();
        }
        assert_eq!(store.read(|tx| tx.products()).unwrap().len(), 5);
    }

    #[test]
    fn timestamps_keep_nanoseconds() {
        let store = SqliteStore::open_in_memory().unwrap();
        let at = t0() + ChronoDuration::nanoseconds(1_500);

        let created = store.write(|tx| create_product(tx, widget("SKU1", 100), at)).unwrap();
        assert_eq!(store.read(|tx| get_product(tx, &code("SKU1"))).unwrap(), created);

        let entry = store
            .write(|tx| append(tx, Movement::new(code("SKU1"), 2, Reason::Receipt), UserId::new(), at))
            .unwrap();
        let exact = TimeRange::new(at, at + ChronoDuration::nanoseconds(1)).unwrap();
        assert_eq!(store.entry_page(&code("SKU1"), Some(&exact), None, 10).unwrap(), vec![entry]);

        let before = TimeRange::new(t0(), at).unwrap();
        assert!(store.entry_page(&code("SKU1"), Some(&before), None, 10).unwrap().is_empty());
    }

    #[test]
    fn ledger_rows_are_append_only() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.write(|tx| create_product(tx, widget("SKU1", 100), t0())).unwrap();
        store
            .write(|tx| append(tx, Movement::new(code("SKU1"), 3, Reason::Receipt), UserId::new(), t0()))
            .unwrap();

        for sql in ["UPDATE ledger_entries SET delta = 99", "DELETE FROM ledger_entries"] {
            let err = store.rt.block_on(sqlx::query(sql).execute(&store.pool)).unwrap_err();
            assert!(err.to_string().contains("ledger entries are immutable"), "{sql}: {err}");
        }

        let page = store.entry_page(&code("SKU1"), None, None, 10).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].delta, 3);
    }

    #[test]
    fn busy_database_is_unavailable() {
        let dir = tempfile::TempDir::new().unwrap();
        let url = format!("sqlite://{}", dir.path().join("stock.db").display());
        let holder = SqliteStore::open(&url, Duration::from_millis(100)).unwrap();
        let contender = SqliteStore::open(&url, Duration::from_millis(100)).unwrap();

        let _rt = holder.rt.enter();
        let mut conn = holder.rt.block_on(holder.pool.acquire()).unwrap();
        holder.rt.block_on(sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn)).unwrap();

        let err = contender.write(|tx| create_product(tx, widget("SKU1", 100), t0())).unwrap_err();
        assert!(matches!(err, InventoryError::StoreUnavailable(_)), "{err:?}");
        assert!(err.is_retryable());

        holder.rt.block_on(sqlx::query("ROLLBACK").execute(&mut *conn)).unwrap();
        drop(conn);

        contender.write(|tx| create_product(tx, widget("SKU1", 100), t0())).unwrap();
    }

    #[test]
    fn ledger_totals_report_overflow_as_invalid() {
        let store = SqliteStore::open_in_memory().unwrap();
        for c in ["A", "B"] {
            store.write(|tx| create_product(tx, widget(c, 1), t0())).unwrap();
            store
                .write(|tx| append(tx, Movement::new(code(c), i64::MAX, Reason::Receipt), UserId::new(), t0()))
                .unwrap();
        }

        let err = store
            .read(|tx| tx.totals_before(t0() + ChronoDuration::hours(1), None))
            .unwrap_err();
        assert!(matches!(err, InventoryError::InvalidField { field: "units", .. }), "{err:?}");
    }

    #[test]
    fn file_database_survives_reopen() {
        let dir = tempfile::TempDir::new().unwrap();
        let url = format!("sqlite://{}", dir.path().join("stock.db").display());

        {
            let store = SqliteStore::open(&url, Duration::from_millis(500)).unwrap();
            store.write(|tx| create_product(tx, widget("SKU1", 100), t0())).unwrap();
            store
                .write(|tx| append(tx, Movement::new(code("SKU1"), 6, Reason::Receipt), UserId::new(), t0()))
                .unwrap();
        }

        let store = SqliteStore::open(&url, Duration::from_millis(500)).unwrap();
        let product = store.read(|tx| get_product(tx, &code("SKU1"))).unwrap();
        assert_eq!(product.quantity, 6);
        assert_eq!(product.category.as_deref(), Some("Tools"));
    }
}
