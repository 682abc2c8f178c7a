//! # Embedded Backend (SQLite)
//!
//! The offline-first local store: a single database file in the application
//! data directory, opened through a small `sqlx` pool.
//!
//! ## Engine Configuration
//! - WAL journal mode: readers don't block the writer and vice versa
//! - NORMAL synchronous: safe from corruption, may lose the last transaction
//!   on power loss
//! - Foreign keys enabled (SQLite ships with them off)
//! - `:memory:` databases pin a single connection so the data survives
//!   between queries (used by tests)
//!
//! Timestamps are stored as fixed-width RFC 3339 TEXT (see [`crate::row`]),
//! so range filters compare correctly as strings.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Column, Row as _, SqlitePool, TypeInfo, ValueRef};
use tracing::{debug, info};

use crate::adapter::{StorageAdapter, Transaction, TxInner};
use crate::error::{ConnectError, ConnectKind, DbError, DbResult};
use crate::query::{Aggregate, Delete, Insert, Select, SqlValue, Update};
use crate::row::{format_timestamp, parse_timestamp, Row};
use crate::translate::{self, Dialect, Statement};
use crate::{schema, seed};

/// Pool size for the file-backed store. SQLite allows one writer; a handful
/// of connections covers concurrent readers.
const FILE_POOL_SIZE: u32 = 5;

// =============================================================================
// Adapter
// =============================================================================

/// The embedded file backend.
pub struct EmbeddedAdapter {
    path: PathBuf,
    pool: Option<SqlitePool>,
}

impl EmbeddedAdapter {
    /// Adapter for a database file. Created on first connect if missing.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        EmbeddedAdapter {
            path: path.into(),
            pool: None,
        }
    }

    /// Adapter for an isolated in-memory database (tests).
    pub fn in_memory() -> Self {
        EmbeddedAdapter::new(":memory:")
    }

    fn is_in_memory(&self) -> bool {
        self.path.as_os_str() == ":memory:"
    }

    fn pool(&self) -> DbResult<&SqlitePool> {
        self.pool.as_ref().ok_or(DbError::NotConnected)
    }
}

#[async_trait]
impl StorageAdapter for EmbeddedAdapter {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn connect(&mut self) -> Result<(), ConnectError> {
        info!(path = %self.path.display(), "opening embedded database");

        let (options, pool_options) = if self.is_in_memory() {
            let options = SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| classify_error(&e))?
                .foreign_keys(true)
                // LIKE defaults to ASCII case-insensitive on this engine;
                // the translator documents embedded LIKE as case-sensitive.
                .pragma("case_sensitive_like", "true");
            // One pinned connection: a second connection would see a
            // different empty database.
            let pool_options = SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
            (options, pool_options)
        } else {
            let url = format!("sqlite://{}?mode=rwc", self.path.display());
            let options = SqliteConnectOptions::from_str(&url)
                .map_err(|e| classify_error(&e))?
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal)
                .foreign_keys(true)
                .pragma("case_sensitive_like", "true")
                .create_if_missing(true);
            let pool_options = SqlitePoolOptions::new()
                .max_connections(FILE_POOL_SIZE)
                .min_connections(1)
                .acquire_timeout(Duration::from_secs(30))
                .idle_timeout(Some(Duration::from_secs(600)));
            (options, pool_options)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| classify_error(&e))?;

        debug!("embedded pool ready");
        self.pool = Some(pool);
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Some(pool) = self.pool.take() {
            info!("closing embedded database");
            pool.close().await;
        }
    }

    async fn initialize(&self) -> DbResult<()> {
        let pool = self.pool()?;
        schema::bootstrap_sqlite(pool).await?;
        seed::run(self).await
    }

    fn is_connected(&self) -> bool {
        self.pool.as_ref().map(|p| !p.is_closed()).unwrap_or(false)
    }

    async fn fetch(&self, query: &Select) -> DbResult<Vec<Row>> {
        let stmt = translate::render_select(Dialect::Sqlite, query)?;
        fetch_all(self.pool()?, &stmt).await
    }

    async fn fetch_optional(&self, query: &Select) -> DbResult<Option<Row>> {
        let mut first = query.clone();
        first.limit = Some(1);
        Ok(self.fetch(&first).await?.into_iter().next())
    }

    async fn insert(&self, query: &Insert) -> DbResult<()> {
        let stmt = translate::render_insert(Dialect::Sqlite, query, false)?;
        execute(self.pool()?, &stmt).await?;
        Ok(())
    }

    async fn insert_returning(&self, query: &Insert) -> DbResult<Row> {
        // No RETURNING here: insert, then re-select by primary key.
        let mut tx = self.begin().await?;
        let row = tx.insert_returning(query).await?;
        tx.commit().await?;
        Ok(row)
    }

    async fn update(&self, query: &Update) -> DbResult<u64> {
        let stmt = translate::render_update(Dialect::Sqlite, query)?;
        execute(self.pool()?, &stmt).await
    }

    async fn delete(&self, query: &Delete) -> DbResult<u64> {
        let stmt = translate::render_delete(Dialect::Sqlite, query)?;
        execute(self.pool()?, &stmt).await
    }

    async fn aggregate(&self, query: &Aggregate) -> DbResult<Vec<Row>> {
        let stmt = translate::render_aggregate(Dialect::Sqlite, query)?;
        fetch_all(self.pool()?, &stmt).await
    }

    async fn begin(&self) -> DbResult<Transaction> {
        let tx = self.pool()?.begin().await?;
        Ok(Transaction {
            inner: TxInner::Embedded(tx),
        })
    }
}

// =============================================================================
// Execution helpers (shared by pool and transaction paths)
// =============================================================================

type SqliteQuery<'q> = sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>;

fn bind_value<'q>(query: SqliteQuery<'q>, value: &SqlValue) -> SqliteQuery<'q> {
    match value {
        SqlValue::Null => query.bind(Option::<String>::None),
        SqlValue::Integer(v) => query.bind(*v),
        SqlValue::Real(v) => query.bind(*v),
        SqlValue::Text(v) => query.bind(v.clone()),
        SqlValue::Boolean(v) => query.bind(*v),
        // Stored as canonical RFC 3339 TEXT.
        SqlValue::Timestamp(ts) => query.bind(format_timestamp(ts)),
    }
}

pub(crate) async fn fetch_all<'e, E>(executor: E, stmt: &Statement) -> DbResult<Vec<Row>>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let mut query = sqlx::query(&stmt.sql);
    for param in &stmt.params {
        query = bind_value(query, param);
    }
    let rows = query.fetch_all(executor).await?;
    rows.iter().map(decode_row).collect()
}

pub(crate) async fn execute<'e, E>(executor: E, stmt: &Statement) -> DbResult<u64>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let mut query = sqlx::query(&stmt.sql);
    for param in &stmt.params {
        query = bind_value(query, param);
    }
    let result = query.execute(executor).await?;
    Ok(result.rows_affected())
}

/// Decodes one driver row by storage class / declared type.
fn decode_row(row: &SqliteRow) -> DbResult<Row> {
    let mut out = Vec::with_capacity(row.columns().len());
    for column in row.columns() {
        let i = column.ordinal();
        let type_name = {
            let raw = row.try_get_raw(i)?;
            if raw.is_null() {
                None
            } else {
                Some(raw.type_info().name().to_ascii_uppercase())
            }
        };
        let value = match type_name.as_deref() {
            None | Some("NULL") => SqlValue::Null,
            Some(t) if t.contains("INT") => SqlValue::Integer(row.try_get::<i64, _>(i)?),
            Some("REAL") | Some("FLOAT") | Some("DOUBLE") | Some("DOUBLE PRECISION")
            | Some("NUMERIC") => SqlValue::Real(row.try_get::<f64, _>(i)?),
            Some("BOOLEAN") | Some("BOOL") => SqlValue::Boolean(row.try_get::<bool, _>(i)?),
            Some("DATETIME") | Some("TIMESTAMP") => {
                let text: String = row.try_get(i)?;
                match parse_timestamp(&text) {
                    Some(ts) => SqlValue::Timestamp(ts),
                    None => SqlValue::Text(text),
                }
            }
            Some("BLOB") => {
                let bytes: Vec<u8> = row.try_get(i)?;
                SqlValue::Text(String::from_utf8_lossy(&bytes).into_owned())
            }
            Some(_) => SqlValue::Text(row.try_get::<String, _>(i)?),
        };
        out.push((column.name().to_string(), value));
    }
    Ok(Row::new(out))
}

// =============================================================================
// Connect-failure classification
// =============================================================================

fn classify_error(err: &sqlx::Error) -> ConnectError {
    let message = err.to_string();
    let kind = match err {
        sqlx::Error::Io(io) => match io.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                ConnectKind::DatabaseMissing
            }
            std::io::ErrorKind::TimedOut => ConnectKind::Timeout,
            _ => ConnectKind::Other,
        },
        sqlx::Error::Database(db) if db.message().contains("unable to open database") => {
            // Parent directory missing or unwritable.
            ConnectKind::DatabaseMissing
        }
        sqlx::Error::PoolTimedOut => ConnectKind::Timeout,
        _ => ConnectKind::Other,
    };
    ConnectError::new(kind, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Filter;

    async fn connected() -> EmbeddedAdapter {
        let mut adapter = EmbeddedAdapter::in_memory();
        adapter.connect().await.unwrap();
        adapter.initialize().await.unwrap();
        adapter
    }

    #[tokio::test]
    async fn connect_and_bootstrap_in_memory() {
        let adapter = connected().await;
        assert!(adapter.is_connected());

        // Sentinel makes a second initialize a no-op.
        adapter.initialize().await.unwrap();
    }

    #[tokio::test]
    async fn insert_returning_reads_back_stored_row() {
        let adapter = connected().await;
        let now = chrono::Utc::now();
        let q = Insert::into("customers")
            .value("id", "c1")
            .value("name", "Walk-in")
            .value("loyalty_points", 0i64)
            .value("credit_balance", 0.0)
            .value("created_at", now)
            .value("updated_at", now);
        let row = adapter.insert_returning(&q).await.unwrap();
        assert_eq!(row.str("id").unwrap(), "c1");
        assert_eq!(row.str("name").unwrap(), "Walk-in");
        // Timestamp survives the TEXT round-trip to the second.
        assert_eq!(
            row.datetime("created_at").unwrap().timestamp(),
            now.timestamp()
        );
    }

    #[tokio::test]
    async fn query_not_connected_fails() {
        let adapter = EmbeddedAdapter::in_memory();
        let err = adapter.fetch(&Select::from("customers")).await.unwrap_err();
        assert!(matches!(err, DbError::NotConnected));
    }

    #[tokio::test]
    async fn like_is_case_sensitive_on_embedded_backend() {
        let adapter = connected().await;
        let now = chrono::Utc::now();
        for (id, name) in [("c1", "Asprin Trader"), ("c2", "asprin trader")] {
            adapter
                .insert(
                    &Insert::into("customers")
                        .value("id", id)
                        .value("name", name)
                        .value("loyalty_points", 0i64)
                        .value("credit_balance", 0.0)
                        .value("created_at", now)
                        .value("updated_at", now),
                )
                .await
                .unwrap();
        }
        let rows = adapter
            .fetch(&Select::from("customers").filter(Filter::contains("name", "Asprin")))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].str("id").unwrap(), "c1");
    }
}
