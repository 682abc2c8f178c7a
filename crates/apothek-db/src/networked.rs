//! # Networked Backend (PostgreSQL)
//!
//! The shared-server backend: identical business logic runs against a
//! bounded connection pool instead of the embedded file.
//!
//! Connect failures are classified ([`ConnectError`]) so the shell can tell
//! "server down" from "wrong password" from "database not created yet"
//! without parsing driver strings.

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{Column, PgPool, Row as _, TypeInfo, ValueRef};
use tracing::{debug, info};

use crate::adapter::{StorageAdapter, Transaction, TxInner};
use crate::error::{ConnectError, ConnectKind, DbError, DbResult};
use crate::query::{Aggregate, Delete, Insert, Select, SqlValue, Update};
use crate::row::Row;
use crate::translate::{self, Dialect, Statement};
use crate::{schema, seed};

/// Bounded pool size against the shared server.
const POOL_SIZE: u32 = 10;

// =============================================================================
// Adapter
// =============================================================================

/// The networked pool backend.
pub struct NetworkedAdapter {
    connection_string: String,
    pool: Option<PgPool>,
}

impl NetworkedAdapter {
    pub fn new(connection_string: impl Into<String>) -> Self {
        NetworkedAdapter {
            connection_string: connection_string.into(),
            pool: None,
        }
    }

    fn pool(&self) -> DbResult<&PgPool> {
        self.pool.as_ref().ok_or(DbError::NotConnected)
    }
}

#[async_trait]
impl StorageAdapter for NetworkedAdapter {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn connect(&mut self) -> Result<(), ConnectError> {
        info!("connecting to networked database");

        let pool = PgPoolOptions::new()
            .max_connections(POOL_SIZE)
            .min_connections(1)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Some(Duration::from_secs(600)))
            .connect(&self.connection_string)
            .await
            .map_err(|e| classify_error(&e))?;

        debug!(pool_size = POOL_SIZE, "networked pool ready");
        self.pool = Some(pool);
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Some(pool) = self.pool.take() {
            info!("closing networked database pool");
            pool.close().await;
        }
    }

    async fn initialize(&self) -> DbResult<()> {
        let pool = self.pool()?;
        schema::bootstrap_postgres(pool).await?;
        seed::run(self).await
    }

    fn is_connected(&self) -> bool {
        self.pool.as_ref().map(|p| !p.is_closed()).unwrap_or(false)
    }

    async fn fetch(&self, query: &Select) -> DbResult<Vec<Row>> {
        let stmt = translate::render_select(Dialect::Postgres, query)?;
        fetch_all(self.pool()?, &stmt).await
    }

    async fn fetch_optional(&self, query: &Select) -> DbResult<Option<Row>> {
        let mut first = query.clone();
        first.limit = Some(1);
        Ok(self.fetch(&first).await?.into_iter().next())
    }

    async fn insert(&self, query: &Insert) -> DbResult<()> {
        let stmt = translate::render_insert(Dialect::Postgres, query, false)?;
        execute(self.pool()?, &stmt).await?;
        Ok(())
    }

    async fn insert_returning(&self, query: &Insert) -> DbResult<Row> {
        let stmt = translate::render_insert(Dialect::Postgres, query, true)?;
        fetch_all(self.pool()?, &stmt)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found(query.table.clone(), "just-inserted row"))
    }

    async fn update(&self, query: &Update) -> DbResult<u64> {
        let stmt = translate::render_update(Dialect::Postgres, query)?;
        execute(self.pool()?, &stmt).await
    }

    async fn delete(&self, query: &Delete) -> DbResult<u64> {
        let stmt = translate::render_delete(Dialect::Postgres, query)?;
        execute(self.pool()?, &stmt).await
    }

    async fn aggregate(&self, query: &Aggregate) -> DbResult<Vec<Row>> {
        let stmt = translate::render_aggregate(Dialect::Postgres, query)?;
        fetch_all(self.pool()?, &stmt).await
    }

    async fn begin(&self) -> DbResult<Transaction> {
        let tx = self.pool()?.begin().await?;
        Ok(Transaction {
            inner: TxInner::Networked(tx),
        })
    }
}

// =============================================================================
// Execution helpers (shared by pool and transaction paths)
// =============================================================================

type PgQuery<'q> = sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>;

fn bind_value<'q>(query: PgQuery<'q>, value: &SqlValue) -> PgQuery<'q> {
    match value {
        SqlValue::Null => query.bind(Option::<String>::None),
        SqlValue::Integer(v) => query.bind(*v),
        SqlValue::Real(v) => query.bind(*v),
        SqlValue::Text(v) => query.bind(v.clone()),
        SqlValue::Boolean(v) => query.bind(*v),
        SqlValue::Timestamp(ts) => query.bind(*ts),
    }
}

pub(crate) async fn fetch_all<'e, E>(executor: E, stmt: &Statement) -> DbResult<Vec<Row>>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
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
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let mut query = sqlx::query(&stmt.sql);
    for param in &stmt.params {
        query = bind_value(query, param);
    }
    let result = query.execute(executor).await?;
    Ok(result.rows_affected())
}

/// Decodes one driver row by Postgres type name.
fn decode_row(row: &PgRow) -> DbResult<Row> {
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
            None => SqlValue::Null,
            Some("INT2") => SqlValue::Integer(row.try_get::<i16, _>(i)? as i64),
            Some("INT4") => SqlValue::Integer(row.try_get::<i32, _>(i)? as i64),
            Some("INT8") => SqlValue::Integer(row.try_get::<i64, _>(i)?),
            Some("FLOAT4") => SqlValue::Real(row.try_get::<f32, _>(i)? as f64),
            Some("FLOAT8") => SqlValue::Real(row.try_get::<f64, _>(i)?),
            // SUM over an integer column comes back as NUMERIC.
            Some("NUMERIC") => {
                let decimal: rust_decimal::Decimal = row.try_get(i)?;
                SqlValue::Real(decimal.to_f64().ok_or_else(|| DbError::CorruptValue {
                    column: column.name().to_string(),
                    value: decimal.to_string(),
                })?)
            }
            Some("BOOL") => SqlValue::Boolean(row.try_get::<bool, _>(i)?),
            Some("TIMESTAMPTZ") => {
                SqlValue::Timestamp(row.try_get::<chrono::DateTime<chrono::Utc>, _>(i)?)
            }
            Some("TIMESTAMP") => {
                let naive: chrono::NaiveDateTime = row.try_get(i)?;
                SqlValue::Timestamp(chrono::DateTime::from_naive_utc_and_offset(
                    naive,
                    chrono::Utc,
                ))
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
            std::io::ErrorKind::ConnectionRefused => ConnectKind::Refused,
            std::io::ErrorKind::TimedOut => ConnectKind::Timeout,
            _ if message.contains("lookup") || message.contains("resolve") => {
                ConnectKind::HostNotFound
            }
            _ => ConnectKind::Other,
        },
        sqlx::Error::Database(db) => match db.code().as_deref() {
            // 28xxx: invalid authorization; 3D000: database does not exist.
            Some("28P01") | Some("28000") => ConnectKind::AuthFailed,
            Some("3D000") => ConnectKind::DatabaseMissing,
            _ => ConnectKind::Other,
        },
        sqlx::Error::PoolTimedOut => ConnectKind::Timeout,
        sqlx::Error::Tls(_) => ConnectKind::Other,
        _ if message.contains("lookup") || message.contains("resolve") => {
            ConnectKind::HostNotFound
        }
        _ if message.contains("refused") => ConnectKind::Refused,
        _ if message.contains("timed out") => ConnectKind::Timeout,
        _ => ConnectKind::Other,
    };
    ConnectError::new(kind, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_failure_classification() {
        // Fabricated SQLSTATE mapping checks; live-server paths are covered
        // by the integration suite when APOTHEK_TEST_PG_URL is set.
        let io = sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "connection refused",
        ));
        assert_eq!(classify_error(&io).kind, ConnectKind::Refused);

        let io = sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "failed to lookup address information",
        ));
        assert_eq!(classify_error(&io).kind, ConnectKind::HostNotFound);
    }

    #[test]
    fn not_connected_before_connect() {
        let adapter = NetworkedAdapter::new("postgres://user:pw@localhost/apothek");
        assert!(!adapter.is_connected());
    }
}
