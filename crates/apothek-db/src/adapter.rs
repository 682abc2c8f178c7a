//! # Adapter Interface
//!
//! The uniform contract over both physical database engines, and the single
//! explicit [`Database`] handle the rest of the application is given.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Adapter Architecture                             │
//! │                                                                         │
//! │  CRUD handlers / sync engine                                            │
//! │       │                (declarative Select/Insert/Update/... only)      │
//! │       ▼                                                                 │
//! │  ┌───────────────────────────────┐                                      │
//! │  │        Database handle        │  constructed once at startup,        │
//! │  │  connect / initialize /       │  passed by reference everywhere      │
//! │  │  query surface / transaction  │  (no process-wide singleton)         │
//! │  └──────────────┬────────────────┘                                      │
//! │                 │ dyn StorageAdapter                                    │
//! │        ┌────────┴────────┐                                              │
//! │        ▼                 ▼                                              │
//! │  ┌───────────┐    ┌─────────────┐                                       │
//! │  │ Embedded  │    │  Networked  │                                       │
//! │  │ (SQLite)  │    │ (Postgres)  │                                       │
//! │  │ file+WAL  │    │ pool of 10  │                                       │
//! │  └───────────┘    └─────────────┘                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Exactly one adapter instance is active per handle; swapping backends is an
//! explicit lifecycle call on the handle, not mutable global state.

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use tracing::{debug, error};

use crate::config::{BackendConfig, DatabaseConfig};
use crate::embedded::EmbeddedAdapter;
use crate::error::{ConnectError, DbError, DbResult};
use crate::networked::NetworkedAdapter;
use crate::query::{Aggregate, Delete, Insert, Select, Update};
use crate::row::Row;
use crate::translate::{self, Dialect};

// =============================================================================
// Storage Adapter Contract
// =============================================================================

/// The uniform contract implemented by both backends.
///
/// `connect` is never retried internally; classification in [`ConnectError`]
/// tells the caller whether a retry can help. `initialize` (bootstrap +
/// seed) is idempotent and must be called before any business operation.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// The SQL dialect this adapter renders.
    fn dialect(&self) -> Dialect;

    /// Establishes the connection pool. One attempt, classified failure.
    async fn connect(&mut self) -> Result<(), ConnectError>;

    /// Closes the pool. Safe to call when not connected.
    async fn disconnect(&mut self);

    /// Bootstraps the schema (sentinel-guarded) and runs the idempotent
    /// seeder. Safe to call on every startup.
    async fn initialize(&self) -> DbResult<()>;

    fn is_connected(&self) -> bool;

    /// Runs a select and decodes every row.
    async fn fetch(&self, query: &Select) -> DbResult<Vec<Row>>;

    /// Runs a select expecting at most one row.
    async fn fetch_optional(&self, query: &Select) -> DbResult<Option<Row>>;

    /// Inserts one row.
    async fn insert(&self, query: &Insert) -> DbResult<()>;

    /// Inserts one row and returns it as stored. Native `RETURNING *` on the
    /// networked backend; emulated with a primary-key re-select on the
    /// embedded backend.
    async fn insert_returning(&self, query: &Insert) -> DbResult<Row>;

    /// Runs an update, returning the affected-row count.
    async fn update(&self, query: &Update) -> DbResult<u64>;

    /// Runs a delete, returning the affected-row count.
    async fn delete(&self, query: &Delete) -> DbResult<u64>;

    /// Runs an aggregation (SUM/COUNT/AVG/MIN/MAX, optional GROUP BY).
    async fn aggregate(&self, query: &Aggregate) -> DbResult<Vec<Row>>;

    /// Opens a transaction holding one pooled connection.
    async fn begin(&self) -> DbResult<Transaction>;
}

// =============================================================================
// Transaction
// =============================================================================

pub(crate) enum TxInner {
    Embedded(sqlx::Transaction<'static, sqlx::Sqlite>),
    Networked(sqlx::Transaction<'static, sqlx::Postgres>),
}

/// A transaction-scoped handle exposing the same query surface as the outer
/// adapter, so calling code is backend-agnostic inside a transaction.
///
/// Dropping without [`commit`](Transaction::commit) rolls back.
pub struct Transaction {
    pub(crate) inner: TxInner,
}

impl Transaction {
    pub fn dialect(&self) -> Dialect {
        match self.inner {
            TxInner::Embedded(_) => Dialect::Sqlite,
            TxInner::Networked(_) => Dialect::Postgres,
        }
    }

    pub async fn fetch(&mut self, query: &Select) -> DbResult<Vec<Row>> {
        let stmt = translate::render_select(self.dialect(), query)?;
        match &mut self.inner {
            TxInner::Embedded(tx) => crate::embedded::fetch_all(&mut **tx, &stmt).await,
            TxInner::Networked(tx) => crate::networked::fetch_all(&mut **tx, &stmt).await,
        }
    }

    pub async fn fetch_optional(&mut self, query: &Select) -> DbResult<Option<Row>> {
        let mut first = query.clone();
        first.limit = Some(1);
        Ok(self.fetch(&first).await?.into_iter().next())
    }

    pub async fn insert(&mut self, query: &Insert) -> DbResult<()> {
        let stmt = translate::render_insert(self.dialect(), query, false)?;
        match &mut self.inner {
            TxInner::Embedded(tx) => {
                crate::embedded::execute(&mut **tx, &stmt).await?;
            }
            TxInner::Networked(tx) => {
                crate::networked::execute(&mut **tx, &stmt).await?;
            }
        }
        Ok(())
    }

    pub async fn insert_returning(&mut self, query: &Insert) -> DbResult<Row> {
        match &mut self.inner {
            TxInner::Embedded(tx) => {
                let pk = returning_key(query)?;
                let stmt = translate::render_insert(Dialect::Sqlite, query, false)?;
                crate::embedded::execute(&mut **tx, &stmt).await?;
                let reread = translate::render_select(Dialect::Sqlite, &pk)?;
                crate::embedded::fetch_all(&mut **tx, &reread)
                    .await?
                    .into_iter()
                    .next()
                    .ok_or_else(|| DbError::not_found(query.table.clone(), "just-inserted row"))
            }
            TxInner::Networked(tx) => {
                let stmt = translate::render_insert(Dialect::Postgres, query, true)?;
                crate::networked::fetch_all(&mut **tx, &stmt)
                    .await?
                    .into_iter()
                    .next()
                    .ok_or_else(|| DbError::not_found(query.table.clone(), "just-inserted row"))
            }
        }
    }

    pub async fn update(&mut self, query: &Update) -> DbResult<u64> {
        let stmt = translate::render_update(self.dialect(), query)?;
        match &mut self.inner {
            TxInner::Embedded(tx) => crate::embedded::execute(&mut **tx, &stmt).await,
            TxInner::Networked(tx) => crate::networked::execute(&mut **tx, &stmt).await,
        }
    }

    pub async fn delete(&mut self, query: &Delete) -> DbResult<u64> {
        let stmt = translate::render_delete(self.dialect(), query)?;
        match &mut self.inner {
            TxInner::Embedded(tx) => crate::embedded::execute(&mut **tx, &stmt).await,
            TxInner::Networked(tx) => crate::networked::execute(&mut **tx, &stmt).await,
        }
    }

    pub async fn aggregate(&mut self, query: &Aggregate) -> DbResult<Vec<Row>> {
        let stmt = translate::render_aggregate(self.dialect(), query)?;
        match &mut self.inner {
            TxInner::Embedded(tx) => crate::embedded::fetch_all(&mut **tx, &stmt).await,
            TxInner::Networked(tx) => crate::networked::fetch_all(&mut **tx, &stmt).await,
        }
    }

    pub async fn commit(self) -> DbResult<()> {
        match self.inner {
            TxInner::Embedded(tx) => tx.commit().await?,
            TxInner::Networked(tx) => tx.commit().await?,
        }
        Ok(())
    }

    pub async fn rollback(self) -> DbResult<()> {
        match self.inner {
            TxInner::Embedded(tx) => tx.rollback().await?,
            TxInner::Networked(tx) => tx.rollback().await?,
        }
        Ok(())
    }
}

/// Builds the primary-key re-select used for RETURNING emulation.
fn returning_key(query: &Insert) -> DbResult<Select> {
    let pk_value = query
        .primary_key_value()
        .cloned()
        .ok_or_else(|| DbError::MissingPrimaryKey {
            table: query.table.clone(),
            column: query.primary_key.clone(),
        })?;
    Ok(Select::from(query.table.clone())
        .filter(crate::query::Filter::Eq(query.primary_key.clone(), pk_value))
        .limit(1))
}

// =============================================================================
// Database Handle
// =============================================================================

/// The one explicit database handle.
///
/// Constructed at startup from [`DatabaseConfig`], then passed by reference
/// (or `Arc`) to every caller. Lifecycle — initialize, backend swap,
/// shutdown — is explicit methods here, not implicit global state.
pub struct Database {
    adapter: Box<dyn StorageAdapter>,
}

impl Database {
    /// Builds the right adapter for the config and connects it.
    ///
    /// One attempt; retry policy belongs to the caller (the desktop shell
    /// shows the [`ConnectError::hint`] and offers a retry button).
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, ConnectError> {
        let mut adapter: Box<dyn StorageAdapter> = match &config.backend {
            BackendConfig::Embedded { path } => Box::new(EmbeddedAdapter::new(path.clone())),
            BackendConfig::Networked { connection_string } => {
                Box::new(NetworkedAdapter::new(connection_string.clone()))
            }
        };
        adapter.connect().await?;
        Ok(Database { adapter })
    }

    /// Bootstraps schema and seeds defaults. Idempotent; call on every start.
    pub async fn initialize(&self) -> DbResult<()> {
        self.adapter.initialize().await
    }

    pub fn is_connected(&self) -> bool {
        self.adapter.is_connected()
    }

    pub fn dialect(&self) -> Dialect {
        self.adapter.dialect()
    }

    /// Closes the active backend.
    pub async fn shutdown(&mut self) {
        self.adapter.disconnect().await;
    }

    /// Swaps to a different backend: closes the current pool, connects the
    /// new one. The caller re-runs [`initialize`](Database::initialize)
    /// afterwards, exactly as after `connect`.
    ///
    /// On connect failure the old backend is already closed; the handle is
    /// left disconnected rather than half-swapped.
    pub async fn swap_backend(&mut self, config: &DatabaseConfig) -> Result<(), ConnectError> {
        self.adapter.disconnect().await;
        let mut adapter: Box<dyn StorageAdapter> = match &config.backend {
            BackendConfig::Embedded { path } => Box::new(EmbeddedAdapter::new(path.clone())),
            BackendConfig::Networked { connection_string } => {
                Box::new(NetworkedAdapter::new(connection_string.clone()))
            }
        };
        adapter.connect().await?;
        self.adapter = adapter;
        Ok(())
    }

    // =========================================================================
    // Query surface
    // =========================================================================

    pub async fn fetch(&self, query: &Select) -> DbResult<Vec<Row>> {
        self.adapter.fetch(query).await
    }

    pub async fn fetch_optional(&self, query: &Select) -> DbResult<Option<Row>> {
        self.adapter.fetch_optional(query).await
    }

    pub async fn insert(&self, query: &Insert) -> DbResult<()> {
        self.adapter.insert(query).await
    }

    pub async fn insert_returning(&self, query: &Insert) -> DbResult<Row> {
        self.adapter.insert_returning(query).await
    }

    pub async fn update(&self, query: &Update) -> DbResult<u64> {
        self.adapter.update(query).await
    }

    pub async fn delete(&self, query: &Delete) -> DbResult<u64> {
        self.adapter.delete(query).await
    }

    pub async fn aggregate(&self, query: &Aggregate) -> DbResult<Vec<Row>> {
        self.adapter.aggregate(query).await
    }

    /// Opens a transaction for manual commit/rollback control.
    pub async fn begin(&self) -> DbResult<Transaction> {
        self.adapter.begin().await
    }

    /// Runs `f` inside a transaction with all-or-nothing semantics.
    ///
    /// Any error returned by the closure rolls back every write issued
    /// through the transaction-scoped handle, then propagates.
    ///
    /// ## Example
    /// ```rust,ignore
    /// db.transaction(|tx| {
    ///     Box::pin(async move {
    ///         tx.insert(&sale_row).await?;
    ///         tx.update(&stock_decrement).await?;
    ///         tx.insert(&outbox_row).await?;
    ///         Ok(())
    ///     })
    /// })
    /// .await?;
    /// ```
    pub async fn transaction<T, F>(&self, f: F) -> DbResult<T>
    where
        T: Send,
        F: for<'c> FnOnce(&'c mut Transaction) -> BoxFuture<'c, DbResult<T>> + Send,
    {
        let mut tx = self.begin().await?;
        match f(&mut tx).await {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                debug!(error = %err, "rolling back transaction");
                if let Err(rollback_err) = tx.rollback().await {
                    error!(error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("dialect", &self.adapter.dialect())
            .field("connected", &self.adapter.is_connected())
            .finish()
    }
}
