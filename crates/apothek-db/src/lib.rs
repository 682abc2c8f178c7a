//! # apothek-db: Dual-Backend Database Layer
//!
//! Identical business logic runs unmodified against either an embedded file
//! database (SQLite) or a networked relational server (PostgreSQL). Callers
//! describe operations with the declarative [`query`] model; the [`translate`]
//! module renders dialect-correct, fully parameterized SQL; the two adapters
//! execute it against their pools.
//!
//! ## Module Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          apothek-db                                     │
//! │                                                                         │
//! │  query ──► translate ──► adapter (Database handle, Transaction)        │
//! │                              │                                          │
//! │                    ┌─────────┴──────────┐                               │
//! │                embedded             networked                           │
//! │                (SQLite)            (PostgreSQL)                         │
//! │                              │                                          │
//! │  schema (bootstrap) + seed (defaults)  ← initialize()                  │
//! │  repository::* (typed, per entity)     ← what callers actually use     │
//! │  config (backend selection, on disk)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//! ```rust,ignore
//! let config = DatabaseConfig::load_or_init(&DatabaseConfig::default_config_path())?;
//! let db = Database::connect(&config).await?;
//! db.initialize().await?;
//!
//! let low = db.medicines().low_stock().await?;
//! ```

pub mod adapter;
pub mod config;
pub mod embedded;
pub mod error;
pub mod networked;
pub mod query;
pub mod repository;
pub mod row;
mod schema;
mod seed;
pub mod translate;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use adapter::{Database, StorageAdapter, Transaction};
pub use config::{BackendConfig, DatabaseConfig};
pub use embedded::EmbeddedAdapter;
pub use error::{ConnectError, ConnectKind, DbError, DbResult};
pub use networked::NetworkedAdapter;
pub use query::{Aggregate, Delete, Filter, Insert, OrderDir, Select, SqlValue, Update};
pub use row::Row;
pub use translate::Dialect;
