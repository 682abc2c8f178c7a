//! # Schema Bootstrapper
//!
//! Creates the full table set on first run, guarded by a sentinel check.
//!
//! ## Bootstrap Process
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Bootstrap Process                                  │
//! │                                                                         │
//! │  initialize()                                                          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Does the sentinel table (branches) exist?                             │
//! │       │                                                                 │
//! │       ├── yes ──► no-op (seeder still runs; it is idempotent)          │
//! │       │                                                                 │
//! │       └── no ───► CREATE all tables + indexes in one transaction       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The sentinel check is the sole mechanism: there is no migration ledger,
//! and schema evolution is out of scope. An existing database is assumed to
//! carry the current shape.

use sqlx::{PgPool, SqlitePool};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::translate::Dialect;

/// Table whose existence marks a bootstrapped database.
const SENTINEL_TABLE: &str = "branches";

// =============================================================================
// DDL
// =============================================================================

/// Renders the full table + index set for a dialect.
///
/// Types are substituted per backend: timestamps are RFC 3339 TEXT on the
/// embedded backend and TIMESTAMPTZ on the networked one; counters are
/// INTEGER vs BIGINT; money is REAL vs DOUBLE PRECISION.
fn ddl(dialect: Dialect) -> Vec<String> {
    let (ts, int, real) = match dialect {
        Dialect::Sqlite => ("TEXT", "INTEGER", "REAL"),
        Dialect::Postgres => ("TIMESTAMPTZ", "BIGINT", "DOUBLE PRECISION"),
    };

    vec![
        format!(
            "CREATE TABLE IF NOT EXISTS branches (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                code TEXT NOT NULL,
                address TEXT,
                phone TEXT,
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                created_at {ts} NOT NULL,
                updated_at {ts} NOT NULL
            )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                branch_id TEXT REFERENCES branches(id),
                name TEXT NOT NULL,
                email TEXT NOT NULL,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                created_at {ts} NOT NULL,
                updated_at {ts} NOT NULL
            )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS medicines (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                generic_name TEXT,
                batch_number TEXT NOT NULL,
                barcode TEXT,
                category TEXT,
                manufacturer TEXT,
                quantity {int} NOT NULL DEFAULT 0,
                reorder_level {int} NOT NULL DEFAULT 0,
                cost_price {real} NOT NULL DEFAULT 0,
                selling_price {real} NOT NULL DEFAULT 0,
                expiry_date {ts},
                created_at {ts} NOT NULL,
                updated_at {ts} NOT NULL
            )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS customers (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                phone TEXT,
                email TEXT,
                address TEXT,
                loyalty_points {int} NOT NULL DEFAULT 0,
                credit_balance {real} NOT NULL DEFAULT 0,
                created_at {ts} NOT NULL,
                updated_at {ts} NOT NULL
            )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS suppliers (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                contact_person TEXT,
                phone TEXT,
                email TEXT,
                address TEXT,
                outstanding_balance {real} NOT NULL DEFAULT 0,
                created_at {ts} NOT NULL,
                updated_at {ts} NOT NULL
            )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS sales (
                id TEXT PRIMARY KEY,
                branch_id TEXT NOT NULL REFERENCES branches(id),
                user_id TEXT NOT NULL REFERENCES users(id),
                customer_id TEXT REFERENCES customers(id),
                invoice_number TEXT NOT NULL,
                subtotal {real} NOT NULL DEFAULT 0,
                discount {real} NOT NULL DEFAULT 0,
                tax {real} NOT NULL DEFAULT 0,
                total {real} NOT NULL DEFAULT 0,
                payment_method TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at {ts} NOT NULL,
                updated_at {ts} NOT NULL
            )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS sale_items (
                id TEXT PRIMARY KEY,
                sale_id TEXT NOT NULL REFERENCES sales(id) ON DELETE CASCADE,
                medicine_id TEXT NOT NULL REFERENCES medicines(id),
                name_snapshot TEXT NOT NULL,
                quantity {int} NOT NULL,
                unit_price {real} NOT NULL,
                line_total {real} NOT NULL,
                created_at {ts} NOT NULL
            )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS purchase_orders (
                id TEXT PRIMARY KEY,
                branch_id TEXT NOT NULL REFERENCES branches(id),
                supplier_id TEXT NOT NULL REFERENCES suppliers(id),
                order_number TEXT NOT NULL,
                status TEXT NOT NULL,
                total {real} NOT NULL DEFAULT 0,
                expected_at {ts},
                created_at {ts} NOT NULL,
                updated_at {ts} NOT NULL
            )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS purchase_order_items (
                id TEXT PRIMARY KEY,
                purchase_order_id TEXT NOT NULL
                    REFERENCES purchase_orders(id) ON DELETE CASCADE,
                medicine_id TEXT NOT NULL REFERENCES medicines(id),
                quantity {int} NOT NULL,
                unit_cost {real} NOT NULL,
                line_total {real} NOT NULL
            )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS goods_received_notes (
                id TEXT PRIMARY KEY,
                supplier_id TEXT NOT NULL REFERENCES suppliers(id),
                purchase_order_id TEXT REFERENCES purchase_orders(id),
                grn_number TEXT NOT NULL,
                received_at {ts} NOT NULL,
                total {real} NOT NULL DEFAULT 0,
                notes TEXT,
                created_at {ts} NOT NULL,
                updated_at {ts} NOT NULL
            )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS grn_items (
                id TEXT PRIMARY KEY,
                grn_id TEXT NOT NULL
                    REFERENCES goods_received_notes(id) ON DELETE CASCADE,
                medicine_id TEXT NOT NULL REFERENCES medicines(id),
                quantity {int} NOT NULL,
                unit_cost {real} NOT NULL,
                batch_number TEXT,
                expiry_date {ts}
            )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS loyalty_transactions (
                id TEXT PRIMARY KEY,
                customer_id TEXT NOT NULL REFERENCES customers(id),
                sale_id TEXT REFERENCES sales(id),
                kind TEXT NOT NULL,
                points_delta {int} NOT NULL DEFAULT 0,
                amount_delta {real} NOT NULL DEFAULT 0,
                note TEXT,
                created_at {ts} NOT NULL
            )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS sync_outbox (
                id TEXT PRIMARY KEY,
                entity_type TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                operation TEXT NOT NULL,
                payload TEXT,
                status TEXT NOT NULL,
                attempts {int} NOT NULL DEFAULT 0,
                last_attempt_at {ts},
                error_message TEXT,
                created_at {ts} NOT NULL,
                updated_at {ts} NOT NULL,
                synced_at {ts}
            )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at {ts} NOT NULL
            )"
        ),
        // Lookup indexes: by code/email/phone/invoice, plus the outbox drain.
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_branches_code ON branches(code)".to_string(),
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_users_email ON users(email)".to_string(),
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_sales_invoice ON sales(invoice_number)".to_string(),
        "CREATE INDEX IF NOT EXISTS idx_customers_phone ON customers(phone)".to_string(),
        "CREATE INDEX IF NOT EXISTS idx_medicines_name ON medicines(name)".to_string(),
        "CREATE INDEX IF NOT EXISTS idx_medicines_barcode ON medicines(barcode)".to_string(),
        "CREATE INDEX IF NOT EXISTS idx_outbox_status ON sync_outbox(status, created_at)"
            .to_string(),
        "CREATE INDEX IF NOT EXISTS idx_loyalty_customer ON loyalty_transactions(customer_id)"
            .to_string(),
    ]
}

// =============================================================================
// Bootstrap
// =============================================================================

/// Bootstraps the embedded backend.
pub(crate) async fn bootstrap_sqlite(pool: &SqlitePool) -> DbResult<()> {
    let sentinel: Option<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
    )
    .bind(SENTINEL_TABLE)
    .fetch_optional(pool)
    .await
    .map_err(|e| DbError::Schema(e.to_string()))?;

    if sentinel.is_some() {
        debug!("schema already present, bootstrap skipped");
        return Ok(());
    }

    info!("bootstrapping embedded schema");
    let mut tx = pool.begin().await.map_err(|e| DbError::Schema(e.to_string()))?;
    for statement in ddl(Dialect::Sqlite) {
        sqlx::query(&statement)
            .execute(&mut *tx)
            .await
            .map_err(|e| DbError::Schema(format!("{e} in: {statement}")))?;
    }
    tx.commit().await.map_err(|e| DbError::Schema(e.to_string()))?;
    info!("embedded schema created");
    Ok(())
}

/// Bootstraps the networked backend.
pub(crate) async fn bootstrap_postgres(pool: &PgPool) -> DbResult<()> {
    let sentinel: Option<String> = sqlx::query_scalar(
        "SELECT table_name FROM information_schema.tables
         WHERE table_schema = current_schema() AND table_name = $1",
    )
    .bind(SENTINEL_TABLE)
    .fetch_optional(pool)
    .await
    .map_err(|e| DbError::Schema(e.to_string()))?;

    if sentinel.is_some() {
        debug!("schema already present, bootstrap skipped");
        return Ok(());
    }

    info!("bootstrapping networked schema");
    let mut tx = pool.begin().await.map_err(|e| DbError::Schema(e.to_string()))?;
    for statement in ddl(Dialect::Postgres) {
        sqlx::query(&statement)
            .execute(&mut *tx)
            .await
            .map_err(|e| DbError::Schema(format!("{e} in: {statement}")))?;
    }
    tx.commit().await.map_err(|e| DbError::Schema(e.to_string()))?;
    info!("networked schema created");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_dialects_render_the_same_table_count() {
        assert_eq!(ddl(Dialect::Sqlite).len(), ddl(Dialect::Postgres).len());
    }

    #[test]
    fn dialect_type_substitution() {
        let sqlite = ddl(Dialect::Sqlite).join("\n");
        assert!(sqlite.contains("created_at TEXT NOT NULL"));
        assert!(!sqlite.contains("TIMESTAMPTZ"));

        let pg = ddl(Dialect::Postgres).join("\n");
        assert!(pg.contains("created_at TIMESTAMPTZ NOT NULL"));
        assert!(pg.contains("DOUBLE PRECISION"));
        assert!(!pg.contains("created_at TEXT"));
    }

    #[tokio::test]
    async fn sqlite_bootstrap_is_sentinel_guarded() {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();

        bootstrap_sqlite(&pool).await.unwrap();
        // Second call is a no-op rather than an error.
        bootstrap_sqlite(&pool).await.unwrap();

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        for expected in [
            "branches",
            "customers",
            "goods_received_notes",
            "grn_items",
            "loyalty_transactions",
            "medicines",
            "purchase_order_items",
            "purchase_orders",
            "sale_items",
            "sales",
            "settings",
            "suppliers",
            "sync_outbox",
            "users",
        ] {
            assert!(tables.iter().any(|t| t == expected), "missing {expected}");
        }
    }
}
