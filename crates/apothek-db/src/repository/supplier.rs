//! # Supplier Repository

use apothek_core::Supplier;
use tracing::debug;

use crate::adapter::Database;
use crate::error::{DbError, DbResult};
use crate::query::{Filter, Insert, OrderDir, Select, Update};
use crate::row::Row;

/// Repository for wholesale suppliers.
pub struct SupplierRepository<'a> {
    db: &'a Database,
}

impl<'a> SupplierRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        SupplierRepository { db }
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<Supplier>> {
        self.db
            .fetch_optional(&Select::from("suppliers").filter(Filter::eq("id", id)))
            .await?
            .map(|row| from_row(&row))
            .transpose()
    }

    pub async fn list(&self) -> DbResult<Vec<Supplier>> {
        self.db
            .fetch(&Select::from("suppliers").order_by("name", OrderDir::Asc))
            .await?
            .iter()
            .map(from_row)
            .collect()
    }

    pub async fn insert(&self, supplier: &Supplier) -> DbResult<()> {
        apothek_core::validation::require_non_empty("name", &supplier.name)?;
        if let Some(email) = &supplier.email {
            apothek_core::validation::validate_email(email)?;
        }
        debug!(id = %supplier.id, "inserting supplier");
        self.db.insert(&insert_query(supplier)).await
    }

    pub async fn update(&self, supplier: &Supplier) -> DbResult<()> {
        let affected = self.db.update(&update_query(supplier)).await?;
        if affected == 0 {
            return Err(DbError::not_found("supplier", &supplier.id));
        }
        Ok(())
    }

    /// Insert-or-update by primary key, last-write-wins on every field
    /// including the outstanding balance (documented clobber).
    pub async fn upsert(&self, supplier: &Supplier) -> DbResult<()> {
        if self.db.update(&update_query(supplier)).await? == 0 {
            self.insert(supplier).await?;
        }
        Ok(())
    }

    /// Atomic balance adjustment (GRN received, payment made).
    pub async fn adjust_balance(&self, id: &str, delta: f64) -> DbResult<()> {
        let affected = self
            .db
            .update(
                &Update::table("suppliers")
                    .increment("outstanding_balance", delta)
                    .set("updated_at", chrono::Utc::now())
                    .filter(Filter::eq("id", id)),
            )
            .await?;
        if affected == 0 {
            return Err(DbError::not_found("supplier", id));
        }
        Ok(())
    }
}

// =============================================================================
// Row mapping
// =============================================================================

pub(crate) fn from_row(row: &Row) -> DbResult<Supplier> {
    Ok(Supplier {
        id: row.str("id")?,
        name: row.str("name")?,
        contact_person: row.opt_str("contact_person")?,
        phone: row.opt_str("phone")?,
        email: row.opt_str("email")?,
        address: row.opt_str("address")?,
        outstanding_balance: row.f64("outstanding_balance")?,
        created_at: row.datetime("created_at")?,
        updated_at: row.datetime("updated_at")?,
    })
}

pub(crate) fn insert_query(supplier: &Supplier) -> Insert {
    Insert::into("suppliers")
        .value("id", supplier.id.clone())
        .value("name", supplier.name.clone())
        .value("contact_person", supplier.contact_person.clone())
        .value("phone", supplier.phone.clone())
        .value("email", supplier.email.clone())
        .value("address", supplier.address.clone())
        .value("outstanding_balance", supplier.outstanding_balance)
        .value("created_at", supplier.created_at)
        .value("updated_at", supplier.updated_at)
}

fn update_query(supplier: &Supplier) -> Update {
    Update::table("suppliers")
        .set("name", supplier.name.clone())
        .set("contact_person", supplier.contact_person.clone())
        .set("phone", supplier.phone.clone())
        .set("email", supplier.email.clone())
        .set("address", supplier.address.clone())
        .set("outstanding_balance", supplier.outstanding_balance)
        .set("updated_at", supplier.updated_at)
        .filter(Filter::eq("id", supplier.id.clone()))
}
