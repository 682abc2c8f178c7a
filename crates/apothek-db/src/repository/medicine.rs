//! # Medicine Repository

use apothek_core::Medicine;
use tracing::debug;

use crate::adapter::{Database, Transaction};
use crate::error::{DbError, DbResult};
use crate::query::{Delete, Filter, Insert, OrderDir, Select, Update};
use crate::row::Row;

/// Repository for stocked medicines.
pub struct MedicineRepository<'a> {
    db: &'a Database,
}

impl<'a> MedicineRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        MedicineRepository { db }
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<Medicine>> {
        self.db
            .fetch_optional(&Select::from("medicines").filter(Filter::eq("id", id)))
            .await?
            .map(|row| from_row(&row))
            .transpose()
    }

    pub async fn get_by_barcode(&self, barcode: &str) -> DbResult<Option<Medicine>> {
        self.db
            .fetch_optional(&Select::from("medicines").filter(Filter::eq("barcode", barcode)))
            .await?
            .map(|row| from_row(&row))
            .transpose()
    }

    /// Substring search over name and generic name.
    ///
    /// Case-insensitive on the networked backend, case-sensitive on the
    /// embedded one (dialect LIKE asymmetry).
    pub async fn search(&self, needle: &str, limit: u64) -> DbResult<Vec<Medicine>> {
        self.db
            .fetch(
                &Select::from("medicines")
                    .filter(
                        Filter::contains("name", needle)
                            .or(Filter::contains("generic_name", needle)),
                    )
                    .order_by("name", OrderDir::Asc)
                    .limit(limit),
            )
            .await?
            .iter()
            .map(from_row)
            .collect()
    }

    /// Medicines at or below their reorder level.
    pub async fn low_stock(&self) -> DbResult<Vec<Medicine>> {
        self.db
            .fetch(
                &Select::from("medicines")
                    .filter(Filter::lte_col("quantity", "reorder_level"))
                    .order_by("quantity", OrderDir::Asc),
            )
            .await?
            .iter()
            .map(from_row)
            .collect()
    }

    pub async fn insert(&self, medicine: &Medicine) -> DbResult<()> {
        apothek_core::validation::require_non_empty("name", &medicine.name)?;
        apothek_core::validation::require_non_negative("selling_price", medicine.selling_price)?;
        apothek_core::validation::require_non_negative("cost_price", medicine.cost_price)?;
        debug!(id = %medicine.id, name = %medicine.name, "inserting medicine");
        self.db.insert(&insert_query(medicine)).await
    }

    pub async fn update(&self, medicine: &Medicine) -> DbResult<()> {
        let affected = self.db.update(&update_query(medicine)).await?;
        if affected == 0 {
            return Err(DbError::not_found("medicine", &medicine.id));
        }
        Ok(())
    }

    /// Insert-or-update by primary key (the pull merge primitive).
    pub async fn upsert(&self, medicine: &Medicine) -> DbResult<()> {
        if self.db.update(&update_query(medicine)).await? == 0 {
            self.insert(medicine).await?;
        }
        Ok(())
    }

    /// Atomic stock adjustment: `quantity = quantity + delta`, no
    /// read-modify-write race with a concurrent till.
    pub async fn adjust_stock(&self, id: &str, delta: i64) -> DbResult<()> {
        let affected = self
            .db
            .update(
                &Update::table("medicines")
                    .increment("quantity", delta)
                    .set("updated_at", chrono::Utc::now())
                    .filter(Filter::eq("id", id)),
            )
            .await?;
        if affected == 0 {
            return Err(DbError::not_found("medicine", id));
        }
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> DbResult<()> {
        self.db
            .delete(&Delete::from("medicines").filter(Filter::eq("id", id)))
            .await?;
        Ok(())
    }
}

// =============================================================================
// Row mapping
// =============================================================================

pub(crate) fn from_row(row: &Row) -> DbResult<Medicine> {
    Ok(Medicine {
        id: row.str("id")?,
        name: row.str("name")?,
        generic_name: row.opt_str("generic_name")?,
        batch_number: row.str("batch_number")?,
        barcode: row.opt_str("barcode")?,
        category: row.opt_str("category")?,
        manufacturer: row.opt_str("manufacturer")?,
        quantity: row.i64("quantity")?,
        reorder_level: row.i64("reorder_level")?,
        cost_price: row.f64("cost_price")?,
        selling_price: row.f64("selling_price")?,
        expiry_date: row.opt_datetime("expiry_date")?,
        created_at: row.datetime("created_at")?,
        updated_at: row.datetime("updated_at")?,
    })
}

pub(crate) fn insert_query(medicine: &Medicine) -> Insert {
    Insert::into("medicines")
        .value("id", medicine.id.clone())
        .value("name", medicine.name.clone())
        .value("generic_name", medicine.generic_name.clone())
        .value("batch_number", medicine.batch_number.clone())
        .value("barcode", medicine.barcode.clone())
        .value("category", medicine.category.clone())
        .value("manufacturer", medicine.manufacturer.clone())
        .value("quantity", medicine.quantity)
        .value("reorder_level", medicine.reorder_level)
        .value("cost_price", medicine.cost_price)
        .value("selling_price", medicine.selling_price)
        .value("expiry_date", medicine.expiry_date)
        .value("created_at", medicine.created_at)
        .value("updated_at", medicine.updated_at)
}

fn update_query(medicine: &Medicine) -> Update {
    Update::table("medicines")
        .set("name", medicine.name.clone())
        .set("generic_name", medicine.generic_name.clone())
        .set("batch_number", medicine.batch_number.clone())
        .set("barcode", medicine.barcode.clone())
        .set("category", medicine.category.clone())
        .set("manufacturer", medicine.manufacturer.clone())
        .set("quantity", medicine.quantity)
        .set("reorder_level", medicine.reorder_level)
        .set("cost_price", medicine.cost_price)
        .set("selling_price", medicine.selling_price)
        .set("expiry_date", medicine.expiry_date)
        .set("updated_at", medicine.updated_at)
        .filter(Filter::eq("id", medicine.id.clone()))
}

/// Transaction-scoped atomic stock adjustment.
pub async fn adjust_stock_in(tx: &mut Transaction, id: &str, delta: i64) -> DbResult<()> {
    let affected = tx
        .update(
            &Update::table("medicines")
                .increment("quantity", delta)
                .set("updated_at", chrono::Utc::now())
                .filter(Filter::eq("id", id)),
        )
        .await?;
    if affected == 0 {
        return Err(DbError::not_found("medicine", id));
    }
    Ok(())
}
