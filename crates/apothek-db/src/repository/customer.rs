//! # Customer Repository

use apothek_core::Customer;
use tracing::debug;

use crate::adapter::{Database, Transaction};
use crate::error::{DbError, DbResult};
use crate::query::{Filter, Insert, OrderDir, Select, Update};
use crate::row::Row;

/// Repository for retail customers.
pub struct CustomerRepository<'a> {
    db: &'a Database,
}

impl<'a> CustomerRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        CustomerRepository { db }
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<Customer>> {
        self.db
            .fetch_optional(&Select::from("customers").filter(Filter::eq("id", id)))
            .await?
            .map(|row| from_row(&row))
            .transpose()
    }

    pub async fn get_by_phone(&self, phone: &str) -> DbResult<Option<Customer>> {
        self.db
            .fetch_optional(&Select::from("customers").filter(Filter::eq("phone", phone)))
            .await?
            .map(|row| from_row(&row))
            .transpose()
    }

    pub async fn list(&self) -> DbResult<Vec<Customer>> {
        self.db
            .fetch(&Select::from("customers").order_by("name", OrderDir::Asc))
            .await?
            .iter()
            .map(from_row)
            .collect()
    }

    pub async fn insert(&self, customer: &Customer) -> DbResult<()> {
        apothek_core::validation::require_non_empty("name", &customer.name)?;
        if let Some(phone) = &customer.phone {
            apothek_core::validation::validate_phone(phone)?;
        }
        if let Some(email) = &customer.email {
            apothek_core::validation::validate_email(email)?;
        }
        debug!(id = %customer.id, "inserting customer");
        self.db.insert(&insert_query(customer)).await
    }

    pub async fn update(&self, customer: &Customer) -> DbResult<()> {
        let affected = self.db.update(&update_query(customer)).await?;
        if affected == 0 {
            return Err(DbError::not_found("customer", &customer.id));
        }
        Ok(())
    }

    /// Insert-or-update by primary key. Last-write-wins on every field,
    /// balances included — the pull merge's documented clobber.
    pub async fn upsert(&self, customer: &Customer) -> DbResult<()> {
        if self.db.update(&update_query(customer)).await? == 0 {
            self.insert(customer).await?;
        }
        Ok(())
    }

    /// Atomic loyalty accrual outside a sale (manual adjustment).
    pub async fn add_loyalty_points(&self, id: &str, delta: i64) -> DbResult<()> {
        let affected = self
            .db
            .update(
                &Update::table("customers")
                    .increment("loyalty_points", delta)
                    .set("updated_at", chrono::Utc::now())
                    .filter(Filter::eq("id", id)),
            )
            .await?;
        if affected == 0 {
            return Err(DbError::not_found("customer", id));
        }
        Ok(())
    }
}

// =============================================================================
// Row mapping
// =============================================================================

pub(crate) fn from_row(row: &Row) -> DbResult<Customer> {
    Ok(Customer {
        id: row.str("id")?,
        name: row.str("name")?,
        phone: row.opt_str("phone")?,
        email: row.opt_str("email")?,
        address: row.opt_str("address")?,
        loyalty_points: row.i64("loyalty_points")?,
        credit_balance: row.f64("credit_balance")?,
        created_at: row.datetime("created_at")?,
        updated_at: row.datetime("updated_at")?,
    })
}

pub(crate) fn insert_query(customer: &Customer) -> Insert {
    Insert::into("customers")
        .value("id", customer.id.clone())
        .value("name", customer.name.clone())
        .value("phone", customer.phone.clone())
        .value("email", customer.email.clone())
        .value("address", customer.address.clone())
        .value("loyalty_points", customer.loyalty_points)
        .value("credit_balance", customer.credit_balance)
        .value("created_at", customer.created_at)
        .value("updated_at", customer.updated_at)
}

fn update_query(customer: &Customer) -> Update {
    Update::table("customers")
        .set("name", customer.name.clone())
        .set("phone", customer.phone.clone())
        .set("email", customer.email.clone())
        .set("address", customer.address.clone())
        .set("loyalty_points", customer.loyalty_points)
        .set("credit_balance", customer.credit_balance)
        .set("updated_at", customer.updated_at)
        .filter(Filter::eq("id", customer.id.clone()))
}

/// Transaction-scoped atomic counter adjustments, used while recording a
/// sale so accrual commits (or rolls back) with the sale itself.
pub async fn adjust_balances_in(
    tx: &mut Transaction,
    id: &str,
    points_delta: i64,
    credit_delta: f64,
) -> DbResult<()> {
    let affected = tx
        .update(
            &Update::table("customers")
                .increment("loyalty_points", points_delta)
                .increment("credit_balance", credit_delta)
                .set("updated_at", chrono::Utc::now())
                .filter(Filter::eq("id", id)),
        )
        .await?;
    if affected == 0 {
        return Err(DbError::not_found("customer", id));
    }
    Ok(())
}
