//! # Branch Repository

use apothek_core::Branch;
use tracing::debug;

use crate::adapter::Database;
use crate::error::{DbError, DbResult};
use crate::query::{Delete, Filter, Insert, OrderDir, Select, Update};
use crate::row::Row;

/// Repository for branch rows.
pub struct BranchRepository<'a> {
    db: &'a Database,
}

impl<'a> BranchRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        BranchRepository { db }
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<Branch>> {
        self.db
            .fetch_optional(&Select::from("branches").filter(Filter::eq("id", id)))
            .await?
            .map(|row| from_row(&row))
            .transpose()
    }

    /// Lookup by the unique business code.
    pub async fn get_by_code(&self, code: &str) -> DbResult<Option<Branch>> {
        self.db
            .fetch_optional(&Select::from("branches").filter(Filter::eq("code", code)))
            .await?
            .map(|row| from_row(&row))
            .transpose()
    }

    pub async fn list(&self) -> DbResult<Vec<Branch>> {
        self.db
            .fetch(&Select::from("branches").order_by("name", OrderDir::Asc))
            .await?
            .iter()
            .map(from_row)
            .collect()
    }

    pub async fn insert(&self, branch: &Branch) -> DbResult<()> {
        apothek_core::validation::require_non_empty("name", &branch.name)?;
        apothek_core::validation::validate_code(&branch.code)?;
        debug!(id = %branch.id, code = %branch.code, "inserting branch");
        self.db.insert(&insert_query(branch)).await
    }

    /// Full-row update keyed by id.
    pub async fn update(&self, branch: &Branch) -> DbResult<()> {
        let affected = self.db.update(&update_query(branch)).await?;
        if affected == 0 {
            return Err(DbError::not_found("branch", &branch.id));
        }
        Ok(())
    }

    /// Update keyed by a different local id (the pull merge matched the row
    /// by `code` after an id change on the cloud side).
    pub async fn update_keyed(&self, local_id: &str, branch: &Branch) -> DbResult<()> {
        let mut q = update_query(branch);
        q.filter = Some(Filter::eq("id", local_id));
        let affected = self.db.update(&q).await?;
        if affected == 0 {
            return Err(DbError::not_found("branch", local_id));
        }
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> DbResult<()> {
        self.db
            .delete(&Delete::from("branches").filter(Filter::eq("id", id)))
            .await?;
        Ok(())
    }
}

// =============================================================================
// Row mapping
// =============================================================================

pub(crate) fn from_row(row: &Row) -> DbResult<Branch> {
    Ok(Branch {
        id: row.str("id")?,
        name: row.str("name")?,
        code: row.str("code")?,
        address: row.opt_str("address")?,
        phone: row.opt_str("phone")?,
        is_active: row.bool("is_active")?,
        created_at: row.datetime("created_at")?,
        updated_at: row.datetime("updated_at")?,
    })
}

pub(crate) fn insert_query(branch: &Branch) -> Insert {
    Insert::into("branches")
        .value("id", branch.id.clone())
        .value("name", branch.name.clone())
        .value("code", branch.code.clone())
        .value("address", branch.address.clone())
        .value("phone", branch.phone.clone())
        .value("is_active", branch.is_active)
        .value("created_at", branch.created_at)
        .value("updated_at", branch.updated_at)
}

fn update_query(branch: &Branch) -> Update {
    Update::table("branches")
        .set("name", branch.name.clone())
        .set("code", branch.code.clone())
        .set("address", branch.address.clone())
        .set("phone", branch.phone.clone())
        .set("is_active", branch.is_active)
        .set("updated_at", branch.updated_at)
        .filter(Filter::eq("id", branch.id.clone()))
}
