//! # User Repository
//!
//! Pull merges only ever update existing users (the cloud payload omits
//! password hashes), so unlike the other replicated entities there is no
//! upsert here: [`UserRepository::update_profile`] touches every field
//! except `password_hash`.

use apothek_core::{User, UserRole};
use tracing::debug;

use crate::adapter::Database;
use crate::error::{DbError, DbResult};
use crate::query::{Filter, Insert, OrderDir, Select, Update};
use crate::row::Row;

/// Repository for user accounts.
pub struct UserRepository<'a> {
    db: &'a Database,
}

impl<'a> UserRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        UserRepository { db }
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<User>> {
        self.db
            .fetch_optional(&Select::from("users").filter(Filter::eq("id", id)))
            .await?
            .map(|row| from_row(&row))
            .transpose()
    }

    pub async fn get_by_email(&self, email: &str) -> DbResult<Option<User>> {
        self.db
            .fetch_optional(&Select::from("users").filter(Filter::eq("email", email)))
            .await?
            .map(|row| from_row(&row))
            .transpose()
    }

    pub async fn list(&self) -> DbResult<Vec<User>> {
        self.db
            .fetch(&Select::from("users").order_by("name", OrderDir::Asc))
            .await?
            .iter()
            .map(from_row)
            .collect()
    }

    pub async fn insert(&self, user: &User) -> DbResult<()> {
        apothek_core::validation::require_non_empty("name", &user.name)?;
        apothek_core::validation::validate_email(&user.email)?;
        debug!(id = %user.id, email = %user.email, "inserting user");
        self.db
            .insert(
                &Insert::into("users")
                    .value("id", user.id.clone())
                    .value("branch_id", user.branch_id.clone())
                    .value("name", user.name.clone())
                    .value("email", user.email.clone())
                    .value("password_hash", user.password_hash.clone())
                    .value("role", user.role.as_str())
                    .value("is_active", user.is_active)
                    .value("created_at", user.created_at)
                    .value("updated_at", user.updated_at),
            )
            .await
    }

    /// Updates profile fields, never the password hash.
    ///
    /// Returns the affected-row count so the pull merge can tell "updated"
    /// from "no local account" without a prior read.
    pub async fn update_profile(
        &self,
        id: &str,
        name: &str,
        email: &str,
        role: UserRole,
        branch_id: Option<&str>,
        is_active: bool,
        updated_at: chrono::DateTime<chrono::Utc>,
    ) -> DbResult<u64> {
        self.db
            .update(
                &Update::table("users")
                    .set("name", name)
                    .set("email", email)
                    .set("role", role.as_str())
                    .set("branch_id", branch_id.map(|b| b.to_string()))
                    .set("is_active", is_active)
                    .set("updated_at", updated_at)
                    .filter(Filter::eq("id", id)),
            )
            .await
    }

    /// Replaces the stored password hash (local credential change).
    pub async fn set_password_hash(&self, id: &str, password_hash: &str) -> DbResult<()> {
        let affected = self
            .db
            .update(
                &Update::table("users")
                    .set("password_hash", password_hash)
                    .set("updated_at", chrono::Utc::now())
                    .filter(Filter::eq("id", id)),
            )
            .await?;
        if affected == 0 {
            return Err(DbError::not_found("user", id));
        }
        Ok(())
    }
}

// =============================================================================
// Row mapping
// =============================================================================

pub(crate) fn from_row(row: &Row) -> DbResult<User> {
    let role_raw = row.str("role")?;
    let role = UserRole::parse(&role_raw).ok_or_else(|| DbError::CorruptValue {
        column: "role".into(),
        value: role_raw,
    })?;
    Ok(User {
        id: row.str("id")?,
        branch_id: row.opt_str("branch_id")?,
        name: row.str("name")?,
        email: row.str("email")?,
        password_hash: row.str("password_hash")?,
        role,
        is_active: row.bool("is_active")?,
        created_at: row.datetime("created_at")?,
        updated_at: row.datetime("updated_at")?,
    })
}
