//! # Default Data Seeder
//!
//! Seeds a default administrator, the main branch, and default settings.
//! Runs on every `initialize()`; each step re-checks its own precondition,
//! so the seeder is idempotent:
//!
//! - administrator: only when no ADMIN-role row exists
//! - main branch: only when the branch table is empty
//! - settings: only when the settings table is empty

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHasher, SaltString};
use argon2::Argon2;
use chrono::Utc;
use tracing::info;

use apothek_core::{new_id, ADMIN_ROLE, MAIN_BRANCH_CODE};

use crate::adapter::StorageAdapter;
use crate::error::{DbError, DbResult};
use crate::query::{Aggregate, Filter, Insert, Select};

/// First-login credential for the seeded administrator. The shell forces a
/// password change on first login.
const DEFAULT_ADMIN_EMAIL: &str = "admin@apothek.local";
const DEFAULT_ADMIN_PASSWORD: &str = "admin123";

/// Default settings rows written into an empty settings table.
const DEFAULT_SETTINGS: &[(&str, &str)] = &[
    ("currency", "USD"),
    ("tax_rate", "0"),
    ("invoice_prefix", "INV"),
    ("loyalty_points_per_unit", "1"),
    ("low_stock_threshold", "10"),
];

/// Runs all seed steps. Safe to call on every startup.
pub(crate) async fn run<A>(adapter: &A) -> DbResult<()>
where
    A: StorageAdapter + ?Sized,
{
    let branch_id = seed_main_branch(adapter).await?;
    seed_admin(adapter, branch_id).await?;
    seed_settings(adapter).await?;
    Ok(())
}

async fn count(adapter: &(impl StorageAdapter + ?Sized), q: Aggregate) -> DbResult<i64> {
    let rows = adapter.aggregate(&q).await?;
    rows.first()
        .ok_or_else(|| DbError::Seed("count query returned no rows".into()))?
        .i64("n")
}

/// Creates the main branch when the branch table is empty. Returns the id of
/// the branch the admin should be attached to, if one exists.
async fn seed_main_branch(adapter: &(impl StorageAdapter + ?Sized)) -> DbResult<Option<String>> {
    let existing = count(adapter, Aggregate::over("branches").count("n")).await?;
    if existing > 0 {
        let main = adapter
            .fetch_optional(
                &Select::from("branches").filter(Filter::eq("code", MAIN_BRANCH_CODE)),
            )
            .await?;
        return match main {
            Some(row) => Ok(Some(row.str("id")?)),
            None => Ok(None),
        };
    }

    let id = new_id();
    let now = Utc::now();
    adapter
        .insert(
            &Insert::into("branches")
                .value("id", id.clone())
                .value("name", "Main Branch")
                .value("code", MAIN_BRANCH_CODE)
                .value("address", Option::<String>::None)
                .value("phone", Option::<String>::None)
                .value("is_active", true)
                .value("created_at", now)
                .value("updated_at", now),
        )
        .await?;
    info!(branch_id = %id, "seeded main branch");
    Ok(Some(id))
}

/// Creates the default administrator when no ADMIN-role account exists.
async fn seed_admin(
    adapter: &(impl StorageAdapter + ?Sized),
    branch_id: Option<String>,
) -> DbResult<()> {
    let admins = count(
        adapter,
        Aggregate::over("users")
            .count("n")
            .filter(Filter::eq("role", ADMIN_ROLE)),
    )
    .await?;
    if admins > 0 {
        return Ok(());
    }

    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(DEFAULT_ADMIN_PASSWORD.as_bytes(), &salt)
        .map_err(|e| DbError::Seed(format!("password hash failed: {e}")))?
        .to_string();

    let id = new_id();
    let now = Utc::now();
    adapter
        .insert(
            &Insert::into("users")
                .value("id", id.clone())
                .value("branch_id", branch_id)
                .value("name", "Administrator")
                .value("email", DEFAULT_ADMIN_EMAIL)
                .value("password_hash", password_hash)
                .value("role", ADMIN_ROLE)
                .value("is_active", true)
                .value("created_at", now)
                .value("updated_at", now),
        )
        .await?;
    info!(user_id = %id, email = DEFAULT_ADMIN_EMAIL, "seeded administrator");
    Ok(())
}

/// Writes the default settings rows into an empty settings table.
async fn seed_settings(adapter: &(impl StorageAdapter + ?Sized)) -> DbResult<()> {
    let existing = count(adapter, Aggregate::over("settings").count("n")).await?;
    if existing > 0 {
        return Ok(());
    }

    let now = Utc::now();
    for (key, value) in DEFAULT_SETTINGS {
        adapter
            .insert(
                &Insert::into("settings")
                    .value("key", *key)
                    .value("value", *value)
                    .value("updated_at", now)
                    .primary_key("key"),
            )
            .await?;
    }
    info!(count = DEFAULT_SETTINGS.len(), "seeded default settings");
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::adapter::StorageAdapter;
    use crate::embedded::EmbeddedAdapter;
    use crate::query::{Aggregate, Filter, Select};

    #[tokio::test]
    async fn seeding_is_idempotent() {
        let mut adapter = EmbeddedAdapter::in_memory();
        adapter.connect().await.unwrap();

        adapter.initialize().await.unwrap();
        adapter.initialize().await.unwrap();
        adapter.initialize().await.unwrap();

        let admins = adapter
            .aggregate(
                &Aggregate::over("users")
                    .count("n")
                    .filter(Filter::eq("role", "ADMIN")),
            )
            .await
            .unwrap();
        assert_eq!(admins[0].i64("n").unwrap(), 1);

        let branches = adapter
            .aggregate(&Aggregate::over("branches").count("n"))
            .await
            .unwrap();
        assert_eq!(branches[0].i64("n").unwrap(), 1);

        let settings = adapter
            .aggregate(&Aggregate::over("settings").count("n"))
            .await
            .unwrap();
        assert_eq!(settings[0].i64("n").unwrap(), super::DEFAULT_SETTINGS.len() as i64);
    }

    #[tokio::test]
    async fn admin_is_attached_to_main_branch() {
        let mut adapter = EmbeddedAdapter::in_memory();
        adapter.connect().await.unwrap();
        adapter.initialize().await.unwrap();

        let branch = adapter
            .fetch_optional(&Select::from("branches").filter(Filter::eq("code", "MAIN")))
            .await
            .unwrap()
            .unwrap();
        let admin = adapter
            .fetch_optional(&Select::from("users").filter(Filter::eq("role", "ADMIN")))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            admin.opt_str("branch_id").unwrap().as_deref(),
            Some(branch.str("id").unwrap().as_str())
        );
        // The hash, not the password, is stored.
        assert!(admin.str("password_hash").unwrap().starts_with("$argon2"));
    }
}
