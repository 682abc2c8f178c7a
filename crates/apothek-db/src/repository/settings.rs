//! # Settings Repository
//!
//! Key/value settings rows. The sync engine keeps its server URL, auth token
//! and pull watermark here; the shell keeps currency/tax defaults here.

use apothek_core::Setting;
use chrono::Utc;

use crate::adapter::Database;
use crate::error::DbResult;
use crate::query::{Delete, Filter, Insert, OrderDir, Select, Update};
use crate::row::Row;

/// Repository for the settings table.
pub struct SettingsRepository<'a> {
    db: &'a Database,
}

impl<'a> SettingsRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        SettingsRepository { db }
    }

    pub async fn get(&self, key: &str) -> DbResult<Option<String>> {
        let row = self
            .db
            .fetch_optional(&Select::from("settings").filter(Filter::eq("key", key)))
            .await?;
        row.map(|r| r.str("value")).transpose()
    }

    /// Upsert by key.
    pub async fn set(&self, key: &str, value: &str) -> DbResult<()> {
        let now = Utc::now();
        let affected = self
            .db
            .update(
                &Update::table("settings")
                    .set("value", value)
                    .set("updated_at", now)
                    .filter(Filter::eq("key", key)),
            )
            .await?;
        if affected == 0 {
            self.db
                .insert(
                    &Insert::into("settings")
                        .value("key", key)
                        .value("value", value)
                        .value("updated_at", now)
                        .primary_key("key"),
                )
                .await?;
        }
        Ok(())
    }

    pub async fn unset(&self, key: &str) -> DbResult<()> {
        self.db
            .delete(&Delete::from("settings").filter(Filter::eq("key", key)))
            .await?;
        Ok(())
    }

    pub async fn all(&self) -> DbResult<Vec<Setting>> {
        self.db
            .fetch(&Select::from("settings").order_by("key", OrderDir::Asc))
            .await?
            .iter()
            .map(from_row)
            .collect()
    }
}

fn from_row(row: &Row) -> DbResult<Setting> {
    Ok(Setting {
        key: row.str("key")?,
        value: row.str("value")?,
        updated_at: row.datetime("updated_at")?,
    })
}
