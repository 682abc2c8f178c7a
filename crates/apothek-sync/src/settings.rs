//! # Sync Settings & Watermark
//!
//! Server URL, auth token and pull watermark, persisted in the settings
//! table under `sync.*` keys. The watermark is written only by the pull
//! synchronizer, after a batch fully applies; its absence means "never
//! pulled" and forces the full-snapshot path.

use apothek_db::Database;
use chrono::{DateTime, Utc};

use crate::error::{SyncError, SyncResult};

pub const KEY_SERVER_URL: &str = "sync.server_url";
pub const KEY_AUTH_TOKEN: &str = "sync.auth_token";
pub const KEY_LAST_SYNC_AT: &str = "sync.last_sync_at";

/// Snapshot of the persisted sync configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncState {
    pub server_url: Option<String>,
    pub auth_token: Option<String>,
    pub last_sync_at: Option<DateTime<Utc>>,
}

impl SyncState {
    pub fn is_configured(&self) -> bool {
        self.server_url.is_some()
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth_token.is_some()
    }

    /// Server URL or the typed error the synchronizers return.
    pub fn require_server_url(&self) -> SyncResult<&str> {
        self.server_url.as_deref().ok_or(SyncError::Unconfigured)
    }

    /// Auth token or the typed error the synchronizers return.
    pub fn require_auth_token(&self) -> SyncResult<&str> {
        self.auth_token.as_deref().ok_or(SyncError::Unauthenticated)
    }
}

/// Settings-table access for the sync engine.
pub struct SyncSettings<'a> {
    db: &'a Database,
}

impl<'a> SyncSettings<'a> {
    pub fn new(db: &'a Database) -> Self {
        SyncSettings { db }
    }

    pub async fn load(&self) -> SyncResult<SyncState> {
        let settings = self.db.settings();
        let server_url = settings.get(KEY_SERVER_URL).await?;
        let auth_token = settings.get(KEY_AUTH_TOKEN).await?;
        let last_sync_at = match settings.get(KEY_LAST_SYNC_AT).await? {
            Some(raw) => Some(
                DateTime::parse_from_rfc3339(&raw)
                    .map_err(|e| SyncError::Protocol(format!("stored watermark {raw:?}: {e}")))?
                    .with_timezone(&Utc),
            ),
            None => None,
        };
        Ok(SyncState {
            server_url,
            auth_token,
            last_sync_at,
        })
    }

    /// Stores the server URL, normalized without a trailing slash.
    pub async fn set_server_url(&self, server_url: &str) -> SyncResult<()> {
        let normalized = server_url.trim().trim_end_matches('/').to_string();
        let parsed = url::Url::parse(&normalized)
            .map_err(|e| SyncError::InvalidUrl(format!("{normalized}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(SyncError::InvalidUrl(format!(
                "{normalized}: expected http or https"
            )));
        }
        self.db.settings().set(KEY_SERVER_URL, &normalized).await?;
        Ok(())
    }

    pub async fn set_auth_token(&self, token: &str) -> SyncResult<()> {
        self.db.settings().set(KEY_AUTH_TOKEN, token).await?;
        Ok(())
    }

    /// Drops the stored token (sign-out, or server said 401).
    pub async fn clear_auth_token(&self) -> SyncResult<()> {
        self.db.settings().unset(KEY_AUTH_TOKEN).await?;
        Ok(())
    }

    /// Advances the watermark. Pull-synchronizer only, post-batch.
    pub async fn set_last_sync_at(&self, at: DateTime<Utc>) -> SyncResult<()> {
        self.db
            .settings()
            .set(KEY_LAST_SYNC_AT, &at.to_rfc3339())
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apothek_db::DatabaseConfig;

    async fn test_db() -> Database {
        let db = Database::connect(&DatabaseConfig::embedded(":memory:"))
            .await
            .unwrap();
        db.initialize().await.unwrap();
        db
    }

    #[tokio::test]
    async fn fresh_database_has_no_sync_state() {
        let db = test_db().await;
        let state = SyncSettings::new(&db).load().await.unwrap();
        assert!(!state.is_configured());
        assert!(!state.is_authenticated());
        assert_eq!(state.last_sync_at, None);
        assert!(matches!(
            state.require_server_url(),
            Err(SyncError::Unconfigured)
        ));
    }

    #[tokio::test]
    async fn server_url_is_normalized_and_validated() {
        let db = test_db().await;
        let settings = SyncSettings::new(&db);

        settings
            .set_server_url("https://cloud.apothek.dev/ ")
            .await
            .unwrap();
        let state = settings.load().await.unwrap();
        assert_eq!(
            state.server_url.as_deref(),
            Some("https://cloud.apothek.dev")
        );

        assert!(matches!(
            settings.set_server_url("ftp://cloud.apothek.dev").await,
            Err(SyncError::InvalidUrl(_))
        ));
        assert!(matches!(
            settings.set_server_url("not a url").await,
            Err(SyncError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn watermark_round_trip() {
        let db = test_db().await;
        let settings = SyncSettings::new(&db);

        let at = Utc::now();
        settings.set_last_sync_at(at).await.unwrap();
        let state = settings.load().await.unwrap();
        assert_eq!(state.last_sync_at.unwrap().timestamp(), at.timestamp());
    }

    #[tokio::test]
    async fn token_set_and_clear() {
        let db = test_db().await;
        let settings = SyncSettings::new(&db);

        settings.set_auth_token("jwt-abc").await.unwrap();
        assert!(settings.load().await.unwrap().is_authenticated());
        settings.clear_auth_token().await.unwrap();
        assert!(!settings.load().await.unwrap().is_authenticated());
    }
}
