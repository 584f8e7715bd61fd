use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;

use exam_core::model::Credentials;

use crate::repository::{CredentialRepository, StorageError};

use super::SqliteRepository;

#[async_trait]
impl CredentialRepository for SqliteRepository {
    async fn save_credentials(&self, credentials: &Credentials) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO credentials (id, access_token, refresh_token, username, display_name, saved_at)
            VALUES (1, ?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                username = excluded.username,
                display_name = excluded.display_name,
                saved_at = excluded.saved_at
            ",
        )
        .bind(&credentials.access_token)
        .bind(&credentials.refresh_token)
        .bind(&credentials.username)
        .bind(&credentials.display_name)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|err| StorageError::Connection(err.to_string()))?;
        Ok(())
    }

    async fn get_credentials(&self) -> Result<Option<Credentials>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT access_token, refresh_token, username, display_name
            FROM credentials
            WHERE id = 1
            ",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| StorageError::Connection(err.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let access_token: String = row
            .try_get("access_token")
            .map_err(|err| StorageError::Serialization(err.to_string()))?;
        let refresh_token: String = row
            .try_get("refresh_token")
            .map_err(|err| StorageError::Serialization(err.to_string()))?;
        let username: String = row
            .try_get("username")
            .map_err(|err| StorageError::Serialization(err.to_string()))?;
        let display_name: String = row
            .try_get("display_name")
            .map_err(|err| StorageError::Serialization(err.to_string()))?;

        Ok(Some(Credentials::new(
            access_token,
            refresh_token,
            username,
            display_name,
        )))
    }
}
