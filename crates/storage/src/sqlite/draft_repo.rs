use async_trait::async_trait;
use sqlx::Row;

use exam_core::model::{ExamId, WritingDraft};

use crate::repository::{DraftRepository, StorageError};

use super::SqliteRepository;

#[async_trait]
impl DraftRepository for SqliteRepository {
    async fn save_draft(&self, exam_id: ExamId, draft: &WritingDraft) -> Result<(), StorageError> {
        let payload = serde_json::to_string(draft)
            .map_err(|err| StorageError::Serialization(err.to_string()))?;

        sqlx::query(
            r"
            INSERT INTO writing_drafts (exam_id, payload, saved_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(exam_id) DO UPDATE SET
                payload = excluded.payload,
                saved_at = excluded.saved_at
            ",
        )
        .bind(exam_id.value())
        .bind(payload)
        .bind(draft.last_saved.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|err| StorageError::Connection(err.to_string()))?;
        Ok(())
    }

    async fn get_draft(&self, exam_id: ExamId) -> Result<Option<WritingDraft>, StorageError> {
        let row = sqlx::query("SELECT payload FROM writing_drafts WHERE exam_id = ?1")
            .bind(exam_id.value())
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| StorageError::Connection(err.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let payload: String = row
            .try_get("payload")
            .map_err(|err| StorageError::Serialization(err.to_string()))?;
        let draft = serde_json::from_str(&payload)
            .map_err(|err| StorageError::Serialization(err.to_string()))?;
        Ok(Some(draft))
    }

    async fn clear_draft(&self, exam_id: ExamId) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM writing_drafts WHERE exam_id = ?1")
            .bind(exam_id.value())
            .execute(&self.pool)
            .await
            .map_err(|err| StorageError::Connection(err.to_string()))?;
        Ok(())
    }
}
