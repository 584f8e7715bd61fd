use std::sync::Arc;

use exam_core::Clock;
use exam_core::model::{ExamId, WritingDraft};
use storage::repository::DraftRepository;

use crate::error::DraftServiceError;

/// Save/load/clear for the writing phase's local draft, independent of the
/// remote session.
#[derive(Clone)]
pub struct DraftService {
    drafts: Arc<dyn DraftRepository>,
    clock: Clock,
}

impl DraftService {
    #[must_use]
    pub fn new(drafts: Arc<dyn DraftRepository>) -> Self {
        Self {
            drafts,
            clock: Clock::default_clock(),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Persist both task texts, recounting words and stamping the save time.
    ///
    /// # Errors
    ///
    /// Returns `DraftServiceError` on storage failures.
    pub async fn save(
        &self,
        exam_id: ExamId,
        task1: &str,
        task2: &str,
    ) -> Result<WritingDraft, DraftServiceError> {
        let draft = WritingDraft::from_texts(task1, task2, self.clock.now());
        self.drafts.save_draft(exam_id, &draft).await?;
        Ok(draft)
    }

    /// Load the saved draft for this exam, if any.
    ///
    /// # Errors
    ///
    /// Returns `DraftServiceError` on storage failures.
    pub async fn load(&self, exam_id: ExamId) -> Result<Option<WritingDraft>, DraftServiceError> {
        Ok(self.drafts.get_draft(exam_id).await?)
    }

    /// Drop the saved draft, typically after a confirmed submission.
    ///
    /// # Errors
    ///
    /// Returns `DraftServiceError` on storage failures.
    pub async fn clear(&self, exam_id: ExamId) -> Result<(), DraftServiceError> {
        Ok(self.drafts.clear_draft(exam_id).await?)
    }
}
