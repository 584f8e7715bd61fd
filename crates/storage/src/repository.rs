use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use exam_core::model::{Credentials, ExamId, WritingDraft};

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Read/write access to the persisted bearer credential.
///
/// Absence is an explicit outcome (`Ok(None)`), not an error: a missing
/// credential hands control back to the login flow.
#[async_trait]
pub trait CredentialRepository: Send + Sync {
    /// Persist the credential pair written by the login flow.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the credential cannot be stored.
    async fn save_credentials(&self, credentials: &Credentials) -> Result<(), StorageError>;

    /// Fetch the stored credential, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` for storage failures; a missing credential is
    /// `Ok(None)`.
    async fn get_credentials(&self) -> Result<Option<Credentials>, StorageError>;
}

/// Per-exam persistence for in-progress writing drafts.
#[async_trait]
pub trait DraftRepository: Send + Sync {
    /// Persist or replace the draft for the given exam.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the draft cannot be stored.
    async fn save_draft(&self, exam_id: ExamId, draft: &WritingDraft) -> Result<(), StorageError>;

    /// Fetch the draft for the given exam, if one was saved.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` for storage failures; no draft is `Ok(None)`.
    async fn get_draft(&self, exam_id: ExamId) -> Result<Option<WritingDraft>, StorageError>;

    /// Remove the draft for the given exam. Removing a missing draft is not
    /// an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the delete fails.
    async fn clear_draft(&self, exam_id: ExamId) -> Result<(), StorageError>;
}

/// Bundle of the repositories the services need.
#[derive(Clone)]
pub struct Storage {
    pub credentials: Arc<dyn CredentialRepository>,
    pub drafts: Arc<dyn DraftRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let credentials: Arc<dyn CredentialRepository> = Arc::new(repo.clone());
        let drafts: Arc<dyn DraftRepository> = Arc::new(repo);
        Self {
            credentials,
            drafts,
        }
    }
}

/// Process-local store used by tests and as a fallback.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    credentials: Arc<Mutex<Option<Credentials>>>,
    drafts: Arc<Mutex<HashMap<ExamId, WritingDraft>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialRepository for InMemoryRepository {
    async fn save_credentials(&self, credentials: &Credentials) -> Result<(), StorageError> {
        let mut slot = self
            .credentials
            .lock()
            .map_err(|err| StorageError::Connection(err.to_string()))?;
        *slot = Some(credentials.clone());
        Ok(())
    }

    async fn get_credentials(&self) -> Result<Option<Credentials>, StorageError> {
        let slot = self
            .credentials
            .lock()
            .map_err(|err| StorageError::Connection(err.to_string()))?;
        Ok(slot.clone())
    }
}

#[async_trait]
impl DraftRepository for InMemoryRepository {
    async fn save_draft(&self, exam_id: ExamId, draft: &WritingDraft) -> Result<(), StorageError> {
        let mut drafts = self
            .drafts
            .lock()
            .map_err(|err| StorageError::Connection(err.to_string()))?;
        drafts.insert(exam_id, draft.clone());
        Ok(())
    }

    async fn get_draft(&self, exam_id: ExamId) -> Result<Option<WritingDraft>, StorageError> {
        let drafts = self
            .drafts
            .lock()
            .map_err(|err| StorageError::Connection(err.to_string()))?;
        Ok(drafts.get(&exam_id).cloned())
    }

    async fn clear_draft(&self, exam_id: ExamId) -> Result<(), StorageError> {
        let mut drafts = self
            .drafts
            .lock()
            .map_err(|err| StorageError::Connection(err.to_string()))?;
        drafts.remove(&exam_id);
        Ok(())
    }
}
