//! Shared error types for the services crate.

use thiserror::Error;

use exam_core::model::{AnswerError, Phase, PhaseSessionError};
use storage::repository::StorageError;

/// Errors emitted by the exam HTTP client.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ApiError {
    /// 401-class response: the stored credential is invalid or expired and
    /// only a fresh login helps.
    #[error("credential expired or rejected")]
    AuthExpired,

    /// Any other non-2xx response, with the service's `detail` message when
    /// one was provided.
    #[error("request rejected with status {status}: {detail}")]
    Rejected {
        status: reqwest::StatusCode,
        detail: String,
    },

    /// A 2xx response that should have carried tokens but did not.
    #[error("response did not include a token pair")]
    MissingTokens,

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl ApiError {
    /// True when the only remedy is handing control back to the login flow.
    #[must_use]
    pub fn requires_login(&self) -> bool {
        matches!(self, ApiError::AuthExpired)
    }
}

/// Errors emitted by `LoginService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LoginError {
    #[error("first name is required (used as username)")]
    MissingFirstName,

    #[error("last name must be at least {min} characters (used as password)")]
    LastNameTooShort { min: usize },

    #[error("could not find a free demo username")]
    DemoExhausted,

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `SessionController`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionControllerError {
    #[error("phase {0} has no numbered answer sheet")]
    NoAnswerSheet(Phase),

    #[error("phase {0} takes no writing tasks")]
    NotWritingPhase(Phase),

    #[error(transparent)]
    Session(#[from] PhaseSessionError),

    #[error(transparent)]
    Answer(#[from] AnswerError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `DraftService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DraftServiceError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}
