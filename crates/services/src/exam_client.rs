use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use exam_core::model::{ExamId, Phase};

use crate::error::ApiError;

/// Token pair issued by the auth collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Token responses arrive in two shapes: nested under `tokens`, or
/// flattened at the top level.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    tokens: Option<TokenPair>,
    access: Option<String>,
    refresh: Option<String>,
}

impl TokenResponse {
    fn into_pair(self) -> Option<TokenPair> {
        if let Some(tokens) = self.tokens {
            return Some(tokens);
        }
        match (self.access, self.refresh) {
            (Some(access), Some(refresh)) => Some(TokenPair { access, refresh }),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: Option<String>,
    message: Option<String>,
}

/// Acknowledgement for a finish call. The service mandates no schema
/// beyond 2xx, so everything is optional.
#[derive(Debug, Default, Deserialize)]
pub struct ServerAck {
    #[serde(default)]
    pub detail: Option<String>,
}

#[derive(Debug, Serialize)]
struct AuthPayload<'a> {
    username: &'a str,
    password: &'a str,
}

/// Writing submissions post both task texts instead of a numbered map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WritingSubmission {
    pub task1: String,
    pub task2: String,
}

/// Exam-phase operations the session controller depends on; faked in tests.
#[async_trait]
pub trait ExamGateway: Send + Sync {
    /// Start the given phase for the exam.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::AuthExpired` on 401, `ApiError` otherwise.
    async fn start_phase(&self, token: &str, exam_id: ExamId, phase: Phase)
    -> Result<(), ApiError>;

    /// Submit the flattened answer map for a timed phase.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::AuthExpired` on 401, `ApiError` otherwise.
    async fn finish_phase(
        &self,
        token: &str,
        exam_id: ExamId,
        phase: Phase,
        answers: &BTreeMap<String, String>,
    ) -> Result<ServerAck, ApiError>;

    /// Submit both writing task texts.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::AuthExpired` on 401, `ApiError` otherwise.
    async fn finish_writing(
        &self,
        token: &str,
        exam_id: ExamId,
        submission: &WritingSubmission,
    ) -> Result<ServerAck, ApiError>;
}

/// Auth and enrolment operations the login workflow depends on; faked in
/// tests.
#[async_trait]
pub trait AuthGateway: Send + Sync {
    /// Register a new account. A 2xx response without tokens is `Ok(None)`;
    /// the caller follows up with `login`.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` for non-2xx responses, including the 400/409
    /// conflict the caller treats as "user exists".
    async fn register(&self, username: &str, password: &str)
    -> Result<Option<TokenPair>, ApiError>;

    /// Log in with existing account credentials.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::MissingTokens` if a 2xx response carries no pair.
    async fn login(&self, username: &str, password: &str) -> Result<TokenPair, ApiError>;

    /// Enrol the authenticated user in the exam.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` for non-2xx responses; the caller tolerates the
    /// 400 the service sends for an already-joined user.
    async fn join_exam(&self, token: &str, exam_id: ExamId) -> Result<(), ApiError>;
}

/// Thin `reqwest` wrapper over the remote exam service.
#[derive(Clone)]
pub struct ExamApi {
    client: Client,
    base_url: String,
}

impl ExamApi {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    /// Abandon the exam without submitting anything; local drafts stay put.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` on failure; callers typically ignore it and leave
    /// anyway.
    pub async fn leave_exam(&self, token: &str, exam_id: ExamId) -> Result<(), ApiError> {
        let response = self
            .client
            .post(self.url(&format!("exam/exams/{exam_id}/leave/")))
            .bearer_auth(token)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }
}

/// Map a non-2xx response to the error taxonomy: 401 means re-login, any
/// other failure carries the optional `detail` message for the banner.
async fn check(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED {
        warn!(%status, "credential rejected by exam service");
        return Err(ApiError::AuthExpired);
    }
    let detail = response
        .json::<ErrorBody>()
        .await
        .ok()
        .and_then(|body| body.detail.or(body.message))
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        });
    warn!(%status, detail, "exam service rejected request");
    Err(ApiError::Rejected { status, detail })
}

#[async_trait]
impl ExamGateway for ExamApi {
    async fn start_phase(
        &self,
        token: &str,
        exam_id: ExamId,
        phase: Phase,
    ) -> Result<(), ApiError> {
        debug!(%exam_id, %phase, "starting phase");
        let response = self
            .client
            .post(self.url(&format!("exam/exams/{exam_id}/start-{}/", phase.wire_name())))
            .bearer_auth(token)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn finish_phase(
        &self,
        token: &str,
        exam_id: ExamId,
        phase: Phase,
        answers: &BTreeMap<String, String>,
    ) -> Result<ServerAck, ApiError> {
        debug!(%exam_id, %phase, slots = answers.len(), "submitting answers");
        let response = self
            .client
            .post(self.url(&format!("exam/exams/{exam_id}/finish-{}/", phase.wire_name())))
            .bearer_auth(token)
            .json(answers)
            .send()
            .await?;
        let response = check(response).await?;
        // Success bodies have no mandated schema.
        Ok(response.json().await.unwrap_or_default())
    }

    async fn finish_writing(
        &self,
        token: &str,
        exam_id: ExamId,
        submission: &WritingSubmission,
    ) -> Result<ServerAck, ApiError> {
        debug!(%exam_id, "submitting writing tasks");
        let response = self
            .client
            .post(self.url(&format!("exam/exams/{exam_id}/finish-writing/")))
            .bearer_auth(token)
            .json(submission)
            .send()
            .await?;
        let response = check(response).await?;
        Ok(response.json().await.unwrap_or_default())
    }
}

#[async_trait]
impl AuthGateway for ExamApi {
    async fn register(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<TokenPair>, ApiError> {
        let response = self
            .client
            .post(self.url("auth/register/"))
            .json(&AuthPayload { username, password })
            .send()
            .await?;
        let response = check(response).await?;
        let body: TokenResponse = response.json().await?;
        Ok(body.into_pair())
    }

    async fn login(&self, username: &str, password: &str) -> Result<TokenPair, ApiError> {
        let response = self
            .client
            .post(self.url("auth/login/"))
            .json(&AuthPayload { username, password })
            .send()
            .await?;
        let response = check(response).await?;
        let body: TokenResponse = response.json().await?;
        body.into_pair().ok_or(ApiError::MissingTokens)
    }

    async fn join_exam(&self, token: &str, exam_id: ExamId) -> Result<(), ApiError> {
        let response = self
            .client
            .post(self.url(&format!("exam/exams/{exam_id}/join/")))
            .bearer_auth(token)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }
}
