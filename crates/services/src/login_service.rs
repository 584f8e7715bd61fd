use std::sync::Arc;

use rand::Rng;
use reqwest::StatusCode;
use tracing::{debug, info};

use exam_core::model::{Credentials, ExamId};
use storage::repository::CredentialRepository;

use crate::error::{ApiError, LoginError};
use crate::exam_client::{AuthGateway, TokenPair};

/// The last name doubles as the password, so it carries the password floor.
pub const MIN_PASSWORD_LEN: usize = 6;

const DEMO_ATTEMPTS: usize = 5;

/// Register-or-login workflow against the auth collaborator.
///
/// The first name is the username surrogate and the last name the password
/// surrogate. On success the bearer/refresh pair is persisted so every
/// phase can read it.
#[derive(Clone)]
pub struct LoginService {
    auth: Arc<dyn AuthGateway>,
    credentials: Arc<dyn CredentialRepository>,
}

impl LoginService {
    #[must_use]
    pub fn new(auth: Arc<dyn AuthGateway>, credentials: Arc<dyn CredentialRepository>) -> Self {
        Self { auth, credentials }
    }

    /// Register (or fall back to login), join the exam, persist the
    /// credential.
    ///
    /// # Errors
    ///
    /// Returns `LoginError` for invalid names, auth failures, or a failed
    /// credential save.
    pub async fn login(
        &self,
        exam_id: ExamId,
        first_name: &str,
        last_name: &str,
    ) -> Result<Credentials, LoginError> {
        let first_name = first_name.trim();
        let last_name = last_name.trim();
        if first_name.is_empty() {
            return Err(LoginError::MissingFirstName);
        }
        if last_name.chars().count() < MIN_PASSWORD_LEN {
            return Err(LoginError::LastNameTooShort {
                min: MIN_PASSWORD_LEN,
            });
        }

        let tokens = self.obtain_tokens(first_name, last_name).await?;
        self.join(&tokens, exam_id).await?;

        let credentials = Credentials::new(
            tokens.access,
            tokens.refresh,
            first_name,
            format!("{first_name} {last_name}"),
        );
        self.credentials.save_credentials(&credentials).await?;
        info!(%exam_id, username = first_name, "login complete");
        Ok(credentials)
    }

    /// Throwaway demo account with a random name pair, retrying a few times
    /// when the random username is already taken.
    ///
    /// # Errors
    ///
    /// Returns `LoginError::DemoExhausted` when every attempt collides, or
    /// any other `LoginError` from the underlying workflow.
    pub async fn login_demo(&self, exam_id: ExamId) -> Result<Credentials, LoginError> {
        for _ in 0..DEMO_ATTEMPTS {
            let (first_name, last_name) = {
                let mut rng = rand::rng();
                (
                    format!("DemoUser{}", rng.random_range(0..10_000)),
                    format!("Password{}", rng.random_range(0..10_000)),
                )
            };
            let tokens = match self.auth.register(&first_name, &last_name).await {
                Ok(Some(tokens)) => tokens,
                Ok(None) => self.auth.login(&first_name, &last_name).await?,
                Err(err) if is_user_conflict(&err) => {
                    debug!(username = first_name, "demo username taken, retrying");
                    continue;
                }
                Err(err) => return Err(err.into()),
            };
            self.join(&tokens, exam_id).await?;

            let credentials =
                Credentials::new(tokens.access, tokens.refresh, first_name, "Demo User");
            self.credentials.save_credentials(&credentials).await?;
            info!(%exam_id, "demo login complete");
            return Ok(credentials);
        }
        Err(LoginError::DemoExhausted)
    }

    async fn obtain_tokens(&self, username: &str, password: &str) -> Result<TokenPair, LoginError> {
        match self.auth.register(username, password).await {
            Ok(Some(tokens)) => Ok(tokens),
            // Registered, but the response carried no tokens.
            Ok(None) => Ok(self.auth.login(username, password).await?),
            // User already exists: log in with the same pair.
            Err(err) if is_user_conflict(&err) => {
                debug!(username, "user exists, falling back to login");
                Ok(self.auth.login(username, password).await?)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn join(&self, tokens: &TokenPair, exam_id: ExamId) -> Result<(), LoginError> {
        match self.auth.join_exam(&tokens.access, exam_id).await {
            Ok(()) => Ok(()),
            // The service answers 400 when the user already joined.
            Err(ApiError::Rejected { status, .. }) if status == StatusCode::BAD_REQUEST => {
                debug!(%exam_id, "already joined exam");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }
}

fn is_user_conflict(err: &ApiError) -> bool {
    matches!(
        err,
        ApiError::Rejected { status, .. }
            if *status == StatusCode::BAD_REQUEST || *status == StatusCode::CONFLICT
    )
}
