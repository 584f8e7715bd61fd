use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::StatusCode;

use exam_core::model::ExamId;
use services::{ApiError, AuthGateway, LoginError, LoginService, TokenPair};
use storage::repository::{CredentialRepository, InMemoryRepository};

fn pair() -> TokenPair {
    TokenPair {
        access: "access-token".into(),
        refresh: "refresh-token".into(),
    }
}

fn rejected(status: StatusCode) -> ApiError {
    ApiError::Rejected {
        status,
        detail: "rejected".into(),
    }
}

#[derive(Default)]
struct FakeAuth {
    register_responses: Mutex<VecDeque<Result<Option<TokenPair>, ApiError>>>,
    login_responses: Mutex<VecDeque<Result<TokenPair, ApiError>>>,
    join_responses: Mutex<VecDeque<Result<(), ApiError>>>,
    register_calls: AtomicUsize,
    login_calls: AtomicUsize,
    last_registered: Mutex<Option<(String, String)>>,
}

impl FakeAuth {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn queue_register(&self, response: Result<Option<TokenPair>, ApiError>) {
        self.register_responses.lock().unwrap().push_back(response);
    }

    fn queue_login(&self, response: Result<TokenPair, ApiError>) {
        self.login_responses.lock().unwrap().push_back(response);
    }

    fn queue_join(&self, response: Result<(), ApiError>) {
        self.join_responses.lock().unwrap().push_back(response);
    }

    fn register_calls(&self) -> usize {
        self.register_calls.load(Ordering::SeqCst)
    }

    fn login_calls(&self) -> usize {
        self.login_calls.load(Ordering::SeqCst)
    }

    fn last_registered(&self) -> Option<(String, String)> {
        self.last_registered.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuthGateway for FakeAuth {
    async fn register(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<TokenPair>, ApiError> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_registered.lock().unwrap() = Some((username.to_string(), password.to_string()));
        self.register_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(Some(pair())))
    }

    async fn login(&self, _username: &str, _password: &str) -> Result<TokenPair, ApiError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        self.login_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(pair()))
    }

    async fn join_exam(&self, _token: &str, _exam_id: ExamId) -> Result<(), ApiError> {
        self.join_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()))
    }
}

fn service(auth: Arc<FakeAuth>, repo: Arc<InMemoryRepository>) -> LoginService {
    LoginService::new(auth, repo)
}

#[tokio::test]
async fn rejects_missing_first_name() {
    let repo = Arc::new(InMemoryRepository::new());
    let login = service(FakeAuth::new(), repo.clone());

    let err = login.login(ExamId::new(3), "   ", "longenough").await;
    assert!(matches!(err, Err(LoginError::MissingFirstName)));
    assert!(repo.get_credentials().await.unwrap().is_none());
}

#[tokio::test]
async fn rejects_short_last_name() {
    let login = service(FakeAuth::new(), Arc::new(InMemoryRepository::new()));

    let err = login.login(ExamId::new(3), "Alice", "short").await;
    assert!(matches!(
        err,
        Err(LoginError::LastNameTooShort { min: 6 })
    ));
}

#[tokio::test]
async fn registration_persists_the_credential() {
    let auth = FakeAuth::new();
    let repo = Arc::new(InMemoryRepository::new());
    let login = service(auth.clone(), repo.clone());

    let credentials = login
        .login(ExamId::new(3), "  Alice ", "Example")
        .await
        .unwrap();

    // Names are trimmed; first name doubles as the username.
    assert_eq!(
        auth.last_registered(),
        Some(("Alice".to_string(), "Example".to_string()))
    );
    assert_eq!(credentials.username, "Alice");
    assert_eq!(credentials.display_name, "Alice Example");
    assert_eq!(credentials.access_token, "access-token");
    assert_eq!(repo.get_credentials().await.unwrap(), Some(credentials));
    assert_eq!(auth.login_calls(), 0);
}

#[tokio::test]
async fn existing_user_falls_back_to_login() {
    let auth = FakeAuth::new();
    auth.queue_register(Err(rejected(StatusCode::BAD_REQUEST)));
    let repo = Arc::new(InMemoryRepository::new());
    let login = service(auth.clone(), repo.clone());

    let credentials = login.login(ExamId::new(3), "Alice", "Example").await.unwrap();

    assert_eq!(auth.register_calls(), 1);
    assert_eq!(auth.login_calls(), 1);
    assert_eq!(repo.get_credentials().await.unwrap(), Some(credentials));
}

#[tokio::test]
async fn tokenless_registration_falls_back_to_login() {
    let auth = FakeAuth::new();
    auth.queue_register(Ok(None));
    let login = service(auth.clone(), Arc::new(InMemoryRepository::new()));

    login.login(ExamId::new(3), "Alice", "Example").await.unwrap();
    assert_eq!(auth.login_calls(), 1);
}

#[tokio::test]
async fn other_registration_failures_surface() {
    let auth = FakeAuth::new();
    auth.queue_register(Err(rejected(StatusCode::INTERNAL_SERVER_ERROR)));
    let login = service(auth.clone(), Arc::new(InMemoryRepository::new()));

    let err = login.login(ExamId::new(3), "Alice", "Example").await;
    assert!(matches!(err, Err(LoginError::Api(_))));
    assert_eq!(auth.login_calls(), 0);
}

#[tokio::test]
async fn already_joined_is_tolerated() {
    let auth = FakeAuth::new();
    auth.queue_join(Err(rejected(StatusCode::BAD_REQUEST)));
    let repo = Arc::new(InMemoryRepository::new());
    let login = service(auth, repo.clone());

    login.login(ExamId::new(3), "Alice", "Example").await.unwrap();
    assert!(repo.get_credentials().await.unwrap().is_some());
}

#[tokio::test]
async fn join_server_errors_surface() {
    let auth = FakeAuth::new();
    auth.queue_join(Err(rejected(StatusCode::INTERNAL_SERVER_ERROR)));
    let repo = Arc::new(InMemoryRepository::new());
    let login = service(auth, repo.clone());

    let err = login.login(ExamId::new(3), "Alice", "Example").await;
    assert!(matches!(err, Err(LoginError::Api(_))));
    assert!(repo.get_credentials().await.unwrap().is_none());
}

#[tokio::test]
async fn demo_login_retries_taken_usernames() {
    let auth = FakeAuth::new();
    auth.queue_register(Err(rejected(StatusCode::BAD_REQUEST)));
    auth.queue_register(Err(rejected(StatusCode::CONFLICT)));
    let repo = Arc::new(InMemoryRepository::new());
    let login = service(auth.clone(), repo.clone());

    let credentials = login.login_demo(ExamId::new(3)).await.unwrap();

    assert_eq!(auth.register_calls(), 3);
    assert!(credentials.username.starts_with("DemoUser"));
    assert_eq!(credentials.display_name, "Demo User");
    assert_eq!(repo.get_credentials().await.unwrap(), Some(credentials));
}

#[tokio::test]
async fn demo_login_gives_up_after_bounded_attempts() {
    let auth = FakeAuth::new();
    for _ in 0..5 {
        auth.queue_register(Err(rejected(StatusCode::BAD_REQUEST)));
    }
    let login = service(auth.clone(), Arc::new(InMemoryRepository::new()));

    let err = login.login_demo(ExamId::new(3)).await;
    assert!(matches!(err, Err(LoginError::DemoExhausted)));
    assert_eq!(auth.register_calls(), 5);
}
