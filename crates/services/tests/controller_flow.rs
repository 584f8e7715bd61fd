use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tokio::sync::mpsc;

use exam_core::model::{
    Credentials, ExamId, Phase, SessionStatus, SubmitTrigger, Tick, WritingTask,
};
use services::{
    ApiError, ExamGateway, ServerAck, SessionController, SessionControllerError, StartOutcome,
    SubmitOutcome, WritingSubmission,
};
use storage::repository::{CredentialRepository, DraftRepository, InMemoryRepository};

#[derive(Default)]
struct FakeGateway {
    start_responses: Mutex<VecDeque<Result<(), ApiError>>>,
    finish_responses: Mutex<VecDeque<Result<(), ApiError>>>,
    finish_calls: AtomicUsize,
    last_answers: Mutex<Option<BTreeMap<String, String>>>,
    last_writing: Mutex<Option<WritingSubmission>>,
}

impl FakeGateway {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn queue_start(&self, response: Result<(), ApiError>) {
        self.start_responses.lock().unwrap().push_back(response);
    }

    fn queue_finish(&self, response: Result<(), ApiError>) {
        self.finish_responses.lock().unwrap().push_back(response);
    }

    fn finish_calls(&self) -> usize {
        self.finish_calls.load(Ordering::SeqCst)
    }

    fn last_answers(&self) -> Option<BTreeMap<String, String>> {
        self.last_answers.lock().unwrap().clone()
    }

    fn last_writing(&self) -> Option<WritingSubmission> {
        self.last_writing.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExamGateway for FakeGateway {
    async fn start_phase(
        &self,
        _token: &str,
        _exam_id: ExamId,
        _phase: Phase,
    ) -> Result<(), ApiError> {
        self.start_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()))
    }

    async fn finish_phase(
        &self,
        _token: &str,
        _exam_id: ExamId,
        _phase: Phase,
        answers: &BTreeMap<String, String>,
    ) -> Result<ServerAck, ApiError> {
        self.finish_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_answers.lock().unwrap() = Some(answers.clone());
        self.finish_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()))
            .map(|()| ServerAck::default())
    }

    async fn finish_writing(
        &self,
        _token: &str,
        _exam_id: ExamId,
        submission: &WritingSubmission,
    ) -> Result<ServerAck, ApiError> {
        self.finish_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_writing.lock().unwrap() = Some(submission.clone());
        self.finish_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()))
            .map(|()| ServerAck::default())
    }
}

fn rejected(status: StatusCode) -> ApiError {
    ApiError::Rejected {
        status,
        detail: "rejected".into(),
    }
}

async fn logged_in_repo() -> Arc<InMemoryRepository> {
    let repo = Arc::new(InMemoryRepository::new());
    repo.save_credentials(&Credentials::new("access", "refresh", "Alice", "Alice Example"))
        .await
        .unwrap();
    repo
}

async fn active_controller(
    phase: Phase,
    gateway: Arc<FakeGateway>,
) -> SessionController {
    let repo = logged_in_repo().await;
    let mut controller = SessionController::new(ExamId::new(3), phase, gateway, repo);
    controller.start().await.unwrap();
    controller
}

#[tokio::test]
async fn start_without_credential_returns_to_login() {
    let repo = Arc::new(InMemoryRepository::new());
    let mut controller =
        SessionController::new(ExamId::new(3), Phase::Listening, FakeGateway::new(), repo.clone());

    assert_eq!(controller.start().await.unwrap(), StartOutcome::LoginRequired);
    assert_eq!(controller.status(), SessionStatus::Uninitialized);

    // After re-login the same session can start.
    repo.save_credentials(&Credentials::new("access", "refresh", "Alice", "Alice Example"))
        .await
        .unwrap();
    assert_eq!(
        controller.start().await.unwrap(),
        StartOutcome::Started {
            countdown_secs: Some(1800)
        }
    );
}

#[tokio::test]
async fn start_rejected_with_401_stays_retryable() {
    let gateway = FakeGateway::new();
    gateway.queue_start(Err(ApiError::AuthExpired));
    let repo = logged_in_repo().await;
    let mut controller =
        SessionController::new(ExamId::new(3), Phase::Reading, gateway, repo);

    assert_eq!(controller.start().await.unwrap(), StartOutcome::LoginRequired);
    assert_eq!(controller.status(), SessionStatus::Uninitialized);

    // No stale one-shot guard: the next start goes through.
    assert_eq!(
        controller.start().await.unwrap(),
        StartOutcome::Started {
            countdown_secs: Some(3600)
        }
    );
}

#[tokio::test]
async fn failed_start_supports_manual_retry() {
    let gateway = FakeGateway::new();
    gateway.queue_start(Err(rejected(StatusCode::SERVICE_UNAVAILABLE)));
    let repo = logged_in_repo().await;
    let mut controller =
        SessionController::new(ExamId::new(3), Phase::Listening, gateway, repo);

    assert!(matches!(
        controller.start().await,
        Err(SessionControllerError::Api(_))
    ));
    assert_eq!(controller.status(), SessionStatus::Failed);

    assert!(controller.start().await.is_ok());
    assert_eq!(controller.status(), SessionStatus::Active);
}

#[tokio::test]
async fn manual_submit_flattens_and_navigates() {
    let gateway = FakeGateway::new();
    let mut controller = active_controller(Phase::Listening, gateway.clone()).await;

    controller.set_scalar("q1", "breakfast").unwrap();
    controller.toggle_selection("q22", "A").unwrap();
    controller.toggle_selection("q22", "B").unwrap();
    controller.toggle_selection("q22", "C").unwrap();

    let outcome = controller.submit(SubmitTrigger::Manual).await.unwrap();
    assert_eq!(
        outcome,
        SubmitOutcome::Submitted {
            next_phase: Some(Phase::Reading),
            redirect_delay: Duration::from_secs(2),
        }
    );
    assert_eq!(controller.status(), SessionStatus::Submitted);

    let sent = gateway.last_answers().unwrap();
    assert_eq!(sent.len(), 40);
    assert_eq!(sent.get("1"), Some(&"breakfast".to_string()));
    assert_eq!(sent.get("22"), Some(&"A".to_string()));
    assert_eq!(sent.get("23"), Some(&"B".to_string()));

    // Post-submission edits are rejected: status gates input.
    assert!(matches!(
        controller.set_scalar("q2", "late"),
        Err(SessionControllerError::Session(_))
    ));
}

#[tokio::test]
async fn submission_is_single_flight() {
    let gateway = FakeGateway::new();
    let mut controller = active_controller(Phase::Listening, gateway.clone()).await;

    assert!(matches!(
        controller.submit(SubmitTrigger::Manual).await.unwrap(),
        SubmitOutcome::Submitted { .. }
    ));
    assert_eq!(
        controller.submit(SubmitTrigger::Auto).await.unwrap(),
        SubmitOutcome::AlreadyInFlight
    );
    assert_eq!(gateway.finish_calls(), 1);
}

#[tokio::test]
async fn failed_submit_reopens_inputs_for_retry() {
    let gateway = FakeGateway::new();
    gateway.queue_finish(Err(rejected(StatusCode::BAD_GATEWAY)));
    let mut controller = active_controller(Phase::Reading, gateway.clone()).await;

    controller.set_scalar("q1", "TRUE").unwrap();
    assert!(controller.submit(SubmitTrigger::Manual).await.is_err());
    assert_eq!(controller.status(), SessionStatus::Active);

    // The user can keep editing and retry immediately.
    controller.set_scalar("q2", "FALSE").unwrap();
    assert!(matches!(
        controller.submit(SubmitTrigger::Manual).await.unwrap(),
        SubmitOutcome::Submitted { .. }
    ));
    assert_eq!(gateway.finish_calls(), 2);
}

#[tokio::test]
async fn countdown_expiry_auto_submits_with_longer_delay() {
    let gateway = FakeGateway::new();
    let mut controller = active_controller(Phase::Listening, gateway.clone()).await;
    controller.set_scalar("q1", "kept answer").unwrap();

    for _ in 0..1799 {
        assert!(matches!(controller.tick(), Tick::Running { .. }));
    }
    assert_eq!(controller.remaining_secs(), Some(1));
    assert_eq!(controller.tick(), Tick::Expired);

    let outcome = controller.submit(SubmitTrigger::Auto).await.unwrap();
    assert_eq!(
        outcome,
        SubmitOutcome::Submitted {
            next_phase: Some(Phase::Reading),
            redirect_delay: Duration::from_secs(3),
        }
    );
    assert_eq!(
        gateway.last_answers().unwrap().get("1"),
        Some(&"kept answer".to_string())
    );
}

#[tokio::test]
async fn drive_countdown_submits_once_at_expiry() {
    let gateway = FakeGateway::new();
    let mut controller = active_controller(Phase::Listening, gateway.clone()).await;

    let (tx, mut ticks) = mpsc::channel(1);
    tokio::spawn(async move {
        for _ in 0..1800 {
            if tx.send(()).await.is_err() {
                break;
            }
        }
    });

    let outcome = controller.drive_countdown(&mut ticks).await.unwrap();
    assert!(matches!(outcome, Some(SubmitOutcome::Submitted { .. })));
    assert_eq!(gateway.finish_calls(), 1);
    assert_eq!(controller.remaining_secs(), Some(0));
}

#[tokio::test]
async fn drive_countdown_stops_when_ticker_is_torn_down() {
    let gateway = FakeGateway::new();
    let mut controller = active_controller(Phase::Listening, gateway.clone()).await;

    let (tx, mut ticks) = mpsc::channel(1);
    drop(tx);

    assert_eq!(controller.drive_countdown(&mut ticks).await.unwrap(), None);
    assert_eq!(gateway.finish_calls(), 0);
}

#[tokio::test]
async fn writing_draft_is_restored_saved_and_cleared() {
    let gateway = FakeGateway::new();
    let repo = logged_in_repo().await;
    let drafts: Arc<InMemoryRepository> = repo.clone();

    let mut controller =
        SessionController::new(ExamId::new(3), Phase::Writing, gateway.clone(), repo.clone())
            .with_draft_store(drafts.clone());

    assert_eq!(
        controller.start().await.unwrap(),
        StartOutcome::Started {
            countdown_secs: None
        }
    );

    let count = controller
        .set_task_text(WritingTask::Task1, "the chart shows three levels")
        .await
        .unwrap();
    assert_eq!(count, 5);

    // The edit was autosaved.
    let saved = drafts.get_draft(ExamId::new(3)).await.unwrap().unwrap();
    assert_eq!(saved.task1, "the chart shows three levels");

    controller
        .set_task_text(WritingTask::Task2, "both views have merit")
        .await
        .unwrap();

    let outcome = controller.submit(SubmitTrigger::Manual).await.unwrap();
    assert_eq!(
        outcome,
        SubmitOutcome::Submitted {
            next_phase: None,
            redirect_delay: Duration::from_secs(2),
        }
    );
    let sent = gateway.last_writing().unwrap();
    assert_eq!(sent.task1, "the chart shows three levels");
    assert_eq!(sent.task2, "both views have merit");

    // Confirmed submission clears the local draft.
    assert!(drafts.get_draft(ExamId::new(3)).await.unwrap().is_none());
}

#[tokio::test]
async fn failed_writing_submit_keeps_the_draft() {
    let gateway = FakeGateway::new();
    gateway.queue_finish(Err(rejected(StatusCode::INTERNAL_SERVER_ERROR)));
    let repo = logged_in_repo().await;

    let mut controller =
        SessionController::new(ExamId::new(3), Phase::Writing, gateway, repo.clone())
            .with_draft_store(repo.clone());
    controller.start().await.unwrap();
    controller
        .set_task_text(WritingTask::Task1, "draft text")
        .await
        .unwrap();

    assert!(controller.submit(SubmitTrigger::Manual).await.is_err());
    assert_eq!(controller.status(), SessionStatus::Active);
    assert!(repo.get_draft(ExamId::new(3)).await.unwrap().is_some());
}

#[tokio::test]
async fn writing_reload_restores_the_saved_draft() {
    let gateway = FakeGateway::new();
    let repo = logged_in_repo().await;

    let mut first =
        SessionController::new(ExamId::new(3), Phase::Writing, gateway.clone(), repo.clone())
            .with_draft_store(repo.clone());
    first.start().await.unwrap();
    first
        .set_task_text(WritingTask::Task2, "an essay in progress")
        .await
        .unwrap();
    drop(first);

    // A fresh mount picks the draft back up.
    let mut second = SessionController::new(ExamId::new(3), Phase::Writing, gateway, repo.clone())
        .with_draft_store(repo);
    second.start().await.unwrap();
    let draft = second.draft().unwrap();
    assert_eq!(draft.task2, "an essay in progress");
    assert_eq!(draft.word_count2, 4);
}
