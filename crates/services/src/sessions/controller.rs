use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{info, warn};

use exam_core::Clock;
use exam_core::model::{
    AnswerSheet, AnswerValue, ExamId, Phase, PhaseSchema, PhaseSession, SessionStatus, SubmitGate,
    SubmitTrigger, Tick, WritingDraft, WritingTask,
};
use storage::repository::{CredentialRepository, DraftRepository};

use crate::error::{ApiError, SessionControllerError};
use crate::exam_client::{ExamGateway, WritingSubmission};

/// Redirect pause after a manual submission.
const MANUAL_REDIRECT_DELAY: Duration = Duration::from_secs(2);
/// Longer pause after an auto-submission so the time's-up notice is
/// readable before navigation.
const AUTO_REDIRECT_DELAY: Duration = Duration::from_secs(3);

/// Outcome of a start attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// Phase is active; the countdown is armed for timed phases.
    Started { countdown_secs: Option<u32> },
    /// No usable credential; control returns to the login flow. The
    /// session stays startable for after re-login.
    LoginRequired,
}

/// Outcome of a submit attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Submitted {
        next_phase: Option<Phase>,
        redirect_delay: Duration,
    },
    /// Another trigger already won the single-flight gate; no second
    /// finish call was issued.
    AlreadyInFlight,
    /// The credential vanished or was rejected mid-session.
    LoginRequired,
}

/// Orchestrates one phase attempt: credential lookup, phase start,
/// countdown, answer accumulation, and manual or countdown-driven
/// submission.
///
/// Listening and reading carry an `AnswerSheet`; writing carries the
/// locally persisted `WritingDraft` instead and is untimed.
pub struct SessionController {
    session: PhaseSession,
    answers: Option<AnswerSheet>,
    draft: Option<WritingDraft>,
    gateway: Arc<dyn ExamGateway>,
    credentials: Arc<dyn CredentialRepository>,
    drafts: Option<Arc<dyn DraftRepository>>,
    clock: Clock,
}

impl SessionController {
    #[must_use]
    pub fn new(
        exam_id: ExamId,
        phase: Phase,
        gateway: Arc<dyn ExamGateway>,
        credentials: Arc<dyn CredentialRepository>,
    ) -> Self {
        let answers = PhaseSchema::for_phase(phase).map(AnswerSheet::new);
        let clock = Clock::default_clock();
        let draft = (phase == Phase::Writing).then(|| WritingDraft::empty(clock.now()));
        Self {
            session: PhaseSession::new(exam_id, phase),
            answers,
            draft,
            gateway,
            credentials,
            drafts: None,
            clock,
        }
    }

    /// Attach the local draft store (writing phase).
    #[must_use]
    pub fn with_draft_store(mut self, drafts: Arc<dyn DraftRepository>) -> Self {
        self.drafts = Some(drafts);
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.session.phase()
    }

    #[must_use]
    pub fn exam_id(&self) -> ExamId {
        self.session.exam_id()
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.session.status()
    }

    #[must_use]
    pub fn remaining_secs(&self) -> Option<u32> {
        self.session.remaining_secs()
    }

    #[must_use]
    pub fn answers(&self) -> Option<&AnswerSheet> {
        self.answers.as_ref()
    }

    #[must_use]
    pub fn draft(&self) -> Option<&WritingDraft> {
        self.draft.as_ref()
    }

    /// Acquire the credential and start the phase. On success the session
    /// becomes active, the countdown is armed, and (for writing) the saved
    /// draft is restored.
    ///
    /// A missing or rejected credential yields `LoginRequired` and leaves
    /// the session startable again after re-login; any other failure is
    /// retryable by calling `start` again.
    ///
    /// # Errors
    ///
    /// Returns `SessionControllerError` for retryable start failures, a
    /// re-entrant start, or storage failures.
    pub async fn start(&mut self) -> Result<StartOutcome, SessionControllerError> {
        self.session.begin_start()?;

        let Some(credentials) = self.credentials.get_credentials().await? else {
            warn!(phase = %self.phase(), "no stored credential, returning to login");
            self.session.reset_for_login();
            return Ok(StartOutcome::LoginRequired);
        };

        match self
            .gateway
            .start_phase(credentials.bearer(), self.exam_id(), self.phase())
            .await
        {
            Ok(()) => {
                self.session.activate()?;
                if self.phase() == Phase::Writing {
                    self.restore_draft().await?;
                }
                info!(
                    phase = %self.phase(),
                    countdown_secs = ?self.remaining_secs(),
                    "phase started"
                );
                Ok(StartOutcome::Started {
                    countdown_secs: self.remaining_secs(),
                })
            }
            Err(ApiError::AuthExpired) => {
                self.session.reset_for_login();
                Ok(StartOutcome::LoginRequired)
            }
            Err(err) => {
                self.session.fail_start();
                Err(err.into())
            }
        }
    }

    /// Replace a scalar answer. Rejected once submission has begun.
    ///
    /// # Errors
    ///
    /// Returns `SessionControllerError` when inputs are closed, the phase
    /// has no answer sheet, or the key is unknown.
    pub fn set_scalar(&mut self, key: &str, value: &str) -> Result<(), SessionControllerError> {
        self.ensure_inputs_open()?;
        let phase = self.phase();
        let answers = self
            .answers
            .as_mut()
            .ok_or(SessionControllerError::NoAnswerSheet(phase))?;
        answers.set_scalar(key, value)?;
        Ok(())
    }

    /// Toggle one multi-select option. Rejected once submission has begun.
    ///
    /// # Errors
    ///
    /// Returns `SessionControllerError` when inputs are closed, the phase
    /// has no answer sheet, or the key is unknown.
    pub fn toggle_selection(
        &mut self,
        key: &str,
        option: &str,
    ) -> Result<(), SessionControllerError> {
        self.ensure_inputs_open()?;
        let phase = self.phase();
        let answers = self
            .answers
            .as_mut()
            .ok_or(SessionControllerError::NoAnswerSheet(phase))?;
        answers.toggle_selection(key, option)?;
        Ok(())
    }

    /// Reset every answer to its empty default. Callers gate this behind a
    /// destructive-action confirmation.
    ///
    /// # Errors
    ///
    /// Returns `SessionControllerError` when inputs are closed or the phase
    /// has no answer sheet.
    pub fn clear_all(&mut self) -> Result<(), SessionControllerError> {
        self.ensure_inputs_open()?;
        let phase = self.phase();
        let answers = self
            .answers
            .as_mut()
            .ok_or(SessionControllerError::NoAnswerSheet(phase))?;
        answers.clear_all();
        Ok(())
    }

    /// Current value of a question, if the phase has an answer sheet.
    #[must_use]
    pub fn answer(&self, key: &str) -> Option<&AnswerValue> {
        self.answers.as_ref().and_then(|sheet| sheet.value(key))
    }

    /// Replace one writing task's text, recount words, and autosave the
    /// draft. Rejected once submission has begun.
    ///
    /// # Errors
    ///
    /// Returns `SessionControllerError` when inputs are closed, this is not
    /// the writing phase, or the autosave fails.
    pub async fn set_task_text(
        &mut self,
        task: WritingTask,
        text: &str,
    ) -> Result<u32, SessionControllerError> {
        self.ensure_inputs_open()?;
        let phase = self.phase();
        let now = self.clock.now();
        let draft = self
            .draft
            .as_mut()
            .ok_or(SessionControllerError::NotWritingPhase(phase))?;
        draft.set_task(task, text, now);
        let count = draft.word_count(task);
        if let Some(store) = &self.drafts {
            store.save_draft(self.session.exam_id(), draft).await?;
        }
        Ok(count)
    }

    /// Advance the countdown by one second. `Tick::Expired` is the cue to
    /// call `submit(SubmitTrigger::Auto)`.
    pub fn tick(&mut self) -> Tick {
        self.session.tick()
    }

    /// Submit the phase, manually or from countdown expiry. The first
    /// trigger wins the single-flight gate; a concurrent second trigger
    /// gets `AlreadyInFlight` without a second finish call. On failure the
    /// session returns to its interactive state for an immediate retry.
    ///
    /// # Errors
    ///
    /// Returns `SessionControllerError` for retryable submit failures,
    /// submitting a never-started phase, or storage failures.
    pub async fn submit(
        &mut self,
        trigger: SubmitTrigger,
    ) -> Result<SubmitOutcome, SessionControllerError> {
        match self.session.begin_submit(trigger)? {
            SubmitGate::AlreadyInFlight => return Ok(SubmitOutcome::AlreadyInFlight),
            SubmitGate::Accepted => {}
        }

        let Some(credentials) = self.credentials.get_credentials().await? else {
            warn!(phase = %self.phase(), "credential vanished before submission");
            self.session.reset_for_login();
            return Ok(SubmitOutcome::LoginRequired);
        };

        let result = if let Some(answers) = &self.answers {
            let flattened = answers.flatten();
            self.gateway
                .finish_phase(
                    credentials.bearer(),
                    self.session.exam_id(),
                    self.session.phase(),
                    &flattened,
                )
                .await
        } else if let Some(draft) = &self.draft {
            let submission = WritingSubmission {
                task1: draft.task1.clone(),
                task2: draft.task2.clone(),
            };
            self.gateway
                .finish_writing(credentials.bearer(), self.session.exam_id(), &submission)
                .await
        } else {
            return Err(SessionControllerError::NoAnswerSheet(self.phase()));
        };

        match result {
            Ok(_ack) => {
                self.session.confirm_submitted()?;
                if self.phase() == Phase::Writing {
                    self.discard_draft().await?;
                }
                let redirect_delay = match trigger {
                    SubmitTrigger::Manual => MANUAL_REDIRECT_DELAY,
                    SubmitTrigger::Auto => AUTO_REDIRECT_DELAY,
                };
                info!(phase = %self.phase(), ?trigger, "phase submitted");
                Ok(SubmitOutcome::Submitted {
                    next_phase: self.phase().next(),
                    redirect_delay,
                })
            }
            Err(ApiError::AuthExpired) => {
                self.session.reset_for_login();
                Ok(SubmitOutcome::LoginRequired)
            }
            Err(err) => {
                warn!(phase = %self.phase(), error = %err, "submission failed, inputs reopened");
                self.session.fail_submit();
                Err(err.into())
            }
        }
    }

    /// Consume ticks until the countdown expires, then auto-submit.
    ///
    /// Returns `Ok(None)` if the ticker is torn down before expiry
    /// (navigation away abandons the session without a finish call).
    ///
    /// # Errors
    ///
    /// Propagates the auto-submission's `SessionControllerError`.
    pub async fn drive_countdown(
        &mut self,
        ticks: &mut mpsc::Receiver<()>,
    ) -> Result<Option<SubmitOutcome>, SessionControllerError> {
        loop {
            match ticks.recv().await {
                Some(()) => {
                    if self.tick() == Tick::Expired {
                        info!(phase = %self.phase(), "time is up, auto-submitting");
                        return self.submit(SubmitTrigger::Auto).await.map(Some);
                    }
                }
                None => return Ok(None),
            }
        }
    }

    fn ensure_inputs_open(&self) -> Result<(), SessionControllerError> {
        if self.session.inputs_open() {
            Ok(())
        } else {
            Err(exam_core::model::PhaseSessionError::InputsClosed.into())
        }
    }

    async fn restore_draft(&mut self) -> Result<(), SessionControllerError> {
        if let Some(store) = &self.drafts
            && let Some(saved) = store.get_draft(self.session.exam_id()).await?
        {
            self.draft = Some(saved);
        }
        Ok(())
    }

    async fn discard_draft(&mut self) -> Result<(), SessionControllerError> {
        if let Some(store) = &self.drafts {
            store.clear_draft(self.session.exam_id()).await?;
        }
        Ok(())
    }
}
