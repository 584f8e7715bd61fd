use thiserror::Error;

use super::countdown::{Countdown, Tick};
use super::{ExamId, Phase};

/// Lifecycle of one phase attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Uninitialized,
    Starting,
    Active,
    Submitting,
    Submitted,
    Failed,
}

/// What caused a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitTrigger {
    /// Explicit user confirmation.
    Manual,
    /// Countdown reached zero.
    Auto,
}

/// Whether a submission attempt won the single-flight gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitGate {
    Accepted,
    /// A submission is already in flight or done; no second call is issued.
    AlreadyInFlight,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PhaseSessionError {
    #[error("phase already started")]
    AlreadyStarted,

    #[error("phase start is not in progress")]
    NotStarting,

    #[error("phase is not active")]
    NotActive,

    #[error("no submission is in progress")]
    NotSubmitting,

    #[error("answers are frozen while submitting")]
    InputsClosed,
}

/// Per-phase session state machine.
///
/// `Uninitialized → Starting → Active → Submitting → Submitted`, with
/// `Failed` reachable from `Starting` (retryable via a fresh `begin_start`)
/// and `Submitting` falling back to `Active` on a failed submission.
/// Re-entry into `Starting` is blocked by the status itself; there is no
/// separate duplicate-call flag to keep in sync. An authentication failure
/// resets to `Uninitialized` so the phase can start again after re-login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseSession {
    exam_id: ExamId,
    phase: Phase,
    status: SessionStatus,
    countdown: Option<Countdown>,
    submitted_by: Option<SubmitTrigger>,
}

impl PhaseSession {
    #[must_use]
    pub fn new(exam_id: ExamId, phase: Phase) -> Self {
        Self {
            exam_id,
            phase,
            status: SessionStatus::Uninitialized,
            countdown: None,
            submitted_by: None,
        }
    }

    /// What won the submission gate, once a submission has begun.
    #[must_use]
    pub fn submitted_by(&self) -> Option<SubmitTrigger> {
        self.submitted_by
    }

    #[must_use]
    pub fn exam_id(&self) -> ExamId {
        self.exam_id
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Seconds left on the countdown, if this phase is timed and active.
    #[must_use]
    pub fn remaining_secs(&self) -> Option<u32> {
        self.countdown.as_ref().map(Countdown::remaining_secs)
    }

    /// Whether answer mutations are currently accepted.
    #[must_use]
    pub fn inputs_open(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// Enter `Starting`. Permitted from `Uninitialized` and, for a manual
    /// retry, from `Failed`.
    ///
    /// # Errors
    ///
    /// Returns `PhaseSessionError::AlreadyStarted` from any other state.
    pub fn begin_start(&mut self) -> Result<(), PhaseSessionError> {
        match self.status {
            SessionStatus::Uninitialized | SessionStatus::Failed => {
                self.status = SessionStatus::Starting;
                Ok(())
            }
            _ => Err(PhaseSessionError::AlreadyStarted),
        }
    }

    /// The start call succeeded: enter `Active` and arm the countdown for
    /// timed phases.
    ///
    /// # Errors
    ///
    /// Returns `PhaseSessionError::NotStarting` unless a start is in progress.
    pub fn activate(&mut self) -> Result<(), PhaseSessionError> {
        if self.status != SessionStatus::Starting {
            return Err(PhaseSessionError::NotStarting);
        }
        self.countdown = self.phase.countdown_secs().map(Countdown::new);
        self.status = SessionStatus::Active;
        Ok(())
    }

    /// The start call failed with a locally recoverable error.
    pub fn fail_start(&mut self) {
        if self.status == SessionStatus::Starting {
            self.status = SessionStatus::Failed;
        }
    }

    /// The credential is missing or was rejected: hand control back to the
    /// login flow and allow a fresh start afterwards.
    pub fn reset_for_login(&mut self) {
        self.status = SessionStatus::Uninitialized;
        self.countdown = None;
        self.submitted_by = None;
    }

    /// Advance the countdown by one second. Ticks outside `Active` (and
    /// ticks for the untimed writing phase) are ignored.
    pub fn tick(&mut self) -> Tick {
        if self.status != SessionStatus::Active {
            return Tick::Exhausted;
        }
        match &mut self.countdown {
            Some(countdown) => countdown.tick(),
            None => Tick::Exhausted,
        }
    }

    /// Single-flight submission gate: the first trigger (manual or auto)
    /// enters `Submitting`; concurrent triggers are absorbed.
    ///
    /// # Errors
    ///
    /// Returns `PhaseSessionError::NotActive` if the phase never became
    /// active.
    pub fn begin_submit(&mut self, trigger: SubmitTrigger) -> Result<SubmitGate, PhaseSessionError> {
        match self.status {
            SessionStatus::Active => {
                self.status = SessionStatus::Submitting;
                self.submitted_by = Some(trigger);
                Ok(SubmitGate::Accepted)
            }
            SessionStatus::Submitting | SessionStatus::Submitted => {
                Ok(SubmitGate::AlreadyInFlight)
            }
            _ => Err(PhaseSessionError::NotActive),
        }
    }

    /// The finish call succeeded.
    ///
    /// # Errors
    ///
    /// Returns `PhaseSessionError::NotSubmitting` if no submission was in
    /// flight.
    pub fn confirm_submitted(&mut self) -> Result<(), PhaseSessionError> {
        if self.status != SessionStatus::Submitting {
            return Err(PhaseSessionError::NotSubmitting);
        }
        self.status = SessionStatus::Submitted;
        Ok(())
    }

    /// The finish call failed: reopen inputs so the user can retry.
    pub fn fail_submit(&mut self) {
        if self.status == SessionStatus::Submitting {
            self.status = SessionStatus::Active;
            self.submitted_by = None;
        }
    }
}
