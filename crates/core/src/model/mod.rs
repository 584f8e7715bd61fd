pub mod answers;
pub mod countdown;
pub mod credentials;
pub mod draft;
pub mod ids;
pub mod phase;
pub mod question;
pub mod session;

pub use answers::{AnswerError, AnswerSheet, AnswerValue};
pub use countdown::{Countdown, Tick};
pub use credentials::Credentials;
pub use draft::{WritingDraft, WritingTask, word_count};
pub use ids::ExamId;
pub use phase::{ParsePhaseError, Phase};
pub use question::{FREE_TEXT_MAX_LEN, MultiSelectWire, PhaseSchema, QuestionKind, QuestionSpec};
pub use session::{PhaseSession, PhaseSessionError, SessionStatus, SubmitGate, SubmitTrigger};
