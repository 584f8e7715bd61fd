#![forbid(unsafe_code)]

pub mod draft_service;
pub mod error;
pub mod exam_client;
pub mod login_service;
pub mod sessions;

pub use exam_core::Clock;

pub use draft_service::DraftService;
pub use error::{ApiError, DraftServiceError, LoginError, SessionControllerError};
pub use exam_client::{
    AuthGateway, ExamApi, ExamGateway, ServerAck, TokenPair, WritingSubmission,
};
pub use login_service::LoginService;
pub use sessions::{SessionController, StartOutcome, SubmitOutcome, TickerHandle, spawn_ticker};
