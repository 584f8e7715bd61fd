mod controller;
mod timer;

pub use controller::{SessionController, StartOutcome, SubmitOutcome};
pub use timer::{TickerHandle, spawn_ticker};
