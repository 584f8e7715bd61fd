use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// One of the three exam sections, in the order the exam runs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Listening,
    Reading,
    Writing,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown phase: {0}")]
pub struct ParsePhaseError(String);

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::Listening, Phase::Reading, Phase::Writing];

    /// Path segment the remote service uses (`start-listening/`, `finish-reading/`, ...).
    #[must_use]
    pub fn wire_name(self) -> &'static str {
        match self {
            Phase::Listening => "listening",
            Phase::Reading => "reading",
            Phase::Writing => "writing",
        }
    }

    /// Fixed countdown for the phase. Writing is untimed and has no
    /// countdown-driven auto-submit.
    #[must_use]
    pub fn countdown_secs(self) -> Option<u32> {
        match self {
            Phase::Listening => Some(30 * 60),
            Phase::Reading => Some(60 * 60),
            Phase::Writing => None,
        }
    }

    /// The section that follows this one, if any.
    #[must_use]
    pub fn next(self) -> Option<Phase> {
        match self {
            Phase::Listening => Some(Phase::Reading),
            Phase::Reading => Some(Phase::Writing),
            Phase::Writing => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl FromStr for Phase {
    type Err = ParsePhaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "listening" => Ok(Phase::Listening),
            "reading" => Ok(Phase::Reading),
            "writing" => Ok(Phase::Writing),
            other => Err(ParsePhaseError(other.to_string())),
        }
    }
}
