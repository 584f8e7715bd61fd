use serde::{Deserialize, Serialize};

/// Bearer credential pair plus display data for the logged-in candidate.
///
/// Written once by the login flow and read by every phase. The session
/// never clears it; it survives reloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub access_token: String,
    pub refresh_token: String,
    pub username: String,
    pub display_name: String,
}

impl Credentials {
    #[must_use]
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        username: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            username: username.into(),
            display_name: display_name.into(),
        }
    }

    /// The token attached as the bearer credential on every exam call.
    #[must_use]
    pub fn bearer(&self) -> &str {
        &self.access_token
    }
}
