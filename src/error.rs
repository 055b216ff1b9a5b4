use thiserror::Error;

/// Why a profile document could not be produced.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("profile not found")]
    NotFound,

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("embedded page state element missing or empty")]
    MissingPayload,

    #[error("embedded page state is not valid json: {0}")]
    Parse(#[from] serde_json::Error),
}

impl FetchError {
    /// NotFound is the ordinary answer for a nonexistent or empty profile.
    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::NotFound)
    }

    /// Payload problems usually mean the page layout changed.
    pub fn is_parse_failure(&self) -> bool {
        matches!(self, FetchError::MissingPayload | FetchError::Parse(_))
    }
}
