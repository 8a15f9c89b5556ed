use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResearchError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("An analysis is already in progress")]
    BatchInFlight,

    #[error("Not logged in")]
    NotAuthenticated,

    #[error("Session rejected by server (status {0})")]
    Unauthorized(u16),

    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Service returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Request cancelled")]
    Cancelled,
}

impl ResearchError {
    /// True when the user has to log in (again) before retrying.
    pub fn requires_login(&self) -> bool {
        matches!(self, ResearchError::NotAuthenticated | ResearchError::Unauthorized(_))
    }
}
