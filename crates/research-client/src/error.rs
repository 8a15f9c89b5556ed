use research_core::ResearchError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Unauthorized (status {0})")]
    Unauthorized(u16),

    #[error("Service returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type ClientResult<T> = Result<T, ClientError>;

impl From<ClientError> for ResearchError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::RequestFailed(e) if e.is_decode() => {
                ResearchError::MalformedResponse(e.to_string())
            }
            ClientError::RequestFailed(e) => ResearchError::Transport(e.to_string()),
            ClientError::Unauthorized(status) => ResearchError::Unauthorized(status),
            ClientError::Status { status, body } => ResearchError::Status { status, message: body },
            ClientError::InvalidResponse(msg) => ResearchError::MalformedResponse(msg),
            ClientError::Serialization(e) => ResearchError::MalformedResponse(e.to_string()),
            ClientError::InvalidCredential(_) => ResearchError::NotAuthenticated,
            ClientError::InvalidArgument(msg) => ResearchError::InvalidInput(msg),
        }
    }
}
