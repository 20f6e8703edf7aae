use http::StatusCode;
use thiserror::Error;

/// Failures the API reports to the caller with a specific status.
/// Anything else travels as a plain `anyhow::Error` and becomes a
/// 500.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChatError {
    #[error("Message must not be empty")]
    EmptyMessage,
    #[error("Invalid session id: {0}")]
    InvalidSessionId(String),
    #[error("Chat session {0} not found")]
    SessionNotFound(String),
    #[error("Message {message_id} not found in session {session_id}")]
    MessageNotFound {
        session_id: String,
        message_id: String,
    },
    #[error("Chat session {0} belongs to another user")]
    Forbidden(String),
    #[error("Missing authentication header {0}")]
    Unauthorized(String),
}

impl ChatError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::EmptyMessage | Self::InvalidSessionId(_) => StatusCode::BAD_REQUEST,
            Self::SessionNotFound(_) | Self::MessageNotFound { .. } => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        }
    }
}
