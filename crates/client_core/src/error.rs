use shared::error::{ApiError, ErrorCode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("session expired; sign in again")]
    Unauthorized,
    #[error("{message}")]
    Rejected {
        code: ErrorCode,
        status: u16,
        message: String,
        detail: Option<String>,
    },
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected response from server: {0}")]
    Decode(String),
    #[error("{0}")]
    InvalidInput(String),
    #[error("credential storage failure: {0}")]
    Credentials(#[from] std::io::Error),
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;

impl ClientError {
    pub fn rejected(status: u16, body: &str) -> Self {
        let ApiError {
            code,
            message,
            detail,
        } = ApiError::from_response(status, body);
        ClientError::Rejected {
            code,
            status,
            message,
            detail,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            ClientError::Unauthorized => ErrorCode::Unauthorized,
            ClientError::Rejected { code, .. } => *code,
            ClientError::InvalidInput(_) => ErrorCode::Validation,
            ClientError::Transport(_) | ClientError::Decode(_) | ClientError::Credentials(_) => {
                ErrorCode::Internal
            }
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ClientError::Unauthorized)
    }

    /// The backend's own `detail` for a rejected request; `None` when the body
    /// had none and the message is only the status fallback.
    pub fn backend_message(&self) -> Option<&str> {
        match self {
            ClientError::Rejected { detail, .. } => detail.as_deref(),
            _ => None,
        }
    }
}
