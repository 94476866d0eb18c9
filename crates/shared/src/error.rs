use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Unauthorized,
    Forbidden,
    NotFound,
    Validation,
    RateLimited,
    Internal,
}

impl ErrorCode {
    pub fn from_status(status: u16) -> Self {
        match status {
            400 | 409 | 413 | 415 | 422 => ErrorCode::Validation,
            401 => ErrorCode::Unauthorized,
            403 => ErrorCode::Forbidden,
            404 => ErrorCode::NotFound,
            429 => ErrorCode::RateLimited,
            _ => ErrorCode::Internal,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    /// What the backend said, when the body carried a usable `detail`.
    pub detail: Option<String>,
}

impl ApiError {
    /// Builds an error from a non-2xx response. The backend reports failures as
    /// `{"detail": "..."}`, or a list of field errors for request validation.
    pub fn from_response(status: u16, body: &str) -> Self {
        let code = ErrorCode::from_status(status);
        let detail = serde_json::from_str::<ErrorBody>(body)
            .ok()
            .and_then(|body| body.detail.into_message());
        let message = detail
            .clone()
            .unwrap_or_else(|| format!("request failed with status {status}"));
        Self {
            code,
            message,
            detail,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: ErrorDetail,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorDetail {
    Message(String),
    Fields(Vec<FieldError>),
}

#[derive(Debug, Deserialize)]
struct FieldError {
    #[serde(default)]
    loc: Vec<serde_json::Value>,
    msg: String,
}

impl ErrorDetail {
    fn into_message(self) -> Option<String> {
        match self {
            ErrorDetail::Message(message) if !message.trim().is_empty() => Some(message),
            ErrorDetail::Message(_) => None,
            ErrorDetail::Fields(fields) => {
                let parts = fields
                    .into_iter()
                    .map(|field| {
                        let location = field
                            .loc
                            .iter()
                            .filter_map(|part| match part {
                                serde_json::Value::String(s) => Some(s.clone()),
                                serde_json::Value::Number(n) => Some(n.to_string()),
                                _ => None,
                            })
                            .collect::<Vec<_>>()
                            .join(".");
                        if location.is_empty() {
                            field.msg
                        } else {
                            format!("{location}: {}", field.msg)
                        }
                    })
                    .collect::<Vec<_>>();
                (!parts.is_empty()).then(|| parts.join("; "))
            }
        }
    }
}
