use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

use crate::storage::StorageError;

/// Every failure a session or company operation can report.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("invalid credentials")]
    Unauthorized,

    #[error("validation failed: {}", detail.as_deref().unwrap_or("malformed request"))]
    Validation { detail: Option<String> },

    #[error("account is locked")]
    Locked,

    #[error("session expired")]
    SessionExpired,

    #[error("authentication required")]
    AuthenticationRequired,

    #[error("network error: {0}")]
    Network(String),

    #[error("backend returned {status}")]
    Http { status: u16, detail: Option<String> },

    #[error("unexpected response body: {0}")]
    Decode(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Branch points a caller can match on without caring about payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Authentication,
    Validation,
    Lockout,
    Network,
    Server,
}

impl ApiError {
    /// Classify a non-success response. `body` is whatever JSON the backend sent, if any.
    pub fn from_status(status: StatusCode, body: Option<&Value>) -> Self {
        let detail = body.and_then(detail_text);
        match status {
            StatusCode::UNAUTHORIZED => ApiError::Unauthorized,
            StatusCode::BAD_REQUEST => ApiError::Validation { detail },
            StatusCode::LOCKED => ApiError::Locked,
            other => ApiError::Http {
                status: other.as_u16(),
                detail,
            },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Unauthorized | ApiError::SessionExpired | ApiError::AuthenticationRequired => {
                ErrorKind::Authentication
            }
            ApiError::Validation { .. } => ErrorKind::Validation,
            ApiError::Locked => ErrorKind::Lockout,
            ApiError::Network(_) => ErrorKind::Network,
            ApiError::Http { .. }
            | ApiError::Decode(_)
            | ApiError::Storage(_)
            | ApiError::Config(_) => ErrorKind::Server,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }

    /// Text a view can render as-is.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Unauthorized => "Invalid email or password.".to_string(),
            ApiError::Validation { detail } => detail
                .clone()
                .unwrap_or_else(|| "The request was invalid. Please check your input.".to_string()),
            ApiError::Locked => {
                "Your account is locked after too many failed attempts. Please try again later."
                    .to_string()
            }
            ApiError::SessionExpired => "Your session has expired. Please sign in again.".to_string(),
            ApiError::AuthenticationRequired => "Authentication required.".to_string(),
            ApiError::Network(_) => {
                "Unable to reach the server. Check your connection and try again.".to_string()
            }
            ApiError::Http { .. } | ApiError::Decode(_) | ApiError::Storage(_) | ApiError::Config(_) => {
                "Something went wrong. Please try again later.".to_string()
            }
        }
    }
}

/// Pull a human-readable message out of a backend error body.
pub fn detail_text(body: &Value) -> Option<String> {
    if let Some(text) = body.as_str() {
        return Some(text.to_string()).filter(|s| !s.is_empty());
    }
    ["detail", "error", "message"]
        .iter()
        .filter_map(|key| body.get(key))
        .find_map(|v| match v {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Array(items) => items.first().and_then(|i| i.as_str()).map(str::to_string),
            _ => None,
        })
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            ApiError::from_status(status, None)
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Decode(err.to_string())
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        ApiError::Storage(err.to_string())
    }
}
