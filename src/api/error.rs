use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiErrorKind {
    InvalidRequest,
    Transport,
    Http,
    Unauthorized,
    Decode,
    Cancelled,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{}", render(.message, .path, .status))]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub message: String,
    pub path: Option<String>,
    pub status: Option<u16>,
}

fn render(message: &str, path: &Option<String>, status: &Option<u16>) -> String {
    match (path, status) {
        (Some(path), Some(status)) => format!("{message} (path={path}, status={status})"),
        (Some(path), None) => format!("{message} (path={path})"),
        (None, Some(status)) => format!("{message} (status={status})"),
        (None, None) => message.to_string(),
    }
}

impl ApiError {
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            path: None,
            status: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

pub fn invalid_request(message: impl Into<String>) -> ApiError {
    ApiError::new(ApiErrorKind::InvalidRequest, message)
}

pub fn transport_error(message: impl Into<String>) -> ApiError {
    ApiError::new(ApiErrorKind::Transport, message)
}

pub fn decode_error(message: impl Into<String>) -> ApiError {
    ApiError::new(ApiErrorKind::Decode, message)
}

pub fn cancelled(message: impl Into<String>) -> ApiError {
    ApiError::new(ApiErrorKind::Cancelled, message)
}

pub fn internal_error(message: impl Into<String>) -> ApiError {
    ApiError::new(ApiErrorKind::Internal, message)
}

/// Maps a non-2xx response onto an error, keeping at most 240 chars of the body.
pub fn map_http_error(status: u16, path: &str, body: &str) -> ApiError {
    let normalized_body = body.chars().take(240).collect::<String>();

    let mut err = if status == 401 {
        ApiError::new(ApiErrorKind::Unauthorized, "authentication required")
    } else {
        ApiError::new(
            ApiErrorKind::Http,
            format!("server returned status {}", status),
        )
    };

    err = err.with_path(path.to_string()).with_status(status);

    if !normalized_body.is_empty() {
        err.message = format!("{}: {}", err.message, normalized_body);
    }

    err
}
