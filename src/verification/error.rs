use thiserror::Error;

use crate::api::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationErrorKind {
    /// Rejected locally before any network call.
    Validation,
    /// The server answered 2xx with a failure payload, e.g. an invalid code.
    Rejected,
    /// Transport failure or non-2xx status.
    Network,
    InvalidTransition,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct VerificationError {
    pub kind: VerificationErrorKind,
    pub message: String,
    #[source]
    pub source: Option<ApiError>,
}

impl VerificationError {
    pub fn new(kind: VerificationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Validation and rejection errors are corrected by the user and retried.
    pub fn is_user_correctable(&self) -> bool {
        matches!(
            self.kind,
            VerificationErrorKind::Validation | VerificationErrorKind::Rejected
        )
    }
}

impl From<ApiError> for VerificationError {
    fn from(source: ApiError) -> Self {
        Self {
            kind: VerificationErrorKind::Network,
            message: source.to_string(),
            source: Some(source),
        }
    }
}

pub fn validation_error(message: impl Into<String>) -> VerificationError {
    VerificationError::new(VerificationErrorKind::Validation, message)
}

pub fn rejected(message: impl Into<String>) -> VerificationError {
    VerificationError::new(VerificationErrorKind::Rejected, message)
}

pub fn invalid_transition(message: impl Into<String>) -> VerificationError {
    VerificationError::new(VerificationErrorKind::InvalidTransition, message)
}
