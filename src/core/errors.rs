use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub title: String,
    pub description: String,
}

impl FieldError {
    pub fn new(field: &str, title: impl Into<String>, description: impl Into<String>) -> Self {
        FieldError {
            field: field.to_string(),
            title: title.into(),
            description: description.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum BillioError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Split does not reconcile: {0}")]
    SplitMismatch(String),
    #[error("Invalid participant: {0}")]
    InvalidParticipant(String),
    #[error("Currency mismatch: {0} vs {1}")]
    CurrencyMismatch(String, String),
    #[error("Amount overflow")]
    AmountOverflow,
    #[error("Invalid input for field `{0}`: {1:?}")]
    InvalidInput(String, FieldError),
    #[error("Session expired, please log in again")]
    AuthExpired,
    #[error("Not logged in")]
    NotAuthenticated,
    #[error("Network error: {0}")]
    NetworkTransient(String),
    #[error("{0}")]
    ServerRejected(String),
    #[error("Invalid response from server: {0}")]
    InvalidResponse(String),
    #[error("Group {0} not found")]
    GroupNotFound(String),
    #[error("Session store error: {0}")]
    SessionStoreError(String),
    #[error("Cache error: {0}")]
    CacheError(String),
    #[error("Logging error: {0}")]
    LoggingError(String),
}

impl BillioError {
    /// Only transient network failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BillioError::NetworkTransient(_))
    }

    /// Errors produced before anything is sent to the backend.
    pub fn is_local_validation(&self) -> bool {
        matches!(
            self,
            BillioError::InvalidAmount(_)
                | BillioError::SplitMismatch(_)
                | BillioError::InvalidParticipant(_)
                | BillioError::CurrencyMismatch(_, _)
                | BillioError::AmountOverflow
                | BillioError::InvalidInput(_, _)
        )
    }

    pub(crate) fn invalid_input(field: &str, title: &str, description: impl Into<String>) -> Self {
        BillioError::InvalidInput(field.to_string(), FieldError::new(field, title, description))
    }
}
