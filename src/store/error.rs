use thiserror::Error;

use crate::model::BundleGuardError;

/// Failure reported by (or while talking to) the bundle service
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("{0}")]
    Usage(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Authentication required: {0}")]
    Unauthorized(String),
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Store error: {0}")]
    Internal(String),
    #[error("{operation} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        #[source]
        last: Box<StoreError>,
    },
}

impl StoreError {
    /// Only transport failures are worth another attempt
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transport(_))
    }

    /// Errors caused by the caller rather than the service
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            StoreError::Usage(_)
                | StoreError::NotFound(_)
                | StoreError::Unauthorized(_)
                | StoreError::PermissionDenied(_)
        )
    }

    /// Map an HTTP error response onto the taxonomy
    pub fn from_http_status(code: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            403 => StoreError::PermissionDenied(message),
            401 => StoreError::Unauthorized(message),
            404 => StoreError::NotFound(message),
            400..=499 => StoreError::Usage(message),
            _ => StoreError::Internal(message),
        }
    }

    /// HTTP status a server would answer with for this error
    pub fn http_status(&self) -> u16 {
        match self {
            StoreError::PermissionDenied(_) => 403,
            StoreError::Unauthorized(_) => 401,
            StoreError::NotFound(_) => 404,
            StoreError::Usage(_) => 400,
            StoreError::Transport(_)
            | StoreError::Internal(_)
            | StoreError::RetriesExhausted { .. } => 500,
        }
    }
}

impl From<BundleGuardError> for StoreError {
    fn from(err: BundleGuardError) -> Self {
        StoreError::PermissionDenied(err.to_string())
    }
}
