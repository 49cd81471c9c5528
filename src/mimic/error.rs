use thiserror::Error;

use crate::store::StoreError;

/// Failure of a replay
#[derive(Debug, Error)]
pub enum MimicError {
    /// Caller or data misuse; aborts the remaining traversal
    #[error("{0}")]
    Usage(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl MimicError {
    pub fn is_usage(&self) -> bool {
        match self {
            MimicError::Usage(_) => true,
            MimicError::Store(err) => err.is_usage(),
        }
    }
}
