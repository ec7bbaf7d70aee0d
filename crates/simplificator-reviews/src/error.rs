use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReviewStoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Stored suggestions column is not a JSON string array.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("score {0} out of range 0-10")]
    InvalidScore(u8),

    #[error("database lock poisoned")]
    LockPoisoned,
}

impl From<ReviewStoreError> for simplificator_core::SimplificatorError {
    fn from(err: ReviewStoreError) -> Self {
        match err {
            ReviewStoreError::InvalidScore(_) => Self::InvalidInput(err.to_string()),
            other => Self::Database(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ReviewStoreError>;
