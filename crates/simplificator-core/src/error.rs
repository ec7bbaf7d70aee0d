use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimplificatorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("LLM gateway error: {0}")]
    Upstream(String),

    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("Upstream credits exhausted")]
    CreditsRequired,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SimplificatorError {
    /// Short error code string included in JSON error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            SimplificatorError::Config(_) => "CONFIG_ERROR",
            SimplificatorError::InvalidInput(_) => "INVALID_INPUT",
            SimplificatorError::NotFound(_) => "NOT_FOUND",
            SimplificatorError::Database(_) => "DATABASE_ERROR",
            SimplificatorError::Upstream(_) => "UPSTREAM_ERROR",
            SimplificatorError::RateLimited { .. } => "RATE_LIMITED",
            SimplificatorError::CreditsRequired => "CREDITS_REQUIRED",
            SimplificatorError::Serialization(_) => "SERIALIZATION_ERROR",
            SimplificatorError::Io(_) => "IO_ERROR",
            SimplificatorError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, SimplificatorError>;
