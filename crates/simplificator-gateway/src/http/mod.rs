pub mod chat;
pub mod health;
pub mod review;

use axum::{http::StatusCode, Json};
use serde::Serialize;
use simplificator_core::SimplificatorError;
use tracing::warn;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

pub type ApiError = (StatusCode, Json<ErrorBody>);

pub fn status_for(err: &SimplificatorError) -> StatusCode {
    match err {
        SimplificatorError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        SimplificatorError::NotFound(_) => StatusCode::NOT_FOUND,
        SimplificatorError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        SimplificatorError::CreditsRequired => StatusCode::PAYMENT_REQUIRED,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn api_error(err: SimplificatorError) -> ApiError {
    let status = status_for(&err);
    if status.is_server_error() {
        warn!(error = %err, code = err.code(), "request failed");
    }
    let retry_after_ms = match err {
        SimplificatorError::RateLimited { retry_after_ms } => Some(retry_after_ms),
        _ => None,
    };
    (
        status,
        Json(ErrorBody {
            error: err.to_string(),
            code: err.code(),
            retry_after_ms,
        }),
    )
}
