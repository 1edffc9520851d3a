use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::form::{FieldErrors, FormError, SubmissionError};
use crate::gap::GapError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Gap error: {0}")]
    Gap(#[from] GapError),

    #[error("Form error: {0}")]
    Form(#[from] FormError),

    #[error("Submission error: {0}")]
    Submission(#[from] SubmissionError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut fields: Option<FieldErrors> = None;

        let (status, code, message) = match self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg),
            AppError::Gap(e) => match e {
                GapError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, "INVALID_INPUT", msg),
                GapError::IndexUnavailable { .. } => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "INDEX_UNAVAILABLE",
                    e.to_string(),
                ),
            },
            AppError::Form(e) => match e {
                FormError::Closed => (StatusCode::CONFLICT, "FORM_CLOSED", e.to_string()),
                FormError::UnknownField(_) => (StatusCode::NOT_FOUND, "UNKNOWN_FIELD", e.to_string()),
                FormError::InvalidValue { .. } => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", e.to_string())
                }
            },
            AppError::Submission(e) => match e {
                SubmissionError::Validation(errors) => {
                    let message = SubmissionError::Validation(FieldErrors::new()).to_string();
                    fields = Some(errors);
                    (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR", message)
                }
                SubmissionError::InFlight => (
                    StatusCode::CONFLICT,
                    "SUBMISSION_IN_PROGRESS",
                    e.to_string(),
                ),
                SubmissionError::Abandoned => {
                    (StatusCode::CONFLICT, "SUBMISSION_ABANDONED", e.to_string())
                }
                SubmissionError::Cancelled => {
                    (StatusCode::CONFLICT, "SUBMISSION_CANCELLED", e.to_string())
                }
                SubmissionError::RetriesExhausted { .. } => {
                    tracing::error!("Submission failed: {e}");
                    (
                        StatusCode::SERVICE_UNAVAILABLE,
                        "SERVICE_UNAVAILABLE",
                        "The service is temporarily unavailable. Your input has been kept; please try again shortly."
                            .to_string(),
                    )
                }
                SubmissionError::FatalRemote(ref reason) => {
                    tracing::error!("Submission rejected: {reason}");
                    (StatusCode::BAD_GATEWAY, "SUBMISSION_REJECTED", e.to_string())
                }
            },
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let mut error = json!({
            "code": code,
            "message": message
        });
        if let Some(fields) = fields {
            error["fields"] = json!(fields);
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}
