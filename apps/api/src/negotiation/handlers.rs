use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::info;

use crate::errors::AppError;
use crate::form::{FormView, SubmissionReport};
use crate::negotiation::action::NegotiationPacket;
use crate::negotiation::form::SalaryForm;
use crate::state::AppState;

const MAX_KEY_LEN: usize = 128;

#[derive(Debug, Deserialize)]
pub struct FieldUpdate {
    pub value: serde_json::Value,
}

/// Form keys double as storage keys, so they are restricted to a
/// file-name-safe alphabet.
fn check_key(key: &str) -> Result<(), AppError> {
    let valid = !key.is_empty()
        && key.len() <= MAX_KEY_LEN
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "Form key must be 1-{MAX_KEY_LEN} characters of letters, digits, '-' or '_'"
        )))
    }
}

/// GET /api/v1/forms/:key
/// Activates the session on first access, restoring any fresh snapshot.
pub async fn handle_get_form(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<FormView<SalaryForm>>, AppError> {
    check_key(&key)?;
    let session = state.forms.session(&key).await;
    Ok(Json(session.view().await))
}

/// PATCH /api/v1/forms/:key/fields/:field
pub async fn handle_set_field(
    State(state): State<AppState>,
    Path((key, field)): Path<(String, String)>,
    Json(update): Json<FieldUpdate>,
) -> Result<Json<FormView<SalaryForm>>, AppError> {
    check_key(&key)?;
    let session = state.forms.session(&key).await;
    session.set_field(&field, update.value).await?;
    Ok(Json(session.view().await))
}

/// POST /api/v1/forms/:key/submit
///
/// The submission runs on its own task so a dropped connection cannot cut it
/// off between a successful attempt and clearing the snapshot.
pub async fn handle_submit(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<SubmissionReport<NegotiationPacket>>, AppError> {
    check_key(&key)?;
    let session = state.forms.session(&key).await;
    let action = state.negotiation.clone();

    let running = {
        let session = session.clone();
        tokio::spawn(async move { session.submit(&action).await })
    };
    let report = running
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("submission task failed: {e}")))??;

    if !session.is_dirty().await {
        state.forms.close(&key).await;
    }
    info!("Form '{key}' submitted as {}", report.submission_id);
    Ok(Json(report))
}

/// DELETE /api/v1/forms/:key
/// Discards all input for the form, durable copy included.
pub async fn handle_reset_form(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<StatusCode, AppError> {
    check_key(&key)?;
    let session = state.forms.session(&key).await;
    session.reset().await?;
    state.forms.close(&key).await;
    Ok(StatusCode::NO_CONTENT)
}
