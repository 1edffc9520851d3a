use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::state::AppState;

/// GET /health
/// Returns a simple status object with service version and storage backend.
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "paygap-api",
        "storage": format!("{:?}", state.config.storage_backend).to_lowercase(),
        "letters": state.config.anthropic_api_key.is_some()
    }))
}
