pub mod health;

use axum::{
    routing::{get, patch, post},
    Router,
};

use crate::gap::handlers as gap_handlers;
use crate::negotiation::handlers as form_handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Gap API
        .route("/api/v1/gap", post(gap_handlers::handle_compute_gap))
        // Form API
        .route(
            "/api/v1/forms/:key",
            get(form_handlers::handle_get_form).delete(form_handlers::handle_reset_form),
        )
        .route(
            "/api/v1/forms/:key/fields/:field",
            patch(form_handlers::handle_set_field),
        )
        .route(
            "/api/v1/forms/:key/submit",
            post(form_handlers::handle_submit),
        )
        .with_state(state)
}
