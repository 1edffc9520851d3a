use axum::{extract::State, Json};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::gap::{build_recommendations, compute_gap, GapResult, RecommendationFeed, SalaryObservation};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct GapRequest {
    pub historical_salary: f64,
    pub historical_date: NaiveDate,
    pub current_salary: f64,
    pub current_date: NaiveDate,
}

#[derive(Debug, Serialize)]
pub struct GapResponse {
    pub gap: GapResult,
    pub recommendations: RecommendationFeed,
}

/// POST /api/v1/gap
/// One-shot computation, no form session involved.
pub async fn handle_compute_gap(
    State(state): State<AppState>,
    Json(req): Json<GapRequest>,
) -> Result<Json<GapResponse>, AppError> {
    let historical = SalaryObservation {
        amount: req.historical_salary,
        as_of: req.historical_date,
    };
    let current = SalaryObservation {
        amount: req.current_salary,
        as_of: req.current_date,
    };
    let gap = compute_gap(&historical, &current, state.index.as_ref(), &state.bands)?;
    let recommendations = build_recommendations(&gap, current.amount);
    Ok(Json(GapResponse {
        gap,
        recommendations,
    }))
}
