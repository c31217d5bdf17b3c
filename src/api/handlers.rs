//! Request handlers for the steering API.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;

use super::AppState;
use super::types::{ErrorResponse, HorizonInfo, ProfilePoint, RoundsQuery, StateResponse};
use crate::steering::RoundRecord;

/// `GET /state`: backend, horizon, report, and the last round.
pub async fn get_state(State(state): State<Arc<AppState>>) -> Json<StateResponse> {
    let outcome = &state.outcome;
    Json(StateResponse {
        backend: outcome.backend,
        horizon: HorizonInfo::from(&outcome.horizon),
        report: outcome.report.clone(),
        latest_round: outcome.rounds.last().cloned(),
    })
}

/// `GET /rounds?from=N&to=M`: round log, filtered by iteration (inclusive).
///
/// Returns 400 if `from > to`.
pub async fn get_rounds(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RoundsQuery>,
) -> Result<Json<Vec<RoundRecord>>, (StatusCode, Json<ErrorResponse>)> {
    let from = query.from.unwrap_or(0);
    let to = query.to.unwrap_or(usize::MAX);

    if from > to {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: format!("from ({from}) must be <= to ({to})"),
            }),
        ));
    }

    let rounds = state
        .outcome
        .rounds
        .iter()
        .filter(|r| r.iteration >= from && r.iteration <= to)
        .cloned()
        .collect();
    Ok(Json(rounds))
}

/// `GET /profile`: per-interval target and aggregate.
pub async fn get_profile(State(state): State<Arc<AppState>>) -> Json<Vec<ProfilePoint>> {
    Json(ProfilePoint::all(&state.outcome))
}
