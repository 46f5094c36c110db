use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use gelbfeld_types::api::{
    AddPointResponse, ConsistencyResponse, CounterMismatch, CreateRoundRequest, ScoreEntry, ScoresResponse,
};

use crate::convert::{self, parse_id};
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath};
use crate::middleware::Caller;
use crate::state::{AppState, run_blocking};

/// POST /rounds
pub async fn create_round(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    ApiJson(req): ApiJson<CreateRoundRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let caller_id = caller.id_string();
    let detail = run_blocking(&state, move |db| db.create_round(&caller_id, &req.name, &req.players)).await?;
    Ok((StatusCode::CREATED, Json(convert::round_detail(&detail))))
}

/// GET /rounds: rounds the caller created or plays in.
pub async fn list_rounds(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, ApiError> {
    let caller_id = caller.id_string();
    let rows = run_blocking(&state, move |db| db.list_rounds(&caller_id)).await?;
    Ok(Json(rows.iter().map(convert::round_summary).collect::<Vec<_>>()))
}

/// GET /rounds/{round_id}/scores
pub async fn get_scores(
    State(state): State<AppState>,
    ApiPath(round_id): ApiPath<Uuid>,
    Extension(_caller): Extension<Caller>,
) -> Result<impl IntoResponse, ApiError> {
    let board = run_blocking(&state, move |db| db.get_scores(&round_id.to_string())).await?;

    let scores: Vec<ScoreEntry> = board
        .players
        .iter()
        .map(|p| ScoreEntry {
            name: p.player.display_name().to_string(),
            points: p.points,
            player_id: parse_id(&p.id, "round player id"),
            is_guest: p.player.is_guest(),
        })
        .collect();

    Ok(Json(ScoresResponse {
        round_id,
        field_count: board.field_count,
        round_name: board.round.name,
        player_count: scores.len(),
        scores,
    }))
}

/// POST /rounds/{round_id}/players/{player_id}/points
pub async fn add_point(
    State(state): State<AppState>,
    ApiPath((round_id, player_id)): ApiPath<(Uuid, Uuid)>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, ApiError> {
    let caller_id = caller.id_string();
    let points = run_blocking(&state, move |db| {
        db.add_point(&round_id.to_string(), &player_id.to_string(), &caller_id)
    })
    .await?;
    Ok(Json(AddPointResponse {
        round_player_id: player_id,
        points,
    }))
}

/// DELETE /rounds/{round_id}
pub async fn delete_round(
    State(state): State<AppState>,
    ApiPath(round_id): ApiPath<Uuid>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, ApiError> {
    let caller_id = caller.id_string();
    run_blocking(&state, move |db| db.delete_round(&round_id.to_string(), &caller_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /rounds/{round_id}/consistency
pub async fn check_consistency(
    State(state): State<AppState>,
    ApiPath(round_id): ApiPath<Uuid>,
    Extension(_caller): Extension<Caller>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = run_blocking(&state, move |db| db.check_consistency(&round_id.to_string())).await?;
    let mismatches: Vec<CounterMismatch> = rows
        .iter()
        .map(|r| CounterMismatch {
            player_id: parse_id(&r.player_id, "round player id"),
            cached: r.cached,
            events: r.events,
        })
        .collect();
    Ok(Json(ConsistencyResponse {
        round_id,
        consistent: mismatches.is_empty(),
        mismatches,
    }))
}
