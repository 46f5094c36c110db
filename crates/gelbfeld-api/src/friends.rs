use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use tracing::error;
use uuid::Uuid;

use gelbfeld_db::StoreError;
use gelbfeld_db::models::PendingRow;
use gelbfeld_types::api::{
    FriendRequestBody, PendingRequestResponse, RelationshipResponse, RespondRequest, StatusResponse,
};
use gelbfeld_types::models::RelationshipStatus;

use crate::convert::{self, parse_id, parse_timestamp};
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath};
use crate::middleware::Caller;
use crate::state::{AppState, run_blocking};

/// POST /friends/requests
pub async fn send_request(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    ApiJson(req): ApiJson<FriendRequestBody>,
) -> Result<impl IntoResponse, ApiError> {
    let caller_id = caller.id_string();
    let target = req.target.trim().to_string();
    let row = run_blocking(&state, move |db| db.request_friendship(&caller_id, &target)).await?;

    let status = row.status.parse::<RelationshipStatus>().map_err(|e| {
        error!("Corrupt relationship status on {}: {}", row.id, e);
        ApiError::internal()
    })?;
    Ok((
        StatusCode::CREATED,
        Json(RelationshipResponse {
            id: parse_id(&row.id, "relationship id"),
            requester_id: parse_id(&row.requester_id, "requester_id"),
            recipient_id: parse_id(&row.recipient_id, "recipient_id"),
            status,
        }),
    ))
}

/// POST /friends/requests/{id}/respond
pub async fn respond(
    State(state): State<AppState>,
    ApiPath(relationship_id): ApiPath<Uuid>,
    Extension(caller): Extension<Caller>,
    ApiJson(req): ApiJson<RespondRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let caller_id = caller.id_string();
    run_blocking(&state, move |db| {
        db.respond_to_request(&relationship_id.to_string(), &caller_id, req.accept)
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /friends/requests/{id}
pub async fn cancel(
    State(state): State<AppState>,
    ApiPath(relationship_id): ApiPath<Uuid>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, ApiError> {
    let caller_id = caller.id_string();
    run_blocking(&state, move |db| db.cancel_request(&relationship_id.to_string(), &caller_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /friends/{username}
pub async fn remove(
    State(state): State<AppState>,
    ApiPath(username): ApiPath<String>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, ApiError> {
    let caller_id = caller.id_string();
    run_blocking(&state, move |db| db.remove_friend(&caller_id, &username)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /friends
pub async fn list_friends(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, ApiError> {
    let caller_id = caller.id_string();
    let rows = run_blocking(&state, move |db| db.list_friends(&caller_id)).await?;
    Ok(Json(rows.iter().map(convert::friend).collect::<Vec<_>>()))
}

/// GET /friends/requests/incoming
pub async fn list_incoming(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, ApiError> {
    let caller_id = caller.id_string();
    let rows = run_blocking(&state, move |db| db.list_incoming_requests(&caller_id)).await?;
    Ok(Json(rows.iter().map(pending).collect::<Vec<_>>()))
}

/// GET /friends/requests/outgoing
pub async fn list_outgoing(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, ApiError> {
    let caller_id = caller.id_string();
    let rows = run_blocking(&state, move |db| db.list_outgoing_requests(&caller_id)).await?;
    Ok(Json(rows.iter().map(pending).collect::<Vec<_>>()))
}

/// GET /friends/status/{username}
pub async fn status(
    State(state): State<AppState>,
    ApiPath(username): ApiPath<String>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, ApiError> {
    let caller_id = caller.id_string();
    let (username, status) = run_blocking(&state, move |db| {
        let other = db
            .find_identity_by_identifier(&username)?
            .ok_or(StoreError::TargetNotFound)?;
        let status = db.status_between(&caller_id, &other.id)?;
        Ok::<_, StoreError>((other.username, status))
    })
    .await?;
    Ok(Json(StatusResponse { username, status }))
}

fn pending(row: &PendingRow) -> PendingRequestResponse {
    PendingRequestResponse {
        relationship_id: parse_id(&row.relationship_id, "relationship id"),
        user_id: parse_id(&row.user_id, "identity id"),
        username: row.username.clone(),
        created_at: parse_timestamp(&row.created_at),
    }
}
