use axum::{
    Extension, Json,
    body::Body,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use tokio_util::io::ReaderStream;
use tracing::{error, info};

use gelbfeld_db::StoreError;
use gelbfeld_db::models::ProfileRow;
use gelbfeld_types::api::{BioBody, ProfileResponse, UpdateProfileRequest};

use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath, RawBody};
use crate::middleware::Caller;
use crate::state::{AppState, run_blocking};

/// 5 MB limit for profile pictures
pub const MAX_PICTURE_SIZE: usize = 5 * 1024 * 1024;

const MAX_BIO_LEN: usize = 500;
const MAX_NAME_LEN: usize = 64;
const PICTURE_TYPES: &[&str] = &["image/png", "image/jpeg", "image/gif", "image/webp"];

/// GET /profile
pub async fn get_own_profile(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, ApiError> {
    let id = caller.id_string();
    let row = run_blocking(&state, move |db| db.get_profile(&id)).await?;
    Ok(Json(profile_response(caller.username, row)))
}

/// PUT /profile
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    ApiJson(req): ApiJson<UpdateProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    check_len("first_name", req.first_name.as_deref(), MAX_NAME_LEN)?;
    check_len("last_name", req.last_name.as_deref(), MAX_NAME_LEN)?;
    check_len("bio", req.bio.as_deref(), MAX_BIO_LEN)?;

    let id = caller.id_string();
    let row = run_blocking(&state, move |db| {
        db.update_profile(
            &id,
            req.first_name.as_deref(),
            req.last_name.as_deref(),
            req.bio.as_deref(),
        )
    })
    .await?;
    Ok(Json(profile_response(caller.username, Some(row))))
}

/// GET /profile/bio
pub async fn get_bio(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, ApiError> {
    let id = caller.id_string();
    let bio = run_blocking(&state, move |db| db.get_bio(&id)).await?;
    Ok(Json(BioBody {
        bio: bio.unwrap_or_default(),
    }))
}

/// PUT /profile/bio
pub async fn set_bio(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    ApiJson(req): ApiJson<BioBody>,
) -> Result<impl IntoResponse, ApiError> {
    check_len("bio", Some(&req.bio), MAX_BIO_LEN)?;
    let id = caller.id_string();
    run_blocking(&state, move |db| db.set_bio(&id, &req.bio)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /profile/picture. Body is the raw image with an image Content-Type.
pub async fn set_picture(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    headers: HeaderMap,
    RawBody(bytes): RawBody,
) -> Result<impl IntoResponse, ApiError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_ascii_lowercase())
        .filter(|v| PICTURE_TYPES.contains(&v.as_str()))
        .ok_or_else(|| ApiError::bad_request("picture must be png, jpeg, gif or webp"))?;

    if bytes.is_empty() {
        return Err(ApiError::bad_request("picture is empty"));
    }
    if bytes.len() > MAX_PICTURE_SIZE {
        return Err(ApiError::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            "payload_too_large",
            "picture exceeds 5 MB",
        ));
    }

    let id = caller.id_string();
    let staged = state.pictures.stage(&id, &bytes).await.map_err(|e| {
        error!("Failed to store picture for {}: {}", id, e);
        ApiError::internal()
    })?;

    // The content type is recorded before the new bytes become visible, and
    // restored if they never do.
    let key = id.clone();
    let previous = match run_blocking(&state, move |db| {
        db.set_picture_content_type(&key, Some(content_type.as_str()))
    })
    .await
    {
        Ok(previous) => previous,
        Err(e) => {
            staged.discard().await;
            return Err(e);
        }
    };

    if let Err(e) = staged.commit().await {
        error!("Failed to replace picture for {}: {}", id, e);
        let key = id.clone();
        if let Err(restore) = run_blocking(&state, move |db| {
            db.set_picture_content_type(&key, previous.as_deref())
        })
        .await
        {
            error!("Failed to restore picture type for {}: {}", id, restore.message);
        }
        return Err(ApiError::internal());
    }

    info!("{} uploaded a {} byte profile picture", caller.username, bytes.len());
    Ok(StatusCode::NO_CONTENT)
}

/// GET /profile/picture
pub async fn get_own_picture(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<Response, ApiError> {
    serve_picture(&state, caller.id_string()).await
}

/// GET /users/{username}/profile
pub async fn get_user_profile(
    State(state): State<AppState>,
    ApiPath(username): ApiPath<String>,
    Extension(_caller): Extension<Caller>,
) -> Result<impl IntoResponse, ApiError> {
    let (username, row) = run_blocking(&state, move |db| {
        let identity = db
            .find_identity_by_identifier(&username)?
            .ok_or(StoreError::IdentityNotFound)?;
        let row = db.get_profile(&identity.id)?;
        Ok::<_, StoreError>((identity.username, row))
    })
    .await?;
    Ok(Json(profile_response(username, row)))
}

/// GET /users/{username}/picture
pub async fn get_user_picture(
    State(state): State<AppState>,
    ApiPath(username): ApiPath<String>,
    Extension(_caller): Extension<Caller>,
) -> Result<Response, ApiError> {
    let identity = run_blocking(&state, move |db| db.find_identity_by_identifier(&username))
        .await?
        .ok_or(StoreError::IdentityNotFound)?;
    serve_picture(&state, identity.id).await
}

async fn serve_picture(state: &AppState, identity_id: String) -> Result<Response, ApiError> {
    let id = identity_id.clone();
    let content_type = run_blocking(state, move |db| db.get_profile(&id))
        .await?
        .and_then(|p| p.picture_content_type)
        .ok_or_else(|| ApiError::not_found("no profile picture"))?;

    let file = state
        .pictures
        .open(&identity_id)
        .await
        .map_err(|e| {
            error!("Failed to open picture for {}: {}", identity_id, e);
            ApiError::internal()
        })?
        .ok_or_else(|| ApiError::not_found("no profile picture"))?;

    let body = Body::from_stream(ReaderStream::new(file));
    Ok(([(header::CONTENT_TYPE, content_type)], body).into_response())
}

fn profile_response(username: String, row: Option<ProfileRow>) -> ProfileResponse {
    match row {
        Some(row) => ProfileResponse {
            username,
            first_name: row.first_name,
            last_name: row.last_name,
            bio: row.bio,
            has_picture: row.picture_content_type.is_some(),
        },
        None => ProfileResponse {
            username,
            first_name: None,
            last_name: None,
            bio: None,
            has_picture: false,
        },
    }
}

fn check_len(field: &str, value: Option<&str>, max: usize) -> Result<(), ApiError> {
    match value {
        Some(v) if v.chars().count() > max => Err(ApiError::bad_request(format!(
            "{field} must be at most {max} characters"
        ))),
        _ => Ok(()),
    }
}
