use std::sync::LazyLock;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use rand_core::OsRng;
use tracing::{error, info, warn};

use gelbfeld_db::models::IdentityRow;
use gelbfeld_db::{Database, StoreError};
use gelbfeld_types::api::{LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};

use crate::convert;
use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::middleware::Caller;
use crate::state::{AppState, run_blocking};

const MIN_PASSWORD_LEN: usize = 8;
const MIN_USERNAME_LEN: usize = 2;
const MAX_USERNAME_LEN: usize = 32;
const MAX_EMAIL_LEN: usize = 254;

pub async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_registration(&req)?;

    let RegisterRequest {
        username,
        email,
        password,
    } = req;

    let identity = run_blocking(&state, move |db| -> Result<IdentityRow, ApiError> {
        let password_hash = hash_password(&password)?;
        Ok(db.create_identity(username.trim(), email.trim(), &password_hash)?)
    })
    .await?;

    let user_id = convert::parse_id(&identity.id, "identity id");
    let token = state.tokens.issue(user_id).map_err(|e| {
        error!("Token issue failed: {}", e);
        ApiError::internal()
    })?;

    Ok((StatusCode::CREATED, Json(RegisterResponse { user_id, token })))
}

pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let identifier = req.username_or_email.trim().to_string();
    let identity = run_blocking(&state, move |db| authenticate(db, &identifier, &req.password))
        .await?;

    let user_id = convert::parse_id(&identity.id, "identity id");
    let token = state.tokens.issue(user_id).map_err(|e| {
        error!("Token issue failed: {}", e);
        ApiError::internal()
    })?;

    info!("{} logged in", identity.username);
    Ok(Json(LoginResponse {
        user_id,
        username: identity.username,
        token,
    }))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, ApiError> {
    let id = caller.id_string();
    let identity = run_blocking(&state, move |db| db.find_identity_by_id(&id))
        .await?
        .ok_or_else(ApiError::unauthenticated)?;
    Ok(Json(convert::identity(&identity)))
}

/// Verified against when the identifier matches nobody, so a miss costs the
/// same Argon2 work as a wrong password.
static DUMMY_HASH: LazyLock<Option<String>> =
    LazyLock::new(|| hash_password("gelbfeld-dummy-password").ok());

/// Check a username-or-email plus password. Unknown identifiers and wrong
/// passwords produce the same error.
pub fn authenticate(db: &Database, identifier: &str, password: &str) -> Result<IdentityRow, StoreError> {
    let Some(identity) = db.find_identity_by_identifier(identifier)? else {
        burn_verify(password);
        return Err(StoreError::InvalidCredentials);
    };

    let parsed_hash = PasswordHash::new(&identity.password).map_err(|e| {
        warn!("Unparseable password hash for {}: {}", identity.id, e);
        StoreError::InvalidCredentials
    })?;

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| StoreError::InvalidCredentials)?;

    Ok(identity)
}

fn burn_verify(password: &str) {
    if let Some(hash) = DUMMY_HASH.as_deref().and_then(|h| PasswordHash::new(h).ok()) {
        let _ = Argon2::default().verify_password(password.as_bytes(), &hash);
    }
}

/// Argon2id PHC string for `password`.
pub fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            error!("Password hashing failed: {}", e);
            ApiError::internal()
        })
}

fn validate_registration(req: &RegisterRequest) -> Result<(), ApiError> {
    let username = req.username.trim();
    let len = username.chars().count();
    if !(MIN_USERNAME_LEN..=MAX_USERNAME_LEN).contains(&len) {
        return Err(ApiError::bad_request(format!(
            "username must be {MIN_USERNAME_LEN}-{MAX_USERNAME_LEN} characters"
        )));
    }
    // Uniqueness folds case for ASCII only, so names stay ASCII.
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err(ApiError::bad_request(
            "username may only contain ASCII letters, digits, '_', '-' and '.'",
        ));
    }

    let email = req.email.trim();
    if !email.is_ascii()
        || email.len() > MAX_EMAIL_LEN
        || !email.contains('@')
        || email.starts_with('@')
        || email.ends_with('@')
    {
        return Err(ApiError::bad_request("invalid email address"));
    }

    if req.password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request("password must be at least 8 characters"));
    }

    Ok(())
}
