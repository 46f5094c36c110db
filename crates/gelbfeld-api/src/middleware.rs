use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use tracing::warn;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::{AppState, run_blocking};

/// The verified identity behind a request, inserted by [`require_auth`].
#[derive(Debug, Clone)]
pub struct Caller {
    pub id: Uuid,
    pub username: String,
}

impl Caller {
    pub fn id_string(&self) -> String {
        self.id.to_string()
    }
}

/// Verify the bearer token and resolve it to a still-existing identity.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let bearer = req
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .ok_or_else(ApiError::unauthenticated)?;

    let identity_id = state
        .tokens
        .verify(bearer.token())
        .ok_or_else(ApiError::unauthenticated)?;

    let key = identity_id.to_string();
    let identity = run_blocking(&state, move |db| db.find_identity_by_id(&key))
        .await?
        .ok_or_else(|| {
            warn!("Token for unknown identity {}", identity_id);
            ApiError::unauthenticated()
        })?;

    req.extensions_mut().insert(Caller {
        id: identity_id,
        username: identity.username,
    });
    Ok(next.run(req).await)
}
