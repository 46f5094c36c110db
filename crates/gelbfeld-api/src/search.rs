use axum::{
    Extension, Json,
    extract::State,
    response::IntoResponse,
};

use gelbfeld_db::search::DEFAULT_SEARCH_LIMIT;
use gelbfeld_types::api::{SearchQuery, SearchResult};

use crate::error::ApiError;
use crate::extract::ApiQuery;
use crate::middleware::Caller;
use crate::state::{AppState, run_blocking};

/// GET /search?q=
pub async fn search(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<SearchQuery>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, ApiError> {
    let caller_id = caller.id_string();
    let rows = run_blocking(&state, move |db| {
        db.search_identities(&caller_id, &query.q, DEFAULT_SEARCH_LIMIT)
    })
    .await?;

    let results: Vec<SearchResult> = rows
        .into_iter()
        .map(|r| SearchResult {
            username: r.username,
            email: r.email,
            status: r.status,
        })
        .collect();
    Ok(Json(results))
}
