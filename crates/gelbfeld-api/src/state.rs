use std::sync::Arc;

use tracing::error;

use gelbfeld_db::Database;

use crate::error::ApiError;
use crate::pictures::PictureStore;
use crate::token::TokenService;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub tokens: Box<dyn TokenService>,
    pub pictures: PictureStore,
}

/// Run a blocking store call off the async runtime.
pub(crate) async fn run_blocking<F, T, E>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Into<ApiError> + Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::internal()
        })?
        .map_err(Into::into)
}
