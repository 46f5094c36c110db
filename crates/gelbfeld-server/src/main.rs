mod config;

use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use gelbfeld_api::pictures::PictureStore;
use gelbfeld_api::token::JwtTokenService;
use gelbfeld_api::{AppState, AppStateInner};

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gelbfeld=debug,gelbfeld_api=debug,gelbfeld_db=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database and picture storage
    let db = gelbfeld_db::Database::open(&config.db_path)?;
    let pictures = PictureStore::new(config.picture_dir.clone()).await?;
    let tokens = JwtTokenService::new(&config.jwt_secret, chrono::Duration::days(config.token_ttl_days));

    let state: AppState = Arc::new(AppStateInner {
        db,
        tokens: Box::new(tokens),
        pictures,
    });

    let app = gelbfeld_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    info!("Gelbfeld server listening on {}", config.addr);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
