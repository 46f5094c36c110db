pub mod auth;
pub mod convert;
pub mod error;
pub mod extract;
pub mod friends;
pub mod middleware;
pub mod pictures;
pub mod profile;
pub mod rounds;
pub mod search;
pub mod state;
pub mod token;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
};

pub use state::{AppState, AppStateInner};

/// All API routes. Everything except registration and login requires a
/// bearer token.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login));

    let protected_routes = Router::new()
        .route("/auth/me", get(auth::me))
        // Friends
        .route("/friends", get(friends::list_friends))
        .route("/friends/{username}", delete(friends::remove))
        .route("/friends/status/{username}", get(friends::status))
        .route("/friends/requests", post(friends::send_request))
        .route("/friends/requests/incoming", get(friends::list_incoming))
        .route("/friends/requests/outgoing", get(friends::list_outgoing))
        .route("/friends/requests/{relationship_id}", delete(friends::cancel))
        .route("/friends/requests/{relationship_id}/respond", post(friends::respond))
        // Rounds
        .route("/rounds", post(rounds::create_round).get(rounds::list_rounds))
        .route("/rounds/{round_id}", delete(rounds::delete_round))
        .route("/rounds/{round_id}/scores", get(rounds::get_scores))
        .route("/rounds/{round_id}/consistency", get(rounds::check_consistency))
        .route("/rounds/{round_id}/players/{player_id}/points", post(rounds::add_point))
        // Search
        .route("/search", get(search::search))
        // Profile
        .route("/profile", get(profile::get_own_profile).put(profile::update_profile))
        .route("/profile/bio", get(profile::get_bio).put(profile::set_bio))
        .route(
            "/profile/picture",
            get(profile::get_own_picture)
                .put(profile::set_picture)
                .layer(DefaultBodyLimit::max(profile::MAX_PICTURE_SIZE)),
        )
        .route("/users/{username}/profile", get(profile::get_user_profile))
        .route("/users/{username}/picture", get(profile::get_user_picture))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
