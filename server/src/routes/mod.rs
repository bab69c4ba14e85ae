//! HTTP surface assembly: the live-state API, the record-store API and
//! the back-office auth endpoint, behind permissive CORS like the rest of
//! the stack expects.

pub mod admin;
pub mod live;
pub mod records;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use axum_extra::TypedHeader;
use headers::Authorization;
use headers::authorization::Bearer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::errors::ApiError;
use crate::gateway;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/login", post(live::login))
        .route("/api/session", get(live::valid_session))
        .route("/api/game", get(live::list_games).post(live::create_game))
        .route("/api/game/code", get(live::game_by_code))
        .route("/api/game/{id}", get(live::get_game))
        .route("/api/game/{id}/ws", get(gateway::game_socket))
        .route("/api/add_player", post(records::add_player))
        .route("/api/players", get(records::list_players))
        .route("/api/match", post(records::record_match))
        .route("/api/undo", post(records::undo_match))
        .route("/api/summary", get(records::summary))
        .route("/token", post(admin::token))
        .route("/is_authorized", get(admin::is_authorized))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Resolve the bearer token of a request to a user id, or 401.
pub(crate) fn session_auth(
    state: &AppState,
    bearer: Option<&TypedHeader<Authorization<Bearer>>>,
) -> Result<Uuid, ApiError> {
    let bearer = bearer.ok_or(ApiError::Unauthorized)?;
    state
        .sessions
        .validate(bearer.token())
        .map_err(|_| ApiError::Unauthorized)
}
