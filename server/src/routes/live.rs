//! The live-state endpoints: login, session probe, game creation and
//! lookup. All of them except login require a bearer token.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum_extra::TypedHeader;
use headers::Authorization;
use headers::authorization::Bearer;
use serde::Deserialize;
use uuid::Uuid;

use qubic_protocol::{
    CreateGameRequest, CreateGameResponse, GetGameByCodeResponse, ListGamesResponse, LoginRequest,
    LoginResponse, ValidSessionResponse,
};

use crate::engine::game::Game;
use crate::errors::ApiError;
use crate::routes::session_auth;
use crate::state::AppState;

/// Clients log in first. Without stored credentials they just provide a
/// name and get a fresh user id along with the session and token.
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let (session, token) = state
        .sessions
        .login(request.user_id, &request.name)
        .map_err(ApiError::internal)?;
    tracing::info!(user = %session.user_id, name = %session.name, "Login");
    Ok(Json(LoginResponse {
        code: 200,
        message: "successful login".to_owned(),
        session: session.info(),
        token,
    }))
}

/// Lets a restarting client check whether its stored token still works.
pub async fn valid_session(
    State(state): State<Arc<AppState>>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
) -> Result<Json<ValidSessionResponse>, ApiError> {
    session_auth(&state, bearer.as_ref())?;
    Ok(Json(ValidSessionResponse { success: true }))
}

pub async fn list_games(
    State(state): State<Arc<AppState>>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
) -> Result<Json<ListGamesResponse>, ApiError> {
    session_auth(&state, bearer.as_ref())?;
    Ok(Json(ListGamesResponse {
        game_ids: state.registry.all_ids(),
    }))
}

pub async fn create_game(
    State(state): State<Arc<AppState>>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    Json(_request): Json<CreateGameRequest>,
) -> Result<Json<CreateGameResponse>, ApiError> {
    let host_id = session_auth(&state, bearer.as_ref())?;
    let game = state.registry.create(host_id)?;
    Ok(Json(CreateGameResponse {
        code: 200,
        game_id: game.uuid,
    }))
}

#[derive(Debug, Deserialize)]
pub struct CodeQuery {
    code: String,
}

pub async fn game_by_code(
    State(state): State<Arc<AppState>>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    Query(query): Query<CodeQuery>,
) -> Result<Json<GetGameByCodeResponse>, ApiError> {
    session_auth(&state, bearer.as_ref())?;
    let game = state
        .registry
        .by_code(&query.code)
        .ok_or_else(|| ApiError::NotFound(format!("No game found with code {}", query.code)))?;
    Ok(Json(GetGameByCodeResponse { game_id: game.uuid }))
}

/// The full game state, move history included. The socket's snapshots
/// leave the history out; this endpoint is where it is visible.
pub async fn get_game(
    State(state): State<Arc<AppState>>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    Path(game_id): Path<Uuid>,
) -> Result<Json<Game>, ApiError> {
    session_auth(&state, bearer.as_ref())?;
    let game = state
        .registry
        .by_id(game_id)
        .ok_or_else(|| ApiError::NotFound("Game with provided id does not exist".to_owned()))?;
    Ok(Json(game))
}
