//! The record-store endpoints. Every mutation re-hydrates the summary
//! cache so `/api/summary` stays a plain cached read.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;

use qubic_protocol::{
    AddPlayerRequest, GenericResponse, ListPlayersResponse, MatchResultRequest, PlayerInfo,
    SummaryResponse,
};

use crate::errors::ApiError;
use crate::records::summary;
use crate::state::AppState;

/// Re-hydrate after a mutation; a stale cache is not worth failing the
/// request over.
async fn refresh_summary(state: &AppState) {
    if let Err(err) = summary::hydrate(&state.summary, &state.store, state.elo_settings()).await {
        tracing::error!(%err, "Summary hydration failed");
    }
}

pub async fn add_player(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AddPlayerRequest>,
) -> Result<Json<GenericResponse>, ApiError> {
    state.store.add_player(&request.name).await?;
    refresh_summary(&state).await;
    Ok(Json(GenericResponse::success()))
}

pub async fn list_players(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ListPlayersResponse>, ApiError> {
    let players = state.store.list_players().await?;
    Ok(Json(ListPlayersResponse {
        players: players
            .into_iter()
            .map(|player| PlayerInfo {
                uuid: player.uuid,
                name: player.name,
            })
            .collect(),
    }))
}

pub async fn record_match(
    State(state): State<Arc<AppState>>,
    Json(request): Json<MatchResultRequest>,
) -> Result<Json<GenericResponse>, ApiError> {
    state
        .store
        .record_match(&request.winner, &request.loser)
        .await?;
    refresh_summary(&state).await;
    Ok(Json(GenericResponse::success()))
}

pub async fn undo_match(
    State(state): State<Arc<AppState>>,
) -> Result<Json<GenericResponse>, ApiError> {
    state.store.undo_last_match().await?;
    refresh_summary(&state).await;
    Ok(Json(GenericResponse::success()))
}

pub async fn summary(State(state): State<Arc<AppState>>) -> Json<SummaryResponse> {
    Json(SummaryResponse {
        response_json_str: state.summary.read().await,
    })
}
