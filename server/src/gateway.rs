//! Per-connection handling for the game socket: authenticate the token,
//! resolve the caller's role against the game, register a subscription
//! and feed inbound frames to the dispatcher. Whatever ends the read loop,
//! the subscription is released and presence rolled back on the way out.

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::sink::SinkExt;
use futures_util::stream::{SplitSink, StreamExt};
use serde::Deserialize;
use uuid::Uuid;

use qubic_protocol::{CLOSE_POLICY_VIOLATION, REASON_INVALID_TOKEN, REASON_NO_GAME};

use crate::dispatch::Role;
use crate::engine::game::Game;
use crate::fabric::{Outbound, SinkClosed};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SocketQuery {
    token: String,
}

/// Upgrades `/api/game/{id}/ws?token=...` into the long-lived handler.
pub async fn game_socket(
    ws: WebSocketUpgrade,
    Path(game_id): Path<Uuid>,
    Query(query): Query<SocketQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, game_id, query.token))
}

/// The fabric's view of the connection: the write half of the socket.
struct WsOutbound(SplitSink<WebSocket, Message>);

impl Outbound for WsOutbound {
    fn send_text(&mut self, text: String) -> impl Future<Output = Result<(), SinkClosed>> + Send {
        async move {
            self.0
                .send(Message::Text(text.into()))
                .await
                .map_err(|_| SinkClosed)
        }
    }
}

async fn close_with(sender: &mut SplitSink<WebSocket, Message>, reason: &'static str) {
    let frame = CloseFrame {
        code: CLOSE_POLICY_VIOLATION,
        reason: Utf8Bytes::from_static(reason),
    };
    let _ = sender.send(Message::Close(Some(frame))).await;
}

fn resolve_role(game: &Game, user_id: Uuid) -> Role {
    if user_id == game.host_player_id {
        Role::Host
    } else if game.is_player(user_id) {
        Role::Player
    } else {
        Role::Spectator
    }
}

/// Reflect connect/disconnect in the game's presence fields. Failing is
/// fine; the game may already be gone.
fn mark_presence(state: &AppState, game_id: Uuid, user_id: Uuid, connected: bool) {
    let result = state.registry.with_scope(game_id, |game| {
        if game.white_player_id == Some(user_id) {
            game.white_is_connected = connected;
        } else if game.black_player_id == Some(user_id) {
            game.black_is_connected = connected;
        } else if connected {
            game.spectator_count += 1;
        } else {
            game.spectator_count = game.spectator_count.saturating_sub(1);
        }
        Ok(())
    });
    if let Err(err) = result {
        tracing::debug!(%err, game = %game_id, "Presence update skipped");
    }
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, game_id: Uuid, token: String) {
    let (mut sender, mut receiver) = socket.split();

    let user_id = match state.sessions.validate(&token) {
        Ok(user_id) => user_id,
        Err(err) => {
            tracing::warn!(%err, "Rejecting socket with invalid token");
            close_with(&mut sender, REASON_INVALID_TOKEN).await;
            return;
        }
    };

    let Some(game) = state.registry.by_id(game_id) else {
        tracing::warn!(game = %game_id, "Attempted to connect to a non-existent game");
        close_with(&mut sender, REASON_NO_GAME).await;
        return;
    };

    let role = resolve_role(&game, user_id);
    if role == Role::Host {
        // the lobby sentinel stands down once the host shows up
        state.registry.confirm_host(game_id);
    }

    mark_presence(&state, game_id, user_id, true);

    let sub_id = match state.fabric.subscribe(game_id, WsOutbound(sender)) {
        Ok(sub_id) => sub_id,
        Err(err) => {
            tracing::error!(%err, game = %game_id, "Failed to register subscription");
            mark_presence(&state, game_id, user_id, false);
            return;
        }
    };
    tracing::debug!(user = %user_id, game = %game_id, ?role, "Socket connected");

    // commands from one connection are handled strictly in arrival order
    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                state.dispatcher.dispatch_frame(text.as_str(), role, user_id);
            }
            Ok(Message::Close(_)) => break,
            // pings and pongs are answered by the stack; binary is noise
            Ok(_) => {}
            Err(_) => break,
        }
    }

    state.fabric.unsubscribe(sub_id);
    mark_presence(&state, game_id, user_id, false);
    tracing::debug!(user = %user_id, game = %game_id, "Socket disconnected");
}
