//! Error types for the two failure surfaces: game operations rejected by
//! the engine, and HTTP requests translated to status codes.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use crate::engine::game::Phase;

/// A game operation that was refused. These are caught by the registry
/// scope, roll the game back, and are never forwarded to observers.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GameError {
    #[error("cannot `{op}` while the game is in phase {phase:?}")]
    WrongPhase { op: &'static str, phase: Phase },
    #[error("cannot start until both player slots are filled")]
    NotReady,
    #[error("piece does not match current turn (expected {expected}, game is at {actual})")]
    OutOfTurn { expected: u32, actual: u32 },
    #[error("position already occupied")]
    CellOccupied,
    #[error("position is outside the board")]
    OutOfBounds,
    #[error("it is not that color's turn")]
    NotYourTurn,
    #[error("user is not a game player")]
    NotAPlayer,
    #[error("game has two active players already")]
    Full,
    #[error("lobby appears to be empty and closed")]
    NoSlot,
    #[error("no game with that id")]
    UnknownGame,
    #[error("role is insufficient for this action")]
    Forbidden,
    #[error("internal game failure: {0}")]
    Internal(String),
}

/// An HTTP-surface failure, carrying its status mapping.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("could not validate credentials")]
    Unauthorized,
    #[error("forbidden")]
    Forbidden,
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Player already exists")]
    PlayerExists,
    #[error("internal server error")]
    Internal(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
    #[error(transparent)]
    Game(#[from] GameError),
}

impl ApiError {
    pub fn internal<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Internal(Box::new(err))
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            // Kept at 500 for client compatibility; 409 is the better fit.
            ApiError::PlayerExists => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Game(err) => match err {
                GameError::UnknownGame => StatusCode::NOT_FOUND,
                GameError::Forbidden => StatusCode::FORBIDDEN,
                GameError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
                _ => StatusCode::CONFLICT,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "Request failed");
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}
