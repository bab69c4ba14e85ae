//! The wire contract used consistently across the server and its clients.
//! Contains the inbound command frames for the game socket and the
//! request/response bodies of the HTTP surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Close code sent when a socket is rejected during the handshake.
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;

/// Close reason for a token that does not validate.
pub const REASON_INVALID_TOKEN: &str = "Invalid token";

/// Close reason for a game id that does not resolve.
pub const REASON_NO_GAME: &str = "No game found with that uuid";

fn default_version() -> u32 {
    1
}

/// Fields shared by every command body. The `event_id` is an idempotency
/// key minted by the client; `game_id` and `user_id` name the target game
/// and the acting user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandBody {
    #[serde(default = "default_version")]
    pub version: u32,
    pub timestamp: DateTime<Utc>,
    #[serde(default = "Uuid::new_v4")]
    pub event_id: Uuid,
    pub game_id: Uuid,
    pub user_id: Uuid,
}

impl CommandBody {
    pub fn new(game_id: Uuid, user_id: Uuid) -> Self {
        Self {
            version: 1,
            timestamp: Utc::now(),
            event_id: Uuid::new_v4(),
            game_id,
            user_id,
        }
    }
}

/// Body of the two piece-play commands. `current_turn` is the fencing
/// token: the play is only applied if it matches the game's turn number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayPieceBody {
    #[serde(flatten)]
    pub common: CommandBody,
    pub current_turn: u32,
    pub pos_x: u8,
    pub pos_y: u8,
    pub pos_z: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KickPlayerBody {
    #[serde(flatten)]
    pub common: CommandBody,
    pub kicked_player_id: Uuid,
}

/// An inbound frame on the game socket. The tag routes the command, the
/// body carries its arguments. Frames with unknown tags fail to parse and
/// get dropped by the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "snake_case")]
pub enum Command {
    // spectator commands
    GetGameState(CommandBody),
    BecomePlayer(CommandBody),
    // player commands
    PlayWhitePiece(PlayPieceBody),
    PlayBlackPiece(PlayPieceBody),
    /// Only valid before the game starts.
    Leave(CommandBody),
    /// Only valid after the game starts.
    Forfeit(CommandBody),
    // host controls
    StartGame(CommandBody),
    KickPlayer(KickPlayerBody),
    CloseGame(CommandBody),
    SwitchPlaces(CommandBody),
}

impl Command {
    pub fn common(&self) -> &CommandBody {
        match self {
            Command::GetGameState(b)
            | Command::BecomePlayer(b)
            | Command::Leave(b)
            | Command::Forfeit(b)
            | Command::StartGame(b)
            | Command::CloseGame(b)
            | Command::SwitchPlaces(b) => b,
            Command::PlayWhitePiece(b) | Command::PlayBlackPiece(b) => &b.common,
            Command::KickPlayer(b) => &b.common,
        }
    }

    pub fn game_id(&self) -> Uuid {
        self.common().game_id
    }

    pub fn user_id(&self) -> Uuid {
        self.common().user_id
    }

    /// The wire tag, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Command::GetGameState(_) => "get_game_state",
            Command::BecomePlayer(_) => "become_player",
            Command::PlayWhitePiece(_) => "play_white_piece",
            Command::PlayBlackPiece(_) => "play_black_piece",
            Command::Leave(_) => "leave",
            Command::Forfeit(_) => "forfeit",
            Command::StartGame(_) => "start_game",
            Command::KickPlayer(_) => "kick_player",
            Command::CloseGame(_) => "close_game",
            Command::SwitchPlaces(_) => "switch_places",
        }
    }
}

// HTTP surface: live-state service.

/// If the client does not provide a user id, a new one is created for it
/// and returned for reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub user_id: Option<Uuid>,
    pub name: String,
}

/// The session record as handed back to the client at login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub uuid: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub code: u16,
    pub message: String,
    pub session: SessionInfo,
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidSessionResponse {
    pub success: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateGameRequest {
    /// Reserved; games are always reachable through their generated code.
    #[serde(default)]
    pub game_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGameResponse {
    pub code: u16,
    pub game_id: Uuid,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListGamesResponse {
    #[serde(default)]
    pub game_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetGameByCodeResponse {
    pub game_id: Uuid,
}

// HTTP surface: record store and back office.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddPlayerRequest {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub uuid: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListPlayersResponse {
    pub players: Vec<PlayerInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResultRequest {
    pub winner: String,
    pub loser: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenericResponse {
    pub status: u16,
    pub message: Option<String>,
}

impl GenericResponse {
    pub fn success() -> Self {
        Self {
            status: 200,
            message: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerRank {
    pub name: String,
    pub elo: f64,
    pub win: u32,
    pub loss: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRecord {
    pub winner: String,
    pub loser: String,
    pub date: String,
}

/// The tabulated standings. Served pre-serialized out of the summary cache
/// so concurrent readers never pay for re-serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub last_hydrated: String,
    pub ordered_players: Vec<PlayerRank>,
    pub match_history: Vec<MatchRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryResponse {
    pub response_json_str: String,
}

/// OAuth2 password form for the back-office token endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminTokenForm {
    #[serde(default)]
    pub grant_type: Option<String>,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminTokenResponse {
    pub access_token: String,
    pub token_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_frames_parse_by_tag() {
        let frame = serde_json::json!({
            "type": "play_white_piece",
            "body": {
                "timestamp": "2026-01-01T00:00:00Z",
                "game_id": "230ebb4c-3eb1-4cb3-96c2-bce8f7654580",
                "user_id": "9f0c2cb5-8f3b-4e5c-9c55-4f4bfc5d7a01",
                "current_turn": 0,
                "pos_x": 1,
                "pos_y": 2,
                "pos_z": 3
            }
        });
        let cmd: Command = serde_json::from_value(frame).unwrap();
        match &cmd {
            Command::PlayWhitePiece(body) => {
                assert_eq!(body.current_turn, 0);
                assert_eq!((body.pos_x, body.pos_y, body.pos_z), (1, 2, 3));
                assert_eq!(body.common.version, 1);
            }
            other => panic!("parsed as {}", other.name()),
        }
    }

    #[test]
    fn unknown_tag_is_an_error() {
        let frame = serde_json::json!({ "type": "reboot_server", "body": {} });
        assert!(serde_json::from_value::<Command>(frame).is_err());
    }

    #[test]
    fn garbage_object_is_an_error() {
        assert!(serde_json::from_str::<Command>(r#"{"garbage": true}"#).is_err());
    }
}
