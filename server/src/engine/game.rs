//! The per-game entity: board, role slots, lifecycle phase, turn
//! sequencing. Every mutating operation checks its phase guard and its
//! preconditions before touching any state, so a failed call leaves the
//! game untouched even outside a registry scope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::board::{self, BOARD_SIZE, Board, EMPTY};
use crate::errors::GameError;

/// Lifecycle phase. Serialized as its numeric value on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Phase {
    Initialized = 0,
    Running = 1,
    Paused = 2,
    Finished = 3,
    Error = 4,
}

impl From<Phase> for u8 {
    fn from(phase: Phase) -> u8 {
        phase as u8
    }
}

impl TryFrom<u8> for Phase {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, String> {
        match value {
            0 => Ok(Phase::Initialized),
            1 => Ok(Phase::Running),
            2 => Ok(Phase::Paused),
            3 => Ok(Phase::Finished),
            4 => Ok(Phase::Error),
            other => Err(format!("unknown phase {other}")),
        }
    }
}

/// What ended the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum EndReason {
    Error = 0,
    BoardPosition = 1,
    Forfeit = 2,
    LobbyClose = 3,
}

impl From<EndReason> for u8 {
    fn from(reason: EndReason) -> u8 {
        reason as u8
    }
}

impl TryFrom<u8> for EndReason {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, String> {
        match value {
            0 => Ok(EndReason::Error),
            1 => Ok(EndReason::BoardPosition),
            2 => Ok(EndReason::Forfeit),
            3 => Ok(EndReason::LobbyClose),
            other => Err(format!("unknown end reason {other}")),
        }
    }
}

/// A player color. The numeric value is the mark written into the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mark {
    White = 1,
    Black = 2,
}

impl Mark {
    pub fn value(self) -> u8 {
        self as u8
    }

    pub fn opponent(self) -> Mark {
        match self {
            Mark::White => Mark::Black,
            Mark::Black => Mark::White,
        }
    }
}

/// One applied move: (player mark, x, y, z). Serialized as a 4-tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRecord(pub u8, pub u8, pub u8, pub u8);

/// A single live match. Kept in memory only; the registry owns all
/// instances and hands out clones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Game {
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,

    pub uuid: Uuid,
    /// Short join code, unique across live games.
    pub code: String,

    pub board: Board,

    /// The host gets lobby permissions (start, kick, switch, close). The
    /// host is the creating player and never changes.
    pub host_player_id: Uuid,
    pub white_player_id: Option<Uuid>,
    pub black_player_id: Option<Uuid>,

    pub white_is_connected: bool,
    pub black_is_connected: bool,
    pub spectator_count: u32,

    pub phase: Phase,
    pub end_of_game_trigger: Option<EndReason>,
    /// 0 none, 1 white, 2 black.
    pub winner: u8,

    /// Clients echo this back on play requests so the same move is never
    /// applied twice.
    pub turn_number: u32,

    /// Not broadcast over the socket; only the full HTTP view carries it.
    pub move_history: Vec<MoveRecord>,
}

/// The network view of a game: everything except the move history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub uuid: Uuid,
    pub code: String,
    pub board: Board,
    pub host_player_id: Uuid,
    pub white_player_id: Option<Uuid>,
    pub black_player_id: Option<Uuid>,
    pub white_is_connected: bool,
    pub black_is_connected: bool,
    pub spectator_count: u32,
    pub phase: Phase,
    pub end_of_game_trigger: Option<EndReason>,
    pub winner: u8,
    pub turn_number: u32,
}

impl Game {
    /// A fresh lobby. The creating player hosts and occupies the white
    /// slot by default; colors can change while the lobby is open.
    pub fn new(host_player_id: Uuid, code: String) -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            modified_at: now,
            finished_at: None,
            uuid: Uuid::new_v4(),
            code,
            board: [[[EMPTY; BOARD_SIZE]; BOARD_SIZE]; BOARD_SIZE],
            host_player_id,
            white_player_id: Some(host_player_id),
            black_player_id: None,
            white_is_connected: false,
            black_is_connected: false,
            spectator_count: 0,
            phase: Phase::Initialized,
            end_of_game_trigger: None,
            winner: 0,
            turn_number: 0,
            move_history: Vec::new(),
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            created_at: self.created_at,
            modified_at: self.modified_at,
            finished_at: self.finished_at,
            uuid: self.uuid,
            code: self.code.clone(),
            board: self.board,
            host_player_id: self.host_player_id,
            white_player_id: self.white_player_id,
            black_player_id: self.black_player_id,
            white_is_connected: self.white_is_connected,
            black_is_connected: self.black_is_connected,
            spectator_count: self.spectator_count,
            phase: self.phase,
            end_of_game_trigger: self.end_of_game_trigger,
            winner: self.winner,
            turn_number: self.turn_number,
        }
    }

    /// Even turns are white's, odd turns black's; nobody's outside RUNNING.
    pub fn whose_turn(&self) -> Option<Mark> {
        if self.phase != Phase::Running {
            return None;
        }
        if self.turn_number % 2 == 0 {
            Some(Mark::White)
        } else {
            Some(Mark::Black)
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.phase, Phase::Finished | Phase::Error)
    }

    pub fn is_player(&self, user_id: Uuid) -> bool {
        self.white_player_id == Some(user_id) || self.black_player_id == Some(user_id)
    }

    fn only_on_init(&self, op: &'static str) -> Result<(), GameError> {
        if self.phase != Phase::Initialized {
            return Err(GameError::WrongPhase {
                op,
                phase: self.phase,
            });
        }
        Ok(())
    }

    fn only_in_game(&self, op: &'static str) -> Result<(), GameError> {
        if self.phase != Phase::Running {
            return Err(GameError::WrongPhase {
                op,
                phase: self.phase,
            });
        }
        Ok(())
    }

    /// Begin play. Requires a full lobby.
    pub fn start(&mut self) -> Result<(), GameError> {
        self.only_on_init("start")?;
        if self.white_player_id.is_none() || self.black_player_id.is_none() {
            return Err(GameError::NotReady);
        }
        tracing::debug!(game = %self.uuid, "Game has started");
        self.phase = Phase::Running;
        Ok(())
    }

    pub fn switch_places(&mut self) -> Result<(), GameError> {
        self.only_on_init("switch places")?;
        std::mem::swap(&mut self.white_player_id, &mut self.black_player_id);
        Ok(())
    }

    /// Clear the slot held by `removed_id`, if any.
    pub fn remove_player(&mut self, removed_id: Uuid) -> Result<(), GameError> {
        self.only_on_init("remove player")?;
        if self.white_player_id == Some(removed_id) {
            self.white_player_id = None;
        } else if self.black_player_id == Some(removed_id) {
            self.black_player_id = None;
        }
        self.close_if_abandoned();
        Ok(())
    }

    /// Promote a spectator into the single free player slot. There is
    /// always either 0 or 1 free slot: a lobby with two free slots gets
    /// closed instead of lingering.
    pub fn try_promote_player(&mut self, user_id: Uuid) -> Result<(), GameError> {
        self.only_on_init("promote player")?;
        match (self.white_player_id, self.black_player_id) {
            (None, None) => Err(GameError::NoSlot),
            (Some(_), Some(_)) => Err(GameError::Full),
            (Some(_), None) => {
                self.black_player_id = Some(user_id);
                Ok(())
            }
            (None, Some(_)) => {
                self.white_player_id = Some(user_id);
                Ok(())
            }
        }
    }

    /// A player leaves the lobby. Leaving when not seated is a no-op so
    /// the client always gets success.
    pub fn player_leave_game(&mut self, user_id: Uuid) -> Result<(), GameError> {
        self.only_on_init("leave game")?;
        if self.white_player_id == Some(user_id) {
            self.white_player_id = None;
        } else if self.black_player_id == Some(user_id) {
            self.black_player_id = None;
        }
        self.close_if_abandoned();
        Ok(())
    }

    /// A lobby with no seated players at all does not get to linger.
    fn close_if_abandoned(&mut self) {
        if self.white_player_id.is_none() && self.black_player_id.is_none() {
            self.close();
        }
    }

    /// Apply one piece. `expected_turn` fences retries: it must match the
    /// current turn number or the play is rejected unapplied.
    pub fn play(
        &mut self,
        mark: Mark,
        x: u8,
        y: u8,
        z: u8,
        expected_turn: u32,
    ) -> Result<(), GameError> {
        self.only_in_game("play piece")?;
        if expected_turn != self.turn_number {
            return Err(GameError::OutOfTurn {
                expected: expected_turn,
                actual: self.turn_number,
            });
        }
        if self.whose_turn() != Some(mark) {
            return Err(GameError::NotYourTurn);
        }
        if (x as usize) >= BOARD_SIZE || (y as usize) >= BOARD_SIZE || (z as usize) >= BOARD_SIZE {
            return Err(GameError::OutOfBounds);
        }
        if self.board[x as usize][y as usize][z as usize] != EMPTY {
            return Err(GameError::CellOccupied);
        }

        self.board[x as usize][y as usize][z as usize] = mark.value();
        self.move_history.push(MoveRecord(mark.value(), x, y, z));
        self.turn_number += 1;

        if board::has_line(&self.board, mark.value()) {
            self.end_of_game(mark.value(), EndReason::BoardPosition);
        }
        Ok(())
    }

    /// An active player concedes; the opponent wins.
    pub fn player_forfeit_game(&mut self, user_id: Uuid) -> Result<(), GameError> {
        self.only_in_game("forfeit game")?;
        let winner = if self.white_player_id == Some(user_id) {
            Mark::Black
        } else if self.black_player_id == Some(user_id) {
            Mark::White
        } else {
            return Err(GameError::NotAPlayer);
        };
        self.end_of_game(winner.value(), EndReason::Forfeit);
        Ok(())
    }

    /// Shut the lobby down. No-op once the game is already over.
    pub fn close(&mut self) {
        if self.is_terminal() {
            return;
        }
        self.end_of_game(0, EndReason::LobbyClose);
    }

    fn end_of_game(&mut self, winner: u8, reason: EndReason) {
        self.end_of_game_trigger = Some(reason);
        self.finished_at = Some(Utc::now());
        match reason {
            EndReason::Error => {
                self.phase = Phase::Error;
            }
            EndReason::BoardPosition | EndReason::Forfeit => {
                self.winner = winner;
                self.phase = Phase::Finished;
            }
            EndReason::LobbyClose => {
                self.phase = Phase::Finished;
            }
        }
    }

    /// Record an unexpected failure and park the game in the error phase.
    pub fn mark_errored(&mut self) {
        if self.is_terminal() {
            return;
        }
        self.end_of_game(0, EndReason::Error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lobby() -> (Game, Uuid, Uuid) {
        let host = Uuid::new_v4();
        let guest = Uuid::new_v4();
        let mut game = Game::new(host, "ABCD".into());
        game.try_promote_player(guest).unwrap();
        (game, host, guest)
    }

    fn running() -> (Game, Uuid, Uuid) {
        let (mut game, host, guest) = lobby();
        game.start().unwrap();
        (game, host, guest)
    }

    #[test]
    fn host_occupies_white_by_default() {
        let host = Uuid::new_v4();
        let game = Game::new(host, "ABCD".into());
        assert_eq!(game.white_player_id, Some(host));
        assert_eq!(game.black_player_id, None);
        assert_eq!(game.phase, Phase::Initialized);
    }

    #[test]
    fn start_requires_both_slots() {
        let host = Uuid::new_v4();
        let mut game = Game::new(host, "ABCD".into());
        assert_eq!(game.start(), Err(GameError::NotReady));
        assert_eq!(game.phase, Phase::Initialized);

        game.try_promote_player(Uuid::new_v4()).unwrap();
        game.start().unwrap();
        assert_eq!(game.phase, Phase::Running);
    }

    #[test]
    fn promote_fills_whichever_slot_is_free() {
        let (mut game, host, guest) = lobby();
        assert_eq!(game.black_player_id, Some(guest));

        // free the white slot and promote into it
        game.remove_player(host).unwrap();
        let third = Uuid::new_v4();
        game.try_promote_player(third).unwrap();
        assert_eq!(game.white_player_id, Some(third));
    }

    #[test]
    fn promote_into_full_game_fails() {
        let (mut game, _, _) = lobby();
        assert_eq!(
            game.try_promote_player(Uuid::new_v4()),
            Err(GameError::Full)
        );
    }

    #[test]
    fn promote_into_empty_lobby_fails() {
        // the slots cannot both empty through the public operations, so
        // force the state to check the defensive arm
        let mut game = Game::new(Uuid::new_v4(), "ABCD".into());
        game.white_player_id = None;
        assert_eq!(
            game.try_promote_player(Uuid::new_v4()),
            Err(GameError::NoSlot)
        );
    }

    #[test]
    fn emptying_both_slots_closes_the_lobby() {
        let (mut game, host, guest) = lobby();
        game.remove_player(host).unwrap();
        assert_eq!(game.phase, Phase::Initialized);
        game.player_leave_game(guest).unwrap();
        assert_eq!(game.phase, Phase::Finished);
        assert_eq!(game.end_of_game_trigger, Some(EndReason::LobbyClose));
    }

    #[test]
    fn switch_places_swaps_colors() {
        let (mut game, host, guest) = lobby();
        game.switch_places().unwrap();
        assert_eq!(game.white_player_id, Some(guest));
        assert_eq!(game.black_player_id, Some(host));
    }

    #[test]
    fn lobby_operations_rejected_while_running() {
        let (mut game, host, _) = running();
        assert!(matches!(
            game.switch_places(),
            Err(GameError::WrongPhase { .. })
        ));
        assert!(matches!(
            game.remove_player(host),
            Err(GameError::WrongPhase { .. })
        ));
        assert!(matches!(
            game.try_promote_player(Uuid::new_v4()),
            Err(GameError::WrongPhase { .. })
        ));
        assert!(matches!(
            game.player_leave_game(host),
            Err(GameError::WrongPhase { .. })
        ));
    }

    #[test]
    fn play_writes_the_movers_own_mark() {
        let (mut game, _, _) = running();
        game.play(Mark::White, 0, 0, 0, 0).unwrap();
        game.play(Mark::Black, 1, 0, 0, 1).unwrap();
        assert_eq!(game.board[0][0][0], 1);
        assert_eq!(game.board[1][0][0], 2);
    }

    #[test]
    fn turn_number_tracks_history_length() {
        let (mut game, _, _) = running();
        let moves = [(0u8, Mark::White), (1, Mark::Black), (2, Mark::White)];
        for (i, (x, who)) in moves.into_iter().enumerate() {
            game.play(who, x, 0, 0, i as u32).unwrap();
            assert_eq!(game.turn_number as usize, game.move_history.len());
        }
    }

    #[test]
    fn play_rejects_stale_turn_and_leaves_state_unchanged() {
        let (mut game, _, _) = running();
        game.play(Mark::White, 0, 0, 0, 0).unwrap();
        let before = game.clone();
        let err = game.play(Mark::Black, 1, 1, 1, 0).unwrap_err();
        assert_eq!(
            err,
            GameError::OutOfTurn {
                expected: 0,
                actual: 1
            }
        );
        assert_eq!(game.board, before.board);
        assert_eq!(game.turn_number, before.turn_number);
    }

    #[test]
    fn play_rejects_out_of_turn_color() {
        let (mut game, _, _) = running();
        assert_eq!(
            game.play(Mark::Black, 0, 0, 0, 0),
            Err(GameError::NotYourTurn)
        );
    }

    #[test]
    fn play_rejects_occupied_and_out_of_bounds() {
        let (mut game, _, _) = running();
        game.play(Mark::White, 2, 2, 2, 0).unwrap();
        assert_eq!(
            game.play(Mark::Black, 2, 2, 2, 1),
            Err(GameError::CellOccupied)
        );
        assert_eq!(
            game.play(Mark::Black, 5, 0, 0, 1),
            Err(GameError::OutOfBounds)
        );
    }

    #[test]
    fn occupied_cell_never_changes_mark() {
        let (mut game, _, _) = running();
        game.play(Mark::White, 0, 0, 0, 0).unwrap();
        let _ = game.play(Mark::Black, 0, 0, 0, 1);
        assert_eq!(game.board[0][0][0], 1);
    }

    #[test]
    fn four_in_a_line_finishes_the_game() {
        // white builds a column while black plays elsewhere
        let (mut game, _, _) = running();
        let mut turn = 0;
        for z in 0..3u8 {
            game.play(Mark::White, 0, 0, z, turn).unwrap();
            turn += 1;
            game.play(Mark::Black, 1, 0, z, turn).unwrap();
            turn += 1;
        }
        game.play(Mark::White, 0, 0, 3, turn).unwrap();

        assert_eq!(game.phase, Phase::Finished);
        assert_eq!(game.winner, 1);
        assert_eq!(game.end_of_game_trigger, Some(EndReason::BoardPosition));
        assert!(game.finished_at.is_some());
        assert!(board::has_line(&game.board, 1));
    }

    #[test]
    fn no_play_after_finish() {
        let (mut game, _, _) = running();
        game.close();
        assert!(matches!(
            game.play(Mark::White, 0, 0, 0, 0),
            Err(GameError::WrongPhase { .. })
        ));
    }

    #[test]
    fn forfeit_awards_the_opponent() {
        let (mut game, _, guest) = running();
        // guest holds black
        game.player_forfeit_game(guest).unwrap();
        assert_eq!(game.phase, Phase::Finished);
        assert_eq!(game.winner, 1);
        assert_eq!(game.end_of_game_trigger, Some(EndReason::Forfeit));
    }

    #[test]
    fn forfeit_by_bystander_rejected() {
        let (mut game, _, _) = running();
        assert_eq!(
            game.player_forfeit_game(Uuid::new_v4()),
            Err(GameError::NotAPlayer)
        );
    }

    #[test]
    fn close_is_idempotent_and_safe_after_finish() {
        let (mut game, _, guest) = running();
        game.player_forfeit_game(guest).unwrap();
        let finished = game.clone();
        game.close();
        assert_eq!(game.winner, finished.winner);
        assert_eq!(game.end_of_game_trigger, finished.end_of_game_trigger);
    }

    #[test]
    fn internal_failure_parks_the_game_in_error_phase() {
        let (mut game, _, _) = running();
        game.mark_errored();
        assert_eq!(game.phase, Phase::Error);
        assert_eq!(game.end_of_game_trigger, Some(EndReason::Error));
        assert_eq!(game.winner, 0);
        game.mark_errored();
        assert_eq!(game.phase, Phase::Error);
    }

    #[test]
    fn whose_turn_outside_running_is_nobody() {
        let (game, _, _) = lobby();
        assert_eq!(game.whose_turn(), None);
    }

    #[test]
    fn snapshot_round_trip_is_byte_stable() {
        let (mut game, _, _) = running();
        game.play(Mark::White, 1, 2, 3, 0).unwrap();
        let first = serde_json::to_string(&game.snapshot()).unwrap();
        let parsed: Snapshot = serde_json::from_str(&first).unwrap();
        let second = serde_json::to_string(&parsed).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn snapshot_excludes_move_history() {
        let (mut game, _, _) = running();
        game.play(Mark::White, 0, 1, 2, 0).unwrap();
        let json = serde_json::to_string(&game.snapshot()).unwrap();
        assert!(!json.contains("move_history"));
        let full = serde_json::to_string(&game).unwrap();
        assert!(full.contains("move_history"));
    }
}
