//! Routes inbound command frames to game mutations.
//!
//! Every handler runs inside a registry scope, so a failing command rolls
//! its game back and is simply dropped: the connection stays open and the
//! client learns the outcome from the next snapshot (or its absence).

use std::sync::Arc;

use qubic_protocol::Command;
use uuid::Uuid;

use crate::engine::game::Mark;
use crate::errors::GameError;
use crate::fabric::SubscriptionFabric;
use crate::registry::GameRegistry;

/// Per-connection authorization tier against one game. Higher tiers
/// subsume the capabilities of lower ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Role {
    Forbidden = 0,
    Spectator = 1,
    Player = 2,
    Host = 3,
    Admin = 4,
}

pub struct CommandDispatcher {
    registry: Arc<GameRegistry>,
    fabric: Arc<SubscriptionFabric>,
}

impl CommandDispatcher {
    pub fn new(registry: Arc<GameRegistry>, fabric: Arc<SubscriptionFabric>) -> Self {
        Self { registry, fabric }
    }

    /// Parse and execute one raw frame. Malformed frames, unknown tags,
    /// role violations and refused operations are all logged and dropped;
    /// none of them close the connection.
    pub fn dispatch_frame(&self, raw: &str, role: Role, conn_user: Uuid) {
        let command: Command = match serde_json::from_str(raw) {
            Ok(command) => command,
            Err(err) => {
                tracing::warn!(%err, "Dropping unparseable command frame");
                return;
            }
        };
        let name = command.name();
        let game_id = command.game_id();
        if let Err(err) = self.dispatch(command, role, conn_user) {
            if matches!(err, GameError::Internal(_)) {
                // an unexpected failure parks the game in the error phase
                let _ = self.registry.with_scope(game_id, |game| {
                    game.mark_errored();
                    Ok(())
                });
            }
            tracing::warn!(%err, command = name, user = %conn_user, "Dropped command");
        }
    }

    fn dispatch(&self, command: Command, role: Role, conn_user: Uuid) -> Result<(), GameError> {
        let game_id = command.game_id();
        let acting_user = command.user_id();
        match command {
            Command::GetGameState(_) => {
                self.require(role, Role::Spectator)?;
                // the cache already holds the current state; just flag the
                // game's subscriptions for redelivery
                if !self.registry.contains(game_id) {
                    return Err(GameError::UnknownGame);
                }
                self.fabric.mark_game_stale(game_id);
                Ok(())
            }
            Command::BecomePlayer(_) => {
                // promotion is for spectators only; seated users have a slot
                if role != Role::Spectator {
                    return Err(GameError::Forbidden);
                }
                self.require_self(conn_user, acting_user)?;
                self.registry
                    .with_scope(game_id, |game| game.try_promote_player(acting_user))
            }
            Command::PlayWhitePiece(body) => {
                self.require(role, Role::Player)?;
                self.require_self(conn_user, acting_user)?;
                self.registry.with_scope(game_id, |game| {
                    if game.white_player_id != Some(acting_user) {
                        return Err(GameError::Forbidden);
                    }
                    game.play(
                        Mark::White,
                        body.pos_x,
                        body.pos_y,
                        body.pos_z,
                        body.current_turn,
                    )
                })
            }
            Command::PlayBlackPiece(body) => {
                self.require(role, Role::Player)?;
                self.require_self(conn_user, acting_user)?;
                self.registry.with_scope(game_id, |game| {
                    if game.black_player_id != Some(acting_user) {
                        return Err(GameError::Forbidden);
                    }
                    game.play(
                        Mark::Black,
                        body.pos_x,
                        body.pos_y,
                        body.pos_z,
                        body.current_turn,
                    )
                })
            }
            Command::Leave(_) => {
                self.require(role, Role::Player)?;
                self.require_self(conn_user, acting_user)?;
                self.registry
                    .with_scope(game_id, |game| game.player_leave_game(acting_user))
            }
            Command::Forfeit(_) => {
                self.require(role, Role::Player)?;
                self.require_self(conn_user, acting_user)?;
                self.registry
                    .with_scope(game_id, |game| game.player_forfeit_game(acting_user))
            }
            Command::StartGame(_) => {
                self.require(role, Role::Host)?;
                self.registry.with_scope(game_id, |game| game.start())
            }
            Command::KickPlayer(body) => {
                self.require(role, Role::Host)?;
                self.registry
                    .with_scope(game_id, |game| game.remove_player(body.kicked_player_id))
            }
            Command::CloseGame(_) => {
                self.require(role, Role::Host)?;
                self.registry.with_scope(game_id, |game| {
                    game.close();
                    Ok(())
                })
            }
            Command::SwitchPlaces(_) => {
                self.require(role, Role::Host)?;
                self.registry
                    .with_scope(game_id, |game| game.switch_places())
            }
        }
    }

    fn require(&self, role: Role, minimum: Role) -> Result<(), GameError> {
        if role < minimum {
            return Err(GameError::Forbidden);
        }
        Ok(())
    }

    /// Player and spectator actions must be issued for the connection's
    /// own authenticated identity.
    fn require_self(&self, conn_user: Uuid, body_user: Uuid) -> Result<(), GameError> {
        if conn_user != body_user {
            return Err(GameError::Forbidden);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::game::Phase;
    use qubic_protocol::{CommandBody, KickPlayerBody, PlayPieceBody};

    struct Fixture {
        registry: Arc<GameRegistry>,
        dispatcher: CommandDispatcher,
        game_id: Uuid,
        host: Uuid,
        guest: Uuid,
    }

    fn fixture() -> Fixture {
        let registry = GameRegistry::new();
        let fabric = SubscriptionFabric::new(registry.clone());
        let dispatcher = CommandDispatcher::new(registry.clone(), fabric);
        let host = Uuid::new_v4();
        let guest = Uuid::new_v4();
        let game = registry.create(host).unwrap();
        registry
            .with_scope(game.uuid, |game| game.try_promote_player(guest))
            .unwrap();
        Fixture {
            registry,
            dispatcher,
            game_id: game.uuid,
            host,
            guest,
        }
    }

    fn play_white(fx: &Fixture, user: Uuid, turn: u32, x: u8) -> Command {
        Command::PlayWhitePiece(PlayPieceBody {
            common: CommandBody::new(fx.game_id, user),
            current_turn: turn,
            pos_x: x,
            pos_y: 0,
            pos_z: 0,
        })
    }

    fn start(fx: &Fixture) {
        fx.registry
            .with_scope(fx.game_id, |game| game.start())
            .unwrap();
    }

    #[tokio::test]
    async fn host_can_start_a_full_lobby() {
        let fx = fixture();
        fx.dispatcher
            .dispatch(
                Command::StartGame(CommandBody::new(fx.game_id, fx.host)),
                Role::Host,
                fx.host,
            )
            .unwrap();
        assert_eq!(
            fx.registry.by_id(fx.game_id).unwrap().phase,
            Phase::Running
        );
    }

    #[tokio::test]
    async fn start_with_one_empty_slot_is_dropped() {
        let fx = fixture();
        fx.registry
            .with_scope(fx.game_id, |game| game.remove_player(fx.guest))
            .unwrap();
        let err = fx
            .dispatcher
            .dispatch(
                Command::StartGame(CommandBody::new(fx.game_id, fx.host)),
                Role::Host,
                fx.host,
            )
            .unwrap_err();
        assert_eq!(err, GameError::NotReady);
        assert_eq!(
            fx.registry.by_id(fx.game_id).unwrap().phase,
            Phase::Initialized
        );
    }

    #[tokio::test]
    async fn host_commands_require_host_role() {
        let fx = fixture();
        for command in [
            Command::StartGame(CommandBody::new(fx.game_id, fx.guest)),
            Command::CloseGame(CommandBody::new(fx.game_id, fx.guest)),
            Command::SwitchPlaces(CommandBody::new(fx.game_id, fx.guest)),
            Command::KickPlayer(KickPlayerBody {
                common: CommandBody::new(fx.game_id, fx.guest),
                kicked_player_id: fx.host,
            }),
        ] {
            let err = fx
                .dispatcher
                .dispatch(command, Role::Player, fx.guest)
                .unwrap_err();
            assert_eq!(err, GameError::Forbidden);
        }
    }

    #[tokio::test]
    async fn play_requires_holding_the_color_slot() {
        let fx = fixture();
        start(&fx);
        // guest holds black, not white
        let err = fx
            .dispatcher
            .dispatch(play_white(&fx, fx.guest, 0, 0), Role::Player, fx.guest)
            .unwrap_err();
        assert_eq!(err, GameError::Forbidden);

        // host holds white and may play (host role subsumes player)
        fx.dispatcher
            .dispatch(play_white(&fx, fx.host, 0, 0), Role::Host, fx.host)
            .unwrap();
        assert_eq!(fx.registry.by_id(fx.game_id).unwrap().turn_number, 1);
    }

    #[tokio::test]
    async fn commands_for_someone_else_are_dropped() {
        let fx = fixture();
        start(&fx);
        let err = fx
            .dispatcher
            .dispatch(play_white(&fx, fx.host, 0, 0), Role::Player, fx.guest)
            .unwrap_err();
        assert_eq!(err, GameError::Forbidden);
    }

    #[tokio::test]
    async fn stale_turn_is_rejected_and_state_is_unchanged() {
        let fx = fixture();
        start(&fx);
        fx.dispatcher
            .dispatch(play_white(&fx, fx.host, 0, 0), Role::Host, fx.host)
            .unwrap();
        let before = fx.registry.by_id(fx.game_id).unwrap();

        // replaying the same move with the old fencing token fails
        let err = fx
            .dispatcher
            .dispatch(play_white(&fx, fx.host, 0, 1), Role::Host, fx.host)
            .unwrap_err();
        assert!(matches!(err, GameError::OutOfTurn { .. }));
        let after = fx.registry.by_id(fx.game_id).unwrap();
        assert_eq!(after.board, before.board);
        assert_eq!(after.turn_number, before.turn_number);
    }

    #[tokio::test]
    async fn spectator_promotes_then_loses_spectator_powers() {
        let fx = fixture();
        fx.registry
            .with_scope(fx.game_id, |game| game.remove_player(fx.guest))
            .unwrap();
        let watcher = Uuid::new_v4();
        fx.dispatcher
            .dispatch(
                Command::BecomePlayer(CommandBody::new(fx.game_id, watcher)),
                Role::Spectator,
                watcher,
            )
            .unwrap();
        assert!(fx.registry.by_id(fx.game_id).unwrap().is_player(watcher));

        // a seated player cannot promote again
        let err = fx
            .dispatcher
            .dispatch(
                Command::BecomePlayer(CommandBody::new(fx.game_id, watcher)),
                Role::Player,
                watcher,
            )
            .unwrap_err();
        assert_eq!(err, GameError::Forbidden);
    }

    #[tokio::test]
    async fn garbage_frames_are_dropped_without_effect() {
        let fx = fixture();
        let before = fx.registry.by_id(fx.game_id).unwrap();
        for _ in 0..3 {
            fx.dispatcher
                .dispatch_frame(r#"{"garbage": true}"#, Role::Spectator, fx.guest);
        }
        fx.dispatcher
            .dispatch_frame("not even json", Role::Spectator, fx.guest);
        let after = fx.registry.by_id(fx.game_id).unwrap();
        assert_eq!(after.modified_at, before.modified_at);

        // a valid command still processes afterwards
        fx.dispatcher
            .dispatch(
                Command::StartGame(CommandBody::new(fx.game_id, fx.host)),
                Role::Host,
                fx.host,
            )
            .unwrap();
    }

    #[tokio::test]
    async fn forfeit_awards_the_opponent_through_the_dispatcher() {
        let fx = fixture();
        start(&fx);
        fx.dispatcher
            .dispatch(
                Command::Forfeit(CommandBody::new(fx.game_id, fx.guest)),
                Role::Player,
                fx.guest,
            )
            .unwrap();
        let game = fx.registry.by_id(fx.game_id).unwrap();
        assert_eq!(game.phase, Phase::Finished);
        assert_eq!(game.winner, 1);
    }
}
