//! Game operations: lobby, turn order, rolls and moves.
//!
//! The rules crate decides what is legal; this module owns everything the
//! rules leave to the caller: whose turn it is, which roll is pending,
//! sending captured pieces home and recording the move log.

#[cfg(test)]
use std::collections::VecDeque;
#[cfg(test)]
use std::sync::Mutex;

use madn_core::{
    can_move, check_die, check_piece_index, enumerate_moves, has_won, resolve_capture, Color, Move,
    RuleSet, ENTRY_ROLL,
};
use rand::Rng;
use rusqlite::Connection;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::{MoveResponse, RollResponse};
use crate::store::{self, GameRow, GameStatus, MoveRow, PlayerRow, Store};

/// Length of a join code.
const CODE_LEN: usize = 6;
const CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const MAX_NAME_LEN: usize = 50;
const MIN_PLAYERS: usize = 2;

/// Source of die rolls.
pub trait Dice: Send + Sync {
    fn roll(&self) -> u8;
}

/// Thread-local RNG die.
pub struct RandomDice;

impl Dice for RandomDice {
    fn roll(&self) -> u8 {
        madn_core::roll_die(&mut rand::rng())
    }
}

/// Die that replays a fixed script, then keeps rolling its last value.
#[cfg(test)]
pub struct ScriptedDice {
    rolls: Mutex<VecDeque<u8>>,
}

#[cfg(test)]
impl ScriptedDice {
    pub fn new(rolls: impl IntoIterator<Item = u8>) -> Self {
        ScriptedDice {
            rolls: Mutex::new(rolls.into_iter().collect()),
        }
    }
}

#[cfg(test)]
impl Dice for ScriptedDice {
    fn roll(&self) -> u8 {
        let mut rolls = self.rolls.lock().unwrap_or_else(|p| p.into_inner());
        if rolls.len() > 1 {
            rolls.pop_front().unwrap_or(1)
        } else {
            rolls.front().copied().unwrap_or(1)
        }
    }
}

fn generate_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..CODE_LEN)
        .map(|_| CODE_CHARSET[rng.random_range(0..CODE_CHARSET.len())] as char)
        .collect()
}

fn validate_name(name: &str) -> Result<String, ApiError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("Player name must not be empty"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(ApiError::bad_request(format!(
            "Player name must be at most {} characters",
            MAX_NAME_LEN
        )));
    }
    Ok(name.to_string())
}

fn load_game(conn: &Connection, id: Uuid) -> Result<GameRow, ApiError> {
    store::find_game(conn, id)?.ok_or(ApiError::NotFound("Game not found"))
}

fn new_player(name: String, color: Color, order: usize) -> PlayerRow {
    PlayerRow {
        id: Uuid::new_v4(),
        name,
        color,
        pieces: Default::default(),
        order,
        is_connected: true,
    }
}

/// The current player, if it is `player_id`, of a game in progress.
fn current_mover(game: &GameRow, player_id: Uuid) -> Result<PlayerRow, ApiError> {
    if game.status != GameStatus::InProgress {
        return Err(ApiError::bad_request("Game is not in progress"));
    }
    match game.current_player() {
        Some(player) if player.id == player_id => Ok(player.clone()),
        _ => Err(ApiError::bad_request("Not your turn")),
    }
}

/// Game service over a store, a die and a rule set.
pub struct Games {
    store: Store,
    dice: Box<dyn Dice>,
    rules: RuleSet,
}

impl Games {
    pub fn new(store: Store, dice: Box<dyn Dice>, rules: RuleSet) -> Self {
        Games { store, dice, rules }
    }

    /// Create a game in the lobby with its creator seated as Red.
    pub fn create_game(&self, player_name: &str) -> Result<GameRow, ApiError> {
        let name = validate_name(player_name)?;
        let game = self.store.transaction(|conn| {
            let mut rng = rand::rng();
            let mut code = generate_code(&mut rng);
            while store::code_exists(conn, &code)? {
                code = generate_code(&mut rng);
            }

            let id = Uuid::new_v4();
            store::insert_game(conn, id, &code)?;
            store::insert_player(conn, id, &new_player(name, Color::Red, 0))?;
            load_game(conn, id)
        })?;
        info!(game = %game.id, code = %game.code, "game created");
        Ok(game)
    }

    /// Seat a new player in a waiting game under the next free color.
    pub fn join_game(&self, code: &str, player_name: &str) -> Result<GameRow, ApiError> {
        let name = validate_name(player_name)?;
        let code = code.trim().to_ascii_uppercase();
        let (game, color) = self.store.transaction(|conn| {
            let id = store::find_game_id_by_code(conn, &code)?.ok_or(ApiError::NotFound("Game not found"))?;
            let game = load_game(conn, id)?;
            if game.status != GameStatus::Waiting {
                return Err(ApiError::bad_request("Game has already started"));
            }
            let color = Color::all()
                .find(|c| game.player_by_color(*c).is_none())
                .ok_or_else(|| ApiError::bad_request("Game is full"))?;

            store::insert_player(conn, id, &new_player(name, color, game.players.len()))?;
            Ok((load_game(conn, id)?, color))
        })?;
        info!(game = %game.id, %color, players = game.players.len(), "player joined");
        Ok(game)
    }

    pub fn get_game(&self, id: Uuid) -> Result<GameRow, ApiError> {
        self.store.transaction(|conn| load_game(conn, id))
    }

    pub fn get_game_by_code(&self, code: &str) -> Result<GameRow, ApiError> {
        let code = code.trim().to_ascii_uppercase();
        self.store.transaction(|conn| {
            let id = store::find_game_id_by_code(conn, &code)?.ok_or(ApiError::NotFound("Game not found"))?;
            load_game(conn, id)
        })
    }

    /// Move a waiting game with at least two players into play.
    pub fn start_game(&self, id: Uuid) -> Result<GameRow, ApiError> {
        let game = self.store.transaction(|conn| {
            let mut game = load_game(conn, id)?;
            if game.players.len() < MIN_PLAYERS {
                return Err(ApiError::bad_request("Need at least 2 players to start"));
            }
            if game.status != GameStatus::Waiting {
                return Err(ApiError::bad_request("Game has already started"));
            }
            game.status = GameStatus::InProgress;
            game.current_player_index = 0;
            store::update_game(conn, &game)?;
            Ok(game)
        })?;
        info!(game = %game.id, players = game.players.len(), "game started");
        Ok(game)
    }

    /// Roll for the current player and list the moves the roll allows.
    ///
    /// The roll stays pending until a move uses it or the turn is skipped.
    pub fn roll_dice(&self, game_id: Uuid, player_id: Uuid) -> Result<(GameRow, RollResponse), ApiError> {
        self.store.transaction(|conn| {
            let mut game = load_game(conn, game_id)?;
            let player = current_mover(&game, player_id)?;
            if game.last_roll.is_some() {
                return Err(ApiError::bad_request("Dice already rolled this turn"));
            }

            let value = self.dice.roll();
            let board = game.board();
            let valid_moves = enumerate_moves(&player.pieces, value, player.color, Some(&board), self.rules);

            game.last_roll = Some(value);
            store::update_game(conn, &game)?;

            info!(game = %game.id, color = %player.color, value, moves = valid_moves.len(), "dice rolled");
            let response = RollResponse {
                value,
                can_move: !valid_moves.is_empty(),
                valid_moves,
            };
            Ok((game, response))
        })
    }

    /// Apply one move for the current player using the pending roll.
    ///
    /// Sends a captured piece home, records the move, and either finishes
    /// the game or passes the turn (a 6 keeps it).
    pub fn make_move(
        &self,
        game_id: Uuid,
        player_id: Uuid,
        piece_index: i64,
        dice_value: i64,
    ) -> Result<(GameRow, MoveResponse), ApiError> {
        let piece_index = check_piece_index(piece_index)?;
        let dice = check_die(dice_value)?;

        self.store.transaction(|conn| {
            let mut game = load_game(conn, game_id)?;
            let mover = current_mover(&game, player_id)?;
            match game.last_roll {
                None => return Err(ApiError::bad_request("Roll the dice before moving")),
                Some(rolled) if rolled != dice => {
                    return Err(ApiError::bad_request("Dice value does not match the roll"))
                }
                Some(_) => {}
            }

            let board = game.board();
            let from = mover.pieces[piece_index];
            let to = can_move(from, dice, mover.color, &mover.pieces, Some(&board), self.rules)
                .ok_or_else(|| ApiError::bad_request("Invalid move"))?;
            let mov = Move {
                piece_index,
                from_position: from,
                to_position: to,
            };

            if !enumerate_moves(&mover.pieces, dice, mover.color, Some(&board), self.rules).contains(&mov) {
                error!(game = %game.id, color = %mover.color, ?mov, dice, "move checker and enumerator disagree");
                return Err(ApiError::Internal("move checker and enumerator disagree".into()));
            }

            let mut captured = None;
            if let Some(capture) = resolve_capture(to, mover.color, &board, self.rules) {
                let victim = game
                    .player_by_color(capture.color)
                    .ok_or_else(|| ApiError::Internal(format!("capture of unseated color {}", capture.color)))?;
                store::update_pieces(conn, victim.id, &victim.pieces.send_home(capture.piece_index))?;
                info!(game = %game.id, by = %mover.color, victim = %capture.color, piece = capture.piece_index, "piece captured");
                captured = Some((victim.id, capture.piece_index));
            }

            let pieces = mover.pieces.with_move(&mov);
            store::update_pieces(conn, mover.id, &pieces)?;
            store::insert_move(
                conn,
                game.id,
                &MoveRow {
                    id: Uuid::new_v4(),
                    player_id: mover.id,
                    dice_value: dice,
                    piece_index,
                    from_position: from,
                    to_position: to,
                    captured_player_id: captured.map(|(id, _)| id),
                    captured_piece_index: captured.map(|(_, idx)| idx),
                    created_at: String::new(),
                },
            )?;

            game.last_roll = None;
            let message = if has_won(&pieces) {
                game.status = GameStatus::Finished;
                game.winner_id = Some(mover.id);
                info!(game = %game.id, color = %mover.color, "game won");
                format!("{} wins!", mover.name)
            } else {
                if dice != ENTRY_ROLL {
                    game.advance_turn();
                }
                "Move successful".to_string()
            };
            store::update_game(conn, &game)?;

            let response = MoveResponse {
                success: true,
                new_position: to,
                captured: captured.is_some(),
                captured_player_id: captured.map(|(id, _)| id),
                winner_id: game.winner_id,
                message,
            };
            Ok((load_game(conn, game.id)?, response))
        })
    }

    /// Pass the turn on, e.g. after a roll with no legal move.
    pub fn skip_turn(&self, game_id: Uuid, player_id: Uuid) -> Result<GameRow, ApiError> {
        self.store.transaction(|conn| {
            let mut game = load_game(conn, game_id)?;
            let player = current_mover(&game, player_id)?;
            game.last_roll = None;
            game.advance_turn();
            store::update_game(conn, &game)?;
            info!(game = %game.id, color = %player.color, "turn skipped");
            Ok(game)
        })
    }

    /// Move log of a game, oldest first.
    pub fn list_moves(&self, game_id: Uuid) -> Result<Vec<MoveRow>, ApiError> {
        self.store.transaction(|conn| {
            load_game(conn, game_id)?;
            Ok(store::list_moves(conn, game_id)?)
        })
    }
}
