//! JSON request and response bodies.
//!
//! Game and player rows from `store` serialize directly; this module holds
//! everything else that crosses the wire.

use madn_core::{Move, Position};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::GameRow;

#[derive(Deserialize)]
pub struct CreateGameRequest {
    pub player_name: String,
}

#[derive(Deserialize)]
pub struct JoinGameRequest {
    pub code: String,
    pub player_name: String,
}

#[derive(Deserialize)]
pub struct RollRequest {
    pub game_id: Uuid,
    pub player_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct RollResponse {
    pub value: u8,
    pub can_move: bool,
    pub valid_moves: Vec<Move>,
}

/// Piece index and die value arrive as plain integers and are range-checked
/// by the rules crate.
#[derive(Deserialize)]
pub struct MoveRequest {
    pub game_id: Uuid,
    pub player_id: Uuid,
    pub piece_index: i64,
    pub dice_value: i64,
}

#[derive(Debug, Serialize)]
pub struct MoveResponse {
    pub success: bool,
    pub new_position: Position,
    pub captured: bool,
    pub captured_player_id: Option<Uuid>,
    pub winner_id: Option<Uuid>,
    pub message: String,
}

#[derive(Deserialize)]
pub struct SkipTurnRequest {
    pub player_id: Uuid,
}

#[derive(Serialize)]
pub struct RootModel {
    pub message: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct HealthModel {
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct ErrorModel {
    pub detail: String,
}

/// Message pushed to every websocket in a game's room after a change.
#[derive(Serialize)]
pub struct UpdateMessage<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub data: &'a GameRow,
}

impl<'a> UpdateMessage<'a> {
    pub fn game_update(game: &'a GameRow) -> Self {
        UpdateMessage {
            kind: "game_update",
            data: game,
        }
    }
}
