//! SQLite persistence for games, players and the move log.
//!
//! One connection behind a mutex. Every game operation runs inside a single
//! transaction while holding the lock, so a move and the capture it causes
//! commit together and no two mutations of one game interleave.

use std::path::Path;
use std::sync::Mutex;

use madn_core::{Board, Color, PieceSet, Position};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, Type, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS games (
    id                   TEXT PRIMARY KEY,
    code                 TEXT NOT NULL UNIQUE,
    status               TEXT NOT NULL DEFAULT 'waiting',
    current_player_index INTEGER NOT NULL DEFAULT 0,
    winner_id            TEXT,
    last_roll            INTEGER,
    created_at           TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
    updated_at           TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
);

CREATE TABLE IF NOT EXISTS players (
    id           TEXT PRIMARY KEY,
    game_id      TEXT NOT NULL REFERENCES games(id),
    name         TEXT NOT NULL,
    color        TEXT NOT NULL,
    pieces       TEXT NOT NULL,
    turn_order   INTEGER NOT NULL,
    is_connected INTEGER NOT NULL DEFAULT 1,
    created_at   TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
    UNIQUE (game_id, color)
);

CREATE TABLE IF NOT EXISTS moves (
    id                   TEXT PRIMARY KEY,
    game_id              TEXT NOT NULL REFERENCES games(id),
    player_id            TEXT NOT NULL REFERENCES players(id),
    dice_value           INTEGER NOT NULL,
    piece_index          INTEGER NOT NULL,
    from_position        INTEGER NOT NULL,
    to_position          INTEGER NOT NULL,
    captured_player_id   TEXT REFERENCES players(id),
    captured_piece_index INTEGER,
    created_at           TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
);

CREATE INDEX IF NOT EXISTS idx_players_game ON players(game_id);
CREATE INDEX IF NOT EXISTS idx_moves_game ON moves(game_id);
";

// =============================================================================
// Rows
// =============================================================================

/// Game lifecycle: waiting for players, in progress, finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    Waiting,
    InProgress,
    Finished,
}

impl GameStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            GameStatus::Waiting => "waiting",
            GameStatus::InProgress => "in_progress",
            GameStatus::Finished => "finished",
        }
    }

    fn parse(s: &str) -> Option<GameStatus> {
        match s {
            "waiting" => Some(GameStatus::Waiting),
            "in_progress" => Some(GameStatus::InProgress),
            "finished" => Some(GameStatus::Finished),
            _ => None,
        }
    }
}

impl ToSql for GameStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for GameStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        GameStatus::parse(s).ok_or(FromSqlError::InvalidType)
    }
}

/// A seated player and their four pieces.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerRow {
    pub id: Uuid,
    pub name: String,
    pub color: Color,
    pub pieces: PieceSet,
    pub order: usize,
    pub is_connected: bool,
}

/// A game with its players in turn order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GameRow {
    pub id: Uuid,
    pub code: String,
    pub status: GameStatus,
    pub current_player_index: usize,
    pub winner_id: Option<Uuid>,
    /// Die value rolled by the current player and not yet used.
    pub last_roll: Option<u8>,
    pub players: Vec<PlayerRow>,
    pub created_at: String,
}

impl GameRow {
    /// Player whose turn it is.
    pub fn current_player(&self) -> Option<&PlayerRow> {
        self.players.get(self.current_player_index)
    }

    pub fn player_by_color(&self, color: Color) -> Option<&PlayerRow> {
        self.players.iter().find(|p| p.color == color)
    }

    /// Rules snapshot of every seated player's pieces.
    pub fn board(&self) -> Board {
        let mut board = Board::new();
        for player in &self.players {
            board.set(player.color, player.pieces);
        }
        board
    }

    /// Pass the turn to the next seated player.
    pub fn advance_turn(&mut self) {
        if !self.players.is_empty() {
            self.current_player_index = (self.current_player_index + 1) % self.players.len();
        }
    }
}

/// One entry of a game's move log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MoveRow {
    pub id: Uuid,
    pub player_id: Uuid,
    pub dice_value: u8,
    pub piece_index: usize,
    pub from_position: Position,
    pub to_position: Position,
    pub captured_player_id: Option<Uuid>,
    pub captured_piece_index: Option<usize>,
    pub created_at: String,
}

// =============================================================================
// Column helpers
// =============================================================================

fn uuid_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let text: String = row.get(idx)?;
    Uuid::parse_str(&text).map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn opt_uuid_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|t| {
        Uuid::parse_str(&t).map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

fn color_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Color> {
    let text: String = row.get(idx)?;
    text.parse()
        .map_err(|e: madn_core::Error| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn pieces_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<PieceSet> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text).map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn position_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Position> {
    let value: i64 = row.get(idx)?;
    Position::try_from(value)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, Box::new(e)))
}

fn pieces_json(pieces: &PieceSet) -> rusqlite::Result<String> {
    serde_json::to_string(pieces).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}

// =============================================================================
// Store
// =============================================================================

/// SQLite-backed game store.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the database file and apply the schema.
    pub fn open(path: &Path) -> Result<Self, rusqlite::Error> {
        let conn = if path == Path::new(":memory:") {
            Connection::open_in_memory()?
        } else {
            Connection::open(path)?
        };
        Self::init(conn)
    }

    /// Fresh private in-memory database.
    pub fn open_in_memory() -> Result<Self, rusqlite::Error> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, rusqlite::Error> {
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Store {
            conn: Mutex::new(conn),
        })
    }

    /// Run `f` inside one transaction, committing only if it succeeds.
    pub fn transaction<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, ApiError>,
    ) -> Result<T, ApiError> {
        let mut conn = self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let tx = conn.transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }
}

// =============================================================================
// Queries
// =============================================================================

pub fn code_exists(conn: &Connection, code: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM games WHERE code = ?1)",
        [code],
        |row| row.get(0),
    )
}

pub fn insert_game(conn: &Connection, id: Uuid, code: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO games (id, code, status) VALUES (?1, ?2, ?3)",
        params![id.to_string(), code, GameStatus::Waiting],
    )?;
    Ok(())
}

pub fn insert_player(conn: &Connection, game_id: Uuid, player: &PlayerRow) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO players (id, game_id, name, color, pieces, turn_order, is_connected)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            player.id.to_string(),
            game_id.to_string(),
            player.name,
            player.color.as_str(),
            pieces_json(&player.pieces)?,
            player.order,
            player.is_connected,
        ],
    )?;
    Ok(())
}

/// Load a game and its players, in turn order.
pub fn find_game(conn: &Connection, id: Uuid) -> rusqlite::Result<Option<GameRow>> {
    let game = conn
        .query_row(
            "SELECT id, code, status, current_player_index, winner_id, last_roll, created_at
             FROM games WHERE id = ?1",
            [id.to_string()],
            |row| {
                Ok(GameRow {
                    id: uuid_col(row, 0)?,
                    code: row.get(1)?,
                    status: row.get(2)?,
                    current_player_index: row.get(3)?,
                    winner_id: opt_uuid_col(row, 4)?,
                    last_roll: row.get(5)?,
                    players: Vec::new(),
                    created_at: row.get(6)?,
                })
            },
        )
        .optional()?;

    let Some(mut game) = game else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT id, name, color, pieces, turn_order, is_connected
         FROM players WHERE game_id = ?1 ORDER BY turn_order",
    )?;
    game.players = stmt
        .query_map([id.to_string()], |row| {
            Ok(PlayerRow {
                id: uuid_col(row, 0)?,
                name: row.get(1)?,
                color: color_col(row, 2)?,
                pieces: pieces_col(row, 3)?,
                order: row.get(4)?,
                is_connected: row.get(5)?,
            })
        })?
        .collect::<rusqlite::Result<_>>()?;

    Ok(Some(game))
}

pub fn find_game_id_by_code(conn: &Connection, code: &str) -> rusqlite::Result<Option<Uuid>> {
    conn.query_row("SELECT id FROM games WHERE code = ?1", [code], |row| uuid_col(row, 0))
        .optional()
}

/// Persist the mutable game fields.
pub fn update_game(conn: &Connection, game: &GameRow) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE games
         SET status = ?2, current_player_index = ?3, winner_id = ?4, last_roll = ?5,
             updated_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')
         WHERE id = ?1",
        params![
            game.id.to_string(),
            game.status,
            game.current_player_index,
            game.winner_id.map(|id| id.to_string()),
            game.last_roll,
        ],
    )?;
    Ok(())
}

pub fn update_pieces(conn: &Connection, player_id: Uuid, pieces: &PieceSet) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE players SET pieces = ?2 WHERE id = ?1",
        params![player_id.to_string(), pieces_json(pieces)?],
    )?;
    Ok(())
}

pub fn insert_move(conn: &Connection, game_id: Uuid, mov: &MoveRow) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO moves (id, game_id, player_id, dice_value, piece_index, from_position,
                            to_position, captured_player_id, captured_piece_index)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            mov.id.to_string(),
            game_id.to_string(),
            mov.player_id.to_string(),
            mov.dice_value,
            mov.piece_index,
            mov.from_position.value(),
            mov.to_position.value(),
            mov.captured_player_id.map(|id| id.to_string()),
            mov.captured_piece_index,
        ],
    )?;
    Ok(())
}

/// Move log of a game, oldest first.
pub fn list_moves(conn: &Connection, game_id: Uuid) -> rusqlite::Result<Vec<MoveRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, player_id, dice_value, piece_index, from_position, to_position,
                captured_player_id, captured_piece_index, created_at
         FROM moves WHERE game_id = ?1 ORDER BY rowid",
    )?;
    let rows = stmt.query_map([game_id.to_string()], |row| {
        Ok(MoveRow {
            id: uuid_col(row, 0)?,
            player_id: uuid_col(row, 1)?,
            dice_value: row.get(2)?,
            piece_index: row.get(3)?,
            from_position: position_col(row, 4)?,
            to_position: position_col(row, 5)?,
            captured_player_id: opt_uuid_col(row, 6)?,
            captured_piece_index: row.get(7)?,
            created_at: row.get(8)?,
        })
    })?;
    let moves = rows.collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(moves)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(color: Color, order: usize) -> PlayerRow {
        PlayerRow {
            id: Uuid::new_v4(),
            name: format!("{} player", color),
            color,
            pieces: PieceSet::AT_HOME,
            order,
            is_connected: true,
        }
    }

    fn seeded_game(store: &Store) -> (Uuid, Vec<PlayerRow>) {
        let game_id = Uuid::new_v4();
        let players = vec![player(Color::Red, 0), player(Color::Blue, 1)];
        store
            .transaction(|conn| {
                insert_game(conn, game_id, "ABC123")?;
                for p in &players {
                    insert_player(conn, game_id, p)?;
                }
                Ok(())
            })
            .unwrap();
        (game_id, players)
    }

    #[test]
    fn test_game_roundtrip() {
        let store = Store::open_in_memory().unwrap();
        let (game_id, players) = seeded_game(&store);

        let game = store.transaction(|conn| Ok(find_game(conn, game_id)?)).unwrap().unwrap();
        assert_eq!(game.code, "ABC123");
        assert_eq!(game.status, GameStatus::Waiting);
        assert_eq!(game.current_player_index, 0);
        assert_eq!(game.last_roll, None);
        assert_eq!(game.players, players);
        assert!(!game.created_at.is_empty());
    }

    #[test]
    fn test_find_missing_game() {
        let store = Store::open_in_memory().unwrap();
        let found = store.transaction(|conn| Ok(find_game(conn, Uuid::new_v4())?)).unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn test_code_lookup() {
        let store = Store::open_in_memory().unwrap();
        let (game_id, _) = seeded_game(&store);
        store
            .transaction(|conn| {
                assert!(code_exists(conn, "ABC123")?);
                assert!(!code_exists(conn, "ZZZ999")?);
                assert_eq!(find_game_id_by_code(conn, "ABC123")?, Some(game_id));
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_update_game_and_pieces() {
        let store = Store::open_in_memory().unwrap();
        let (game_id, players) = seeded_game(&store);
        let pieces = PieceSet::from_values(&[0, 12, 41, -1]).unwrap();

        store
            .transaction(|conn| {
                let mut game = find_game(conn, game_id)?.unwrap();
                game.status = GameStatus::InProgress;
                game.current_player_index = 1;
                game.last_roll = Some(4);
                game.winner_id = Some(players[1].id);
                update_game(conn, &game)?;
                update_pieces(conn, players[1].id, &pieces)?;
                Ok(())
            })
            .unwrap();

        let game = store.transaction(|conn| Ok(find_game(conn, game_id)?)).unwrap().unwrap();
        assert_eq!(game.status, GameStatus::InProgress);
        assert_eq!(game.current_player_index, 1);
        assert_eq!(game.last_roll, Some(4));
        assert_eq!(game.winner_id, Some(players[1].id));
        assert_eq!(game.players[1].pieces, pieces);
        assert_eq!(game.players[0].pieces, PieceSet::AT_HOME);
    }

    #[test]
    fn test_failed_transaction_rolls_back() {
        let store = Store::open_in_memory().unwrap();
        let (game_id, players) = seeded_game(&store);
        let pieces = PieceSet::from_values(&[5, -1, -1, -1]).unwrap();

        let result: Result<(), ApiError> = store.transaction(|conn| {
            update_pieces(conn, players[0].id, &pieces)?;
            Err(ApiError::bad_request("abort"))
        });
        assert!(result.is_err());

        let game = store.transaction(|conn| Ok(find_game(conn, game_id)?)).unwrap().unwrap();
        assert_eq!(game.players[0].pieces, PieceSet::AT_HOME);
    }

    #[test]
    fn test_duplicate_color_rejected() {
        let store = Store::open_in_memory().unwrap();
        let (game_id, _) = seeded_game(&store);
        let result = store.transaction(|conn| Ok(insert_player(conn, game_id, &player(Color::Red, 2))?));
        assert!(result.is_err());
    }

    #[test]
    fn test_move_log_order() {
        let store = Store::open_in_memory().unwrap();
        let (game_id, players) = seeded_game(&store);
        let first = MoveRow {
            id: Uuid::new_v4(),
            player_id: players[0].id,
            dice_value: 6,
            piece_index: 0,
            from_position: Position::HOME,
            to_position: Position::START,
            captured_player_id: None,
            captured_piece_index: None,
            created_at: String::new(),
        };
        let second = MoveRow {
            id: Uuid::new_v4(),
            dice_value: 3,
            from_position: Position::START,
            to_position: Position::new(3).unwrap(),
            captured_player_id: Some(players[1].id),
            captured_piece_index: Some(2),
            ..first.clone()
        };

        store
            .transaction(|conn| {
                insert_move(conn, game_id, &first)?;
                insert_move(conn, game_id, &second)?;
                Ok(())
            })
            .unwrap();

        let log = store.transaction(|conn| Ok(list_moves(conn, game_id)?)).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].id, first.id);
        assert_eq!(log[0].to_position, Position::START);
        assert_eq!(log[1].captured_player_id, Some(players[1].id));
        assert_eq!(log[1].captured_piece_index, Some(2));
    }

    #[test]
    fn test_game_row_helpers() {
        let mut game = GameRow {
            id: Uuid::new_v4(),
            code: "XYZ789".into(),
            status: GameStatus::InProgress,
            current_player_index: 1,
            winner_id: None,
            last_roll: None,
            players: vec![player(Color::Red, 0), player(Color::Green, 1)],
            created_at: String::new(),
        };
        assert_eq!(game.current_player().map(|p| p.color), Some(Color::Green));
        game.advance_turn();
        assert_eq!(game.current_player().map(|p| p.color), Some(Color::Red));

        let board = game.board();
        assert!(board.get(Color::Green).is_some());
        assert!(board.get(Color::Blue).is_none());
        assert_eq!(game.player_by_color(Color::Red).map(|p| p.order), Some(0));
    }

    #[test]
    fn test_status_serde() {
        assert_eq!(serde_json::to_string(&GameStatus::InProgress).unwrap(), "\"in_progress\"");
        assert_eq!(GameStatus::parse("finished"), Some(GameStatus::Finished));
        assert_eq!(GameStatus::parse("paused"), None);
    }
}
