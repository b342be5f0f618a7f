//! "Man, Don't Get Angry" game server.
//!
//! REST endpoints for the lobby and turns, a websocket room per game for
//! live updates, SQLite for persistence. Move legality comes from
//! `madn-core`, the same crate the browser build uses to highlight moves.

mod config;
mod error;
mod game;
mod models;
mod rooms;
mod store;

use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::HeaderValue,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use madn_core::RuleSet;
use tokio::sync::broadcast::error::RecvError;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::config::Config;
use crate::error::ApiError;
use crate::game::{Games, RandomDice};
use crate::models::{
    CreateGameRequest, HealthModel, JoinGameRequest, MoveRequest, MoveResponse, RollRequest,
    RollResponse, RootModel, SkipTurnRequest, UpdateMessage,
};
use crate::rooms::Rooms;
use crate::store::{GameRow, MoveRow, Store};

// =============================================================================
// State
// =============================================================================

/// Shared application state
struct AppStateInner {
    games: Games,
    rooms: Rooms,
}

type AppState = Arc<AppStateInner>;

impl AppStateInner {
    /// Push the new game state to everyone watching it.
    fn publish_update(&self, game: &GameRow) {
        match serde_json::to_string(&UpdateMessage::game_update(game)) {
            Ok(message) => {
                self.rooms.publish(&game.code, message);
            }
            Err(e) => warn!(game = %game.id, error = %e, "failed to encode game update"),
        }
    }
}

// =============================================================================
// Handlers
// =============================================================================

async fn root() -> Json<RootModel> {
    Json(RootModel {
        message: "Man, Don't Get Angry API",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn health() -> Json<HealthModel> {
    Json(HealthModel { status: "ok" })
}

async fn create_game(
    State(state): State<AppState>,
    Json(req): Json<CreateGameRequest>,
) -> Result<Json<GameRow>, ApiError> {
    let game = state.games.create_game(&req.player_name)?;
    Ok(Json(game))
}

async fn join_game(
    State(state): State<AppState>,
    Json(req): Json<JoinGameRequest>,
) -> Result<Json<GameRow>, ApiError> {
    let game = state.games.join_game(&req.code, &req.player_name)?;
    state.publish_update(&game);
    Ok(Json(game))
}

async fn get_game(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<GameRow>, ApiError> {
    Ok(Json(state.games.get_game(id)?))
}

async fn get_game_by_code(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<GameRow>, ApiError> {
    Ok(Json(state.games.get_game_by_code(&code)?))
}

async fn start_game(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<GameRow>, ApiError> {
    let game = state.games.start_game(id)?;
    state.publish_update(&game);
    Ok(Json(game))
}

async fn roll_dice(
    State(state): State<AppState>,
    Json(req): Json<RollRequest>,
) -> Result<Json<RollResponse>, ApiError> {
    let (game, roll) = state.games.roll_dice(req.game_id, req.player_id)?;
    state.publish_update(&game);
    Ok(Json(roll))
}

async fn make_move(
    State(state): State<AppState>,
    Json(req): Json<MoveRequest>,
) -> Result<Json<MoveResponse>, ApiError> {
    let (game, response) =
        state
            .games
            .make_move(req.game_id, req.player_id, req.piece_index, req.dice_value)?;
    state.publish_update(&game);
    Ok(Json(response))
}

async fn skip_turn(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<SkipTurnRequest>,
) -> Result<Json<GameRow>, ApiError> {
    let game = state.games.skip_turn(id, req.player_id)?;
    state.publish_update(&game);
    Ok(Json(game))
}

async fn list_moves(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<MoveRow>>, ApiError> {
    Ok(Json(state.games.list_moves(id)?))
}

// =============================================================================
// Websocket
// =============================================================================

async fn room_socket(
    State(state): State<AppState>,
    Path(code): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    let code = code.trim().to_ascii_uppercase();
    ws.on_upgrade(move |socket| run_socket(socket, state, code))
}

/// Relay between one client and its game room until either side closes.
async fn run_socket(mut socket: WebSocket, state: AppState, code: String) {
    let mut rx = state.rooms.subscribe(&code);
    info!(%code, members = state.rooms.members(&code), "websocket joined room");

    loop {
        tokio::select! {
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    state.rooms.publish(&code, text.as_str().to_owned());
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            outgoing = rx.recv() => match outgoing {
                Ok(text) => {
                    if socket.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(%code, skipped, "websocket lagging, messages dropped");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    drop(rx);
    state.rooms.leave(&code);
    info!(%code, "websocket left room");
}

// =============================================================================
// Main
// =============================================================================

fn cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let origin = if config.allows_any_origin() {
        AllowOrigin::any()
    } else {
        let origins = config
            .cors_origins
            .iter()
            .map(|o| o.parse::<HeaderValue>())
            .collect::<Result<Vec<_>, _>>()
            .context("invalid CORS origin")?;
        AllowOrigin::list(origins)
    };
    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(Any)
        .allow_headers(Any))
}

fn router(state: AppState, cors: CorsLayer) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/games", post(create_game))
        .route("/api/games/join", post(join_game))
        .route("/api/games/roll-dice", post(roll_dice))
        .route("/api/games/move", post(make_move))
        .route("/api/games/code/{code}", get(get_game_by_code))
        .route("/api/games/{id}", get(get_game))
        .route("/api/games/{id}/start", post(start_game))
        .route("/api/games/{id}/skip-turn", post(skip_turn))
        .route("/api/games/{id}/moves", get(list_moves))
        .route("/ws/{code}", get(room_socket))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("madn_api=info,tower_http=info")),
        )
        .init();

    let config = Config::load().context("failed to load configuration")?;

    if let Some(dir) = config.database_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create database directory {}", dir.display()))?;
    }
    let store = Store::open(&config.database_path)
        .with_context(|| format!("failed to open database {}", config.database_path.display()))?;
    info!(path = %config.database_path.display(), "database ready");

    let state: AppState = Arc::new(AppStateInner {
        games: Games::new(store, Box::new(RandomDice), RuleSet::default()),
        rooms: Rooms::new(),
    });
    let app = router(state, cors_layer(&config)?);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "madn api listening");
    axum::serve(listener, app).await?;
    Ok(())
}
