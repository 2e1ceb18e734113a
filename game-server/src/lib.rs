use std::sync::Arc;
use warp::Filter;
use warp::http::StatusCode;

use crate::game_manager::{GameManager, GameManagerSettings};
use crate::websocket::ConnectionManager;
use game_core::{EngineError, GameEventBus, SessionStore};
use game_types::ErrorKind;

pub mod config;
pub mod game_manager;
pub mod scheduler;
pub mod websocket;

/// Wire a room service whose events fan out to the connected clients
pub fn create_game_manager(
    store: Arc<dyn SessionStore>,
    connection_manager: Arc<ConnectionManager>,
    settings: GameManagerSettings,
) -> Arc<GameManager> {
    let mut events = GameEventBus::new();
    events.add_handler(connection_manager);
    Arc::new(GameManager::new(store, events, settings))
}

pub fn create_routes(
    connection_manager: Arc<ConnectionManager>,
    game_manager: Arc<GameManager>,
    enable_debug_routes: bool,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let connection_manager_filter = warp::any().map({
        let connection_manager = connection_manager.clone();
        move || connection_manager.clone()
    });

    let game_manager_filter = warp::any().map({
        let game_manager = game_manager.clone();
        move || game_manager.clone()
    });

    // WebSocket endpoint
    let websocket = warp::path("ws")
        .and(warp::ws())
        .and(connection_manager_filter.clone())
        .and(game_manager_filter.clone())
        .map(|ws: warp::ws::Ws, conn_mgr, game_mgr| {
            ws.on_upgrade(move |socket| websocket::handle_connection(socket, conn_mgr, game_mgr))
        });

    // Health check endpoint
    let health = warp::path("health")
        .and(warp::get())
        .map(|| warp::reply::with_status("OK", StatusCode::OK));

    // Room snapshot, e.g. for a client restoring after a reload
    let game_state = warp::path!("game" / String / "state")
        .and(warp::get())
        .and(game_manager_filter.clone())
        .and_then(handle_game_state_request);

    let debug_enabled = warp::any()
        .and_then(move || async move {
            if enable_debug_routes {
                Ok(())
            } else {
                Err(warp::reject::not_found())
            }
        })
        .untuple_one();

    let debug_rooms = warp::path!("debug" / "rooms")
        .and(warp::get())
        .and(debug_enabled.clone())
        .and(game_manager_filter.clone())
        .and_then(handle_list_rooms);

    let debug_jobs = warp::path!("debug" / "jobs")
        .and(warp::get())
        .and(debug_enabled.clone())
        .and(game_manager_filter.clone())
        .map(|game_manager: Arc<GameManager>| {
            warp::reply::json(&game_manager.pending_jobs())
        });

    let debug_flush = warp::path!("debug" / "flush")
        .and(warp::post())
        .and(debug_enabled)
        .and(game_manager_filter.clone())
        .and_then(handle_flush);

    // CORS configuration
    let cors = warp::cors()
        .allow_any_origin()
        .allow_headers(vec!["content-type"])
        .allow_methods(vec!["GET", "POST"]);

    websocket
        .or(health)
        .or(game_state)
        .or(debug_rooms)
        .or(debug_jobs)
        .or(debug_flush)
        .with(cors)
        .with(warp::log("stop_the_bus"))
}

fn error_reply(e: &EngineError) -> warp::reply::WithStatus<warp::reply::Json> {
    let status = match e.kind() {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::ValidationFailure | ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
        ErrorKind::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::CONFLICT,
    };
    warp::reply::with_status(
        warp::reply::json(&serde_json::json!({
            "kind": e.kind(),
            "error": e.to_string(),
        })),
        status,
    )
}

async fn handle_game_state_request(
    game_id: String,
    game_manager: Arc<GameManager>,
) -> Result<impl warp::Reply, warp::Rejection> {
    match game_manager.get_room(&game_id).await {
        Ok(room) => Ok(warp::reply::with_status(
            warp::reply::json(&room),
            StatusCode::OK,
        )),
        Err(e) => Ok(error_reply(&e)),
    }
}

async fn handle_list_rooms(
    game_manager: Arc<GameManager>,
) -> Result<impl warp::Reply, warp::Rejection> {
    match game_manager.list_rooms().await {
        Ok(rooms) => Ok(warp::reply::with_status(
            warp::reply::json(&rooms),
            StatusCode::OK,
        )),
        Err(e) => {
            tracing::error!("Failed to list rooms: {}", e);
            Ok(error_reply(&e))
        }
    }
}

async fn handle_flush(game_manager: Arc<GameManager>) -> Result<impl warp::Reply, warp::Rejection> {
    match game_manager.flush_all().await {
        Ok(()) => Ok(warp::reply::with_status(
            warp::reply::json(&serde_json::json!({ "flushed": true })),
            StatusCode::OK,
        )),
        Err(e) => {
            tracing::error!("Failed to flush session state: {}", e);
            Ok(error_reply(&e))
        }
    }
}
