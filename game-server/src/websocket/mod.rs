use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{error, info, warn};
use warp::ws::{Message, WebSocket};

use crate::game_manager::GameManager;
use game_types::{ClientMessage, ErrorKind, ServerMessage};

pub mod connection;
pub mod handlers;
pub mod rate_limiter;


use connection::ConnectionId;
pub use connection::ConnectionManager;
use handlers::MessageHandler;
use rate_limiter::RateLimiter;

/// A single inbound frame, classified
#[derive(Debug)]
enum Inbound {
    Client(ClientMessage),
    Malformed(String),
    Close,
    /// Pings, pongs and binary payloads
    Ignored,
}

fn decode_frame(frame: &Message) -> Inbound {
    if frame.is_close() {
        return Inbound::Close;
    }
    let Ok(text) = frame.to_str() else {
        return Inbound::Ignored;
    };
    match serde_json::from_str(text) {
        Ok(message) => Inbound::Client(message),
        Err(e) => Inbound::Malformed(format!("Invalid JSON message: {}", e)),
    }
}

fn encode_frame(message: &ServerMessage) -> serde_json::Result<Message> {
    serde_json::to_string(message).map(Message::text)
}

/// Serves one socket until either direction stops
pub async fn handle_connection(
    websocket: WebSocket,
    connection_manager: Arc<ConnectionManager>,
    game_manager: Arc<GameManager>,
) {
    let connection_id = ConnectionId::new();
    info!("New WebSocket connection: {}", connection_id);

    let outbox = connection_manager.create_connection(connection_id).await;
    let handler = MessageHandler::new(connection_id, connection_manager, game_manager);
    let (sink, frames) = websocket.split();

    tokio::select! {
        _ = read_frames(frames, &handler, connection_id) => {},
        _ = write_frames(sink, outbox, connection_id) => {},
    }

    info!("Connection {} disconnected", connection_id);
    handler.handle_disconnect().await;
}

async fn read_frames(
    mut frames: SplitStream<WebSocket>,
    handler: &MessageHandler,
    connection_id: ConnectionId,
) {
    let mut limiter = RateLimiter::new();

    while let Some(frame) = frames.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                warn!("WebSocket error for {}: {}", connection_id, e);
                return;
            }
        };

        // Bad input gets an Error reply, only a failed reply drops the socket
        let outcome = match decode_frame(&frame) {
            Inbound::Close => return,
            Inbound::Ignored => continue,
            _ if !limiter.check_rate_limit() => {
                warn!("Rate limit exceeded for connection {}", connection_id);
                handler
                    .send_error(ErrorKind::BadRequest, "Rate limit exceeded")
                    .await
            }
            Inbound::Malformed(reason) => handler.send_error(ErrorKind::BadRequest, &reason).await,
            Inbound::Client(message) => handler.handle_message(message).await,
        };

        if let Err(e) = outcome {
            error!("Error handling message for {}: {}", connection_id, e);
            return;
        }
    }
}

async fn write_frames(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbox: UnboundedReceiver<ServerMessage>,
    connection_id: ConnectionId,
) {
    while let Some(message) = outbox.recv().await {
        let frame = match encode_frame(&message) {
            Ok(frame) => frame,
            Err(e) => {
                error!("Failed to serialize message for {}: {:?}", connection_id, e);
                continue;
            }
        };

        if let Err(e) = sink.send(frame).await {
            warn!("Failed to send message to {}: {:?}", connection_id, e);
            return;
        }
    }
}
