use std::sync::Arc;
use tracing::{error, info, warn};

use crate::game_manager::GameManager;
use crate::websocket::connection::{Connection, ConnectionId, ConnectionManager};
use game_core::{EngineError, EngineResult};
use game_types::{AnswerSet, ClientMessage, ErrorKind, GameSettings, ServerMessage};

#[derive(Clone)]
pub struct MessageHandler {
    connection_id: ConnectionId,
    connection_manager: Arc<ConnectionManager>,
    game_manager: Arc<GameManager>,
}

impl MessageHandler {
    pub fn new(
        connection_id: ConnectionId,
        connection_manager: Arc<ConnectionManager>,
        game_manager: Arc<GameManager>,
    ) -> Self {
        Self {
            connection_id,
            connection_manager,
            game_manager,
        }
    }

    /// Dispatch one client command. Engine failures are reported to the client
    /// as `Error` messages; only a dead connection is returned as an error.
    pub async fn handle_message(&self, message: ClientMessage) -> Result<(), String> {
        self.connection_manager
            .update_activity(self.connection_id)
            .await;

        let result = match message {
            ClientMessage::Identify { player_id } => self.handle_identify(player_id).await,
            ClientMessage::CreateGame { settings } => self.handle_create_game(settings).await,
            ClientMessage::JoinGame { game_id } => self.handle_join_game(game_id).await,
            ClientMessage::UpdateConfig { settings } => self.handle_update_config(settings).await,
            ClientMessage::UpdateNickname { name } => self.handle_update_nickname(name).await,
            ClientMessage::StartRound => self.handle_start_round().await,
            ClientMessage::CancelStart => self.handle_cancel_start().await,
            ClientMessage::SubmitAnswer {
                answers,
                category_index,
            } => self.handle_submit_answer(answers, category_index).await,
            ClientMessage::RetrieveAnswers => self.handle_retrieve_answers().await,
            ClientMessage::EndRound => self.handle_end_round().await,
            ClientMessage::VoteAnswer {
                player_id,
                category,
                accepted,
            } => self.handle_vote_answer(player_id, category, accepted).await,
            ClientMessage::EndGame => self.handle_end_game().await,
            ClientMessage::JoinNextGame => self.handle_join_next_game().await,
            ClientMessage::LeaveGame => self.handle_leave_game().await,
            ClientMessage::Heartbeat => Ok(()),
        };

        match result {
            Ok(()) => Ok(()),
            Err(e) => self.send_engine_error(e).await,
        }
    }

    pub async fn handle_disconnect(&self) {
        info!("Handling disconnect for connection {}", self.connection_id);

        if let Some(connection) = self
            .connection_manager
            .remove_connection(self.connection_id)
            .await
        {
            leave_room(&self.game_manager, &connection).await;
        }
    }

    async fn connection(&self) -> EngineResult<Connection> {
        self.connection_manager
            .get_connection(self.connection_id)
            .await
            .ok_or_else(|| EngineError::not_found("connection", self.connection_id.to_string()))
    }

    async fn current_player(&self) -> EngineResult<String> {
        self.connection()
            .await?
            .player_id
            .ok_or_else(|| EngineError::validation("identify before sending game commands"))
    }

    /// Player and room this connection is bound to
    async fn current_seat(&self) -> EngineResult<(String, String)> {
        let connection = self.connection().await?;
        let player_id = connection
            .player_id
            .ok_or_else(|| EngineError::validation("identify before sending game commands"))?;
        let game_id = connection
            .game_id
            .ok_or_else(|| EngineError::validation("join a game first"))?;
        Ok((player_id, game_id))
    }

    async fn handle_identify(&self, player_id: Option<String>) -> EngineResult<()> {
        let player = self.game_manager.identify(player_id.as_deref()).await?;
        self.connection_manager
            .set_connection_player(self.connection_id, player.id.clone())
            .await;
        info!(
            "Connection {} identified as player {}",
            self.connection_id, player.id
        );
        self.send(ServerMessage::Identified { player }).await
    }

    async fn handle_create_game(&self, settings: Option<GameSettings>) -> EngineResult<()> {
        let player_id = self.current_player().await?;
        self.leave_current_game().await;

        let room = self.game_manager.create_game(&player_id, settings).await?;
        self.connection_manager
            .set_connection_game(self.connection_id, Some(room.config.id.clone()))
            .await;
        self.send(ServerMessage::JoinedGame { room }).await
    }

    async fn handle_join_game(&self, game_id: String) -> EngineResult<()> {
        let player_id = self.current_player().await?;
        let connection = self.connection().await?;
        if connection.game_id.as_deref() != Some(game_id.as_str()) {
            self.leave_current_game().await;
        }

        // Bind first so the joiner also sees the roster broadcast
        self.connection_manager
            .set_connection_game(self.connection_id, Some(game_id.clone()))
            .await;
        match self.game_manager.join_game(&game_id, &player_id).await {
            Ok(room) => self.send(ServerMessage::JoinedGame { room }).await,
            Err(e) => {
                self.connection_manager
                    .set_connection_game(self.connection_id, None)
                    .await;
                Err(e)
            }
        }
    }

    async fn handle_update_config(&self, settings: GameSettings) -> EngineResult<()> {
        let (player_id, game_id) = self.current_seat().await?;
        self.game_manager
            .update_config(&game_id, &player_id, settings)
            .await?;
        Ok(())
    }

    async fn handle_update_nickname(&self, name: String) -> EngineResult<()> {
        let connection = self.connection().await?;
        let player_id = connection
            .player_id
            .ok_or_else(|| EngineError::validation("identify before renaming"))?;
        let player = self
            .game_manager
            .update_nickname(&player_id, &name, connection.game_id.as_deref())
            .await?;
        self.send(ServerMessage::Identified { player }).await
    }

    async fn handle_start_round(&self) -> EngineResult<()> {
        let (_, game_id) = self.current_seat().await?;
        self.game_manager.start_round(&game_id).await?;
        Ok(())
    }

    async fn handle_cancel_start(&self) -> EngineResult<()> {
        let (_, game_id) = self.current_seat().await?;
        self.game_manager.cancel_start(&game_id).await?;
        Ok(())
    }

    async fn handle_submit_answer(
        &self,
        answers: AnswerSet,
        category_index: Option<u32>,
    ) -> EngineResult<()> {
        let (player_id, game_id) = self.current_seat().await?;
        self.game_manager
            .submit_answer(&game_id, &player_id, answers, category_index)
            .await
    }

    async fn handle_retrieve_answers(&self) -> EngineResult<()> {
        let (player_id, game_id) = self.current_seat().await?;
        let answers = self
            .game_manager
            .retrieve_answers(&game_id, &player_id)
            .await?;
        self.send(ServerMessage::AnswersRetrieved { answers }).await
    }

    async fn handle_end_round(&self) -> EngineResult<()> {
        let (player_id, game_id) = self.current_seat().await?;
        self.game_manager
            .end_round(&game_id, Some(&player_id))
            .await?;
        Ok(())
    }

    async fn handle_vote_answer(
        &self,
        player_id: String,
        category: String,
        accepted: bool,
    ) -> EngineResult<()> {
        let (_, game_id) = self.current_seat().await?;
        self.game_manager
            .vote_answer(&game_id, &player_id, &category, accepted)
            .await?;
        Ok(())
    }

    async fn handle_end_game(&self) -> EngineResult<()> {
        let (_, game_id) = self.current_seat().await?;
        self.game_manager.end_game(&game_id).await?;
        Ok(())
    }

    async fn handle_join_next_game(&self) -> EngineResult<()> {
        let (player_id, game_id) = self.current_seat().await?;

        // The finished room keeps its roster; only this connection moves on
        let room = self
            .game_manager
            .join_next_game(&game_id, &player_id)
            .await?;
        self.connection_manager
            .set_connection_game(self.connection_id, Some(room.config.id.clone()))
            .await;
        self.send(ServerMessage::JoinedGame { room }).await
    }

    async fn handle_leave_game(&self) -> EngineResult<()> {
        let (player_id, game_id) = self.current_seat().await?;
        self.connection_manager
            .set_connection_game(self.connection_id, None)
            .await;
        self.game_manager.leave_game(&game_id, &player_id).await?;
        self.send(ServerMessage::GameLeft).await
    }

    async fn leave_current_game(&self) {
        if let Ok(connection) = self.connection().await {
            if connection.game_id.is_some() {
                self.connection_manager
                    .set_connection_game(self.connection_id, None)
                    .await;
                leave_room(&self.game_manager, &connection).await;
            }
        }
    }

    async fn send(&self, message: ServerMessage) -> EngineResult<()> {
        if let Err(e) = self.send_message(message).await {
            warn!("Could not reply to {}: {}", self.connection_id, e);
        }
        Ok(())
    }

    async fn send_message(&self, message: ServerMessage) -> Result<(), String> {
        self.connection_manager
            .send_to_connection(self.connection_id, message)
            .await
    }

    async fn send_engine_error(&self, e: EngineError) -> Result<(), String> {
        let kind = e.kind();
        match kind {
            ErrorKind::StoreUnavailable => {
                error!("Store failure for connection {}: {}", self.connection_id, e)
            }
            _ => warn!("Rejected command from {}: {}", self.connection_id, e),
        }
        self.send_message(ServerMessage::Error {
            kind,
            message: e.to_string(),
        })
        .await
    }

    pub async fn send_error(&self, kind: ErrorKind, message: &str) -> Result<(), String> {
        self.send_message(ServerMessage::Error {
            kind,
            message: message.to_string(),
        })
        .await
    }
}

/// Remove a departed connection's player from the room it was bound to
pub async fn leave_room(game_manager: &GameManager, connection: &Connection) {
    if let (Some(player_id), Some(game_id)) = (&connection.player_id, &connection.game_id) {
        if let Err(e) = game_manager.leave_game(game_id, player_id).await {
            warn!(
                "Could not remove player {} from game {}: {}",
                player_id, game_id, e
            );
        }
    }
}
