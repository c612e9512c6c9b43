use std::time::SystemTime;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};
use validator::Validate;

use crate::{
    dto::{
        format_system_time,
        ws::{ClientMessage, ParticipantInput, ServerMessage},
    },
    error::MatchError,
    services::{match_service, matchmaking_service},
    state::{
        SharedState,
        participant::{ConnectionId, Participant},
    },
};

/// Handle the full lifecycle of one match WebSocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<ServerMessage>();
    let connection = ConnectionId::new();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            let payload = match serde_json::to_string(&message) {
                Ok(payload) => payload,
                Err(err) => {
                    warn!(error = %err, "failed to serialize message `{message:?}`");
                    continue;
                }
            };
            if sender.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
    });

    state.connections().register(connection, outbound_tx);
    state.connections().send(
        connection,
        ServerMessage::Connected {
            connection_id: connection,
            server_time: format_system_time(SystemTime::now()),
        },
    );
    info!(%connection, "client connected");

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                debug!(%connection, payload = %text.as_str(), "received client message");
                if let Err(err) = dispatch(&state, connection, text.as_str()).await {
                    debug!(%connection, code = err.code(), error = %err, "request rejected");
                    state
                        .connections()
                        .send(connection, ServerMessage::error(err.code(), err.to_string()));
                }
            }
            Ok(Message::Close(_)) => {
                info!(%connection, "client closed");
                break;
            }
            Ok(Message::Binary(_)) => {
                let err = MatchError::InvalidMessage("binary frames are not supported".into());
                state
                    .connections()
                    .send(connection, ServerMessage::error(err.code(), err.to_string()));
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(%connection, error = %err, "websocket error");
                break;
            }
        }
    }

    match_service::connection_closed(&state, connection).await;
    info!(%connection, "client disconnected");

    finalize(writer_task).await;
}

/// Route one inbound text frame to the queue or the bound room.
async fn dispatch(state: &SharedState, connection: ConnectionId, text: &str) -> Result<(), MatchError> {
    let message: ClientMessage =
        serde_json::from_str(text).map_err(|err| MatchError::InvalidMessage(err.to_string()))?;

    match message {
        ClientMessage::FindMatch { player } => {
            let participant = validated(player)?;
            matchmaking_service::find_match(state, connection, participant).await
        }
        ClientMessage::CancelMatchmaking => {
            matchmaking_service::cancel(state, connection).await;
            Ok(())
        }
        ClientMessage::JoinMatch { match_id, player } => {
            let participant = validated(player)?;
            match_service::join_match(state, connection, match_id, participant).await
        }
        ClientMessage::PlayerReady { match_id } => {
            match_service::player_ready(state, connection, &match_id).await
        }
        ClientMessage::SubmitAnswer {
            match_id,
            question_index,
            choice,
            elapsed_ms,
        } => {
            match_service::submit_answer(state, connection, &match_id, question_index, choice, elapsed_ms)
                .await
        }
        ClientMessage::LeaveMatch { match_id } => {
            match_service::leave_match(state, connection, &match_id).await
        }
        ClientMessage::ReconnectMatch { match_id, player } => {
            let participant = player.map(validated).transpose()?;
            match_service::reconnect_match(state, connection, match_id, participant).await
        }
        ClientMessage::Ping => {
            state.connections().send(connection, ServerMessage::Pong);
            Ok(())
        }
    }
}

fn validated(input: ParticipantInput) -> Result<Participant, MatchError> {
    input
        .validate()
        .map_err(|err| MatchError::InvalidMessage(format!("invalid player: {err}")))?;
    Ok(Participant::from(input))
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>) {
    if let Err(err) = writer_task.await {
        debug!(error = %err, "writer task ended abnormally");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_players_are_rejected_before_reaching_the_queue() {
        let input = ParticipantInput {
            player_id: "has spaces".into(),
            name: "Mia".into(),
            rating: 0,
            grade: 3,
            league: None,
            win_streak: 0,
        };
        let err = validated(input).unwrap_err();
        assert_eq!(err.code(), "invalid_message");
    }
}
