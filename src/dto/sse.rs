use serde::Serialize;
use utoipa::ToSchema;

use crate::state::{
    participant::{MatchId, PlayerId},
    room::{AbandonReason, MatchPhase},
};

#[derive(Clone, Debug)]
/// Dispatched payload carried across SSE channels.
pub struct ServerEvent {
    pub event: Option<String>,
    pub data: String,
}

impl ServerEvent {
    /// Build an event from an already serialised payload.
    pub fn new(event: Option<String>, data: String) -> Self {
        Self { event, data }
    }

    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Initial metadata sent to an SSE client when it connects.
pub struct Handshake {
    /// Identifier of the SSE stream.
    pub stream: String,
    /// Human-readable message confirming the subscription.
    pub message: String,
    /// Whether the backend is running without a storage backend connection.
    pub degraded: bool,
    /// Rooms alive when the client subscribed.
    pub live_matches: usize,
    /// Players waiting in the queue when the client subscribed.
    pub queue_size: usize,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when the backend enters or leaves degraded mode.
pub struct SystemStatus {
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when a room is opened, by pairing or by a direct join.
pub struct MatchCreatedEvent {
    pub match_id: MatchId,
    pub players: Vec<PlayerId>,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when a room reaches a terminal phase.
pub struct MatchEndedEvent {
    pub match_id: MatchId,
    pub phase: MatchPhase,
    pub winner_id: Option<PlayerId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<AbandonReason>,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast whenever the matchmaking queue changes size.
pub struct QueueSizeEvent {
    pub size: usize,
}
