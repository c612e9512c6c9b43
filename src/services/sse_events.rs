use serde::Serialize;
use tracing::warn;

use crate::{
    dto::sse::{MatchCreatedEvent, MatchEndedEvent, QueueSizeEvent, ServerEvent, SystemStatus},
    state::{
        SharedState,
        participant::{MatchId, PlayerId},
        result::MatchResult,
    },
};

const EVENT_MATCH_CREATED: &str = "match.created";
const EVENT_MATCH_FINISHED: &str = "match.finished";
const EVENT_MATCH_ABANDONED: &str = "match.abandoned";
const EVENT_QUEUE_SIZE: &str = "queue.size";
const EVENT_SYSTEM_STATUS: &str = "system.status";

/// Broadcast that a room was opened.
pub fn broadcast_match_created(state: &SharedState, match_id: &MatchId, players: Vec<PlayerId>) {
    let payload = MatchCreatedEvent {
        match_id: match_id.clone(),
        players,
    };
    send_public_event(state, EVENT_MATCH_CREATED, &payload);
}

/// Broadcast the end of a match to lobby subscribers.
pub fn broadcast_match_ended(state: &SharedState, result: &MatchResult) {
    let event = if result.reason.is_some() {
        EVENT_MATCH_ABANDONED
    } else {
        EVENT_MATCH_FINISHED
    };
    let payload = MatchEndedEvent {
        match_id: result.match_id.clone(),
        phase: result.phase,
        winner_id: result.winner.clone(),
        reason: result.reason,
    };
    send_public_event(state, event, &payload);
}

/// Broadcast the current queue size.
pub fn broadcast_queue_size(state: &SharedState, size: usize) {
    send_public_event(state, EVENT_QUEUE_SIZE, &QueueSizeEvent { size });
}

/// Broadcast a degraded-mode change.
pub fn broadcast_system_status(state: &SharedState, degraded: bool) {
    send_public_event(state, EVENT_SYSTEM_STATUS, &SystemStatus { degraded });
}

fn send_public_event(state: &SharedState, event: &str, payload: &impl Serialize) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => state.public_sse().broadcast(event),
        Err(err) => warn!(event, error = %err, "failed to serialize public SSE payload"),
    }
}
