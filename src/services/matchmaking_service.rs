//! Queue operations driven by client events, plus the sweeper that evicts
//! players who waited too long.
//!
//! The queue lock is never held while a room lock is taken.

use std::time::Duration;

use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::{
    dto::{match_view::PlayerView, ws::ServerMessage},
    error::MatchError,
    services::{match_service, sse_events},
    state::{
        SharedState,
        matchmaking::{Enqueued, MatchPairing, QueueEntry},
        participant::{ConnectionId, Participant, Seat},
        room::MatchRoom,
    },
};

/// Enter the queue, pairing immediately when a compatible opponent waits.
pub async fn find_match(
    state: &SharedState,
    connection: ConnectionId,
    participant: Participant,
) -> Result<(), MatchError> {
    if let Some(match_id) = state.matches().active_match_of(&participant.id) {
        debug!(player_id = %participant.id, %match_id, "player already holds a live match");
        return Err(MatchError::AlreadyInMatch);
    }
    state.connections().identify(connection, participant.clone());

    let entry = QueueEntry {
        participant,
        connection,
        joined_at: Instant::now(),
    };
    let player_id = entry.participant.id.clone();
    let (enqueued, size) = {
        let mut queue = state.queue().lock().await;
        let enqueued = queue.enqueue(entry);
        (enqueued, queue.len())
    };
    sse_events::broadcast_queue_size(state, size);

    match enqueued {
        Enqueued::Waiting { position } => {
            info!(%player_id, position, "player queued");
            state
                .connections()
                .send(connection, ServerMessage::Queued { position });
        }
        Enqueued::Paired(pairing) => open_pairing(state, pairing).await,
    }
    Ok(())
}

/// Leave the queue. Always acknowledged, even when the player was not waiting.
pub async fn cancel(state: &SharedState, connection: ConnectionId) {
    let removed = {
        let mut queue = state.queue().lock().await;
        queue.remove_connection(connection).map(|_| queue.len())
    };
    if let Some(size) = removed {
        debug!(%connection, "matchmaking cancelled");
        sse_events::broadcast_queue_size(state, size);
    }
    state
        .connections()
        .send(connection, ServerMessage::MatchmakingCancelled);
}

/// Create the room for a pairing, reserve both seats and tell both players.
async fn open_pairing(state: &SharedState, pairing: MatchPairing) {
    let MatchPairing { match_id, seats } = pairing;
    let players = [
        seats[0].participant.clone(),
        seats[1].participant.clone(),
    ];
    let room = MatchRoom::paired(
        match_id.clone(),
        state.config().match_settings.clone(),
        players,
    );
    let handle = state.matches().insert(room);

    match_service::with_room(state, &handle, |room| {
        for participant in room.participants() {
            state
                .matches()
                .claim(participant.id.clone(), match_id.clone());
        }
    })
    .await;

    for (seat, entry) in Seat::ALL.into_iter().zip(&seats) {
        let opponent = &seats[seat.other().index()];
        state.connections().send(
            entry.connection,
            ServerMessage::MatchFound {
                match_id: match_id.clone(),
                seat,
                opponent: PlayerView::pending(&opponent.participant, seat.other()),
            },
        );
    }

    info!(
        %match_id,
        one = %seats[0].participant.id,
        two = %seats[1].participant.id,
        "players paired"
    );
    sse_events::broadcast_match_created(
        state,
        &match_id,
        seats
            .iter()
            .map(|entry| entry.participant.id.clone())
            .collect(),
    );
}

/// Evict players that waited longer than the configured limit, until the task is aborted.
pub async fn run_queue_sweeper(state: SharedState) {
    let settings = state.config().matchmaking.clone();
    let mut ticks = time::interval(settings.sweep_interval);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticks.tick().await;
        sweep_queue(&state, settings.max_queue_wait).await;
    }
}

async fn sweep_queue(state: &SharedState, max_wait: Duration) {
    let (evicted, size) = {
        let mut queue = state.queue().lock().await;
        let evicted = queue.evict_stale(Instant::now(), max_wait);
        (evicted, queue.len())
    };
    if evicted.is_empty() {
        return;
    }
    for entry in &evicted {
        info!(player_id = %entry.participant.id, "matchmaking timed out");
        state
            .connections()
            .send(entry.connection, ServerMessage::MatchmakingTimeout);
    }
    sse_events::broadcast_queue_size(state, size);
}
