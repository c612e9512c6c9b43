//! Thin adapter between client events and match rooms.
//!
//! Every operation locks the target room, applies one room operation and then
//! executes the effects the room recorded before the lock is released. All
//! effects are synchronous, so the order of messages always matches the order
//! in which the room applied the mutations that produced them.

use std::sync::Arc;

use tokio::time;
use tracing::{debug, info, instrument, warn};

use crate::{
    error::MatchError,
    services::{finalizer, phase_timers::RoomTimers, question_source, sse_events},
    state::{
        SharedState,
        participant::{ConnectionId, MatchId, Participant},
        question::{AnswerChoice, Question},
        registry::RoomHandle,
        room::{MatchRoom, RoomEffect, TimerToken},
    },
};

/// Run `operation` on the room behind `handle` and execute its effects under the same lock.
pub async fn with_room<T>(
    state: &SharedState,
    handle: &RoomHandle,
    operation: impl FnOnce(&mut MatchRoom) -> T,
) -> T {
    let mut guard = handle.lock().await;
    let live = &mut *guard;
    let output = operation(&mut live.room);
    let effects = live.room.drain_effects();
    execute_effects(state, live.room.match_id(), &mut live.timers, effects);
    output
}

fn execute_effects(
    state: &SharedState,
    match_id: &MatchId,
    timers: &mut RoomTimers,
    effects: Vec<RoomEffect>,
) {
    for effect in effects {
        match effect {
            RoomEffect::Send { to, message } => {
                for connection in to {
                    if !state.connections().send(connection, message.clone()) {
                        debug!(%match_id, %connection, "dropping message for closed connection");
                    }
                }
            }
            RoomEffect::Arm { token, schedule } => {
                timers.arm(state.clone(), match_id.clone(), token, schedule);
            }
            RoomEffect::Cancel(kind) => timers.cancel(kind),
            RoomEffect::FetchQuestions {
                grade,
                count,
                token,
            } => spawn_question_fetch(state, match_id, grade, count, token),
            RoomEffect::Finalize(outcome) => finalizer::finalize(state, outcome),
            RoomEffect::ScheduleCleanup(delay) => {
                timers.cancel_all();
                let state = state.clone();
                let match_id = match_id.clone();
                tokio::spawn(async move {
                    time::sleep(delay).await;
                    if state.matches().remove(&match_id).is_some() {
                        debug!(%match_id, "room removed after cooldown");
                    }
                });
            }
            RoomEffect::Dispose => {
                timers.cancel_all();
                state.matches().remove(match_id);
                info!(%match_id, "room expired before the match started");
            }
            RoomEffect::Release(player_id) => state.matches().release(&player_id, match_id),
            RoomEffect::Unbind(connection) => {
                let bound_here = state
                    .connections()
                    .binding(connection)
                    .is_some_and(|binding| binding.match_id.as_ref() == Some(match_id));
                if bound_here {
                    state.connections().unbind(connection);
                    debug!(%match_id, %connection, "superseded connection unbound");
                }
            }
        }
    }
}

fn spawn_question_fetch(
    state: &SharedState,
    match_id: &MatchId,
    grade: u8,
    count: usize,
    token: u64,
) {
    let state = state.clone();
    let match_id = match_id.clone();
    tokio::spawn(async move {
        let settings = &state.config().match_settings;
        let questions = question_source::load_questions(
            state.question_source(),
            grade,
            count,
            settings.min_question_count,
            state.config().content.fetch_timeout,
        )
        .await;
        questions_ready(&state, &match_id, token, questions).await;
    });
}

async fn questions_ready(
    state: &SharedState,
    match_id: &MatchId,
    token: u64,
    questions: Vec<Question>,
) {
    let Some(handle) = state.matches().get(match_id) else {
        debug!(%match_id, "questions loaded for a room that no longer exists");
        return;
    };
    let total = questions.len();
    let accepted = with_room(state, &handle, |room| room.questions_loaded(token, questions)).await;
    if accepted {
        info!(%match_id, total, "question sequence loaded");
    } else {
        debug!(%match_id, token, "ignoring stale question fetch");
    }
}

/// Deliver a timer firing to its room. Returns whether the timer should keep running.
pub async fn fire_timer(state: &SharedState, match_id: &MatchId, token: TimerToken) -> bool {
    let Some(handle) = state.matches().get(match_id) else {
        return false;
    };
    with_room(state, &handle, |room| room.on_timer(token)).await
}

/// Join (or create) the room `match_id` with the given identity.
#[instrument(skip(state, participant), fields(player_id = %participant.id))]
pub async fn join_match(
    state: &SharedState,
    connection: ConnectionId,
    match_id: MatchId,
    participant: Participant,
) -> Result<(), MatchError> {
    if let Some(active) = state.matches().active_match_of(&participant.id) {
        if active != match_id {
            return Err(MatchError::AlreadyInMatch);
        }
    }
    let dequeued = {
        let mut queue = state.queue().lock().await;
        queue.dequeue(&participant.id).map(|_| queue.len())
    };
    if let Some(size) = dequeued {
        sse_events::broadcast_queue_size(state, size);
    }

    let (handle, created) = state
        .matches()
        .get_or_create(&match_id, &state.config().match_settings);
    if created {
        info!(%match_id, "room created by direct join");
        sse_events::broadcast_match_created(state, &match_id, vec![participant.id.clone()]);
    }

    let seat = with_room(state, &handle, |room| {
        let seat = room.join(participant.clone(), connection)?;
        if room.phase().is_terminal() {
            state.connections().identify(connection, participant);
        } else {
            state
                .matches()
                .claim(participant.id.clone(), match_id.clone());
            state
                .connections()
                .bind(connection, participant, match_id.clone());
        }
        Ok::<_, MatchError>(seat)
    })
    .await?;
    debug!(%match_id, ?seat, "joined room");
    Ok(())
}

/// Re-attach `connection` to the seat its player holds in `match_id`.
pub async fn reconnect_match(
    state: &SharedState,
    connection: ConnectionId,
    match_id: MatchId,
    participant: Option<Participant>,
) -> Result<(), MatchError> {
    let participant = match participant {
        Some(participant) => participant,
        None => state
            .connections()
            .participant(connection)
            .ok_or(MatchError::NotAuthenticated)?,
    };
    let handle = state
        .matches()
        .get(&match_id)
        .ok_or(MatchError::RoomNotFound)?;

    with_room(state, &handle, |room| {
        room.handle_reconnect(&participant.id, connection)?;
        if room.phase().is_terminal() {
            state.connections().identify(connection, participant.clone());
        } else {
            state
                .matches()
                .claim(participant.id.clone(), match_id.clone());
            state
                .connections()
                .bind(connection, participant.clone(), match_id.clone());
        }
        Ok::<_, MatchError>(())
    })
    .await?;
    info!(%match_id, player_id = %participant.id, "player reconnected");
    Ok(())
}

pub async fn player_ready(
    state: &SharedState,
    connection: ConnectionId,
    match_id: &MatchId,
) -> Result<(), MatchError> {
    let (participant, handle) = bound_room(state, connection, match_id)?;
    with_room(state, &handle, |room| {
        seated(room, &participant, connection)?;
        room.set_ready(&participant.id)
    })
    .await
}

pub async fn submit_answer(
    state: &SharedState,
    connection: ConnectionId,
    match_id: &MatchId,
    question_index: usize,
    choice: AnswerChoice,
    elapsed_ms: u64,
) -> Result<(), MatchError> {
    let (participant, handle) = bound_room(state, connection, match_id)?;
    with_room(state, &handle, |room| {
        seated(room, &participant, connection)?;
        room.submit_answer(&participant.id, question_index, choice, elapsed_ms)
    })
    .await
}

/// Explicit leave. The connection stays open but is no longer bound to the room.
pub async fn leave_match(
    state: &SharedState,
    connection: ConnectionId,
    match_id: &MatchId,
) -> Result<(), MatchError> {
    let (participant, handle) = bound_room(state, connection, match_id)?;
    with_room(state, &handle, |room| {
        seated(room, &participant, connection)?;
        room.leave(&participant.id)
    })
    .await?;
    state.connections().unbind(connection);
    info!(%match_id, player_id = %participant.id, "player left the match");
    Ok(())
}

/// Called once when a socket closes: drops the connection from the queue and the room.
pub async fn connection_closed(state: &SharedState, connection: ConnectionId) {
    let Some(binding) = state.connections().unregister(connection) else {
        return;
    };

    let removed = {
        let mut queue = state.queue().lock().await;
        queue.remove_connection(connection).map(|_| queue.len())
    };
    if let Some(size) = removed {
        debug!(%connection, "removed closed connection from the queue");
        sse_events::broadcast_queue_size(state, size);
    }

    let (Some(participant), Some(match_id)) = (binding.participant, binding.match_id) else {
        return;
    };
    let Some(handle) = state.matches().get(&match_id) else {
        return;
    };
    let changed =
        with_room(state, &handle, |room| room.handle_disconnect(&participant.id, connection)).await;
    if changed {
        info!(%match_id, player_id = %participant.id, %connection, "player disconnected");
    }
}

fn bound_room(
    state: &SharedState,
    connection: ConnectionId,
    match_id: &MatchId,
) -> Result<(Participant, Arc<RoomHandle>), MatchError> {
    let binding = state
        .connections()
        .binding(connection)
        .ok_or(MatchError::NotAuthenticated)?;
    let participant = binding.participant.ok_or(MatchError::NotAuthenticated)?;
    if binding.match_id.as_ref() != Some(match_id) {
        warn!(%match_id, player_id = %participant.id, "event for a room the connection is not bound to");
        return Err(MatchError::NotParticipant);
    }
    let handle = state
        .matches()
        .get(match_id)
        .ok_or(MatchError::RoomNotFound)?;
    Ok((participant, handle))
}

/// Refuse events from a socket whose seat has since been taken over by a newer connection.
fn seated(
    room: &MatchRoom,
    participant: &Participant,
    connection: ConnectionId,
) -> Result<(), MatchError> {
    if room.holds_seat(&participant.id, connection) {
        return Ok(());
    }
    warn!(match_id = %room.match_id(), player_id = %participant.id, %connection, "event from a connection that no longer holds the seat");
    Err(MatchError::NotParticipant)
}
