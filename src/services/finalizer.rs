//! Turns the terminal outcome of a room into a [`MatchResult`], announces it
//! and hands it to the match store.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::{
    dao::match_store::{MatchStore, RecordOutcome},
    dto::{match_view::MatchResultView, ws::ServerMessage},
    services::{sse_events, trophy},
    state::{
        SharedState,
        participant::MatchId,
        result::{MatchResult, PlayerResult},
        room::{MatchOutcome, MatchPhase, SeatOutcome},
    },
};

/// Build the immutable result of a terminated room.
///
/// Trophies are only computed for matches that reached the active phase with
/// both seats filled. A finished match without a winner is a draw.
pub fn build_result(outcome: &MatchOutcome) -> MatchResult {
    let is_draw = outcome.phase == MatchPhase::Finished
        && outcome.winner.is_none()
        && outcome.seats.len() == 2;

    let mut players: Vec<PlayerResult> = outcome
        .seats
        .iter()
        .map(|seat| PlayerResult {
            seat: seat.seat,
            participant: seat.participant.clone(),
            goals: seat.goals,
            score: seat.score,
            correct: seat.correct,
            trophies: None,
        })
        .collect();

    if let Some((winner, loser)) = ranked_pair(outcome).filter(|_| outcome.reached_active) {
        let trophies = trophy::compute_result(
            &winner.participant.id,
            &loser.participant.id,
            winner.participant.rating,
            loser.participant.rating,
            winner.participant.win_streak,
            is_draw,
        );
        for player in &mut players {
            if player.participant.id == trophies.winner.player_id {
                player.trophies = Some(trophies.winner.clone());
            } else if player.participant.id == trophies.loser.player_id {
                player.trophies = Some(trophies.loser.clone());
            }
        }
    }

    MatchResult {
        match_id: outcome.match_id.clone(),
        phase: outcome.phase,
        winner: outcome.winner.clone(),
        is_draw,
        reason: outcome.reason,
        players,
        duration_secs: outcome.duration_secs,
        finished_at: outcome.finished_at,
    }
}

/// `(winner, loser)` seats; seat order for a draw.
fn ranked_pair(outcome: &MatchOutcome) -> Option<(&SeatOutcome, &SeatOutcome)> {
    let [first, second] = outcome.seats.as_slice() else {
        return None;
    };
    match &outcome.winner {
        Some(winner) if &second.participant.id == winner => Some((second, first)),
        Some(winner) if &first.participant.id == winner => Some((first, second)),
        Some(_) => None,
        None => Some((first, second)),
    }
}

/// Announce the outcome to both players and the lobby, then persist it in the background.
pub fn finalize(state: &SharedState, outcome: MatchOutcome) {
    let result = build_result(&outcome);
    let view = MatchResultView::from(&result);
    let message = match (outcome.phase, outcome.reason, result.winner.clone()) {
        (MatchPhase::Abandoned, Some(reason), Some(winner_id)) => ServerMessage::MatchAbandoned {
            reason,
            winner_id,
            result: view,
        },
        _ => ServerMessage::MatchFinished { result: view },
    };
    for connection in &outcome.recipients {
        state.connections().send(*connection, message.clone());
    }
    sse_events::broadcast_match_ended(state, &result);

    info!(
        match_id = %result.match_id,
        phase = ?result.phase,
        winner = ?result.winner,
        draw = result.is_draw,
        "match concluded"
    );

    if !outcome.reached_active {
        debug!(match_id = %result.match_id, "match never started; nothing to persist");
        return;
    }

    let state = state.clone();
    tokio::spawn(async move {
        persist(&state, result).await;
    });
}

async fn persist(state: &SharedState, result: MatchResult) {
    let Some(store) = state.match_store().await else {
        warn!(match_id = %result.match_id, "no match store installed; keeping result pending");
        state
            .pending_records()
            .insert(result.match_id.clone(), result);
        return;
    };
    if let Err(result) = record(&store, result).await {
        state
            .pending_records()
            .insert(result.match_id.clone(), result);
    }
}

/// Store one result; hands the result back when a retry may succeed.
async fn record(store: &Arc<dyn MatchStore>, result: MatchResult) -> Result<(), MatchResult> {
    let match_id = result.match_id.clone();
    match store.record_match(result.clone()).await {
        Ok(RecordOutcome::Inserted) => {
            info!(%match_id, "match result persisted");
            Ok(())
        }
        Ok(RecordOutcome::AlreadyRecorded) => {
            debug!(%match_id, "match result already recorded");
            Ok(())
        }
        Err(err) if err.is_transient() => {
            warn!(%match_id, error = %err, "failed to persist match result");
            Err(result)
        }
        Err(err) => {
            error!(%match_id, error = %err, "match result refused by the store; dropping it");
            Ok(())
        }
    }
}

/// Write every pending result to `store`. Stops at the first failure.
///
/// Returns the number of results written.
pub async fn flush_pending(state: &SharedState, store: &Arc<dyn MatchStore>) -> usize {
    let pending: Vec<MatchId> = state
        .pending_records()
        .iter()
        .map(|entry| entry.key().clone())
        .collect();

    let mut flushed = 0;
    for match_id in pending {
        let Some((_, result)) = state.pending_records().remove(&match_id) else {
            continue;
        };
        if let Err(result) = record(store, result).await {
            state.pending_records().insert(match_id, result);
            break;
        }
        flushed += 1;
    }
    if flushed > 0 {
        info!(flushed, "flushed pending match results");
    }
    flushed
}
