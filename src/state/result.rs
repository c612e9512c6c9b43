use std::time::SystemTime;

use crate::{
    services::trophy::TrophyChange,
    state::{
        participant::{MatchId, Participant, PlayerId, Seat},
        room::{AbandonReason, MatchPhase},
    },
};

/// Immutable record of a terminated match, built once by the finalizer.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub match_id: MatchId,
    pub phase: MatchPhase,
    pub winner: Option<PlayerId>,
    pub is_draw: bool,
    pub reason: Option<AbandonReason>,
    pub players: Vec<PlayerResult>,
    pub duration_secs: u32,
    pub finished_at: SystemTime,
}

/// Final line of one seat.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerResult {
    pub seat: Seat,
    pub participant: Participant,
    pub goals: u32,
    pub score: u32,
    pub correct: u32,
    /// Trophy update; absent for matches that never became active.
    pub trophies: Option<TrophyChange>,
}
