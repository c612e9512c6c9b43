use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::state::{
    participant::{MatchId, PlayerId, Seat},
    result::MatchResult,
    room::{AbandonReason, MatchPhase},
};

/// Persisted record of one concluded match. Written once per match id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchRecordEntity {
    /// Identifier of the room the match was played in.
    pub match_id: MatchId,
    /// Terminal phase reached by the room.
    pub phase: MatchPhase,
    /// Winning player, absent for a draw.
    pub winner_id: Option<PlayerId>,
    pub is_draw: bool,
    /// Set when the match was abandoned.
    pub reason: Option<AbandonReason>,
    /// One line per seat, in seat order.
    pub players: Vec<PlayerRecordEntity>,
    pub duration_secs: u32,
    pub finished_at: SystemTime,
}

/// Final line of one player inside a [`MatchRecordEntity`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerRecordEntity {
    pub player_id: PlayerId,
    pub name: String,
    pub seat: Seat,
    pub grade: u8,
    pub goals: u32,
    pub score: u32,
    pub correct: u32,
    /// Trophy count before the match.
    pub rating_before: u32,
    pub trophies: Option<TrophyRecordEntity>,
}

/// Trophy update applied to a player.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrophyRecordEntity {
    pub delta: i32,
    pub new_rating: u32,
    pub new_streak: u32,
    /// League after the update.
    pub league: String,
    pub promoted: bool,
    pub demoted: bool,
    pub elo_delta: i32,
}

impl From<&MatchResult> for MatchRecordEntity {
    fn from(result: &MatchResult) -> Self {
        Self {
            match_id: result.match_id.clone(),
            phase: result.phase,
            winner_id: result.winner.clone(),
            is_draw: result.is_draw,
            reason: result.reason,
            players: result
                .players
                .iter()
                .map(|line| PlayerRecordEntity {
                    player_id: line.participant.id.clone(),
                    name: line.participant.name.clone(),
                    seat: line.seat,
                    grade: line.participant.grade,
                    goals: line.goals,
                    score: line.score,
                    correct: line.correct,
                    rating_before: line.participant.rating,
                    trophies: line.trophies.as_ref().map(|change| TrophyRecordEntity {
                        delta: change.delta,
                        new_rating: change.new_rating,
                        new_streak: change.new_streak,
                        league: change.new_league.id().to_string(),
                        promoted: change.promoted,
                        demoted: change.demoted,
                        elo_delta: change.elo_delta,
                    }),
                })
                .collect(),
            duration_secs: result.duration_secs,
            finished_at: result.finished_at,
        }
    }
}
