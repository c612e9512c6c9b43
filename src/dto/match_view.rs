use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    dao::models::MatchRecordEntity,
    services::trophy::TrophyChange,
    state::{
        participant::{MatchId, Participant, PlayerId, Seat},
        question::{AnswerChoice, Question},
        result::MatchResult,
        room::{AbandonReason, MatchPhase},
    },
};

use super::format_system_time;

#[derive(Debug, Clone, Serialize, ToSchema)]
/// Public view of one seat.
pub struct PlayerView {
    pub player_id: PlayerId,
    pub name: String,
    pub rating: u32,
    pub grade: u8,
    pub league: String,
    pub seat: Seat,
    pub connected: bool,
    pub ready: bool,
    pub score: u32,
    pub goals: u32,
    pub correct: u32,
}

impl PlayerView {
    /// View of a freshly paired participant that has not joined yet.
    pub fn pending(participant: &Participant, seat: Seat) -> Self {
        Self {
            player_id: participant.id.clone(),
            name: participant.name.clone(),
            rating: participant.rating,
            grade: participant.grade,
            league: participant.league.clone(),
            seat,
            connected: false,
            ready: false,
            score: 0,
            goals: 0,
            correct: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
/// Question as shown to players, without the answer key.
pub struct QuestionView {
    pub id: String,
    /// `multiple_choice`, `true_false` or `numeric`.
    pub kind: String,
    pub prompt: String,
    /// Empty for numeric questions.
    pub options: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub difficulty: u8,
}

impl From<&Question> for QuestionView {
    fn from(question: &Question) -> Self {
        Self {
            id: question.id.clone(),
            kind: question.kind_name().to_string(),
            prompt: question.prompt.clone(),
            options: question.options(),
            image_url: question.image_url.clone(),
            difficulty: question.difficulty,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
/// Full room snapshot sent on join, activation and reconnection.
pub struct MatchStateView {
    pub match_id: MatchId,
    pub phase: MatchPhase,
    pub players: Vec<PlayerView>,
    /// Index of the current question; absent before the first question.
    pub current_index: Option<usize>,
    pub total_questions: usize,
    /// Current question while the match is active.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<QuestionView>,
    /// Players who answered the current question.
    pub answered: Vec<PlayerId>,
    pub field_position: i8,
    pub time_remaining: u32,
    pub countdown_remaining: u32,
    pub winner_id: Option<PlayerId>,
    /// RFC 3339 creation time.
    pub created_at: String,
    /// RFC 3339 time the first question opened.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
/// Compact listing entry for `GET /matches`.
pub struct MatchSummary {
    pub match_id: MatchId,
    pub phase: MatchPhase,
    pub players: Vec<PlayerId>,
    pub time_remaining: u32,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
/// Outcome of one answer, revealed when its question closes.
pub struct AnswerOutcomeView {
    pub player_id: PlayerId,
    pub choice: AnswerChoice,
    pub correct: bool,
    pub points: u32,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
/// Running totals of one seat.
pub struct SeatScoreView {
    pub player_id: PlayerId,
    pub score: u32,
    pub goals: u32,
    pub correct: u32,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
/// Trophy update of one player.
pub struct TrophyChangeView {
    pub delta: i32,
    pub previous_rating: u32,
    pub new_rating: u32,
    pub new_streak: u32,
    pub league: String,
    pub promoted: bool,
    pub demoted: bool,
    pub elo_delta: i32,
}

impl From<&TrophyChange> for TrophyChangeView {
    fn from(change: &TrophyChange) -> Self {
        Self {
            delta: change.delta,
            previous_rating: change.previous_rating,
            new_rating: change.new_rating,
            new_streak: change.new_streak,
            league: change.new_league.id().to_string(),
            promoted: change.promoted,
            demoted: change.demoted,
            elo_delta: change.elo_delta,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
/// Per-player line of a final result.
pub struct PlayerResultView {
    pub player_id: PlayerId,
    pub name: String,
    pub seat: Seat,
    pub goals: u32,
    pub score: u32,
    pub correct: u32,
    /// Absent when the match never reached the active phase.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trophies: Option<TrophyChangeView>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
/// Immutable final result of a match.
pub struct MatchResultView {
    pub match_id: MatchId,
    pub winner_id: Option<PlayerId>,
    pub is_draw: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<AbandonReason>,
    pub players: Vec<PlayerResultView>,
    pub duration_secs: u32,
    pub finished_at: String,
}

impl From<&MatchResult> for MatchResultView {
    fn from(result: &MatchResult) -> Self {
        Self {
            match_id: result.match_id.clone(),
            winner_id: result.winner.clone(),
            is_draw: result.is_draw,
            reason: result.reason,
            players: result
                .players
                .iter()
                .map(|line| PlayerResultView {
                    player_id: line.participant.id.clone(),
                    name: line.participant.name.clone(),
                    seat: line.seat,
                    goals: line.goals,
                    score: line.score,
                    correct: line.correct,
                    trophies: line.trophies.as_ref().map(TrophyChangeView::from),
                })
                .collect(),
            duration_secs: result.duration_secs,
            finished_at: format_system_time(result.finished_at),
        }
    }
}

impl From<MatchRecordEntity> for MatchResultView {
    fn from(record: MatchRecordEntity) -> Self {
        Self {
            match_id: record.match_id,
            winner_id: record.winner_id,
            is_draw: record.is_draw,
            reason: record.reason,
            players: record
                .players
                .into_iter()
                .map(|line| PlayerResultView {
                    player_id: line.player_id,
                    name: line.name,
                    seat: line.seat,
                    goals: line.goals,
                    score: line.score,
                    correct: line.correct,
                    trophies: line.trophies.map(|change| TrophyChangeView {
                        delta: change.delta,
                        previous_rating: line.rating_before,
                        new_rating: change.new_rating,
                        new_streak: change.new_streak,
                        league: change.league,
                        promoted: change.promoted,
                        demoted: change.demoted,
                        elo_delta: change.elo_delta,
                    }),
                })
                .collect(),
            duration_secs: record.duration_secs,
            finished_at: format_system_time(record.finished_at),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Listing of live rooms.
pub struct MatchesResponse {
    pub matches: Vec<MatchSummary>,
}
