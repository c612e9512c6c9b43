use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    dto::{
        match_view::{AnswerOutcomeView, MatchResultView, MatchStateView, PlayerView, QuestionView, SeatScoreView},
        validation::validate_player_id,
    },
    services::trophy::league_for,
    state::{
        participant::{ConnectionId, MatchId, Participant, PlayerId, Seat},
        question::{AnswerChoice, CorrectAnswer},
        room::AbandonReason,
    },
};

/// Identity supplied by an already authenticated client when it looks for or joins a match.
#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct ParticipantInput {
    /// Platform-wide player identifier.
    #[validate(custom(function = "validate_player_id"))]
    pub player_id: String,
    /// Name displayed to the opponent.
    #[validate(length(min = 1, max = 40))]
    pub name: String,
    /// Current trophy count.
    #[serde(default)]
    pub rating: u32,
    /// School grade.
    #[validate(range(min = 1, max = 6))]
    pub grade: u8,
    /// League tier; derived from the rating when omitted.
    #[serde(default)]
    pub league: Option<String>,
    /// Consecutive wins before this match.
    #[serde(default)]
    pub win_streak: u32,
}

impl From<ParticipantInput> for Participant {
    fn from(input: ParticipantInput) -> Self {
        let league = input
            .league
            .filter(|league| !league.trim().is_empty())
            .unwrap_or_else(|| league_for(input.rating).id().to_string());
        Participant {
            id: PlayerId::new(input.player_id),
            name: input.name.trim().to_string(),
            rating: input.rating,
            grade: input.grade,
            league,
            win_streak: input.win_streak,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
/// Messages accepted from match WebSocket clients.
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Enter the matchmaking queue.
    FindMatch {
        /// Identity of the player looking for an opponent.
        player: ParticipantInput,
    },
    /// Leave the matchmaking queue.
    CancelMatchmaking,
    /// Join a room by id, creating it when unknown.
    JoinMatch {
        /// Target room.
        match_id: MatchId,
        /// Identity of the joining player.
        player: ParticipantInput,
    },
    /// Signal readiness in the waiting room.
    PlayerReady {
        /// Room the connection is bound to.
        match_id: MatchId,
    },
    /// Answer the open question.
    SubmitAnswer {
        /// Room the connection is bound to.
        match_id: MatchId,
        /// Index of the question being answered.
        question_index: usize,
        /// Option index or numeric value.
        choice: AnswerChoice,
        /// Milliseconds the player needed, as measured by the client.
        #[serde(default)]
        elapsed_ms: u64,
    },
    /// Leave the room; forfeits once the countdown started.
    LeaveMatch {
        /// Room the connection is bound to.
        match_id: MatchId,
    },
    /// Re-attach a fresh connection to a seat held before a disconnect.
    ReconnectMatch {
        /// Room to re-attach to.
        match_id: MatchId,
        /// Identity, required when the connection has not identified yet.
        #[serde(default)]
        player: Option<ParticipantInput>,
    },
    /// Keep-alive ping answered with `pong`.
    Ping,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
/// Messages pushed to match WebSocket clients.
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once when the socket opens.
    Connected {
        /// Identifier assigned to this connection.
        connection_id: ConnectionId,
        /// Server clock in RFC 3339.
        server_time: String,
    },
    /// Failure of a request sent by this connection.
    Error {
        /// Stable machine-readable code.
        code: String,
        /// Human-readable explanation.
        message: String,
    },
    /// The player waits in the matchmaking queue.
    Queued {
        /// One-based position in the queue.
        position: usize,
    },
    /// The queue entry was removed on request.
    MatchmakingCancelled,
    /// The queue entry waited too long and was removed.
    MatchmakingTimeout,
    /// An opponent was found; the client should now join the room.
    MatchFound {
        /// Room reserved for the pair.
        match_id: MatchId,
        /// Seat reserved for the recipient.
        seat: Seat,
        /// The paired opponent.
        opponent: PlayerView,
    },
    /// The recipient holds a seat in the room.
    MatchJoined {
        /// Joined room.
        match_id: MatchId,
        /// Seat held by the recipient.
        seat: Seat,
        /// Snapshot of the room.
        state: MatchStateView,
    },
    /// The opponent took the other seat.
    OpponentJoined {
        /// The new opponent.
        opponent: PlayerView,
    },
    /// The opponent left the waiting room.
    OpponentLeft {
        /// Player who left.
        player_id: PlayerId,
    },
    /// A player signalled readiness.
    PlayerReady {
        /// Player who is ready.
        player_id: PlayerId,
    },
    /// Both players are ready; the countdown begins.
    BothReady {
        /// Countdown length in seconds.
        countdown: u32,
    },
    /// Remaining countdown seconds.
    CountdownTick {
        /// Seconds until the first question.
        remaining: u32,
    },
    /// The match is running.
    MatchStarted {
        /// Snapshot taken at activation.
        state: MatchStateView,
    },
    /// A new question is open.
    QuestionStarted {
        /// Zero-based question index.
        index: usize,
        /// Number of questions in the match.
        total: usize,
        /// The question without its answer key.
        question: QuestionView,
        /// Time allowed for this question.
        time_limit_ms: u64,
    },
    /// The recipient's answer was recorded.
    AnswerAccepted {
        /// Question that was answered.
        question_index: usize,
    },
    /// The opponent answered; correctness stays hidden until the question closes.
    OpponentAnswered {
        /// Question that was answered.
        question_index: usize,
    },
    /// A question closed; reveals the key and every answer's outcome.
    QuestionResult {
        /// Question that closed.
        question_index: usize,
        /// Correct option or value.
        correct_answer: CorrectAnswer,
        /// Answers in arrival order.
        answers: Vec<AnswerOutcomeView>,
        /// Running totals after scoring.
        players: Vec<SeatScoreView>,
        /// Ball position after scoring.
        field_position: i8,
        /// Players who scored a goal on this question.
        goals_scored: Vec<PlayerId>,
    },
    /// Remaining match time.
    TimeTick {
        /// Seconds left on the match clock.
        remaining: u32,
    },
    /// The match clock crossed the low-time threshold.
    LowTimeWarning {
        /// Seconds left on the match clock.
        remaining: u32,
    },
    /// The opponent lost its connection.
    OpponentDisconnected {
        /// Disconnected player.
        player_id: PlayerId,
        /// Time the opponent has to come back.
        grace_ms: u64,
    },
    /// The opponent is back.
    OpponentReconnected {
        /// Reconnected player.
        player_id: PlayerId,
    },
    /// Full snapshot, sent after a reconnection.
    MatchState {
        /// Snapshot of the room.
        state: MatchStateView,
    },
    /// The match ended normally.
    MatchFinished {
        /// Final result.
        result: MatchResultView,
    },
    /// The match ended early.
    MatchAbandoned {
        /// Why the match was abandoned.
        reason: AbandonReason,
        /// Remaining player, declared winner.
        winner_id: PlayerId,
        /// Final result.
        result: MatchResultView,
    },
    /// Reply to `ping`.
    Pong,
}

impl ServerMessage {
    /// Build the `error` event for a failed request.
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            code: code.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_answer_parses_with_default_elapsed() {
        let message: ClientMessage = serde_json::from_str(
            r#"{"type":"submit_answer","match_id":"match_1","question_index":3,"choice":1}"#,
        )
        .unwrap();
        match message {
            ClientMessage::SubmitAnswer {
                match_id,
                question_index,
                choice,
                elapsed_ms,
            } => {
                assert_eq!(match_id.as_str(), "match_1");
                assert_eq!(question_index, 3);
                assert_eq!(choice, AnswerChoice::Option(1));
                assert_eq!(elapsed_ms, 0);
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn unit_messages_serialize_with_type_tag_only() {
        let json = serde_json::to_value(ServerMessage::Pong).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "pong" }));
        let json = serde_json::to_value(ServerMessage::CountdownTick { remaining: 2 }).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "countdown_tick", "remaining": 2 }));
    }

    #[test]
    fn participant_league_defaults_from_rating() {
        let input = ParticipantInput {
            player_id: "p-1".into(),
            name: "  Mia ".into(),
            rating: 1200,
            grade: 3,
            league: None,
            win_streak: 0,
        };
        assert!(input.validate().is_ok());
        let participant = Participant::from(input);
        assert_eq!(participant.league, "gold");
        assert_eq!(participant.name, "Mia");
    }

    #[test]
    fn participant_grade_out_of_range_is_rejected() {
        let input = ParticipantInput {
            player_id: "p-1".into(),
            name: "Mia".into(),
            rating: 0,
            grade: 9,
            league: None,
            win_streak: 0,
        };
        assert!(input.validate().is_err());
    }
}
