//! Authoritative state machine of one match.
//!
//! A [`MatchRoom`] never performs I/O. Every operation validates first, then
//! mutates and records [`RoomEffect`]s in an outbox that the service layer drains
//! and executes while it still holds the room lock. This keeps the whole match
//! flow testable without sockets or timers.

use std::{
    collections::{HashMap, HashSet},
    time::{Duration, SystemTime},
};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    config::MatchSettings,
    dto::{
        format_system_time,
        match_view::{
            AnswerOutcomeView, MatchStateView, MatchSummary, PlayerView, QuestionView,
            SeatScoreView,
        },
        ws::ServerMessage,
    },
    error::MatchError,
    state::{
        participant::{ConnectionId, MatchId, Participant, PlayerId, Seat},
        question::{AnswerChoice, Question},
    },
};

const TICK: Duration = Duration::from_secs(1);

/// Lifecycle phase of a room. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MatchPhase {
    Waiting,
    Countdown,
    Active,
    Finished,
    Abandoned,
}

impl MatchPhase {
    /// Whether the room reached one of its final phases.
    pub fn is_terminal(self) -> bool {
        matches!(self, MatchPhase::Finished | MatchPhase::Abandoned)
    }
}

/// Why a room ended in [`MatchPhase::Abandoned`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AbandonReason {
    /// A player left explicitly after the countdown started.
    Forfeit,
    /// A player's reconnect grace window elapsed.
    Disconnected,
    /// The room never started within the join window.
    Expired,
}

/// Timers a room can arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Pre-match countdown, ticking every second.
    Countdown,
    /// Whole-match clock, ticking every second.
    MatchClock,
    /// Per-question deadline.
    Question,
    /// Reconnect grace window of one seat.
    Grace(Seat),
    /// Join window; disposes rooms that never start.
    Expiry,
}

/// Identifies one arming of a timer. Firings whose generation is no longer armed are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerToken {
    pub kind: TimerKind,
    pub generation: u64,
}

/// How an armed timer fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerSchedule {
    /// Fire once after the delay.
    Once(Duration),
    /// Fire every period until cancelled.
    Every(Duration),
}

/// Instruction recorded by the room for the service layer.
#[derive(Debug, Clone)]
pub enum RoomEffect {
    /// Deliver a message to the listed connections.
    Send {
        to: Vec<ConnectionId>,
        message: ServerMessage,
    },
    /// Start a timer task, replacing any task of the same kind.
    Arm {
        token: TimerToken,
        schedule: TimerSchedule,
    },
    /// Abort the timer task of this kind.
    Cancel(TimerKind),
    /// Load the question sequence without holding the room lock.
    FetchQuestions { grade: u8, count: usize, token: u64 },
    /// Hand the terminal outcome to the finalizer.
    Finalize(MatchOutcome),
    /// Remove the room from the registry after the delay.
    ScheduleCleanup(Duration),
    /// Remove the room from the registry now.
    Dispose,
    /// The player no longer holds a live match in this room.
    Release(PlayerId),
    /// A newer connection took over the seat; the old one loses its room binding.
    Unbind(ConnectionId),
}

/// Final state of one seat, captured when the room ends.
#[derive(Debug, Clone, PartialEq)]
pub struct SeatOutcome {
    pub seat: Seat,
    pub participant: Participant,
    pub score: u32,
    pub goals: u32,
    pub correct: u32,
}

/// Terminal snapshot handed to the finalizer.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    pub match_id: MatchId,
    pub phase: MatchPhase,
    pub winner: Option<PlayerId>,
    pub reason: Option<AbandonReason>,
    pub seats: Vec<SeatOutcome>,
    /// Whether the match got past the countdown; only such matches are scored and stored.
    pub reached_active: bool,
    pub duration_secs: u32,
    pub finished_at: SystemTime,
    /// Connections to notify.
    pub recipients: Vec<ConnectionId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContentState {
    Idle,
    Loading(u64),
    Loaded,
}

#[derive(Debug, Clone)]
struct Slot {
    participant: Participant,
    connection: Option<ConnectionId>,
    ever_connected: bool,
    ready: bool,
    score: u32,
    goals: u32,
    correct: u32,
}

impl Slot {
    fn new(participant: Participant) -> Self {
        Self {
            participant,
            connection: None,
            ever_connected: false,
            ready: false,
            score: 0,
            goals: 0,
            correct: 0,
        }
    }

    fn connected(&self) -> bool {
        self.connection.is_some()
    }
}

#[derive(Debug, Clone)]
struct PendingAnswer {
    seat: Seat,
    player_id: PlayerId,
    choice: AnswerChoice,
    elapsed_ms: u64,
}

/// One match between two seats.
#[derive(Debug)]
pub struct MatchRoom {
    match_id: MatchId,
    settings: MatchSettings,
    phase: MatchPhase,
    slots: [Option<Slot>; 2],
    questions: Vec<Question>,
    current_index: Option<usize>,
    question_open: bool,
    answered: HashSet<PlayerId>,
    pending_answers: Vec<PendingAnswer>,
    field_position: i8,
    time_remaining: u32,
    countdown_remaining: u32,
    countdown_elapsed: bool,
    low_time_warned: bool,
    content: ContentState,
    armed: HashMap<TimerKind, u64>,
    generation: u64,
    winner: Option<PlayerId>,
    abandon_reason: Option<AbandonReason>,
    created_at: SystemTime,
    started_at: Option<SystemTime>,
    finished_at: Option<SystemTime>,
    outbox: Vec<RoomEffect>,
}

impl MatchRoom {
    /// Create an empty room; the join window starts now.
    pub fn new(match_id: MatchId, settings: MatchSettings) -> Self {
        let mut room = Self {
            match_id,
            time_remaining: settings.match_duration_secs,
            countdown_remaining: settings.countdown_secs,
            settings,
            phase: MatchPhase::Waiting,
            slots: [None, None],
            questions: Vec::new(),
            current_index: None,
            question_open: false,
            answered: HashSet::new(),
            pending_answers: Vec::new(),
            field_position: 0,
            countdown_elapsed: false,
            low_time_warned: false,
            content: ContentState::Idle,
            armed: HashMap::new(),
            generation: 0,
            winner: None,
            abandon_reason: None,
            created_at: SystemTime::now(),
            started_at: None,
            finished_at: None,
            outbox: Vec::new(),
        };
        let window = room.settings.join_window;
        room.arm(TimerKind::Expiry, TimerSchedule::Once(window));
        room
    }

    /// Create a room for a matchmaking pair, reserving one seat per participant.
    pub fn paired(match_id: MatchId, settings: MatchSettings, players: [Participant; 2]) -> Self {
        let mut room = Self::new(match_id, settings);
        let [one, two] = players;
        room.slots = [Some(Slot::new(one)), Some(Slot::new(two))];
        room
    }

    pub fn match_id(&self) -> &MatchId {
        &self.match_id
    }

    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    pub fn winner(&self) -> Option<&PlayerId> {
        self.winner.as_ref()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn field_position(&self) -> i8 {
        self.field_position
    }

    pub fn time_remaining(&self) -> u32 {
        self.time_remaining
    }

    /// Player ids that answered the open question.
    pub fn answered(&self) -> &HashSet<PlayerId> {
        &self.answered
    }

    /// Whether the timer kind currently has an armed generation.
    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.armed.contains_key(&kind)
    }

    /// Seat held by the player, if any.
    pub fn seat_of(&self, player_id: &PlayerId) -> Option<Seat> {
        Seat::ALL.into_iter().find(|seat| {
            self.slot(*seat)
                .is_some_and(|slot| &slot.participant.id == player_id)
        })
    }

    /// Participants currently holding a seat.
    pub fn participants(&self) -> Vec<&Participant> {
        self.slots
            .iter()
            .flatten()
            .map(|slot| &slot.participant)
            .collect()
    }

    /// Whether the seat is filled and has a live connection.
    pub fn is_connected(&self, seat: Seat) -> bool {
        self.slot(seat).is_some_and(Slot::connected)
    }

    /// Whether `connection` is the one currently attached to the player's seat.
    pub fn holds_seat(&self, player_id: &PlayerId, connection: ConnectionId) -> bool {
        self.seat_of(player_id)
            .and_then(|seat| self.slot(seat))
            .is_some_and(|slot| slot.connection == Some(connection))
    }

    /// Running `(score, goals, correct)` of a seat.
    pub fn totals(&self, seat: Seat) -> Option<(u32, u32, u32)> {
        self.slot(seat)
            .map(|slot| (slot.score, slot.goals, slot.correct))
    }

    /// Take every effect recorded since the last drain.
    pub fn drain_effects(&mut self) -> Vec<RoomEffect> {
        std::mem::take(&mut self.outbox)
    }

    /// Take a seat, or re-attach the seat already held by this participant.
    pub fn join(
        &mut self,
        participant: Participant,
        connection: ConnectionId,
    ) -> Result<Seat, MatchError> {
        if let Some(seat) = self.seat_of(&participant.id) {
            if self.phase.is_terminal() {
                self.send_to_connection(
                    connection,
                    ServerMessage::MatchState {
                        state: self.state_view(),
                    },
                );
                return Ok(seat);
            }
            self.attach(seat, connection);
            self.send_to_connection(
                connection,
                ServerMessage::MatchJoined {
                    match_id: self.match_id.clone(),
                    seat,
                    state: self.state_view(),
                },
            );
            return Ok(seat);
        }

        let free = Seat::ALL
            .into_iter()
            .find(|seat| self.slots[seat.index()].is_none());
        let Some(seat) = free else {
            return Err(MatchError::RoomFull);
        };
        if self.phase != MatchPhase::Waiting {
            return Err(MatchError::NotActive);
        }

        let mut slot = Slot::new(participant);
        slot.connection = Some(connection);
        slot.ever_connected = true;
        let view = player_view(&slot, seat);
        self.slots[seat.index()] = Some(slot);

        self.send_to_connection(
            connection,
            ServerMessage::MatchJoined {
                match_id: self.match_id.clone(),
                seat,
                state: self.state_view(),
            },
        );
        self.send_to_seat(seat.other(), ServerMessage::OpponentJoined { opponent: view });
        Ok(seat)
    }

    /// Re-attach a fresh connection to the seat held by `player_id`.
    pub fn handle_reconnect(
        &mut self,
        player_id: &PlayerId,
        connection: ConnectionId,
    ) -> Result<Seat, MatchError> {
        let seat = self
            .seat_of(player_id)
            .ok_or(MatchError::NotParticipant)?;
        if !self.phase.is_terminal() {
            self.attach(seat, connection);
        }
        self.send_to_connection(
            connection,
            ServerMessage::MatchState {
                state: self.state_view(),
            },
        );
        Ok(seat)
    }

    /// Mark the player ready; starts the countdown once both seats are ready.
    pub fn set_ready(&mut self, player_id: &PlayerId) -> Result<(), MatchError> {
        let seat = self
            .seat_of(player_id)
            .ok_or(MatchError::NotParticipant)?;
        if self.phase != MatchPhase::Waiting {
            return Ok(());
        }
        let Some(slot) = self.slot_mut(seat) else {
            return Ok(());
        };
        if slot.ready {
            return Ok(());
        }
        slot.ready = true;
        self.broadcast(ServerMessage::PlayerReady {
            player_id: player_id.clone(),
        });

        let all_ready = self
            .slots
            .iter()
            .all(|slot| slot.as_ref().is_some_and(|s| s.ready && s.connected()));
        if all_ready {
            self.start_countdown();
        }
        Ok(())
    }

    /// Accept the question sequence produced by the fetch started with `token`.
    ///
    /// Returns `false` when the completion is stale and was ignored.
    pub fn questions_loaded(&mut self, token: u64, questions: Vec<Question>) -> bool {
        if self.phase != MatchPhase::Countdown || self.content != ContentState::Loading(token) {
            return false;
        }
        self.questions = questions;
        self.content = ContentState::Loaded;
        self.try_activate();
        true
    }

    /// Record one answer for the open question.
    pub fn submit_answer(
        &mut self,
        player_id: &PlayerId,
        question_index: usize,
        choice: AnswerChoice,
        elapsed_ms: u64,
    ) -> Result<(), MatchError> {
        let seat = self
            .seat_of(player_id)
            .ok_or(MatchError::NotParticipant)?;
        if self.phase != MatchPhase::Active {
            return Err(MatchError::NotActive);
        }
        if !self.question_open || self.current_index != Some(question_index) {
            return Err(MatchError::StaleAnswer {
                expected: self.current_index.map_or(-1, |index| index as i64),
                got: question_index,
            });
        }
        if self.answered.contains(player_id) {
            return Err(MatchError::AlreadyAnswered);
        }

        let limit_ms = duration_ms(self.settings.question_duration);
        self.answered.insert(player_id.clone());
        self.pending_answers.push(PendingAnswer {
            seat,
            player_id: player_id.clone(),
            choice,
            elapsed_ms: elapsed_ms.min(limit_ms),
        });

        self.send_to_seat(seat, ServerMessage::AnswerAccepted { question_index });
        self.send_to_seat(seat.other(), ServerMessage::OpponentAnswered { question_index });

        if self.all_connected_answered() {
            self.advance();
        }
        Ok(())
    }

    /// Handle the close of `connection`. Closes of superseded connections are ignored.
    ///
    /// Returns whether the room changed.
    pub fn handle_disconnect(&mut self, player_id: &PlayerId, connection: ConnectionId) -> bool {
        let Some(seat) = self.seat_of(player_id) else {
            return false;
        };
        if self.slot(seat).and_then(|slot| slot.connection) != Some(connection) {
            return false;
        }

        match self.phase {
            MatchPhase::Waiting => self.vacate(seat),
            MatchPhase::Countdown => {
                self.detach(seat);
                self.notify_disconnected(seat);
                if !self.is_connected(seat.other()) {
                    let window = self.settings.join_window;
                    self.arm(TimerKind::Expiry, TimerSchedule::Once(window));
                }
            }
            MatchPhase::Active => {
                self.detach(seat);
                let grace = self.settings.reconnect_grace;
                self.arm(TimerKind::Grace(seat), TimerSchedule::Once(grace));
                self.notify_disconnected(seat);
                if self.all_connected_answered() {
                    self.advance();
                }
            }
            MatchPhase::Finished | MatchPhase::Abandoned => self.detach(seat),
        }
        true
    }

    /// Explicit leave: vacates the seat while waiting, forfeits afterwards.
    pub fn leave(&mut self, player_id: &PlayerId) -> Result<(), MatchError> {
        let seat = self
            .seat_of(player_id)
            .ok_or(MatchError::NotParticipant)?;
        match self.phase {
            MatchPhase::Waiting => self.vacate(seat),
            MatchPhase::Countdown | MatchPhase::Active => {
                self.abandon(seat.other(), AbandonReason::Forfeit)
            }
            MatchPhase::Finished | MatchPhase::Abandoned => {}
        }
        Ok(())
    }

    /// Close the match normally. Idempotent, and a no-op outside the active phase.
    pub fn finish(&mut self) {
        if self.phase != MatchPhase::Active {
            return;
        }
        self.close_question();
        self.cancel_all();

        let totals = |seat: Seat| self.totals(seat).map(|(score, goals, _)| (goals, score));
        let winner = match (totals(Seat::One), totals(Seat::Two)) {
            (Some(one), Some(two)) => decide_winner(one, two),
            (Some(_), None) => Some(Seat::One),
            (None, Some(_)) => Some(Seat::Two),
            (None, None) => None,
        };
        self.winner = winner.and_then(|seat| self.slot(seat).map(|slot| slot.participant.id.clone()));
        self.phase = MatchPhase::Finished;
        self.finished_at = Some(SystemTime::now());
        self.conclude(true);
    }

    /// Apply a timer firing. Returns whether the timer is still armed afterwards.
    pub fn on_timer(&mut self, token: TimerToken) -> bool {
        if self.armed.get(&token.kind) != Some(&token.generation) {
            return false;
        }

        match token.kind {
            TimerKind::Countdown => self.countdown_tick(),
            TimerKind::MatchClock => self.clock_tick(),
            TimerKind::Question => {
                self.armed.remove(&TimerKind::Question);
                self.advance();
            }
            TimerKind::Grace(seat) => {
                self.armed.remove(&token.kind);
                if self.phase == MatchPhase::Active && !self.is_connected(seat) {
                    self.abandon(seat.other(), AbandonReason::Disconnected);
                }
            }
            TimerKind::Expiry => {
                self.armed.remove(&TimerKind::Expiry);
                let nobody_connected = Seat::ALL.iter().all(|seat| !self.is_connected(*seat));
                let both_seated = Seat::ALL.iter().all(|seat| self.is_connected(*seat));
                match self.phase {
                    MatchPhase::Waiting if !both_seated => self.expire(),
                    MatchPhase::Countdown if nobody_connected => self.expire(),
                    _ => {}
                }
            }
        }

        self.armed.get(&token.kind) == Some(&token.generation)
    }

    /// Snapshot of the whole room as sent to clients.
    pub fn state_view(&self) -> MatchStateView {
        let question = match (self.phase, self.current_index) {
            (MatchPhase::Active, Some(index)) => self.questions.get(index).map(QuestionView::from),
            _ => None,
        };
        let mut answered: Vec<PlayerId> = self.answered.iter().cloned().collect();
        answered.sort();
        MatchStateView {
            match_id: self.match_id.clone(),
            phase: self.phase,
            players: self.player_views(),
            current_index: self.current_index,
            total_questions: self.questions.len(),
            question,
            answered,
            field_position: self.field_position,
            time_remaining: self.time_remaining,
            countdown_remaining: self.countdown_remaining,
            winner_id: self.winner.clone(),
            created_at: format_system_time(self.created_at),
            started_at: self.started_at.map(format_system_time),
        }
    }

    /// Compact listing entry.
    pub fn summary(&self) -> MatchSummary {
        MatchSummary {
            match_id: self.match_id.clone(),
            phase: self.phase,
            players: self
                .participants()
                .into_iter()
                .map(|participant| participant.id.clone())
                .collect(),
            time_remaining: self.time_remaining,
            created_at: format_system_time(self.created_at),
        }
    }

    fn start_countdown(&mut self) {
        self.phase = MatchPhase::Countdown;
        self.cancel(TimerKind::Expiry);
        self.countdown_remaining = self.settings.countdown_secs;
        self.broadcast(ServerMessage::BothReady {
            countdown: self.countdown_remaining,
        });

        self.generation += 1;
        let token = self.generation;
        self.content = ContentState::Loading(token);
        self.outbox.push(RoomEffect::FetchQuestions {
            grade: self.average_grade(),
            count: self.settings.target_question_count,
            token,
        });

        if self.countdown_remaining == 0 {
            self.countdown_elapsed = true;
            return;
        }
        self.broadcast(ServerMessage::CountdownTick {
            remaining: self.countdown_remaining,
        });
        self.arm(TimerKind::Countdown, TimerSchedule::Every(TICK));
    }

    fn countdown_tick(&mut self) {
        if self.phase != MatchPhase::Countdown {
            self.cancel(TimerKind::Countdown);
            return;
        }
        self.countdown_remaining = self.countdown_remaining.saturating_sub(1);
        if self.countdown_remaining > 0 {
            self.broadcast(ServerMessage::CountdownTick {
                remaining: self.countdown_remaining,
            });
            return;
        }
        self.cancel(TimerKind::Countdown);
        self.countdown_elapsed = true;
        self.try_activate();
    }

    fn try_activate(&mut self) {
        let anyone_connected = Seat::ALL.iter().any(|seat| self.is_connected(*seat));
        if self.phase == MatchPhase::Countdown
            && self.countdown_elapsed
            && self.content == ContentState::Loaded
            && anyone_connected
        {
            self.activate();
        }
    }

    fn activate(&mut self) {
        self.phase = MatchPhase::Active;
        self.cancel(TimerKind::Expiry);
        self.started_at = Some(SystemTime::now());
        self.time_remaining = self.settings.match_duration_secs;
        self.broadcast(ServerMessage::MatchStarted {
            state: self.state_view(),
        });
        self.arm(TimerKind::MatchClock, TimerSchedule::Every(TICK));

        for seat in Seat::ALL {
            if self.slot(seat).is_some() && !self.is_connected(seat) {
                let grace = self.settings.reconnect_grace;
                self.arm(TimerKind::Grace(seat), TimerSchedule::Once(grace));
                self.notify_disconnected(seat);
            }
        }

        if self.questions.is_empty() {
            self.finish();
        } else {
            self.start_question(0);
        }
    }

    fn start_question(&mut self, index: usize) {
        self.cancel(TimerKind::Question);
        let Some(question) = self.questions.get(index) else {
            self.finish();
            return;
        };
        let view = QuestionView::from(question);
        self.current_index = Some(index);
        self.question_open = true;
        self.answered.clear();
        self.pending_answers.clear();

        let limit = self.settings.question_duration;
        self.broadcast(ServerMessage::QuestionStarted {
            index,
            total: self.questions.len(),
            question: view,
            time_limit_ms: duration_ms(limit),
        });
        self.arm(TimerKind::Question, TimerSchedule::Once(limit));
    }

    fn advance(&mut self) {
        self.close_question();
        if self.phase != MatchPhase::Active {
            return;
        }
        let next = self.current_index.map_or(0, |index| index + 1);
        if next < self.questions.len() {
            self.start_question(next);
        } else {
            self.finish();
        }
    }

    /// Score the pending answers of the open question and reveal the outcome.
    fn close_question(&mut self) {
        if !self.question_open {
            return;
        }
        self.question_open = false;
        self.cancel(TimerKind::Question);
        let Some(index) = self.current_index else {
            return;
        };
        let Some(question) = self.questions.get(index).cloned() else {
            return;
        };

        let limit_ms = duration_ms(self.settings.question_duration);
        let goal_line = self.settings.goal_line;
        let mut answers = Vec::with_capacity(self.pending_answers.len());
        let mut goals_scored = Vec::new();

        for pending in std::mem::take(&mut self.pending_answers) {
            let correct = question.is_correct(pending.choice);
            let points = if correct {
                self.settings.correct_points
                    + time_bonus(self.settings.time_bonus_max, pending.elapsed_ms, limit_ms)
            } else {
                0
            };
            if let Some(slot) = self.slot_mut(pending.seat) {
                slot.score += points;
                if correct {
                    slot.correct += 1;
                }
            }

            let toward_seat_one_goal = matches!(
                (pending.seat, correct),
                (Seat::One, true) | (Seat::Two, false)
            );
            let step = if toward_seat_one_goal { 1 } else { -1 };
            self.field_position = self
                .field_position
                .saturating_add(step)
                .clamp(-goal_line, goal_line);

            let scorer = if self.field_position >= goal_line {
                Some(Seat::One)
            } else if self.field_position <= -goal_line {
                Some(Seat::Two)
            } else {
                None
            };
            if let Some(scorer) = scorer {
                self.field_position = 0;
                if let Some(slot) = self.slot_mut(scorer) {
                    slot.goals += 1;
                    goals_scored.push(slot.participant.id.clone());
                }
            }

            answers.push(AnswerOutcomeView {
                player_id: pending.player_id,
                choice: pending.choice,
                correct,
                points,
            });
        }

        let players = Seat::ALL
            .into_iter()
            .filter_map(|seat| self.slot(seat))
            .map(|slot| SeatScoreView {
                player_id: slot.participant.id.clone(),
                score: slot.score,
                goals: slot.goals,
                correct: slot.correct,
            })
            .collect();

        self.broadcast(ServerMessage::QuestionResult {
            question_index: index,
            correct_answer: question.correct_answer(),
            answers,
            players,
            field_position: self.field_position,
            goals_scored,
        });
    }

    fn clock_tick(&mut self) {
        if self.phase != MatchPhase::Active {
            self.cancel(TimerKind::MatchClock);
            return;
        }
        self.time_remaining = self.time_remaining.saturating_sub(1);
        self.broadcast(ServerMessage::TimeTick {
            remaining: self.time_remaining,
        });
        if self.time_remaining == 0 {
            self.finish();
            return;
        }
        if !self.low_time_warned && self.time_remaining <= self.settings.low_time_threshold_secs {
            self.low_time_warned = true;
            self.broadcast(ServerMessage::LowTimeWarning {
                remaining: self.time_remaining,
            });
        }
    }

    fn abandon(&mut self, winner_seat: Seat, reason: AbandonReason) {
        if self.phase.is_terminal() {
            return;
        }
        let reached_active = self.phase == MatchPhase::Active;
        self.question_open = false;
        self.pending_answers.clear();
        self.cancel_all();
        self.winner = self
            .slot(winner_seat)
            .map(|slot| slot.participant.id.clone());
        self.abandon_reason = Some(reason);
        self.phase = MatchPhase::Abandoned;
        self.finished_at = Some(SystemTime::now());
        self.conclude(reached_active);
    }

    /// Silent end of a room that never started: no event, no result.
    fn expire(&mut self) {
        if self.phase.is_terminal() {
            return;
        }
        self.cancel_all();
        self.phase = MatchPhase::Abandoned;
        self.abandon_reason = Some(AbandonReason::Expired);
        self.finished_at = Some(SystemTime::now());
        for slot in self.slots.iter().flatten() {
            self.outbox
                .push(RoomEffect::Release(slot.participant.id.clone()));
        }
        self.outbox.push(RoomEffect::Dispose);
    }

    fn conclude(&mut self, reached_active: bool) {
        let finished_at = self.finished_at.unwrap_or_else(SystemTime::now);
        let duration_secs = if reached_active {
            self.settings
                .match_duration_secs
                .saturating_sub(self.time_remaining)
        } else {
            0
        };
        let seats: Vec<SeatOutcome> = Seat::ALL
            .into_iter()
            .filter_map(|seat| {
                self.slot(seat).map(|slot| SeatOutcome {
                    seat,
                    participant: slot.participant.clone(),
                    score: slot.score,
                    goals: slot.goals,
                    correct: slot.correct,
                })
            })
            .collect();

        let outcome = MatchOutcome {
            match_id: self.match_id.clone(),
            phase: self.phase,
            winner: self.winner.clone(),
            reason: self.abandon_reason,
            seats,
            reached_active,
            duration_secs,
            finished_at,
            recipients: self.connections(),
        };
        self.outbox.push(RoomEffect::Finalize(outcome));
        for slot in self.slots.iter().flatten() {
            self.outbox
                .push(RoomEffect::Release(slot.participant.id.clone()));
        }
        self.outbox
            .push(RoomEffect::ScheduleCleanup(self.settings.cleanup_cooldown));
    }

    fn attach(&mut self, seat: Seat, connection: ConnectionId) {
        let Some(slot) = self.slot_mut(seat) else {
            return;
        };
        if slot.connection == Some(connection) {
            return;
        }
        let first_join = !slot.ever_connected;
        let was_disconnected = slot.connection.is_none();
        let superseded = slot.connection.replace(connection);
        slot.ever_connected = true;
        let player_id = slot.participant.id.clone();
        let view = player_view(slot, seat);

        if let Some(old) = superseded {
            self.outbox.push(RoomEffect::Unbind(old));
        }
        self.cancel(TimerKind::Grace(seat));
        if self.phase == MatchPhase::Countdown {
            self.cancel(TimerKind::Expiry);
        }

        if first_join {
            self.send_to_seat(seat.other(), ServerMessage::OpponentJoined { opponent: view });
        } else if was_disconnected {
            self.send_to_seat(seat.other(), ServerMessage::OpponentReconnected { player_id });
        }
        self.try_activate();
    }

    fn detach(&mut self, seat: Seat) {
        if let Some(slot) = self.slot_mut(seat) {
            slot.connection = None;
        }
    }

    fn vacate(&mut self, seat: Seat) {
        let Some(slot) = self.slots[seat.index()].take() else {
            return;
        };
        let player_id = slot.participant.id;
        self.send_to_seat(
            seat.other(),
            ServerMessage::OpponentLeft {
                player_id: player_id.clone(),
            },
        );
        self.outbox.push(RoomEffect::Release(player_id));
        if let Some(other) = self.slot_mut(seat.other()) {
            other.ready = false;
        }
        if self.slots.iter().all(Option::is_none) {
            self.expire();
        } else if self.phase == MatchPhase::Waiting && !self.is_armed(TimerKind::Expiry) {
            let window = self.settings.join_window;
            self.arm(TimerKind::Expiry, TimerSchedule::Once(window));
        }
    }

    fn notify_disconnected(&mut self, seat: Seat) {
        let Some(player_id) = self.slot(seat).map(|slot| slot.participant.id.clone()) else {
            return;
        };
        self.send_to_seat(
            seat.other(),
            ServerMessage::OpponentDisconnected {
                player_id,
                grace_ms: duration_ms(self.settings.reconnect_grace),
            },
        );
    }

    fn all_connected_answered(&self) -> bool {
        if self.phase != MatchPhase::Active || !self.question_open {
            return false;
        }
        let mut connected = self.slots.iter().flatten().filter(|slot| slot.connected()).peekable();
        connected.peek().is_some() && connected.all(|slot| self.answered.contains(&slot.participant.id))
    }

    fn average_grade(&self) -> u8 {
        let grades: Vec<u32> = self
            .slots
            .iter()
            .flatten()
            .map(|slot| slot.participant.grade as u32)
            .collect();
        if grades.is_empty() {
            return 1;
        }
        let sum: u32 = grades.iter().sum();
        let count = grades.len() as u32;
        ((sum + count / 2) / count) as u8
    }

    fn arm(&mut self, kind: TimerKind, schedule: TimerSchedule) {
        self.generation += 1;
        let token = TimerToken {
            kind,
            generation: self.generation,
        };
        self.armed.insert(kind, token.generation);
        self.outbox.push(RoomEffect::Arm { token, schedule });
    }

    fn cancel(&mut self, kind: TimerKind) {
        if self.armed.remove(&kind).is_some() {
            self.outbox.push(RoomEffect::Cancel(kind));
        }
    }

    fn cancel_all(&mut self) {
        let kinds: Vec<TimerKind> = self.armed.keys().copied().collect();
        for kind in kinds {
            self.cancel(kind);
        }
    }

    fn slot(&self, seat: Seat) -> Option<&Slot> {
        self.slots[seat.index()].as_ref()
    }

    fn slot_mut(&mut self, seat: Seat) -> Option<&mut Slot> {
        self.slots[seat.index()].as_mut()
    }

    fn connections(&self) -> Vec<ConnectionId> {
        self.slots
            .iter()
            .flatten()
            .filter_map(|slot| slot.connection)
            .collect()
    }

    fn player_views(&self) -> Vec<PlayerView> {
        Seat::ALL
            .into_iter()
            .filter_map(|seat| self.slot(seat).map(|slot| player_view(slot, seat)))
            .collect()
    }

    fn broadcast(&mut self, message: ServerMessage) {
        let to = self.connections();
        if !to.is_empty() {
            self.outbox.push(RoomEffect::Send { to, message });
        }
    }

    fn send_to_seat(&mut self, seat: Seat, message: ServerMessage) {
        if let Some(connection) = self.slot(seat).and_then(|slot| slot.connection) {
            self.send_to_connection(connection, message);
        }
    }

    fn send_to_connection(&mut self, connection: ConnectionId, message: ServerMessage) {
        self.outbox.push(RoomEffect::Send {
            to: vec![connection],
            message,
        });
    }
}

/// Pick the winning seat from `(goals, score)` pairs: goals first, then score, otherwise a draw.
pub fn decide_winner(one: (u32, u32), two: (u32, u32)) -> Option<Seat> {
    match one.cmp(&two) {
        std::cmp::Ordering::Greater => Some(Seat::One),
        std::cmp::Ordering::Less => Some(Seat::Two),
        std::cmp::Ordering::Equal => None,
    }
}

/// Bonus for a correct answer, decreasing linearly from `max` at 0 ms to 0 at `limit_ms`.
pub fn time_bonus(max: u32, elapsed_ms: u64, limit_ms: u64) -> u32 {
    if limit_ms == 0 {
        return 0;
    }
    let remaining = 1.0 - elapsed_ms as f64 / limit_ms as f64;
    (max as f64 * remaining).round().max(0.0) as u32
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn player_view(slot: &Slot, seat: Seat) -> PlayerView {
    PlayerView {
        player_id: slot.participant.id.clone(),
        name: slot.participant.name.clone(),
        rating: slot.participant.rating,
        grade: slot.participant.grade,
        league: slot.participant.league.clone(),
        seat,
        connected: slot.connected(),
        ready: slot.ready,
        score: slot.score,
        goals: slot.goals,
        correct: slot.correct,
    }
}
