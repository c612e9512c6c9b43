use std::{sync::Arc, time::Duration};

use futures::future::BoxFuture;
use tokio::{
    sync::mpsc::{self, UnboundedReceiver},
    time,
};

use quiz_arena_back::{
    config::AppConfig,
    dao::match_store::{MatchStore, memory::MemoryMatchStore},
    dto::ws::ServerMessage,
    error::MatchError,
    services::{
        finalizer, match_service, matchmaking_service,
        question_source::{ContentError, QuestionSource},
        storage_supervisor,
    },
    state::{
        AppState, SharedState,
        participant::{ConnectionId, MatchId, Participant, PlayerId},
        question::{AnswerChoice, Question, QuestionKind},
        room::{AbandonReason, MatchPhase},
    },
};

const RIGHT: AnswerChoice = AnswerChoice::Option(1);
const WRONG: AnswerChoice = AnswerChoice::Option(0);

struct StaticSource(Vec<Question>);

impl QuestionSource for StaticSource {
    fn fetch(&self, _grade: u8, _count: usize) -> BoxFuture<'static, Result<Vec<Question>, ContentError>> {
        let questions = self.0.clone();
        Box::pin(async move { Ok(questions) })
    }
}

struct FailingSource;

impl QuestionSource for FailingSource {
    fn fetch(&self, _grade: u8, _count: usize) -> BoxFuture<'static, Result<Vec<Question>, ContentError>> {
        Box::pin(async { Err(ContentError::Empty) })
    }
}

struct TestClient {
    connection: ConnectionId,
    rx: UnboundedReceiver<ServerMessage>,
}

impl TestClient {
    fn connect(state: &SharedState) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let connection = ConnectionId::new();
        state.connections().register(connection, tx);
        Self { connection, rx }
    }

    /// Skip messages until `pick` accepts one.
    async fn expect<T>(&mut self, mut pick: impl FnMut(&ServerMessage) -> Option<T>) -> T {
        let rx = &mut self.rx;
        let wait = async move {
            loop {
                let message = rx.recv().await.expect("connection channel closed");
                if let Some(value) = pick(&message) {
                    return value;
                }
            }
        };
        time::timeout(Duration::from_secs(600), wait)
            .await
            .expect("expected message never arrived")
    }

    fn drain(&mut self) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = self.rx.try_recv() {
            messages.push(message);
        }
        messages
    }
}

fn questions(count: usize) -> Vec<Question> {
    (0..count)
        .map(|index| Question {
            id: format!("q-{index}"),
            prompt: format!("{index} + 1 = ?"),
            kind: QuestionKind::MultipleChoice {
                options: vec!["0".into(), "1".into(), "2".into(), "3".into()],
                correct_index: 1,
            },
            difficulty: 1,
            image_url: None,
        })
        .collect()
}

fn participant(id: &str, grade: u8) -> Participant {
    Participant {
        id: PlayerId::new(id),
        name: id.to_uppercase(),
        rating: 400,
        grade,
        league: "silver".into(),
        win_streak: 0,
    }
}

fn app(source: Arc<dyn QuestionSource>, questions_per_match: usize) -> SharedState {
    let mut config = AppConfig::default();
    config.match_settings.target_question_count = questions_per_match;
    config.match_settings.min_question_count = questions_per_match;
    AppState::new(config, source)
}

async fn app_with_store(
    source: Arc<dyn QuestionSource>,
    questions_per_match: usize,
) -> (SharedState, MemoryMatchStore) {
    let state = app(source, questions_per_match);
    let store = MemoryMatchStore::new();
    state.install_match_store(Arc::new(store.clone())).await;
    (state, store)
}

/// Seat both players in `match_id`, ready them and wait until the first question is open.
async fn start_match(
    state: &SharedState,
    match_id: &MatchId,
    one: &mut TestClient,
    two: &mut TestClient,
) -> usize {
    match_service::join_match(state, one.connection, match_id.clone(), participant("p-one", 3))
        .await
        .unwrap();
    match_service::join_match(state, two.connection, match_id.clone(), participant("p-two", 3))
        .await
        .unwrap();
    one.expect(|m| matches!(m, ServerMessage::OpponentJoined { .. }).then_some(()))
        .await;

    match_service::player_ready(state, one.connection, match_id).await.unwrap();
    match_service::player_ready(state, two.connection, match_id).await.unwrap();

    let total = one
        .expect(|m| match m {
            ServerMessage::MatchStarted { state } => Some(state.total_questions),
            _ => None,
        })
        .await;
    two.expect(|m| matches!(m, ServerMessage::MatchStarted { .. }).then_some(()))
        .await;
    total
}

async fn question_opened(client: &mut TestClient) -> usize {
    client
        .expect(|m| match m {
            ServerMessage::QuestionStarted { index, .. } => Some(*index),
            _ => None,
        })
        .await
}

async fn phase_of(state: &SharedState, match_id: &MatchId) -> MatchPhase {
    let handle = state.matches().get(match_id).expect("room is live");
    let live = handle.lock().await;
    live.room.phase()
}

async fn wait_for_records(store: &MemoryMatchStore, expected: usize) {
    for _ in 0..100 {
        if store.len() >= expected {
            return;
        }
        time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test(start_paused = true)]
async fn full_match_runs_to_a_winner_and_is_stored_once() {
    let (state, store) = app_with_store(Arc::new(StaticSource(questions(2))), 2).await;
    let match_id = MatchId::new("m-full");
    let mut one = TestClient::connect(&state);
    let mut two = TestClient::connect(&state);

    let total = start_match(&state, &match_id, &mut one, &mut two).await;
    assert_eq!(total, 2);

    for expected in 0..total {
        assert_eq!(question_opened(&mut one).await, expected);
        assert_eq!(question_opened(&mut two).await, expected);
        match_service::submit_answer(&state, one.connection, &match_id, expected, RIGHT, 800)
            .await
            .unwrap();
        match_service::submit_answer(&state, two.connection, &match_id, expected, WRONG, 900)
            .await
            .unwrap();
        let closed = one
            .expect(|m| match m {
                ServerMessage::QuestionResult { question_index, .. } => Some(*question_index),
                _ => None,
            })
            .await;
        assert_eq!(closed, expected);
    }

    let result = one
        .expect(|m| match m {
            ServerMessage::MatchFinished { result } => Some(result.clone()),
            _ => None,
        })
        .await;
    assert_eq!(result.winner_id, Some(PlayerId::new("p-one")));
    assert!(!result.is_draw);
    assert!(result.players.iter().all(|line| line.trophies.is_some()));
    two.expect(|m| matches!(m, ServerMessage::MatchFinished { .. }).then_some(()))
        .await;

    assert_eq!(phase_of(&state, &match_id).await, MatchPhase::Finished);
    assert_eq!(state.matches().active_match_of(&PlayerId::new("p-one")), None);

    wait_for_records(&store, 1).await;
    assert_eq!(store.len(), 1);
    assert!(state.pending_records().is_empty());

    let store: Arc<dyn MatchStore> = Arc::new(store);
    assert_eq!(finalizer::flush_pending(&state, &store).await, 0);
}

#[tokio::test(start_paused = true)]
async fn answering_twice_or_late_is_rejected() {
    let (state, _store) = app_with_store(Arc::new(StaticSource(questions(3))), 3).await;
    let match_id = MatchId::new("m-answers");
    let mut one = TestClient::connect(&state);
    let mut two = TestClient::connect(&state);
    start_match(&state, &match_id, &mut one, &mut two).await;
    assert_eq!(question_opened(&mut one).await, 0);

    match_service::submit_answer(&state, one.connection, &match_id, 0, RIGHT, 100)
        .await
        .unwrap();
    let again = match_service::submit_answer(&state, one.connection, &match_id, 0, WRONG, 200).await;
    assert!(matches!(again, Err(MatchError::AlreadyAnswered)));

    let ahead = match_service::submit_answer(&state, two.connection, &match_id, 1, RIGHT, 100).await;
    assert!(matches!(ahead, Err(MatchError::StaleAnswer { .. })));
}

#[tokio::test(start_paused = true)]
async fn events_from_unbound_connections_are_refused() {
    let state = app(Arc::new(StaticSource(questions(1))), 1);
    let match_id = MatchId::new("m-unbound");
    let stranger = TestClient::connect(&state);

    let ready = match_service::player_ready(&state, stranger.connection, &match_id).await;
    assert!(matches!(ready, Err(MatchError::NotAuthenticated)));

    let mut one = TestClient::connect(&state);
    match_service::join_match(&state, one.connection, match_id.clone(), participant("p-one", 2))
        .await
        .unwrap();
    one.expect(|m| matches!(m, ServerMessage::MatchJoined { .. }).then_some(()))
        .await;

    let elsewhere = match_service::player_ready(&state, one.connection, &MatchId::new("other")).await;
    assert!(matches!(elsewhere, Err(MatchError::NotParticipant)));
}

#[tokio::test(start_paused = true)]
async fn failing_content_service_falls_back_to_builtin_questions() {
    let (state, _store) = app_with_store(Arc::new(FailingSource), 10).await;
    let match_id = MatchId::new("m-fallback");
    let mut one = TestClient::connect(&state);
    let mut two = TestClient::connect(&state);

    let total = start_match(&state, &match_id, &mut one, &mut two).await;
    assert_eq!(total, 10);

    let first_id = one
        .expect(|m| match m {
            ServerMessage::QuestionStarted { question, .. } => Some(question.id.clone()),
            _ => None,
        })
        .await;
    assert!(first_id.starts_with("fb-"));
}

#[tokio::test(start_paused = true)]
async fn disconnected_player_loses_after_the_grace_window() {
    let (state, store) = app_with_store(Arc::new(StaticSource(questions(10))), 10).await;
    let match_id = MatchId::new("m-grace");
    let mut one = TestClient::connect(&state);
    let mut two = TestClient::connect(&state);
    start_match(&state, &match_id, &mut one, &mut two).await;

    match_service::connection_closed(&state, two.connection).await;
    let gone = one
        .expect(|m| match m {
            ServerMessage::OpponentDisconnected { player_id, .. } => Some(player_id.clone()),
            _ => None,
        })
        .await;
    assert_eq!(gone, PlayerId::new("p-two"));

    let (reason, winner) = one
        .expect(|m| match m {
            ServerMessage::MatchAbandoned {
                reason, winner_id, ..
            } => Some((*reason, winner_id.clone())),
            _ => None,
        })
        .await;
    assert_eq!(reason, AbandonReason::Disconnected);
    assert_eq!(winner, PlayerId::new("p-one"));
    assert_eq!(phase_of(&state, &match_id).await, MatchPhase::Abandoned);

    wait_for_records(&store, 1).await;
    assert_eq!(store.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn closing_a_superseded_socket_keeps_the_player_seated() {
    let (state, _store) = app_with_store(Arc::new(StaticSource(questions(10))), 10).await;
    let match_id = MatchId::new("m-stale");
    let mut one = TestClient::connect(&state);
    let mut two = TestClient::connect(&state);
    start_match(&state, &match_id, &mut one, &mut two).await;

    let mut replacement = TestClient::connect(&state);
    match_service::reconnect_match(
        &state,
        replacement.connection,
        match_id.clone(),
        Some(participant("p-one", 3)),
    )
    .await
    .unwrap();
    replacement
        .expect(|m| matches!(m, ServerMessage::MatchState { .. }).then_some(()))
        .await;
    let index = question_opened(&mut replacement).await;
    two.drain();

    let stale_answer =
        match_service::submit_answer(&state, one.connection, &match_id, index, RIGHT, 10).await;
    assert!(matches!(stale_answer, Err(MatchError::NotParticipant)));
    let stale_ready = match_service::player_ready(&state, one.connection, &match_id).await;
    assert!(matches!(stale_ready, Err(MatchError::NotParticipant)));
    let stale_leave = match_service::leave_match(&state, one.connection, &match_id).await;
    assert!(matches!(stale_leave, Err(MatchError::NotParticipant)));
    assert_eq!(phase_of(&state, &match_id).await, MatchPhase::Active);

    match_service::connection_closed(&state, one.connection).await;

    assert!(
        !two.drain()
            .iter()
            .any(|m| matches!(m, ServerMessage::OpponentDisconnected { .. }))
    );
    assert_eq!(phase_of(&state, &match_id).await, MatchPhase::Active);

    match_service::submit_answer(&state, replacement.connection, &match_id, index, RIGHT, 10)
        .await
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn failed_join_elsewhere_keeps_the_seated_identity() {
    let (state, _store) = app_with_store(Arc::new(StaticSource(questions(10))), 10).await;
    let match_id = MatchId::new("m-home");
    let mut one = TestClient::connect(&state);
    let mut two = TestClient::connect(&state);
    start_match(&state, &match_id, &mut one, &mut two).await;

    let full = MatchId::new("m-full-room");
    let x = TestClient::connect(&state);
    let y = TestClient::connect(&state);
    match_service::join_match(&state, x.connection, full.clone(), participant("p-x", 3))
        .await
        .unwrap();
    match_service::join_match(&state, y.connection, full.clone(), participant("p-y", 3))
        .await
        .unwrap();

    let joined =
        match_service::join_match(&state, one.connection, full.clone(), participant("p-z", 3)).await;
    assert!(matches!(joined, Err(MatchError::RoomFull)));
    let reconnected =
        match_service::reconnect_match(&state, one.connection, full, Some(participant("p-z", 3)))
            .await;
    assert!(matches!(reconnected, Err(MatchError::NotParticipant)));
    assert_eq!(
        state.connections().participant(one.connection).map(|p| p.id),
        Some(PlayerId::new("p-one"))
    );

    match_service::connection_closed(&state, one.connection).await;
    let gone = two
        .expect(|m| match m {
            ServerMessage::OpponentDisconnected { player_id, .. } => Some(player_id.clone()),
            _ => None,
        })
        .await;
    assert_eq!(gone, PlayerId::new("p-one"));
}

#[tokio::test(start_paused = true)]
async fn seated_players_keep_an_unready_room_past_the_join_window() {
    let state = app(Arc::new(StaticSource(questions(1))), 1);
    let match_id = MatchId::new("m-window");
    let mut one = TestClient::connect(&state);
    let two = TestClient::connect(&state);
    match_service::join_match(&state, one.connection, match_id.clone(), participant("p-one", 2))
        .await
        .unwrap();
    match_service::join_match(&state, two.connection, match_id.clone(), participant("p-two", 2))
        .await
        .unwrap();

    time::sleep(state.config().match_settings.join_window + Duration::from_secs(1)).await;
    assert_eq!(phase_of(&state, &match_id).await, MatchPhase::Waiting);

    match_service::player_ready(&state, one.connection, &match_id).await.unwrap();
    match_service::player_ready(&state, two.connection, &match_id).await.unwrap();
    one.expect(|m| matches!(m, ServerMessage::MatchStarted { .. }).then_some(()))
        .await;
}

#[tokio::test(start_paused = true)]
async fn half_filled_room_expires_after_the_join_window() {
    let state = app(Arc::new(StaticSource(questions(1))), 1);
    let match_id = MatchId::new("m-lonely");
    let mut one = TestClient::connect(&state);
    match_service::join_match(&state, one.connection, match_id.clone(), participant("p-one", 2))
        .await
        .unwrap();
    one.drain();

    time::sleep(state.config().match_settings.join_window + Duration::from_secs(1)).await;
    assert!(state.matches().get(&match_id).is_none());
    assert!(one.drain().is_empty());
    let ready = match_service::player_ready(&state, one.connection, &match_id).await;
    assert!(matches!(ready, Err(MatchError::RoomNotFound)));
}

#[tokio::test(start_paused = true)]
async fn leaving_during_countdown_forfeits_without_storing() {
    let (state, store) = app_with_store(Arc::new(StaticSource(questions(2))), 2).await;
    let match_id = MatchId::new("m-forfeit");
    let mut one = TestClient::connect(&state);
    let mut two = TestClient::connect(&state);

    match_service::join_match(&state, one.connection, match_id.clone(), participant("p-one", 3))
        .await
        .unwrap();
    match_service::join_match(&state, two.connection, match_id.clone(), participant("p-two", 3))
        .await
        .unwrap();
    match_service::player_ready(&state, one.connection, &match_id).await.unwrap();
    match_service::player_ready(&state, two.connection, &match_id).await.unwrap();
    one.expect(|m| matches!(m, ServerMessage::BothReady { .. }).then_some(()))
        .await;

    match_service::leave_match(&state, two.connection, &match_id)
        .await
        .unwrap();
    let (reason, winner) = one
        .expect(|m| match m {
            ServerMessage::MatchAbandoned {
                reason, winner_id, ..
            } => Some((*reason, winner_id.clone())),
            _ => None,
        })
        .await;
    assert_eq!(reason, AbandonReason::Forfeit);
    assert_eq!(winner, PlayerId::new("p-one"));

    time::sleep(Duration::from_millis(100)).await;
    assert!(store.is_empty());
    assert!(state.pending_records().is_empty());
}

#[tokio::test(start_paused = true)]
async fn results_concluded_while_degraded_are_flushed_on_install() {
    let state = app(Arc::new(StaticSource(questions(1))), 1);
    let match_id = MatchId::new("m-degraded");
    let mut one = TestClient::connect(&state);
    let mut two = TestClient::connect(&state);
    start_match(&state, &match_id, &mut one, &mut two).await;

    match_service::submit_answer(&state, one.connection, &match_id, 0, WRONG, 100)
        .await
        .unwrap();
    match_service::submit_answer(&state, two.connection, &match_id, 0, RIGHT, 100)
        .await
        .unwrap();
    let winner = one
        .expect(|m| match m {
            ServerMessage::MatchFinished { result } => Some(result.winner_id.clone()),
            _ => None,
        })
        .await;
    assert_eq!(winner, Some(PlayerId::new("p-two")));

    for _ in 0..100 {
        if !state.pending_records().is_empty() {
            break;
        }
        time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(state.pending_records().len(), 1);

    let store = MemoryMatchStore::new();
    storage_supervisor::install(&state, Arc::new(store.clone())).await;
    assert_eq!(store.len(), 1);
    assert!(state.pending_records().is_empty());
    assert!(!state.is_degraded().await);
}

#[tokio::test(start_paused = true)]
async fn queue_pairs_compatible_players_into_one_room() {
    let state = app(Arc::new(StaticSource(questions(2))), 2);
    let mut one = TestClient::connect(&state);
    let mut two = TestClient::connect(&state);

    matchmaking_service::find_match(&state, one.connection, participant("p-one", 3))
        .await
        .unwrap();
    let position = one
        .expect(|m| match m {
            ServerMessage::Queued { position } => Some(*position),
            _ => None,
        })
        .await;
    assert_eq!(position, 1);

    matchmaking_service::find_match(&state, two.connection, participant("p-two", 4))
        .await
        .unwrap();
    let found_one = one
        .expect(|m| match m {
            ServerMessage::MatchFound { match_id, .. } => Some(match_id.clone()),
            _ => None,
        })
        .await;
    let found_two = two
        .expect(|m| match m {
            ServerMessage::MatchFound { match_id, .. } => Some(match_id.clone()),
            _ => None,
        })
        .await;
    assert_eq!(found_one, found_two);
    assert!(state.queue().lock().await.is_empty());

    let again = matchmaking_service::find_match(&state, one.connection, participant("p-one", 3)).await;
    assert!(matches!(again, Err(MatchError::AlreadyInMatch)));

    match_service::join_match(&state, one.connection, found_one.clone(), participant("p-one", 3))
        .await
        .unwrap();
    let seat = one
        .expect(|m| match m {
            ServerMessage::MatchJoined { seat, .. } => Some(*seat),
            _ => None,
        })
        .await;
    assert_eq!(seat.index(), 0);
    assert_eq!(
        state.matches().active_match_of(&PlayerId::new("p-two")),
        Some(found_one)
    );
}

#[tokio::test(start_paused = true)]
async fn sweeper_evicts_players_who_waited_too_long() {
    let state = app(Arc::new(StaticSource(questions(2))), 2);
    let mut lonely = TestClient::connect(&state);
    let sweeper = tokio::spawn(matchmaking_service::run_queue_sweeper(state.clone()));

    matchmaking_service::find_match(&state, lonely.connection, participant("p-lonely", 2))
        .await
        .unwrap();
    lonely
        .expect(|m| matches!(m, ServerMessage::MatchmakingTimeout).then_some(()))
        .await;
    assert!(state.queue().lock().await.is_empty());

    sweeper.abort();
}
