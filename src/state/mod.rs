pub mod connection;
pub mod matchmaking;
pub mod participant;
pub mod question;
pub mod registry;
pub mod result;
pub mod room;
mod sse;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock};

use crate::{
    config::AppConfig,
    dao::match_store::MatchStore,
    error::ServiceError,
    services::question_source::QuestionSource,
};

pub use self::sse::SseHub;
use self::{
    connection::ConnectionRegistry, matchmaking::MatchmakingQueue, participant::MatchId,
    registry::MatchRegistry, result::MatchResult,
};

pub type SharedState = Arc<AppState>;

const SSE_CAPACITY: usize = 64;

/// Central application state: live connections, the queue, live rooms and the storage handle.
pub struct AppState {
    config: AppConfig,
    connections: ConnectionRegistry,
    queue: Mutex<MatchmakingQueue>,
    matches: MatchRegistry,
    question_source: Arc<dyn QuestionSource>,
    match_store: RwLock<Option<Arc<dyn MatchStore>>>,
    pending_records: DashMap<MatchId, MatchResult>,
    sse: SseHub,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a match store is installed.
    pub fn new(config: AppConfig, question_source: Arc<dyn QuestionSource>) -> SharedState {
        let grade_tolerance = config.matchmaking.grade_tolerance;
        Arc::new(Self {
            config,
            connections: ConnectionRegistry::new(),
            queue: Mutex::new(MatchmakingQueue::new(grade_tolerance)),
            matches: MatchRegistry::new(),
            question_source,
            match_store: RwLock::new(None),
            pending_records: DashMap::new(),
            sse: SseHub::new(SSE_CAPACITY),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Registry of open WebSocket connections.
    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    /// Matchmaking queue guarded by its own lock, independent of room locks.
    pub fn queue(&self) -> &Mutex<MatchmakingQueue> {
        &self.queue
    }

    /// Registry of live rooms.
    pub fn matches(&self) -> &MatchRegistry {
        &self.matches
    }

    pub fn question_source(&self) -> Arc<dyn QuestionSource> {
        self.question_source.clone()
    }

    /// Obtain a handle to the current match store, if one is installed.
    pub async fn match_store(&self) -> Option<Arc<dyn MatchStore>> {
        let guard = self.match_store.read().await;
        guard.as_ref().cloned()
    }

    /// Same as [`AppState::match_store`] but fails in degraded mode.
    pub async fn require_match_store(&self) -> Result<Arc<dyn MatchStore>, ServiceError> {
        self.match_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new match store implementation and leave degraded mode.
    pub async fn install_match_store(&self, store: Arc<dyn MatchStore>) {
        let mut guard = self.match_store.write().await;
        *guard = Some(store);
    }

    /// Remove the current match store and enter degraded mode.
    pub async fn clear_match_store(&self) {
        let mut guard = self.match_store.write().await;
        guard.take();
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        let guard = self.match_store.read().await;
        guard.is_none()
    }

    /// Results waiting for a store to become available.
    pub fn pending_records(&self) -> &DashMap<MatchId, MatchResult> {
        &self.pending_records
    }

    /// Broadcast hub used for the lobby SSE stream.
    pub fn public_sse(&self) -> &SseHub {
        &self.sse
    }
}
