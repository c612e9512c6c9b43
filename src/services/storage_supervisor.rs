//! Keeps a match store installed while the backend is reachable.
//!
//! Without a store the server runs degraded: matches still conclude and their
//! results wait in the pending buffer until the next install flushes them.

use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{match_store::MatchStore, storage::StorageError},
    services::{finalizer, sse_events},
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Connect, watch and reconnect the store returned by `connect`, forever.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn MatchStore>, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        match connect().await {
            Ok(store) => {
                info!("match store connected");
                install(&state, store.clone()).await;
                delay = INITIAL_DELAY;
                watch(&state, &store).await;
                warn!("match store lost; connecting from scratch");
            }
            Err(err) => {
                warn!(error = %err, "match store connection attempt failed");
                degrade(&state).await;
            }
        }
        sleep(delay).await;
        delay = next_delay(delay);
    }
}

/// Poll `store` until it stays unreachable after every reconnect attempt.
async fn watch(state: &SharedState, store: &Arc<dyn MatchStore>) {
    loop {
        if store.health_check().await.is_ok() {
            if state.is_degraded().await {
                info!("match store healthy again");
                install(state, store.clone()).await;
            } else if !state.pending_records().is_empty() {
                finalizer::flush_pending(state, store).await;
            }
            sleep(HEALTH_POLL_INTERVAL).await;
            continue;
        }

        if !reconnect(state, store).await {
            return;
        }
        install(state, store.clone()).await;
        sleep(HEALTH_POLL_INTERVAL).await;
    }
}

/// Retry `try_reconnect` with backoff. The state turns degraded after the first failure.
async fn reconnect(state: &SharedState, store: &Arc<dyn MatchStore>) -> bool {
    let mut delay = INITIAL_DELAY;
    for attempt in 0..MAX_RECONNECT_ATTEMPTS {
        match store.try_reconnect().await {
            Ok(()) => {
                info!(attempt, "match store reconnected after failed health check");
                return true;
            }
            Err(err) => {
                warn!(attempt, error = %err, "match store reconnect failed");
                if attempt == 0 {
                    degrade(state).await;
                }
                sleep(delay).await;
                delay = next_delay(delay);
            }
        }
    }
    false
}

fn next_delay(delay: Duration) -> Duration {
    (delay * 2).min(MAX_DELAY)
}

/// Install `store`, announce the change and write every pending result.
pub async fn install(state: &SharedState, store: Arc<dyn MatchStore>) {
    let was_degraded = state.is_degraded().await;
    state.install_match_store(store.clone()).await;
    if was_degraded {
        sse_events::broadcast_system_status(state, false);
    }
    finalizer::flush_pending(state, &store).await;
}

async fn degrade(state: &SharedState) {
    if !state.is_degraded().await {
        state.clear_match_store().await;
        sse_events::broadcast_system_status(state, true);
    }
}
