//! Quiz Arena Back binary entrypoint wiring REST, WebSocket, SSE and match storage layers.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quiz_arena_back::{
    config::AppConfig,
    dao::{
        match_store::{
            MatchStore,
            couchdb::{CouchConfig, CouchMatchStore},
            memory::MemoryMatchStore,
        },
        storage::StorageError,
    },
    routes,
    services::{matchmaking_service, question_source::HttpQuestionSource, storage_supervisor},
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let question_source =
        HttpQuestionSource::new(&config.content).context("building question service client")?;

    let app_state = AppState::new(config, Arc::new(question_source));

    start_storage(&app_state).await;
    tokio::spawn(matchmaking_service::run_queue_sweeper(app_state.clone()));
    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Supervise CouchDB when configured, otherwise keep results in process memory.
async fn start_storage(state: &SharedState) {
    match CouchConfig::from_env() {
        Ok(couch_config) => {
            info!(base_url = %couch_config.base_url, database = %couch_config.database, "using CouchDB match store");
            tokio::spawn(storage_supervisor::run(state.clone(), move || {
                let couch_config = couch_config.clone();
                async move {
                    let store = CouchMatchStore::connect(couch_config).await?;
                    Ok::<_, StorageError>(Arc::new(store) as Arc<dyn MatchStore>)
                }
            }));
        }
        Err(err) => {
            info!(reason = %err, "CouchDB not configured; using in-memory match store");
            storage_supervisor::install(state, Arc::new(MemoryMatchStore::new())).await;
        }
    }
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler; waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
