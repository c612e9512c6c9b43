use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc,
};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};

use crate::{
    dto::sse::{Handshake, ServerEvent},
    state::SharedState,
};

const FORWARD_BUFFER: usize = 8;
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Subscribe to the shared lobby SSE stream.
pub fn subscribe_public(state: &SharedState) -> broadcast::Receiver<ServerEvent> {
    state.public_sse().subscribe()
}

/// Build the handshake event sent first on every new lobby stream.
pub async fn handshake_event(state: &SharedState) -> Option<ServerEvent> {
    let queue_size = state.queue().lock().await.len();
    let handshake = Handshake {
        stream: "matches".into(),
        message: "lobby stream connected".into(),
        degraded: state.is_degraded().await,
        live_matches: state.matches().len(),
        queue_size,
    };
    ServerEvent::json(Some("handshake".to_string()), &handshake).ok()
}

/// Turn a lobby subscription into an SSE response. `first` is sent before any broadcast event.
pub fn to_sse_stream(
    receiver: broadcast::Receiver<ServerEvent>,
    first: Option<ServerEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(FORWARD_BUFFER);
    tokio::spawn(forward(receiver, first, tx));

    // Axum drops the stream when the client goes away, which closes `tx`.
    Sse::new(ReceiverStream::new(rx)).keep_alive(
        KeepAlive::new()
            .interval(KEEP_ALIVE_INTERVAL)
            .text("keep-alive"),
    )
}

async fn forward(
    mut receiver: broadcast::Receiver<ServerEvent>,
    first: Option<ServerEvent>,
    tx: mpsc::Sender<Result<Event, Infallible>>,
) {
    if let Some(payload) = first {
        if tx.send(Ok(to_event(payload))).await.is_err() {
            return;
        }
    }

    loop {
        let payload = tokio::select! {
            _ = tx.closed() => break,
            received = receiver.recv() => match received {
                Ok(payload) => payload,
                Err(RecvError::Closed) => break,
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "lobby subscriber lagging; events dropped");
                    continue;
                }
            },
        };
        if tx.send(Ok(to_event(payload))).await.is_err() {
            break;
        }
    }

    info!("lobby SSE stream disconnected");
}

fn to_event(payload: ServerEvent) -> Event {
    let event = Event::default().data(payload.data);
    match payload.event {
        Some(name) => event.event(name),
        None => event,
    }
}
